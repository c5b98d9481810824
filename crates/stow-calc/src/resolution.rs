//! 待處理迴圈
//!
//! 反覆處理主要裝櫃後的整數與小數待處理清單，直到清空、整輪沒有進展，
//! 或達到輪數上限。每一輪依序：
//!
//! 1. 整數棧板整體放回同群組貨櫃
//! 2. 跨群組可行性檢查；可行則規劃保留量並全有或全無地執行，不可行則為優先群組開新櫃
//! 3. 小數/合併棧板整體放回同群組貨櫃
//! 4. 併入同群組已裝櫃的小數/合併棧板
//! 5. 併入其他群組（先單一棧板，再合併棧板）
//! 6. 整數清單已清空時，整批跨群組裝櫃或為最大棧板開新櫃
//!
//! 迴圈結束後，多群組標記的棧板再做一次不限群組的最佳適配。

use std::collections::{BTreeMap, BTreeSet};

use stow_core::container::Capacity;
use stow_core::{
    AllocationConfig, AllocationSession, Container, ContainerYard, Pallet, SpareCapacity,
};

use crate::packer::PrimaryPacker;
use crate::placement::place_iteratively;
use crate::repack::{graft_all_leaves, graft_into};

/// 迴圈停止原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// 兩份清單皆已清空
    Drained,
    /// 整輪沒有進展
    Stalled,
    /// 達到輪數上限
    PassLimit,
}

/// 迴圈結果
#[derive(Debug, Clone)]
pub struct ResolutionOutcome {
    pub integer: Vec<Pallet>,
    pub fractional: Vec<Pallet>,
    pub passes: u32,
    pub containers_created: u32,
    pub stop: StopReason,
}

impl ResolutionOutcome {
    /// 所有未配置棧板
    pub fn into_unresolved(self) -> Vec<Pallet> {
        let mut pallets = self.integer;
        pallets.extend(self.fractional);
        pallets
    }
}

/// 待處理迴圈
pub struct ResolutionLoop<'a> {
    session: &'a mut AllocationSession,
    packer: PrimaryPacker<'a>,
    config: AllocationConfig,
    containers_created: u32,
}

impl<'a> ResolutionLoop<'a> {
    pub fn new(session: &'a mut AllocationSession, packer: PrimaryPacker<'a>) -> Self {
        let config = session.config().clone();
        Self {
            session,
            packer,
            config,
            containers_created: 0,
        }
    }

    /// 執行迴圈
    #[tracing::instrument(skip_all, fields(integer = integer.len(), fractional = fractional.len()))]
    pub fn run(
        mut self,
        yard: &mut ContainerYard,
        mut integer: Vec<Pallet>,
        mut fractional: Vec<Pallet>,
    ) -> ResolutionOutcome {
        let eps = self.config.epsilon;
        let mut passes = 0;

        let stop = loop {
            if integer.is_empty() && fractional.is_empty() {
                break StopReason::Drained;
            }
            if passes >= self.config.max_resolution_passes {
                break StopReason::PassLimit;
            }
            passes += 1;
            let before = backlog_quantity(&integer) + backlog_quantity(&fractional);
            tracing::debug!(
                "第 {} 輪：整數 {} 個，小數 {} 個",
                passes,
                integer.len(),
                fractional.len()
            );

            if !integer.is_empty() {
                integer = self.retry_same_group(yard, integer);
                if !integer.is_empty() {
                    integer = if self.cross_ship_feasible(yard, &integer, &fractional) {
                        self.split_across_groups(yard, integer, &fractional)
                    } else {
                        self.open_priority_container(yard, integer, &fractional)
                    };
                }
            }

            if !fractional.is_empty() {
                fractional = self.retry_same_group(yard, fractional);
            }
            if !fractional.is_empty() {
                fractional = self.repack_same_group(yard, fractional);
            }
            if !fractional.is_empty() {
                fractional = self.repack_other_groups(yard, fractional);
            }
            if !fractional.is_empty() && integer.is_empty() {
                fractional = self.cross_ship_or_open(yard, fractional);
            }

            let after = backlog_quantity(&integer) + backlog_quantity(&fractional);
            if after > before - eps && !(integer.is_empty() && fractional.is_empty()) {
                tracing::warn!("待處理迴圈第 {} 輪沒有進展，停止", passes);
                break StopReason::Stalled;
            }
        };

        let integer = self.final_best_fit(yard, integer);
        let fractional = self.final_best_fit(yard, fractional);

        tracing::info!(
            "待處理迴圈結束：{} 輪，新建貨櫃 {} 個，未配置 {} 個",
            passes,
            self.containers_created,
            integer.len() + fractional.len()
        );

        ResolutionOutcome {
            integer,
            fractional,
            passes,
            containers_created: self.containers_created,
            stop,
        }
    }

    /// 步驟 1 / 3：整體放回同群組貨櫃
    fn retry_same_group(&self, yard: &mut ContainerYard, pallets: Vec<Pallet>) -> Vec<Pallet> {
        let mut remaining = Vec::new();
        for pallet in sorted_largest_first(pallets) {
            let group = pallet.group.clone();
            if let Err(pallet) = yard.place_best_fit(pallet, |c| c.main_group == group) {
                remaining.push(pallet);
            }
        }
        remaining
    }

    /// 步驟 2：其他群組的剩餘空間能否容納整數待處理清單
    ///
    /// 小數待處理清單非空時一律不可行，先讓同群組合併。
    pub fn cross_ship_feasible(
        &self,
        yard: &ContainerYard,
        integer: &[Pallet],
        fractional: &[Pallet],
    ) -> bool {
        if !fractional.is_empty() {
            return false;
        }
        other_groups_cover(yard, integer, self.config.epsilon)
    }

    /// 步驟 2（可行）：為每個棧板規劃保留量，全部有解才執行
    fn split_across_groups(
        &mut self,
        yard: &mut ContainerYard,
        integer: Vec<Pallet>,
        fractional: &[Pallet],
    ) -> Vec<Pallet> {
        let integer = sorted_largest_first(integer);

        if let Some(keeps) = self.plan_keep_quantities(yard, &integer) {
            let executed = yard.transaction(|draft| {
                for (pallet, keep) in integer.iter().zip(&keeps) {
                    if !apply_keep_plan(draft, pallet, *keep, self.config.epsilon) {
                        return Err(());
                    }
                }
                Ok(())
            });
            match executed {
                Ok(()) => {
                    tracing::debug!("保留量計畫執行完成：{} 個棧板", integer.len());
                    return Vec::new();
                }
                Err(()) => tracing::debug!("保留量計畫執行失敗，回復原狀"),
            }
        }

        match self.apply_best_single_plan(yard, integer) {
            Ok(remaining) => remaining,
            Err(integer) => self.open_priority_container(yard, integer, fractional),
        }
    }

    /// 在貨櫃場副本上依序為每個棧板找最大保留量
    fn plan_keep_quantities(&self, yard: &ContainerYard, integer: &[Pallet]) -> Option<Vec<f64>> {
        let eps = self.config.epsilon;
        let mut draft = yard.clone();
        let mut keeps = Vec::with_capacity(integer.len());

        for pallet in integer {
            let mut found = None;
            for keep in (0..=whole_units(pallet.quantity, eps)).rev() {
                let keep = keep as f64;
                let mut trial = draft.clone();
                if apply_keep_plan(&mut trial, pallet, keep, eps) {
                    draft = trial;
                    found = Some(keep);
                    break;
                }
            }
            match found {
                Some(keep) => {
                    let crossing = pallet.quantity - keep;
                    tracing::debug!("棧板 {} 保留 {}，跨群組 {}", pallet.id, keep, crossing);
                    keeps.push(keep);
                }
                None => {
                    tracing::debug!("棧板 {} 找不到保留量計畫", pallet.id);
                    return None;
                }
            }
        }

        Some(keeps)
    }

    /// 單一最佳拆分：保留最多者優先，同值取原數量較小者
    fn apply_best_single_plan(
        &self,
        yard: &mut ContainerYard,
        mut integer: Vec<Pallet>,
    ) -> Result<Vec<Pallet>, Vec<Pallet>> {
        let eps = self.config.epsilon;

        let mut best: Option<(usize, f64)> = None;
        for (index, pallet) in integer.iter().enumerate() {
            let Some(keep) = self.largest_quick_keep(yard, pallet) else {
                continue;
            };
            let better = match best {
                None => true,
                Some((best_index, best_keep)) => {
                    keep > best_keep + eps
                        || ((keep - best_keep).abs() <= eps
                            && pallet.quantity < integer[best_index].quantity - eps)
                }
            };
            if better {
                best = Some((index, keep));
            }
        }

        let Some((index, keep)) = best else {
            return Err(integer);
        };

        let pallet = integer.remove(index);
        match execute_single_plan(yard, &pallet, keep, eps) {
            Ok(()) => {
                tracing::debug!("單一拆分：棧板 {} 保留 {}", pallet.id, keep);
                Ok(integer)
            }
            Err(()) => {
                tracing::debug!("單一拆分失敗，回復原狀");
                integer.insert(index, pallet);
                Err(integer)
            }
        }
    }

    /// 以「任一貨櫃放得下」快速檢查找出最大保留量
    fn largest_quick_keep(&self, yard: &ContainerYard, pallet: &Pallet) -> Option<f64> {
        let eps = self.config.epsilon;
        let fits = |quantity: f64, same_group: bool| {
            if quantity <= eps {
                return true;
            }
            let candidate = Pallet::new(
                pallet.id.clone(),
                pallet.product_code.clone(),
                pallet.product_name.clone(),
                pallet.group.clone(),
                quantity,
                pallet.weight_per_unit,
            );
            yard.containers()
                .iter()
                .filter(|c| (c.main_group == pallet.group) == same_group)
                .any(|c| c.can_fit(&candidate))
        };

        (0..=whole_units(pallet.quantity, eps))
            .rev()
            .map(|keep| keep as f64)
            .find(|keep| fits(*keep, true) && fits(pallet.quantity - keep, false))
    }

    /// 步驟 2（不可行）：為優先群組開一個新櫃，並只為該群組執行主要裝櫃
    fn open_priority_container(
        &mut self,
        yard: &mut ContainerYard,
        integer: Vec<Pallet>,
        fractional: &[Pallet],
    ) -> Vec<Pallet> {
        let Some(group) = priority_group(&integer, fractional) else {
            return integer;
        };

        let container = self.session.new_container(group.clone());
        let container_id = container.id.clone();
        tracing::debug!("為優先群組 {} 建立新貨櫃 {}", group, container_id);
        yard.push(container);
        self.containers_created += 1;

        let (mine, mut others): (Vec<Pallet>, Vec<Pallet>) =
            integer.into_iter().partition(|p| p.group == group);
        let leftover = self.packer.fill(mine, yard, |c| c.id == container_id);

        let mut remaining = leftover;
        remaining.append(&mut others);
        remaining
    }

    /// 步驟 4：把成員併入同群組貨櫃中的小數/合併棧板
    fn repack_same_group(&self, yard: &mut ContainerYard, pallets: Vec<Pallet>) -> Vec<Pallet> {
        let mut remaining = Vec::new();
        for pallet in sorted_largest_first(pallets) {
            let group = pallet.group.clone();
            if let Err(pallet) = graft_all_leaves(
                yard,
                pallet,
                &self.config,
                |c| c.main_group == group,
                |t| t.belongs_to(&group),
            ) {
                remaining.push(pallet);
            }
        }
        remaining
    }

    /// 步驟 5：併入其他群組貨櫃，先單一棧板，再合併棧板
    fn repack_other_groups(&self, yard: &mut ContainerYard, pallets: Vec<Pallet>) -> Vec<Pallet> {
        let (singles, composites): (Vec<Pallet>, Vec<Pallet>) =
            sorted_largest_first(pallets).into_iter().partition(Pallet::is_atomic);

        let mut remaining = Vec::new();
        for pallet in singles {
            let group = pallet.group.clone();
            let other_group = |c: &Container| c.main_group != group;
            if let Err(pallet) = graft_into(yard, pallet, &self.config, other_group, |_| true) {
                remaining.push(pallet);
            }
        }
        for pallet in composites {
            let group = pallet.group.clone();
            if let Err(pallet) =
                graft_all_leaves(yard, pallet, &self.config, |c| c.main_group != group, |_| true)
            {
                tracing::debug!("合併棧板 {} 延後處理", pallet.id);
                remaining.push(pallet);
            }
        }
        remaining
    }

    /// 步驟 6：其他群組空間足夠時整批跨群組；空間不足或一個都放不進時，為最大棧板開新櫃
    fn cross_ship_or_open(
        &mut self,
        yard: &mut ContainerYard,
        pallets: Vec<Pallet>,
    ) -> Vec<Pallet> {
        let mut pallets = sorted_largest_first(pallets);

        if other_groups_cover(yard, &pallets, self.config.epsilon) {
            let waiting = pallets.len();
            pallets = self.cross_ship_all(yard, pallets);
            if pallets.len() < waiting {
                return pallets;
            }
            tracing::debug!("其他群組的剩餘空間分散，無法放入任何棧板，改開新櫃");
        }

        if pallets.is_empty() {
            return pallets;
        }
        let largest = pallets.remove(0);
        let capacity = Capacity::from(&self.config);
        let blank = Container::new(String::new(), largest.group.clone(), capacity);
        if !blank.can_fit(&largest) {
            pallets.insert(0, largest);
            return pallets;
        }
        let mut container = self.session.new_container(largest.group.clone());
        tracing::debug!("為棧板 {} 建立新貨櫃 {}", largest.id, container.id);
        container.add(largest);
        yard.push(container);
        self.containers_created += 1;
        pallets
    }

    /// 整批跨群組：整體最佳適配，放不下時把成員併入其他群組的小數/合併棧板
    fn cross_ship_all(&self, yard: &mut ContainerYard, pallets: Vec<Pallet>) -> Vec<Pallet> {
        let mut remaining = Vec::new();
        for pallet in pallets {
            let group = pallet.group.clone();
            let pallet = match yard.place_best_fit(pallet, |c| c.main_group != group) {
                Ok(_) => continue,
                Err(pallet) => pallet,
            };
            let other_group = |c: &Container| c.main_group != group;
            let leftover = graft_all_leaves(yard, pallet, &self.config, other_group, |_| true);
            if let Err(pallet) = leftover {
                remaining.push(pallet);
            }
        }
        remaining
    }

    /// 步驟 7：多群組標記的棧板不限群組最佳適配
    fn final_best_fit(&self, yard: &mut ContainerYard, pallets: Vec<Pallet>) -> Vec<Pallet> {
        let mut remaining = Vec::new();
        for pallet in pallets {
            if !pallet.is_multi_group() {
                remaining.push(pallet);
                continue;
            }
            if let Err(pallet) = yard.place_best_fit(pallet, |_| true) {
                remaining.push(pallet);
            }
        }
        remaining
    }
}

/// 在貨櫃場上執行單一棧板的保留量計畫：保留部分逐櫃放入同群組，其餘逐櫃放入其他群組
fn apply_keep_plan(yard: &mut ContainerYard, pallet: &Pallet, keep: f64, eps: f64) -> bool {
    let group = pallet.group.clone();
    let Some((kept, crossing)) = divide_for_keep(pallet, keep, eps) else {
        return false;
    };
    if let Some(kept) = kept {
        if place_iteratively(yard, kept, |c| c.main_group == group).is_some() {
            return false;
        }
    }
    if let Some(crossing) = crossing {
        if place_iteratively(yard, crossing, |c| c.main_group != group).is_some() {
            return false;
        }
    }
    true
}

/// 單一拆分：保留部分整體放入同群組，跨群組部分整體放入其他群組；任一步失敗即還原
fn execute_single_plan(
    yard: &mut ContainerYard,
    pallet: &Pallet,
    keep: f64,
    eps: f64,
) -> Result<(), ()> {
    let group = pallet.group.clone();
    yard.transaction(|draft| {
        let (kept, crossing) = divide_for_keep(pallet, keep, eps).ok_or(())?;
        if let Some(kept) = kept {
            draft.place_best_fit(kept, |c| c.main_group == group).map_err(|_| ())?;
        }
        if let Some(crossing) = crossing {
            draft.place_best_fit(crossing, |c| c.main_group != group).map_err(|_| ())?;
        }
        Ok(())
    })
}

/// 不屬於待處理群組的貨櫃，剩餘數量、重量、邏輯行數是否都足以容納整份清單
fn other_groups_cover(yard: &ContainerYard, pallets: &[Pallet], eps: f64) -> bool {
    let groups: BTreeSet<&str> = pallets.iter().map(|p| p.group.as_str()).collect();
    let spare = yard.spare_capacity(|c| !groups.contains(c.main_group.as_str()));
    spare.covers(&SpareCapacity::demand_of(pallets, eps), eps)
}

/// 依保留量拆分：回傳（保留部分，跨群組部分）
fn divide_for_keep(
    pallet: &Pallet,
    keep: f64,
    eps: f64,
) -> Option<(Option<Pallet>, Option<Pallet>)> {
    let cross = pallet.quantity - keep;
    if cross <= eps {
        return Some((Some(pallet.clone()), None));
    }
    if keep <= eps {
        return Some((None, Some(pallet.clone())));
    }
    let (crossing, kept) = pallet.split(cross, eps)?;
    Some((Some(kept), Some(crossing)))
}

/// 新櫃的優先群組
///
/// 兩份清單都有的群組中小數量最大者；其次為小數量最大的群組；
/// 再其次為整數棧板最多的群組。同值取群組名稱最小者。
pub fn priority_group(integer: &[Pallet], fractional: &[Pallet]) -> Option<String> {
    let integer_groups: BTreeSet<&str> = integer.iter().map(|p| p.group.as_str()).collect();

    let mut fractional_volume: BTreeMap<&str, f64> = BTreeMap::new();
    for pallet in fractional {
        *fractional_volume.entry(pallet.group.as_str()).or_default() += pallet.quantity;
    }

    let common = fractional_volume
        .iter()
        .filter(|(group, _)| integer_groups.contains(*group))
        .map(|(group, volume)| (*group, *volume));
    if let Some(group) = max_by_value(common) {
        return Some(group.to_string());
    }
    if let Some(group) = max_by_value(fractional_volume.iter().map(|(g, v)| (*g, *v))) {
        return Some(group.to_string());
    }

    let mut counts: BTreeMap<&str, f64> = BTreeMap::new();
    for pallet in integer {
        *counts.entry(pallet.group.as_str()).or_default() += 1.0;
    }
    max_by_value(counts.iter().map(|(g, v)| (*g, *v))).map(str::to_string)
}

/// 取值最大的鍵；依鍵排序走訪，只有嚴格較大才取代，因此同值保留最小的鍵
fn max_by_value<'k>(entries: impl Iterator<Item = (&'k str, f64)>) -> Option<&'k str> {
    let mut best: Option<(&str, f64)> = None;
    for (key, value) in entries {
        if best.map_or(true, |(_, v)| value > v) {
            best = Some((key, value));
        }
    }
    best.map(|(key, _)| key)
}

fn sorted_largest_first(mut pallets: Vec<Pallet>) -> Vec<Pallet> {
    pallets.sort_by(|a, b| b.quantity.total_cmp(&a.quantity));
    pallets
}

fn backlog_quantity(pallets: &[Pallet]) -> f64 {
    pallets.iter().map(|p| p.quantity).sum()
}

fn whole_units(quantity: f64, eps: f64) -> u64 {
    (quantity + eps).floor().max(0.0) as u64
}
