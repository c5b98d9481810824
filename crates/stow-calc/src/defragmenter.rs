//! 碎片整理
//!
//! 找出利用率低於門檻的貨櫃，反覆執行補貨（fix）、再平衡（rebalance）、
//! 注入（inject），直到某一輪沒有任何變動或達到迭代上限。

use std::collections::BTreeMap;

use stow_core::{AllocationConfig, Container, ContainerYard, Pallet};

use crate::placement::placeable_amount;

/// 碎片整理結果
#[derive(Debug, Clone, Default)]
pub struct DefragOutcome {
    pub iterations: u32,
    pub capped: bool,
    /// 被清空並移除的貨櫃
    pub merged_away: Vec<String>,
}

/// 碎片整理器
pub struct Defragmenter<'a> {
    config: &'a AllocationConfig,
}

impl<'a> Defragmenter<'a> {
    pub fn new(config: &'a AllocationConfig) -> Self {
        Self { config }
    }

    /// 是否為低利用率貨櫃
    pub fn is_wasteful(&self, container: &Container) -> bool {
        !container.sealed
            && !container.is_empty()
            && container.utilization() < self.config.waste_threshold
    }

    /// 執行碎片整理
    #[tracing::instrument(skip_all, fields(containers = yard.len(), backlog = backlog.len()))]
    pub fn run(&self, yard: &mut ContainerYard, backlog: &mut Vec<Pallet>) -> DefragOutcome {
        let mut outcome = DefragOutcome::default();

        loop {
            if outcome.iterations >= self.config.max_defrag_iterations {
                outcome.capped = true;
                tracing::warn!("碎片整理達到迭代上限 {}", self.config.max_defrag_iterations);
                break;
            }
            outcome.iterations += 1;

            let mut changed = self.fix(yard, backlog);
            changed |= self.rebalance(yard);
            changed |= self.inject(yard, backlog);

            let removed = yard.remove_empty();
            if !removed.is_empty() {
                tracing::debug!("碎片整理移除空貨櫃: {:?}", removed);
                outcome.merged_away.extend(removed);
            }

            if !changed {
                break;
            }
        }

        tracing::info!(
            "碎片整理完成：{} 輪，移除貨櫃 {} 個",
            outcome.iterations,
            outcome.merged_away.len()
        );
        outcome
    }

    /// 低利用率貨櫃，利用率由低到高
    fn wasteful_indices(&self, yard: &ContainerYard) -> Vec<usize> {
        let mut indices: Vec<usize> = yard
            .containers()
            .iter()
            .enumerate()
            .filter(|(_, c)| self.is_wasteful(c))
            .map(|(i, _)| i)
            .collect();
        indices.sort_by(|a, b| {
            yard.containers()[*a]
                .utilization()
                .total_cmp(&yard.containers()[*b].utilization())
        });
        indices
    }

    /// 補貨：拉入同群組的待處理棧板，並把跨群組裝在別櫃的同群組棧板帶回
    fn fix(&self, yard: &mut ContainerYard, backlog: &mut Vec<Pallet>) -> bool {
        let mut changed = false;

        for index in self.wasteful_indices(yard) {
            let Some(container) = yard.get_mut(index) else {
                continue;
            };
            let group = container.main_group.clone();

            let mut i = 0;
            while i < backlog.len() {
                if backlog[i].group == group && container.can_fit(&backlog[i]) {
                    let pallet = backlog.remove(i);
                    tracing::debug!("貨櫃 {} 拉入待處理棧板 {}", container.id, pallet.id);
                    container.add(pallet);
                    changed = true;
                } else {
                    i += 1;
                }
            }

            for other in 0..yard.len() {
                if other == index {
                    continue;
                }
                changed |= self.bring_home(yard, other, index, &group);
            }
        }

        changed
    }

    /// 把 `from` 貨櫃中屬於 `group` 的跨群組棧板移回 `home`
    fn bring_home(&self, yard: &mut ContainerYard, from: usize, home: usize, group: &str) -> bool {
        let Some(source) = yard.get(from) else {
            return false;
        };
        if source.sealed || source.main_group == group {
            return false;
        }
        let candidates: Vec<String> = source
            .pallets()
            .iter()
            .filter(|p| p.group == group)
            .map(|p| p.id.clone())
            .collect();

        let mut changed = false;
        for pallet_id in candidates {
            let fits = match (yard.get(from), yard.get(home)) {
                (Some(source), Some(target)) => source
                    .pallets()
                    .iter()
                    .find(|p| p.id == pallet_id)
                    .is_some_and(|p| target.can_fit(p)),
                _ => false,
            };
            if !fits {
                continue;
            }
            let Some(pallet) = yard.get_mut(from).and_then(|c| c.remove(&pallet_id)) else {
                continue;
            };
            if let Some(target) = yard.get_mut(home) {
                tracing::debug!("棧板 {} 移回同群組貨櫃 {}", pallet.id, target.id);
                target.add(pallet);
                changed = true;
            }
        }
        changed
    }

    /// 再平衡：同群組兩個低利用率貨櫃之間，由較低者移往較高者
    fn rebalance(&self, yard: &mut ContainerYard) -> bool {
        let mut by_group: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for index in self.wasteful_indices(yard) {
            if let Some(container) = yard.get(index) {
                by_group.entry(container.main_group.clone()).or_default().push(index);
            }
        }

        let mut changed = false;
        for indices in by_group.values() {
            let (Some(&donor), Some(&receiver)) = (indices.first(), indices.last()) else {
                continue;
            };
            if donor == receiver {
                continue;
            }
            changed |= self.move_contents(yard, donor, receiver);
        }
        changed
    }

    /// 把 `donor` 的棧板移往 `receiver`；整體放不下時拆出整數部分補滿
    fn move_contents(&self, yard: &mut ContainerYard, donor: usize, receiver: usize) -> bool {
        let eps = self.config.epsilon;
        let Some(source) = yard.get(donor) else {
            return false;
        };
        let pallet_ids: Vec<String> = source.pallets().iter().map(|p| p.id.clone()).collect();

        let mut changed = false;
        for pallet_id in pallet_ids {
            let Some(pallet) = yard.get_mut(donor).and_then(|c| c.remove(&pallet_id)) else {
                continue;
            };
            let Some(target) = yard.get_mut(receiver) else {
                if let Some(source) = yard.get_mut(donor) {
                    source.add(pallet);
                }
                continue;
            };

            if target.can_fit(&pallet) {
                tracing::debug!("棧板 {} 移往貨櫃 {}", pallet.id, target.id);
                target.add(pallet);
                changed = true;
                continue;
            }

            let integral = self.config.is_integral(pallet.quantity);
            let amount = placeable_amount(target, &pallet, pallet.quantity, integral);
            let split = (pallet.is_atomic() && integral && amount >= 1.0)
                .then(|| pallet.split(amount, eps))
                .flatten();

            let keep = match split {
                Some((part, rem)) if target.can_fit(&part) => {
                    tracing::debug!("棧板 {} 拆出 {} 補滿貨櫃 {}", pallet.id, amount, target.id);
                    target.add(part);
                    changed = true;
                    rem
                }
                _ => pallet,
            };
            if let Some(source) = yard.get_mut(donor) {
                source.add(keep);
            }
        }
        changed
    }

    /// 注入：待處理棧板整體最佳適配到同群組貨櫃
    fn inject(&self, yard: &mut ContainerYard, backlog: &mut Vec<Pallet>) -> bool {
        let mut changed = false;
        let mut remaining = Vec::new();
        for pallet in backlog.drain(..) {
            let group = pallet.group.clone();
            match yard.place_best_fit(pallet, |c| !c.sealed && c.main_group == group) {
                Ok(_) => changed = true,
                Err(pallet) => remaining.push(pallet),
            }
        }
        *backlog = remaining;
        changed
    }
}
