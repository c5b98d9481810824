//! 主要裝櫃：整數棧板（含機會成本替代）與小數/合併棧板

use std::collections::BTreeSet;

use stow_core::{AllocationSession, Container, ContainerYard, Pallet};

use crate::policy::SubstitutionPolicy;

/// 主要裝櫃器
pub struct PrimaryPacker<'a> {
    policy: &'a dyn SubstitutionPolicy,
}

impl<'a> PrimaryPacker<'a> {
    pub fn new(policy: &'a dyn SubstitutionPolicy) -> Self {
        Self { policy }
    }

    /// 裝入整數棧板，回傳整數待處理清單
    ///
    /// 沒有貨櫃的群組先各建一個空貨櫃，之後不再建立新櫃。
    #[tracing::instrument(skip_all, fields(pallets = pallets.len(), policy = self.policy.name()))]
    pub fn pack_integer(
        &self,
        pallets: Vec<Pallet>,
        yard: &mut ContainerYard,
        session: &mut AllocationSession,
    ) -> Vec<Pallet> {
        let groups: BTreeSet<&str> = pallets.iter().map(|p| p.group.as_str()).collect();
        for group in groups {
            if !yard.has_group(group) {
                let container = session.new_container(group);
                tracing::debug!("為群組 {} 建立貨櫃 {}", group, container.id);
                yard.push(container);
            }
        }

        let backlog = self.fill(pallets, yard, |_| true);
        tracing::info!("整數棧板裝櫃完成：待處理 {} 個", backlog.len());
        backlog
    }

    /// 對符合條件的貨櫃執行「放底 + 機會成本」裝櫃
    ///
    /// 每個空貨櫃先放入同群組最大的棧板；其餘棧板由大到小選擇剩餘數量最少且放得下的貨櫃。
    pub fn fill(
        &self,
        pallets: Vec<Pallet>,
        yard: &mut ContainerYard,
        allowed: impl Fn(&Container) -> bool,
    ) -> Vec<Pallet> {
        let mut pending = pallets;
        pending.sort_by(|a, b| b.quantity.total_cmp(&a.quantity));
        let mut backlog = Vec::new();

        let empty: Vec<usize> = (0..yard.len())
            .filter(|i| yard.get(*i).is_some_and(|c| c.is_empty() && allowed(c)))
            .collect();
        for index in empty {
            let Some(container) = yard.get_mut(index) else {
                continue;
            };
            if let Some(pos) = pending.iter().position(|p| p.group == container.main_group) {
                let base = pending.remove(pos);
                tracing::debug!("貨櫃 {} 放底棧板 {}", container.id, base.id);
                container.add(base);
            }
        }

        while !pending.is_empty() {
            let current = pending.remove(0);
            let order = yard.best_fit_order(|c| c.main_group == current.group && allowed(c));
            let target = order
                .into_iter()
                .find(|i| yard.get(*i).is_some_and(|c| c.can_fit(&current)));

            let Some(index) = target else {
                tracing::debug!("棧板 {} 無處可放，進入待處理", current.id);
                backlog.push(current);
                continue;
            };
            let Some(container) = yard.get_mut(index) else {
                backlog.push(current);
                continue;
            };

            match self.policy.alternative(&current, container, &pending) {
                Some(mut chosen) => {
                    tracing::debug!(
                        "以 {} 個較輕棧板取代 {}（貨櫃 {}）",
                        chosen.len(),
                        current.id,
                        container.id
                    );
                    chosen.sort_unstable_by(|a, b| b.cmp(a));
                    let mut group: Vec<Pallet> =
                        chosen.into_iter().map(|i| pending.remove(i)).collect();
                    group.reverse();
                    for pallet in group {
                        container.add(pallet);
                    }
                    backlog.push(current);
                }
                None => container.add(current),
            }
        }

        backlog
    }

    /// 裝入小數/合併棧板：同群組最佳適配，不拆分
    #[tracing::instrument(skip_all, fields(pallets = pallets.len()))]
    pub fn pack_fractional(pallets: Vec<Pallet>, yard: &mut ContainerYard) -> Vec<Pallet> {
        let mut pending = pallets;
        pending.sort_by(|a, b| b.quantity.total_cmp(&a.quantity));

        let mut backlog = Vec::new();
        for pallet in pending {
            let group = pallet.group.clone();
            if let Err(pallet) = yard.place_best_fit(pallet, |c| c.main_group == group) {
                backlog.push(pallet);
            }
        }

        tracing::info!("小數棧板裝櫃完成：待處理 {} 個", backlog.len());
        backlog
    }
}
