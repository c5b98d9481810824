//! 機會成本替代策略
//!
//! 主要裝櫃時，可用一組較小的同群組棧板取代目前的大棧板。
//! 取代規則以 trait 抽象，預設為 [`LighterGroupPolicy`]。

use stow_core::{Container, Pallet, SubstitutionRule};

/// 替代策略
pub trait SubstitutionPolicy: Send + Sync {
    /// 策略名稱
    fn name(&self) -> &'static str;

    /// 為 `current` 找出替代組合
    ///
    /// 回傳 `pending` 中被選中的位置（依加入順序）；不替代時回傳 `None`。
    fn alternative(
        &self,
        current: &Pallet,
        container: &Container,
        pending: &[Pallet],
    ) -> Option<Vec<usize>>;
}

/// 依配置規則建立策略
pub fn policy_for(rule: SubstitutionRule) -> Box<dyn SubstitutionPolicy> {
    match rule {
        SubstitutionRule::LighterGroup => Box::new(LighterGroupPolicy::default()),
        SubstitutionRule::Disabled => Box::new(DisabledPolicy),
    }
}

/// 由輕到重累加同群組棧板，總重不超過目前棧板重量，且至少兩個成員才替代
#[derive(Debug, Clone, Copy)]
pub struct LighterGroupPolicy {
    pub min_members: usize,
}

impl Default for LighterGroupPolicy {
    fn default() -> Self {
        Self { min_members: 2 }
    }
}

impl SubstitutionPolicy for LighterGroupPolicy {
    fn name(&self) -> &'static str {
        "lighter_group"
    }

    fn alternative(
        &self,
        current: &Pallet,
        container: &Container,
        pending: &[Pallet],
    ) -> Option<Vec<usize>> {
        let eps = container.capacity().epsilon;

        let mut candidates: Vec<usize> = pending
            .iter()
            .enumerate()
            .filter(|(_, p)| p.group == current.group)
            .map(|(i, _)| i)
            .collect();
        candidates.sort_by(|a, b| pending[*a].total_weight.total_cmp(&pending[*b].total_weight));

        let mut chosen = Vec::new();
        let mut group_weight = 0.0;
        let mut residual_quantity = container.remaining_quantity();
        let mut residual_weight = container.remaining_weight();
        let mut residual_lines = container.remaining_logical_lines();

        for index in candidates {
            let candidate = &pending[index];
            if group_weight + candidate.total_weight > current.total_weight + eps {
                continue;
            }
            let lines = candidate.logical_line_count(eps);
            if residual_quantity >= candidate.quantity - eps
                && residual_weight >= candidate.total_weight - eps
                && residual_lines >= lines
            {
                group_weight += candidate.total_weight;
                residual_quantity -= candidate.quantity;
                residual_weight -= candidate.total_weight;
                residual_lines -= lines;
                chosen.push(index);
            }
        }

        (chosen.len() >= self.min_members).then_some(chosen)
    }
}

/// 不替代，純最佳適配
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledPolicy;

impl SubstitutionPolicy for DisabledPolicy {
    fn name(&self) -> &'static str {
        "disabled"
    }

    fn alternative(&self, _: &Pallet, _: &Container, _: &[Pallet]) -> Option<Vec<usize>> {
        None
    }
}
