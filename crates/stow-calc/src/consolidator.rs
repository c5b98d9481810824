//! 小數棧板合併

use std::collections::BTreeMap;

use rayon::prelude::*;
use stow_core::{AllocationConfig, AllocationSession, Pallet};

/// 合併結果
#[derive(Debug, Clone, Default)]
pub struct Consolidation {
    /// 合併棧板
    pub composites: Vec<Pallet>,

    /// 未能合併的單一棧板
    pub singles: Vec<Pallet>,
}

impl Consolidation {
    /// 所有待裝櫃的棧板，數量由大到小
    pub fn into_pallets(self) -> Vec<Pallet> {
        let mut pallets = self.composites;
        pallets.extend(self.singles);
        pallets.sort_by(|a, b| b.quantity.total_cmp(&a.quantity));
        pallets
    }
}

/// 合併器
pub struct Consolidator;

impl Consolidator {
    /// 依群組合併小數棧板
    ///
    /// 各群組獨立計算（可平行），合併棧板ID之後再依群組排序依序發放。
    #[tracing::instrument(skip_all, fields(pallets = fractional.len()))]
    pub fn consolidate(fractional: Vec<Pallet>, session: &mut AllocationSession) -> Consolidation {
        let config = session.config().clone();

        let mut by_group: BTreeMap<String, Vec<Pallet>> = BTreeMap::new();
        for pallet in fractional {
            by_group.entry(pallet.group.clone()).or_default().push(pallet);
        }

        let per_group: Vec<(Vec<Vec<Pallet>>, Vec<Pallet>)> = by_group
            .into_iter()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|(_, pallets)| Self::consolidate_group(pallets, &config))
            .collect();

        let mut consolidation = Consolidation::default();
        for (combinations, leftovers) in per_group {
            for members in combinations {
                let id = session.next_combination_id();
                tracing::debug!("合併 {} 個小數棧板為 {}", members.len(), id);
                consolidation
                    .composites
                    .push(Pallet::combine(id, members, config.epsilon));
            }
            consolidation.singles.extend(leftovers);
        }

        tracing::info!(
            "合併完成：合併棧板 {} 個，剩餘單一棧板 {} 個",
            consolidation.composites.len(),
            consolidation.singles.len()
        );

        consolidation
    }

    /// 單一群組：主要一輪加上對剩餘棧板的再一輪
    fn consolidate_group(
        pallets: Vec<Pallet>,
        config: &AllocationConfig,
    ) -> (Vec<Vec<Pallet>>, Vec<Pallet>) {
        let (mut combinations, leftovers) = Self::greedy_pass(pallets, config);
        let (rerun, leftovers) = Self::greedy_pass(leftovers, config);
        combinations.extend(rerun);
        (combinations, leftovers)
    }

    /// 一輪貪婪合併：取最大者為基底，由大到小加入不超過上限的候選
    fn greedy_pass(
        mut pallets: Vec<Pallet>,
        config: &AllocationConfig,
    ) -> (Vec<Vec<Pallet>>, Vec<Pallet>) {
        let eps = config.epsilon;
        pallets.sort_by(|a, b| b.quantity.total_cmp(&a.quantity));

        let mut combinations = Vec::new();
        let mut leftovers = Vec::new();
        let mut available = pallets;

        while !available.is_empty() {
            let base = available.remove(0);
            let limit = base.quantity.floor() + config.fill_limit + eps;
            let mut sum = base.quantity;
            let mut dominant = usize::from(Self::is_dominant(&base, config));
            let mut group = vec![base];

            let mut index = 0;
            while index < available.len() {
                let candidate = &available[index];
                let candidate_dominant = Self::is_dominant(candidate, config);
                if sum + candidate.quantity <= limit
                    && dominant + usize::from(candidate_dominant) <= 1
                {
                    sum += candidate.quantity;
                    dominant += usize::from(candidate_dominant);
                    group.push(available.remove(index));
                } else {
                    index += 1;
                }
            }

            if group.len() > 1 {
                combinations.push(group);
            } else {
                leftovers.extend(group);
            }
        }

        (combinations, leftovers)
    }

    fn is_dominant(pallet: &Pallet, config: &AllocationConfig) -> bool {
        pallet.quantity >= config.dominant_threshold - config.epsilon
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fraction(id: &str, group: &str, quantity: f64) -> Pallet {
        Pallet::new(id, format!("{}-SKU", id), "name", group, quantity, 100.0)
    }

    fn session() -> AllocationSession {
        AllocationSession::new(AllocationConfig::default())
    }

    #[test]
    fn test_two_fractions_consolidate() {
        let result = Consolidator::consolidate(
            vec![fraction("F1", "A", 0.3), fraction("F2", "A", 0.5)],
            &mut session(),
        );

        assert_eq!(result.composites.len(), 1);
        assert!(result.singles.is_empty());

        let combined = &result.composites[0];
        assert_eq!(combined.id, "COMBINED-1");
        assert!((combined.quantity - 0.8).abs() < 1e-9);
        assert_eq!(combined.product_code, "F2-SKU");
        assert_eq!(combined.dominant_count(0.5, 1e-6), 1);
    }

    #[test]
    fn test_two_dominant_fractions_stay_apart() {
        let result = Consolidator::consolidate(
            vec![fraction("F1", "A", 0.6), fraction("F2", "A", 0.6)],
            &mut session(),
        );

        assert!(result.composites.is_empty());
        assert_eq!(result.singles.len(), 2);
    }

    #[test]
    fn test_groups_never_mix() {
        let result = Consolidator::consolidate(
            vec![fraction("F1", "B", 0.3), fraction("F2", "A", 0.2), fraction("F3", "B", 0.2)],
            &mut session(),
        );

        assert_eq!(result.composites.len(), 1);
        assert_eq!(result.composites[0].group, "B");
        assert_eq!(result.singles.len(), 1);
        assert_eq!(result.singles[0].id, "F2");
    }

    #[test]
    fn test_fill_limit_respected() {
        let result = Consolidator::consolidate(
            vec![
                fraction("F1", "A", 0.45),
                fraction("F2", "A", 0.4),
                fraction("F3", "A", 0.3),
                fraction("F4", "A", 0.15),
            ],
            &mut session(),
        );

        // 0.45 + 0.4 = 0.85，0.3 與 0.15 另成一組
        assert_eq!(result.composites.len(), 2);
        assert!((result.composites[0].quantity - 0.85).abs() < 1e-9);
        assert!((result.composites[1].quantity - 0.45).abs() < 1e-9);
        assert_eq!(result.composites[1].id, "COMBINED-2");
    }

    proptest! {
        #[test]
        fn composites_respect_fill_and_dominant_rules(
            quantities in proptest::collection::vec(0.01f64..0.99, 1..30),
        ) {
            let pallets: Vec<Pallet> = quantities
                .iter()
                .enumerate()
                .map(|(i, q)| fraction(&format!("F{}", i), if i % 2 == 0 { "A" } else { "B" }, *q))
                .collect();
            let total: f64 = quantities.iter().sum();

            let result = Consolidator::consolidate(pallets, &mut session());

            for composite in &result.composites {
                prop_assert!(composite.quantity <= 0.9 + 1e-6);
                prop_assert!(composite.dominant_count(0.5, 1e-6) <= 1);
                prop_assert!(composite.component_count() >= 2);
                let members: f64 = composite.leaves().iter().map(|p| p.quantity).sum();
                prop_assert!((members - composite.quantity).abs() < 1e-9);
            }

            let out: f64 = result.into_pallets().iter().map(|p| p.quantity).sum();
            prop_assert!((out - total).abs() < 1e-9);
        }
    }
}
