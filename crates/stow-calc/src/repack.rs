//! 重組：把待處理棧板的成員併入已裝櫃的小數/合併棧板

use stow_core::pallet::count_dominant;
use stow_core::{AllocationConfig, Container, ContainerYard, Pallet};

/// 可併入的位置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraftSlot {
    pub container: usize,
    pub pallet: usize,
    pub merged_quantity: f64,
}

/// 併入後是否仍符合填充上限與主導成員規則
pub fn is_graft_eligible(target: &Pallet, addition: &Pallet, config: &AllocationConfig) -> bool {
    let eps = config.epsilon;
    if target.quantity >= 1.0 - eps {
        return false;
    }
    if target.quantity + addition.quantity > config.fill_limit + eps {
        return false;
    }
    let quantities = target
        .leaves()
        .iter()
        .chain(addition.leaves())
        .map(|p| p.quantity);
    count_dominant(quantities, config.dominant_threshold, eps) <= 1
}

/// 尋找最適合的併入位置：合併後數量最接近填充上限者優先，同值取最先遇到的
pub fn find_graft_slot(
    yard: &ContainerYard,
    addition: &Pallet,
    config: &AllocationConfig,
    container_filter: impl Fn(&Container) -> bool,
    target_filter: impl Fn(&Pallet) -> bool,
) -> Option<GraftSlot> {
    let mut best: Option<GraftSlot> = None;

    for container_index in yard.best_fit_order(container_filter) {
        let Some(container) = yard.get(container_index) else {
            continue;
        };
        for (pallet_index, target) in container.pallets().iter().enumerate() {
            if !target_filter(target)
                || !is_graft_eligible(target, addition, config)
                || !container.can_absorb_at(pallet_index, addition)
            {
                continue;
            }
            let merged_quantity = target.quantity + addition.quantity;
            if best.map_or(true, |b| merged_quantity > b.merged_quantity + config.epsilon) {
                best = Some(GraftSlot {
                    container: container_index,
                    pallet: pallet_index,
                    merged_quantity,
                });
            }
        }
    }

    best
}

/// 把單一棧板併入最適合的位置；找不到時原樣退回
pub fn graft_into(
    yard: &mut ContainerYard,
    addition: Pallet,
    config: &AllocationConfig,
    container_filter: impl Fn(&Container) -> bool,
    target_filter: impl Fn(&Pallet) -> bool,
) -> Result<GraftSlot, Pallet> {
    let slot = find_graft_slot(yard, &addition, config, container_filter, target_filter);
    let Some(slot) = slot else {
        return Err(addition);
    };
    let Some(container) = yard.get_mut(slot.container) else {
        return Err(addition);
    };
    tracing::debug!(
        "棧板 {} 併入貨櫃 {} 的 {}",
        addition.id,
        container.id,
        container.pallets()[slot.pallet].id
    );
    container.graft_at(slot.pallet, addition);
    Ok(slot)
}

/// 全有或全無：棧板的每個成員都要找到位置，否則貨櫃場維持原狀並退回棧板
pub fn graft_all_leaves(
    yard: &mut ContainerYard,
    pallet: Pallet,
    config: &AllocationConfig,
    container_filter: impl Fn(&Container) -> bool,
    target_filter: impl Fn(&Pallet) -> bool,
) -> Result<usize, Pallet> {
    let mut leaves: Vec<Pallet> = pallet.leaves().to_vec();
    leaves.sort_by(|a, b| b.quantity.total_cmp(&a.quantity));

    let outcome = yard.transaction(|draft| {
        let mut grafted = 0;
        for leaf in leaves {
            graft_into(draft, leaf, config, &container_filter, &target_filter).map_err(|_| ())?;
            grafted += 1;
        }
        Ok::<usize, ()>(grafted)
    });

    match outcome {
        Ok(grafted) => Ok(grafted),
        Err(()) => {
            tracing::debug!("棧板 {} 無法全部併入，回復原狀", pallet.id);
            Err(pallet)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stow_core::container::Capacity;

    fn pallet(id: &str, group: &str, quantity: f64) -> Pallet {
        Pallet::new(id, "SKU", "name", group, quantity, 100.0)
    }

    fn yard_with(group: &str, pallets: Vec<Pallet>) -> ContainerYard {
        let mut c = Container::new("C1", group, Capacity::from(&AllocationConfig::default()));
        for p in pallets {
            c.add(p);
        }
        ContainerYard::from_containers(vec![c])
    }

    #[test]
    fn test_eligibility_rules() {
        let config = AllocationConfig::default();

        assert!(is_graft_eligible(&pallet("T", "A", 0.5), &pallet("X", "A", 0.3), &config));
        // 超過 0.9
        assert!(!is_graft_eligible(&pallet("T", "A", 0.5), &pallet("X", "A", 0.45), &config));
        // 兩個主導成員
        assert!(!is_graft_eligible(&pallet("T", "A", 0.3), &pallet("X", "A", 0.55), &config));
        assert!(is_graft_eligible(&pallet("T", "A", 0.5), &pallet("X", "A", 0.1), &config));
        // 整數棧板不是目標
        assert!(!is_graft_eligible(&pallet("T", "A", 1.0), &pallet("X", "A", 0.1), &config));
    }

    #[test]
    fn test_graft_picks_fullest_result() {
        let config = AllocationConfig::default();
        let mut yard = yard_with(
            "A",
            vec![pallet("INT", "A", 5.0), pallet("T1", "A", 0.2), pallet("T2", "A", 0.5)],
        );

        let slot =
            graft_into(&mut yard, pallet("X", "A", 0.3), &config, |_| true, |_| true).unwrap();

        assert_eq!(slot.pallet, 2);
        let merged = &yard.containers()[0].pallets()[2];
        assert!(merged.is_combined);
        assert!((merged.quantity - 0.8).abs() < 1e-9);
        assert_eq!(yard.containers()[0].total_logical_lines(), 7);
    }

    #[test]
    fn test_graft_all_leaves_rolls_back() {
        let config = AllocationConfig::default();
        let mut yard = yard_with("A", vec![pallet("T1", "A", 0.5)]);
        let before = yard.containers()[0].clone();

        let members = vec![pallet("L1", "A", 0.3), pallet("L2", "A", 0.2)];
        let composite = Pallet::combine("COMBINED-9", members, 1e-6);
        let rejected =
            graft_all_leaves(&mut yard, composite, &config, |_| true, |_| true).unwrap_err();

        // L1 可併入，L2 之後超過上限，整體回復
        assert_eq!(rejected.id, "COMBINED-9");
        assert_eq!(yard.containers()[0], before);
    }

    #[test]
    fn test_graft_all_leaves_commits() {
        let config = AllocationConfig::default();
        let mut yard = yard_with("A", vec![pallet("T1", "A", 0.5), pallet("T2", "A", 0.4)]);

        let members = vec![pallet("L1", "A", 0.3), pallet("L2", "A", 0.2)];
        let composite = Pallet::combine("COMBINED-9", members, 1e-6);
        let grafted = graft_all_leaves(&mut yard, composite, &config, |_| true, |_| true).unwrap();

        assert_eq!(grafted, 2);
        assert!((yard.total_quantity() - 1.4).abs() < 1e-9);
        assert_eq!(yard.containers()[0].len(), 2);
    }
}
