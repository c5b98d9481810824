//! 拆解：超限棧板均分與整數/小數拆分

use stow_core::{AllocationConfig, AllocationSession, Container, Pallet, Result, StowError};

/// 拆解結果
#[derive(Debug, Clone, Default)]
pub struct Decomposition {
    /// 超限棧板拆出的封存貨櫃（每櫃一個棧板，不參與後續階段）
    pub sealed: Vec<Container>,

    /// 整數部分
    pub integer: Vec<Pallet>,

    /// 小數部分
    pub fractional: Vec<Pallet>,
}

/// 拆解器
pub struct Decomposer;

impl Decomposer {
    /// 拆解所有輸入棧板
    #[tracing::instrument(skip_all, fields(pallets = pallets.len()))]
    pub fn decompose(
        pallets: Vec<Pallet>,
        session: &mut AllocationSession,
    ) -> Result<Decomposition> {
        let config = session.config().clone();
        let mut decomposition = Decomposition::default();

        for pallet in pallets {
            if Self::is_oversized(&pallet, &config) {
                let (pieces, fraction) = Self::split_oversized(&pallet, &config)?;
                tracing::debug!("超限棧板 {} 均分為 {} 份", pallet.id, pieces.len());

                for piece in pieces {
                    let mut container = session.new_container(piece.group.clone());
                    container.sealed = true;
                    container.add(piece);
                    decomposition.sealed.push(container);
                }
                decomposition.fractional.extend(fraction);
                continue;
            }

            let (integer, fraction) = Self::split_integer_fraction(&pallet, &config);
            decomposition.integer.extend(integer);
            decomposition.fractional.extend(fraction);
        }

        tracing::info!(
            "拆解完成：封存貨櫃 {} 個，整數棧板 {} 個，小數棧板 {} 個",
            decomposition.sealed.len(),
            decomposition.integer.len(),
            decomposition.fractional.len()
        );

        Ok(decomposition)
    }

    /// 是否超出單櫃容量
    pub fn is_oversized(pallet: &Pallet, config: &AllocationConfig) -> bool {
        pallet.quantity > config.max_units + config.epsilon
            || pallet.total_weight > config.max_weight + config.epsilon
    }

    /// 均分超限棧板
    ///
    /// 小數餘量先分離為 `{id}-frac`，整數部分分為
    /// `n = ceil(max(q / MAX_UNITS, w / MAX_WEIGHT))` 份，前 `q % n` 份各多一個單位。
    pub fn split_oversized(
        pallet: &Pallet,
        config: &AllocationConfig,
    ) -> Result<(Vec<Pallet>, Option<Pallet>)> {
        let eps = config.epsilon;
        let (whole, fraction) = Self::whole_and_fraction(pallet.quantity, config);

        let fraction = (fraction > eps).then(|| {
            let mut frac = Self::derive_part(pallet, format!("{}-frac", pallet.id), fraction);
            frac.is_split = true;
            frac
        });
        if let Some(frac) = &fraction {
            Self::ensure_within_capacity(frac, config)?;
        }

        let whole_weight = whole * pallet.weight_per_unit;
        let ratio = (whole / config.max_units).max(whole_weight / config.max_weight);
        let count = (ratio - eps).ceil().max(1.0) as u64;
        let units = whole.round() as u64;
        let base = units / count;
        let extra = units % count;

        let mut pieces = Vec::with_capacity(count as usize);
        for i in 0..count {
            let quantity = base + u64::from(i < extra);
            if quantity == 0 {
                continue;
            }
            let id = format!("{}-part{}", pallet.id, i + 1);
            let mut piece = Self::derive_part(pallet, id, quantity as f64);
            piece.is_split = true;
            Self::ensure_within_capacity(&piece, config)?;
            pieces.push(piece);
        }

        Ok((pieces, fraction))
    }

    /// 整數/小數拆分，小於容差的一側省略
    pub fn split_integer_fraction(
        pallet: &Pallet,
        config: &AllocationConfig,
    ) -> (Option<Pallet>, Option<Pallet>) {
        let eps = config.epsilon;
        let (whole, fraction) = Self::whole_and_fraction(pallet.quantity, config);

        let integer = (whole > eps)
            .then(|| Self::derive_part(pallet, format!("{}-int", pallet.id), whole));
        let fractional = (fraction > eps)
            .then(|| Self::derive_part(pallet, format!("{}-frac", pallet.id), fraction));

        (integer, fractional)
    }

    /// 整數部分與小數部分；容差內的整數視為整數
    fn whole_and_fraction(quantity: f64, config: &AllocationConfig) -> (f64, f64) {
        if config.is_integral(quantity) {
            (quantity.round(), 0.0)
        } else {
            let whole = quantity.floor();
            (whole, quantity - whole)
        }
    }

    fn derive_part(source: &Pallet, id: String, quantity: f64) -> Pallet {
        let mut part = Pallet::new(
            id,
            source.product_code.clone(),
            source.product_name.clone(),
            source.group.clone(),
            quantity,
            source.weight_per_unit,
        );
        part.split_from = Some(source.id.clone());
        part
    }

    fn ensure_within_capacity(piece: &Pallet, config: &AllocationConfig) -> Result<()> {
        if Self::is_oversized(piece, config) {
            return Err(StowError::OversizedPiece {
                pallet_id: piece.id.clone(),
                quantity: piece.quantity,
                weight: piece.total_weight,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn pallet(id: &str, quantity: f64, wpu: f64) -> Pallet {
        Pallet::new(id, "SKU", "name", "A", quantity, wpu)
    }

    #[test]
    fn test_oversize_by_quantity() {
        let config = AllocationConfig::default();
        let (pieces, fraction) =
            Decomposer::split_oversized(&pallet("P1", 25.0, 100.0), &config).unwrap();

        assert!(fraction.is_none());
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].id, "P1-part1");
        assert_eq!(pieces[0].quantity, 13.0);
        assert_eq!(pieces[1].quantity, 12.0);
        assert_eq!(pieces[0].total_weight, 1300.0);
        assert_eq!(pieces[1].total_weight, 1200.0);
        assert!(pieces.iter().all(|p| p.is_split));
    }

    #[test]
    fn test_oversize_by_weight() {
        let config = AllocationConfig::default();
        let (pieces, _) =
            Decomposer::split_oversized(&pallet("P1", 10.0, 5_000.0), &config).unwrap();

        // 50000 / 24000 → 3 份
        assert_eq!(pieces.len(), 3);
        let total: f64 = pieces.iter().map(|p| p.quantity).sum();
        assert_eq!(total, 10.0);
        assert!(pieces.iter().all(|p| p.total_weight <= 24_000.0));
    }

    #[test]
    fn test_oversize_detaches_fraction() {
        let config = AllocationConfig::default();
        let (pieces, fraction) =
            Decomposer::split_oversized(&pallet("P1", 30.5, 10.0), &config).unwrap();

        let fraction = fraction.unwrap();
        assert_eq!(fraction.id, "P1-frac");
        assert!((fraction.quantity - 0.5).abs() < 1e-9);
        let total: f64 = pieces.iter().map(|p| p.quantity).sum();
        assert_eq!(total, 30.0);
    }

    #[test]
    fn test_oversize_piece_still_too_heavy() {
        let config = AllocationConfig::default();
        let result = Decomposer::split_oversized(&pallet("P1", 2.0, 30_000.0), &config);

        assert!(matches!(result, Err(StowError::OversizedPiece { .. })));
    }

    #[rstest]
    #[case(4.7, Some(4.0), Some(0.7))]
    #[case(3.0, Some(3.0), None)]
    #[case(0.4, None, Some(0.4))]
    #[case(2.9999999, Some(3.0), None)]
    fn test_split_integer_fraction(
        #[case] quantity: f64,
        #[case] integer: Option<f64>,
        #[case] fraction: Option<f64>,
    ) {
        let config = AllocationConfig::default();
        let (int_part, frac_part) =
            Decomposer::split_integer_fraction(&pallet("P1", quantity, 10.0), &config);

        assert_eq!(int_part.as_ref().map(|p| p.quantity), integer);
        match (frac_part, fraction) {
            (Some(p), Some(expected)) => {
                assert!((p.quantity - expected).abs() < 1e-9);
                assert_eq!(p.id, "P1-frac");
                assert_eq!(p.split_from.as_deref(), Some("P1"));
            }
            (None, None) => {}
            (actual, expected) => panic!("unexpected fraction {:?} vs {:?}", actual, expected),
        }
        if let Some(p) = int_part {
            assert_eq!(p.id, "P1-int");
        }
    }

    #[test]
    fn test_decompose_seals_oversize_containers_first() {
        let mut session = AllocationSession::new(AllocationConfig::default());
        let decomposition = Decomposer::decompose(
            vec![pallet("P1", 25.0, 100.0), pallet("P2", 3.5, 100.0)],
            &mut session,
        )
        .unwrap();

        assert_eq!(decomposition.sealed.len(), 2);
        assert_eq!(decomposition.sealed[0].id, "C1");
        assert_eq!(decomposition.sealed[1].id, "C2");
        assert!(decomposition.sealed.iter().all(|c| c.sealed && c.len() == 1));
        assert_eq!(decomposition.integer.len(), 1);
        assert_eq!(decomposition.fractional.len(), 1);
    }
}
