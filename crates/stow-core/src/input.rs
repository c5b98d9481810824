//! 棧板輸入與驗證

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::Pallet;

/// 外部提供的棧板資料列
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PalletInput {
    pub id: String,
    pub product_code: String,
    #[serde(default)]
    pub product_name: String,
    pub group: String,
    pub quantity: f64,
    pub weight_per_unit: f64,
}

impl PalletInput {
    pub fn new(
        id: impl Into<String>,
        product_code: impl Into<String>,
        group: impl Into<String>,
        quantity: f64,
        weight_per_unit: f64,
    ) -> Self {
        Self {
            id: id.into(),
            product_code: product_code.into(),
            product_name: String::new(),
            group: group.into(),
            quantity,
            weight_per_unit,
        }
    }

    /// 建構器模式：設置產品名稱
    pub fn with_product_name(mut self, name: impl Into<String>) -> Self {
        self.product_name = name.into();
        self
    }
}

/// 拒收原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// 數量不為正
    NonPositiveQuantity,
    /// 單位重量不為正
    NonPositiveWeight,
    /// 數值為 NaN 或無限大
    NonFiniteValue,
    /// ID 重複
    DuplicateId,
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::NonPositiveQuantity => "non_positive_quantity",
            RejectReason::NonPositiveWeight => "non_positive_weight",
            RejectReason::NonFiniteValue => "non_finite_value",
            RejectReason::DuplicateId => "duplicate_id",
        }
    }
}

/// 被拒收的資料列
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedPallet {
    pub id: String,
    pub reason: RejectReason,
}

/// 驗證輸入並轉換為原子棧板
///
/// 無效資料列不會中止流程，而是附上原因回傳。
pub fn ingest(inputs: &[PalletInput], epsilon: f64) -> (Vec<Pallet>, Vec<RejectedPallet>) {
    let mut pallets = Vec::with_capacity(inputs.len());
    let mut rejected = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for input in inputs {
        let reason = if !input.quantity.is_finite() || !input.weight_per_unit.is_finite() {
            Some(RejectReason::NonFiniteValue)
        } else if input.quantity < epsilon {
            Some(RejectReason::NonPositiveQuantity)
        } else if input.weight_per_unit <= 0.0 {
            Some(RejectReason::NonPositiveWeight)
        } else if seen.contains(input.id.as_str()) {
            Some(RejectReason::DuplicateId)
        } else {
            None
        };

        match reason {
            Some(reason) => {
                tracing::debug!("拒收棧板 {}: {}", input.id, reason.code());
                rejected.push(RejectedPallet {
                    id: input.id.clone(),
                    reason,
                });
            }
            None => {
                seen.insert(input.id.as_str());
                pallets.push(Pallet::new(
                    input.id.clone(),
                    input.product_code.clone(),
                    input.product_name.clone(),
                    input.group.clone(),
                    input.quantity,
                    input.weight_per_unit,
                ));
            }
        }
    }

    (pallets, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, 10.0, RejectReason::NonPositiveQuantity)]
    #[case(-1.0, 10.0, RejectReason::NonPositiveQuantity)]
    #[case(2.0, 0.0, RejectReason::NonPositiveWeight)]
    #[case(f64::NAN, 10.0, RejectReason::NonFiniteValue)]
    #[case(2.0, f64::INFINITY, RejectReason::NonFiniteValue)]
    fn test_invalid_rows_rejected(
        #[case] quantity: f64,
        #[case] weight: f64,
        #[case] expected: RejectReason,
    ) {
        let inputs = vec![PalletInput::new("P1", "CODE", "A", quantity, weight)];
        let (pallets, rejected) = ingest(&inputs, 1e-6);

        assert!(pallets.is_empty());
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].reason, expected);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let inputs = vec![
            PalletInput::new("P1", "CODE", "A", 2.0, 10.0),
            PalletInput::new("P1", "CODE", "A", 3.0, 10.0),
        ];
        let (pallets, rejected) = ingest(&inputs, 1e-6);

        assert_eq!(pallets.len(), 1);
        assert_eq!(pallets[0].quantity, 2.0);
        assert_eq!(rejected[0].reason, RejectReason::DuplicateId);
    }

    #[test]
    fn test_valid_row_becomes_atomic_pallet() {
        let inputs =
            vec![PalletInput::new("P1", "SKU-1", "A", 2.5, 100.0).with_product_name("Widget")];
        let (pallets, rejected) = ingest(&inputs, 1e-6);

        assert!(rejected.is_empty());
        assert!(pallets[0].is_atomic());
        assert_eq!(pallets[0].product_name, "Widget");
        assert_eq!(pallets[0].total_weight, 250.0);
    }

    #[test]
    fn test_input_from_json() {
        let json = r#"[
            {"id":"P1","product_code":"SKU","group":"A","quantity":1.5,"weight_per_unit":20.0}
        ]"#;
        let inputs: Vec<PalletInput> = serde_json::from_str(json).unwrap();

        assert_eq!(inputs[0].product_name, "");
        assert_eq!(inputs[0].quantity, 1.5);
    }
}
