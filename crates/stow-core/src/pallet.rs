//! 棧板模型
//!
//! 棧板可以是原子棧板或合併棧板。合併棧板以擁有所有權的方式持有其成員
//! （`components`），成員一律為原子節點；拆分與合併只會產生新節點，
//! 不會出現指向祖先的引用。

use serde::{Deserialize, Serialize};

/// 棧板（原子或合併）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pallet {
    /// 棧板ID
    pub id: String,

    /// 產品代碼
    pub product_code: String,

    /// 產品名稱
    pub product_name: String,

    /// 所屬群組（公司）
    pub group: String,

    /// 數量（可為小數）
    pub quantity: f64,

    /// 單位重量
    pub weight_per_unit: f64,

    /// 總重量 = 數量 × 單位重量（合併棧板為成員加總）
    pub total_weight: f64,

    /// 是否為合併棧板
    pub is_combined: bool,

    /// 是否由拆分產生
    pub is_split: bool,

    /// 是否跨群組裝櫃
    pub is_cross_shipped: bool,

    /// 成員棧板（原子棧板為空，見 [`Pallet::leaves`]）
    components: Vec<Pallet>,

    /// 拆分來源ID（僅為識別連結）
    pub split_from: Option<String>,

    /// 拆分兄弟ID（僅為識別連結）
    pub sibling: Option<String>,
}

impl Pallet {
    /// 創建原子棧板
    pub fn new(
        id: impl Into<String>,
        product_code: impl Into<String>,
        product_name: impl Into<String>,
        group: impl Into<String>,
        quantity: f64,
        weight_per_unit: f64,
    ) -> Self {
        Self {
            id: id.into(),
            product_code: product_code.into(),
            product_name: product_name.into(),
            group: group.into(),
            quantity,
            weight_per_unit,
            total_weight: quantity * weight_per_unit,
            is_combined: false,
            is_split: false,
            is_cross_shipped: false,
            components: Vec::new(),
            split_from: None,
            sibling: None,
        }
    }

    /// 由兩個以上的棧板創建合併棧板
    ///
    /// 產品代碼與群組取自數量最大的成員；成員若本身為合併棧板會被攤平。
    pub fn combine(id: impl Into<String>, members: Vec<Pallet>, epsilon: f64) -> Self {
        let leaves: Vec<Pallet> = members.into_iter().flat_map(Pallet::into_leaves).collect();

        let main = leaves
            .iter()
            .fold(None::<&Pallet>, |best, p| match best {
                Some(b) if b.quantity >= p.quantity => Some(b),
                _ => Some(p),
            });
        let (product_code, group) = main
            .map(|p| (p.product_code.clone(), p.group.clone()))
            .unwrap_or_default();

        let mut combined = Self {
            id: id.into(),
            product_code,
            product_name: String::new(),
            group,
            quantity: 0.0,
            weight_per_unit: 0.0,
            total_weight: 0.0,
            is_combined: true,
            is_split: false,
            is_cross_shipped: false,
            components: leaves,
            split_from: None,
            sibling: None,
        };
        combined.recompute(epsilon);
        combined
    }

    /// 可變成員列表（原子棧板為空）
    pub(crate) fn components_mut(&mut self) -> &mut Vec<Pallet> {
        &mut self.components
    }

    /// 是否為原子棧板
    pub fn is_atomic(&self) -> bool {
        self.components.is_empty()
    }

    /// 成員列表：原子棧板回傳只含自身的列表
    pub fn leaves(&self) -> &[Pallet] {
        if self.components.is_empty() {
            std::slice::from_ref(self)
        } else {
            &self.components
        }
    }

    /// 取出成員（原子棧板回傳自身）
    pub fn into_leaves(self) -> Vec<Pallet> {
        if self.components.is_empty() {
            vec![self]
        } else {
            self.components
        }
    }

    /// 成員數量
    pub fn component_count(&self) -> usize {
        self.leaves().len()
    }

    /// 邏輯行數：整數部分 + 有小數餘量時再加一行
    pub fn logical_line_count(&self, epsilon: f64) -> u32 {
        logical_lines(self.quantity, epsilon)
    }

    /// 成員中數量達到主導門檻的個數
    pub fn dominant_count(&self, threshold: f64, epsilon: f64) -> usize {
        count_dominant(self.leaves().iter().map(|p| p.quantity), threshold, epsilon)
    }

    /// 重新計算數量與重量
    ///
    /// 合併棧板的數量、重量一律由成員加總；成員跨越多個群組時，
    /// 群組標記改為排序後以 `+` 串接的群組名稱。
    pub fn recompute(&mut self, epsilon: f64) {
        if self.components.is_empty() {
            self.total_weight = self.quantity * self.weight_per_unit;
            return;
        }

        self.quantity = self.components.iter().map(|p| p.quantity).sum();
        self.total_weight = self.components.iter().map(|p| p.total_weight).sum();
        self.weight_per_unit = if self.quantity > epsilon {
            self.total_weight / self.quantity
        } else {
            0.0
        };

        let mut groups: Vec<&str> = self.components.iter().map(|p| p.group.as_str()).collect();
        groups.sort_unstable();
        groups.dedup();
        if groups.len() > 1 {
            self.group = groups.join("+");
        }
        self.product_name = format!("COMBINED ({} items)", self.components.len());
    }

    /// 是否帶有多群組標記（如 `A+B`）
    pub fn is_multi_group(&self) -> bool {
        self.group.contains('+')
    }

    /// 群組是否包含指定群組
    pub fn belongs_to(&self, group: &str) -> bool {
        self.group == group || self.group.split('+').any(|g| g == group)
    }

    /// 將另一個棧板併入本棧板
    ///
    /// 原子棧板會先轉為合併棧板，原本的自身成為第一個成員。
    pub fn graft(&mut self, other: Pallet, epsilon: f64) {
        if self.components.is_empty() {
            let mut original = self.clone();
            original.is_cross_shipped = false;
            self.components.push(original);
            self.is_combined = true;
        }
        self.components.extend(other.into_leaves());
        self.recompute(epsilon);
    }

    /// 拆分棧板
    ///
    /// 回傳 `(part, rem)`：`part` 數量為 `amount`，`rem` 為其餘部分。
    /// 僅在 `ε < amount < quantity − ε` 時有效。
    pub fn split(&self, amount: f64, epsilon: f64) -> Option<(Pallet, Pallet)> {
        if !(amount > epsilon && amount < self.quantity - epsilon) {
            return None;
        }

        let (mut part, mut rem) = if self.components.is_empty() {
            (
                self.derive(format!("{}-part", self.id), amount),
                self.derive(format!("{}-rem", self.id), self.quantity - amount),
            )
        } else {
            let (part_leaves, rem_leaves) = self.distribute_components(amount, epsilon);
            (
                self.derive_composite(format!("{}-part", self.id), part_leaves, epsilon),
                self.derive_composite(format!("{}-rem", self.id), rem_leaves, epsilon),
            )
        };

        part.is_split = true;
        rem.is_split = true;
        part.split_from = Some(self.id.clone());
        rem.split_from = Some(self.id.clone());
        part.sibling = Some(rem.id.clone());
        rem.sibling = Some(part.id.clone());

        Some((part, rem))
    }

    /// 以相同產品資訊創建新的原子棧板
    fn derive(&self, id: String, quantity: f64) -> Pallet {
        Pallet::new(
            id,
            self.product_code.clone(),
            self.product_name.clone(),
            self.group.clone(),
            quantity,
            self.weight_per_unit,
        )
    }

    /// 由一組成員創建拆分後的一側；只剩一個成員時直接回傳該成員
    fn derive_composite(&self, id: String, mut leaves: Vec<Pallet>, epsilon: f64) -> Pallet {
        if leaves.len() == 1 {
            if let Some(only) = leaves.pop() {
                return only;
            }
        }

        let mut side = Pallet {
            id,
            product_code: self.product_code.clone(),
            product_name: self.product_name.clone(),
            group: self.group.clone(),
            quantity: 0.0,
            weight_per_unit: 0.0,
            total_weight: 0.0,
            is_combined: true,
            is_split: false,
            is_cross_shipped: false,
            components: leaves,
            split_from: None,
            sibling: None,
        };
        side.recompute(epsilon);
        side
    }

    /// 分配合併棧板的成員：由大到小放入 `part` 直到滿足數量，
    /// 不足的部分從能補足缺口的最小成員拆出
    fn distribute_components(&self, amount: f64, epsilon: f64) -> (Vec<Pallet>, Vec<Pallet>) {
        let mut ordered: Vec<&Pallet> = self.components.iter().collect();
        ordered.sort_by(|a, b| b.quantity.total_cmp(&a.quantity));

        let mut part = Vec::new();
        let mut rem = Vec::new();
        let mut unassigned = Vec::new();
        let mut needed = amount;

        for leaf in ordered {
            if leaf.quantity <= needed + epsilon {
                needed -= leaf.quantity;
                part.push(leaf.clone());
            } else {
                unassigned.push(leaf);
            }
        }

        if needed > epsilon {
            unassigned.sort_by(|a, b| a.quantity.total_cmp(&b.quantity));
            let boundary = unassigned
                .iter()
                .position(|p| p.quantity > needed - epsilon);
            if let Some(index) = boundary {
                let leaf = unassigned.remove(index);
                match leaf.split(needed, epsilon) {
                    Some((piece, rest)) => {
                        part.push(piece);
                        rem.push(rest);
                    }
                    None => part.push(leaf.clone()),
                }
            }
        }

        rem.extend(unassigned.into_iter().cloned());
        (part, rem)
    }
}

/// 邏輯行數：整數部分 + 有小數餘量時再加一行
pub fn logical_lines(quantity: f64, epsilon: f64) -> u32 {
    if quantity < epsilon {
        return 0;
    }
    let whole = quantity.floor();
    let lines = whole as u32;
    if quantity - whole > epsilon {
        lines + 1
    } else {
        lines
    }
}

/// 計算數量達到主導門檻的成員個數
pub fn count_dominant(
    quantities: impl Iterator<Item = f64>,
    threshold: f64,
    epsilon: f64,
) -> usize {
    quantities.filter(|q| *q >= threshold - epsilon).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    const EPS: f64 = 1e-6;

    fn pallet(id: &str, group: &str, quantity: f64, wpu: f64) -> Pallet {
        Pallet::new(id, format!("{}-CODE", id), format!("{} name", id), group, quantity, wpu)
    }

    #[test]
    fn test_atomic_pallet() {
        let p = pallet("P1", "A", 4.5, 100.0);

        assert!(p.is_atomic());
        assert_eq!(p.total_weight, 450.0);
        assert_eq!(p.leaves().len(), 1);
        assert_eq!(p.leaves()[0].id, "P1");
        assert_eq!(p.logical_line_count(EPS), 5);
    }

    #[rstest]
    #[case(0.0, 0)]
    #[case(0.0000001, 0)]
    #[case(0.9, 1)]
    #[case(4.0, 4)]
    #[case(4.9, 5)]
    #[case(20.0, 20)]
    fn test_logical_lines(#[case] quantity: f64, #[case] expected: u32) {
        assert_eq!(logical_lines(quantity, EPS), expected);
    }

    #[test]
    fn test_split_atomic() {
        let p = pallet("P1", "A", 10.0, 50.0);
        let (part, rem) = p.split(3.0, EPS).unwrap();

        assert_eq!(part.id, "P1-part");
        assert_eq!(rem.id, "P1-rem");
        assert_eq!(part.quantity, 3.0);
        assert_eq!(rem.quantity, 7.0);
        assert_eq!(part.total_weight + rem.total_weight, 500.0);
        assert!(part.is_split && rem.is_split);
        assert_eq!(part.split_from.as_deref(), Some("P1"));
        assert_eq!(part.sibling.as_deref(), Some("P1-rem"));
        assert_eq!(rem.sibling.as_deref(), Some("P1-part"));
    }

    #[rstest]
    #[case(0.0)]
    #[case(0.0000005)]
    #[case(10.0)]
    #[case(12.0)]
    fn test_split_out_of_range(#[case] amount: f64) {
        let p = pallet("P1", "A", 10.0, 50.0);
        assert!(p.split(amount, EPS).is_none());
    }

    #[test]
    fn test_combine_recomputes_from_members() {
        let combined = Pallet::combine(
            "COMBINED-1",
            vec![pallet("F1", "A", 0.5, 200.0), pallet("F2", "A", 0.3, 100.0)],
            EPS,
        );

        assert!(combined.is_combined);
        assert_eq!(combined.product_code, "F1-CODE");
        assert_eq!(combined.product_name, "COMBINED (2 items)");
        assert!((combined.quantity - 0.8).abs() < EPS);
        assert!((combined.total_weight - 130.0).abs() < EPS);
        assert!((combined.weight_per_unit - 162.5).abs() < EPS);
        assert_eq!(combined.dominant_count(0.5, EPS), 1);
    }

    #[test]
    fn test_split_composite_splits_boundary_member() {
        let combined = Pallet::combine(
            "COMBINED-1",
            vec![
                pallet("F1", "A", 0.5, 100.0),
                pallet("F2", "A", 0.3, 100.0),
                pallet("F3", "A", 0.1, 100.0),
            ],
            EPS,
        );

        let (part, rem) = combined.split(0.45, EPS).unwrap();

        assert!((part.quantity - 0.45).abs() < EPS);
        assert!((rem.quantity - 0.45).abs() < EPS);
        assert!((part.total_weight + rem.total_weight - combined.total_weight).abs() < EPS);

        // 0.3 + 0.1 進入 part，再從 F1 拆出 0.05
        let part_ids: Vec<&str> = part.leaves().iter().map(|p| p.id.as_str()).collect();
        assert!(part_ids.contains(&"F2"));
        assert!(part_ids.contains(&"F3"));
        assert!(part_ids.contains(&"F1-part"));
        assert_eq!(rem.id, "F1-rem");
        assert!(rem.is_atomic());
    }

    #[test]
    fn test_graft_turns_atomic_into_composite() {
        let mut target = pallet("F1", "A", 0.4, 100.0);
        target.graft(pallet("F2", "B", 0.3, 50.0), EPS);

        assert!(target.is_combined);
        assert_eq!(target.component_count(), 2);
        assert_eq!(target.leaves()[0].id, "F1");
        assert_eq!(target.group, "A+B");
        assert!(target.is_multi_group());
        assert!(target.belongs_to("B"));
        assert!((target.quantity - 0.7).abs() < EPS);
        assert!((target.total_weight - 55.0).abs() < EPS);
    }

    #[test]
    fn test_graft_flattens_composite_members() {
        let mut target = Pallet::combine(
            "COMBINED-1",
            vec![pallet("F1", "A", 0.4, 100.0), pallet("F2", "A", 0.1, 100.0)],
            EPS,
        );
        let donor = Pallet::combine(
            "COMBINED-2",
            vec![pallet("F3", "A", 0.2, 100.0), pallet("F4", "A", 0.1, 100.0)],
            EPS,
        );
        target.graft(donor, EPS);

        assert_eq!(target.component_count(), 4);
        assert!(target.leaves().iter().all(Pallet::is_atomic));
        assert_eq!(target.group, "A");
        assert_eq!(target.product_name, "COMBINED (4 items)");
    }

    proptest! {
        #[test]
        fn split_preserves_quantity_and_weight(
            quantity in 0.01f64..20.0,
            ratio in 0.01f64..0.99,
            wpu in 1.0f64..2_000.0,
        ) {
            let p = pallet("P", "A", quantity, wpu);
            let amount = quantity * ratio;
            if let Some((part, rem)) = p.split(amount, EPS) {
                prop_assert!((part.quantity + rem.quantity - quantity).abs() < EPS);
                let weight_gap = part.total_weight + rem.total_weight - p.total_weight;
                prop_assert!(weight_gap.abs() < 1e-6 * p.total_weight.max(1.0));
                prop_assert!(part.quantity > 0.0 && rem.quantity > 0.0);
            }
        }

        #[test]
        fn composite_split_matches_member_sums(
            members in proptest::collection::vec(0.05f64..0.45, 2..6),
            ratio in 0.05f64..0.95,
        ) {
            let leaves: Vec<Pallet> = members
                .iter()
                .enumerate()
                .map(|(i, q)| pallet(&format!("F{}", i), "A", *q, 100.0 + i as f64))
                .collect();
            let combined = Pallet::combine("COMBINED-1", leaves, EPS);
            let amount = combined.quantity * ratio;
            if let Some((part, rem)) = combined.split(amount, EPS) {
                for side in [&part, &rem] {
                    let q: f64 = side.leaves().iter().map(|p| p.quantity).sum();
                    let w: f64 = side.leaves().iter().map(|p| p.total_weight).sum();
                    prop_assert!((side.quantity - q).abs() < EPS);
                    prop_assert!((side.total_weight - w).abs() < 1e-6);
                }
                prop_assert!((part.quantity - amount).abs() < 1e-5);
                prop_assert!((part.quantity + rem.quantity - combined.quantity).abs() < EPS);
            }
        }
    }
}
