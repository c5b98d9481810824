//! 貨櫃模型

use serde::{Deserialize, Serialize};

use crate::pallet::logical_lines;
use crate::{AllocationConfig, Pallet};

/// 貨櫃容量限制（由配置複製而來）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Capacity {
    pub max_weight: f64,
    pub max_units: f64,
    pub max_lines: u32,
    pub epsilon: f64,
}

impl From<&AllocationConfig> for Capacity {
    fn from(config: &AllocationConfig) -> Self {
        Self {
            max_weight: config.max_weight,
            max_units: config.max_units,
            max_lines: config.max_lines(),
            epsilon: config.epsilon,
        }
    }
}

/// 貨櫃
///
/// 總數量、總重量、總邏輯行數在每次變動後都由棧板列表重新計算，不做累加。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    /// 貨櫃ID
    pub id: String,

    /// 主群組
    pub main_group: String,

    /// 是否為已封存的超限貨櫃（不參與後續階段）
    pub sealed: bool,

    pallets: Vec<Pallet>,
    total_quantity: f64,
    total_weight: f64,
    total_logical_lines: u32,
    capacity: Capacity,
}

impl Container {
    /// 創建空貨櫃
    pub fn new(id: impl Into<String>, main_group: impl Into<String>, capacity: Capacity) -> Self {
        Self {
            id: id.into(),
            main_group: main_group.into(),
            sealed: false,
            pallets: Vec::new(),
            total_quantity: 0.0,
            total_weight: 0.0,
            total_logical_lines: 0,
            capacity,
        }
    }

    pub fn pallets(&self) -> &[Pallet] {
        &self.pallets
    }

    pub fn total_quantity(&self) -> f64 {
        self.total_quantity
    }

    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn total_logical_lines(&self) -> u32 {
        self.total_logical_lines
    }

    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.pallets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pallets.len()
    }

    /// 剩餘數量
    pub fn remaining_quantity(&self) -> f64 {
        self.capacity.max_units - self.total_quantity
    }

    /// 剩餘重量
    pub fn remaining_weight(&self) -> f64 {
        self.capacity.max_weight - self.total_weight
    }

    /// 剩餘邏輯行數
    pub fn remaining_logical_lines(&self) -> u32 {
        self.capacity.max_lines.saturating_sub(self.total_logical_lines)
    }

    /// 利用率：數量比與重量比取較大者
    pub fn utilization(&self) -> f64 {
        let by_quantity = self.total_quantity / self.capacity.max_units;
        let by_weight = self.total_weight / self.capacity.max_weight;
        by_quantity.max(by_weight)
    }

    /// 跨群組裝入的數量
    pub fn cross_shipped_quantity(&self) -> f64 {
        self.pallets
            .iter()
            .filter(|p| p.group != self.main_group)
            .map(|p| p.quantity)
            .sum()
    }

    /// 檢查棧板能否放入：依序檢查邏輯行數、數量、重量
    pub fn can_fit(&self, pallet: &Pallet) -> bool {
        let eps = self.capacity.epsilon;
        if self.total_logical_lines + pallet.logical_line_count(eps) > self.capacity.max_lines {
            return false;
        }
        if self.total_quantity + pallet.quantity > self.capacity.max_units + eps {
            return false;
        }
        if self.total_weight + pallet.total_weight > self.capacity.max_weight + eps {
            return false;
        }
        true
    }

    /// 檢查把 `addition` 併入第 `index` 個棧板後是否仍在容量內
    pub fn can_absorb_at(&self, index: usize, addition: &Pallet) -> bool {
        let Some(target) = self.pallets.get(index) else {
            return false;
        };
        let eps = self.capacity.epsilon;
        if self.total_weight + addition.total_weight > self.capacity.max_weight + eps {
            return false;
        }
        if self.total_quantity + addition.quantity > self.capacity.max_units + eps {
            return false;
        }
        let lines = self.total_logical_lines - target.logical_line_count(eps)
            + logical_lines(target.quantity + addition.quantity, eps);
        lines <= self.capacity.max_lines
    }

    /// 放入棧板；群組與主群組不同時標記為跨群組裝櫃
    pub fn add(&mut self, mut pallet: Pallet) {
        pallet.is_cross_shipped = pallet.group != self.main_group;
        let cross = pallet.is_cross_shipped;
        if pallet.is_combined {
            for leaf in pallet_leaves_mut(&mut pallet) {
                leaf.is_cross_shipped = cross || leaf.group != self.main_group;
            }
        }
        self.pallets.push(pallet);
        self.recalculate();
    }

    /// 依ID移除棧板
    pub fn remove(&mut self, pallet_id: &str) -> Option<Pallet> {
        let index = self.pallets.iter().position(|p| p.id == pallet_id)?;
        let pallet = self.pallets.remove(index);
        self.recalculate();
        Some(pallet)
    }

    /// 把 `addition` 併入第 `index` 個棧板
    pub fn graft_at(&mut self, index: usize, mut addition: Pallet) -> bool {
        let eps = self.capacity.epsilon;
        let main_group = self.main_group.clone();
        let Some(target) = self.pallets.get_mut(index) else {
            return false;
        };
        for leaf in pallet_leaves_mut(&mut addition) {
            leaf.is_cross_shipped = leaf.group != main_group;
        }
        target.graft(addition, eps);
        target.is_cross_shipped = target.group != main_group;
        self.recalculate();
        true
    }

    /// 由棧板列表重新計算總量
    fn recalculate(&mut self) {
        let eps = self.capacity.epsilon;
        self.total_quantity = self.pallets.iter().map(|p| p.quantity).sum();
        self.total_weight = self.pallets.iter().map(|p| p.total_weight).sum();
        self.total_logical_lines = self
            .pallets
            .iter()
            .map(|p| p.logical_line_count(eps))
            .sum();
    }
}

/// 取得可變成員：原子棧板回傳自身
fn pallet_leaves_mut(pallet: &mut Pallet) -> Vec<&mut Pallet> {
    if pallet.is_atomic() {
        vec![pallet]
    } else {
        pallet.components_mut().iter_mut().collect()
    }
}
