//! # Stow Allocation Engine
//!
//! 多階段棧板配櫃引擎：拆解、合併、主要裝櫃、待處理迴圈、碎片整理

pub mod allocator;
pub mod consolidator;
pub mod decomposer;
pub mod defragmenter;
pub mod packer;
pub mod placement;
pub mod policy;
pub mod repack;
pub mod resolution;

// Re-export 主要類型
pub use allocator::Allocator;
pub use policy::{policy_for, DisabledPolicy, LighterGroupPolicy, SubstitutionPolicy};

use serde::{Deserialize, Serialize};
use stow_core::{Container, Pallet, RejectedPallet};

/// 配櫃結果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationResult {
    /// 本次執行ID（僅供日誌關聯）
    pub run_id: uuid::Uuid,

    /// 最終貨櫃列表
    pub containers: Vec<ContainerReport>,

    /// 無法配置的棧板
    pub unresolved: Vec<PalletReport>,

    /// 被拒收的輸入
    pub rejected: Vec<RejectedPallet>,

    /// 警告信息
    pub warnings: Vec<AllocationWarning>,

    /// 執行統計
    pub stats: AllocationStats,
}

impl AllocationResult {
    /// 創建空的配櫃結果
    pub fn empty(run_id: uuid::Uuid) -> Self {
        Self {
            run_id,
            containers: Vec::new(),
            unresolved: Vec::new(),
            rejected: Vec::new(),
            warnings: Vec::new(),
            stats: AllocationStats::default(),
        }
    }

    /// 添加警告
    pub fn add_warning(&mut self, warning: AllocationWarning) {
        self.warnings.push(warning);
    }

    /// 是否全部配置完成
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }

    /// 已裝櫃數量加總
    pub fn placed_quantity(&self) -> f64 {
        self.containers.iter().map(|c| c.total_quantity).sum()
    }

    /// 未配置數量加總
    pub fn unresolved_quantity(&self) -> f64 {
        self.unresolved.iter().map(|p| p.quantity).sum()
    }
}

/// 執行統計
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationStats {
    pub resolution_passes: u32,
    pub defrag_iterations: u32,
    pub containers_created_by_resolution: u32,
    pub calculation_time_ms: Option<u128>,
}

/// 貨櫃報表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerReport {
    pub id: String,
    pub main_group: String,
    pub total_quantity: f64,
    pub total_weight: f64,
    pub total_logical_lines: u32,
    pub remaining_quantity: f64,
    pub remaining_weight: f64,
    pub utilization: f64,
    pub sealed: bool,
    pub cross_shipped_quantity: f64,
    pub pallets: Vec<PalletReport>,
}

impl From<&Container> for ContainerReport {
    fn from(container: &Container) -> Self {
        Self {
            id: container.id.clone(),
            main_group: container.main_group.clone(),
            total_quantity: container.total_quantity(),
            total_weight: container.total_weight(),
            total_logical_lines: container.total_logical_lines(),
            remaining_quantity: container.remaining_quantity(),
            remaining_weight: container.remaining_weight(),
            utilization: container.utilization(),
            sealed: container.sealed,
            cross_shipped_quantity: container.cross_shipped_quantity(),
            pallets: container.pallets().iter().map(PalletReport::from).collect(),
        }
    }
}

/// 棧板報表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PalletReport {
    pub id: String,
    pub product_code: String,
    pub product_name: String,
    pub group: String,
    pub quantity: f64,
    pub weight_per_unit: f64,
    pub total_weight: f64,
    pub is_combined: bool,
    pub is_split: bool,
    pub is_cross_shipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_from: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<PalletReport>,
}

impl From<&Pallet> for PalletReport {
    fn from(pallet: &Pallet) -> Self {
        let components = if pallet.is_atomic() {
            Vec::new()
        } else {
            pallet.leaves().iter().map(PalletReport::from).collect()
        };

        Self {
            id: pallet.id.clone(),
            product_code: pallet.product_code.clone(),
            product_name: pallet.product_name.clone(),
            group: pallet.group.clone(),
            quantity: pallet.quantity,
            weight_per_unit: pallet.weight_per_unit,
            total_weight: pallet.total_weight,
            is_combined: pallet.is_combined,
            is_split: pallet.is_split,
            is_cross_shipped: pallet.is_cross_shipped,
            split_from: pallet.split_from.clone(),
            components,
        }
    }
}

/// 配櫃警告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationWarning {
    pub subject: String,
    pub message: String,
    pub severity: WarningSeverity,
}

impl AllocationWarning {
    pub fn new(subject: String, message: String, severity: WarningSeverity) -> Self {
        Self {
            subject,
            message,
            severity,
        }
    }

    pub fn info(subject: String, message: String) -> Self {
        Self::new(subject, message, WarningSeverity::Info)
    }

    pub fn warning(subject: String, message: String) -> Self {
        Self::new(subject, message, WarningSeverity::Warning)
    }

    pub fn error(subject: String, message: String) -> Self {
        Self::new(subject, message, WarningSeverity::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningSeverity {
    Info,
    Warning,
    Error,
}
