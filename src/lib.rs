//! # stow
//!
//! 多階段棧板配櫃引擎。
//!
//! 流程：拆解 → 小數棧板合併 → 主要裝櫃 → 待處理迴圈 → 碎片整理。
//!
//! ```
//! use stow::PalletInput;
//!
//! let inputs = vec![PalletInput::new("P1", "SKU-1", "A", 25.0, 100.0)];
//! let result = stow::allocate(&inputs).unwrap();
//!
//! assert_eq!(result.containers.len(), 2);
//! assert!(result.is_complete());
//! ```

pub mod logging;
pub mod settings;

pub use stow_calc::{
    AllocationResult, AllocationStats, AllocationWarning, Allocator, ContainerReport,
    PalletReport, WarningSeverity,
};
pub use stow_core::{
    AllocationConfig, PalletInput, RejectReason, RejectedPallet, Result, StowError,
    SubstitutionRule,
};

/// 以預設配置執行配櫃
pub fn allocate(inputs: &[PalletInput]) -> Result<AllocationResult> {
    Allocator::new(AllocationConfig::default())?.allocate(inputs)
}
