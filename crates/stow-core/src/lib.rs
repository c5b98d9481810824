//! # Stow Core
//!
//! 核心資料模型與類型定義：棧板、貨櫃、貨櫃場快照、配置與輸入驗證

pub mod config;
pub mod container;
pub mod input;
pub mod pallet;
pub mod session;
pub mod yard;

// Re-export 主要類型
pub use config::{AllocationConfig, SubstitutionRule};
pub use container::Container;
pub use input::{ingest, PalletInput, RejectReason, RejectedPallet};
pub use pallet::Pallet;
pub use session::{AllocationSession, SequenceGenerator};
pub use yard::{ContainerYard, SpareCapacity};

/// 配櫃錯誤類型
#[derive(Debug, thiserror::Error)]
pub enum StowError {
    #[error("無效的配置: {0}")]
    InvalidConfig(String),

    #[error("超限棧板 {pallet_id} 均分後仍超出貨櫃容量 (數量 {quantity}, 重量 {weight})")]
    OversizedPiece {
        pallet_id: String,
        quantity: f64,
        weight: f64,
    },
}

pub type Result<T> = std::result::Result<T, StowError>;
