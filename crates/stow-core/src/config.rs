//! 配櫃配置模型

use serde::{Deserialize, Serialize};

use crate::{Result, StowError};

/// 配櫃參數配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationConfig {
    /// 單櫃最大重量
    pub max_weight: f64,

    /// 單櫃最大數量（同時作為邏輯行數上限）
    pub max_units: f64,

    /// 浮點容差
    pub epsilon: f64,

    /// 合併棧板的填充上限（相對於基底整數部分）
    pub fill_limit: f64,

    /// 主導成員門檻：合併棧板中最多一個成員數量達到此值
    pub dominant_threshold: f64,

    /// 機會成本替代規則
    pub substitution: SubstitutionRule,

    /// 低利用率門檻（低於此值的貨櫃交由碎片整理處理）
    pub waste_threshold: f64,

    /// 碎片整理最大迭代次數
    pub max_defrag_iterations: u32,

    /// 待處理迴圈最大輪數
    pub max_resolution_passes: u32,

    /// 是否執行碎片整理
    pub defragment: bool,
}

impl AllocationConfig {
    pub const DEFAULT_MAX_WEIGHT: f64 = 24_000.0;
    pub const DEFAULT_MAX_UNITS: f64 = 20.0;
    pub const DEFAULT_EPSILON: f64 = 1e-6;
    pub const DEFAULT_FILL_LIMIT: f64 = 0.9;
    pub const DEFAULT_DOMINANT_THRESHOLD: f64 = 0.5;
    pub const DEFAULT_WASTE_THRESHOLD: f64 = 0.5;
    pub const DEFAULT_MAX_DEFRAG_ITERATIONS: u32 = 50;
    pub const DEFAULT_MAX_RESOLUTION_PASSES: u32 = 500;

    /// 創建預設配置
    pub fn new() -> Self {
        Self {
            max_weight: Self::DEFAULT_MAX_WEIGHT,
            max_units: Self::DEFAULT_MAX_UNITS,
            epsilon: Self::DEFAULT_EPSILON,
            fill_limit: Self::DEFAULT_FILL_LIMIT,
            dominant_threshold: Self::DEFAULT_DOMINANT_THRESHOLD,
            substitution: SubstitutionRule::LighterGroup,
            waste_threshold: Self::DEFAULT_WASTE_THRESHOLD,
            max_defrag_iterations: Self::DEFAULT_MAX_DEFRAG_ITERATIONS,
            max_resolution_passes: Self::DEFAULT_MAX_RESOLUTION_PASSES,
            defragment: true,
        }
    }

    /// 建構器模式：設置最大重量
    pub fn with_max_weight(mut self, weight: f64) -> Self {
        self.max_weight = weight;
        self
    }

    /// 建構器模式：設置最大數量
    pub fn with_max_units(mut self, units: f64) -> Self {
        self.max_units = units;
        self
    }

    /// 建構器模式：設置浮點容差
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// 建構器模式：設置填充上限
    pub fn with_fill_limit(mut self, limit: f64) -> Self {
        self.fill_limit = limit;
        self
    }

    /// 建構器模式：設置主導成員門檻
    pub fn with_dominant_threshold(mut self, threshold: f64) -> Self {
        self.dominant_threshold = threshold;
        self
    }

    /// 建構器模式：設置機會成本替代規則
    pub fn with_substitution(mut self, rule: SubstitutionRule) -> Self {
        self.substitution = rule;
        self
    }

    /// 建構器模式：設置低利用率門檻
    pub fn with_waste_threshold(mut self, threshold: f64) -> Self {
        self.waste_threshold = threshold;
        self
    }

    /// 建構器模式：設置碎片整理最大迭代次數
    pub fn with_max_defrag_iterations(mut self, iterations: u32) -> Self {
        self.max_defrag_iterations = iterations;
        self
    }

    /// 建構器模式：設置待處理迴圈最大輪數
    pub fn with_max_resolution_passes(mut self, passes: u32) -> Self {
        self.max_resolution_passes = passes;
        self
    }

    /// 建構器模式：設置是否執行碎片整理
    ///
    /// # 範例
    /// ```
    /// # use stow_core::AllocationConfig;
    /// let config = AllocationConfig::new().with_defragment(false);
    /// assert!(!config.defragment);
    /// ```
    pub fn with_defragment(mut self, enabled: bool) -> Self {
        self.defragment = enabled;
        self
    }

    /// 檢查配置是否可用
    pub fn validate(&self) -> Result<()> {
        if !(self.max_weight.is_finite() && self.max_weight > 0.0) {
            return Err(StowError::InvalidConfig(format!(
                "max_weight 必須為正數: {}",
                self.max_weight
            )));
        }
        if !(self.max_units.is_finite() && self.max_units >= 1.0) {
            return Err(StowError::InvalidConfig(format!(
                "max_units 至少為 1: {}",
                self.max_units
            )));
        }
        if !(self.epsilon > 0.0 && self.epsilon < 0.01) {
            return Err(StowError::InvalidConfig(format!(
                "epsilon 必須介於 0 與 0.01: {}",
                self.epsilon
            )));
        }
        if !(self.fill_limit > 0.0 && self.fill_limit < 1.0) {
            return Err(StowError::InvalidConfig(format!(
                "fill_limit 必須介於 0 與 1: {}",
                self.fill_limit
            )));
        }
        if !(self.dominant_threshold > 0.0 && self.dominant_threshold <= 1.0) {
            return Err(StowError::InvalidConfig(format!(
                "dominant_threshold 必須介於 0 與 1: {}",
                self.dominant_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.waste_threshold) {
            return Err(StowError::InvalidConfig(format!(
                "waste_threshold 必須介於 0 與 1: {}",
                self.waste_threshold
            )));
        }
        Ok(())
    }

    /// 邏輯行數上限
    pub fn max_lines(&self) -> u32 {
        self.max_units.floor() as u32
    }

    /// 判斷數量是否為整數（容差內）
    pub fn is_integral(&self, quantity: f64) -> bool {
        (quantity - quantity.round()).abs() < self.epsilon
    }
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// 機會成本替代規則
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubstitutionRule {
    /// 以較輕的小棧板組合取代大棧板（重量上限為大棧板重量，組合至少兩個成員）
    LighterGroup,

    /// 不做替代，純最佳適配
    Disabled,
}
