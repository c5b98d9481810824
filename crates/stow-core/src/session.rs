//! 配櫃會話：序號產生器與貨櫃工廠

use crate::container::Capacity;
use crate::{AllocationConfig, Container};

/// 帶前綴的遞增序號產生器
#[derive(Debug, Clone)]
pub struct SequenceGenerator {
    prefix: String,
    next: u64,
}

impl SequenceGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::starting_at(prefix, 1)
    }

    pub fn starting_at(prefix: impl Into<String>, next: u64) -> Self {
        Self {
            prefix: prefix.into(),
            next,
        }
    }

    /// 取得下一個ID
    pub fn next_id(&mut self) -> String {
        let id = format!("{}{}", self.prefix, self.next);
        self.next += 1;
        id
    }

    /// 已發出的序號數量
    pub fn issued(&self) -> u64 {
        self.next - 1
    }
}

/// 單次配櫃會話
///
/// 持有配置與所有序號產生器，整個流程只透過它創建貨櫃與合併棧板ID。
#[derive(Debug, Clone)]
pub struct AllocationSession {
    config: AllocationConfig,
    container_ids: SequenceGenerator,
    combination_ids: SequenceGenerator,
}

impl AllocationSession {
    pub fn new(config: AllocationConfig) -> Self {
        Self {
            config,
            container_ids: SequenceGenerator::new("C"),
            combination_ids: SequenceGenerator::new("COMBINED-"),
        }
    }

    pub fn config(&self) -> &AllocationConfig {
        &self.config
    }

    /// 創建新的空貨櫃
    pub fn new_container(&mut self, main_group: impl Into<String>) -> Container {
        let id = self.container_ids.next_id();
        Container::new(id, main_group, Capacity::from(&self.config))
    }

    /// 取得下一個合併棧板ID
    pub fn next_combination_id(&mut self) -> String {
        self.combination_ids.next_id()
    }

    /// 已創建的貨櫃數量
    pub fn containers_issued(&self) -> u64 {
        self.container_ids.issued()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_generator() {
        let mut seq = SequenceGenerator::new("C");

        assert_eq!(seq.next_id(), "C1");
        assert_eq!(seq.next_id(), "C2");
        assert_eq!(seq.issued(), 2);
    }

    #[test]
    fn test_session_ids_are_independent() {
        let mut session = AllocationSession::new(AllocationConfig::default());

        let c1 = session.new_container("A");
        let combo = session.next_combination_id();
        let c2 = session.new_container("B");

        assert_eq!(c1.id, "C1");
        assert_eq!(c2.id, "C2");
        assert_eq!(c2.main_group, "B");
        assert_eq!(combo, "COMBINED-1");
        assert_eq!(session.containers_issued(), 2);
    }
}
