//! 配櫃主流程

use stow_core::{ingest, AllocationConfig, AllocationSession, ContainerYard, PalletInput};

use crate::consolidator::Consolidator;
use crate::decomposer::Decomposer;
use crate::defragmenter::Defragmenter;
use crate::packer::PrimaryPacker;
use crate::policy::{policy_for, SubstitutionPolicy};
use crate::resolution::{ResolutionLoop, StopReason};
use crate::{AllocationResult, AllocationWarning, ContainerReport, PalletReport};

/// 配櫃器
pub struct Allocator {
    /// 配櫃配置
    config: AllocationConfig,

    /// 機會成本替代策略
    policy: Box<dyn SubstitutionPolicy>,
}

impl Allocator {
    /// 以配置創建配櫃器，替代策略依配置選擇
    pub fn new(config: AllocationConfig) -> stow_core::Result<Self> {
        let policy = policy_for(config.substitution);
        Self::with_policy(config, policy)
    }

    /// 以自訂替代策略創建配櫃器
    pub fn with_policy(
        config: AllocationConfig,
        policy: Box<dyn SubstitutionPolicy>,
    ) -> stow_core::Result<Self> {
        config.validate()?;
        Ok(Self { config, policy })
    }

    pub fn config(&self) -> &AllocationConfig {
        &self.config
    }

    /// 主配櫃入口
    pub fn allocate(&self, inputs: &[PalletInput]) -> stow_core::Result<AllocationResult> {
        let run_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("allocate", %run_id);
        let _guard = span.enter();

        tracing::info!("開始配櫃：輸入 {} 筆", inputs.len());
        let start_time = std::time::Instant::now();
        let mut result = AllocationResult::empty(run_id);
        let mut session = AllocationSession::new(self.config.clone());

        // Step 1: 輸入驗證
        tracing::debug!("Step 1: 輸入驗證");
        let (pallets, rejected) = ingest(inputs, self.config.epsilon);
        for row in &rejected {
            result.add_warning(AllocationWarning::info(
                row.id.clone(),
                format!("輸入被拒收: {}", row.reason.code()),
            ));
        }
        result.rejected = rejected;

        // Step 2: 拆解
        tracing::debug!("Step 2: 拆解");
        let decomposition = Decomposer::decompose(pallets, &mut session)?;
        let sealed = decomposition.sealed;

        // Step 3: 小數棧板合併
        tracing::debug!("Step 3: 小數棧板合併");
        let consolidation = Consolidator::consolidate(decomposition.fractional, &mut session);

        // Step 4: 主要裝櫃
        tracing::debug!("Step 4: 主要裝櫃");
        let mut yard = ContainerYard::new();
        let packer = PrimaryPacker::new(self.policy.as_ref());
        let integer_backlog = packer.pack_integer(decomposition.integer, &mut yard, &mut session);
        let fractional_backlog =
            PrimaryPacker::pack_fractional(consolidation.into_pallets(), &mut yard);

        // Step 5: 待處理迴圈
        tracing::debug!("Step 5: 待處理迴圈");
        let outcome = ResolutionLoop::new(&mut session, packer).run(
            &mut yard,
            integer_backlog,
            fractional_backlog,
        );
        result.stats.resolution_passes = outcome.passes;
        result.stats.containers_created_by_resolution = outcome.containers_created;
        match outcome.stop {
            StopReason::Drained => {}
            StopReason::Stalled => result.add_warning(AllocationWarning::warning(
                "resolution".to_string(),
                format!("待處理迴圈第 {} 輪沒有進展，回傳部分結果", outcome.passes),
            )),
            StopReason::PassLimit => result.add_warning(AllocationWarning::warning(
                "resolution".to_string(),
                format!("待處理迴圈達到輪數上限 {}", self.config.max_resolution_passes),
            )),
        }
        let mut unresolved = outcome.into_unresolved();

        // Step 6: 碎片整理
        if self.config.defragment {
            tracing::debug!("Step 6: 碎片整理");
            let defrag = Defragmenter::new(&self.config).run(&mut yard, &mut unresolved);
            result.stats.defrag_iterations = defrag.iterations;
            if defrag.capped {
                result.add_warning(AllocationWarning::info(
                    "defragment".to_string(),
                    format!("碎片整理達到迭代上限 {}", self.config.max_defrag_iterations),
                ));
            }
            for container_id in defrag.merged_away {
                result.add_warning(AllocationWarning::info(
                    container_id,
                    "貨櫃內容已併入同群組其他貨櫃".to_string(),
                ));
            }
        }
        yard.remove_empty();

        if !unresolved.is_empty() {
            tracing::warn!("仍有 {} 個棧板無法配置", unresolved.len());
        }
        for pallet in &unresolved {
            result.add_warning(AllocationWarning::error(
                pallet.id.clone(),
                format!("無法配置，剩餘數量 {}", pallet.quantity),
            ));
        }

        result.containers = sealed
            .iter()
            .chain(yard.containers())
            .map(ContainerReport::from)
            .collect();
        result.unresolved = unresolved.iter().map(PalletReport::from).collect();
        result.stats.calculation_time_ms = Some(start_time.elapsed().as_millis());

        tracing::info!("配櫃完成，耗時 {:?}", start_time.elapsed());
        tracing::info!(
            "貨櫃數量: {}（發出編號 {} 個），未配置棧板: {}",
            result.containers.len(),
            session.containers_issued(),
            result.unresolved.len()
        );

        Ok(result)
    }
}
