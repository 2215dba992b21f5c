// ==========================================
// 护理人力测算系统 - 现有人数来源策略
// ==========================================
// 每次医院分析在入口处选定一次:
// - 医院存在人力快照 → Snapshot (快照索引)
// - 否则 → Baseline (unit_staff 基线表)
// 单元层不再各自探测数据形态
// ==========================================

use crate::domain::occupancy::UnitHeadcount;
use crate::domain::snapshot::StaffSnapshotIndex;
use crate::engine::data_source::OccupancyDataSource;
use crate::engine::error::EngineResult;

#[derive(Debug, Clone, PartialEq)]
pub enum StaffingStrategy {
    Snapshot(StaffSnapshotIndex),
    Baseline,
}

impl StaffingStrategy {
    /// 为医院选定人数来源; 快照解码失败直接返回错误
    pub fn select(source: &dyn OccupancyDataSource, hospital_id: &str) -> EngineResult<Self> {
        if !source.has_staff_snapshots(hospital_id)? {
            return Ok(StaffingStrategy::Baseline);
        }
        let snapshots = source.staff_snapshots(hospital_id)?;
        tracing::debug!(hospital_id, count = snapshots.len(), "使用人力快照");
        Ok(StaffingStrategy::Snapshot(StaffSnapshotIndex::build(
            &snapshots,
        )))
    }

    /// 单元现有人数; 快照模式下未出现的单元计为 0
    pub fn headcount(
        &self,
        source: &dyn OccupancyDataSource,
        unit_id: &str,
    ) -> EngineResult<UnitHeadcount> {
        match self {
            StaffingStrategy::Snapshot(index) => Ok(index.headcount(unit_id).unwrap_or_default()),
            StaffingStrategy::Baseline => Ok(source.baseline_headcount(unit_id)?),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StaffingStrategy::Snapshot(_) => "SNAPSHOT",
            StaffingStrategy::Baseline => "BASELINE",
        }
    }
}
