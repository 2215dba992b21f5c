// ==========================================
// 护理人力测算系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod allocation;
pub mod cache;
pub mod occupancy;
pub mod projection;
pub mod snapshot;
pub mod types;

// 重导出核心类型
pub use allocation::{CapacityAllocation, CapacityUsage, FunctionalSite, SiteAllocation};
pub use cache::{CacheEntry, CacheKey, CacheLookup, CacheMetadata, InvalidationScope};
pub use occupancy::{
    BedCensus, BedStatusCounts, ClassificationDistribution, Hospital, HospitalOccupancyReport,
    NetworkOccupancyReport, OccupancyMetrics, SectorOccupation, SkippedMember, Unit,
    UnitHeadcount,
};
pub use projection::{GapAnalysisRow, ProjectionParams, ProjectionResult, FIXED_TARGET_OCCUPANCIES};
pub use snapshot::{StaffSnapshot, StaffSnapshotIndex, UnitStaffEntry};
pub use types::{BedStatus, PatientClassification, ScopeKind, StaffRole, UnitType};
