// ==========================================
// 护理人力测算系统 - 引擎层
// ==========================================
// 职责: 实现测算规则与分析编排
// 红线: Engine 不拼 SQL, 数据经仓储 / 数据源 trait 读取
// ==========================================

pub mod aggregation;
pub mod data_source;
pub mod error;
pub mod network;
pub mod occupancy;
pub mod projection;
pub mod staffing;

// 重导出核心引擎
pub use aggregation::{combine_metrics, merge_sectors};
pub use data_source::{OccupancyDataSource, SqliteOccupancySource};
pub use error::{EngineError, EngineResult};
pub use network::NetworkAggregator;
pub use occupancy::{CareDemand, OccupancyAnalysisEngine};
pub use projection::ProjectionCalculator;
pub use staffing::StaffingStrategy;
