// ==========================================
// 护理人力测算系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod allocation_repo;
pub mod bed_repo;
pub mod cache_repo;
pub mod error;
pub mod hospital_repo;
pub mod staff_repo;

// 重导出核心仓储
pub use allocation_repo::AllocationRepository;
pub use bed_repo::BedRepository;
pub use cache_repo::DimensioningCacheRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use hospital_repo::HospitalRepository;
pub use staff_repo::StaffRepository;
