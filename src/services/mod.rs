// ==========================================
// 护理人力测算系统 - 服务层
// ==========================================
// 职责: 带事务/时效协议的有状态服务 (配额账本、测算缓存)
// 依赖: 仅依赖仓储层
// ==========================================

pub mod allocation_ledger;
pub mod dimensioning_cache;

pub use allocation_ledger::{AllocationLedger, LedgerError, LedgerResult};
pub use dimensioning_cache::{param_hash, Cached, DimensioningCache};
