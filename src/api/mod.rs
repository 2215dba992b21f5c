// ==========================================
// 护理人力测算系统 - API 层
// ==========================================
// 职责: 提供业务 API 接口,供应用层命令调用
// ==========================================

pub mod dimensioning_api;
pub mod error;

// 重导出核心类型
pub use dimensioning_api::DimensioningApi;
pub use error::{ApiError, ApiResult};
