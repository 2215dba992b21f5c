// ==========================================
// 护理人力测算系统 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，将各层错误转换为用户友好的错误消息
// ==========================================

use crate::engine::error::EngineError;
use crate::repository::error::RepositoryError;
use crate::services::allocation_ledger::LedgerError;
use thiserror::Error;

/// API层错误类型
/// 所有错误信息必须包含显式原因
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("配额不足: capacity_id={capacity_id}, 已分配={allocated}, 申请={requested}, 配额={capacity}")]
    CapacityExceeded {
        capacity_id: String,
        allocated: i64,
        requested: i64,
        capacity: i64,
    },

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    #[error("数据验证失败: {0}")]
    ValidationError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// 目的: 将Repository层的技术错误转换为用户友好的业务错误
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }

            // 数据质量错误
            RepositoryError::ValidationError(msg) => ApiError::ValidationError(msg),
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }

            // 通用错误
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(msg) => ApiError::InvalidInput(msg),
            EngineError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            // 正常流程中被汇总器吸收; 走到这里说明调用方直接透传
            EngineError::PartialAggregation {
                hospital_id,
                reason,
            } => ApiError::InternalError(format!("医院{}分析失败: {}", hospital_id, reason)),
            EngineError::Repository(e) => e.into(),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::CapacityExceeded {
                capacity_id,
                allocated,
                requested,
                capacity,
            } => ApiError::CapacityExceeded {
                capacity_id,
                allocated,
                requested,
                capacity,
            },
            LedgerError::Validation(msg) => ApiError::InvalidInput(msg),
            LedgerError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            LedgerError::Repository(e) => e.into(),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_conversion() {
        let repo_err = RepositoryError::NotFound {
            entity: "Unit".to_string(),
            id: "U001".to_string(),
        };
        let api_err: ApiError = repo_err.into();
        match api_err {
            ApiError::NotFound(msg) => {
                assert!(msg.contains("Unit"));
                assert!(msg.contains("U001"));
            }
            _ => panic!("Expected NotFound"),
        }
    }

    #[test]
    fn test_engine_error_conversion() {
        let api_err: ApiError = EngineError::Validation("base_occupancy".to_string()).into();
        assert!(matches!(api_err, ApiError::InvalidInput(_)));

        let api_err: ApiError =
            EngineError::Repository(RepositoryError::ValidationError("bad".to_string())).into();
        assert!(matches!(api_err, ApiError::ValidationError(_)));
    }

    #[test]
    fn test_ledger_error_keeps_capacity_details() {
        let api_err: ApiError = LedgerError::CapacityExceeded {
            capacity_id: "C1".to_string(),
            allocated: 3,
            requested: 3,
            capacity: 5,
        }
        .into();
        match api_err {
            ApiError::CapacityExceeded {
                allocated,
                requested,
                capacity,
                ..
            } => {
                assert_eq!((allocated, requested, capacity), (3, 3, 5));
            }
            _ => panic!("Expected CapacityExceeded"),
        }
    }
}
