// ==========================================
// 护理人力测算系统 - 引擎层错误类型
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    /// 汇总时单家医院失败; 由汇总器捕获并跳过, 不向上传播
    #[error("医院分析失败 (hospital_id={hospital_id}): {reason}")]
    PartialAggregation { hospital_id: String, reason: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl EngineError {
    pub fn not_found(entity: &str, id: &str) -> Self {
        EngineError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    /// 是否为"目标不存在"类错误 (含仓储层 NotFound)
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::NotFound { .. } | EngineError::Repository(RepositoryError::NotFound { .. })
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
