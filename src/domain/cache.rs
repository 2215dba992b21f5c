// ==========================================
// 护理人力测算系统 - 测算缓存领域模型
// ==========================================
// 键: (unit_id, unit_type); 落库时附带 hospital_id 以支持按医院失效
// ==========================================

use crate::domain::types::UnitType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub unit_id: String,
    pub unit_type: UnitType,
}

impl CacheKey {
    pub fn new(unit_id: impl Into<String>, unit_type: UnitType) -> Self {
        Self {
            unit_id: unit_id.into(),
            unit_type,
        }
    }
}

/// 计算元信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub compute_ms: i64,
    pub record_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub hospital_id: String,
    pub payload: serde_json::Value,
    pub param_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: CacheMetadata,
}

/// 缓存查询结果; Miss 是控制流信号, 不是错误
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit(CacheEntry),
    Miss,
}

impl CacheLookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }

    pub fn into_entry(self) -> Option<CacheEntry> {
        match self {
            CacheLookup::Hit(entry) => Some(entry),
            CacheLookup::Miss => None,
        }
    }
}

/// 失效范围
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvalidationScope {
    Unit {
        unit_id: String,
        unit_type: Option<UnitType>,
    },
    Hospital {
        hospital_id: String,
    },
    All,
    Expired {
        ttl_minutes: i64,
    },
}
