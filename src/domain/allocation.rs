// ==========================================
// 护理人力测算系统 - 人员配额领域模型
// ==========================================
// 关系: 一个单元配额 (CapacityAllocation) → 多个站点分配 (SiteAllocation)
// 不变量: Σ SiteAllocation.quantity ≤ CapacityAllocation.quantity
// ==========================================

use crate::domain::types::StaffRole;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// CapacityAllocation - 单元岗位配额
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityAllocation {
    pub capacity_id: String,
    pub unit_id: String,
    pub role: StaffRole,
    pub quantity: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ==========================================
// SiteAllocation - 功能站点占用的配额
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteAllocation {
    pub allocation_id: String,
    pub capacity_id: String,
    pub site_id: String,
    pub quantity: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 单元内的功能站点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionalSite {
    pub site_id: String,
    pub unit_id: String,
    pub name: String,
}

/// 配额使用情况
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityUsage {
    pub capacity: i64,
    pub allocated: i64,
}

impl CapacityUsage {
    pub fn remaining(&self) -> i64 {
        (self.capacity - self.allocated).max(0)
    }

    /// 再分配 `requested` 后是否仍满足不变量
    pub fn can_allocate(&self, requested: i64) -> bool {
        self.allocated
            .checked_add(requested)
            .map_or(false, |total| total <= self.capacity)
    }
}
