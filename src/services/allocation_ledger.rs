// ==========================================
// 护理人力测算系统 - 配额分配账本
// ==========================================
// 不变量: 任意时刻 Σ SiteAllocation.quantity ≤ CapacityAllocation.quantity
// 写入协议 (新增 / 修改):
// 1. 开启写事务 (IMMEDIATE)
// 2. 锁定配额行
// 3. 汇总该配额已分配数量 (修改时排除自身)
// 4. 合计 + 申请 > 配额 → CapacityExceeded, 回滚
// 5. 否则写入并提交
// 删除: 同一事务边界内直接删除, 不锁配额行
// ==========================================

use crate::domain::allocation::{CapacityAllocation, CapacityUsage, SiteAllocation};
use crate::domain::types::StaffRole;
use crate::repository::allocation_repo::{
    delete_allocation, find_allocation_in, find_capacity_by_unit_role_in, find_site_in,
    insert_allocation, insert_capacity, lock_capacity, sum_allocated_in,
    update_allocation_quantity, update_capacity_quantity,
};
use crate::repository::{AllocationRepository, RepositoryError};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

// ==========================================
// LedgerError
// ==========================================
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error(
        "配额不足 (capacity_id={capacity_id}): 已分配 {allocated} + 申请 {requested} > 配额 {capacity}"
    )]
    CapacityExceeded {
        capacity_id: String,
        allocated: i64,
        requested: i64,
        capacity: i64,
    },

    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl LedgerError {
    fn not_found(entity: &str, id: &str) -> Self {
        LedgerError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

// ==========================================
// AllocationLedger
// ==========================================
pub struct AllocationLedger {
    repo: Arc<AllocationRepository>,
}

impl AllocationLedger {
    pub fn new(repo: Arc<AllocationRepository>) -> Self {
        Self { repo }
    }

    /// 为功能站点分配配额
    pub fn allocate_slot(
        &self,
        capacity_id: &str,
        site_id: &str,
        quantity: i64,
    ) -> LedgerResult<SiteAllocation> {
        if quantity <= 0 {
            return Err(LedgerError::Validation(format!(
                "分配数量必须大于 0: {}",
                quantity
            )));
        }

        let result = self.repo.with_write_transaction(|tx| -> LedgerResult<SiteAllocation> {
            let capacity = lock_capacity(tx, capacity_id)?
                .ok_or_else(|| LedgerError::not_found("CapacityAllocation", capacity_id))?;
            let site = find_site_in(tx, site_id)?
                .ok_or_else(|| LedgerError::not_found("FunctionalSite", site_id))?;
            if site.unit_id != capacity.unit_id {
                return Err(LedgerError::Validation(format!(
                    "站点 {} 不属于配额所在单元 {}",
                    site_id, capacity.unit_id
                )));
            }

            let allocated = sum_allocated_in(tx, capacity_id, None)?;
            ensure_within(&capacity, allocated, quantity)?;

            let now = Utc::now();
            let allocation = SiteAllocation {
                allocation_id: Uuid::new_v4().to_string(),
                capacity_id: capacity_id.to_string(),
                site_id: site_id.to_string(),
                quantity,
                created_at: now,
                updated_at: now,
            };
            insert_allocation(tx, &allocation)?;
            Ok(allocation)
        });

        log_outcome("allocate_slot", capacity_id, quantity, &result);
        result
    }

    /// 修改站点分配数量 (校验时排除自身原数量)
    pub fn update_allocation(
        &self,
        allocation_id: &str,
        new_quantity: i64,
    ) -> LedgerResult<SiteAllocation> {
        if new_quantity <= 0 {
            return Err(LedgerError::Validation(format!(
                "分配数量必须大于 0: {}",
                new_quantity
            )));
        }

        let result = self.repo.with_write_transaction(|tx| -> LedgerResult<SiteAllocation> {
            let existing = find_allocation_in(tx, allocation_id)?
                .ok_or_else(|| LedgerError::not_found("SiteAllocation", allocation_id))?;
            let capacity = lock_capacity(tx, &existing.capacity_id)?.ok_or_else(|| {
                LedgerError::not_found("CapacityAllocation", &existing.capacity_id)
            })?;

            let allocated = sum_allocated_in(tx, &capacity.capacity_id, Some(allocation_id))?;
            ensure_within(&capacity, allocated, new_quantity)?;

            let now = Utc::now();
            update_allocation_quantity(tx, allocation_id, new_quantity, now)?;
            Ok(SiteAllocation {
                quantity: new_quantity,
                updated_at: now,
                ..existing
            })
        });

        log_outcome("update_allocation", allocation_id, new_quantity, &result);
        result
    }

    /// 释放站点分配
    pub fn release_allocation(&self, allocation_id: &str) -> LedgerResult<()> {
        self.repo.with_write_transaction(|tx| -> LedgerResult<()> {
            if delete_allocation(tx, allocation_id)? == 0 {
                return Err(LedgerError::not_found("SiteAllocation", allocation_id));
            }
            Ok(())
        })?;
        tracing::info!(allocation_id, "站点分配已释放");
        Ok(())
    }

    /// 声明 (新建或调整) 单元岗位配额
    ///
    /// 调小到低于已分配合计时返回 CapacityExceeded
    pub fn declare_capacity(
        &self,
        unit_id: &str,
        role: StaffRole,
        quantity: i64,
    ) -> LedgerResult<CapacityAllocation> {
        if quantity < 0 {
            return Err(LedgerError::Validation(format!("配额不能为负: {}", quantity)));
        }

        let capacity = self.repo.with_write_transaction(|tx| -> LedgerResult<CapacityAllocation> {
            let now = Utc::now();
            match find_capacity_by_unit_role_in(tx, unit_id, role)? {
                Some(existing) => {
                    let locked = lock_capacity(tx, &existing.capacity_id)?.ok_or_else(|| {
                        LedgerError::not_found("CapacityAllocation", &existing.capacity_id)
                    })?;
                    let allocated = sum_allocated_in(tx, &locked.capacity_id, None)?;
                    if allocated > quantity {
                        crate::perf::record_capacity_rejection();
                        return Err(LedgerError::CapacityExceeded {
                            capacity_id: locked.capacity_id,
                            allocated,
                            requested: 0,
                            capacity: quantity,
                        });
                    }
                    update_capacity_quantity(tx, &locked.capacity_id, quantity, now)?;
                    Ok(CapacityAllocation {
                        quantity,
                        updated_at: now,
                        ..locked
                    })
                }
                None => {
                    let capacity = CapacityAllocation {
                        capacity_id: Uuid::new_v4().to_string(),
                        unit_id: unit_id.to_string(),
                        role,
                        quantity,
                        created_at: now,
                        updated_at: now,
                    };
                    match insert_capacity(tx, &capacity) {
                        Ok(()) => Ok(capacity),
                        Err(RepositoryError::ForeignKeyViolation(_)) => {
                            Err(LedgerError::not_found("Unit", unit_id))
                        }
                        Err(e) => Err(e.into()),
                    }
                }
            }
        })?;

        tracing::info!(
            capacity_id = %capacity.capacity_id,
            unit_id,
            role = %role,
            quantity,
            "单元配额已声明"
        );
        Ok(capacity)
    }

    /// 配额使用情况
    pub fn capacity_usage(&self, capacity_id: &str) -> LedgerResult<CapacityUsage> {
        let capacity = self
            .repo
            .find_capacity(capacity_id)?
            .ok_or_else(|| LedgerError::not_found("CapacityAllocation", capacity_id))?;
        let allocated = self.repo.allocated_total(capacity_id)?;
        Ok(CapacityUsage {
            capacity: capacity.quantity,
            allocated,
        })
    }

    pub fn list_allocations(&self, capacity_id: &str) -> LedgerResult<Vec<SiteAllocation>> {
        if self.repo.find_capacity(capacity_id)?.is_none() {
            return Err(LedgerError::not_found("CapacityAllocation", capacity_id));
        }
        Ok(self.repo.list_allocations(capacity_id)?)
    }
}

fn ensure_within(capacity: &CapacityAllocation, allocated: i64, requested: i64) -> LedgerResult<()> {
    let usage = CapacityUsage {
        capacity: capacity.quantity,
        allocated,
    };
    if !usage.can_allocate(requested) {
        crate::perf::record_capacity_rejection();
        return Err(LedgerError::CapacityExceeded {
            capacity_id: capacity.capacity_id.clone(),
            allocated,
            requested,
            capacity: capacity.quantity,
        });
    }
    Ok(())
}

fn log_outcome(op: &'static str, target_id: &str, quantity: i64, result: &LedgerResult<SiteAllocation>) {
    match result {
        Ok(allocation) => tracing::info!(
            op,
            target_id,
            allocation_id = %allocation.allocation_id,
            quantity,
            "配额分配成功"
        ),
        Err(LedgerError::CapacityExceeded { .. }) => {
            tracing::info!(op, target_id, quantity, "配额不足, 已回滚")
        }
        Err(e) => tracing::warn!(op, target_id, quantity, error = %e, "配额分配失败"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;
    use rusqlite::Connection;
    use std::sync::Mutex;

    fn setup() -> AllocationLedger {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;
            INSERT INTO hospital VALUES ('H1', NULL, 'A');
            INSERT INTO unit VALUES ('U1', 'H1', 'Clinica', 'INTERNMENT', 'CLINICAL');
            INSERT INTO unit VALUES ('U2', 'H1', 'UTI', 'INTERNMENT', 'ICU');
            INSERT INTO functional_site VALUES ('S1', 'U1', 'Posto 1'), ('S2', 'U1', 'Posto 2');
            INSERT INTO functional_site VALUES ('S9', 'U2', 'Posto UTI');
            "#,
        )
        .unwrap();
        AllocationLedger::new(Arc::new(AllocationRepository::new(Arc::new(Mutex::new(conn)))))
    }

    #[test]
    fn test_allocate_until_capacity_exhausted() {
        let ledger = setup();
        let capacity = ledger.declare_capacity("U1", StaffRole::Nurse, 5).unwrap();

        ledger.allocate_slot(&capacity.capacity_id, "S1", 3).unwrap();
        let err = ledger
            .allocate_slot(&capacity.capacity_id, "S2", 3)
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::CapacityExceeded {
                allocated: 3,
                requested: 3,
                capacity: 5,
                ..
            }
        ));
        ledger.allocate_slot(&capacity.capacity_id, "S2", 2).unwrap();

        let usage = ledger.capacity_usage(&capacity.capacity_id).unwrap();
        assert_eq!(usage.allocated, 5);
        assert_eq!(usage.remaining(), 0);
    }

    #[test]
    fn test_update_excludes_own_quantity() {
        let ledger = setup();
        let capacity = ledger.declare_capacity("U1", StaffRole::Nurse, 5).unwrap();
        let a = ledger.allocate_slot(&capacity.capacity_id, "S1", 3).unwrap();
        ledger.allocate_slot(&capacity.capacity_id, "S2", 1).unwrap();

        let updated = ledger.update_allocation(&a.allocation_id, 4).unwrap();
        assert_eq!(updated.quantity, 4);
        assert!(matches!(
            ledger.update_allocation(&a.allocation_id, 5),
            Err(LedgerError::CapacityExceeded { .. })
        ));
        assert_eq!(ledger.capacity_usage(&capacity.capacity_id).unwrap().allocated, 5);
    }

    #[test]
    fn test_oversized_quantity_is_rejected_without_overflow() {
        let ledger = setup();
        let capacity = ledger.declare_capacity("U1", StaffRole::Nurse, 5).unwrap();
        let a = ledger.allocate_slot(&capacity.capacity_id, "S1", 3).unwrap();

        assert!(matches!(
            ledger.allocate_slot(&capacity.capacity_id, "S2", i64::MAX),
            Err(LedgerError::CapacityExceeded {
                allocated: 3,
                requested: i64::MAX,
                ..
            })
        ));
        assert!(matches!(
            ledger.update_allocation(&a.allocation_id, i64::MAX),
            Err(LedgerError::CapacityExceeded { .. })
        ));

        let usage = ledger.capacity_usage(&capacity.capacity_id).unwrap();
        assert_eq!(usage.allocated, 3);
        assert_eq!(ledger.list_allocations(&capacity.capacity_id).unwrap().len(), 1);
    }

    #[test]
    fn test_rejections_feed_perf_counters() {
        let ledger = setup();
        let capacity = ledger.declare_capacity("U1", StaffRole::Nurse, 2).unwrap();

        let guard = crate::perf::PerfGuard::new("test.ledger");
        ledger.allocate_slot(&capacity.capacity_id, "S1", 2).unwrap();
        assert!(ledger.allocate_slot(&capacity.capacity_id, "S2", 1).is_err());
        assert_eq!(guard.counters().capacity_rejections, 1);
    }

    #[test]
    fn test_release_and_shrink_rules() {
        let ledger = setup();
        let capacity = ledger.declare_capacity("U1", StaffRole::Technician, 4).unwrap();
        let a = ledger.allocate_slot(&capacity.capacity_id, "S1", 3).unwrap();

        assert!(matches!(
            ledger.declare_capacity("U1", StaffRole::Technician, 2),
            Err(LedgerError::CapacityExceeded { .. })
        ));

        ledger.release_allocation(&a.allocation_id).unwrap();
        assert!(matches!(
            ledger.release_allocation(&a.allocation_id),
            Err(LedgerError::NotFound { .. })
        ));

        let shrunk = ledger.declare_capacity("U1", StaffRole::Technician, 2).unwrap();
        assert_eq!(shrunk.capacity_id, capacity.capacity_id);
        assert_eq!(shrunk.quantity, 2);
        assert!(ledger.list_allocations(&capacity.capacity_id).unwrap().is_empty());
    }

    #[test]
    fn test_validation_and_lookup_errors() {
        let ledger = setup();
        let capacity = ledger.declare_capacity("U1", StaffRole::Nurse, 5).unwrap();

        assert!(matches!(
            ledger.allocate_slot(&capacity.capacity_id, "S1", 0),
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            ledger.allocate_slot(&capacity.capacity_id, "S9", 1),
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            ledger.allocate_slot("missing", "S1", 1),
            Err(LedgerError::NotFound { .. })
        ));
        assert!(matches!(
            ledger.declare_capacity("U404", StaffRole::Nurse, 1),
            Err(LedgerError::NotFound { .. })
        ));
        assert!(matches!(
            ledger.declare_capacity("U1", StaffRole::Nurse, -1),
            Err(LedgerError::Validation(_))
        ));
    }
}
