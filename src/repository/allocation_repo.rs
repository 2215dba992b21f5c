// ==========================================
// 护理人力测算系统 - 配额/站点分配仓储
// ==========================================
// 红线: Repository 不含业务逻辑 (容量校验在 AllocationLedger)
// 并发控制:
// - 写事务统一使用 BEGIN IMMEDIATE, 事务开始即持有写锁
// - lock_capacity 再对配额行做一次 lock_version 自增, 作为行级锁语义的落点
// - busy_timeout 让并发写者排队等待
// ==========================================

use crate::db::{format_timestamp, parse_timestamp};
use crate::domain::allocation::{CapacityAllocation, FunctionalSite, SiteAllocation};
use crate::domain::types::StaffRole;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::sync::{Arc, Mutex};

const CAPACITY_COLUMNS: &str = "capacity_id, unit_id, role, quantity, created_at, updated_at";
const ALLOCATION_COLUMNS: &str =
    "allocation_id, capacity_id, site_id, quantity, created_at, updated_at";

// ==========================================
// AllocationRepository - 配额仓储
// ==========================================
pub struct AllocationRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AllocationRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 在写事务内执行闭包
    ///
    /// # 说明
    /// - 闭包返回 Err 时事务随 Transaction drop 回滚
    /// - 闭包返回 Ok 时提交; 提交失败同样作为错误返回
    pub fn with_write_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(RepositoryError::from)?;
        let out = f(&tx)?;
        tx.commit().map_err(RepositoryError::from)?;
        Ok(out)
    }

    // ==========================================
    // 只读查询 (无需事务)
    // ==========================================

    pub fn find_capacity(&self, capacity_id: &str) -> RepositoryResult<Option<CapacityAllocation>> {
        let conn = self.get_conn()?;
        find_capacity_in(&conn, capacity_id)
    }

    pub fn list_allocations(&self, capacity_id: &str) -> RepositoryResult<Vec<SiteAllocation>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM site_allocation WHERE capacity_id = ?1 ORDER BY created_at, allocation_id",
            ALLOCATION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![capacity_id], map_allocation_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawAllocation::into_domain).collect()
    }

    pub fn allocated_total(&self, capacity_id: &str) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        sum_allocated_in(&conn, capacity_id, None)
    }
}

// ==========================================
// 事务内操作 (接收 &Connection, 可传入 &Transaction)
// ==========================================

/// 锁定配额行并返回当前值; 配额不存在返回 None
pub fn lock_capacity(
    conn: &Connection,
    capacity_id: &str,
) -> RepositoryResult<Option<CapacityAllocation>> {
    let touched = conn.execute(
        "UPDATE capacity_allocation SET lock_version = lock_version + 1 WHERE capacity_id = ?1",
        params![capacity_id],
    )?;
    if touched == 0 {
        return Ok(None);
    }
    find_capacity_in(conn, capacity_id)
}

/// 配额下已分配合计; exclude 为需要排除的分配记录 (更新时排除自身)
pub fn sum_allocated_in(
    conn: &Connection,
    capacity_id: &str,
    exclude: Option<&str>,
) -> RepositoryResult<i64> {
    let total: i64 = conn.query_row(
        r#"
        SELECT COALESCE(SUM(quantity), 0) FROM site_allocation
        WHERE capacity_id = ?1
          AND (?2 IS NULL OR allocation_id <> ?2)
        "#,
        params![capacity_id, exclude],
        |row| row.get(0),
    )?;
    Ok(total)
}

pub fn find_capacity_in(
    conn: &Connection,
    capacity_id: &str,
) -> RepositoryResult<Option<CapacityAllocation>> {
    let sql = format!(
        "SELECT {} FROM capacity_allocation WHERE capacity_id = ?1",
        CAPACITY_COLUMNS
    );
    conn.query_row(&sql, params![capacity_id], map_capacity_row)
        .optional()?
        .map(RawCapacity::into_domain)
        .transpose()
}

pub fn find_capacity_by_unit_role_in(
    conn: &Connection,
    unit_id: &str,
    role: StaffRole,
) -> RepositoryResult<Option<CapacityAllocation>> {
    let sql = format!(
        "SELECT {} FROM capacity_allocation WHERE unit_id = ?1 AND role = ?2",
        CAPACITY_COLUMNS
    );
    conn.query_row(&sql, params![unit_id, role.to_db_str()], map_capacity_row)
        .optional()?
        .map(RawCapacity::into_domain)
        .transpose()
}

pub fn find_allocation_in(
    conn: &Connection,
    allocation_id: &str,
) -> RepositoryResult<Option<SiteAllocation>> {
    let sql = format!(
        "SELECT {} FROM site_allocation WHERE allocation_id = ?1",
        ALLOCATION_COLUMNS
    );
    conn.query_row(&sql, params![allocation_id], map_allocation_row)
        .optional()?
        .map(RawAllocation::into_domain)
        .transpose()
}

pub fn find_site_in(conn: &Connection, site_id: &str) -> RepositoryResult<Option<FunctionalSite>> {
    conn.query_row(
        "SELECT site_id, unit_id, name FROM functional_site WHERE site_id = ?1",
        params![site_id],
        |row| {
            Ok(FunctionalSite {
                site_id: row.get(0)?,
                unit_id: row.get(1)?,
                name: row.get(2)?,
            })
        },
    )
    .optional()
    .map_err(|e| e.into())
}

pub fn insert_capacity(conn: &Connection, capacity: &CapacityAllocation) -> RepositoryResult<()> {
    conn.execute(
        r#"
        INSERT INTO capacity_allocation (
            capacity_id, unit_id, role, quantity, lock_version, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6)
        "#,
        params![
            capacity.capacity_id,
            capacity.unit_id,
            capacity.role.to_db_str(),
            capacity.quantity,
            format_timestamp(capacity.created_at),
            format_timestamp(capacity.updated_at),
        ],
    )?;
    Ok(())
}

pub fn update_capacity_quantity(
    conn: &Connection,
    capacity_id: &str,
    quantity: i64,
    now: DateTime<Utc>,
) -> RepositoryResult<()> {
    let affected = conn.execute(
        "UPDATE capacity_allocation SET quantity = ?2, updated_at = ?3 WHERE capacity_id = ?1",
        params![capacity_id, quantity, format_timestamp(now)],
    )?;
    if affected == 0 {
        return Err(RepositoryError::not_found("CapacityAllocation", capacity_id));
    }
    Ok(())
}

pub fn insert_allocation(conn: &Connection, allocation: &SiteAllocation) -> RepositoryResult<()> {
    conn.execute(
        r#"
        INSERT INTO site_allocation (
            allocation_id, capacity_id, site_id, quantity, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            allocation.allocation_id,
            allocation.capacity_id,
            allocation.site_id,
            allocation.quantity,
            format_timestamp(allocation.created_at),
            format_timestamp(allocation.updated_at),
        ],
    )?;
    Ok(())
}

pub fn update_allocation_quantity(
    conn: &Connection,
    allocation_id: &str,
    quantity: i64,
    now: DateTime<Utc>,
) -> RepositoryResult<()> {
    let affected = conn.execute(
        "UPDATE site_allocation SET quantity = ?2, updated_at = ?3 WHERE allocation_id = ?1",
        params![allocation_id, quantity, format_timestamp(now)],
    )?;
    if affected == 0 {
        return Err(RepositoryError::not_found("SiteAllocation", allocation_id));
    }
    Ok(())
}

/// 删除分配记录, 返回删除行数
pub fn delete_allocation(conn: &Connection, allocation_id: &str) -> RepositoryResult<usize> {
    let affected = conn.execute(
        "DELETE FROM site_allocation WHERE allocation_id = ?1",
        params![allocation_id],
    )?;
    Ok(affected)
}

// ==========================================
// 行映射
// ==========================================

struct RawCapacity {
    capacity_id: String,
    unit_id: String,
    role: String,
    quantity: i64,
    created_at: String,
    updated_at: String,
}

impl RawCapacity {
    fn into_domain(self) -> RepositoryResult<CapacityAllocation> {
        Ok(CapacityAllocation {
            role: self
                .role
                .parse::<StaffRole>()
                .map_err(|e| RepositoryError::field("role", e))?,
            created_at: parse_ts("created_at", &self.created_at)?,
            updated_at: parse_ts("updated_at", &self.updated_at)?,
            capacity_id: self.capacity_id,
            unit_id: self.unit_id,
            quantity: self.quantity,
        })
    }
}

fn map_capacity_row(row: &Row<'_>) -> rusqlite::Result<RawCapacity> {
    Ok(RawCapacity {
        capacity_id: row.get(0)?,
        unit_id: row.get(1)?,
        role: row.get(2)?,
        quantity: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

struct RawAllocation {
    allocation_id: String,
    capacity_id: String,
    site_id: String,
    quantity: i64,
    created_at: String,
    updated_at: String,
}

impl RawAllocation {
    fn into_domain(self) -> RepositoryResult<SiteAllocation> {
        Ok(SiteAllocation {
            created_at: parse_ts("created_at", &self.created_at)?,
            updated_at: parse_ts("updated_at", &self.updated_at)?,
            allocation_id: self.allocation_id,
            capacity_id: self.capacity_id,
            site_id: self.site_id,
            quantity: self.quantity,
        })
    }
}

fn map_allocation_row(row: &Row<'_>) -> rusqlite::Result<RawAllocation> {
    Ok(RawAllocation {
        allocation_id: row.get(0)?,
        capacity_id: row.get(1)?,
        site_id: row.get(2)?,
        quantity: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn parse_ts(field: &str, raw: &str) -> RepositoryResult<DateTime<Utc>> {
    parse_timestamp(raw).ok_or_else(|| RepositoryError::field(field, format!("无效时间戳: {}", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;

    fn setup() -> AllocationRepository {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute_batch(
            r#"
            INSERT INTO hospital VALUES ('H1', NULL, 'A');
            INSERT INTO unit VALUES ('U1', 'H1', 'Clinica', 'INTERNMENT', 'CLINICAL');
            INSERT INTO functional_site VALUES ('S1', 'U1', 'Posto 1'), ('S2', 'U1', 'Posto 2');
            "#,
        )
        .unwrap();
        AllocationRepository::new(Arc::new(Mutex::new(conn)))
    }

    fn capacity(quantity: i64) -> CapacityAllocation {
        let now = Utc::now();
        CapacityAllocation {
            capacity_id: "C1".to_string(),
            unit_id: "U1".to_string(),
            role: StaffRole::Nurse,
            quantity,
            created_at: now,
            updated_at: now,
        }
    }

    fn allocation(id: &str, site: &str, quantity: i64) -> SiteAllocation {
        let now = Utc::now();
        SiteAllocation {
            allocation_id: id.to_string(),
            capacity_id: "C1".to_string(),
            site_id: site.to_string(),
            quantity,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_sum_with_self_exclusion() {
        let repo = setup();
        repo.with_write_transaction(|tx| -> RepositoryResult<()> {
            insert_capacity(tx, &capacity(10))?;
            insert_allocation(tx, &allocation("A1", "S1", 3))?;
            insert_allocation(tx, &allocation("A2", "S2", 4))?;
            Ok(())
        })
        .unwrap();

        assert_eq!(repo.allocated_total("C1").unwrap(), 7);
        let excluded = repo
            .with_write_transaction(|tx| sum_allocated_in(tx, "C1", Some("A1")))
            .unwrap();
        assert_eq!(excluded, 4);
        assert_eq!(repo.list_allocations("C1").unwrap().len(), 2);
    }

    #[test]
    fn test_failed_closure_rolls_back() {
        let repo = setup();
        let result = repo.with_write_transaction(|tx| -> RepositoryResult<()> {
            insert_capacity(tx, &capacity(1))?;
            Err(RepositoryError::ValidationError("abort".to_string()))
        });
        assert!(result.is_err());
        assert!(repo.find_capacity("C1").unwrap().is_none());
    }

    #[test]
    fn test_lock_missing_capacity_returns_none() {
        let repo = setup();
        let locked = repo
            .with_write_transaction(|tx| lock_capacity(tx, "nope"))
            .unwrap();
        assert!(locked.is_none());
    }
}
