// ==========================================
// 护理人力测算系统 - 医院/单元/层级仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::domain::occupancy::{Hospital, Unit};
use crate::domain::types::{ScopeKind, UnitType};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

// ==========================================
// HospitalRepository - 医院目录仓储
// ==========================================
pub struct HospitalRepository {
    conn: Arc<Mutex<Connection>>,
}

impl HospitalRepository {
    /// 创建新的HospitalRepository实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn find_hospital(&self, hospital_id: &str) -> RepositoryResult<Option<Hospital>> {
        let conn = self.get_conn()?;
        conn.query_row(
            "SELECT hospital_id, name, region_id FROM hospital WHERE hospital_id = ?1",
            params![hospital_id],
            |row| {
                Ok(Hospital {
                    hospital_id: row.get(0)?,
                    name: row.get(1)?,
                    region_id: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(|e| e.into())
    }

    pub fn find_unit(&self, unit_id: &str) -> RepositoryResult<Option<Unit>> {
        let conn = self.get_conn()?;
        let raw = conn
            .query_row(
                r#"
                SELECT unit_id, hospital_id, name, unit_type, sector_type
                FROM unit WHERE unit_id = ?1
                "#,
                params![unit_id],
                map_unit_row,
            )
            .optional()?;
        raw.map(RawUnit::into_unit).transpose()
    }

    /// 查询医院下的单元; unit_type 为 None 时返回全部
    pub fn list_units(
        &self,
        hospital_id: &str,
        unit_type: Option<UnitType>,
    ) -> RepositoryResult<Vec<Unit>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT unit_id, hospital_id, name, unit_type, sector_type
            FROM unit
            WHERE hospital_id = ?1
              AND (?2 IS NULL OR unit_type = ?2)
            ORDER BY name, unit_id
            "#,
        )?;

        let rows = stmt
            .query_map(
                params![hospital_id, unit_type.map(|t| t.to_db_str())],
                map_unit_row,
            )?
            .collect::<Result<Vec<RawUnit>, _>>()?;

        rows.into_iter().map(RawUnit::into_unit).collect()
    }

    pub fn upsert_unit(&self, unit: &Unit) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO unit (unit_id, hospital_id, name, unit_type, sector_type)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(unit_id) DO UPDATE SET
                hospital_id = ?2, name = ?3, unit_type = ?4, sector_type = ?5
            "#,
            params![
                unit.unit_id,
                unit.hospital_id,
                unit.name,
                unit.unit_type.to_db_str(),
                unit.sector_type,
            ],
        )?;
        Ok(())
    }

    /// 查询层级下的医院ID
    ///
    /// # 返回
    /// - Ok(None): 层级本身不存在
    /// - Ok(Some(ids)): 层级存在 (可能没有医院)
    pub fn hospitals_in_scope(
        &self,
        kind: ScopeKind,
        scope_id: &str,
    ) -> RepositoryResult<Option<Vec<String>>> {
        let conn = self.get_conn()?;

        let (exists_sql, members_sql) = match kind {
            ScopeKind::Region => (
                "SELECT 1 FROM region WHERE region_id = ?1",
                r#"
                SELECT h.hospital_id FROM hospital h
                WHERE h.region_id = ?1
                ORDER BY h.hospital_id
                "#,
            ),
            ScopeKind::Group => (
                "SELECT 1 FROM hospital_group WHERE group_id = ?1",
                r#"
                SELECT h.hospital_id FROM hospital h
                JOIN region r ON r.region_id = h.region_id
                WHERE r.group_id = ?1
                ORDER BY h.hospital_id
                "#,
            ),
            ScopeKind::Network => (
                "SELECT 1 FROM network WHERE network_id = ?1",
                r#"
                SELECT h.hospital_id FROM hospital h
                JOIN region r ON r.region_id = h.region_id
                JOIN hospital_group g ON g.group_id = r.group_id
                WHERE g.network_id = ?1
                ORDER BY h.hospital_id
                "#,
            ),
        };

        let exists = conn
            .query_row(exists_sql, params![scope_id], |_row| Ok(()))
            .optional()?
            .is_some();
        if !exists {
            return Ok(None);
        }

        let mut stmt = conn.prepare(members_sql)?;
        let ids = stmt
            .query_map(params![scope_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(Some(ids))
    }
}

struct RawUnit {
    unit_id: String,
    hospital_id: String,
    name: String,
    unit_type: String,
    sector_type: String,
}

impl RawUnit {
    fn into_unit(self) -> RepositoryResult<Unit> {
        let unit_type = self
            .unit_type
            .parse::<UnitType>()
            .map_err(|e| RepositoryError::field("unit_type", e))?;
        Ok(Unit {
            unit_id: self.unit_id,
            hospital_id: self.hospital_id,
            name: self.name,
            unit_type,
            sector_type: self.sector_type,
        })
    }
}

fn map_unit_row(row: &Row<'_>) -> rusqlite::Result<RawUnit> {
    Ok(RawUnit {
        unit_id: row.get(0)?,
        hospital_id: row.get(1)?,
        name: row.get(2)?,
        unit_type: row.get(3)?,
        sector_type: row.get(4)?,
    })
}
