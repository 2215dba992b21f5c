// ==========================================
// 护理人力测算系统 - 人力仓储
// ==========================================
// 两类来源:
// - unit_staff: 基线人数表 (旧模型)
// - staff_snapshot: 带范围标签的快照 (新模型), 在此解码校验
// ==========================================

use crate::db::{format_timestamp, TIMESTAMP_FORMAT};
use crate::domain::occupancy::UnitHeadcount;
use crate::domain::snapshot::StaffSnapshot;
use crate::domain::types::StaffRole;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

// ==========================================
// StaffRepository - 人力仓储
// ==========================================
pub struct StaffRepository {
    conn: Arc<Mutex<Connection>>,
}

impl StaffRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 基线人数 (无记录的岗位计为 0)
    pub fn baseline_headcount(&self, unit_id: &str) -> RepositoryResult<UnitHeadcount> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT role, headcount FROM unit_staff WHERE unit_id = ?1")?;
        let rows = stmt
            .query_map(params![unit_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut headcount = UnitHeadcount::default();
        for (role, count) in rows {
            match role
                .parse::<StaffRole>()
                .map_err(|e| RepositoryError::field("role", e))?
            {
                StaffRole::Nurse => headcount.nurses = count,
                StaffRole::Technician => headcount.technicians = count,
            }
        }
        Ok(headcount)
    }

    pub fn set_baseline_headcount(
        &self,
        unit_id: &str,
        role: StaffRole,
        headcount: i64,
    ) -> RepositoryResult<()> {
        if headcount < 0 {
            return Err(RepositoryError::field("headcount", "人数不能为负"));
        }
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO unit_staff (unit_id, role, headcount) VALUES (?1, ?2, ?3)
            ON CONFLICT(unit_id, role) DO UPDATE SET headcount = ?3
            "#,
            params![unit_id, role.to_db_str(), headcount],
        )?;
        Ok(())
    }

    /// 医院是否存在人力快照 (用于选择人数来源策略)
    pub fn has_snapshots(&self, hospital_id: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM staff_snapshot WHERE hospital_id = ?1",
            params![hospital_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// 按写入时间升序读取医院的全部快照并解码
    ///
    /// 任一快照解码失败即返回 ValidationError (不做下游字段猜测)
    pub fn list_snapshots(&self, hospital_id: &str) -> RepositoryResult<Vec<StaffSnapshot>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT snapshot_id, scope, payload FROM staff_snapshot
            WHERE hospital_id = ?1
            ORDER BY created_at, snapshot_id
            "#,
        )?;
        let rows = stmt
            .query_map(params![hospital_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(snapshot_id, scope, payload)| {
                let snapshot: StaffSnapshot = serde_json::from_str(&payload).map_err(|e| {
                    RepositoryError::ValidationError(format!(
                        "人力快照解码失败: snapshot_id={}, {}",
                        snapshot_id, e
                    ))
                })?;
                if snapshot.scope_str() != scope {
                    return Err(RepositoryError::ValidationError(format!(
                        "人力快照范围不一致: snapshot_id={}, column={}, payload={}",
                        snapshot_id,
                        scope,
                        snapshot.scope_str()
                    )));
                }
                Ok(snapshot)
            })
            .collect()
    }

    /// 写入快照, 返回 snapshot_id
    pub fn insert_snapshot(
        &self,
        hospital_id: &str,
        snapshot: &StaffSnapshot,
        created_at: DateTime<Utc>,
    ) -> RepositoryResult<String> {
        let payload = serde_json::to_string(snapshot)
            .map_err(|e| RepositoryError::InternalError(e.to_string()))?;
        self.insert_raw_snapshot(hospital_id, snapshot.scope_str(), &payload, created_at)
    }

    /// 原样写入快照载荷 (上游同步用; 读取时才校验)
    pub fn insert_raw_snapshot(
        &self,
        hospital_id: &str,
        scope: &str,
        payload: &str,
        created_at: DateTime<Utc>,
    ) -> RepositoryResult<String> {
        let snapshot_id = Uuid::new_v4().to_string();
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO staff_snapshot (snapshot_id, hospital_id, scope, payload, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                snapshot_id,
                hospital_id,
                scope,
                payload,
                format_timestamp(created_at)
            ],
        )?;
        tracing::debug!(
            hospital_id,
            scope,
            created_at = %created_at.format(TIMESTAMP_FORMAT),
            "staff snapshot stored"
        );
        Ok(snapshot_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;

    fn setup() -> StaffRepository {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute_batch(
            r#"
            INSERT INTO hospital VALUES ('H1', NULL, 'A');
            INSERT INTO unit VALUES ('U1', 'H1', 'Clinica', 'INTERNMENT', 'CLINICAL');
            "#,
        )
        .unwrap();
        StaffRepository::new(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_baseline_headcount_defaults_to_zero() {
        let repo = setup();
        repo.set_baseline_headcount("U1", StaffRole::Nurse, 4).unwrap();
        assert_eq!(
            repo.baseline_headcount("U1").unwrap(),
            UnitHeadcount {
                nurses: 4,
                technicians: 0
            }
        );
        assert!(repo.set_baseline_headcount("U1", StaffRole::Nurse, -1).is_err());
    }

    #[test]
    fn test_snapshot_decode_at_boundary() {
        let repo = setup();
        assert!(!repo.has_snapshots("H1").unwrap());

        let snapshot = StaffSnapshot::Unit {
            unit_id: "U1".to_string(),
            nurses: 3,
            technicians: 6,
        };
        repo.insert_snapshot("H1", &snapshot, Utc::now()).unwrap();
        assert!(repo.has_snapshots("H1").unwrap());
        assert_eq!(repo.list_snapshots("H1").unwrap(), vec![snapshot]);

        repo.insert_raw_snapshot("H1", "UNIT", r#"{"scope":"UNIT","nurses":"x"}"#, Utc::now())
            .unwrap();
        let err = repo.list_snapshots("H1").unwrap_err();
        assert!(matches!(err, RepositoryError::ValidationError(_)));
    }

    #[test]
    fn test_scope_column_must_match_payload() {
        let repo = setup();
        repo.insert_raw_snapshot(
            "H1",
            "HOSPITAL",
            r#"{"scope":"UNIT","unit_id":"U1","nurses":1,"technicians":1}"#,
            Utc::now(),
        )
        .unwrap();
        assert!(matches!(
            repo.list_snapshots("H1"),
            Err(RepositoryError::ValidationError(_))
        ));
    }
}
