// ==========================================
// 护理人力测算系统 - 测算缓存仓储
// ==========================================
// 表: dimensioning_cache, 主键 (unit_id, unit_type)
// 新鲜度判定下推到 SQL: updated_at > cutoff
// 时间戳字符串字典序即时间序 (见 db::TIMESTAMP_FORMAT)
// ==========================================

use crate::db::{format_timestamp, parse_timestamp};
use crate::domain::cache::{CacheEntry, CacheKey, CacheMetadata};
use crate::domain::types::UnitType;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    SELECT unit_id, unit_type, hospital_id, payload, param_hash,
           compute_ms, record_count, created_at, updated_at
    FROM dimensioning_cache
"#;

// ==========================================
// DimensioningCacheRepository
// ==========================================
pub struct DimensioningCacheRepository {
    conn: Arc<Mutex<Connection>>,
}

impl DimensioningCacheRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 查询单个键, 不判断新鲜度
    pub fn find(&self, key: &CacheKey) -> RepositoryResult<Option<CacheEntry>> {
        let conn = self.get_conn()?;
        let sql = format!("{} WHERE unit_id = ?1 AND unit_type = ?2", SELECT_COLUMNS);
        conn.query_row(
            &sql,
            params![key.unit_id, key.unit_type.to_db_str()],
            map_cache_row,
        )
        .optional()?
        .map(RawCacheRow::into_entry)
        .transpose()
    }

    /// 查询单个键; 仅返回 updated_at 晚于 cutoff 的记录
    pub fn find_fresh(
        &self,
        key: &CacheKey,
        cutoff: DateTime<Utc>,
    ) -> RepositoryResult<Option<CacheEntry>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "{} WHERE unit_id = ?1 AND unit_type = ?2 AND updated_at > ?3",
            SELECT_COLUMNS
        );
        conn.query_row(
            &sql,
            params![key.unit_id, key.unit_type.to_db_str(), format_timestamp(cutoff)],
            map_cache_row,
        )
        .optional()?
        .map(RawCacheRow::into_entry)
        .transpose()
    }

    /// 批量查询, 单条 SQL; 只返回新鲜记录 (顺序不保证)
    pub fn batch_find_fresh(
        &self,
        keys: &[CacheKey],
        cutoff: DateTime<Utc>,
    ) -> RepositoryResult<Vec<CacheEntry>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let key_clause = (0..keys.len())
            .map(|i| format!("(unit_id = ?{} AND unit_type = ?{})", i * 2 + 2, i * 2 + 3))
            .collect::<Vec<_>>()
            .join(" OR ");
        let sql = format!(
            "{} WHERE updated_at > ?1 AND ({})",
            SELECT_COLUMNS, key_clause
        );

        let mut values: Vec<String> = Vec::with_capacity(keys.len() * 2 + 1);
        values.push(format_timestamp(cutoff));
        for key in keys {
            values.push(key.unit_id.clone());
            values.push(key.unit_type.to_db_str().to_string());
        }

        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), map_cache_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawCacheRow::into_entry).collect()
    }

    /// 写入或覆盖; 覆盖时保留首次 created_at
    pub fn upsert(&self, entry: &CacheEntry) -> RepositoryResult<()> {
        let payload = serde_json::to_string(&entry.payload)?;
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO dimensioning_cache (
                unit_id, unit_type, hospital_id, payload, param_hash,
                compute_ms, record_count, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(unit_id, unit_type) DO UPDATE SET
                hospital_id = ?3,
                payload = ?4,
                param_hash = ?5,
                compute_ms = ?6,
                record_count = ?7,
                updated_at = ?9
            "#,
            params![
                entry.key.unit_id,
                entry.key.unit_type.to_db_str(),
                entry.hospital_id,
                payload,
                entry.param_hash,
                entry.metadata.compute_ms,
                entry.metadata.record_count,
                format_timestamp(entry.created_at),
                format_timestamp(entry.updated_at),
            ],
        )?;
        Ok(())
    }

    /// 删除单元缓存; unit_type 为 None 时删除该单元全部类型
    pub fn delete_by_unit(
        &self,
        unit_id: &str,
        unit_type: Option<UnitType>,
    ) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "DELETE FROM dimensioning_cache WHERE unit_id = ?1 AND (?2 IS NULL OR unit_type = ?2)",
            params![unit_id, unit_type.map(|t| t.to_db_str())],
        )?;
        Ok(affected)
    }

    pub fn delete_by_hospital(&self, hospital_id: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "DELETE FROM dimensioning_cache WHERE hospital_id = ?1",
            params![hospital_id],
        )?;
        Ok(affected)
    }

    pub fn delete_all(&self) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let affected = conn.execute("DELETE FROM dimensioning_cache", [])?;
        Ok(affected)
    }

    /// 删除 updated_at <= cutoff 的记录
    pub fn delete_older_than(&self, cutoff: DateTime<Utc>) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "DELETE FROM dimensioning_cache WHERE updated_at <= ?1",
            params![format_timestamp(cutoff)],
        )?;
        Ok(affected)
    }

    pub fn count(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM dimensioning_cache", [], |row| {
            row.get(0)
        })?;
        Ok(n)
    }
}

struct RawCacheRow {
    unit_id: String,
    unit_type: String,
    hospital_id: String,
    payload: String,
    param_hash: String,
    compute_ms: i64,
    record_count: i64,
    created_at: String,
    updated_at: String,
}

impl RawCacheRow {
    fn into_entry(self) -> RepositoryResult<CacheEntry> {
        let unit_type = self
            .unit_type
            .parse::<UnitType>()
            .map_err(|e| RepositoryError::field("unit_type", e))?;
        let payload: serde_json::Value = serde_json::from_str(&self.payload)?;
        let created_at = parse_timestamp(&self.created_at)
            .ok_or_else(|| RepositoryError::field("created_at", self.created_at.clone()))?;
        let updated_at = parse_timestamp(&self.updated_at)
            .ok_or_else(|| RepositoryError::field("updated_at", self.updated_at.clone()))?;

        Ok(CacheEntry {
            key: CacheKey::new(self.unit_id, unit_type),
            hospital_id: self.hospital_id,
            payload,
            param_hash: self.param_hash,
            created_at,
            updated_at,
            metadata: CacheMetadata {
                compute_ms: self.compute_ms,
                record_count: self.record_count,
            },
        })
    }
}

fn map_cache_row(row: &Row<'_>) -> rusqlite::Result<RawCacheRow> {
    Ok(RawCacheRow {
        unit_id: row.get(0)?,
        unit_type: row.get(1)?,
        hospital_id: row.get(2)?,
        payload: row.get(3)?,
        param_hash: row.get(4)?,
        compute_ms: row.get(5)?,
        record_count: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn setup() -> DimensioningCacheRepository {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        DimensioningCacheRepository::new(Arc::new(Mutex::new(conn)))
    }

    fn entry(unit_id: &str, hospital_id: &str, at: DateTime<Utc>) -> CacheEntry {
        CacheEntry {
            key: CacheKey::new(unit_id, UnitType::Internment),
            hospital_id: hospital_id.to_string(),
            payload: json!({ "unit": unit_id }),
            param_hash: "h".to_string(),
            created_at: at,
            updated_at: at,
            metadata: CacheMetadata::default(),
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_find_fresh_respects_cutoff() {
        let repo = setup();
        repo.upsert(&entry("U1", "H1", t0())).unwrap();
        let key = CacheKey::new("U1", UnitType::Internment);

        assert!(repo.find_fresh(&key, t0() - Duration::seconds(1)).unwrap().is_some());
        assert!(repo.find_fresh(&key, t0()).unwrap().is_none());
        assert!(repo
            .find_fresh(&CacheKey::new("U1", UnitType::Neutral), t0() - Duration::hours(1))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_upsert_keeps_created_at() {
        let repo = setup();
        repo.upsert(&entry("U1", "H1", t0())).unwrap();
        let later = t0() + Duration::minutes(5);
        let mut updated = entry("U1", "H1", later);
        updated.payload = json!({ "v": 2 });
        repo.upsert(&updated).unwrap();

        let got = repo
            .find_fresh(&CacheKey::new("U1", UnitType::Internment), t0())
            .unwrap()
            .unwrap();
        assert_eq!(got.created_at, t0());
        assert_eq!(got.updated_at, later);
        assert_eq!(got.payload, json!({ "v": 2 }));
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn test_batch_and_scoped_deletes() {
        let repo = setup();
        repo.upsert(&entry("U1", "H1", t0())).unwrap();
        repo.upsert(&entry("U2", "H1", t0())).unwrap();
        repo.upsert(&entry("U3", "H2", t0() + Duration::minutes(10))).unwrap();

        let keys: Vec<CacheKey> = ["U1", "U3", "U9"]
            .iter()
            .map(|u| CacheKey::new(*u, UnitType::Internment))
            .collect();
        let found = repo.batch_find_fresh(&keys, t0() - Duration::minutes(1)).unwrap();
        assert_eq!(found.len(), 2);

        assert_eq!(repo.delete_older_than(t0()).unwrap(), 2);
        assert_eq!(repo.delete_by_hospital("H2").unwrap(), 1);
        assert_eq!(repo.delete_all().unwrap(), 0);
    }
}
