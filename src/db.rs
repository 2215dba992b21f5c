// ==========================================
// 护理人力测算系统 - SQLite 连接初始化与建表
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout, 配额写事务排队等待而非直接失败
// - 建表幂等 (CREATE TABLE IF NOT EXISTS), 多实例共享同一库文件
// ==========================================

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 时间戳落库格式 (UTC, 毫秒精度, 字典序 = 时间序)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// 普查时间格式
pub const CENSUS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 建表（幂等）
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        -- ===== 组织层级 =====
        CREATE TABLE IF NOT EXISTS network (
            network_id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS hospital_group (
            group_id TEXT PRIMARY KEY,
            network_id TEXT REFERENCES network(network_id),
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS region (
            region_id TEXT PRIMARY KEY,
            group_id TEXT REFERENCES hospital_group(group_id),
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS hospital (
            hospital_id TEXT PRIMARY KEY,
            region_id TEXT REFERENCES region(region_id),
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS unit (
            unit_id TEXT PRIMARY KEY,
            hospital_id TEXT NOT NULL REFERENCES hospital(hospital_id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            unit_type TEXT NOT NULL,
            sector_type TEXT NOT NULL DEFAULT 'GENERAL'
        );
        CREATE INDEX IF NOT EXISTS idx_unit_hospital ON unit(hospital_id);

        -- ===== 床位与普查 =====
        CREATE TABLE IF NOT EXISTS bed (
            bed_id TEXT PRIMARY KEY,
            unit_id TEXT NOT NULL REFERENCES unit(unit_id) ON DELETE CASCADE,
            status TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_bed_unit ON bed(unit_id, status);

        CREATE TABLE IF NOT EXISTS bed_census (
            unit_id TEXT NOT NULL REFERENCES unit(unit_id) ON DELETE CASCADE,
            census_at TEXT NOT NULL,
            total_beds INTEGER NOT NULL,
            occupied INTEGER NOT NULL,
            vacant INTEGER NOT NULL,
            inactive INTEGER NOT NULL,
            PRIMARY KEY (unit_id, census_at)
        );

        CREATE TABLE IF NOT EXISTS patient_classification (
            unit_id TEXT NOT NULL REFERENCES unit(unit_id) ON DELETE CASCADE,
            census_date TEXT NOT NULL,
            classification TEXT NOT NULL,
            patient_count INTEGER NOT NULL,
            PRIMARY KEY (unit_id, census_date, classification)
        );

        -- ===== 人力 =====
        CREATE TABLE IF NOT EXISTS unit_staff (
            unit_id TEXT NOT NULL REFERENCES unit(unit_id) ON DELETE CASCADE,
            role TEXT NOT NULL,
            headcount INTEGER NOT NULL,
            PRIMARY KEY (unit_id, role)
        );

        CREATE TABLE IF NOT EXISTS staff_snapshot (
            snapshot_id TEXT PRIMARY KEY,
            hospital_id TEXT NOT NULL REFERENCES hospital(hospital_id) ON DELETE CASCADE,
            scope TEXT NOT NULL,
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_staff_snapshot_hospital
            ON staff_snapshot(hospital_id, created_at);

        -- ===== 配额 =====
        CREATE TABLE IF NOT EXISTS functional_site (
            site_id TEXT PRIMARY KEY,
            unit_id TEXT NOT NULL REFERENCES unit(unit_id) ON DELETE CASCADE,
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS capacity_allocation (
            capacity_id TEXT PRIMARY KEY,
            unit_id TEXT NOT NULL REFERENCES unit(unit_id) ON DELETE CASCADE,
            role TEXT NOT NULL,
            quantity INTEGER NOT NULL CHECK (quantity >= 0),
            lock_version INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (unit_id, role)
        );

        CREATE TABLE IF NOT EXISTS site_allocation (
            allocation_id TEXT PRIMARY KEY,
            capacity_id TEXT NOT NULL REFERENCES capacity_allocation(capacity_id) ON DELETE CASCADE,
            site_id TEXT NOT NULL REFERENCES functional_site(site_id) ON DELETE CASCADE,
            quantity INTEGER NOT NULL CHECK (quantity > 0),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_site_allocation_capacity
            ON site_allocation(capacity_id, site_id);

        -- ===== 测算缓存 =====
        CREATE TABLE IF NOT EXISTS dimensioning_cache (
            unit_id TEXT NOT NULL,
            unit_type TEXT NOT NULL,
            hospital_id TEXT NOT NULL,
            payload TEXT NOT NULL,
            param_hash TEXT NOT NULL,
            compute_ms INTEGER NOT NULL DEFAULT 0,
            record_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (unit_id, unit_type)
        );
        CREATE INDEX IF NOT EXISTS idx_dimensioning_cache_hospital
            ON dimensioning_cache(hospital_id);
        CREATE INDEX IF NOT EXISTS idx_dimensioning_cache_updated
            ON dimensioning_cache(updated_at);
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 打开连接并确保表结构存在
pub fn open_and_init(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = open_sqlite_connection(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// UTC 时间戳 → 落库字符串
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// 落库字符串 → UTC 时间戳
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, CENSUS_FORMAT))
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_timestamp_format_round_trip_and_ordering() {
        let a = Utc.with_ymd_and_hms(2026, 3, 1, 9, 5, 0).unwrap();
        let b = a + chrono::Duration::milliseconds(1500);
        let (sa, sb) = (format_timestamp(a), format_timestamp(b));
        assert!(sa < sb);
        assert_eq!(parse_timestamp(&sb), Some(b));
        assert_eq!(parse_timestamp("2026-03-01 09:05:00"), Some(a));
        assert_eq!(parse_timestamp("yesterday"), None);
    }
}
