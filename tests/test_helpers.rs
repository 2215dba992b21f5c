// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库初始化、组织层级与普查数据播种
// ==========================================

#![allow(dead_code)]

use rusqlite::{params, Connection};
use staffing_dimensioning::app::AppState;
use staffing_dimensioning::db::{format_timestamp, open_and_init, open_sqlite_connection};
use std::error::Error;
use tempfile::NamedTempFile;

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    staffing_dimensioning::logging::init_test();

    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_str().ok_or("非 UTF-8 路径")?.to_string();

    open_and_init(&db_path)?;

    Ok((temp_file, db_path))
}

/// 打开一条独立连接 (PRAGMA 与生产一致)
pub fn open_conn(db_path: &str) -> Connection {
    open_sqlite_connection(db_path).unwrap()
}

/// 建立 AppState (临时库)
pub fn create_app_state(db_path: &str) -> AppState {
    AppState::new(db_path.to_string()).unwrap()
}

// ==========================================
// 播种
// ==========================================

/// 网络 N1 → 集团 G1 → 区域 R1
pub fn seed_hierarchy(conn: &Connection) {
    conn.execute_batch(
        r#"
        INSERT INTO network VALUES ('N1', 'Rede');
        INSERT INTO hospital_group VALUES ('G1', 'N1', 'Grupo');
        INSERT INTO region VALUES ('R1', 'G1', 'Sul');
        "#,
    )
    .unwrap();
}

pub fn seed_hospital(conn: &Connection, hospital_id: &str, region_id: Option<&str>) {
    conn.execute(
        "INSERT INTO hospital (hospital_id, region_id, name) VALUES (?1, ?2, ?3)",
        params![hospital_id, region_id, format!("Hospital {}", hospital_id)],
    )
    .unwrap();
}

pub fn seed_unit(
    conn: &Connection,
    unit_id: &str,
    hospital_id: &str,
    name: &str,
    unit_type: &str,
    sector_type: &str,
) {
    conn.execute(
        "INSERT INTO unit (unit_id, hospital_id, name, unit_type, sector_type) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![unit_id, hospital_id, name, unit_type, sector_type],
    )
    .unwrap();
}

/// 写入一条普查记录; census_at 格式 "YYYY-MM-DD HH:MM:SS"
pub fn seed_census(
    conn: &Connection,
    unit_id: &str,
    census_at: &str,
    total: i64,
    occupied: i64,
    inactive: i64,
) {
    conn.execute(
        r#"
        INSERT INTO bed_census (unit_id, census_at, total_beds, occupied, vacant, inactive)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![unit_id, census_at, total, occupied, total - occupied - inactive, inactive],
    )
    .unwrap();
}

pub fn seed_classification(
    conn: &Connection,
    unit_id: &str,
    census_date: &str,
    classification: &str,
    patient_count: i64,
) {
    conn.execute(
        r#"
        INSERT INTO patient_classification (unit_id, census_date, classification, patient_count)
        VALUES (?1, ?2, ?3, ?4)
        "#,
        params![unit_id, census_date, classification, patient_count],
    )
    .unwrap();
}

pub fn seed_staff(conn: &Connection, unit_id: &str, nurses: i64, technicians: i64) {
    conn.execute(
        "INSERT INTO unit_staff (unit_id, role, headcount) VALUES (?1, 'NURSE', ?2)",
        params![unit_id, nurses],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO unit_staff (unit_id, role, headcount) VALUES (?1, 'TECHNICIAN', ?2)",
        params![unit_id, technicians],
    )
    .unwrap();
}

/// 原样写入人力快照载荷 (可用于构造损坏数据)
pub fn seed_raw_snapshot(conn: &Connection, hospital_id: &str, scope: &str, payload: &str) {
    conn.execute(
        r#"
        INSERT INTO staff_snapshot (snapshot_id, hospital_id, scope, payload, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            uuid::Uuid::new_v4().to_string(),
            hospital_id,
            scope,
            payload,
            format_timestamp(chrono::Utc::now())
        ],
    )
    .unwrap();
}

pub fn seed_site(conn: &Connection, site_id: &str, unit_id: &str) {
    conn.execute(
        "INSERT INTO functional_site (site_id, unit_id, name) VALUES (?1, ?2, ?3)",
        params![site_id, unit_id, format!("Posto {}", site_id)],
    )
    .unwrap();
}
