// ==========================================
// 护理人力测算系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 数值统一经 common::value_parser 解析 ("85%" / "0,85" 均可)
// ==========================================

use crate::common::value_parser::{parse_decimal, parse_percentage};
use crate::config::dimensioning_config::DimensioningConfig;
use crate::domain::types::PatientClassification;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::HashMap;
use std::error::Error;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 写入 global scope 的配置值
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at) VALUES ('global', ?1, ?2, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 获取所有 global 配置的快照（JSON格式）
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: HashMap<String, String> = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }

    // ===== 测算参数 =====

    /// 加载测算参数
    ///
    /// # 说明
    /// - 缺失的键使用默认值
    /// - 无法解析的值记 warn 并回退默认值
    /// - 整体校验不通过时返回错误
    pub fn load_dimensioning_config(&self) -> Result<DimensioningConfig, Box<dyn Error>> {
        let defaults = DimensioningConfig::default();

        let cache_ttl_minutes = self
            .read_number(config_keys::CACHE_TTL_MINUTES, parse_decimal)?
            .map(|v| v.round() as i64)
            .unwrap_or(defaults.cache_ttl_minutes);
        let free_target_occupancy = self
            .read_number(config_keys::FREE_TARGET_OCCUPANCY, parse_percentage)?
            .unwrap_or(defaults.free_target_occupancy);
        let weekly_hours = self
            .read_number(config_keys::WEEKLY_HOURS, parse_decimal)?
            .unwrap_or(defaults.weekly_hours);
        let days_per_week = self
            .read_number(config_keys::DAYS_PER_WEEK, parse_decimal)?
            .unwrap_or(defaults.days_per_week);
        let technical_safety_index = self
            .read_number(config_keys::TECHNICAL_SAFETY_INDEX, parse_percentage)?
            .unwrap_or(defaults.technical_safety_index);

        let mut care_hours = defaults.care_hours.clone();
        for class in PatientClassification::ALL {
            let key = config_keys::care_hours_key(class);
            if let Some(hours) = self.read_number(&key, parse_decimal)? {
                care_hours.insert(class, hours);
            }
        }

        let config = DimensioningConfig {
            cache_ttl_minutes,
            free_target_occupancy,
            weekly_hours,
            days_per_week,
            technical_safety_index,
            care_hours,
        };
        config.validate()?;

        tracing::info!(
            cache_ttl_minutes = config.cache_ttl_minutes,
            free_target_occupancy = config.free_target_occupancy,
            staffing_marker = config.staffing_marker(),
            "测算参数已加载"
        );
        Ok(config)
    }

    fn read_number<F, E>(&self, key: &str, parse: F) -> Result<Option<f64>, Box<dyn Error>>
    where
        F: Fn(&str) -> Result<f64, E>,
        E: std::fmt::Display,
    {
        let Some(raw) = self.get_config_value(key)? else {
            return Ok(None);
        };
        match parse(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(
                    config_key = key,
                    raw_value = %raw,
                    error = %e,
                    "配置值格式错误，使用默认值"
                );
                Ok(None)
            }
        }
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    use crate::domain::types::PatientClassification;

    // 缓存
    pub const CACHE_TTL_MINUTES: &str = "dimensioning.cache_ttl_minutes";

    // 投影
    pub const FREE_TARGET_OCCUPANCY: &str = "dimensioning.free_target_occupancy";

    // 人员配置系数 KM
    pub const WEEKLY_HOURS: &str = "dimensioning.weekly_hours";
    pub const DAYS_PER_WEEK: &str = "dimensioning.days_per_week";
    pub const TECHNICAL_SAFETY_INDEX: &str = "dimensioning.technical_safety_index";

    /// 分级护理时数覆写键, 例如 dimensioning.hours.intensive
    pub fn care_hours_key(class: PatientClassification) -> String {
        format!("dimensioning.hours.{}", class.to_db_str().to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;

    fn setup() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn test_defaults_when_table_empty() {
        let manager = setup();
        let config = manager.load_dimensioning_config().unwrap();
        assert_eq!(config, DimensioningConfig::default());
    }

    #[test]
    fn test_overrides_go_through_value_parser() {
        let manager = setup();
        manager
            .set_global_config_value(config_keys::FREE_TARGET_OCCUPANCY, "75%")
            .unwrap();
        manager
            .set_global_config_value(config_keys::WEEKLY_HOURS, "30,5")
            .unwrap();
        manager
            .set_global_config_value(
                &config_keys::care_hours_key(PatientClassification::Intensive),
                "20",
            )
            .unwrap();
        manager
            .set_global_config_value(config_keys::CACHE_TTL_MINUTES, "abc")
            .unwrap();

        let config = manager.load_dimensioning_config().unwrap();
        assert!((config.free_target_occupancy - 0.75).abs() < 1e-12);
        assert!((config.weekly_hours - 30.5).abs() < 1e-12);
        assert_eq!(config.care_hours(PatientClassification::Intensive), 20.0);
        assert_eq!(config.cache_ttl_minutes, 30);

        let snapshot = manager.get_config_snapshot().unwrap();
        assert!(snapshot.contains("dimensioning.weekly_hours"));
    }

    #[test]
    fn test_invalid_config_fails_load() {
        let manager = setup();
        manager
            .set_global_config_value(config_keys::WEEKLY_HOURS, "0")
            .unwrap();
        assert!(manager.load_dimensioning_config().is_err());
    }
}
