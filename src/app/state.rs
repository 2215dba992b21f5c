// ==========================================
// 护理人力测算系统 - 应用状态
// ==========================================
// 职责: 启动时显式装配 Repository / Engine / Service / API
// 约束: 无全局单例, 所有组件通过构造参数注入
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::DimensioningApi;
use crate::config::{ConfigManager, DimensioningConfig};
use crate::engine::{NetworkAggregator, OccupancyAnalysisEngine, SqliteOccupancySource};
use crate::repository::{
    AllocationRepository, BedRepository, DimensioningCacheRepository, HospitalRepository,
    StaffRepository,
};
use crate::services::{AllocationLedger, DimensioningCache};

/// 应用状态
///
/// 持有共享连接与 API 实例, 命令层通过 `Arc` 克隆后移入阻塞任务
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 启动时加载的测算参数 (只读)
    pub config: Arc<DimensioningConfig>,

    /// 测算 API
    pub dimensioning_api: Arc<DimensioningApi>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 说明
    /// 该方法会:
    /// 1. 打开连接并建表
    /// 2. 加载测算配置
    /// 3. 初始化 Repository / Engine / Service
    /// 4. 创建 API 实例
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let mut conn = crate::db::open_and_init(&db_path)
            .map_err(|e| format!("无法打开数据库: {}", e))?;
        crate::perf::install_sqlite_tracing(&mut conn);
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 配置
        // ==========================================
        let config_manager = ConfigManager::from_connection(conn.clone())
            .map_err(|e| format!("无法创建ConfigManager: {}", e))?;
        let config = Arc::new(
            config_manager
                .load_dimensioning_config()
                .map_err(|e| format!("测算配置无效: {}", e))?,
        );

        // ==========================================
        // Repository 层
        // ==========================================
        let hospital_repo = Arc::new(HospitalRepository::new(conn.clone()));
        let bed_repo = Arc::new(BedRepository::new(conn.clone()));
        let staff_repo = Arc::new(StaffRepository::new(conn.clone()));
        let allocation_repo = Arc::new(AllocationRepository::new(conn.clone()));
        let cache_repo = Arc::new(DimensioningCacheRepository::new(conn));

        // ==========================================
        // Engine 层
        // ==========================================
        let source = Arc::new(SqliteOccupancySource::new(hospital_repo, bed_repo, staff_repo));
        let engine = Arc::new(OccupancyAnalysisEngine::new(source, config.clone()));
        let aggregator = Arc::new(NetworkAggregator::new(engine.clone()));

        // ==========================================
        // Service 层
        // ==========================================
        let ledger = Arc::new(AllocationLedger::new(allocation_repo));
        let cache = Arc::new(DimensioningCache::new(cache_repo, config.cache_ttl_minutes));

        let dimensioning_api = Arc::new(DimensioningApi::new(
            engine,
            aggregator,
            ledger,
            cache,
            config.clone(),
        ));

        tracing::info!(
            cache_ttl_minutes = config.cache_ttl_minutes,
            free_target = config.free_target_occupancy,
            "AppState初始化完成"
        );

        Ok(Self {
            db_path,
            config,
            dimensioning_api,
        })
    }
}

/// 获取默认数据库路径
///
/// 优先级: 环境变量 `STAFFING_DIMENSIONING_DB_PATH` → 用户数据目录 → 当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("STAFFING_DIMENSIONING_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./staffing_dimensioning.db");

    if let Some(data_dir) = dirs::data_dir() {
        #[cfg(debug_assertions)]
        {
            path = data_dir.join("staffing-dimensioning-dev");
        }

        #[cfg(not(debug_assertions))]
        {
            path = data_dir.join("staffing-dimensioning");
        }

        std::fs::create_dir_all(&path).ok();
        path = path.join("staffing_dimensioning.db");
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_app_state_wires_default_config() {
        let file = NamedTempFile::new().unwrap();
        let state = AppState::new(file.path().to_string_lossy().to_string()).unwrap();
        assert_eq!(state.config.cache_ttl_minutes, 30);
        assert_eq!(state.dimensioning_api.config().cache_ttl_minutes, 30);
    }
}
