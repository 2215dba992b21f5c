// ==========================================
// 护理人力测算系统 - 配置层
// ==========================================
// 职责: 系统配置管理
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod dimensioning_config;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use dimensioning_config::DimensioningConfig;
