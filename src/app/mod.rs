// ==========================================
// 护理人力测算系统 - 应用层
// ==========================================
// 职责: 启动期依赖装配, 按请求派发异步命令
// ==========================================

pub mod commands;
pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState};
