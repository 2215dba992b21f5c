// ==========================================
// 护理人力测算系统 - 核心库
// ==========================================
// 功能: 护理人力投影 / 占用率分析 / 层级汇总 / 配额账本 / 测算缓存
// 技术栈: Rust + SQLite (rusqlite) + tokio
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 公共工具 - 数值清洗
pub mod common;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 测算规则
pub mod engine;

// 服务层 - 配额账本 / 缓存
pub mod services;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 性能统计
pub mod perf;

// API 层 - 业务接口
pub mod api;

// 应用层 - 依赖装配与异步命令
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{BedStatus, PatientClassification, ScopeKind, StaffRole, UnitType};

// 领域实体
pub use domain::{
    CacheEntry, CacheKey, CapacityAllocation, GapAnalysisRow, HospitalOccupancyReport,
    InvalidationScope, NetworkOccupancyReport, OccupancyMetrics, ProjectionParams,
    ProjectionResult, SectorOccupation, SiteAllocation,
};

// 引擎
pub use engine::{NetworkAggregator, OccupancyAnalysisEngine, ProjectionCalculator};

// 服务
pub use services::{AllocationLedger, DimensioningCache};

// API
pub use api::{ApiError, ApiResult, DimensioningApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "护理人力测算系统";
