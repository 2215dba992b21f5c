// ==========================================
// 护理人力测算系统 - 异步命令层
// ==========================================
// 职责: 每个请求一个任务; rusqlite 为同步调用, 统一放入 spawn_blocking
// 返回: Ok(JSON 字符串) / Err(ErrorResponse JSON 字符串)
// ==========================================

use chrono::NaiveDate;
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::api::{ApiError, ApiResult, DimensioningApi};
use crate::app::state::AppState;
use crate::domain::cache::{CacheKey, InvalidationScope};
use crate::domain::occupancy::HospitalOccupancyReport;
use crate::domain::projection::ProjectionParams;
use crate::domain::types::{ScopeKind, StaffRole, UnitType};
use std::sync::Arc;

// ==========================================
// 公共工具: 错误映射、日期解析、阻塞派发
// ==========================================

/// 错误响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// 错误代码
    pub code: String,

    /// 错误消息
    pub message: String,

    /// 详细信息(可选)
    pub details: Option<serde_json::Value>,
}

/// 将ApiError转换为JSON字符串
pub fn map_api_error(err: ApiError) -> String {
    let error_response = ErrorResponse {
        code: match &err {
            ApiError::InvalidInput(_) => "INVALID_INPUT",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            ApiError::BusinessRuleViolation(_) => "BUSINESS_RULE_VIOLATION",
            ApiError::DatabaseError(_) => "DATABASE_ERROR",
            ApiError::DatabaseConnectionError(_) => "DATABASE_CONNECTION_ERROR",
            ApiError::DatabaseTransactionError(_) => "DATABASE_TRANSACTION_ERROR",
            ApiError::ValidationError(_) => "VALIDATION_ERROR",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
            ApiError::Other(_) => "OTHER_ERROR",
        }
        .to_string(),
        message: err.to_string(),
        details: match &err {
            ApiError::CapacityExceeded {
                capacity_id,
                allocated,
                requested,
                capacity,
            } => Some(serde_json::json!({
                "capacity_id": capacity_id,
                "allocated": allocated,
                "requested": requested,
                "capacity": capacity,
            })),
            _ => None,
        },
    };

    serde_json::to_string(&error_response).unwrap_or_else(|_| err.to_string())
}

/// 解析日期字符串
fn parse_date(date_str: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d")
        .map_err(|e| format!("日期格式错误（应为YYYY-MM-DD）: {}", e))
}

fn parse_optional_date(date_str: Option<String>) -> Result<Option<NaiveDate>, String> {
    date_str
        .filter(|s| !s.trim().is_empty())
        .map(|s| parse_date(&s))
        .transpose()
}

/// 在阻塞线程池执行 API 调用, 记录 perf 并序列化结果
async fn run_blocking<T, F>(
    state: &AppState,
    op: &'static str,
    f: F,
) -> Result<String, String>
where
    T: Serialize + Send + 'static,
    F: FnOnce(&DimensioningApi) -> ApiResult<T> + Send + 'static,
{
    let api = state.dimensioning_api.clone();
    let result = tokio::task::spawn_blocking(move || {
        let _perf = crate::perf::PerfGuard::new(op);
        f(&api)
    })
    .await
    .map_err(|e| format!("任务执行失败: {}", e))?
    .map_err(map_api_error)?;

    serde_json::to_string(&result).map_err(|e| format!("序列化失败: {}", e))
}

// ==========================================
// 投影 / 占用分析
// ==========================================

pub async fn compute_projection(
    state: &AppState,
    params: ProjectionParams,
) -> Result<String, String> {
    run_blocking(state, "cmd.compute_projection", move |api| {
        api.compute_projection(&params)
    })
    .await
}

pub async fn analyze_unit(
    state: &AppState,
    unit_id: String,
    as_of: Option<String>,
) -> Result<String, String> {
    let as_of = parse_optional_date(as_of)?;
    run_blocking(state, "cmd.analyze_unit", move |api| {
        api.analyze_unit(&unit_id, as_of)
    })
    .await
}

/// 读穿缓存的单元分析, 结果附带 from_cache 标记
pub async fn analyze_unit_cached(
    state: &AppState,
    unit_id: String,
    as_of: Option<String>,
) -> Result<String, String> {
    let as_of = parse_optional_date(as_of)?;
    run_blocking(state, "cmd.analyze_unit_cached", move |api| {
        let cached = api.analyze_unit_cached(&unit_id, as_of)?;
        Ok(serde_json::json!({
            "fromCache": cached.from_cache,
            "sector": cached.value,
        }))
    })
    .await
}

pub async fn analyze_hospital(
    state: &AppState,
    hospital_id: String,
    as_of: Option<String>,
) -> Result<String, String> {
    let as_of = parse_optional_date(as_of)?;
    run_blocking(state, "cmd.analyze_hospital", move |api| {
        api.analyze_hospital(&hospital_id, as_of)
    })
    .await
}

pub async fn analyze_network_scope(
    state: &AppState,
    kind: String,
    scope_id: String,
    as_of: Option<String>,
) -> Result<String, String> {
    let kind: ScopeKind = kind.parse()?;
    let as_of = parse_optional_date(as_of)?;
    run_blocking(state, "cmd.analyze_network_scope", move |api| {
        api.analyze_network_scope(kind, &scope_id, as_of)
    })
    .await
}

/// 多院看板条目; 单院失败不影响其他医院
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardEntry {
    pub hospital_id: String,
    pub report: Option<HospitalOccupancyReport>,
    pub error: Option<String>,
}

/// 多院看板: 每家医院一个阻塞任务, 并发等待
pub async fn hospital_dashboard(
    state: &AppState,
    hospital_ids: Vec<String>,
    as_of: Option<String>,
) -> Result<String, String> {
    let as_of = parse_optional_date(as_of)?;

    let tasks = hospital_ids.into_iter().map(|hospital_id| {
        let api: Arc<DimensioningApi> = state.dimensioning_api.clone();
        async move {
            let id = hospital_id.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                let _perf = crate::perf::PerfGuard::new("cmd.hospital_dashboard.item");
                api.analyze_hospital(&id, as_of)
            })
            .await;

            match outcome {
                Ok(Ok(report)) => DashboardEntry {
                    hospital_id,
                    report: Some(report),
                    error: None,
                },
                Ok(Err(e)) => DashboardEntry {
                    hospital_id,
                    report: None,
                    error: Some(map_api_error(e)),
                },
                Err(e) => DashboardEntry {
                    hospital_id,
                    report: None,
                    error: Some(format!("任务执行失败: {}", e)),
                },
            }
        }
    });

    let entries = join_all(tasks).await;
    let failed = entries.iter().filter(|e| e.error.is_some()).count();
    tracing::info!(hospitals = entries.len(), failed, "看板汇总完成");

    serde_json::to_string(&entries).map_err(|e| format!("序列化失败: {}", e))
}

// ==========================================
// 配额
// ==========================================

pub async fn allocate_slot(
    state: &AppState,
    capacity_id: String,
    site_id: String,
    quantity: i64,
) -> Result<String, String> {
    run_blocking(state, "cmd.allocate_slot", move |api| {
        api.allocate_slot(&capacity_id, &site_id, quantity)
    })
    .await
}

pub async fn update_allocation(
    state: &AppState,
    allocation_id: String,
    new_quantity: i64,
) -> Result<String, String> {
    run_blocking(state, "cmd.update_allocation", move |api| {
        api.update_allocation(&allocation_id, new_quantity)
    })
    .await
}

pub async fn release_allocation(
    state: &AppState,
    allocation_id: String,
) -> Result<String, String> {
    run_blocking(state, "cmd.release_allocation", move |api| {
        api.release_allocation(&allocation_id)
    })
    .await
}

pub async fn declare_capacity(
    state: &AppState,
    unit_id: String,
    role: String,
    quantity: i64,
) -> Result<String, String> {
    let role: StaffRole = role.parse()?;
    run_blocking(state, "cmd.declare_capacity", move |api| {
        api.declare_capacity(&unit_id, role, quantity)
    })
    .await
}

pub async fn capacity_usage(state: &AppState, capacity_id: String) -> Result<String, String> {
    run_blocking(state, "cmd.capacity_usage", move |api| {
        api.capacity_usage(&capacity_id)
    })
    .await
}

pub async fn list_allocations(state: &AppState, capacity_id: String) -> Result<String, String> {
    run_blocking(state, "cmd.list_allocations", move |api| {
        api.list_allocations(&capacity_id)
    })
    .await
}

// ==========================================
// 缓存
// ==========================================

/// 未命中时返回 "null"
pub async fn get_cached(
    state: &AppState,
    unit_id: String,
    unit_type: String,
    ttl_minutes: Option<i64>,
) -> Result<String, String> {
    let unit_type: UnitType = unit_type.parse()?;
    run_blocking(state, "cmd.get_cached", move |api| {
        api.get_cached(&unit_id, unit_type, ttl_minutes)
    })
    .await
}

pub async fn put_cached(
    state: &AppState,
    unit_id: String,
    unit_type: String,
    payload: serde_json::Value,
    param_hash: String,
) -> Result<String, String> {
    let unit_type: UnitType = unit_type.parse()?;
    run_blocking(state, "cmd.put_cached", move |api| {
        api.put_cached(&unit_id, unit_type, payload, &param_hash)
    })
    .await
}

pub async fn batch_get_cached(
    state: &AppState,
    keys: Vec<CacheKey>,
    ttl_minutes: Option<i64>,
) -> Result<String, String> {
    run_blocking(state, "cmd.batch_get_cached", move |api| {
        api.batch_get_cached(&keys, ttl_minutes)
    })
    .await
}

pub async fn invalidate(state: &AppState, scope: InvalidationScope) -> Result<String, String> {
    run_blocking(state, "cmd.invalidate", move |api| {
        let removed = api.invalidate(&scope)?;
        Ok(serde_json::json!({ "removed": removed }))
    })
    .await
}
