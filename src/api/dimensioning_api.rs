// ==========================================
// 护理人力测算系统 - 测算 API
// ==========================================
// 职责: 对外暴露测算 / 分析 / 配额 / 缓存操作, 统一转换为 ApiError
// 架构: API 层 → Engine / Services 层 → Repository 层
// ==========================================

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde_json::json;

use crate::api::error::{ApiError, ApiResult};
use crate::config::DimensioningConfig;
use crate::domain::allocation::{CapacityAllocation, CapacityUsage, SiteAllocation};
use crate::domain::cache::{CacheEntry, CacheKey, CacheLookup, CacheMetadata, InvalidationScope};
use crate::domain::occupancy::{HospitalOccupancyReport, NetworkOccupancyReport, SectorOccupation};
use crate::domain::projection::{ProjectionParams, ProjectionResult};
use crate::domain::types::{ScopeKind, StaffRole, UnitType};
use crate::engine::{NetworkAggregator, OccupancyAnalysisEngine, ProjectionCalculator};
use crate::services::{param_hash, AllocationLedger, Cached, DimensioningCache};

// ==========================================
// DimensioningApi
// ==========================================
pub struct DimensioningApi {
    calculator: ProjectionCalculator,
    engine: Arc<OccupancyAnalysisEngine>,
    aggregator: Arc<NetworkAggregator>,
    ledger: Arc<AllocationLedger>,
    cache: Arc<DimensioningCache>,
    config: Arc<DimensioningConfig>,
}

impl DimensioningApi {
    pub fn new(
        engine: Arc<OccupancyAnalysisEngine>,
        aggregator: Arc<NetworkAggregator>,
        ledger: Arc<AllocationLedger>,
        cache: Arc<DimensioningCache>,
        config: Arc<DimensioningConfig>,
    ) -> Self {
        Self {
            calculator: ProjectionCalculator::new(),
            engine,
            aggregator,
            ledger,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &DimensioningConfig {
        &self.config
    }

    // ==========================================
    // 投影 / 占用分析
    // ==========================================

    pub fn compute_projection(&self, params: &ProjectionParams) -> ApiResult<ProjectionResult> {
        Ok(self.calculator.compute(params)?)
    }

    pub fn analyze_unit(
        &self,
        unit_id: &str,
        as_of: Option<NaiveDate>,
    ) -> ApiResult<SectorOccupation> {
        require_id("unit_id", unit_id)?;
        Ok(self.engine.analyze_unit(unit_id, as_of)?)
    }

    /// 读穿缓存的单元分析
    ///
    /// 参数哈希覆盖 (unit_id, 分析日, 测算参数), 任一变化即重新计算
    pub fn analyze_unit_cached(
        &self,
        unit_id: &str,
        as_of: Option<NaiveDate>,
    ) -> ApiResult<Cached<SectorOccupation>> {
        require_id("unit_id", unit_id)?;
        let unit = self
            .engine
            .source()
            .find_unit(unit_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Unit(id={})不存在", unit_id)))?;
        let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());
        let hash = param_hash(&json!({
            "unit_id": unit_id,
            "as_of": as_of,
            "config": self.config.as_ref(),
        }))?;

        let key = CacheKey::new(unit_id, unit.unit_type);
        self.cache.get_or_compute(
            &key,
            &unit.hospital_id,
            self.config.cache_ttl_minutes,
            &hash,
            || -> ApiResult<SectorOccupation> { Ok(self.engine.analyze_unit(unit_id, Some(as_of))?) },
        )
    }

    pub fn analyze_hospital(
        &self,
        hospital_id: &str,
        as_of: Option<NaiveDate>,
    ) -> ApiResult<HospitalOccupancyReport> {
        require_id("hospital_id", hospital_id)?;
        Ok(self.engine.analyze_hospital(hospital_id, as_of)?)
    }

    pub fn analyze_network_scope(
        &self,
        kind: ScopeKind,
        scope_id: &str,
        as_of: Option<NaiveDate>,
    ) -> ApiResult<NetworkOccupancyReport> {
        require_id("scope_id", scope_id)?;
        Ok(self.aggregator.analyze_scope(kind, scope_id, as_of)?)
    }

    // ==========================================
    // 配额
    // ==========================================

    pub fn allocate_slot(
        &self,
        capacity_id: &str,
        site_id: &str,
        quantity: i64,
    ) -> ApiResult<SiteAllocation> {
        require_id("capacity_id", capacity_id)?;
        require_id("site_id", site_id)?;
        Ok(self.ledger.allocate_slot(capacity_id, site_id, quantity)?)
    }

    pub fn update_allocation(
        &self,
        allocation_id: &str,
        new_quantity: i64,
    ) -> ApiResult<SiteAllocation> {
        require_id("allocation_id", allocation_id)?;
        Ok(self.ledger.update_allocation(allocation_id, new_quantity)?)
    }

    pub fn release_allocation(&self, allocation_id: &str) -> ApiResult<()> {
        require_id("allocation_id", allocation_id)?;
        Ok(self.ledger.release_allocation(allocation_id)?)
    }

    pub fn declare_capacity(
        &self,
        unit_id: &str,
        role: StaffRole,
        quantity: i64,
    ) -> ApiResult<CapacityAllocation> {
        require_id("unit_id", unit_id)?;
        Ok(self.ledger.declare_capacity(unit_id, role, quantity)?)
    }

    pub fn capacity_usage(&self, capacity_id: &str) -> ApiResult<CapacityUsage> {
        Ok(self.ledger.capacity_usage(capacity_id)?)
    }

    pub fn list_allocations(&self, capacity_id: &str) -> ApiResult<Vec<SiteAllocation>> {
        Ok(self.ledger.list_allocations(capacity_id)?)
    }

    // ==========================================
    // 缓存
    // ==========================================

    /// 读取缓存载荷; 未命中返回 None
    pub fn get_cached(
        &self,
        unit_id: &str,
        unit_type: UnitType,
        ttl_minutes: Option<i64>,
    ) -> ApiResult<Option<serde_json::Value>> {
        let ttl = ttl_minutes.unwrap_or(self.config.cache_ttl_minutes);
        let lookup = self.cache.get(&CacheKey::new(unit_id, unit_type), ttl)?;
        Ok(match lookup {
            CacheLookup::Hit(entry) => Some(entry.payload),
            CacheLookup::Miss => None,
        })
    }

    /// 写入缓存; hospital_id 由单元归属推出
    pub fn put_cached(
        &self,
        unit_id: &str,
        unit_type: UnitType,
        payload: serde_json::Value,
        param_hash: &str,
    ) -> ApiResult<CacheEntry> {
        let unit = self
            .engine
            .source()
            .find_unit(unit_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Unit(id={})不存在", unit_id)))?;
        Ok(self.cache.put(
            &CacheKey::new(unit_id, unit_type),
            &unit.hospital_id,
            payload,
            param_hash,
            CacheMetadata::default(),
        )?)
    }

    pub fn batch_get_cached(
        &self,
        keys: &[CacheKey],
        ttl_minutes: Option<i64>,
    ) -> ApiResult<Vec<CacheEntry>> {
        let ttl = ttl_minutes.unwrap_or(self.config.cache_ttl_minutes);
        Ok(self.cache.batch_get(keys, ttl)?)
    }

    /// 失效缓存, 返回删除条数
    pub fn invalidate(&self, scope: &InvalidationScope) -> ApiResult<usize> {
        Ok(self.cache.invalidate(scope)?)
    }
}

fn require_id(field: &str, value: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::InvalidInput(format!("{} 不能为空", field)));
    }
    Ok(())
}
