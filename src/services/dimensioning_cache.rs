// ==========================================
// 护理人力测算系统 - 测算结果缓存
// ==========================================
// 键: (unit_id, unit_type), 存储于 dimensioning_cache 表 (多进程共享)
// 命中: 记录存在且 now - updated_at < ttl
// 未命中是控制流信号, 不是错误
// 失效只删除, 从不触发重算
// ==========================================

use crate::domain::cache::{CacheEntry, CacheKey, CacheLookup, CacheMetadata, InvalidationScope};
use crate::repository::{DimensioningCacheRepository, RepositoryError, RepositoryResult};
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Instant;

/// get_or_compute 的结果
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub value: T,
    pub from_cache: bool,
}

// ==========================================
// DimensioningCache
// ==========================================
pub struct DimensioningCache {
    repo: Arc<DimensioningCacheRepository>,
    default_ttl_minutes: i64,
}

impl DimensioningCache {
    pub fn new(repo: Arc<DimensioningCacheRepository>, default_ttl_minutes: i64) -> Self {
        Self {
            repo,
            default_ttl_minutes,
        }
    }

    pub fn default_ttl_minutes(&self) -> i64 {
        self.default_ttl_minutes
    }

    // ===== 读取 =====

    pub fn get(&self, key: &CacheKey, ttl_minutes: i64) -> RepositoryResult<CacheLookup> {
        self.get_as_of(key, ttl_minutes, Utc::now())
    }

    pub fn get_as_of(
        &self,
        key: &CacheKey,
        ttl_minutes: i64,
        now: DateTime<Utc>,
    ) -> RepositoryResult<CacheLookup> {
        let cutoff = cutoff(ttl_minutes, now)?;
        let lookup = match self.repo.find_fresh(key, cutoff)? {
            Some(entry) => CacheLookup::Hit(entry),
            None => CacheLookup::Miss,
        };
        let hit = lookup.is_hit() as usize;
        crate::perf::record_cache_lookup(hit, 1 - hit);
        tracing::debug!(
            unit_id = %key.unit_id,
            unit_type = %key.unit_type,
            hit = lookup.is_hit(),
            "cache lookup"
        );
        Ok(lookup)
    }

    /// 批量读取, 只返回有效子集
    pub fn batch_get(&self, keys: &[CacheKey], ttl_minutes: i64) -> RepositoryResult<Vec<CacheEntry>> {
        self.batch_get_as_of(keys, ttl_minutes, Utc::now())
    }

    pub fn batch_get_as_of(
        &self,
        keys: &[CacheKey],
        ttl_minutes: i64,
        now: DateTime<Utc>,
    ) -> RepositoryResult<Vec<CacheEntry>> {
        let cutoff = cutoff(ttl_minutes, now)?;
        let entries = self.repo.batch_find_fresh(keys, cutoff)?;
        crate::perf::record_cache_lookup(entries.len(), keys.len().saturating_sub(entries.len()));
        tracing::debug!(requested = keys.len(), hits = entries.len(), "cache batch lookup");
        Ok(entries)
    }

    // ===== 写入 =====

    pub fn put(
        &self,
        key: &CacheKey,
        hospital_id: &str,
        payload: serde_json::Value,
        param_hash: &str,
        metadata: CacheMetadata,
    ) -> RepositoryResult<CacheEntry> {
        self.put_as_of(key, hospital_id, payload, param_hash, metadata, Utc::now())
    }

    /// 写入或覆盖; 覆盖时表中保留首次 created_at
    pub fn put_as_of(
        &self,
        key: &CacheKey,
        hospital_id: &str,
        payload: serde_json::Value,
        param_hash: &str,
        metadata: CacheMetadata,
        now: DateTime<Utc>,
    ) -> RepositoryResult<CacheEntry> {
        let entry = CacheEntry {
            key: key.clone(),
            hospital_id: hospital_id.to_string(),
            payload,
            param_hash: param_hash.to_string(),
            created_at: now,
            updated_at: now,
            metadata,
        };
        self.repo.upsert(&entry)?;
        // 覆盖写入时 created_at 以表中首次写入为准
        self.repo
            .find(key)?
            .ok_or_else(|| RepositoryError::not_found("dimensioning_cache", &key.unit_id))
    }

    // ===== 失效 =====

    /// 按范围删除缓存, 返回删除条数
    pub fn invalidate(&self, scope: &InvalidationScope) -> RepositoryResult<usize> {
        let removed = match scope {
            InvalidationScope::Unit { unit_id, unit_type } => {
                self.repo.delete_by_unit(unit_id, *unit_type)?
            }
            InvalidationScope::Hospital { hospital_id } => {
                self.repo.delete_by_hospital(hospital_id)?
            }
            InvalidationScope::All => self.repo.delete_all()?,
            InvalidationScope::Expired { ttl_minutes } => {
                self.sweep_expired_as_of(*ttl_minutes, Utc::now())?
            }
        };
        tracing::info!(?scope, removed, "cache invalidated");
        Ok(removed)
    }

    /// 删除 now - updated_at >= ttl 的记录
    pub fn sweep_expired_as_of(&self, ttl_minutes: i64, now: DateTime<Utc>) -> RepositoryResult<usize> {
        let cutoff = cutoff(ttl_minutes, now)?;
        self.repo.delete_older_than(cutoff)
    }

    // ===== 读穿 =====

    /// 命中且参数哈希一致时返回缓存值, 否则计算、写入并返回
    ///
    /// 缓存载荷无法解码为 T 时视为未命中并覆盖
    pub fn get_or_compute<T, E, F>(
        &self,
        key: &CacheKey,
        hospital_id: &str,
        ttl_minutes: i64,
        param_hash: &str,
        compute: F,
    ) -> Result<Cached<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, E>,
        E: From<RepositoryError>,
    {
        if let CacheLookup::Hit(entry) = self.get(key, ttl_minutes)? {
            if entry.param_hash == param_hash {
                match serde_json::from_value::<T>(entry.payload) {
                    Ok(value) => {
                        return Ok(Cached {
                            value,
                            from_cache: true,
                        })
                    }
                    Err(e) => tracing::warn!(
                        unit_id = %key.unit_id,
                        error = %e,
                        "缓存载荷解码失败, 重新计算"
                    ),
                }
            }
        }

        let started = Instant::now();
        let value = compute()?;
        let compute_ms = started.elapsed().as_millis() as i64;

        let payload = serde_json::to_value(&value).map_err(RepositoryError::from)?;
        let metadata = CacheMetadata {
            compute_ms,
            record_count: record_count_of(&payload),
        };
        self.put(key, hospital_id, payload, param_hash, metadata)?;

        Ok(Cached {
            value,
            from_cache: false,
        })
    }
}

/// 参数哈希: 规范 JSON (键有序) 的 SHA-256 十六进制
pub fn param_hash<T: Serialize>(params: &T) -> RepositoryResult<String> {
    let canonical = serde_json::to_string(&serde_json::to_value(params)?)?;
    Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
}

fn cutoff(ttl_minutes: i64, now: DateTime<Utc>) -> RepositoryResult<DateTime<Utc>> {
    if ttl_minutes <= 0 {
        return Err(RepositoryError::ValidationError(format!(
            "ttl_minutes 必须大于 0: {}",
            ttl_minutes
        )));
    }
    // 超大 ttl 截断到纪元起点: 表中时间戳都晚于它, 记录全部视为有效
    let floor = DateTime::<Utc>::UNIX_EPOCH;
    Ok(Duration::try_minutes(ttl_minutes)
        .and_then(|ttl| now.checked_sub_signed(ttl))
        .map_or(floor, |cutoff| cutoff.max(floor)))
}

fn record_count_of(payload: &serde_json::Value) -> i64 {
    match payload {
        serde_json::Value::Array(items) => items.len() as i64,
        serde_json::Value::Null => 0,
        _ => 1,
    }
}
