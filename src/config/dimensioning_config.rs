// ==========================================
// 护理人力测算系统 - 测算参数配置
// ==========================================
// 启动时由 ConfigManager 一次性加载, 之后只读
// ==========================================

use crate::domain::types::PatientClassification;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_CACHE_TTL_MINUTES: i64 = 30;
pub const DEFAULT_FREE_TARGET_OCCUPANCY: f64 = 0.85;
pub const DEFAULT_WEEKLY_HOURS: f64 = 36.0;
pub const DEFAULT_DAYS_PER_WEEK: f64 = 7.0;
pub const DEFAULT_TECHNICAL_SAFETY_INDEX: f64 = 0.15;

// ==========================================
// DimensioningConfig
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensioningConfig {
    pub cache_ttl_minutes: i64,
    pub free_target_occupancy: f64,
    pub weekly_hours: f64,
    pub days_per_week: f64,
    /// 技术安全系数 (IST), 小数形式
    pub technical_safety_index: f64,
    /// 每级患者每日护理时数
    pub care_hours: BTreeMap<PatientClassification, f64>,
}

impl Default for DimensioningConfig {
    fn default() -> Self {
        Self {
            cache_ttl_minutes: DEFAULT_CACHE_TTL_MINUTES,
            free_target_occupancy: DEFAULT_FREE_TARGET_OCCUPANCY,
            weekly_hours: DEFAULT_WEEKLY_HOURS,
            days_per_week: DEFAULT_DAYS_PER_WEEK,
            technical_safety_index: DEFAULT_TECHNICAL_SAFETY_INDEX,
            care_hours: PatientClassification::ALL
                .iter()
                .map(|class| (*class, class.default_care_hours()))
                .collect(),
        }
    }
}

impl DimensioningConfig {
    pub fn care_hours(&self, class: PatientClassification) -> f64 {
        self.care_hours
            .get(&class)
            .copied()
            .unwrap_or_else(|| class.default_care_hours())
    }

    /// 人员配置系数 KM = (每周天数 / 每周工时) × (1 + IST)
    pub fn staffing_marker(&self) -> f64 {
        (self.days_per_week / self.weekly_hours) * (1.0 + self.technical_safety_index)
    }

    /// 校验配置取值; 返回第一个不合法项的说明
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_ttl_minutes <= 0 {
            return Err(format!("cache_ttl_minutes 必须大于 0: {}", self.cache_ttl_minutes));
        }
        if !(self.free_target_occupancy > 0.0 && self.free_target_occupancy.is_finite()) {
            return Err(format!(
                "free_target_occupancy 必须大于 0: {}",
                self.free_target_occupancy
            ));
        }
        if !(self.weekly_hours > 0.0 && self.weekly_hours.is_finite()) {
            return Err(format!("weekly_hours 必须大于 0: {}", self.weekly_hours));
        }
        if !(self.days_per_week > 0.0 && self.days_per_week <= 7.0) {
            return Err(format!("days_per_week 取值范围 (0, 7]: {}", self.days_per_week));
        }
        if !(self.technical_safety_index >= 0.0 && self.technical_safety_index.is_finite()) {
            return Err(format!(
                "technical_safety_index 不能为负: {}",
                self.technical_safety_index
            ));
        }
        if let Some((class, hours)) = self.care_hours.iter().find(|(_, h)| !(**h >= 0.0)) {
            return Err(format!("护理时数不合法: {}={}", class, hours));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_staffing_marker() {
        let config = DimensioningConfig::default();
        // 7 / 36 × 1.15
        assert!((config.staffing_marker() - 0.223_611).abs() < 1e-6);
        assert_eq!(config.care_hours(PatientClassification::Intensive), 18.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = DimensioningConfig {
            weekly_hours: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = DimensioningConfig {
            cache_ttl_minutes: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
