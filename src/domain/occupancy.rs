// ==========================================
// 护理人力测算系统 - 占用率领域模型
// ==========================================
// 三个占用率口径分开记录, 不得合并:
// - instant: 实时床位状态
// - period: 当月累计(月初至分析日)
// - today: 分析日当日普查平均
// ==========================================

use crate::domain::projection::ProjectionResult;
use crate::domain::types::{PatientClassification, ScopeKind, UnitType};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// 组织与单元
// ==========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hospital {
    pub hospital_id: String,
    pub name: String,
    pub region_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub unit_id: String,
    pub hospital_id: String,
    pub name: String,
    pub unit_type: UnitType,
    /// 科室类型(如 CLINICAL / SURGICAL / PEDIATRIC), 由上游维护
    pub sector_type: String,
}

// ==========================================
// 床位计数
// ==========================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BedStatusCounts {
    pub total: i64,
    pub occupied: i64,
    pub vacant: i64,
    pub inactive: i64,
}

impl BedStatusCounts {
    /// 可运营床位 = 总床位 - 停用床位
    pub fn operational(&self) -> i64 {
        (self.total - self.inactive).max(0)
    }

    /// 占用率 (百分比); 无可运营床位时为 0
    pub fn occupancy_pct(&self) -> f64 {
        let operational = self.operational();
        if operational <= 0 {
            return 0.0;
        }
        self.occupied as f64 / operational as f64 * 100.0
    }
}

/// 床位普查记录 (日内可多次)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BedCensus {
    pub unit_id: String,
    pub census_at: NaiveDateTime,
    pub counts: BedStatusCounts,
}

/// 多条普查记录的平均占用率 (百分比)
///
/// 按可运营床位加权: Σoccupied / Σoperational
pub fn census_average_pct(rows: &[BedCensus]) -> f64 {
    let (occupied, operational) = rows.iter().fold((0i64, 0i64), |(o, p), r| {
        (o + r.counts.occupied, p + r.counts.operational())
    });
    if operational <= 0 {
        return 0.0;
    }
    occupied as f64 / operational as f64 * 100.0
}

// ==========================================
// 患者分级分布
// ==========================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassificationDistribution(pub BTreeMap<PatientClassification, i64>);

impl ClassificationDistribution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, class: PatientClassification, count: i64) {
        *self.0.entry(class).or_insert(0) += count;
    }

    pub fn count(&self, class: PatientClassification) -> i64 {
        self.0.get(&class).copied().unwrap_or(0)
    }

    /// 已评估患者总数
    pub fn total(&self) -> i64 {
        self.0.values().sum()
    }

    /// 主导分级: 患者数最多者, 并列取护理更复杂的一级
    pub fn predominant(&self) -> Option<PatientClassification> {
        self.0
            .iter()
            .filter(|(_, count)| **count > 0)
            .max_by(|(a_class, a_count), (b_class, b_count)| {
                a_count.cmp(b_count).then(a_class.cmp(b_class))
            })
            .map(|(class, _)| *class)
    }

    pub fn merge(&mut self, other: &ClassificationDistribution) {
        for (class, count) in &other.0 {
            self.add(*class, *count);
        }
    }
}

// ==========================================
// 现有人力
// ==========================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitHeadcount {
    pub nurses: i64,
    pub technicians: i64,
}

// ==========================================
// OccupancyMetrics - 占用指标(单元/科室/汇总共用)
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OccupancyMetrics {
    // ===== 计数字段 (汇总时求和) =====
    pub total_beds: i64,
    pub occupied_beds: i64,
    pub vacant_beds: i64,
    pub inactive_beds: i64,
    pub evaluated_patients: i64,
    pub nurse_headcount: i64,
    pub tech_headcount: i64,

    // ===== 比率字段 (百分比, 汇总时按床位加权) =====
    pub instant_occupancy_pct: f64,
    pub period_occupancy_pct: f64,
    pub today_occupancy_pct: f64,
    pub max_attainable_occupancy_pct: f64,

    // ===== 派生字段 (由 today 与 max_attainable 重新推导) =====
    pub idleness_pct: f64,
    pub overcrowding_pct: f64,

    pub classification: ClassificationDistribution,
}

impl OccupancyMetrics {
    /// 由 today 与 max_attainable 推导闲置率/超载率
    pub fn derive_pressure(&mut self) {
        self.idleness_pct = (self.max_attainable_occupancy_pct - self.today_occupancy_pct).max(0.0);
        self.overcrowding_pct =
            (self.today_occupancy_pct - self.max_attainable_occupancy_pct).max(0.0);
    }
}

// ==========================================
// SectorOccupation - 科室占用分析结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectorOccupation {
    pub sector_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub sector_type: String,
    pub unit_type: UnitType,
    #[serde(flatten)]
    pub metrics: OccupancyMetrics,
    /// 仅单元级结果携带; 汇总科室为 None
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<ProjectionResult>,
}

// ==========================================
// 医院 / 汇总层级报告
// ==========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HospitalOccupancyReport {
    pub hospital_id: String,
    pub sectors: Vec<SectorOccupation>,
    pub summary: OccupancyMetrics,
    /// 分析失败而被跳过的单元 (unit_id, 原因)
    pub skipped_units: Vec<SkippedMember>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedMember {
    pub member_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkOccupancyReport {
    pub scope_kind: ScopeKind,
    pub scope_id: String,
    pub sectors: Vec<SectorOccupation>,
    pub summary: OccupancyMetrics,
    pub included_hospitals: Vec<String>,
    pub skipped_hospitals: Vec<SkippedMember>,
}
