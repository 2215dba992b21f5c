// ==========================================
// 护理人力测算系统 - 占用分析引擎
// ==========================================
// 职责: 单元 / 医院占用分析, 输出 SectorOccupation
// 输入: 床位状态(实时 + 普查历史) + 患者分级 + 现有人数
// 输出: 三个占用率口径 + 可支撑最大占用率 + 闲置/超载 + 缺口表
// 红线: Engine 不拼 SQL, 数据一律经 OccupancyDataSource 读取
// ==========================================

use crate::config::DimensioningConfig;
use crate::domain::occupancy::{
    census_average_pct, BedStatusCounts, ClassificationDistribution, HospitalOccupancyReport,
    OccupancyMetrics, SectorOccupation, SkippedMember, Unit,
};
use crate::domain::projection::{ProjectionParams, ProjectionResult};
use crate::domain::types::PatientClassification;
use crate::engine::aggregation::combine_metrics;
use crate::engine::data_source::OccupancyDataSource;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::projection::ProjectionCalculator;
use crate::engine::staffing::StaffingStrategy;
use chrono::{Datelike, NaiveDate, Utc};
use std::sync::Arc;
use tracing::instrument;

// ==========================================
// OccupancyAnalysisEngine - 占用分析引擎
// ==========================================
pub struct OccupancyAnalysisEngine {
    source: Arc<dyn OccupancyDataSource>,
    calculator: ProjectionCalculator,
    config: Arc<DimensioningConfig>,
}

/// 护理需求基准 (投影输入的来源数据)
#[derive(Debug, Clone, PartialEq)]
pub struct CareDemand {
    pub evaluated_patients: i64,
    pub operational_beds: i64,
    pub base_the: f64,
    pub base_occupancy: f64,
    pub nurses_required: f64,
    pub techs_required: f64,
}

impl OccupancyAnalysisEngine {
    pub fn new(source: Arc<dyn OccupancyDataSource>, config: Arc<DimensioningConfig>) -> Self {
        Self {
            source,
            calculator: ProjectionCalculator::new(),
            config,
        }
    }

    pub fn source(&self) -> &Arc<dyn OccupancyDataSource> {
        &self.source
    }

    // ==========================================
    // 单元分析
    // ==========================================

    /// 分析单个单元
    ///
    /// # 参数
    /// - as_of: 分析日, None 表示今天 (UTC)
    ///
    /// # 错误
    /// - 单元不存在 → NotFound
    /// - 分析日晚于今天 → Validation
    #[instrument(skip(self))]
    pub fn analyze_unit(
        &self,
        unit_id: &str,
        as_of: Option<NaiveDate>,
    ) -> EngineResult<SectorOccupation> {
        let unit = self
            .source
            .find_unit(unit_id)?
            .ok_or_else(|| EngineError::not_found("Unit", unit_id))?;
        let strategy = StaffingStrategy::select(self.source.as_ref(), &unit.hospital_id)?;
        let as_of = resolve_as_of(as_of)?;
        self.analyze_unit_with(&unit, &strategy, as_of)
    }

    /// 在已选定人数策略下分析单元
    pub fn analyze_unit_with(
        &self,
        unit: &Unit,
        strategy: &StaffingStrategy,
        as_of: NaiveDate,
    ) -> EngineResult<SectorOccupation> {
        let today = Utc::now().date_naive();
        let month_start = as_of.with_day(1).unwrap_or(as_of);

        // 1. 床位: 月累计普查 + 当日普查 + 实时状态
        let period_rows = self
            .source
            .census_between(&unit.unit_id, month_start, as_of)?;
        let day_rows: Vec<_> = period_rows
            .iter()
            .filter(|row| row.census_at.date() == as_of)
            .cloned()
            .collect();

        let instant_counts: BedStatusCounts = if as_of >= today {
            self.source.live_bed_counts(&unit.unit_id)?
        } else {
            day_rows.last().map(|row| row.counts).unwrap_or_default()
        };

        // 2. 分级与人数
        let (_, distribution) = self
            .source
            .classification_on_or_before(&unit.unit_id, as_of)?;
        let headcount = strategy.headcount(self.source.as_ref(), &unit.unit_id)?;

        // 3. 护理需求 → 投影
        let demand = self.care_demand(&distribution, &instant_counts);
        let projection = self.project(unit, &demand, headcount.nurses, headcount.technicians);

        let mut metrics = OccupancyMetrics {
            total_beds: instant_counts.total,
            occupied_beds: instant_counts.occupied,
            vacant_beds: instant_counts.vacant,
            inactive_beds: instant_counts.inactive,
            evaluated_patients: demand.evaluated_patients,
            nurse_headcount: headcount.nurses,
            tech_headcount: headcount.technicians,
            instant_occupancy_pct: instant_counts.occupancy_pct(),
            period_occupancy_pct: census_average_pct(&period_rows),
            today_occupancy_pct: census_average_pct(&day_rows),
            max_attainable_occupancy_pct: projection
                .as_ref()
                .map(|p| p.max_attainable_occupancy_pct())
                .unwrap_or(0.0),
            classification: distribution,
            ..Default::default()
        };
        metrics.derive_pressure();

        Ok(SectorOccupation {
            sector_id: unit.unit_id.clone(),
            name: unit.name.clone(),
            sector_type: unit.sector_type.clone(),
            unit_type: unit.unit_type,
            metrics,
            projection,
        })
    }

    /// 由分级分布与床位计算护理需求 (COFEN 方法)
    ///
    /// - THE = Σ 每级护理时数 × 患者数
    /// - 总人力 = THE × KM
    /// - 护士占比取主导分级对应比例, 技师取其余
    pub fn care_demand(
        &self,
        distribution: &ClassificationDistribution,
        counts: &BedStatusCounts,
    ) -> CareDemand {
        let base_the: f64 = distribution
            .0
            .iter()
            .map(|(class, count)| self.config.care_hours(*class) * (*count).max(0) as f64)
            .sum();
        let total_fte = base_the * self.config.staffing_marker();
        let nurse_share = distribution
            .predominant()
            .unwrap_or(PatientClassification::Minimal)
            .nurse_share();

        let evaluated_patients = distribution.total();
        let operational = counts.operational();
        let base_occupancy = if operational > 0 {
            evaluated_patients as f64 / operational as f64
        } else {
            0.0
        };

        CareDemand {
            evaluated_patients,
            operational_beds: operational,
            base_the,
            base_occupancy,
            nurses_required: total_fte * nurse_share,
            techs_required: total_fte * (1.0 - nurse_share),
        }
    }

    /// 投影失败 (基准占用率为 0 等) 时返回 None, 上层按 0% 计
    fn project(
        &self,
        unit: &Unit,
        demand: &CareDemand,
        nurses: i64,
        techs: i64,
    ) -> Option<ProjectionResult> {
        let params = ProjectionParams {
            current_nurses: nurses.max(0) as u32,
            current_techs: techs.max(0) as u32,
            beds: demand.operational_beds.max(0) as u32,
            base_occupancy: demand.base_occupancy,
            base_the: demand.base_the,
            base_nurses_required: demand.nurses_required,
            base_techs_required: demand.techs_required,
            free_target_occupancy: self.config.free_target_occupancy,
        };
        match self.calculator.compute(&params) {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::debug!(
                    unit_id = %unit.unit_id,
                    error = %e,
                    "投影不可用, 最大可支撑占用率按 0 计"
                );
                None
            }
        }
    }

    // ==========================================
    // 医院分析
    // ==========================================

    /// 分析医院全部住院单元
    ///
    /// # 说明
    /// - 人数来源策略在此选定一次
    /// - 单元失败记入 skipped_units 并继续; 单元不存在类错误中止
    #[instrument(skip(self))]
    pub fn analyze_hospital(
        &self,
        hospital_id: &str,
        as_of: Option<NaiveDate>,
    ) -> EngineResult<HospitalOccupancyReport> {
        self.source
            .find_hospital(hospital_id)?
            .ok_or_else(|| EngineError::not_found("Hospital", hospital_id))?;
        let as_of = resolve_as_of(as_of)?;
        let strategy = StaffingStrategy::select(self.source.as_ref(), hospital_id)?;
        let units = self.source.list_internment_units(hospital_id)?;

        let mut sectors = Vec::with_capacity(units.len());
        let mut skipped_units = Vec::new();
        for unit in &units {
            match self.analyze_unit_with(unit, &strategy, as_of) {
                Ok(sector) => sectors.push(sector),
                Err(e) if e.is_not_found() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        hospital_id,
                        unit_id = %unit.unit_id,
                        error = %e,
                        "单元分析失败, 已跳过"
                    );
                    skipped_units.push(SkippedMember {
                        member_id: unit.unit_id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let summary = combine_metrics(sectors.iter().map(|s| &s.metrics));
        tracing::info!(
            hospital_id,
            strategy = strategy.name(),
            units = sectors.len(),
            skipped = skipped_units.len(),
            "医院占用分析完成"
        );

        Ok(HospitalOccupancyReport {
            hospital_id: hospital_id.to_string(),
            sectors,
            summary,
            skipped_units,
        })
    }
}

/// 解析分析日; 未指定取今天, 晚于今天视为参数错误
pub fn resolve_as_of(as_of: Option<NaiveDate>) -> EngineResult<NaiveDate> {
    let today = Utc::now().date_naive();
    match as_of {
        None => Ok(today),
        Some(date) if date > today => Err(EngineError::Validation(format!(
            "分析日不能晚于今天: {}",
            date
        ))),
        Some(date) => Ok(date),
    }
}
