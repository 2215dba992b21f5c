// ==========================================
// 护理人力测算系统 - 层级汇总器
// ==========================================
// 范围: 网络 / 集团 / 区域
// 规则:
// - 逐院分析, 单院失败记 warn 并跳过 (部分成功)
// - 同名科室合并 (计数求和, 比率按床位加权)
// - 顶层汇总对合并后的科室列表再次应用加权规则
// ==========================================

use crate::domain::occupancy::{NetworkOccupancyReport, SkippedMember};
use crate::domain::types::ScopeKind;
use crate::engine::aggregation::{combine_metrics, merge_sectors};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::occupancy::{resolve_as_of, OccupancyAnalysisEngine};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::instrument;

pub struct NetworkAggregator {
    engine: Arc<OccupancyAnalysisEngine>,
}

impl NetworkAggregator {
    pub fn new(engine: Arc<OccupancyAnalysisEngine>) -> Self {
        Self { engine }
    }

    /// 汇总层级内全部医院
    ///
    /// # 错误
    /// - 层级不存在 → NotFound
    /// - 单院失败不算错误, 列入 skipped_hospitals
    #[instrument(skip(self))]
    pub fn analyze_scope(
        &self,
        kind: ScopeKind,
        scope_id: &str,
        as_of: Option<NaiveDate>,
    ) -> EngineResult<NetworkOccupancyReport> {
        let hospital_ids = self
            .engine
            .source()
            .hospitals_in_scope(kind, scope_id)?
            .ok_or_else(|| EngineError::not_found(&kind.to_string(), scope_id))?;
        // 所有医院使用同一分析日
        let as_of = resolve_as_of(as_of)?;

        let mut sectors = Vec::new();
        let mut included_hospitals = Vec::new();
        let mut skipped_hospitals = Vec::new();

        for hospital_id in &hospital_ids {
            match self.engine.analyze_hospital(hospital_id, Some(as_of)) {
                Ok(report) => {
                    sectors.extend(report.sectors);
                    included_hospitals.push(hospital_id.clone());
                }
                Err(e) => {
                    let partial = EngineError::PartialAggregation {
                        hospital_id: hospital_id.clone(),
                        reason: e.to_string(),
                    };
                    tracing::warn!(
                        scope = %kind,
                        scope_id,
                        hospital_id = %hospital_id,
                        error = %partial,
                        "医院分析失败, 已从汇总中排除"
                    );
                    skipped_hospitals.push(SkippedMember {
                        member_id: hospital_id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let sectors = merge_sectors(sectors);
        let summary = combine_metrics(sectors.iter().map(|s| &s.metrics));

        tracing::info!(
            scope = %kind,
            scope_id,
            included = included_hospitals.len(),
            skipped = skipped_hospitals.len(),
            sectors = sectors.len(),
            "层级汇总完成"
        );

        Ok(NetworkOccupancyReport {
            scope_kind: kind,
            scope_id: scope_id.to_string(),
            sectors,
            summary,
            included_hospitals,
            skipped_hospitals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DimensioningConfig;
    use crate::db::init_schema;
    use crate::domain::occupancy::{
        BedCensus, BedStatusCounts, ClassificationDistribution, Hospital, Unit, UnitHeadcount,
    };
    use crate::domain::snapshot::StaffSnapshot;
    use crate::engine::data_source::{OccupancyDataSource, SqliteOccupancySource};
    use crate::repository::{
        BedRepository, HospitalRepository, RepositoryError, RepositoryResult, StaffRepository,
    };
    use rusqlite::Connection;
    use std::sync::Mutex;

    /// 指定医院的人数来源读取失败, 其余委托给真实数据源
    struct FailingSource {
        inner: SqliteOccupancySource,
        failing_hospital: String,
    }

    impl OccupancyDataSource for FailingSource {
        fn find_hospital(&self, hospital_id: &str) -> RepositoryResult<Option<Hospital>> {
            self.inner.find_hospital(hospital_id)
        }
        fn find_unit(&self, unit_id: &str) -> RepositoryResult<Option<Unit>> {
            self.inner.find_unit(unit_id)
        }
        fn list_internment_units(&self, hospital_id: &str) -> RepositoryResult<Vec<Unit>> {
            self.inner.list_internment_units(hospital_id)
        }
        fn hospitals_in_scope(
            &self,
            kind: ScopeKind,
            scope_id: &str,
        ) -> RepositoryResult<Option<Vec<String>>> {
            self.inner.hospitals_in_scope(kind, scope_id)
        }
        fn live_bed_counts(&self, unit_id: &str) -> RepositoryResult<BedStatusCounts> {
            self.inner.live_bed_counts(unit_id)
        }
        fn census_between(
            &self,
            unit_id: &str,
            from: NaiveDate,
            to: NaiveDate,
        ) -> RepositoryResult<Vec<BedCensus>> {
            self.inner.census_between(unit_id, from, to)
        }
        fn classification_on_or_before(
            &self,
            unit_id: &str,
            as_of: NaiveDate,
        ) -> RepositoryResult<(Option<NaiveDate>, ClassificationDistribution)> {
            self.inner.classification_on_or_before(unit_id, as_of)
        }
        fn has_staff_snapshots(&self, hospital_id: &str) -> RepositoryResult<bool> {
            if hospital_id == self.failing_hospital {
                return Err(RepositoryError::DatabaseQueryError("disk I/O error".to_string()));
            }
            self.inner.has_staff_snapshots(hospital_id)
        }
        fn staff_snapshots(&self, hospital_id: &str) -> RepositoryResult<Vec<StaffSnapshot>> {
            self.inner.staff_snapshots(hospital_id)
        }
        fn baseline_headcount(&self, unit_id: &str) -> RepositoryResult<UnitHeadcount> {
            self.inner.baseline_headcount(unit_id)
        }
    }

    fn setup() -> NetworkAggregator {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute_batch(
            r#"
            INSERT INTO network VALUES ('N1', 'Rede');
            INSERT INTO hospital_group VALUES ('G1', 'N1', 'Grupo');
            INSERT INTO region VALUES ('R1', 'G1', 'Sul');
            INSERT INTO hospital VALUES ('H1', 'R1', 'A'), ('H2', 'R1', 'B'), ('H3', 'R1', 'C');
            INSERT INTO unit VALUES ('U1', 'H1', 'UTI', 'INTERNMENT', 'ICU');
            INSERT INTO unit VALUES ('U2', 'H2', 'UTI', 'INTERNMENT', 'ICU');
            INSERT INTO unit VALUES ('U3', 'H3', ' uti ', 'INTERNMENT', 'ICU');
            INSERT INTO bed_census VALUES ('U1', '2026-03-10 08:00:00', 10, 5, 5, 0);
            INSERT INTO bed_census VALUES ('U2', '2026-03-10 08:00:00', 50, 50, 0, 0);
            INSERT INTO bed_census VALUES ('U3', '2026-03-10 08:00:00', 30, 27, 3, 0);
            "#,
        )
        .unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let source = FailingSource {
            inner: SqliteOccupancySource::new(
                Arc::new(HospitalRepository::new(conn.clone())),
                Arc::new(BedRepository::new(conn.clone())),
                Arc::new(StaffRepository::new(conn)),
            ),
            failing_hospital: "H2".to_string(),
        };
        let engine = OccupancyAnalysisEngine::new(
            Arc::new(source),
            Arc::new(DimensioningConfig::default()),
        );
        NetworkAggregator::new(Arc::new(engine))
    }

    #[test]
    fn test_failing_hospital_is_skipped_not_surfaced() {
        let aggregator = setup();
        let date = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let report = aggregator
            .analyze_scope(ScopeKind::Network, "N1", Some(date))
            .unwrap();

        assert_eq!(report.included_hospitals, vec!["H1", "H3"]);
        assert_eq!(report.skipped_hospitals.len(), 1);
        assert_eq!(report.skipped_hospitals[0].member_id, "H2");

        // 仅 H1 + H3: (50×10 + 90×30) / 40 = 80
        assert_eq!(report.sectors.len(), 1);
        assert_eq!(report.summary.total_beds, 40);
        assert!((report.summary.today_occupancy_pct - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_scope_is_not_found() {
        let aggregator = setup();
        let err = aggregator
            .analyze_scope(ScopeKind::Region, "R404", None)
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
