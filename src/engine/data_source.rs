// ==========================================
// 护理人力测算系统 - 占用分析数据源
// ==========================================
// 职责: 聚合占用分析引擎所需的仓储, 以 trait 形式注入引擎
// 目标: 引擎不直接依赖 rusqlite, 测试可替换数据源
// ==========================================

use crate::domain::occupancy::{
    BedCensus, BedStatusCounts, ClassificationDistribution, Hospital, Unit, UnitHeadcount,
};
use crate::domain::snapshot::StaffSnapshot;
use crate::domain::types::{ScopeKind, UnitType};
use crate::repository::{BedRepository, HospitalRepository, RepositoryResult, StaffRepository};
use chrono::NaiveDate;
use std::sync::Arc;

/// 占用分析所需的只读数据访问
pub trait OccupancyDataSource: Send + Sync {
    fn find_hospital(&self, hospital_id: &str) -> RepositoryResult<Option<Hospital>>;

    fn find_unit(&self, unit_id: &str) -> RepositoryResult<Option<Unit>>;

    /// 医院下全部住院单元
    fn list_internment_units(&self, hospital_id: &str) -> RepositoryResult<Vec<Unit>>;

    /// 层级成员医院; 层级不存在返回 None
    fn hospitals_in_scope(
        &self,
        kind: ScopeKind,
        scope_id: &str,
    ) -> RepositoryResult<Option<Vec<String>>>;

    fn live_bed_counts(&self, unit_id: &str) -> RepositoryResult<BedStatusCounts>;

    fn census_between(
        &self,
        unit_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepositoryResult<Vec<BedCensus>>;

    fn classification_on_or_before(
        &self,
        unit_id: &str,
        as_of: NaiveDate,
    ) -> RepositoryResult<(Option<NaiveDate>, ClassificationDistribution)>;

    fn has_staff_snapshots(&self, hospital_id: &str) -> RepositoryResult<bool>;

    fn staff_snapshots(&self, hospital_id: &str) -> RepositoryResult<Vec<StaffSnapshot>>;

    fn baseline_headcount(&self, unit_id: &str) -> RepositoryResult<UnitHeadcount>;
}

// ==========================================
// SqliteOccupancySource - 基于仓储的默认实现
// ==========================================
#[derive(Clone)]
pub struct SqliteOccupancySource {
    pub hospital_repo: Arc<HospitalRepository>,
    pub bed_repo: Arc<BedRepository>,
    pub staff_repo: Arc<StaffRepository>,
}

impl SqliteOccupancySource {
    pub fn new(
        hospital_repo: Arc<HospitalRepository>,
        bed_repo: Arc<BedRepository>,
        staff_repo: Arc<StaffRepository>,
    ) -> Self {
        Self {
            hospital_repo,
            bed_repo,
            staff_repo,
        }
    }
}

impl OccupancyDataSource for SqliteOccupancySource {
    fn find_hospital(&self, hospital_id: &str) -> RepositoryResult<Option<Hospital>> {
        self.hospital_repo.find_hospital(hospital_id)
    }

    fn find_unit(&self, unit_id: &str) -> RepositoryResult<Option<Unit>> {
        self.hospital_repo.find_unit(unit_id)
    }

    fn list_internment_units(&self, hospital_id: &str) -> RepositoryResult<Vec<Unit>> {
        self.hospital_repo
            .list_units(hospital_id, Some(UnitType::Internment))
    }

    fn hospitals_in_scope(
        &self,
        kind: ScopeKind,
        scope_id: &str,
    ) -> RepositoryResult<Option<Vec<String>>> {
        self.hospital_repo.hospitals_in_scope(kind, scope_id)
    }

    fn live_bed_counts(&self, unit_id: &str) -> RepositoryResult<BedStatusCounts> {
        self.bed_repo.live_counts(unit_id)
    }

    fn census_between(
        &self,
        unit_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepositoryResult<Vec<BedCensus>> {
        self.bed_repo.census_between(unit_id, from, to)
    }

    fn classification_on_or_before(
        &self,
        unit_id: &str,
        as_of: NaiveDate,
    ) -> RepositoryResult<(Option<NaiveDate>, ClassificationDistribution)> {
        self.bed_repo.classification_on_or_before(unit_id, as_of)
    }

    fn has_staff_snapshots(&self, hospital_id: &str) -> RepositoryResult<bool> {
        self.staff_repo.has_snapshots(hospital_id)
    }

    fn staff_snapshots(&self, hospital_id: &str) -> RepositoryResult<Vec<StaffSnapshot>> {
        self.staff_repo.list_snapshots(hospital_id)
    }

    fn baseline_headcount(&self, unit_id: &str) -> RepositoryResult<UnitHeadcount> {
        self.staff_repo.baseline_headcount(unit_id)
    }
}
