// ==========================================
// 护理人力测算系统 - 床位/普查/分级仓储
// ==========================================
// 数据来源:
// - bed: 实时床位状态
// - bed_census: 历史普查 (日内多次)
// - patient_classification: 按日患者护理分级人数
// ==========================================

use crate::db::CENSUS_FORMAT;
use crate::domain::occupancy::{BedCensus, BedStatusCounts, ClassificationDistribution};
use crate::domain::types::{BedStatus, PatientClassification};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

// ==========================================
// BedRepository - 床位仓储
// ==========================================
pub struct BedRepository {
    conn: Arc<Mutex<Connection>>,
}

impl BedRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 实时床位状态计数
    pub fn live_counts(&self, unit_id: &str) -> RepositoryResult<BedStatusCounts> {
        let conn = self.get_conn()?;
        let (total, occupied, vacant, inactive): (i64, i64, i64, i64) = conn.query_row(
            r#"
            SELECT
              COUNT(*),
              COALESCE(SUM(CASE WHEN status = 'OCCUPIED' THEN 1 ELSE 0 END), 0),
              COALESCE(SUM(CASE WHEN status = 'VACANT' THEN 1 ELSE 0 END), 0),
              COALESCE(SUM(CASE WHEN status = 'INACTIVE' THEN 1 ELSE 0 END), 0)
            FROM bed
            WHERE unit_id = ?1
            "#,
            params![unit_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;

        Ok(BedStatusCounts {
            total,
            occupied,
            vacant,
            inactive,
        })
    }

    pub fn set_bed_status(
        &self,
        bed_id: &str,
        unit_id: &str,
        status: BedStatus,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO bed (bed_id, unit_id, status, updated_at)
            VALUES (?1, ?2, ?3, datetime('now'))
            ON CONFLICT(bed_id) DO UPDATE SET
                unit_id = ?2, status = ?3, updated_at = datetime('now')
            "#,
            params![bed_id, unit_id, status.to_db_str()],
        )?;
        Ok(())
    }

    /// 查询日期区间内(含首尾)的普查记录, 按时间升序
    pub fn census_between(
        &self,
        unit_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepositoryResult<Vec<BedCensus>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT unit_id, census_at, total_beds, occupied, vacant, inactive
            FROM bed_census
            WHERE unit_id = ?1
              AND date(census_at) BETWEEN ?2 AND ?3
            ORDER BY census_at
            "#,
        )?;

        let rows = stmt
            .query_map(
                params![
                    unit_id,
                    from.format("%Y-%m-%d").to_string(),
                    to.format("%Y-%m-%d").to_string()
                ],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        BedStatusCounts {
                            total: row.get(2)?,
                            occupied: row.get(3)?,
                            vacant: row.get(4)?,
                            inactive: row.get(5)?,
                        },
                    ))
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(unit_id, census_at, counts)| {
                let census_at = NaiveDateTime::parse_from_str(&census_at, CENSUS_FORMAT)
                    .map_err(|e| RepositoryError::field("census_at", e.to_string()))?;
                Ok(BedCensus {
                    unit_id,
                    census_at,
                    counts,
                })
            })
            .collect()
    }

    pub fn insert_census(&self, census: &BedCensus) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO bed_census (
                unit_id, census_at, total_beds, occupied, vacant, inactive
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                census.unit_id,
                census.census_at.format(CENSUS_FORMAT).to_string(),
                census.counts.total,
                census.counts.occupied,
                census.counts.vacant,
                census.counts.inactive,
            ],
        )?;
        Ok(())
    }

    /// 取 as_of 当日或之前最近一次的分级分布
    ///
    /// # 返回
    /// (分级日期, 分布); 无记录时日期为 None, 分布为空
    pub fn classification_on_or_before(
        &self,
        unit_id: &str,
        as_of: NaiveDate,
    ) -> RepositoryResult<(Option<NaiveDate>, ClassificationDistribution)> {
        let conn = self.get_conn()?;
        let as_of_str = as_of.format("%Y-%m-%d").to_string();

        let census_date: Option<String> = conn
            .query_row(
                r#"
                SELECT MAX(census_date) FROM patient_classification
                WHERE unit_id = ?1 AND census_date <= ?2
                "#,
                params![unit_id, as_of_str],
                |row| row.get(0),
            )
            .optional()?
            .flatten();

        let Some(census_date) = census_date else {
            return Ok((None, ClassificationDistribution::new()));
        };

        let mut stmt = conn.prepare(
            r#"
            SELECT classification, patient_count FROM patient_classification
            WHERE unit_id = ?1 AND census_date = ?2
            "#,
        )?;
        let rows = stmt
            .query_map(params![unit_id, census_date], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut distribution = ClassificationDistribution::new();
        for (class, count) in rows {
            let class = class
                .parse::<PatientClassification>()
                .map_err(|e| RepositoryError::field("classification", e))?;
            distribution.add(class, count);
        }

        let date = NaiveDate::parse_from_str(&census_date, "%Y-%m-%d")
            .map_err(|e| RepositoryError::field("census_date", e.to_string()))?;
        Ok((Some(date), distribution))
    }

    pub fn upsert_classification(
        &self,
        unit_id: &str,
        census_date: NaiveDate,
        class: PatientClassification,
        patient_count: i64,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO patient_classification (unit_id, census_date, classification, patient_count)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(unit_id, census_date, classification) DO UPDATE SET patient_count = ?4
            "#,
            params![
                unit_id,
                census_date.format("%Y-%m-%d").to_string(),
                class.to_db_str(),
                patient_count
            ],
        )?;
        Ok(())
    }
}
