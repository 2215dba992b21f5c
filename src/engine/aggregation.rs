// ==========================================
// 护理人力测算系统 - 占用指标汇总规则
// ==========================================
// - 计数字段: 求和
// - 比率字段: 按总床位加权平均
// - 闲置率/超载率: 汇总后由 today 与 max_attainable 重新推导, 不做平均
// ==========================================

use crate::domain::occupancy::{OccupancyMetrics, SectorOccupation};
use std::collections::BTreeMap;

/// 汇总多组占用指标
///
/// 总床位为 0 时比率字段退化为算术平均; 空输入返回全 0
pub fn combine_metrics<'a, I>(members: I) -> OccupancyMetrics
where
    I: IntoIterator<Item = &'a OccupancyMetrics>,
{
    let members: Vec<&OccupancyMetrics> = members.into_iter().collect();
    let mut combined = OccupancyMetrics::default();
    if members.is_empty() {
        return combined;
    }

    for m in &members {
        combined.total_beds += m.total_beds;
        combined.occupied_beds += m.occupied_beds;
        combined.vacant_beds += m.vacant_beds;
        combined.inactive_beds += m.inactive_beds;
        combined.evaluated_patients += m.evaluated_patients;
        combined.nurse_headcount += m.nurse_headcount;
        combined.tech_headcount += m.tech_headcount;
        combined.classification.merge(&m.classification);
    }

    let total_weight: i64 = members.iter().map(|m| m.total_beds.max(0)).sum();
    let weighted = |rate: fn(&OccupancyMetrics) -> f64| -> f64 {
        if total_weight > 0 {
            members
                .iter()
                .map(|m| rate(m) * m.total_beds.max(0) as f64)
                .sum::<f64>()
                / total_weight as f64
        } else {
            members.iter().map(|m| rate(m)).sum::<f64>() / members.len() as f64
        }
    };

    combined.instant_occupancy_pct = weighted(|m| m.instant_occupancy_pct);
    combined.period_occupancy_pct = weighted(|m| m.period_occupancy_pct);
    combined.today_occupancy_pct = weighted(|m| m.today_occupancy_pct);
    combined.max_attainable_occupancy_pct = weighted(|m| m.max_attainable_occupancy_pct);
    combined.derive_pressure();
    combined
}

/// 科室名归一化: 去首尾空白 + 小写
pub fn normalize_sector_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// 按科室名合并同名科室, 结果按归一化名称排序
///
/// 合并后的科室 sector_id 为归一化名称, 不携带单元级投影
pub fn merge_sectors(sectors: Vec<SectorOccupation>) -> Vec<SectorOccupation> {
    let mut groups: BTreeMap<String, Vec<SectorOccupation>> = BTreeMap::new();
    for sector in sectors {
        groups
            .entry(normalize_sector_name(&sector.name))
            .or_default()
            .push(sector);
    }

    groups
        .into_iter()
        .filter_map(|(key, members)| {
            let first = members.first()?;
            let metrics = combine_metrics(members.iter().map(|s| &s.metrics));
            Some(SectorOccupation {
                sector_id: key,
                name: first.name.trim().to_string(),
                sector_type: first.sector_type.clone(),
                unit_type: first.unit_type,
                metrics,
                projection: None,
            })
        })
        .collect()
}
