// ==========================================
// 护理人力测算系统 - 人力快照模型
// ==========================================
// 快照按范围区分为三种带标签的变体:
// - HOSPITAL: 一次给出整院各单元的人数
// - UNIT: 单个单元的护士/技师人数
// - ROLE_UNIT: 单个单元单个岗位的人数
// 在数据访问边界解码, 解码失败即为数据校验错误
// ==========================================

use crate::common::value_parser::parse_decimal;
use crate::domain::occupancy::UnitHeadcount;
use crate::domain::types::StaffRole;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StaffSnapshot {
    Hospital {
        hospital_id: String,
        units: Vec<UnitStaffEntry>,
    },
    Unit {
        unit_id: String,
        #[serde(deserialize_with = "lenient_count")]
        nurses: i64,
        #[serde(deserialize_with = "lenient_count")]
        technicians: i64,
    },
    RoleUnit {
        unit_id: String,
        role: StaffRole,
        #[serde(deserialize_with = "lenient_count")]
        headcount: i64,
    },
}

impl StaffSnapshot {
    pub fn scope_str(&self) -> &'static str {
        match self {
            StaffSnapshot::Hospital { .. } => "HOSPITAL",
            StaffSnapshot::Unit { .. } => "UNIT",
            StaffSnapshot::RoleUnit { .. } => "ROLE_UNIT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitStaffEntry {
    pub unit_id: String,
    #[serde(deserialize_with = "lenient_count")]
    pub nurses: i64,
    #[serde(deserialize_with = "lenient_count")]
    pub technicians: i64,
}

/// 接受 JSON 数字或数值字符串 ("4" / "4,0"), 拒绝负数与小数人数
fn lenient_count<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Text(String),
    }

    let value = match Raw::deserialize(deserializer)? {
        Raw::Int(v) => v as f64,
        Raw::Float(v) => v,
        Raw::Text(s) => parse_decimal(&s).map_err(serde::de::Error::custom)?,
    };

    if value < 0.0 || value.fract() != 0.0 {
        return Err(serde::de::Error::custom(format!("人数必须为非负整数: {}", value)));
    }
    Ok(value as i64)
}

// ==========================================
// StaffSnapshotIndex - 快照合并结果
// ==========================================
// 覆盖顺序: HOSPITAL < UNIT < ROLE_UNIT (越细越优先);
// 同一范围内后写入者覆盖先写入者 (调用方按 created_at 升序传入)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaffSnapshotIndex {
    by_unit: HashMap<String, UnitHeadcount>,
}

impl StaffSnapshotIndex {
    pub fn build(snapshots: &[StaffSnapshot]) -> Self {
        let mut by_unit: HashMap<String, UnitHeadcount> = HashMap::new();

        for snapshot in snapshots {
            if let StaffSnapshot::Hospital { units, .. } = snapshot {
                for entry in units {
                    by_unit.insert(
                        entry.unit_id.clone(),
                        UnitHeadcount {
                            nurses: entry.nurses,
                            technicians: entry.technicians,
                        },
                    );
                }
            }
        }

        for snapshot in snapshots {
            if let StaffSnapshot::Unit {
                unit_id,
                nurses,
                technicians,
            } = snapshot
            {
                by_unit.insert(
                    unit_id.clone(),
                    UnitHeadcount {
                        nurses: *nurses,
                        technicians: *technicians,
                    },
                );
            }
        }

        for snapshot in snapshots {
            if let StaffSnapshot::RoleUnit {
                unit_id,
                role,
                headcount,
            } = snapshot
            {
                let slot = by_unit.entry(unit_id.clone()).or_default();
                match role {
                    StaffRole::Nurse => slot.nurses = *headcount,
                    StaffRole::Technician => slot.technicians = *headcount,
                }
            }
        }

        Self { by_unit }
    }

    pub fn headcount(&self, unit_id: &str) -> Option<UnitHeadcount> {
        self.by_unit.get(unit_id).copied()
    }
}
