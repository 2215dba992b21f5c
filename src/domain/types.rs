// ==========================================
// 护理人力测算系统 - 领域类型定义
// ==========================================
// 职责: 单元类型 / 床位状态 / 患者分级 / 岗位 / 组织层级
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 单元类型 (Unit Type)
// ==========================================
// 住院单元参与占用率分析; 中性单元(手术室/门诊等)只参与缓存与配额
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitType {
    Internment, // 住院单元
    Neutral,    // 中性单元
}

impl UnitType {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            UnitType::Internment => "INTERNMENT",
            UnitType::Neutral => "NEUTRAL",
        }
    }
}

impl fmt::Display for UnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl FromStr for UnitType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "INTERNMENT" => Ok(UnitType::Internment),
            "NEUTRAL" => Ok(UnitType::Neutral),
            other => Err(format!("未知单元类型: {}", other)),
        }
    }
}

// ==========================================
// 床位状态 (Bed Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BedStatus {
    Occupied, // 占用
    Vacant,   // 空闲
    Inactive, // 停用(维修/封闭)
}

impl BedStatus {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            BedStatus::Occupied => "OCCUPIED",
            BedStatus::Vacant => "VACANT",
            BedStatus::Inactive => "INACTIVE",
        }
    }
}

impl FromStr for BedStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "OCCUPIED" => Ok(BedStatus::Occupied),
            "VACANT" => Ok(BedStatus::Vacant),
            "INACTIVE" => Ok(BedStatus::Inactive),
            other => Err(format!("未知床位状态: {}", other)),
        }
    }
}

// ==========================================
// 患者护理分级 (Patient Classification)
// ==========================================
// 按护理复杂度递增排列, Ord 用于"并列时取更复杂的一级"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatientClassification {
    Minimal,        // 最低护理
    Intermediate,   // 中级护理
    HighDependency, // 高依赖护理
    SemiIntensive,  // 半重症护理
    Intensive,      // 重症护理
}

impl PatientClassification {
    pub const ALL: [PatientClassification; 5] = [
        PatientClassification::Minimal,
        PatientClassification::Intermediate,
        PatientClassification::HighDependency,
        PatientClassification::SemiIntensive,
        PatientClassification::Intensive,
    ];

    pub fn to_db_str(&self) -> &'static str {
        match self {
            PatientClassification::Minimal => "MINIMAL",
            PatientClassification::Intermediate => "INTERMEDIATE",
            PatientClassification::HighDependency => "HIGH_DEPENDENCY",
            PatientClassification::SemiIntensive => "SEMI_INTENSIVE",
            PatientClassification::Intensive => "INTENSIVE",
        }
    }

    /// 每名患者每日所需护理小时数（默认表）
    pub fn default_care_hours(&self) -> f64 {
        match self {
            PatientClassification::Minimal => 4.0,
            PatientClassification::Intermediate => 6.0,
            PatientClassification::HighDependency => 10.0,
            PatientClassification::SemiIntensive => 10.0,
            PatientClassification::Intensive => 18.0,
        }
    }

    /// 护士在总人力中的占比（其余为护理技师）
    pub fn nurse_share(&self) -> f64 {
        match self {
            PatientClassification::Minimal | PatientClassification::Intermediate => 0.33,
            PatientClassification::HighDependency => 0.36,
            PatientClassification::SemiIntensive => 0.42,
            PatientClassification::Intensive => 0.52,
        }
    }
}

impl fmt::Display for PatientClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl FromStr for PatientClassification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "MINIMAL" => Ok(PatientClassification::Minimal),
            "INTERMEDIATE" => Ok(PatientClassification::Intermediate),
            "HIGH_DEPENDENCY" => Ok(PatientClassification::HighDependency),
            "SEMI_INTENSIVE" => Ok(PatientClassification::SemiIntensive),
            "INTENSIVE" => Ok(PatientClassification::Intensive),
            other => Err(format!("未知护理分级: {}", other)),
        }
    }
}

// ==========================================
// 岗位 (Staff Role)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StaffRole {
    Nurse,      // 护士
    Technician, // 护理技师
}

impl StaffRole {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            StaffRole::Nurse => "NURSE",
            StaffRole::Technician => "TECHNICIAN",
        }
    }
}

impl fmt::Display for StaffRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl FromStr for StaffRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NURSE" => Ok(StaffRole::Nurse),
            "TECHNICIAN" => Ok(StaffRole::Technician),
            other => Err(format!("未知岗位: {}", other)),
        }
    }
}

// ==========================================
// 汇总层级 (Scope Kind)
// ==========================================
// 层级: hospital → region → group → network, 仅用于汇总
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScopeKind {
    Network,
    Group,
    Region,
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKind::Network => write!(f, "NETWORK"),
            ScopeKind::Group => write!(f, "GROUP"),
            ScopeKind::Region => write!(f, "REGION"),
        }
    }
}

impl FromStr for ScopeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NETWORK" => Ok(ScopeKind::Network),
            "GROUP" => Ok(ScopeKind::Group),
            "REGION" => Ok(ScopeKind::Region),
            other => Err(format!("未知汇总层级: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_db_strings() {
        for class in PatientClassification::ALL {
            assert_eq!(class.to_db_str().parse::<PatientClassification>().unwrap(), class);
        }
        assert_eq!("internment".parse::<UnitType>().unwrap(), UnitType::Internment);
        assert_eq!(" technician ".parse::<StaffRole>().unwrap(), StaffRole::Technician);
        assert!("ICU".parse::<UnitType>().is_err());
    }

    #[test]
    fn test_classification_ordering_follows_complexity() {
        assert!(PatientClassification::Intensive > PatientClassification::SemiIntensive);
        assert!(PatientClassification::Minimal < PatientClassification::Intermediate);
        assert_eq!(PatientClassification::Intensive.default_care_hours(), 18.0);
    }
}
