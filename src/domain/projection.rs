// ==========================================
// 护理人力测算系统 - 人力投影模型
// ==========================================
// 用途: 基准占用率下的人力需求 → 100% 占用等效人力 / 缺口表
// 生命周期: 每次调用临时计算, 不落库
// ==========================================

use serde::{Deserialize, Serialize};

/// 固定缺口目标占用率
pub const FIXED_TARGET_OCCUPANCIES: [f64; 5] = [0.6, 0.7, 0.8, 0.9, 1.0];

// ==========================================
// ProjectionParams - 投影输入
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionParams {
    pub current_nurses: u32,        // 当前护士人数
    pub current_techs: u32,         // 当前技师人数
    pub beds: u32,                  // 床位数
    pub base_occupancy: f64,        // 基准占用率 (0 < x, 可超过 1)
    pub base_the: f64,              // 基准占用率下每日护理总时数
    pub base_nurses_required: f64,  // 基准占用率下护士 FTE
    pub base_techs_required: f64,   // 基准占用率下技师 FTE
    pub free_target_occupancy: f64, // 自定义目标占用率
}

// ==========================================
// GapAnalysisRow - 缺口表行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GapAnalysisRow {
    pub target_occupancy: f64,
    pub target_the: f64,
    pub required_nurse_fte: f64,
    pub required_tech_fte: f64,
    pub required_nurse_headcount: u32,
    pub required_tech_headcount: u32,
    pub gap_nurse: u32,
    pub gap_tech: u32,
    pub is_free_target: bool,
}

// ==========================================
// ProjectionResult - 投影输出
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionResult {
    pub nurse_fte_100: f64,
    pub tech_fte_100: f64,
    pub the_100: f64,
    /// 现有护士可支撑的占用率 (分母为 0 时为 0)
    pub nurse_ratio: f64,
    /// 现有技师可支撑的占用率 (分母为 0 时为 0)
    pub tech_ratio: f64,
    /// min(nurse_ratio, tech_ratio), 小数形式
    pub max_attainable_occupancy: f64,
    pub gap_rows: Vec<GapAnalysisRow>,
}

impl ProjectionResult {
    /// 按目标占用率查找缺口行（自定义目标优先匹配固定行）
    pub fn gap_at(&self, target: f64) -> Option<&GapAnalysisRow> {
        self.gap_rows
            .iter()
            .find(|row| (row.target_occupancy - target).abs() < 1e-9)
    }

    pub fn max_attainable_occupancy_pct(&self) -> f64 {
        self.max_attainable_occupancy * 100.0
    }
}
