// ==========================================
// 护理人力测算系统 - 人力投影计算器
// ==========================================
// 纯函数: 无 I/O, 无状态, 相同输入得到相同输出
// 输入: ProjectionParams (基准占用率下的人力需求)
// 输出: 100% 等效人力 / 可支撑最大占用率 / 缺口表
// ==========================================

use crate::domain::projection::{
    GapAnalysisRow, ProjectionParams, ProjectionResult, FIXED_TARGET_OCCUPANCIES,
};
use crate::engine::error::{EngineError, EngineResult};

/// 向上取整容差, 避免 7.000000000001 这类浮点噪声多算一人
const CEIL_TOLERANCE: f64 = 1e-9;

// ==========================================
// ProjectionCalculator
// ==========================================
#[derive(Debug, Default, Clone, Copy)]
pub struct ProjectionCalculator;

impl ProjectionCalculator {
    pub fn new() -> Self {
        Self
    }

    /// 计算投影结果
    ///
    /// # 错误
    /// - base_occupancy <= 0 / 非有限数值 / 负基准 / free_target <= 0 → Validation
    pub fn compute(&self, params: &ProjectionParams) -> EngineResult<ProjectionResult> {
        validate(params)?;

        // 1. 折算到 100% 占用
        let nurse_fte_100 = params.base_nurses_required / params.base_occupancy;
        let tech_fte_100 = params.base_techs_required / params.base_occupancy;
        let the_100 = params.base_the / params.base_occupancy;

        // 2. 现有人力可支撑的占用率
        let nurse_ratio = safe_ratio(params.current_nurses as f64, nurse_fte_100);
        let tech_ratio = safe_ratio(params.current_techs as f64, tech_fte_100);
        let max_attainable_occupancy = nurse_ratio.min(tech_ratio);

        // 3. 缺口表: 固定目标 + 自定义目标
        let mut gap_rows: Vec<GapAnalysisRow> = FIXED_TARGET_OCCUPANCIES
            .iter()
            .map(|target| gap_row(params, *target, nurse_fte_100, tech_fte_100, the_100, false))
            .collect();
        gap_rows.push(gap_row(
            params,
            params.free_target_occupancy,
            nurse_fte_100,
            tech_fte_100,
            the_100,
            true,
        ));

        Ok(ProjectionResult {
            nurse_fte_100,
            tech_fte_100,
            the_100,
            nurse_ratio,
            tech_ratio,
            max_attainable_occupancy,
            gap_rows,
        })
    }
}

fn validate(params: &ProjectionParams) -> EngineResult<()> {
    let fields = [
        ("base_occupancy", params.base_occupancy),
        ("base_the", params.base_the),
        ("base_nurses_required", params.base_nurses_required),
        ("base_techs_required", params.base_techs_required),
        ("free_target_occupancy", params.free_target_occupancy),
    ];
    if let Some((name, value)) = fields.iter().find(|(_, v)| !v.is_finite()) {
        return Err(EngineError::Validation(format!(
            "{} 必须为有限数值: {}",
            name, value
        )));
    }

    if params.base_occupancy <= 0.0 {
        return Err(EngineError::Validation(format!(
            "base_occupancy 必须大于 0: {}",
            params.base_occupancy
        )));
    }
    if params.free_target_occupancy <= 0.0 {
        return Err(EngineError::Validation(format!(
            "free_target_occupancy 必须大于 0: {}",
            params.free_target_occupancy
        )));
    }
    if params.base_the < 0.0 || params.base_nurses_required < 0.0 || params.base_techs_required < 0.0
    {
        return Err(EngineError::Validation("基准人力/护理时数不能为负".to_string()));
    }
    Ok(())
}

/// 分母为 0 时定义为 0
fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator <= 0.0 {
        return 0.0;
    }
    numerator / denominator
}

fn ceil_headcount(fte: f64) -> u32 {
    let ceiled = (fte - CEIL_TOLERANCE).ceil();
    if ceiled <= 0.0 {
        0
    } else {
        ceiled as u32
    }
}

fn gap_row(
    params: &ProjectionParams,
    target: f64,
    nurse_fte_100: f64,
    tech_fte_100: f64,
    the_100: f64,
    is_free_target: bool,
) -> GapAnalysisRow {
    let required_nurse_fte = nurse_fte_100 * target;
    let required_tech_fte = tech_fte_100 * target;
    let required_nurse_headcount = ceil_headcount(required_nurse_fte);
    let required_tech_headcount = ceil_headcount(required_tech_fte);

    GapAnalysisRow {
        target_occupancy: target,
        target_the: the_100 * target,
        required_nurse_fte,
        required_tech_fte,
        required_nurse_headcount,
        required_tech_headcount,
        gap_nurse: required_nurse_headcount.saturating_sub(params.current_nurses),
        gap_tech: required_tech_headcount.saturating_sub(params.current_techs),
        is_free_target,
    }
}
