// ==========================================
// 人力投影集成测试
// ==========================================
// 职责: 经 API / 命令层验证投影与缺口表
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod projection_test {
    use staffing_dimensioning::api::ApiError;
    use staffing_dimensioning::app::commands;
    use staffing_dimensioning::domain::projection::{ProjectionParams, ProjectionResult};

    use crate::test_helpers::{create_app_state, create_test_db};

    fn scenario_a() -> ProjectionParams {
        ProjectionParams {
            current_nurses: 4,
            current_techs: 14,
            beds: 20,
            base_occupancy: 0.6,
            base_the: 36.0,
            base_nurses_required: 6.78,
            base_techs_required: 13.78,
            free_target_occupancy: 0.85,
        }
    }

    #[test]
    fn test_scenario_a_via_api() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let state = create_app_state(&db_path);

        let result = state
            .dimensioning_api
            .compute_projection(&scenario_a())
            .unwrap();
        assert!((result.nurse_fte_100 - 11.3).abs() < 1e-9);
        assert!((result.tech_fte_100 - 22.97).abs() < 1e-2);
        assert!((result.max_attainable_occupancy_pct() - 35.4).abs() < 0.1);
    }

    #[test]
    fn test_scenario_b_gap_row() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let state = create_app_state(&db_path);

        let result = state
            .dimensioning_api
            .compute_projection(&scenario_a())
            .unwrap();
        let row = result.gap_at(1.0).unwrap();
        assert_eq!(row.required_nurse_headcount, 12);
        assert_eq!(row.gap_nurse, 8);
    }

    #[test]
    fn test_invalid_params_map_to_invalid_input() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let state = create_app_state(&db_path);

        let params = ProjectionParams {
            base_occupancy: 0.0,
            ..scenario_a()
        };
        let err = state.dimensioning_api.compute_projection(&params).unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_compute_projection_command_returns_json() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let state = create_app_state(&db_path);

        let json = commands::compute_projection(&state, scenario_a())
            .await
            .unwrap();
        let result: ProjectionResult = serde_json::from_str(&json).unwrap();
        assert_eq!(result.gap_rows.len(), 6);
        assert!(result.gap_rows.last().unwrap().is_free_target);
    }
}
