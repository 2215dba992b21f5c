// ==========================================
// 层级汇总集成测试
// ==========================================
// 职责: 验证部分成功语义与同名科室合并
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod network_aggregation_test {
    use chrono::NaiveDate;
    use staffing_dimensioning::api::ApiError;
    use staffing_dimensioning::app::commands;
    use staffing_dimensioning::domain::occupancy::NetworkOccupancyReport;
    use staffing_dimensioning::domain::types::ScopeKind;

    use crate::test_helpers::*;

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
    }

    /// 3 家医院同属 R1; H2 的人力快照载荷损坏, 分析时失败
    fn seed(db_path: &str) {
        let conn = open_conn(db_path);
        seed_hierarchy(&conn);
        conn.execute_batch("INSERT INTO hospital_group VALUES ('G2', 'N1', 'Vazio');")
            .unwrap();
        for hospital_id in ["H1", "H2", "H3"] {
            seed_hospital(&conn, hospital_id, Some("R1"));
        }
        seed_unit(&conn, "U1", "H1", "UTI", "INTERNMENT", "ICU");
        seed_unit(&conn, "U1B", "H1", "Pediatria", "INTERNMENT", "PEDIATRIC");
        seed_unit(&conn, "U2", "H2", "UTI", "INTERNMENT", "ICU");
        seed_unit(&conn, "U3", "H3", " uti ", "INTERNMENT", "ICU");

        seed_census(&conn, "U1", "2026-03-10 08:00:00", 10, 5, 0);
        seed_census(&conn, "U1B", "2026-03-10 08:00:00", 8, 2, 0);
        seed_census(&conn, "U2", "2026-03-10 08:00:00", 50, 50, 0);
        seed_census(&conn, "U3", "2026-03-10 08:00:00", 30, 27, 0);

        seed_raw_snapshot(&conn, "H2", "UNIT", r#"{"scope":"UNIT","unit_id":"U2","nurses":-1}"#);
    }

    #[test]
    fn test_scenario_e_failing_hospital_is_skipped() {
        let (_tmp, db_path) = create_test_db().unwrap();
        seed(&db_path);
        let state = create_app_state(&db_path);

        let report = state
            .dimensioning_api
            .analyze_network_scope(ScopeKind::Network, "N1", Some(as_of()))
            .unwrap();

        assert_eq!(report.included_hospitals, vec!["H1", "H3"]);
        assert_eq!(report.skipped_hospitals.len(), 1);
        assert_eq!(report.skipped_hospitals[0].member_id, "H2");

        // 科室按名称 (trim + 小写) 合并并排序
        let names: Vec<&str> = report.sectors.iter().map(|s| s.sector_id.as_str()).collect();
        assert_eq!(names, vec!["pediatria", "uti"]);

        let uti = &report.sectors[1];
        assert_eq!(uti.metrics.total_beds, 40);
        assert!((uti.metrics.today_occupancy_pct - 80.0).abs() < 1e-9);
        assert!(uti.projection.is_none());

        // 顶层: (80×40 + 25×8) / 48
        let expected = (80.0 * 40.0 + 25.0 * 8.0) / 48.0;
        assert_eq!(report.summary.total_beds, 48);
        assert!((report.summary.today_occupancy_pct - expected).abs() < 1e-9);
    }

    #[test]
    fn test_region_and_group_scopes() {
        let (_tmp, db_path) = create_test_db().unwrap();
        seed(&db_path);
        let state = create_app_state(&db_path);
        let api = &state.dimensioning_api;

        let region = api
            .analyze_network_scope(ScopeKind::Region, "R1", Some(as_of()))
            .unwrap();
        assert_eq!(region.included_hospitals, vec!["H1", "H3"]);

        // 存在但没有医院的集团 → 空报告, 全零汇总
        let empty = api
            .analyze_network_scope(ScopeKind::Group, "G2", Some(as_of()))
            .unwrap();
        assert!(empty.sectors.is_empty());
        assert!(empty.included_hospitals.is_empty());
        assert_eq!(empty.summary.total_beds, 0);
        assert_eq!(empty.summary.today_occupancy_pct, 0.0);

        let err = api
            .analyze_network_scope(ScopeKind::Group, "G404", None)
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_scope_command_parses_kind() {
        let (_tmp, db_path) = create_test_db().unwrap();
        seed(&db_path);
        let state = create_app_state(&db_path);

        let json = commands::analyze_network_scope(
            &state,
            "region".to_string(),
            "R1".to_string(),
            Some("2026-03-10".to_string()),
        )
        .await
        .unwrap();
        let report: NetworkOccupancyReport = serde_json::from_str(&json).unwrap();
        assert_eq!(report.scope_kind, ScopeKind::Region);
        assert_eq!(report.skipped_hospitals[0].member_id, "H2");

        let err = commands::analyze_network_scope(
            &state,
            "CONTINENT".to_string(),
            "X".to_string(),
            None,
        )
        .await
        .unwrap_err();
        assert!(err.contains("未知汇总层级"));
    }
}
