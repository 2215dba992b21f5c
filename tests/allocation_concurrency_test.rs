// ==========================================
// 配额账本并发测试
// ==========================================
// 职责: 验证并发写入下 Σ 站点分配 ≤ 单元配额
// 方式: 每个线程独立连接 (模拟多进程), Barrier 对齐起跑
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod allocation_concurrency_test {
    use futures::future::join_all;
    use staffing_dimensioning::api::ApiError;
    use staffing_dimensioning::app::commands;
    use staffing_dimensioning::domain::allocation::CapacityUsage;
    use staffing_dimensioning::domain::types::StaffRole;
    use staffing_dimensioning::repository::AllocationRepository;
    use staffing_dimensioning::services::{AllocationLedger, LedgerError};
    use std::sync::{Arc, Barrier, Mutex};
    use std::thread;

    use crate::test_helpers::*;

    fn ledger_on_own_connection(db_path: &str) -> AllocationLedger {
        let conn = Arc::new(Mutex::new(open_conn(db_path)));
        AllocationLedger::new(Arc::new(AllocationRepository::new(conn)))
    }

    /// 单元 U1 + 站点 S1/S2, 返回 capacity_id
    fn seed_capacity(db_path: &str, quantity: i64) -> String {
        let conn = open_conn(db_path);
        seed_hospital(&conn, "H1", None);
        seed_unit(&conn, "U1", "H1", "UTI", "INTERNMENT", "ICU");
        seed_site(&conn, "S1", "U1");
        seed_site(&conn, "S2", "U1");
        drop(conn);

        ledger_on_own_connection(db_path)
            .declare_capacity("U1", StaffRole::Nurse, quantity)
            .unwrap()
            .capacity_id
    }

    /// 并发执行 allocate_slot, 返回成功数
    fn race(db_path: &str, capacity_id: &str, workers: usize, quantity: i64) -> usize {
        let barrier = Arc::new(Barrier::new(workers));
        let handles: Vec<_> = (0..workers)
            .map(|i| {
                let db_path = db_path.to_string();
                let capacity_id = capacity_id.to_string();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    let ledger = ledger_on_own_connection(&db_path);
                    let site = if i % 2 == 0 { "S1" } else { "S2" };
                    barrier.wait();
                    ledger.allocate_slot(&capacity_id, site, quantity)
                })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            match handle.join().unwrap() {
                Ok(_) => successes += 1,
                Err(LedgerError::CapacityExceeded { .. }) => {}
                Err(e) => panic!("unexpected ledger error: {}", e),
            }
        }
        successes
    }

    #[test]
    fn test_scenario_c_two_concurrent_allocations_of_three() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let capacity_id = seed_capacity(&db_path, 5);

        assert_eq!(race(&db_path, &capacity_id, 2, 3), 1);

        let usage = ledger_on_own_connection(&db_path)
            .capacity_usage(&capacity_id)
            .unwrap();
        assert_eq!(
            usage,
            CapacityUsage {
                capacity: 5,
                allocated: 3
            }
        );
    }

    #[test]
    fn test_n_unit_allocations_succeed_exactly_min_n_c() {
        for (workers, capacity) in [(8usize, 5i64), (4, 6)] {
            let (_tmp, db_path) = create_test_db().unwrap();
            let capacity_id = seed_capacity(&db_path, capacity);

            let successes = race(&db_path, &capacity_id, workers, 1);
            assert_eq!(successes, workers.min(capacity as usize));

            let ledger = ledger_on_own_connection(&db_path);
            let usage = ledger.capacity_usage(&capacity_id).unwrap();
            assert!(usage.allocated <= usage.capacity);
            assert_eq!(usage.allocated, successes as i64);
            assert_eq!(ledger.list_allocations(&capacity_id).unwrap().len(), successes);
        }
    }

    #[test]
    fn test_update_and_shrink_respect_invariant() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let capacity_id = seed_capacity(&db_path, 5);
        let ledger = ledger_on_own_connection(&db_path);

        let a = ledger.allocate_slot(&capacity_id, "S1", 2).unwrap();
        ledger.allocate_slot(&capacity_id, "S2", 2).unwrap();

        // 2 → 3: 其余 2 + 3 = 5, 允许
        assert_eq!(ledger.update_allocation(&a.allocation_id, 3).unwrap().quantity, 3);
        // 3 → 4: 2 + 4 > 5
        assert!(matches!(
            ledger.update_allocation(&a.allocation_id, 4),
            Err(LedgerError::CapacityExceeded { .. })
        ));

        assert!(matches!(
            ledger.declare_capacity("U1", StaffRole::Nurse, 4),
            Err(LedgerError::CapacityExceeded { .. })
        ));
        ledger.release_allocation(&a.allocation_id).unwrap();
        assert_eq!(
            ledger
                .declare_capacity("U1", StaffRole::Nurse, 4)
                .unwrap()
                .capacity_id,
            capacity_id
        );
    }

    #[tokio::test]
    async fn test_concurrent_commands_share_one_state() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let capacity_id = seed_capacity(&db_path, 3);
        let state = create_app_state(&db_path);

        let calls = (0..6).map(|_| {
            commands::allocate_slot(&state, capacity_id.clone(), "S1".to_string(), 1)
        });
        let results = join_all(calls).await;

        let ok = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(ok, 3);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(err.contains("CAPACITY_EXCEEDED"));
        }

        let usage = state.dimensioning_api.capacity_usage(&capacity_id).unwrap();
        assert_eq!(usage.remaining(), 0);
    }

    #[test]
    fn test_site_of_other_unit_is_rejected() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let capacity_id = seed_capacity(&db_path, 5);
        {
            let conn = open_conn(&db_path);
            seed_unit(&conn, "U2", "H1", "Clinica", "INTERNMENT", "CLINICAL");
            seed_site(&conn, "S9", "U2");
        }
        let state = create_app_state(&db_path);

        let err = state
            .dimensioning_api
            .allocate_slot(&capacity_id, "S9", 1)
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));

        let err = state
            .dimensioning_api
            .allocate_slot(&capacity_id, "S404", 1)
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
