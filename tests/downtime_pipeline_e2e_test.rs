// ==========================================
// 停机事件写入全流程 E2E 测试
// ==========================================
// 职责: 经 DowntimeApi 验证时间归一化、批次归属、短停改判、
//       重叠检测、更新重解析、删除与审计
// ==========================================


#[cfg(test)]
mod downtime_pipeline_e2e_test {
    use line_downtime::api::{ApiError, ResolveCatalogRequest, ResolveRunRequest};
    use line_downtime::config::{config_keys, ConfigManager};
    use line_downtime::domain::{DowntimeActionType, DowntimeEventInput};
    use line_downtime::engine::CatalogMatchStep;
    use line_downtime::repository::{
        DowntimeActionLogRepository, DowntimeEventRepository, DowntimeMasterRepository,
        ProductionRunRepository,
    };
    use line_downtime::DowntimeApi;

    use crate::test_helpers::{at, entry, input, run, setup_api};

    // ==========================================
    // 创建: 端到端场景
    // ==========================================

    #[test]
    fn test_short_breakdown_reclassified_and_attributed() {
        let (_tmp, _path, conn, api) = setup_api();
        DowntimeMasterRepository::new(conn.clone())
            .insert(&entry("M-MS-ELEC", "LINE A", "Minor Stop", "ELECTRICAL", None))
            .unwrap();

        let event = api
            .create_downtime_event(&input(
                "LINE A",
                "2024-01-01T09:00:00+07:00",
                8,
                "Breakdown",
                "ELECTRICAL",
            ))
            .unwrap();

        assert_eq!(event.run_id, "R1");
        assert_eq!(event.master_id, "M-MS-ELEC");
        assert_eq!(event.start_time, "2024-01-01 09:00");
        assert_eq!(event.end_time, "2024-01-01 09:08");
        assert_eq!(event.duration_min, 8);
    }

    #[test]
    fn test_missing_run_rejected_and_nothing_persisted() {
        let (_tmp, _path, conn, api) = setup_api();

        let err = api
            .create_downtime_event(&input(
                "LINE A",
                "2024-01-01T07:00:00+07:00",
                8,
                "Breakdown",
                "ELECTRICAL",
            ))
            .unwrap_err();

        assert_eq!(err.error_code(), "RUN_NOT_FOUND");
        assert_eq!(DowntimeEventRepository::new(conn).count().unwrap(), 0);
    }

    #[test]
    fn test_utc_input_stored_as_local_wall_clock() {
        let (_tmp, _path, _conn, api) = setup_api();

        let event = api
            .create_downtime_event(&input("LINE A", "2024-01-01T03:00:00Z", 30, "Breakdown", "ELECTRICAL"))
            .unwrap();

        assert_eq!(event.start_time, "2024-01-01 10:00");
        assert_eq!(event.end_time, "2024-01-01 10:30");
        assert_eq!(event.master_id, "M-BD-ELEC");
    }

    #[test]
    fn test_suffix_type_resolves_against_legacy_entry() {
        let (_tmp, _path, conn, api) = setup_api();
        DowntimeMasterRepository::new(conn.clone())
            .insert(&entry("M-BD-HYD", "LINE A", "Breakdown", "HYDRAULIC OIL LEAK", None))
            .unwrap();

        let event = api
            .create_downtime_event(&input("LINE A", "2024-01-01 11:00", 20, "breakdown", "HYDRAULIC - LEAK"))
            .unwrap();

        assert_eq!(event.master_id, "M-BD-HYD");
    }

    #[test]
    fn test_explicit_identifiers_short_circuit() {
        let (_tmp, _path, _conn, api) = setup_api();

        let explicit = DowntimeEventInput {
            line: "LINE A".to_string(),
            start_time: "2024-01-01 12:00".to_string(),
            duration_min: 5,
            run_id: Some("R1".to_string()),
            master_id: Some("M-MS-JAM".to_string()),
            machine_id: Some(" FILLER-02 ".to_string()),
            ..Default::default()
        };
        let event = api.create_downtime_event(&explicit).unwrap();
        assert_eq!(event.run_id, "R1");
        assert_eq!(event.master_id, "M-MS-JAM");
        assert_eq!(event.machine_id.as_deref(), Some("FILLER-02"));

        let unknown_run = DowntimeEventInput {
            run_id: Some("R404".to_string()),
            start_time: "2024-01-01 13:00".to_string(),
            ..explicit.clone()
        };
        let err = api.create_downtime_event(&unknown_run).unwrap_err();
        assert_eq!(err.error_code(), "RUN_NOT_FOUND");

        let unknown_master = DowntimeEventInput {
            master_id: Some("M404".to_string()),
            start_time: "2024-01-01 13:00".to_string(),
            ..explicit
        };
        let err = api.create_downtime_event(&unknown_master).unwrap_err();
        assert_eq!(err.error_code(), "CATALOG_ENTRY_NOT_FOUND");
    }

    #[test]
    fn test_input_validation_errors() {
        let (_tmp, _path, _conn, api) = setup_api();

        let err = api
            .create_downtime_event(&input("LINE A", "not a time", 10, "Breakdown", "ELECTRICAL"))
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidTimestamp(_)));

        let err = api
            .create_downtime_event(&input("LINE A", "2024-01-01 10:00", 0, "Breakdown", "ELECTRICAL"))
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_INPUT");

        let mut no_type = input("LINE A", "2024-01-01 10:00", 10, "Breakdown", "ELECTRICAL");
        no_type.type_label = None;
        let err = api.create_downtime_event(&no_type).unwrap_err();
        assert_eq!(err.error_code(), "MISSING_SELECTOR");

        let err = api
            .create_downtime_event(&input("LINE A", "2024-01-01 10:00", 10, "Changeover", "ELECTRICAL"))
            .unwrap_err();
        assert_eq!(err.error_code(), "CATALOG_ENTRY_NOT_FOUND");
    }

    #[test]
    fn test_catalog_category_with_internal_whitespace_matches() {
        let (_tmp, _path, conn, api) = setup_api();
        DowntimeMasterRepository::new(conn.clone())
            .insert(&entry("M-B-MS-JAM", "LINE B", "Minor  Stop", "JAM", None))
            .unwrap();

        let event = api
            .create_downtime_event(&input("LINE B", "2024-01-01 10:00", 5, "minor_stop", "JAM"))
            .unwrap();
        assert_eq!(event.master_id, "M-B-MS-JAM");
    }

    #[test]
    fn test_oversized_duration_rejected_and_writer_stays_usable() {
        let (_tmp, _path, conn, api) = setup_api();

        // 分钟数溢出时间范围
        let err = api
            .create_downtime_event(&input("LINE A", "2024-01-01 10:00", i64::MAX, "Breakdown", "ELECTRICAL"))
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_INPUT");

        // 后续写入不受影响（连接锁未被破坏）
        let ok = api
            .create_downtime_event(&input("LINE A", "2024-01-01 10:00", 30, "Breakdown", "ELECTRICAL"))
            .unwrap();
        assert_eq!(ok.end_time, "2024-01-01 10:30");
        assert_eq!(DowntimeEventRepository::new(conn).count().unwrap(), 1);
    }

    #[test]
    fn test_end_beyond_year_9999_rejected_before_write() {
        let (_tmp, _path, conn, api) = setup_api();

        // 约 9500 年，结束年份超出四位
        let err = api
            .create_downtime_event(&input("LINE A", "2024-01-01 10:00", 5_000_000_000, "Breakdown", "ELECTRICAL"))
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_INPUT");

        // 未写入，故同一产线的正常区间不被误判重叠
        api.create_downtime_event(&input("LINE A", "2024-01-01 12:00", 30, "Breakdown", "ELECTRICAL"))
            .unwrap();
        assert_eq!(DowntimeEventRepository::new(conn).count().unwrap(), 1);

        let err = api
            .create_downtime_event(&input("LINE A", "+12024-01-01 10:00", 30, "Breakdown", "ELECTRICAL"))
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_TIMESTAMP");
    }

    #[test]
    fn test_oversized_duration_rejected_on_update() {
        let (_tmp, _path, _conn, api) = setup_api();
        let event = api
            .create_downtime_event(&input("LINE A", "2024-01-01 10:00", 30, "Breakdown", "ELECTRICAL"))
            .unwrap();

        let err = api
            .update_downtime_event(
                &event.event_id,
                &input("LINE A", "2024-01-01 10:00", 5_000_000_000, "Breakdown", "ELECTRICAL"),
            )
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_INPUT");

        let unchanged = api.get_downtime_event(&event.event_id).unwrap();
        assert_eq!(unchanged.end_time, "2024-01-01 10:30");
    }

    // ==========================================
    // 重叠检测
    // ==========================================

    #[test]
    fn test_overlap_law() {
        let (_tmp, _path, _conn, api) = setup_api();

        let a = api
            .create_downtime_event(&input("LINE A", "2024-01-01 10:00", 30, "Breakdown", "ELECTRICAL"))
            .unwrap();

        // B 与 A 相交，即使原因不同
        let err = api
            .create_downtime_event(&input("LINE A", "2024-01-01 10:15", 30, "Changeover", "CO SIZE 2"))
            .unwrap_err();
        match err {
            ApiError::DowntimeOverlap {
                conflicting_event_id,
                conflicting_start,
                conflicting_end,
            } => {
                assert_eq!(conflicting_event_id, a.event_id);
                assert_eq!(conflicting_start, "2024-01-01 10:00");
                assert_eq!(conflicting_end, "2024-01-01 10:30");
            }
            other => panic!("Expected DowntimeOverlap, got {:?}", other),
        }

        // C 与 A 首尾相接
        let c = api
            .create_downtime_event(&input("LINE A", "2024-01-01 10:30", 30, "Breakdown", "ELECTRICAL"))
            .unwrap();
        assert_eq!(c.start_time, "2024-01-01 10:30");
    }

    #[test]
    fn test_same_interval_on_other_line_allowed() {
        let (_tmp, _path, _conn, api) = setup_api();

        api.create_downtime_event(&input("LINE A", "2024-01-01 10:00", 30, "Breakdown", "ELECTRICAL"))
            .unwrap();
        let other = api
            .create_downtime_event(&input("LINE B", "2024-01-01 10:00", 30, "Breakdown", "ELECTRICAL"))
            .unwrap();

        assert_eq!(other.run_id, "R3");
        assert_eq!(other.master_id, "M-B-BD-ELEC");
    }

    #[test]
    fn test_repeated_submission_rejected_as_overlap() {
        let (_tmp, _path, conn, api) = setup_api();
        let request = input("LINE A", "2024-01-01 10:00", 30, "Breakdown", "ELECTRICAL");

        api.create_downtime_event(&request).unwrap();
        let err = api.create_downtime_event(&request).unwrap_err();

        assert_eq!(err.error_code(), "DOWNTIME_OVERLAP");
        assert_eq!(DowntimeEventRepository::new(conn).count().unwrap(), 1);
    }

    // ==========================================
    // 更新
    // ==========================================

    #[test]
    fn test_update_moves_event_across_run_boundary() {
        let (_tmp, _path, _conn, api) = setup_api();

        let created = api
            .create_downtime_event(&input("LINE A", "2024-01-01 15:00", 30, "Breakdown", "ELECTRICAL"))
            .unwrap();
        assert_eq!(created.run_id, "R1");

        let updated = api
            .update_downtime_event(
                &created.event_id,
                &input("LINE A", "2024-01-01 17:00", 30, "Breakdown", "ELECTRICAL"),
            )
            .unwrap();

        assert_eq!(updated.event_id, created.event_id);
        assert_eq!(updated.run_id, "R2");
        assert_eq!(updated.start_time, "2024-01-01 17:00");
        assert_eq!(api.get_downtime_event(&created.event_id).unwrap(), updated);
    }

    #[test]
    fn test_update_does_not_conflict_with_itself() {
        let (_tmp, _path, _conn, api) = setup_api();

        let created = api
            .create_downtime_event(&input("LINE A", "2024-01-01 10:00", 30, "Breakdown", "ELECTRICAL"))
            .unwrap();
        let updated = api
            .update_downtime_event(
                &created.event_id,
                &input("LINE A", "2024-01-01 10:10", 40, "Breakdown", "ELECTRICAL"),
            )
            .unwrap();

        assert_eq!(updated.end_time, "2024-01-01 10:50");
    }

    #[test]
    fn test_update_reclassifies_when_duration_shrinks() {
        let (_tmp, _path, _conn, api) = setup_api();

        // 15 分钟的 Breakdown 不改判，Breakdown 下无 JAM
        let err = api
            .create_downtime_event(&input("LINE A", "2024-01-01 10:00", 15, "Breakdown", "JAM"))
            .unwrap_err();
        assert_eq!(err.error_code(), "CATALOG_ENTRY_NOT_FOUND");

        let created = api
            .create_downtime_event(&input("LINE A", "2024-01-01 10:00", 15, "Minor Stop", "JAM"))
            .unwrap();
        let updated = api
            .update_downtime_event(
                &created.event_id,
                &input("LINE A", "2024-01-01 10:00", 5, "Breakdown", "JAM"),
            )
            .unwrap();
        assert_eq!(updated.master_id, "M-MS-JAM");
        assert_eq!(updated.end_time, "2024-01-01 10:05");
    }

    #[test]
    fn test_rejected_update_leaves_event_unchanged() {
        let (_tmp, _path, _conn, api) = setup_api();

        api.create_downtime_event(&input("LINE A", "2024-01-01 10:00", 30, "Breakdown", "ELECTRICAL"))
            .unwrap();
        let d = api
            .create_downtime_event(&input("LINE A", "2024-01-01 11:00", 30, "Breakdown", "ELECTRICAL"))
            .unwrap();

        let err = api
            .update_downtime_event(
                &d.event_id,
                &input("LINE A", "2024-01-01 10:15", 30, "Breakdown", "ELECTRICAL"),
            )
            .unwrap_err();
        assert_eq!(err.error_code(), "DOWNTIME_OVERLAP");
        assert_eq!(api.get_downtime_event(&d.event_id).unwrap(), d);
    }

    #[test]
    fn test_update_unknown_event() {
        let (_tmp, _path, _conn, api) = setup_api();

        let err = api
            .update_downtime_event("missing", &input("LINE A", "2024-01-01 10:00", 30, "Breakdown", "ELECTRICAL"))
            .unwrap_err();
        assert_eq!(err.error_code(), "EVENT_NOT_FOUND");

        let err = api
            .update_downtime_event("  ", &input("LINE A", "2024-01-01 10:00", 30, "Breakdown", "ELECTRICAL"))
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_INPUT");
    }

    // ==========================================
    // 删除 / 查询 / 审计
    // ==========================================

    #[test]
    fn test_delete_then_lookup_fails() {
        let (_tmp, _path, _conn, api) = setup_api();

        let created = api
            .create_downtime_event(&input("LINE A", "2024-01-01 10:00", 30, "Breakdown", "ELECTRICAL"))
            .unwrap();
        api.delete_downtime_event(&created.event_id).unwrap();

        assert_eq!(
            api.get_downtime_event(&created.event_id).unwrap_err().error_code(),
            "EVENT_NOT_FOUND"
        );
        assert_eq!(
            api.delete_downtime_event(&created.event_id).unwrap_err().error_code(),
            "EVENT_NOT_FOUND"
        );

        // 删除后区间释放
        api.create_downtime_event(&input("LINE A", "2024-01-01 10:00", 30, "Breakdown", "ELECTRICAL"))
            .unwrap();
    }

    #[test]
    fn test_list_events_by_run() {
        let (_tmp, _path, _conn, api) = setup_api();

        api.create_downtime_event(&input("LINE A", "2024-01-01 11:00", 30, "Breakdown", "ELECTRICAL"))
            .unwrap();
        api.create_downtime_event(&input("LINE A", "2024-01-01 09:00", 5, "Minor Stop", "JAM"))
            .unwrap();
        api.create_downtime_event(&input("LINE A", "2024-01-01 18:00", 5, "Minor Stop", "JAM"))
            .unwrap();

        let events = api.list_downtime_events_by_run("R1").unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.run_id == "R1"));
        assert!(api.list_downtime_events_by_run("R3").unwrap().is_empty());
    }

    #[test]
    fn test_audit_trail_records_each_write() {
        let (_tmp, _path, conn, api) = setup_api();

        let created = api
            .create_downtime_event(&input("LINE A", "2024-01-01 15:00", 30, "Breakdown", "ELECTRICAL"))
            .unwrap();
        api.update_downtime_event(
            &created.event_id,
            &input("LINE A", "2024-01-01 17:00", 30, "Breakdown", "ELECTRICAL"),
        )
        .unwrap();
        api.delete_downtime_event(&created.event_id).unwrap();

        // 被拒绝的写入不留审计
        let _ = api.create_downtime_event(&input("LINE A", "2024-01-01 07:00", 30, "Breakdown", "ELECTRICAL"));

        let logs = DowntimeActionLogRepository::new(conn).list_by_event(&created.event_id).unwrap();
        let kinds: Vec<DowntimeActionType> = logs.iter().map(|l| l.action_type).collect();
        assert_eq!(
            kinds,
            vec![
                DowntimeActionType::Create,
                DowntimeActionType::Update,
                DowntimeActionType::Delete
            ]
        );
        assert!(logs[1].detail.as_deref().unwrap_or("").contains("run=R2"));
        assert!(logs[2].payload_json.is_some());
    }

    // ==========================================
    // 独立解析
    // ==========================================

    #[test]
    fn test_resolve_run_id_with_plant_shift_fallback() {
        let (_tmp, _path, _conn, api) = setup_api();

        let primary = ResolveRunRequest {
            plant: None,
            line: "LINE A".to_string(),
            shift: None,
            start_time: "2024-01-01 16:00".to_string(),
        };
        // 边界时刻取最近开始的批次
        assert_eq!(api.resolve_run_id(&primary).unwrap(), "R2");

        // 大小写与首尾空白不影响主策略
        let casual = ResolveRunRequest {
            plant: None,
            line: " line a ".to_string(),
            shift: None,
            start_time: "2024-01-01 09:00".to_string(),
        };
        assert_eq!(api.resolve_run_id(&casual).unwrap(), "R1");

        // 分隔符不同只能经 plant + shift 兜底
        let fallback = ResolveRunRequest {
            plant: Some(" p1 ".to_string()),
            line: "line-a".to_string(),
            shift: Some("a".to_string()),
            start_time: "2024-01-01 09:00".to_string(),
        };
        assert_eq!(api.resolve_run_id(&fallback).unwrap(), "R1");

        let no_fallback = ResolveRunRequest {
            plant: None,
            shift: None,
            ..fallback
        };
        assert_eq!(api.resolve_run_id(&no_fallback).unwrap_err().error_code(), "RUN_NOT_FOUND");
    }

    #[test]
    fn test_line_window_run_preferred_over_plant_shift_run() {
        let (_tmp, _path, conn, api) = setup_api();
        // 另一批次同样包含 09:00，且 plant/shift 指向它
        ProductionRunRepository::new(conn.clone())
            .insert(&run("R7", "P1", "LINE_A", "X", at(8, 0), Some(at(16, 0))))
            .unwrap();

        let request = ResolveRunRequest {
            plant: Some("P1".to_string()),
            line: "LINE A".to_string(),
            shift: Some("X".to_string()),
            start_time: "2024-01-01 09:00".to_string(),
        };
        assert_eq!(api.resolve_run_id(&request).unwrap(), "R1");

        let event = api
            .create_downtime_event(&DowntimeEventInput {
                plant: Some("P1".to_string()),
                shift: Some("X".to_string()),
                ..input("LINE A", "2024-01-01 09:00", 30, "Breakdown", "ELECTRICAL")
            })
            .unwrap();
        assert_eq!(event.run_id, "R1");
    }

    #[test]
    fn test_lowercase_line_resolves_run_catalog_and_overlap() {
        let (_tmp, _path, _conn, api) = setup_api();

        let first = api
            .create_downtime_event(&input("line a", "2024-01-01 10:00", 30, "Breakdown", "ELECTRICAL"))
            .unwrap();
        assert_eq!(first.run_id, "R1");
        assert_eq!(first.master_id, "M-BD-ELEC");

        let err = api
            .create_downtime_event(&input("LINE A ", "2024-01-01 10:15", 30, "Breakdown", "ELECTRICAL"))
            .unwrap_err();
        assert_eq!(err.error_code(), "DOWNTIME_OVERLAP");
    }

    #[test]
    fn test_resolve_catalog_entry_reclassification() {
        let (_tmp, _path, _conn, api) = setup_api();

        let short = api
            .resolve_catalog_entry(&ResolveCatalogRequest {
                line: "LINE A".to_string(),
                category: "Breakdown".to_string(),
                type_label: "ELECTRICAL".to_string(),
                detail: None,
                duration_min: 5,
            })
            .unwrap();
        assert!(short.reclassified);
        // Minor Stop 下无 ELECTRICAL，回退 Breakdown
        assert_eq!(short.entry.master_id, "M-BD-ELEC");
        assert_eq!(short.resolved_category.as_deref(), Some("BREAKDOWN"));
        assert_eq!(short.step, CatalogMatchStep::BreakdownTypeAndDetail);

        let long = api
            .resolve_catalog_entry(&ResolveCatalogRequest {
                line: "LINE A".to_string(),
                category: "Breakdown".to_string(),
                type_label: "MECHANICAL".to_string(),
                detail: Some("Gearbox".to_string()),
                duration_min: 15,
            })
            .unwrap();
        assert!(!long.reclassified);
        assert_eq!(long.entry.master_id, "M-BD-MECH-BRG");
        assert_eq!(long.step, CatalogMatchStep::TypeOnly);
    }

    #[test]
    fn test_rules_loaded_from_config() {
        let (_tmp, _path, conn, _api) = setup_api();
        let config = ConfigManager::new(conn.clone());
        config
            .set_global_value(config_keys::MINOR_STOP_THRESHOLD_MIN, "20")
            .unwrap();
        config
            .set_global_value(config_keys::LOCAL_UTC_OFFSET_MINUTES, "0")
            .unwrap();

        let api = DowntimeApi::from_connection(conn).unwrap();
        let event = api
            .create_downtime_event(&input("LINE A", "2024-01-01T09:00:00Z", 15, "Breakdown", "JAM"))
            .unwrap();

        assert_eq!(event.master_id, "M-MS-JAM");
        assert_eq!(event.start_time, "2024-01-01 09:00");
    }
}
