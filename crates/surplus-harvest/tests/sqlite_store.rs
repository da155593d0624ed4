//! Durable adapter behavior on a temporary SQLite database.

use std::sync::Arc;

use chrono::Utc;
use tempfile::TempDir;

use surplus_harvest::config::Config;
use surplus_harvest::sqlite_store::{SqliteRunStore, SqliteStateStore};
use surplus_harvest::{db, migrate};

use surplus_harvest_core::models::{
    AuditEvent, AuditEventKind, CaseStatus, ConnectorConfig, ConnectorKey, ConnectorStatus,
    NormalizedCase, ParsingMode, RunStats, RunStatus, StoredCaseRecord,
};
use surplus_harvest_core::store::{
    NewRun, RunQuery, RunStore, RunUpdate, StateStore,
};

async fn setup() -> (TempDir, Arc<SqliteStateStore>, Arc<SqliteRunStore>) {
    let tmp = TempDir::new().unwrap();
    let config: Config = toml::from_str(&format!(
        r#"
[db]
path = "{}/data/svh.sqlite"
"#,
        tmp.path().display()
    ))
    .unwrap();

    let pool = db::connect(&config).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();

    (
        tmp,
        Arc::new(SqliteStateStore::new(pool.clone())),
        Arc::new(SqliteRunStore::new(pool)),
    )
}

fn connector() -> ConnectorConfig {
    ConnectorConfig {
        key: ConnectorKey::new("GA", "FULTON"),
        spider_name: "ga_fulton_overages".to_string(),
        watch_urls: vec![],
        schedule_interval_secs: 60,
        parsing_mode: ParsingMode::Normalized,
    }
}

fn stored_case(dedupe_key: &str, case_ref: &str) -> StoredCaseRecord {
    StoredCaseRecord {
        case_ref: case_ref.to_string(),
        normalized: NormalizedCase {
            case_ref: case_ref.to_string(),
            state: "GA".to_string(),
            county_code: "FULTON".to_string(),
            source_system: "sqlite-test".to_string(),
            filed_at: "2024-01-01".to_string(),
            sale_date: Some("2024-01-01".to_string()),
            property_address: None,
            parties: vec![],
            amounts: vec![],
            status: CaseStatus::Unknown,
            metadata: serde_json::Map::new(),
            raw: serde_json::json!({ "n": 1 }),
        },
        dedupe_key: dedupe_key.to_string(),
        connector: ConnectorKey::new("GA", "FULTON"),
        property_id: "123".to_string(),
        sale_date: Some("2024-01-01".to_string()),
        raw_sha256: "abc123".to_string(),
    }
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let tmp = TempDir::new().unwrap();
    let config: Config = toml::from_str(&format!(
        "[db]\npath = \"{}/svh.sqlite\"\n",
        tmp.path().display()
    ))
    .unwrap();

    let pool = db::connect(&config).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
}

#[tokio::test]
async fn run_rows_round_trip_with_stats() {
    let (_tmp, _state, runs) = setup().await;
    let connector = connector();

    let handle = runs
        .create_run(
            &connector,
            NewRun {
                status: RunStatus::Running,
                started_at: Utc::now(),
                cursor: None,
                attempt_count: 1,
            },
        )
        .await
        .unwrap();

    runs.update_run(
        &handle.id,
        RunUpdate {
            status: RunStatus::Success,
            finished_at: Some(Utc::now()),
            error_message: None,
            cursor: Some("cursor-1".to_string()),
            stats: Some(RunStats {
                extracted: 3,
                created: 2,
                failures: 0,
                job_id: Some("job-1".to_string()),
                case_refs: Some(vec!["TS-GA-FULTON-20240101-AAAA00-0".to_string()]),
            }),
            attempt_count: 2,
        },
    )
    .await
    .unwrap();

    let listed = runs.list_runs(RunQuery::default()).await.unwrap();
    assert_eq!(listed.len(), 1);
    let run = &listed[0];
    assert_eq!(run.id, handle.id);
    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(run.attempt_count, 2);
    assert_eq!(run.cursor.as_deref(), Some("cursor-1"));
    let stats = run.stats.as_ref().unwrap();
    assert_eq!(stats.extracted, 3);
    assert_eq!(stats.created, 2);
    assert_eq!(stats.job_id.as_deref(), Some("job-1"));

    let by_case_ref = runs
        .list_runs(RunQuery {
            case_ref: Some("TS-GA-FULTON-20240101-AAAA00-0".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_case_ref.len(), 1);

    let by_other_connector = runs
        .list_runs(RunQuery {
            connector_id: Some("tx_harris_overages".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(by_other_connector.is_empty());
}

#[tokio::test]
async fn persisted_cursor_upserts() {
    let (_tmp, _state, runs) = setup().await;
    let connector = connector();

    assert_eq!(runs.latest_cursor(&connector).await.unwrap(), None);

    runs.persist_cursor(&connector, Some("cursor-1"))
        .await
        .unwrap();
    assert_eq!(
        runs.latest_cursor(&connector).await.unwrap(),
        Some("cursor-1".to_string())
    );

    runs.persist_cursor(&connector, Some("cursor-2"))
        .await
        .unwrap();
    assert_eq!(
        runs.latest_cursor(&connector).await.unwrap(),
        Some("cursor-2".to_string())
    );

    runs.persist_cursor(&connector, None).await.unwrap();
    assert_eq!(runs.latest_cursor(&connector).await.unwrap(), None);
}

#[tokio::test]
async fn case_cache_is_conclusive_per_dedupe_key() {
    let (_tmp, state, _runs) = setup().await;

    let first = stored_case("K1", "TS-GA-FULTON-20240101-AAAA00-0");
    let mut replay = stored_case("K1", "TS-GA-FULTON-20240101-BBBB00-0");
    replay.property_id = "replayed".to_string();

    state.remember_case(first.clone()).await.unwrap();
    state.remember_case(replay).await.unwrap();

    let found = state.find_case("K1").await.unwrap().unwrap();
    assert_eq!(found.case_ref, first.case_ref);
    assert_eq!(found.property_id, "123");
    assert_eq!(found.normalized.source_system, "sqlite-test");

    state
        .remember_case(stored_case("K2", "TS-GA-FULTON-20240101-CCCC00-0"))
        .await
        .unwrap();
    assert_eq!(state.list_cases().await.unwrap().len(), 2);
    assert!(state.find_case("K3").await.unwrap().is_none());
}

#[tokio::test]
async fn status_round_trips_and_defaults() {
    let (_tmp, state, _runs) = setup().await;
    let connector = connector();

    let empty = state.status(&connector).await.unwrap();
    assert_eq!(empty.extracted, 0);
    assert_eq!(empty.last_run, None);

    state
        .put_status(
            &connector,
            ConnectorStatus {
                last_run: Some(Utc::now()),
                last_cursor: Some("cursor-1".to_string()),
                last_job_id: Some("job-1".to_string()),
                extracted: 5,
                created: 4,
                failures: 1,
                last_error: Some("ingestion failures".to_string()),
            },
        )
        .await
        .unwrap();

    let status = state.status(&connector).await.unwrap();
    assert_eq!(status.extracted, 5);
    assert_eq!(status.created, 4);
    assert_eq!(status.failures, 1);
    assert_eq!(status.last_cursor.as_deref(), Some("cursor-1"));
    assert_eq!(status.last_error.as_deref(), Some("ingestion failures"));
    assert!(status.last_run.is_some());
}

#[tokio::test]
async fn audit_log_preserves_order_and_payloads() {
    let (_tmp, state, _runs) = setup().await;
    let key = ConnectorKey::new("GA", "FULTON");

    for (kind, payload) in [
        (
            AuditEventKind::ConnectorRunStarted,
            serde_json::json!({ "cursor": null }),
        ),
        (
            AuditEventKind::ConnectorRunFinished,
            serde_json::json!({ "job_id": "job-1", "extracted": 1 }),
        ),
        (
            AuditEventKind::CasesCreated,
            serde_json::json!({ "count": 1 }),
        ),
    ] {
        state
            .audit(AuditEvent {
                event: kind,
                at: Utc::now(),
                connector: key.clone(),
                payload,
            })
            .await
            .unwrap();
    }

    let audits = state.list_audits().await.unwrap();
    assert_eq!(audits.len(), 3);
    assert_eq!(audits[0].event, AuditEventKind::ConnectorRunStarted);
    assert_eq!(audits[1].payload["job_id"], serde_json::json!("job-1"));
    assert_eq!(audits[2].event, AuditEventKind::CasesCreated);
}
