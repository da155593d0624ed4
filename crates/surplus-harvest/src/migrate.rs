use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Run rows: one per attempt chain, reused across retries
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS connector_runs (
            id TEXT PRIMARY KEY,
            connector_id TEXT NOT NULL,
            state TEXT NOT NULL,
            county_code TEXT NOT NULL,
            status TEXT NOT NULL,
            started_at INTEGER NOT NULL,
            finished_at INTEGER,
            error_message TEXT,
            cursor TEXT,
            stats TEXT,
            attempt_count INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Authoritative resume cursor per connector
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS connector_cursors (
            connector_id TEXT NOT NULL,
            state TEXT NOT NULL,
            county_code TEXT NOT NULL,
            cursor TEXT,
            updated_at INTEGER NOT NULL,
            UNIQUE(connector_id, state, county_code)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Dedupe cache of ingested canonical records
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cases (
            dedupe_key TEXT PRIMARY KEY,
            case_ref TEXT NOT NULL,
            state TEXT NOT NULL,
            county_code TEXT NOT NULL,
            property_id TEXT NOT NULL,
            sale_date TEXT,
            raw_sha256 TEXT NOT NULL,
            normalized_json TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Aggregated operator-facing view of the most recent run
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS connector_status (
            connector_key TEXT PRIMARY KEY,
            last_run INTEGER,
            last_cursor TEXT,
            last_job_id TEXT,
            extracted INTEGER NOT NULL DEFAULT 0,
            created INTEGER NOT NULL DEFAULT 0,
            failures INTEGER NOT NULL DEFAULT 0,
            last_error TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only local sink for the fire-and-forget audit events
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event TEXT NOT NULL,
            at INTEGER NOT NULL,
            state TEXT NOT NULL,
            county_code TEXT NOT NULL,
            payload TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_connector_runs_connector ON connector_runs(connector_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_connector_runs_created_at ON connector_runs(created_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_cases_case_ref ON cases(case_ref)")
        .execute(pool)
        .await?;

    Ok(())
}
