//! Job-client port for the external job-execution service.
//!
//! The orchestrator schedules a scrape job per connector and polls its
//! items through this trait. The production implementation speaks the
//! Scrapyd HTTP contract; tests substitute scripted fakes.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::ScrapedItem;

/// Failures at the job-host boundary. Both abort the run without touching
/// the persisted cursor.
#[derive(Debug, Error)]
pub enum JobClientError {
    /// The host rejected the schedule request or omitted a job id.
    #[error("failed to schedule spider {spider}: {message}")]
    Schedule { spider: String, message: String },
    /// The items endpoint was unreachable. A non-success HTTP status is
    /// not this error; it means "no items yet".
    #[error("unable to fetch items for job {job_id}: {message}")]
    Fetch { job_id: String, message: String },
}

/// Settings forwarded to the job host when scheduling. The cursor lets the
/// host resume server-side.
#[derive(Debug, Clone, Default)]
pub struct JobSettings {
    pub cursor: Option<String>,
    pub extra: Vec<(String, String)>,
}

/// Client contract for the external spider host.
#[async_trait]
pub trait JobClient: Send + Sync {
    /// Schedule a job and return the host-assigned job id.
    async fn schedule_job(
        &self,
        spider: &str,
        settings: &JobSettings,
    ) -> Result<String, JobClientError>;

    /// Fetch the items a job has produced so far. An empty batch is a
    /// normal answer while the job is still running.
    async fn fetch_items(&self, job_id: &str) -> Result<Vec<ScrapedItem>, JobClientError>;
}
