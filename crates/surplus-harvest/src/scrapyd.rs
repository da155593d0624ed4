//! Scrapyd-compatible [`JobClient`] implementation.
//!
//! Speaks the spider host's HTTP contract:
//!
//! - `POST {base_url}/schedule.json` with form fields `project`, `spider`,
//!   plus extra settings such as `cursor`; the host answers
//!   `{"status": "ok", "jobid": "..."}` or an error payload.
//! - `GET {base_url}/items/{project}/{job_id}.json` for the items a job
//!   has produced. A non-success HTTP status means the job has not written
//!   items yet and yields an empty batch; only a transport failure is an
//!   error.

use std::time::Duration;

use serde::Deserialize;

use surplus_harvest_core::jobs::{JobClient, JobClientError, JobSettings};
use surplus_harvest_core::models::ScrapedItem;

use crate::config::ScrapydConfig;

pub struct ScrapydClient {
    http: reqwest::Client,
    base_url: String,
    project: String,
}

#[derive(Debug, Deserialize)]
struct ScheduleResponse {
    status: String,
    #[serde(default)]
    jobid: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ScrapydClient {
    pub fn new(config: &ScrapydConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            project: config.project.clone(),
        })
    }
}

#[async_trait::async_trait]
impl JobClient for ScrapydClient {
    async fn schedule_job(
        &self,
        spider: &str,
        settings: &JobSettings,
    ) -> Result<String, JobClientError> {
        let schedule_err = |message: String| JobClientError::Schedule {
            spider: spider.to_string(),
            message,
        };

        let mut form: Vec<(String, String)> = vec![
            ("project".to_string(), self.project.clone()),
            ("spider".to_string(), spider.to_string()),
        ];
        if let Some(cursor) = &settings.cursor {
            form.push(("cursor".to_string(), cursor.clone()));
        }
        form.extend(settings.extra.iter().cloned());

        let response = self
            .http
            .post(format!("{}/schedule.json", self.base_url))
            .form(&form)
            .send()
            .await
            .map_err(|e| schedule_err(e.to_string()))?;

        let data: ScheduleResponse = response
            .json()
            .await
            .map_err(|e| schedule_err(format!("invalid schedule response: {}", e)))?;

        match (data.status.as_str(), data.jobid) {
            ("ok", Some(job_id)) => Ok(job_id),
            _ => Err(schedule_err(
                data.message.unwrap_or_else(|| "unknown error".to_string()),
            )),
        }
    }

    async fn fetch_items(&self, job_id: &str) -> Result<Vec<ScrapedItem>, JobClientError> {
        let fetch_err = |message: String| JobClientError::Fetch {
            job_id: job_id.to_string(),
            message,
        };

        let response = self
            .http
            .get(format!(
                "{}/items/{}/{}.json",
                self.base_url, self.project, job_id
            ))
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;

        // The job may still be running; no items written is not an error.
        if !response.status().is_success() {
            return Ok(Vec::new());
        }

        response
            .json::<Vec<ScrapedItem>>()
            .await
            .map_err(|e| fetch_err(format!("invalid items payload: {}", e)))
    }
}
