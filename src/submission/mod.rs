//! Submission: validates and persists new jobs, publishes to Broker
//! (spec.md §2, §4.2).

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use url::Url;

use crate::broker::{Broker, JobMessage};
use crate::ids::WebsiteId;
use crate::store::models::{Job, JobType};
use crate::store::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("website not found")]
    NotFound,

    #[error("website is inactive")]
    Inactive,

    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Broker(#[from] crate::broker::BrokerError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTemplateJobRequest {
    pub website_ref: WebsiteId,
    pub seed_url: String,
    #[serde(default)]
    pub variables: Option<Json>,
    pub priority: Option<i16>,
    pub scheduled_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub metadata: Option<Json>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineStep {
    pub name: String,
    pub method: String,
    pub browser_type: Option<String>,
    #[serde(flatten)]
    pub extra: Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateInlineJobRequest {
    pub seed_url: String,
    pub steps: Vec<InlineStep>,
    pub global_config: Json,
    #[serde(default)]
    pub variables: Option<Json>,
    pub priority: Option<i16>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionResult {
    pub job: Job,
}

pub struct Submission<'a> {
    store: &'a PgStore,
    broker: &'a Broker,
}

const DEFAULT_PRIORITY: i16 = 5;

impl<'a> Submission<'a> {
    pub fn new(store: &'a PgStore, broker: &'a Broker) -> Self {
        Self { store, broker }
    }

    /// spec.md §4.2 "Create template-based job".
    pub async fn create_template_job(
        &self,
        req: CreateTemplateJobRequest,
    ) -> Result<SubmissionResult, SubmissionError> {
        let website = self
            .store
            .get_website(req.website_ref)
            .await?
            .ok_or(SubmissionError::NotFound)?;

        if !website.is_active() {
            return Err(SubmissionError::Inactive);
        }

        validate_url(&req.seed_url)?;

        let max_retries = website.default_max_retries();
        let priority = req.priority.unwrap_or(DEFAULT_PRIORITY);
        let variables = req.variables.unwrap_or_else(|| serde_json::json!({}));

        let job = self
            .store
            .insert_job(
                &req.seed_url,
                Some(req.website_ref),
                None,
                variables,
                priority,
                JobType::OneTime,
                req.scheduled_at,
                max_retries,
            )
            .await?;

        self.publish(&job).await?;
        Ok(SubmissionResult { job })
    }

    /// spec.md §4.2 "Create inline job".
    pub async fn create_inline_job(
        &self,
        req: CreateInlineJobRequest,
    ) -> Result<SubmissionResult, SubmissionError> {
        validate_url(&req.seed_url)?;
        validate_inline_steps(&req.steps)?;

        let priority = req.priority.unwrap_or(DEFAULT_PRIORITY);
        let variables = req.variables.unwrap_or_else(|| serde_json::json!({}));

        let inline_config = serde_json::json!({
            "steps": req.steps,
            "global_config": req.global_config,
        });

        let job = self
            .store
            .insert_job(
                &req.seed_url,
                None,
                Some(inline_config),
                variables,
                priority,
                JobType::OneTime,
                None,
                3,
            )
            .await?;

        self.publish(&job).await?;
        Ok(SubmissionResult { job })
    }

    async fn publish(&self, job: &Job) -> Result<(), SubmissionError> {
        let payload = JobMessage {
            job_id: job.id,
            seed_url: job.seed_url.clone(),
            job_type: job.job_type,
            priority: job.priority,
            has_inline_config: job.inline_config.is_some(),
            website_id: job.website_ref,
        };
        self.broker.publish(&payload).await?;
        Ok(())
    }
}

fn validate_url(seed_url: &str) -> Result<(), SubmissionError> {
    let parsed = Url::parse(seed_url)
        .map_err(|e| SubmissionError::Validation(format!("malformed seed_url: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(SubmissionError::Validation(format!(
            "seed_url scheme must be http or https, got '{other}'"
        ))),
    }
}

fn validate_inline_steps(steps: &[InlineStep]) -> Result<(), SubmissionError> {
    if steps.is_empty() {
        return Err(SubmissionError::Validation("at least one step is required".into()));
    }

    let mut seen = std::collections::HashSet::new();
    for step in steps {
        if !seen.insert(step.name.as_str()) {
            return Err(SubmissionError::Validation(format!(
                "duplicate step name: '{}'",
                step.name
            )));
        }
        if step.method == "browser" && step.browser_type.is_none() {
            return Err(SubmissionError::Validation(format!(
                "step '{}' uses method=browser without a browser_type",
                step.name
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_step_names() {
        let steps = vec![
            InlineStep {
                name: "fetch".into(),
                method: "http".into(),
                browser_type: None,
                extra: serde_json::json!({}),
            },
            InlineStep {
                name: "fetch".into(),
                method: "http".into(),
                browser_type: None,
                extra: serde_json::json!({}),
            },
        ];
        assert!(matches!(
            validate_inline_steps(&steps),
            Err(SubmissionError::Validation(_))
        ));
    }

    #[test]
    fn rejects_browser_step_without_browser_type() {
        let steps = vec![InlineStep {
            name: "render".into(),
            method: "browser".into(),
            browser_type: None,
            extra: serde_json::json!({}),
        }];
        assert!(matches!(
            validate_inline_steps(&steps),
            Err(SubmissionError::Validation(_))
        ));
    }

    #[test]
    fn rejects_non_http_scheme() {
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("not a url").is_err());
        assert!(validate_url("https://example.com").is_ok());
    }
}
