//! HTTP implementation of [`scheduler_domain::Executor`].
//!
//! Posts a job's payload to its callback URL as JSON. Any response
//! with a status below 400 counts as success; 4xx/5xx responses and
//! transport failures count as failure. A transport failure (timeout,
//! connection refused, DNS error, or cancellation) is reported with
//! `http_status = 0` since there was no HTTP response to classify.
//! This executor sets no client-level timeout of its own; operators
//! impose one by cancelling the ambient `CancellationToken`.

use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use scheduler_domain::{ExecutionOutcome, Executor, Job};

pub struct HttpExecutor {
    client: Client,
}

impl HttpExecutor {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }
}

impl Default for HttpExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn execute(&self, job: &Job, cancel: &CancellationToken) -> ExecutionOutcome {
        let request = self
            .client
            .post(&job.callback_url)
            .header("Content-Type", "application/json")
            .json(&job.payload)
            .send();

        tokio::select! {
            response = request => match response {
                Ok(resp) => {
                    let status = resp.status().as_u16() as i32;
                    if status < 400 {
                        ExecutionOutcome::Success { http_status: status }
                    } else {
                        let message = format!("callback responded with status {status}");
                        ExecutionOutcome::Failure { http_status: status, message }
                    }
                }
                Err(err) => {
                    tracing::debug!(job_id = %job.id, error = %err, "callback transport error");
                    ExecutionOutcome::Failure { http_status: 0, message: err.to_string() }
                }
            },
            _ = cancel.cancelled() => {
                tracing::debug!(job_id = %job.id, "callback cancelled");
                ExecutionOutcome::Failure { http_status: 0, message: "cancelled".to_string() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler_domain::{CreateJobInput, Job};

    fn sample_job(callback_url: &str) -> Job {
        Job::new(
            CreateJobInput {
                job_type: "http_callback".to_string(),
                callback_url: callback_url.to_string(),
                payload: serde_json::json!({"k": "v"}),
                max_retries: 3,
                priority: 0,
                scheduled_at: None,
            },
            chrono::Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn transport_failure_reports_zero_status() {
        let executor = HttpExecutor::new();
        let job = sample_job("http://127.0.0.1:1/unreachable");
        let outcome = executor.execute(&job, &CancellationToken::new()).await;
        match outcome {
            ExecutionOutcome::Failure { http_status, .. } => assert_eq!(http_status, 0),
            ExecutionOutcome::Success { .. } => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn cancellation_reports_zero_status() {
        let executor = HttpExecutor::new();
        let job = sample_job("http://10.255.255.1/unreachable");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = executor.execute(&job, &cancel).await;
        match outcome {
            ExecutionOutcome::Failure { http_status, message } => {
                assert_eq!(http_status, 0);
                assert_eq!(message, "cancelled");
            }
            ExecutionOutcome::Success { .. } => panic!("expected failure"),
        }
    }
}
