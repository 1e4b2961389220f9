use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use scheduler_core::{CreateJobError, TimelineEntry};
use scheduler_domain::{CreateJobInput, Job, JobConstructionError, SchedulerError};

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

fn error_body(message: impl Into<String>) -> Json<ErrorBody> {
    Json(ErrorBody { error: message.into() })
}

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    #[serde(rename = "type")]
    pub job_type: String,
    pub callback_url: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    pub max_retries: i32,
    #[serde(default)]
    pub priority: i32,
}

impl From<CreateJobRequest> for CreateJobInput {
    fn from(body: CreateJobRequest) -> Self {
        CreateJobInput {
            job_type: body.job_type,
            callback_url: body.callback_url,
            payload: body.payload,
            scheduled_at: body.scheduled_at,
            max_retries: body.max_retries,
            priority: body.priority,
        }
    }
}

pub async fn create(
    State(coordinator): State<AppState>,
    Json(body): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<Job>), (StatusCode, Json<ErrorBody>)> {
    let job = coordinator.create(body.into()).await.map_err(|err| match err {
        CreateJobError::Invalid(
            JobConstructionError::EmptyCallbackUrl | JobConstructionError::NegativeMaxRetries(_),
        ) => (StatusCode::BAD_REQUEST, error_body(err.to_string())),
        CreateJobError::Store(store_err) => {
            tracing::error!(error = %store_err, "failed to persist new job");
            (StatusCode::INTERNAL_SERVER_ERROR, error_body("failed to create job"))
        }
    })?;
    Ok((StatusCode::CREATED, Json(job)))
}

pub async fn get_one(
    State(coordinator): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Job>, (StatusCode, Json<ErrorBody>)> {
    coordinator.get_one(id).await.map(Json).map_err(store_error)
}

#[derive(Debug, Serialize)]
pub struct TimelineEntryDto {
    #[serde(rename = "type")]
    pub event_type: scheduler_domain::EventType,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub synthetic: bool,
}

impl From<&TimelineEntry> for TimelineEntryDto {
    fn from(entry: &TimelineEntry) -> Self {
        TimelineEntryDto {
            event_type: entry.event_type(),
            message: entry.message().to_string(),
            created_at: entry.created_at(),
            synthetic: matches!(entry, TimelineEntry::Synthetic { .. }),
        }
    }
}

pub async fn get_timeline(
    State(coordinator): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TimelineEntryDto>>, (StatusCode, Json<ErrorBody>)> {
    let entries = coordinator.get_timeline(id).await.map_err(store_error)?;
    Ok(Json(entries.iter().map(TimelineEntryDto::from).collect()))
}

fn store_error(err: SchedulerError) -> (StatusCode, Json<ErrorBody>) {
    match err {
        SchedulerError::NotFound => (StatusCode::NOT_FOUND, error_body("job not found")),
        other => {
            tracing::error!(error = %other, "admission API store failure");
            (StatusCode::INTERNAL_SERVER_ERROR, error_body(other.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{self, Request};
    use http_body_util::BodyExt;
    use scheduler_outbox::Outbox;
    use scheduler_testing::{InMemoryStore, RecordingBroker, ScriptedExecutor};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let store = Arc::new(InMemoryStore::new());
        let broker = Arc::new(RecordingBroker::new());
        let executor = Arc::new(ScriptedExecutor::always(scheduler_domain::ExecutionOutcome::Success {
            http_status: 200,
        }));
        Arc::new(scheduler_core::Coordinator::new(store, broker, executor, Arc::new(Outbox::new())))
    }

    #[tokio::test]
    async fn create_job_returns_201() {
        let app = crate::handlers::router(test_state());
        let body = serde_json::json!({
            "type": "ping",
            "callback_url": "http://cb/ok",
            "payload": {},
            "max_retries": 3,
            "priority": 0,
        });

        let response = app
            .oneshot(
                Request::builder()
                    .method(http::Method::POST)
                    .uri("/jobs")
                    .header(http::header::CONTENT_TYPE, "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let job: Job = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(job.job_type, "ping");
    }

    #[tokio::test]
    async fn create_job_with_empty_callback_url_returns_400() {
        let app = crate::handlers::router(test_state());
        let body = serde_json::json!({
            "type": "ping",
            "callback_url": "",
            "payload": {},
            "max_retries": 3,
            "priority": 0,
        });

        let response = app
            .oneshot(
                Request::builder()
                    .method(http::Method::POST)
                    .uri("/jobs")
                    .header(http::header::CONTENT_TYPE, "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_missing_job_returns_404() {
        let app = crate::handlers::router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/jobs/{}", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
