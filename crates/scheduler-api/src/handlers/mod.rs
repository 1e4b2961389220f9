use axum::{routing, Router};

use crate::state::AppState;

mod jobs;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", routing::get(index))
        .route("/jobs", routing::post(jobs::create))
        .route("/jobs/:id", routing::get(jobs::get_one))
        .route("/jobs/:id/timeline", routing::get(jobs::get_timeline))
        .with_state(state)
}

async fn index() -> &'static str {
    "job scheduler admission api"
}
