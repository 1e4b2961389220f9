use std::sync::Arc;

use scheduler_core::Coordinator;

pub type AppState = Arc<Coordinator>;
