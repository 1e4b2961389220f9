use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use scheduler_domain::{ExecutionOutcome, Executor, Job};

/// Executor that replays a fixed script of outcomes, one per
/// invocation, and repeats the last one once the script is exhausted.
/// Lets a test say "fail, then fail, then succeed" without standing up
/// a real HTTP server.
pub struct ScriptedExecutor {
    script: Mutex<Vec<ExecutionOutcome>>,
}

impl ScriptedExecutor {
    pub fn new(script: Vec<ExecutionOutcome>) -> Self {
        assert!(!script.is_empty(), "scripted executor needs at least one outcome");
        Self { script: Mutex::new(script) }
    }

    pub fn always(outcome: ExecutionOutcome) -> Self {
        Self::new(vec![outcome])
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute(&self, _job: &Job, _cancel: &CancellationToken) -> ExecutionOutcome {
        let mut script = self.script.lock().await;
        if script.len() > 1 {
            script.remove(0)
        } else {
            script[0].clone()
        }
    }
}
