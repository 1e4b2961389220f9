//! Outbound callback execution contract. The executor performs the
//! network request; this crate only defines the capability and its
//! outcome classification, per §4 "in scope only via its result
//! contract."

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::job::Job;

/// Outcome of one callback invocation.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    Success { http_status: i32 },
    /// `http_status = 0` is the sentinel for "no response, transport
    /// error" (Design Note 2); any value is equally valid NULL-style
    /// semantics but this implementation keeps the non-null sentinel.
    Failure { http_status: i32, message: String },
}

impl ExecutionOutcome {
    pub fn http_status(&self) -> i32 {
        match self {
            ExecutionOutcome::Success { http_status } => *http_status,
            ExecutionOutcome::Failure { http_status, .. } => *http_status,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success { .. })
    }
}

#[async_trait]
pub trait Executor: Send + Sync {
    /// POST `job.payload` to `job.callback_url`. Status < 400 is
    /// success; status >= 400 or a transport error is failure. Does not
    /// classify by status code beyond the 400 boundary: the retry
    /// budget alone bounds attempts.
    ///
    /// `cancel` is the ambient cancellation context: a cancelled
    /// request surfaces as `Failure { http_status: 0, .. }`, the same
    /// sentinel used for any other transport failure. The executor sets
    /// no timeout of its own; callers that want one cancel `cancel`
    /// after a deadline.
    async fn execute(&self, job: &Job, cancel: &CancellationToken) -> ExecutionOutcome;
}
