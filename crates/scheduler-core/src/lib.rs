//! Job lifecycle coordinator. This is the hard engineering named by
//! the design: the state machine walk, the idempotence gate, and
//! transactional outcome recording, expressed over the capability
//! traits in `scheduler-domain` so it needs no concrete store, broker
//! or executor to compile or test against.

mod coordinator;
mod timeline;

pub use coordinator::{Coordinator, CreateJobError};
pub use timeline::{merge, TimelineEntry};
