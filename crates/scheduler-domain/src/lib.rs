//! # scheduler-domain
//!
//! Entities, the job lifecycle state machine, and the capability traits
//! (`JobStore`, `AttemptStore`, `EventStore`, `UnitOfWork`, `Broker`,
//! `Executor`) that every other crate in the workspace is built against.
//!
//! This crate performs no I/O. It exists so that `scheduler-core` can
//! depend on explicit capability sets rather than a concrete storage or
//! transport backend, per the design's redesign notes: reimplementations
//! express method-set polymorphism through these named traits instead of
//! an implicit interface.

mod broker;
mod error;
mod executor;
mod job;
mod store;

pub use broker::{Broker, BrokerMessage, MessageHandler};
pub use error::{Result, SchedulerError};
pub use executor::{ExecutionOutcome, Executor};
pub use job::{
    Attempt, AttemptFilter, AttemptStatus, CreateJobInput, Event, EventFilter, EventType, Job,
    JobConstructionError, JobFilter, JobStatus, DEFAULT_LOCK_TTL_SECONDS,
};
pub use store::{
    Atomic, AtomicOutcome, AtomicResult, AttemptStore, EventStore, JobStore, NewAttempt, NewEvent,
    Store, UnitOfWork,
};
