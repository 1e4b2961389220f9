//! Transactional outbox for the retry-after-commit mechanism (Design
//! Note 3): `ProcessJobMessage` stages a retry `BrokerMessage` while
//! still inside the database transaction, but the coordinator must only
//! publish it to the broker once that transaction has actually
//! committed. A `dashmap`-backed staging buffer keyed by job id gives
//! the coordinator a place to park the message and retrieve it after
//! `Atomic` returns `Ok`.
//!
//! This is in-memory and per-process: it survives exactly as long as a
//! single `ProcessJobMessage` call needs it to. It is not a durable
//! outbox table — the durable truth remains the job row's status, per
//! §5's broker-acknowledgement rationale.

use dashmap::DashMap;
use scheduler_domain::BrokerMessage;
use uuid::Uuid;

#[derive(Default)]
pub struct Outbox {
    staged: DashMap<Uuid, BrokerMessage>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a retry message for `job_id`, overwriting any prior staged
    /// message for the same job.
    pub fn stage(&self, job_id: Uuid, msg: BrokerMessage) {
        self.staged.insert(job_id, msg);
    }

    /// Remove and return the staged message for `job_id`, if any. Meant
    /// to be called once, after the owning transaction has committed.
    pub fn take(&self, job_id: Uuid) -> Option<BrokerMessage> {
        self.staged.remove(&job_id).map(|(_, msg)| msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg(job_id: Uuid, attempt: i32) -> BrokerMessage {
        BrokerMessage {
            job_id,
            job_type: "ping".into(),
            callback_url: "http://cb".into(),
            payload: json!({}),
            attempt,
        }
    }

    #[test]
    fn stage_then_take_round_trips() {
        let outbox = Outbox::new();
        let job_id = Uuid::new_v4();
        outbox.stage(job_id, msg(job_id, 2));
        let taken = outbox.take(job_id).expect("staged message");
        assert_eq!(taken.attempt, 2);
        assert!(outbox.take(job_id).is_none());
    }

    #[test]
    fn staging_twice_overwrites() {
        let outbox = Outbox::new();
        let job_id = Uuid::new_v4();
        outbox.stage(job_id, msg(job_id, 1));
        outbox.stage(job_id, msg(job_id, 2));
        assert_eq!(outbox.take(job_id).unwrap().attempt, 2);
    }
}
