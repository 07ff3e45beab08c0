// SPDX-License-Identifier: MIT

//! Job queue collaborator
//!
//! Two logical queues drive the engine: "run node" and "reconcile
//! execution". Enqueue supports an optional delay and an optional dedupe key
//! (a duplicate enqueue is a no-op, not an error).

use crate::engine::records::NodeBehavior;
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Queue carrying "run this node" jobs
pub const QUEUE_RUN_NODE: &str = "run-node";
/// Queue carrying reconciliation passes
pub const QUEUE_RECONCILE: &str = "reconcile-execution";

/// Payload of a "run this node" job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunNodeJob {
    pub execution_id: String,
    pub node_id: String,
    pub node_behavior: NodeBehavior,
}

impl RunNodeJob {
    /// Dedupe key shared by every enqueue site for the same node
    pub fn dedupe_key(&self) -> String {
        format!("{}:{}", self.execution_id, self.node_id)
    }
}

/// Payload of a reconciliation job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileJob {
    pub execution_id: String,
}

impl ReconcileJob {
    pub fn dedupe_key(&self) -> String {
        format!("reconcile:{}", self.execution_id)
    }
}

/// Enqueue options
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    pub dedupe_key: Option<String>,
    pub delay: Option<Duration>,
}

/// Queue transport contract
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, queue: &str, payload: Value, options: EnqueueOptions) -> Result<()>;

    /// Pop the next ready job, honoring enqueue delays
    async fn dequeue(&self, queue: &str) -> Result<Option<Value>>;

    /// Pending payloads, for duplicate suppression where dedupe keys are
    /// unavailable
    async fn list_in_flight(&self, queue: &str) -> Result<Vec<Value>>;
}

/// Serialize a typed payload for enqueueing
pub fn to_payload<T: Serialize>(job: &T) -> Result<Value> {
    serde_json::to_value(job).map_err(EngineError::from)
}

/// Deserialize a dequeued payload
pub fn from_payload<T: for<'de> Deserialize<'de>>(payload: Value) -> Result<T> {
    serde_json::from_value(payload).map_err(EngineError::from)
}

struct QueuedJob {
    payload: Value,
    dedupe_key: Option<String>,
    ready_at: Instant,
}

/// In-memory delayed queue used by tests and the bundled binary
#[derive(Clone, Default)]
pub struct InMemoryJobQueue {
    queues: Arc<Mutex<HashMap<String, Vec<QueuedJob>>>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending jobs across all queues
    pub async fn pending(&self) -> usize {
        let queues = self.queues.lock().await;
        queues.values().map(|jobs| jobs.len()).sum()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, queue: &str, payload: Value, options: EnqueueOptions) -> Result<()> {
        let mut queues = self.queues.lock().await;
        let jobs = queues.entry(queue.to_string()).or_default();

        if let Some(key) = &options.dedupe_key {
            if jobs
                .iter()
                .any(|job| job.dedupe_key.as_deref() == Some(key.as_str()))
            {
                return Ok(());
            }
        }

        let ready_at = Instant::now() + options.delay.unwrap_or(Duration::ZERO);
        jobs.push(QueuedJob {
            payload,
            dedupe_key: options.dedupe_key,
            ready_at,
        });
        Ok(())
    }

    async fn dequeue(&self, queue: &str) -> Result<Option<Value>> {
        let mut queues = self.queues.lock().await;
        let Some(jobs) = queues.get_mut(queue) else {
            return Ok(None);
        };
        let now = Instant::now();
        match jobs.iter().position(|job| job.ready_at <= now) {
            Some(index) => Ok(Some(jobs.remove(index).payload)),
            None => Ok(None),
        }
    }

    async fn list_in_flight(&self, queue: &str) -> Result<Vec<Value>> {
        let queues = self.queues.lock().await;
        Ok(queues
            .get(queue)
            .map(|jobs| jobs.iter().map(|job| job.payload.clone()).collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_enqueue_dequeue_roundtrip() {
        let queue = InMemoryJobQueue::new();
        queue
            .enqueue(QUEUE_RUN_NODE, json!({"id": 1}), EnqueueOptions::default())
            .await
            .unwrap();

        let payload = queue.dequeue(QUEUE_RUN_NODE).await.unwrap();
        assert_eq!(payload, Some(json!({"id": 1})));
        assert_eq!(queue.dequeue(QUEUE_RUN_NODE).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_dedupe_key_is_noop() {
        let queue = InMemoryJobQueue::new();
        let options = EnqueueOptions {
            dedupe_key: Some("we-1:n1".to_string()),
            delay: None,
        };
        queue
            .enqueue(QUEUE_RUN_NODE, json!({"try": 1}), options.clone())
            .await
            .unwrap();
        queue
            .enqueue(QUEUE_RUN_NODE, json!({"try": 2}), options)
            .await
            .unwrap();

        assert_eq!(queue.pending().await, 1);
        let payload = queue.dequeue(QUEUE_RUN_NODE).await.unwrap();
        assert_eq!(payload, Some(json!({"try": 1})));
    }

    #[tokio::test]
    async fn test_delayed_job_is_not_ready_immediately() {
        let queue = InMemoryJobQueue::new();
        queue
            .enqueue(
                QUEUE_RECONCILE,
                json!({"executionId": "we-1"}),
                EnqueueOptions {
                    dedupe_key: None,
                    delay: Some(Duration::from_millis(50)),
                },
            )
            .await
            .unwrap();

        assert_eq!(queue.dequeue(QUEUE_RECONCILE).await.unwrap(), None);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(queue.dequeue(QUEUE_RECONCILE).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_list_in_flight_reports_pending_payloads() {
        let queue = InMemoryJobQueue::new();
        queue
            .enqueue(QUEUE_RUN_NODE, json!({"id": 1}), EnqueueOptions::default())
            .await
            .unwrap();
        queue
            .enqueue(QUEUE_RUN_NODE, json!({"id": 2}), EnqueueOptions::default())
            .await
            .unwrap();

        let in_flight = queue.list_in_flight(QUEUE_RUN_NODE).await.unwrap();
        assert_eq!(in_flight.len(), 2);
    }

    #[test]
    fn test_job_payload_roundtrip() {
        let job = RunNodeJob {
            execution_id: "we-1".to_string(),
            node_id: "n1".to_string(),
            node_behavior: NodeBehavior::Update,
        };
        let payload = to_payload(&job).unwrap();
        let back: RunNodeJob = from_payload(payload).unwrap();
        assert_eq!(back, job);
        assert_eq!(job.dedupe_key(), "we-1:n1");
    }
}
