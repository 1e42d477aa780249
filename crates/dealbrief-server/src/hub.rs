//! Per-submission progress fan-out.
//!
//! Each registered submission keeps its full step history and a set of
//! subscriber channels. Every publish sends the whole history as one JSON
//! array, and a new subscriber immediately receives the history published
//! so far. The WebSocket task on the other end of each channel owns the
//! socket; the hub never blocks on a slow client.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dealbrief_core::ProgressEvent;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

/// Close code sent when a run completes normally.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code sent when the sweeper evicts a submission.
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Close code for a subscription to an unregistered submission.
pub const CLOSE_UNKNOWN_SUBMISSION: u16 = 4000;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("execution already exists for submission {0}")]
    DuplicateSubmission(String),

    #[error("no active execution found for submission {0}")]
    UnknownSubmission(String),

    #[error("step {idx} published after step {last} for submission {id}")]
    OutOfOrder { id: String, idx: usize, last: usize },

    #[error("failed to encode step history: {0}")]
    Encode(#[from] serde_json::Error),
}

/// What a subscriber task forwards to its socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubMessage {
    /// Serialized JSON array of every step published so far.
    Snapshot(String),
    Close { code: u16, reason: &'static str },
}

/// Receiving half handed to a WebSocket task.
#[derive(Debug)]
pub struct Subscription {
    pub subscriber_id: u64,
    pub receiver: mpsc::UnboundedReceiver<HubMessage>,
}

struct Execution {
    active: bool,
    subscribers: HashMap<u64, mpsc::UnboundedSender<HubMessage>>,
    steps: Vec<ProgressEvent>,
    started_at: Instant,
    started: DateTime<Utc>,
}

impl Execution {
    fn snapshot(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.steps)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionHealth {
    pub active: bool,
    pub subscriber_count: usize,
    pub step_count: usize,
    pub runtime_seconds: f64,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubHealth {
    pub active_submissions: usize,
    pub per_submission_detail: BTreeMap<String, SubmissionHealth>,
}

/// Registry of in-flight submissions. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ProgressHub {
    executions: Arc<Mutex<HashMap<String, Execution>>>,
    next_subscriber: Arc<AtomicU64>,
    ttl: Duration,
}

impl ProgressHub {
    /// `ttl` bounds how long a submission may stay registered before
    /// [`ProgressHub::sweep_expired`] evicts it.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            executions: Arc::new(Mutex::new(HashMap::new())),
            next_subscriber: Arc::new(AtomicU64::new(1)),
            ttl,
        }
    }

    /// Register a submission with an empty history.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::DuplicateSubmission`] if `id` is already
    /// registered.
    pub async fn start_submission(&self, id: &str) -> Result<(), HubError> {
        let mut executions = self.executions.lock().await;
        if executions.contains_key(id) {
            tracing::warn!(submission_id = %id, "submission already registered");
            return Err(HubError::DuplicateSubmission(id.to_string()));
        }
        executions.insert(
            id.to_string(),
            Execution {
                active: true,
                subscribers: HashMap::new(),
                steps: Vec::new(),
                started_at: Instant::now(),
                started: Utc::now(),
            },
        );
        tracing::info!(submission_id = %id, active = executions.len(), "submission registered");
        Ok(())
    }

    /// Add a subscriber and queue the current history for it.
    ///
    /// The history is queued under the same lock that guards publishing, so
    /// the first message a subscriber sees is a prefix of every later one.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::UnknownSubmission`] if `id` is not registered.
    pub async fn subscribe(&self, id: &str) -> Result<Subscription, HubError> {
        let mut executions = self.executions.lock().await;
        let execution = executions
            .get_mut(id)
            .ok_or_else(|| HubError::UnknownSubmission(id.to_string()))?;

        let (sender, receiver) = mpsc::unbounded_channel();
        sender
            .send(HubMessage::Snapshot(execution.snapshot()?))
            .map_err(|_| HubError::UnknownSubmission(id.to_string()))?;

        let subscriber_id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        execution.subscribers.insert(subscriber_id, sender);
        tracing::info!(
            submission_id = %id,
            subscriber_id,
            subscribers = execution.subscribers.len(),
            replayed_steps = execution.steps.len(),
            "subscriber added"
        );
        Ok(Subscription {
            subscriber_id,
            receiver,
        })
    }

    /// Remove one subscriber. Unknown ids are ignored.
    pub async fn unsubscribe(&self, id: &str, subscriber_id: u64) {
        let mut executions = self.executions.lock().await;
        if let Some(execution) = executions.get_mut(id) {
            if execution.subscribers.remove(&subscriber_id).is_some() {
                tracing::info!(
                    submission_id = %id,
                    subscriber_id,
                    remaining = execution.subscribers.len(),
                    "subscriber removed"
                );
            }
        }
    }

    /// Append `step` and push the full history to every subscriber.
    ///
    /// Subscribers whose channel is closed are dropped; the rest still
    /// receive the update.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::UnknownSubmission`] if `id` is not registered and
    /// [`HubError::OutOfOrder`] if `step.idx` is lower than the last
    /// published index.
    pub async fn publish_step(&self, id: &str, step: ProgressEvent) -> Result<(), HubError> {
        let mut executions = self.executions.lock().await;
        let execution = executions
            .get_mut(id)
            .ok_or_else(|| HubError::UnknownSubmission(id.to_string()))?;

        if let Some(last) = execution.steps.last() {
            if step.idx < last.idx {
                return Err(HubError::OutOfOrder {
                    id: id.to_string(),
                    idx: step.idx,
                    last: last.idx,
                });
            }
        }

        tracing::info!(
            submission_id = %id,
            idx = step.idx,
            total_steps = step.total_steps,
            message = %step.message,
            "publishing step"
        );
        execution.steps.push(step);
        let snapshot = execution.snapshot()?;

        let mut dropped = Vec::new();
        for (subscriber_id, sender) in &execution.subscribers {
            if sender.send(HubMessage::Snapshot(snapshot.clone())).is_err() {
                dropped.push(*subscriber_id);
            }
        }
        for subscriber_id in &dropped {
            execution.subscribers.remove(subscriber_id);
        }
        if !dropped.is_empty() {
            tracing::warn!(
                submission_id = %id,
                dropped = dropped.len(),
                remaining = execution.subscribers.len(),
                "removed disconnected subscribers during broadcast"
            );
        }
        Ok(())
    }

    /// Close every subscriber with a normal closure and forget `id`.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::UnknownSubmission`] if `id` is not registered.
    pub async fn finish(&self, id: &str) -> Result<(), HubError> {
        let execution = self
            .executions
            .lock()
            .await
            .remove(id)
            .ok_or_else(|| HubError::UnknownSubmission(id.to_string()))?;

        close_all(&execution, CLOSE_NORMAL, "Execution completed");
        tracing::info!(
            submission_id = %id,
            steps = execution.steps.len(),
            subscribers = execution.subscribers.len(),
            runtime_secs = execution.started_at.elapsed().as_secs_f64(),
            "submission finished"
        );
        Ok(())
    }

    pub async fn health(&self) -> HubHealth {
        let executions = self.executions.lock().await;
        let per_submission_detail = executions
            .iter()
            .map(|(id, execution)| {
                (
                    id.clone(),
                    SubmissionHealth {
                        active: execution.active,
                        subscriber_count: execution.subscribers.len(),
                        step_count: execution.steps.len(),
                        runtime_seconds: execution.started_at.elapsed().as_secs_f64(),
                        started_at: execution.started,
                    },
                )
            })
            .collect();
        HubHealth {
            active_submissions: executions.len(),
            per_submission_detail,
        }
    }

    /// Evict submissions registered longer than the TTL.
    pub async fn sweep_expired(&self) -> Vec<String> {
        self.sweep_expired_at(Instant::now()).await
    }

    /// Evict submissions registered longer than the TTL as of `now`.
    /// Returns the evicted ids, sorted.
    pub async fn sweep_expired_at(&self, now: Instant) -> Vec<String> {
        let mut executions = self.executions.lock().await;
        let expired: Vec<String> = executions
            .iter()
            .filter(|(_, e)| now.saturating_duration_since(e.started_at) >= self.ttl)
            .map(|(id, _)| id.clone())
            .collect();

        let mut evicted = Vec::with_capacity(expired.len());
        for id in expired {
            if let Some(execution) = executions.remove(&id) {
                close_all(&execution, CLOSE_GOING_AWAY, "Submission expired");
                tracing::warn!(
                    submission_id = %id,
                    steps = execution.steps.len(),
                    subscribers = execution.subscribers.len(),
                    "evicted expired submission"
                );
                evicted.push(id);
            }
        }
        evicted.sort();
        evicted
    }
}

fn close_all(execution: &Execution, code: u16, reason: &'static str) {
    for sender in execution.subscribers.values() {
        // A closed receiver means the socket task has already gone.
        let _ = sender.send(HubMessage::Close { code, reason });
    }
}

/// Run [`ProgressHub::sweep_expired`] every `every` until the process exits.
pub fn spawn_sweeper(hub: ProgressHub, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = hub.sweep_expired().await;
            if !evicted.is_empty() {
                tracing::info!(count = evicted.len(), "submission sweep evicted entries");
            }
        }
    })
}

#[cfg(test)]
#[path = "hub_test.rs"]
mod tests;
