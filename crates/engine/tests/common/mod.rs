//! Shared helpers for engine integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use conductor_core::backoff::BackoffPolicy;
use conductor_core::execution::ExecutionSummary;
use conductor_core::id::SequentialIdGenerator;
use conductor_db::MemoryExecutionStore;
use conductor_engine::{EngineConfig, ExecutionEngine};
use conductor_events::EventBus;
use conductor_remote::{RemoteDispatcher, RemoteError, RemoteStatus};
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// Scripted remote engine
// ---------------------------------------------------------------------------

/// Outcome of one `submit` call.
#[derive(Debug, Clone)]
pub enum SubmitStep {
    /// Accept and return `remote-{n}` where `n` counts submit calls.
    Accept,
    /// Fail with an API error carrying this body.
    Reject(String),
}

/// Outcome of one `fetch_status` call.
#[derive(Debug, Clone)]
pub enum PollStep {
    Reply(RemoteStatus),
    /// Transport failure, not a job failure.
    Unreachable,
}

struct Script {
    submits: VecDeque<SubmitStep>,
    submit_fallback: SubmitStep,
    polls: VecDeque<PollStep>,
    poll_fallback: PollStep,
    submit_delay: Duration,
    submit_calls: usize,
    submit_times: Vec<Instant>,
    poll_calls: usize,
    toggles: Vec<(String, bool)>,
}

/// A [`RemoteDispatcher`] that replays queued responses and then falls
/// back to a fixed one.
pub struct ScriptedDispatcher {
    script: Mutex<Script>,
}

impl ScriptedDispatcher {
    /// Accepts every submit; every poll reports `running`.
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script {
                submits: VecDeque::new(),
                submit_fallback: SubmitStep::Accept,
                polls: VecDeque::new(),
                poll_fallback: PollStep::Reply(RemoteStatus::running()),
                submit_delay: Duration::ZERO,
                submit_calls: 0,
                submit_times: Vec::new(),
                poll_calls: 0,
                toggles: Vec::new(),
            }),
        }
    }

    /// Accepts every submit; the first poll reports success with `output`.
    pub fn succeeding(output: serde_json::Value) -> Self {
        Self::new().poll_fallback(PollStep::Reply(RemoteStatus::success(output)))
    }

    pub fn submits(self, steps: Vec<SubmitStep>) -> Self {
        self.lock().submits = steps.into();
        self
    }

    pub fn submit_fallback(self, step: SubmitStep) -> Self {
        self.lock().submit_fallback = step;
        self
    }

    pub fn polls(self, steps: Vec<PollStep>) -> Self {
        self.lock().polls = steps.into();
        self
    }

    pub fn poll_fallback(self, step: PollStep) -> Self {
        self.lock().poll_fallback = step;
        self
    }

    /// Make every submit take `delay` before answering.
    pub fn submit_delay(self, delay: Duration) -> Self {
        self.lock().submit_delay = delay;
        self
    }

    pub fn submit_calls(&self) -> usize {
        self.lock().submit_calls
    }

    /// When each submit call arrived, in order.
    pub fn submit_times(&self) -> Vec<Instant> {
        self.lock().submit_times.clone()
    }

    pub fn poll_calls(&self) -> usize {
        self.lock().poll_calls
    }

    /// `(job_id, enabled)` for every enable/disable call, in order.
    pub fn toggles(&self) -> Vec<(String, bool)> {
        self.lock().toggles.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }
}

#[async_trait]
impl RemoteDispatcher for ScriptedDispatcher {
    async fn submit(&self, _job_id: &str, _input: &serde_json::Value) -> Result<String, RemoteError> {
        let (step, n, delay) = {
            let mut script = self.lock();
            script.submit_calls += 1;
            script.submit_times.push(Instant::now());
            let step = script
                .submits
                .pop_front()
                .unwrap_or_else(|| script.submit_fallback.clone());
            (step, script.submit_calls, script.submit_delay)
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match step {
            SubmitStep::Accept => Ok(format!("remote-{n}")),
            SubmitStep::Reject(body) => Err(RemoteError::Api { status: 503, body }),
        }
    }

    async fn fetch_status(&self, _remote_execution_id: &str) -> Result<RemoteStatus, RemoteError> {
        let step = {
            let mut script = self.lock();
            script.poll_calls += 1;
            script
                .polls
                .pop_front()
                .unwrap_or_else(|| script.poll_fallback.clone())
        };

        match step {
            PollStep::Reply(status) => Ok(status),
            PollStep::Unreachable => Err(RemoteError::Api {
                status: 502,
                body: "upstream unreachable".to_string(),
            }),
        }
    }

    async fn enable(&self, job_id: &str) -> Result<(), RemoteError> {
        self.lock().toggles.push((job_id.to_string(), true));
        Ok(())
    }

    async fn disable(&self, job_id: &str) -> Result<(), RemoteError> {
        self.lock().toggles.push((job_id.to_string(), false));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Engine fixtures
// ---------------------------------------------------------------------------

/// Millisecond-scale intervals so paused-clock tests finish quickly.
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        poll_interval: Duration::from_millis(10),
        backoff: BackoffPolicy::linear(Duration::from_millis(10)),
        shutdown_grace: Duration::from_secs(1),
        ..EngineConfig::default()
    }
}

pub struct Harness {
    pub engine: ExecutionEngine,
    pub remote: Arc<ScriptedDispatcher>,
    pub store: MemoryExecutionStore,
    pub events: Arc<EventBus>,
}

pub fn harness(remote: ScriptedDispatcher) -> Harness {
    harness_with(remote, MemoryExecutionStore::new(), fast_config())
}

pub fn harness_with(
    remote: ScriptedDispatcher,
    store: MemoryExecutionStore,
    config: EngineConfig,
) -> Harness {
    let remote = Arc::new(remote);
    let events = Arc::new(EventBus::default());
    let engine = ExecutionEngine::builder(Arc::new(store.clone()), remote.clone())
        .config(config)
        .id_generator(Arc::new(SequentialIdGenerator::new("exec")))
        .event_bus(Arc::clone(&events))
        .build();
    Harness {
        engine,
        remote,
        store,
        events,
    }
}

/// Poll `get_status` until `done` holds. Time is paused in these tests, so
/// the sleeps only advance the virtual clock.
pub async fn wait_for(
    engine: &ExecutionEngine,
    execution_id: &str,
    done: impl Fn(&ExecutionSummary) -> bool,
) -> ExecutionSummary {
    for _ in 0..100_000 {
        let summary = engine.get_status(execution_id).await.unwrap();
        if done(&summary) {
            return summary;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("execution {execution_id} never reached the expected state");
}

pub async fn wait_terminal(engine: &ExecutionEngine, execution_id: &str) -> ExecutionSummary {
    wait_for(engine, execution_id, |s| s.status.is_terminal()).await
}
