//! In-memory trace of one saga execution.

use std::time::Instant;

use crate::error::Result;
use crate::state::{CompensationPolicy, SagaState, SagaStep};

/// Records which steps of a saga have completed so a failure knows what to
/// undo. Lives for one invocation and is never persisted.
#[derive(Debug)]
pub struct SagaTrace<S> {
    saga: &'static str,
    policy: CompensationPolicy,
    state: SagaState,
    current: Option<S>,
    completed: Vec<S>,
    started: Instant,
}

impl<S: SagaStep> SagaTrace<S> {
    /// Starts a trace in the `Running` state.
    pub fn start(saga: &'static str, policy: CompensationPolicy) -> Self {
        metrics::counter!("saga_executions_total", "saga" => saga).increment(1);
        Self {
            saga,
            policy,
            state: SagaState::Running,
            current: None,
            completed: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn enter(&mut self, step: S) {
        tracing::debug!(saga = self.saga, step = %step, "saga step started");
        self.current = Some(step);
    }

    pub fn complete(&mut self, step: S) {
        self.completed.push(step);
        self.current = None;
    }

    /// The step in progress, if any.
    pub fn current(&self) -> Option<S> {
        self.current
    }

    /// Name of the step in progress, for error context.
    pub fn current_name(&self) -> &'static str {
        self.current.map(|step| step.name()).unwrap_or("none")
    }

    pub fn completed_steps(&self) -> &[S] {
        &self.completed
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    /// Steps whose effects must be undone, most recent first.
    ///
    /// Always empty under [`CompensationPolicy::AcceptAndReconcile`].
    pub fn pending_compensation(&self) -> Vec<S> {
        match self.policy {
            CompensationPolicy::AcceptAndReconcile => Vec::new(),
            CompensationPolicy::Compensate => self
                .completed
                .iter()
                .rev()
                .copied()
                .filter(|step| step.compensatable())
                .collect(),
        }
    }

    pub fn begin_compensation(&mut self) {
        if self.state.can_compensate() {
            tracing::info!(
                saga = self.saga,
                failed_step = self.current_name(),
                "saga compensation started"
            );
            self.state = SagaState::Compensating;
        }
    }

    pub fn record_compensation(&self, step: S, succeeded: bool) {
        let outcome = if succeeded { "succeeded" } else { "failed" };
        metrics::counter!(
            "saga_compensations_total",
            "saga" => self.saga,
            "outcome" => outcome
        )
        .increment(1);
        tracing::debug!(saga = self.saga, step = %step, outcome, "compensation step finished");
    }

    /// Moves the trace to its terminal state and records the outcome.
    pub fn finish<T>(&mut self, result: &Result<T>) {
        let duration = self.started.elapsed().as_secs_f64();
        metrics::histogram!("saga_duration_seconds", "saga" => self.saga).record(duration);

        match result {
            Ok(_) => {
                self.state = SagaState::Completed;
                metrics::counter!("saga_completed", "saga" => self.saga).increment(1);
                tracing::info!(saga = self.saga, duration, "saga completed successfully");
            }
            Err(e) => {
                self.state = SagaState::Failed;
                metrics::counter!("saga_failed", "saga" => self.saga).increment(1);
                tracing::warn!(
                    saga = self.saga,
                    failed_step = self.current_name(),
                    error = %e,
                    duration,
                    "saga failed"
                );
            }
        }
    }
}
