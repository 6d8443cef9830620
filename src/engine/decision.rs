use std::time::Duration;

use chrono::Utc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use super::context::RuntimeContext;
use super::trace::{DispatchedAction, Outcome, StepOutcome, TraceEntry};
use crate::detector::{Detector, Screenshot};
use crate::error::{DetectionError, ExecutorError, Fault, RunError};
use crate::sut::Executor;
use crate::workflow::matcher::find_match;
use crate::workflow::{
    recognize, ActionSpec, ClickTarget, DetectedElement, Recognition, TransitionSpec,
    WorkflowGraph, DEFAULT_STATE_TIMEOUT,
};

/// Limits and timeouts for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    pub max_iterations: u32,
    /// Fallback attempts per scope, unless the fallback sets its own limit.
    pub max_retries: u32,
    pub detect_timeout: Duration,
    pub action_timeout: Duration,
    /// Pause between iterations that made no progress.
    pub poll_interval: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            max_retries: 3,
            detect_timeout: Duration::from_secs(60),
            action_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(1),
        }
    }
}

pub type StepObserver<'a> = dyn Fn(&TraceEntry) + Send + Sync + 'a;

/// Drives the SUT from the workflow's initial screen to its target screen.
pub struct DecisionEngine<'a, D: Detector, E: Executor> {
    graph: &'a WorkflowGraph,
    detector: &'a D,
    executor: &'a E,
    options: EngineOptions,
    observer: Option<&'a StepObserver<'a>>,
}

/// Per-iteration scratch: what was sent and what went wrong.
#[derive(Default)]
struct StepLog {
    actions: Vec<DispatchedAction>,
    faults: Vec<Fault>,
}

impl<'a, D: Detector, E: Executor> DecisionEngine<'a, D, E> {
    pub fn new(graph: &'a WorkflowGraph, detector: &'a D, executor: &'a E) -> Self {
        Self {
            graph,
            detector,
            executor,
            options: EngineOptions::default(),
            observer: None,
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Called with every trace entry as soon as it is appended.
    pub fn with_observer(mut self, observer: &'a StepObserver<'a>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Runs until the target is recognised, a fatal error occurs, the
    /// iteration budget runs out or `cancel` fires. Cancellation is checked
    /// between iterations.
    pub async fn run(&self, cancel: &CancellationToken) -> Outcome {
        let mut ctx = RuntimeContext::new(self.graph.initial_state());
        tracing::info!(
            run_id = %ctx.trace.run_id,
            initial = self.graph.initial_state(),
            target = self.graph.target_state(),
            max_iterations = self.options.max_iterations,
            "run started"
        );

        loop {
            if cancel.is_cancelled() {
                tracing::warn!(iterations = ctx.iteration, "run cancelled");
                return Outcome::Cancelled {
                    trace: ctx.into_trace(),
                };
            }
            if ctx.iteration >= self.options.max_iterations {
                let error = RunError::IterationBudgetExceeded {
                    max_iterations: self.options.max_iterations,
                };
                tracing::error!(%error, "run failed");
                return Outcome::Failed {
                    error,
                    trace: ctx.into_trace(),
                };
            }

            ctx.iteration += 1;
            let entry = self.step(&mut ctx, cancel).await;
            if let Some(observer) = self.observer {
                observer(&entry);
            }
            let outcome = entry.outcome.clone();
            ctx.trace.push(entry);

            match outcome {
                StepOutcome::TargetReached => {
                    tracing::info!(
                        iterations = ctx.iteration,
                        actions = ctx.trace.dispatched_actions(),
                        "target reached"
                    );
                    return Outcome::Succeeded {
                        trace: ctx.into_trace(),
                    };
                }
                StepOutcome::Failed(error) => {
                    tracing::error!(iteration = ctx.iteration, %error, "run failed");
                    return Outcome::Failed {
                        error,
                        trace: ctx.into_trace(),
                    };
                }
                _ => {}
            }
        }
    }

    async fn step(&self, ctx: &mut RuntimeContext, cancel: &CancellationToken) -> TraceEntry {
        let mut log = StepLog::default();
        let detections = self.observe(&mut log).await;
        let elements = detections.len();

        let (recognized, outcome) = match recognize(&detections, self.graph, &ctx.current_state) {
            Err(error) => (Recognition::Unknown, StepOutcome::Failed(error)),
            Ok(Recognition::Unknown) => {
                let outcome = self.on_unknown(ctx, &detections, &mut log, cancel).await;
                (Recognition::Unknown, outcome)
            }
            Ok(Recognition::State(name)) => {
                tracing::debug!(iteration = ctx.iteration, state = %name, elements, "state recognised");
                let outcome = if name == self.graph.target_state() {
                    ctx.current_state = name.clone();
                    StepOutcome::TargetReached
                } else {
                    self.advance(ctx, &name, &detections, &mut log, cancel).await
                };
                (Recognition::State(name), outcome)
            }
        };

        TraceEntry {
            iteration: ctx.iteration,
            timestamp: Utc::now(),
            recognized,
            elements,
            actions: log.actions,
            faults: log.faults,
            outcome,
        }
    }

    /// Captures and parses the screen. Failures yield an empty snapshot.
    async fn observe(&self, log: &mut StepLog) -> Vec<DetectedElement> {
        let screenshot: Screenshot = match timeout(self.options.action_timeout, self.executor.capture()).await {
            Ok(Ok(shot)) => shot,
            Ok(Err(err)) => return self.executor_fault(log, err),
            Err(_) => return self.executor_fault(log, ExecutorError::Timeout(self.options.action_timeout)),
        };

        let result = match timeout(self.options.detect_timeout, self.detector.detect(&screenshot)).await {
            Ok(result) => result,
            Err(_) => Err(DetectionError::Timeout(self.options.detect_timeout)),
        };
        match result {
            Ok(detections) => detections,
            Err(err) => {
                tracing::warn!(error = %err, "detection failed");
                log.faults.push(Fault::from(&err));
                Vec::new()
            }
        }
    }

    fn executor_fault(&self, log: &mut StepLog, err: ExecutorError) -> Vec<DetectedElement> {
        tracing::warn!(error = %err, "screen capture failed");
        log.faults.push(Fault::from(&err));
        Vec::new()
    }

    /// A known, non-target state: follow its outgoing transition.
    async fn advance(
        &self,
        ctx: &mut RuntimeContext,
        state: &str,
        detections: &[DetectedElement],
        log: &mut StepLog,
        cancel: &CancellationToken,
    ) -> StepOutcome {
        ctx.mark_progress();
        ctx.current_state = state.to_string();

        let outgoing: Vec<&TransitionSpec> = self.graph.outgoing(state).collect();
        let Some(first) = outgoing.first() else {
            return StepOutcome::Failed(RunError::TransitionNotFound {
                state: state.to_string(),
            });
        };

        let Some(transition) = select_transition(&outgoing, detections) else {
            // Every edge clicks an element that is not on screen yet.
            let transition = first.key.clone();
            tracing::debug!(%transition, "click target not visible yet");
            self.pause(self.options.poll_interval, cancel).await;
            return StepOutcome::TargetNotVisible { transition };
        };

        tracing::info!(
            iteration = ctx.iteration,
            transition = %transition.key,
            action = %transition.action,
            "dispatching transition"
        );
        match self.dispatch(&transition.action, detections, log, cancel).await {
            Ok(()) => {
                self.pause(transition.expected_delay, cancel).await;
                StepOutcome::Dispatched {
                    transition: transition.key.clone(),
                }
            }
            Err(err) => {
                tracing::warn!(transition = %transition.key, error = %err, "dispatch failed");
                log.faults.push(Fault::from(&err));
                StepOutcome::DispatchFailed {
                    transition: transition.key.clone(),
                }
            }
        }
    }

    /// Nothing recognised: keep polling until the current state's timeout, then fall back.
    async fn on_unknown(
        &self,
        ctx: &mut RuntimeContext,
        detections: &[DetectedElement],
        log: &mut StepLog,
        cancel: &CancellationToken,
    ) -> StepOutcome {
        ctx.stuck_count += 1;
        let limit = self
            .graph
            .state(&ctx.current_state)
            .map(|s| s.timeout)
            .unwrap_or(DEFAULT_STATE_TIMEOUT);

        if ctx.since_progress() < limit {
            tracing::debug!(
                iteration = ctx.iteration,
                stuck_count = ctx.stuck_count,
                current = %ctx.current_state,
                "no state recognised"
            );
            self.pause(self.options.poll_interval, cancel).await;
            return StepOutcome::Waiting {
                stuck_count: ctx.stuck_count,
            };
        }

        let (scope, fallback) = self.graph.fallback_for(&ctx.current_state);
        let max_retries = fallback.max_retries.unwrap_or(self.options.max_retries);
        let attempts = ctx.fallback_attempts(&scope);
        if attempts >= max_retries {
            return StepOutcome::Failed(RunError::StuckLoop {
                scope: scope.to_string(),
                attempts,
            });
        }

        let attempt = ctx.record_fallback(scope.clone());
        tracing::warn!(%scope, attempt, max_retries, current = %ctx.current_state, "stuck, running fallback");
        for action in &fallback.actions {
            if let Err(err) = self.dispatch(action, detections, log, cancel).await {
                tracing::warn!(%scope, error = %err, "fallback dispatch failed");
                log.faults.push(Fault::from(&err));
                break;
            }
        }
        self.pause(fallback.expected_delay, cancel).await;
        ctx.mark_progress();

        StepOutcome::Fallback { scope, attempt }
    }

    /// Sends one action. Element clicks whose target is not on screen are skipped.
    async fn dispatch(
        &self,
        action: &ActionSpec,
        detections: &[DetectedElement],
        log: &mut StepLog,
        cancel: &CancellationToken,
    ) -> Result<(), ExecutorError> {
        let limit = self.options.action_timeout;
        match action {
            ActionSpec::Click(target) => {
                let Some((x, y)) = click_point(target, detections) else {
                    tracing::debug!(%action, "click target not on screen, skipped");
                    return Ok(());
                };
                log.actions.push(DispatchedAction::Click { x, y });
                timeout(limit, self.executor.click(x, y))
                    .await
                    .map_err(|_| ExecutorError::Timeout(limit))?
            }
            ActionSpec::Key(name) => {
                log.actions.push(DispatchedAction::Key { name: name.clone() });
                timeout(limit, self.executor.key(name))
                    .await
                    .map_err(|_| ExecutorError::Timeout(limit))?
            }
            ActionSpec::Wait(duration) => {
                log.actions.push(DispatchedAction::Wait {
                    millis: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                });
                tokio::select! {
                    result = self.executor.wait(*duration) => result,
                    _ = cancel.cancelled() => Ok(()),
                }
            }
        }
    }

    async fn pause(&self, duration: Duration, cancel: &CancellationToken) {
        if duration.is_zero() {
            return;
        }
        tokio::select! {
            _ = sleep(duration) => {}
            _ = cancel.cancelled() => {}
        }
    }
}

/// Picks the edge to follow: the first whose click target is visible, else
/// the first that does not depend on an on-screen element.
fn select_transition<'g>(
    outgoing: &[&'g TransitionSpec],
    detections: &[DetectedElement],
) -> Option<&'g TransitionSpec> {
    let mut blind = None;
    for &transition in outgoing {
        match transition.target_matcher() {
            Some(matcher) => {
                if find_match(detections, matcher).is_some() {
                    return Some(transition);
                }
            }
            None => {
                blind.get_or_insert(transition);
            }
        }
    }
    blind
}

fn click_point(target: &ClickTarget, detections: &[DetectedElement]) -> Option<(i32, i32)> {
    match target {
        ClickTarget::Coordinates { x, y } => Some((*x, *y)),
        ClickTarget::Element(matcher) => {
            find_match(detections, matcher).map(|el| el.bounding_box.center())
        }
    }
}

/// Runs `graph` once with default timeouts and the given limits.
pub async fn run<D: Detector, E: Executor>(
    graph: &WorkflowGraph,
    detector: &D,
    executor: &E,
    max_iterations: u32,
    max_retries: u32,
    cancel: &CancellationToken,
) -> Outcome {
    let options = EngineOptions {
        max_iterations,
        max_retries,
        ..EngineOptions::default()
    };
    DecisionEngine::new(graph, detector, executor)
        .with_options(options)
        .run(cancel)
        .await
}
