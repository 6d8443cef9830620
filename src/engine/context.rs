use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;

use super::trace::RunTrace;
use crate::workflow::FallbackScope;

/// Mutable state of a single run. Owned by the engine for the duration of `run`.
#[derive(Debug)]
pub struct RuntimeContext {
    /// Last recognised state. A continuity hint, never proof of what is on screen.
    pub current_state: String,
    pub iteration: u32,
    /// Consecutive unknown snapshots since the last progress.
    pub stuck_count: u32,
    pub fallback_retries: BTreeMap<FallbackScope, u32>,
    last_progress: Instant,
    pub trace: RunTrace,
}

impl RuntimeContext {
    pub fn new(initial_state: impl Into<String>) -> Self {
        Self {
            current_state: initial_state.into(),
            iteration: 0,
            stuck_count: 0,
            fallback_retries: BTreeMap::new(),
            last_progress: Instant::now(),
            trace: RunTrace::new(),
        }
    }

    /// Restarts the stuck timer.
    pub fn mark_progress(&mut self) {
        self.stuck_count = 0;
        self.last_progress = Instant::now();
    }

    pub fn since_progress(&self) -> Duration {
        self.last_progress.elapsed()
    }

    pub fn fallback_attempts(&self, scope: &FallbackScope) -> u32 {
        self.fallback_retries.get(scope).copied().unwrap_or(0)
    }

    pub fn record_fallback(&mut self, scope: FallbackScope) -> u32 {
        let count = self.fallback_retries.entry(scope).or_insert(0);
        *count += 1;
        *count
    }

    pub fn into_trace(self) -> RunTrace {
        self.trace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_counts_are_per_scope() {
        let mut ctx = RuntimeContext::new("menu");
        assert_eq!(ctx.record_fallback(FallbackScope::General), 1);
        assert_eq!(ctx.record_fallback(FallbackScope::General), 2);
        assert_eq!(ctx.record_fallback(FallbackScope::State("menu".into())), 1);
        assert_eq!(ctx.fallback_attempts(&FallbackScope::General), 2);
        assert_eq!(ctx.fallback_attempts(&FallbackScope::State("lobby".into())), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_restarts_timer() {
        let mut ctx = RuntimeContext::new("menu");
        tokio::time::advance(Duration::from_secs(5)).await;
        ctx.stuck_count = 4;
        assert!(ctx.since_progress() >= Duration::from_secs(5));

        ctx.mark_progress();
        assert_eq!(ctx.stuck_count, 0);
        assert!(ctx.since_progress() < Duration::from_secs(1));
    }
}
