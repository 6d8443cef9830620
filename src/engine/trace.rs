use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Fault, RunError};
use crate::workflow::{FallbackScope, Recognition, TransitionKey};

/// A concrete input sent to the SUT (or a local pause).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchedAction {
    Click { x: i32, y: i32 },
    Key { name: String },
    Wait { millis: u64 },
}

/// What an iteration ended up doing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StepOutcome {
    TargetReached,
    Dispatched { transition: TransitionKey },
    /// The transition was chosen but its actions could not be delivered.
    DispatchFailed { transition: TransitionKey },
    /// The transition clicks an element that is not on screen yet.
    TargetNotVisible { transition: TransitionKey },
    Waiting { stuck_count: u32 },
    Fallback { scope: FallbackScope, attempt: u32 },
    Failed(RunError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEntry {
    pub iteration: u32,
    pub timestamp: DateTime<Utc>,
    pub recognized: Recognition,
    /// Number of elements the detector reported.
    pub elements: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<DispatchedAction>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub faults: Vec<Fault>,
    pub outcome: StepOutcome,
}

/// Append-only record of a run, returned with every outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunTrace {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    entries: Vec<TraceEntry>,
}

impl RunTrace {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            entries: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, entry: TraceEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&TraceEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recognised state names in iteration order. Unknown snapshots are skipped.
    pub fn states(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter_map(|e| e.recognized.state())
            .collect()
    }

    /// Total number of actions sent over the whole run.
    pub fn dispatched_actions(&self) -> usize {
        self.entries.iter().map(|e| e.actions.len()).sum()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl Default for RunTrace {
    fn default() -> Self {
        Self::new()
    }
}

/// Terminal result of a run. The trace is always handed back.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded { trace: RunTrace },
    Failed { error: RunError, trace: RunTrace },
    Cancelled { trace: RunTrace },
}

impl Outcome {
    pub fn trace(&self) -> &RunTrace {
        match self {
            Outcome::Succeeded { trace } | Outcome::Failed { trace, .. } | Outcome::Cancelled { trace } => {
                trace
            }
        }
    }

    pub fn into_trace(self) -> RunTrace {
        match self {
            Outcome::Succeeded { trace } | Outcome::Failed { trace, .. } | Outcome::Cancelled { trace } => {
                trace
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded { .. })
    }

    pub fn error(&self) -> Option<&RunError> {
        match self {
            Outcome::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}
