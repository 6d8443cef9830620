use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::element::{ElementMatcher, ElementType};
use crate::error::ConfigError;

pub const DEFAULT_STATE_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_EXPECTED_DELAY: Duration = Duration::from_secs(1);

/// A recognisable screen: satisfied when every required element is on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSpec {
    pub name: String,
    pub required_elements: Vec<ElementMatcher>,
    pub timeout: Duration,
}

impl StateSpec {
    pub fn new(name: impl Into<String>, required_elements: Vec<ElementMatcher>) -> Self {
        Self {
            name: name.into(),
            required_elements,
            timeout: DEFAULT_STATE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Structured `(from, to)` key for a transition edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransitionKey {
    pub from: String,
    pub to: String,
}

impl TransitionKey {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl fmt::Display for TransitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// Where a click lands.
///
/// `Coordinates` are absolute screen pixels on the SUT. They are not adjusted
/// for resolution, so a workflow using them is tied to one display size.
#[derive(Debug, Clone, PartialEq)]
pub enum ClickTarget {
    Element(ElementMatcher),
    Coordinates { x: i32, y: i32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionSpec {
    Click(ClickTarget),
    Key(String),
    Wait(Duration),
}

impl ActionSpec {
    pub fn click_element(matcher: ElementMatcher) -> Self {
        ActionSpec::Click(ClickTarget::Element(matcher))
    }

    pub fn click_at(x: i32, y: i32) -> Self {
        ActionSpec::Click(ClickTarget::Coordinates { x, y })
    }

    pub fn key(name: impl Into<String>) -> Self {
        ActionSpec::Key(name.into())
    }
}

impl fmt::Display for ActionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionSpec::Click(ClickTarget::Element(m)) => write!(f, "click {m}"),
            ActionSpec::Click(ClickTarget::Coordinates { x, y }) => write!(f, "click ({x}, {y})"),
            ActionSpec::Key(name) => write!(f, "key {name}"),
            ActionSpec::Wait(d) => write!(f, "wait {:.1}s", d.as_secs_f64()),
        }
    }
}

/// The single edge used to move from one recognised state toward the target.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionSpec {
    pub key: TransitionKey,
    pub action: ActionSpec,
    pub expected_delay: Duration,
}

impl TransitionSpec {
    pub fn new(from: impl Into<String>, to: impl Into<String>, action: ActionSpec) -> Self {
        Self {
            key: TransitionKey::new(from, to),
            action,
            expected_delay: DEFAULT_EXPECTED_DELAY,
        }
    }

    pub fn with_delay(mut self, expected_delay: Duration) -> Self {
        self.expected_delay = expected_delay;
        self
    }

    /// The element this transition clicks on, if it targets one.
    pub fn target_matcher(&self) -> Option<&ElementMatcher> {
        match &self.action {
            ActionSpec::Click(ClickTarget::Element(m)) => Some(m),
            _ => None,
        }
    }
}

/// Key under which a recovery sequence is registered.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackScope {
    General,
    State(String),
}

impl FallbackScope {
    /// Parses a configuration key: `general` or a state name.
    pub fn from_key(key: &str) -> Self {
        if key == "general" {
            FallbackScope::General
        } else {
            FallbackScope::State(key.to_string())
        }
    }
}

impl fmt::Display for FallbackScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackScope::General => f.write_str("general"),
            FallbackScope::State(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FallbackSpec {
    pub actions: Vec<ActionSpec>,
    pub expected_delay: Duration,
    /// Overrides the run-level retry limit for this scope.
    pub max_retries: Option<u32>,
}

impl FallbackSpec {
    pub fn new(actions: Vec<ActionSpec>) -> Self {
        Self {
            actions,
            expected_delay: DEFAULT_EXPECTED_DELAY,
            max_retries: None,
        }
    }

    pub fn with_delay(mut self, expected_delay: Duration) -> Self {
        self.expected_delay = expected_delay;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Informational workflow metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphMetadata {
    pub game_name: Option<String>,
    pub benchmark_duration: Option<Duration>,
    pub startup_wait: Duration,
}

/// Validated, read-only workflow definition. Safe to share between runs.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowGraph {
    initial_state: String,
    target_state: String,
    states: BTreeMap<String, StateSpec>,
    transitions: BTreeMap<TransitionKey, TransitionSpec>,
    fallbacks: BTreeMap<FallbackScope, FallbackSpec>,
    metadata: GraphMetadata,
}

impl WorkflowGraph {
    pub fn builder(initial_state: impl Into<String>, target_state: impl Into<String>) -> GraphBuilder {
        GraphBuilder {
            initial_state: initial_state.into(),
            target_state: target_state.into(),
            states: Vec::new(),
            transitions: Vec::new(),
            fallbacks: Vec::new(),
            metadata: GraphMetadata::default(),
        }
    }

    pub fn initial_state(&self) -> &str {
        &self.initial_state
    }

    pub fn target_state(&self) -> &str {
        &self.target_state
    }

    pub fn metadata(&self) -> &GraphMetadata {
        &self.metadata
    }

    pub fn state(&self, name: &str) -> Option<&StateSpec> {
        self.states.get(name)
    }

    pub fn states(&self) -> impl Iterator<Item = &StateSpec> {
        self.states.values()
    }

    pub fn transitions(&self) -> impl Iterator<Item = &TransitionSpec> {
        self.transitions.values()
    }

    pub fn transition(&self, from: &str, to: &str) -> Option<&TransitionSpec> {
        self.transitions.get(&TransitionKey::new(from, to))
    }

    /// Edges leaving `from`, ordered by destination name.
    pub fn outgoing<'a>(&'a self, from: &'a str) -> impl Iterator<Item = &'a TransitionSpec> + 'a {
        self.transitions.values().filter(move |t| t.key.from == from)
    }

    /// True when an edge `from -> to` exists.
    pub fn is_adjacent(&self, from: &str, to: &str) -> bool {
        self.transition(from, to).is_some()
    }

    /// Recovery sequence for `current`: the state's own scope if defined, else `general`.
    pub fn fallback_for(&self, current: &str) -> (FallbackScope, &FallbackSpec) {
        let scoped = FallbackScope::State(current.to_string());
        if let Some(spec) = self.fallbacks.get(&scoped) {
            return (scoped, spec);
        }
        // `general` is guaranteed by validation.
        let general = &self.fallbacks[&FallbackScope::General];
        (FallbackScope::General, general)
    }
}

/// Collects graph parts and validates them into a [`WorkflowGraph`].
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    initial_state: String,
    target_state: String,
    states: Vec<StateSpec>,
    transitions: Vec<TransitionSpec>,
    fallbacks: Vec<(FallbackScope, FallbackSpec)>,
    metadata: GraphMetadata,
}

impl GraphBuilder {
    pub fn state(mut self, state: StateSpec) -> Self {
        self.states.push(state);
        self
    }

    pub fn transition(mut self, transition: TransitionSpec) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn fallback(mut self, scope: FallbackScope, spec: FallbackSpec) -> Self {
        self.fallbacks.push((scope, spec));
        self
    }

    pub fn metadata(mut self, metadata: GraphMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn build(self) -> Result<WorkflowGraph, ConfigError> {
        if self.states.is_empty() {
            return Err(ConfigError::MissingSection("states"));
        }

        let mut states = BTreeMap::new();
        for state in self.states {
            if state.required_elements.is_empty() {
                return Err(ConfigError::NoRequiredElements(state.name));
            }
            let context = format!("state '{}'", state.name);
            for matcher in &state.required_elements {
                check_kind(&context, matcher)?;
            }
            states.insert(state.name.clone(), state);
        }

        let known = |context: &str, name: &str| -> Result<(), ConfigError> {
            if states.contains_key(name) {
                Ok(())
            } else {
                Err(ConfigError::UnknownState {
                    context: context.to_string(),
                    state: name.to_string(),
                })
            }
        };

        known("initial_state", &self.initial_state)?;
        known("target_state", &self.target_state)?;

        if self.transitions.is_empty() && self.initial_state != self.target_state {
            return Err(ConfigError::MissingSection("transitions"));
        }

        let mut transitions = BTreeMap::new();
        for transition in self.transitions {
            let context = format!("transition {}", transition.key);
            known(&context, &transition.key.from)?;
            known(&context, &transition.key.to)?;
            check_action(&context, &transition.action)?;
            if transitions.contains_key(&transition.key) {
                return Err(ConfigError::DuplicateTransition {
                    from: transition.key.from,
                    to: transition.key.to,
                });
            }
            transitions.insert(transition.key.clone(), transition);
        }

        let mut fallbacks = BTreeMap::new();
        for (scope, spec) in self.fallbacks {
            if let FallbackScope::State(name) = &scope {
                known(&format!("fallback '{name}'"), name)?;
            }
            if spec.actions.is_empty() {
                return Err(ConfigError::EmptyFallback(scope.to_string()));
            }
            let context = format!("fallback '{scope}'");
            for action in &spec.actions {
                check_action(&context, action)?;
            }
            fallbacks.insert(scope, spec);
        }
        if !fallbacks.contains_key(&FallbackScope::General) {
            return Err(ConfigError::MissingSection("fallbacks.general"));
        }

        Ok(WorkflowGraph {
            initial_state: self.initial_state,
            target_state: self.target_state,
            states,
            transitions,
            fallbacks,
            metadata: self.metadata,
        })
    }
}

/// `Unknown` only ever comes from detector output. In a workflow it means the
/// `type` field was misspelt, and such a matcher could never be satisfied.
fn check_kind(context: &str, matcher: &ElementMatcher) -> Result<(), ConfigError> {
    if matcher.kind == ElementType::Unknown {
        return Err(ConfigError::InvalidElementType {
            context: context.to_string(),
            matcher: matcher.to_string(),
        });
    }
    Ok(())
}

fn check_action(context: &str, action: &ActionSpec) -> Result<(), ConfigError> {
    match action {
        ActionSpec::Click(ClickTarget::Element(matcher)) => check_kind(context, matcher),
        _ => Ok(()),
    }
}
