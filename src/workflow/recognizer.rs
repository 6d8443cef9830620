use std::fmt;

use serde::{Deserialize, Serialize};

use super::element::DetectedElement;
use super::graph::{StateSpec, WorkflowGraph};
use super::matcher::state_satisfied;
use crate::error::RunError;

/// What the recogniser made of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recognition {
    State(String),
    Unknown,
}

impl Recognition {
    pub fn state(&self) -> Option<&str> {
        match self {
            Recognition::State(name) => Some(name),
            Recognition::Unknown => None,
        }
    }
}

impl fmt::Display for Recognition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recognition::State(name) => f.write_str(name),
            Recognition::Unknown => f.write_str("unknown"),
        }
    }
}

/// Determines which state the snapshot shows.
///
/// When several states are satisfied at once, the one with strictly more
/// required elements wins. A remaining tie goes to the single candidate that
/// is `current` itself or reachable by an edge from it. Anything still tied is
/// reported as [`RunError::AmbiguousState`] rather than guessed.
pub fn recognize(
    detections: &[DetectedElement],
    graph: &WorkflowGraph,
    current: &str,
) -> Result<Recognition, RunError> {
    let satisfied: Vec<&StateSpec> = graph
        .states()
        .filter(|s| state_satisfied(detections, s))
        .collect();

    let Some(most_specific) = satisfied.iter().map(|s| s.required_elements.len()).max() else {
        return Ok(Recognition::Unknown);
    };

    let specific: Vec<&StateSpec> = satisfied
        .into_iter()
        .filter(|s| s.required_elements.len() == most_specific)
        .collect();

    if let [only] = specific.as_slice() {
        return Ok(Recognition::State(only.name.clone()));
    }

    let adjacent: Vec<&&StateSpec> = specific
        .iter()
        .filter(|s| s.name == current || graph.is_adjacent(current, &s.name))
        .collect();

    if let [only] = adjacent.as_slice() {
        tracing::debug!(state = %only.name, current, "tie broken by continuity");
        return Ok(Recognition::State(only.name.clone()));
    }

    Err(RunError::AmbiguousState {
        candidates: specific.iter().map(|s| s.name.clone()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::element::{BoundingBox, ElementMatcher, ElementType, TextMatchMode};
    use crate::workflow::graph::{ActionSpec, FallbackScope, FallbackSpec, TransitionSpec};

    fn req(text: &str) -> ElementMatcher {
        ElementMatcher::new(ElementType::Any, text, TextMatchMode::Exact)
    }

    fn seen(texts: &[&str]) -> Vec<DetectedElement> {
        texts
            .iter()
            .map(|t| DetectedElement::new(ElementType::Label, *t, BoundingBox::default()))
            .collect()
    }

    fn graph() -> WorkflowGraph {
        // `settings` and `lobby` share one requirement; `lobby_ready` is a
        // more specific variant of `lobby`.
        WorkflowGraph::builder("menu", "done")
            .state(StateSpec::new("menu", vec![req("MENU")]))
            .state(StateSpec::new("lobby", vec![req("LOBBY")]))
            .state(StateSpec::new("lobby_ready", vec![req("LOBBY"), req("READY")]))
            .state(StateSpec::new("settings", vec![req("LOBBY")]))
            .state(StateSpec::new("popup", vec![req("OK")]))
            .state(StateSpec::new("done", vec![req("DONE")]))
            .transition(TransitionSpec::new("menu", "lobby", ActionSpec::key("enter")))
            .transition(TransitionSpec::new("lobby", "done", ActionSpec::key("enter")))
            .transition(TransitionSpec::new("popup", "done", ActionSpec::key("enter")))
            .fallback(
                FallbackScope::General,
                FallbackSpec::new(vec![ActionSpec::key("escape")]),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn single_match() {
        let r = recognize(&seen(&["MENU"]), &graph(), "menu").unwrap();
        assert_eq!(r, Recognition::State("menu".into()));
    }

    #[test]
    fn nothing_matches() {
        let r = recognize(&seen(&["LOADING"]), &graph(), "menu").unwrap();
        assert_eq!(r, Recognition::Unknown);
        assert_eq!(recognize(&[], &graph(), "menu").unwrap(), Recognition::Unknown);
    }

    #[test]
    fn more_specific_state_wins() {
        let r = recognize(&seen(&["LOBBY", "READY"]), &graph(), "popup").unwrap();
        assert_eq!(r, Recognition::State("lobby_ready".into()));
    }

    #[test]
    fn tie_broken_by_adjacency_to_current() {
        // lobby and settings both need only LOBBY; only lobby follows menu.
        let r = recognize(&seen(&["LOBBY"]), &graph(), "menu").unwrap();
        assert_eq!(r, Recognition::State("lobby".into()));
    }

    #[test]
    fn tie_broken_by_staying_in_current() {
        // The screen still shows lobby after its action was sent; settings
        // ties with it but is not reachable from lobby.
        let r = recognize(&seen(&["LOBBY"]), &graph(), "lobby").unwrap();
        assert_eq!(r, Recognition::State("lobby".into()));
    }

    #[test]
    fn current_and_successor_tied_is_ambiguous() {
        let graph = WorkflowGraph::builder("a", "b")
            .state(StateSpec::new("a", vec![req("SAME")]))
            .state(StateSpec::new("b", vec![req("SAME")]))
            .transition(TransitionSpec::new("a", "b", ActionSpec::key("enter")))
            .fallback(
                FallbackScope::General,
                FallbackSpec::new(vec![ActionSpec::key("escape")]),
            )
            .build()
            .unwrap();
        let err = recognize(&seen(&["SAME"]), &graph, "a").unwrap_err();
        assert_eq!(
            err,
            RunError::AmbiguousState {
                candidates: vec!["a".into(), "b".into()],
            }
        );
    }

    #[test]
    fn unresolvable_tie_is_ambiguous() {
        let err = recognize(&seen(&["LOBBY"]), &graph(), "popup").unwrap_err();
        assert_eq!(
            err,
            RunError::AmbiguousState {
                candidates: vec!["lobby".into(), "settings".into()],
            }
        );
    }

    #[test]
    fn equal_specificity_without_shared_elements_is_ambiguous() {
        let err = recognize(&seen(&["MENU", "OK"]), &graph(), "done").unwrap_err();
        assert!(matches!(err, RunError::AmbiguousState { ref candidates } if candidates.len() == 2));
    }

    #[test]
    fn display() {
        assert_eq!(Recognition::Unknown.to_string(), "unknown");
        assert_eq!(Recognition::State("menu".into()).to_string(), "menu");
    }
}
