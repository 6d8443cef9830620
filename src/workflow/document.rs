//! YAML workflow files.
//!
//! The file is first read into a loosely typed document so that a missing
//! section is reported as [`ConfigError::MissingSection`] instead of a bare
//! serde message, then converted into a validated [`WorkflowGraph`].

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::element::ElementMatcher;
use super::graph::{
    ActionSpec, ClickTarget, FallbackScope, FallbackSpec, GraphMetadata, StateSpec,
    TransitionSpec, WorkflowGraph, DEFAULT_EXPECTED_DELAY, DEFAULT_STATE_TIMEOUT,
};
use crate::error::ConfigError;

#[derive(Debug, Deserialize)]
struct WorkflowDocument {
    #[serde(default)]
    metadata: MetadataDoc,
    initial_state: Option<String>,
    target_state: Option<String>,
    states: Option<BTreeMap<String, StateDoc>>,
    transitions: Option<Vec<TransitionDoc>>,
    fallbacks: Option<BTreeMap<String, FallbackDoc>>,
}

#[derive(Debug, Default, Deserialize)]
struct MetadataDoc {
    game_name: Option<String>,
    benchmark_duration: Option<f64>,
    startup_wait: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct StateDoc {
    #[serde(default)]
    required_elements: Vec<ElementMatcher>,
    timeout: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TransitionDoc {
    from: String,
    to: String,
    #[serde(flatten)]
    action: ActionDoc,
    expected_delay: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FallbackDoc {
    #[serde(default)]
    actions: Vec<ActionDoc>,
    expected_delay: Option<f64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ActionDoc {
    action: String,
    target: Option<ElementMatcher>,
    hardcoded_coords: Option<CoordsDoc>,
    key: Option<String>,
    duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CoordsDoc {
    x: i32,
    y: i32,
}

fn seconds(context: &str, value: Option<f64>, default: Duration) -> Result<Duration, ConfigError> {
    match value {
        None => Ok(default),
        Some(secs) => Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidDuration {
            context: context.to_string(),
            seconds: secs,
        }),
    }
}

impl ActionDoc {
    fn into_spec(self, context: &str) -> Result<ActionSpec, ConfigError> {
        let invalid = |message: &str| ConfigError::InvalidAction {
            context: context.to_string(),
            message: message.to_string(),
        };

        match self.action.trim().to_ascii_lowercase().as_str() {
            "click" => {
                // Literal coordinates win over an element target when both are given.
                if let Some(CoordsDoc { x, y }) = self.hardcoded_coords {
                    Ok(ActionSpec::Click(ClickTarget::Coordinates { x, y }))
                } else if let Some(target) = self.target {
                    Ok(ActionSpec::Click(ClickTarget::Element(target)))
                } else {
                    Err(invalid("click needs a target or hardcoded_coords"))
                }
            }
            "key" => match self.key {
                Some(key) if !key.trim().is_empty() => Ok(ActionSpec::Key(key)),
                _ => Err(invalid("key action needs a key")),
            },
            "wait" => Ok(ActionSpec::Wait(seconds(
                context,
                self.duration,
                DEFAULT_EXPECTED_DELAY,
            )?)),
            other => Err(invalid(&format!("unknown action type '{other}'"))),
        }
    }
}

impl WorkflowDocument {
    fn into_graph(self) -> Result<WorkflowGraph, ConfigError> {
        let initial_state = self
            .initial_state
            .ok_or(ConfigError::MissingSection("initial_state"))?;
        let target_state = self
            .target_state
            .ok_or(ConfigError::MissingSection("target_state"))?;
        let states = self.states.ok_or(ConfigError::MissingSection("states"))?;
        let transitions = self
            .transitions
            .ok_or(ConfigError::MissingSection("transitions"))?;
        let fallbacks = self
            .fallbacks
            .ok_or(ConfigError::MissingSection("fallbacks"))?;

        let metadata = GraphMetadata {
            game_name: self.metadata.game_name,
            benchmark_duration: self
                .metadata
                .benchmark_duration
                .map(|secs| seconds("metadata.benchmark_duration", Some(secs), Duration::ZERO))
                .transpose()?,
            startup_wait: seconds("metadata.startup_wait", self.metadata.startup_wait, Duration::ZERO)?,
        };

        let mut builder = WorkflowGraph::builder(initial_state, target_state).metadata(metadata);

        for (name, doc) in states {
            let timeout = seconds(&format!("state '{name}'"), doc.timeout, DEFAULT_STATE_TIMEOUT)?;
            builder = builder.state(StateSpec::new(name, doc.required_elements).with_timeout(timeout));
        }

        for doc in transitions {
            let context = format!("transition {} -> {}", doc.from, doc.to);
            let delay = seconds(&context, doc.expected_delay, DEFAULT_EXPECTED_DELAY)?;
            let action = doc.action.into_spec(&context)?;
            builder = builder.transition(TransitionSpec::new(doc.from, doc.to, action).with_delay(delay));
        }

        for (key, doc) in fallbacks {
            let context = format!("fallback '{key}'");
            let actions = doc
                .actions
                .into_iter()
                .map(|a| a.into_spec(&context))
                .collect::<Result<Vec<_>, _>>()?;
            let mut spec = FallbackSpec::new(actions)
                .with_delay(seconds(&context, doc.expected_delay, DEFAULT_EXPECTED_DELAY)?);
            spec.max_retries = doc.max_retries;
            builder = builder.fallback(FallbackScope::from_key(&key), spec);
        }

        builder.build()
    }
}

impl WorkflowGraph {
    /// Parses and validates a workflow from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let doc: WorkflowDocument = serde_yaml::from_str(yaml)?;
        doc.into_graph()
    }

    /// Reads, parses and validates a workflow file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let graph = Self::from_yaml(&contents)?;
        tracing::info!(
            path = %path.display(),
            states = graph.states().count(),
            transitions = graph.transitions().count(),
            "workflow loaded"
        );
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::element::{ElementType, TextMatchMode};
    use std::io::Write;

    const CS2: &str = r#"
metadata:
  game_name: Counter-Strike 2
  benchmark_duration: 120
  startup_wait: 2.5
initial_state: main_menu
target_state: results
states:
  main_menu:
    required_elements:
      - { type: button, text: PLAY }
      - { type: label, text: "Main Menu", match: exact, case_sensitive: true }
    timeout: 30
  benchmark:
    required_elements:
      - { type: label, text: FPS }
  results:
    required_elements:
      - { type: any, text: "Benchmark Results", match: startswith }
transitions:
  - from: main_menu
    to: benchmark
    action: click
    target: { type: button, text: PLAY }
    expected_delay: 2
  - from: benchmark
    to: results
    action: wait
    duration: 120
fallbacks:
  general:
    actions:
      - { action: key, key: escape }
    expected_delay: 2
    max_retries: 4
  benchmark:
    actions:
      - { action: click, hardcoded_coords: { x: 10, y: 20 } }
"#;

    #[test]
    fn parses_full_workflow() {
        let graph = WorkflowGraph::from_yaml(CS2).unwrap();
        assert_eq!(graph.initial_state(), "main_menu");
        assert_eq!(graph.target_state(), "results");
        assert_eq!(graph.metadata().game_name.as_deref(), Some("Counter-Strike 2"));
        assert_eq!(graph.metadata().startup_wait, Duration::from_millis(2500));

        let menu = graph.state("main_menu").unwrap();
        assert_eq!(menu.timeout, Duration::from_secs(30));
        assert_eq!(menu.required_elements.len(), 2);
        assert_eq!(menu.required_elements[1].mode, TextMatchMode::Exact);
        assert!(menu.required_elements[1].case_sensitive);
        assert_eq!(graph.state("benchmark").unwrap().timeout, DEFAULT_STATE_TIMEOUT);

        let t = graph.transition("main_menu", "benchmark").unwrap();
        assert_eq!(t.expected_delay, Duration::from_secs(2));
        assert_eq!(t.target_matcher().unwrap().kind, ElementType::Button);

        let t = graph.transition("benchmark", "results").unwrap();
        assert_eq!(t.action, ActionSpec::Wait(Duration::from_secs(120)));
        assert_eq!(t.expected_delay, DEFAULT_EXPECTED_DELAY);

        let (scope, general) = graph.fallback_for("main_menu");
        assert_eq!(scope, FallbackScope::General);
        assert_eq!(general.max_retries, Some(4));
        assert_eq!(general.actions, vec![ActionSpec::key("escape")]);

        let (scope, spec) = graph.fallback_for("benchmark");
        assert_eq!(scope, FallbackScope::State("benchmark".into()));
        assert_eq!(spec.actions, vec![ActionSpec::click_at(10, 20)]);
        assert_eq!(spec.max_retries, None);
    }

    #[test]
    fn missing_sections_are_config_errors() {
        let err = WorkflowGraph::from_yaml("initial_state: a\ntarget_state: b\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingSection("states")));

        let without_fallbacks = CS2.split("fallbacks:").next().unwrap();
        let err = WorkflowGraph::from_yaml(without_fallbacks).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSection("fallbacks")));

        let without_target = CS2.replace("target_state: results\n", "");
        let err = WorkflowGraph::from_yaml(&without_target).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSection("target_state")));
    }

    #[test]
    fn negative_duration_rejected() {
        let yaml = CS2.replace("timeout: 30", "timeout: -5");
        let err = WorkflowGraph::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDuration { seconds, .. } if seconds == -5.0));
    }

    #[test]
    fn click_without_target_rejected() {
        let yaml = CS2.replace("    target: { type: button, text: PLAY }\n", "");
        let err = WorkflowGraph::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAction { .. }));
    }

    #[test]
    fn unknown_action_rejected() {
        let yaml = CS2.replace("action: wait", "action: teleport");
        let err = WorkflowGraph::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("unknown action type 'teleport'"));
    }

    #[test]
    fn misspelt_element_type_rejected() {
        let yaml = CS2.replace("- { type: button, text: PLAY }", "- { type: buton, text: PLAY }");
        let err = WorkflowGraph::from_yaml(&yaml).unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidElementType { ref context, .. } if context == "state 'main_menu'")
        );

        let yaml = CS2.replace("target: { type: button, text: PLAY }", "target: { type: buton, text: PLAY }");
        let err = WorkflowGraph::from_yaml(&yaml).unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidElementType { ref context, .. } if context == "transition main_menu -> benchmark")
        );
    }

    #[test]
    fn fallback_for_unknown_state_rejected() {
        let yaml = CS2.replace("  benchmark:\n    actions:", "  lobby:\n    actions:");
        let err = WorkflowGraph::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownState { ref state, .. } if state == "lobby"));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CS2.as_bytes()).unwrap();
        let graph = WorkflowGraph::load(file.path()).unwrap();
        assert_eq!(graph.states().count(), 3);
    }

    #[test]
    fn load_missing_file() {
        let err = WorkflowGraph::load(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
