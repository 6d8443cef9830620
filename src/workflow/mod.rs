mod document;
mod element;
mod graph;
pub mod matcher;
mod recognizer;

pub use element::{BoundingBox, DetectedElement, ElementMatcher, ElementType, TextMatchMode};
pub use graph::{
    ActionSpec, ClickTarget, FallbackScope, FallbackSpec, GraphBuilder, GraphMetadata, StateSpec,
    TransitionKey, TransitionSpec, WorkflowGraph, DEFAULT_EXPECTED_DELAY, DEFAULT_STATE_TIMEOUT,
};
pub use recognizer::{recognize, Recognition};
