//! Element matching against a detection snapshot.
//!
//! All functions here are pure. Text is trimmed on both sides before
//! comparison and compared case-insensitively unless the matcher asks for
//! case sensitivity. An empty matcher text accepts any element text.

use std::borrow::Cow;

use super::element::{DetectedElement, ElementMatcher, TextMatchMode};
use super::graph::StateSpec;

fn normalize(text: &str, case_sensitive: bool) -> Cow<'_, str> {
    let trimmed = text.trim();
    if case_sensitive {
        Cow::Borrowed(trimmed)
    } else {
        Cow::Owned(trimmed.to_lowercase())
    }
}

/// Whether `text` satisfies the matcher's text predicate.
pub fn text_matches(matcher: &ElementMatcher, text: &str) -> bool {
    if matcher.text.trim().is_empty() {
        return true;
    }
    let wanted = normalize(&matcher.text, matcher.case_sensitive);
    let actual = normalize(text, matcher.case_sensitive);
    match matcher.mode {
        TextMatchMode::Exact => actual == wanted,
        TextMatchMode::Contains => actual.contains(wanted.as_ref()),
        TextMatchMode::StartsWith => actual.starts_with(wanted.as_ref()),
        TextMatchMode::EndsWith => actual.ends_with(wanted.as_ref()),
    }
}

/// Whether a single element satisfies the matcher.
pub fn element_matches(matcher: &ElementMatcher, element: &DetectedElement) -> bool {
    matcher.kind.accepts(element.kind) && text_matches(matcher, &element.text)
}

/// First element in the snapshot that satisfies the matcher.
pub fn find_match<'a>(
    detections: &'a [DetectedElement],
    matcher: &ElementMatcher,
) -> Option<&'a DetectedElement> {
    detections.iter().find(|e| element_matches(matcher, e))
}

/// True when at least one detected element satisfies the matcher.
pub fn satisfies(detections: &[DetectedElement], matcher: &ElementMatcher) -> bool {
    find_match(detections, matcher).is_some()
}

/// True when every required element of the state is present.
pub fn state_satisfied(detections: &[DetectedElement], state: &StateSpec) -> bool {
    state
        .required_elements
        .iter()
        .all(|required| satisfies(detections, required))
}
