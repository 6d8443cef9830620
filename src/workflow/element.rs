use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of on-screen element, as reported by a detector or requested by a matcher.
///
/// `Any` is only meaningful on the matcher side. `Unknown` is what detectors
/// produce for kinds outside the fixed set; only an `Any` matcher accepts it.
/// A workflow matcher that parses to `Unknown` is rejected when the graph is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Button,
    #[serde(alias = "text")]
    Label,
    Icon,
    #[serde(alias = "input")]
    Textbox,
    Checkbox,
    Slider,
    Menu,
    Any,
    #[serde(other)]
    Unknown,
}

impl ElementType {
    /// Whether a matcher of this kind accepts a detected element of `detected` kind.
    pub fn accepts(self, detected: ElementType) -> bool {
        self == ElementType::Any || (self == detected && detected != ElementType::Unknown)
    }

    /// Lenient parse used for free-form detector output.
    pub fn from_detector(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "button" => ElementType::Button,
            "label" | "text" => ElementType::Label,
            "icon" => ElementType::Icon,
            "textbox" | "input" => ElementType::Textbox,
            "checkbox" => ElementType::Checkbox,
            "slider" => ElementType::Slider,
            "menu" => ElementType::Menu,
            _ => ElementType::Unknown,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementType::Button => "button",
            ElementType::Label => "label",
            ElementType::Icon => "icon",
            ElementType::Textbox => "textbox",
            ElementType::Checkbox => "checkbox",
            ElementType::Slider => "slider",
            ElementType::Menu => "menu",
            ElementType::Any => "any",
            ElementType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// How a matcher's text is compared against a detected element's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextMatchMode {
    Exact,
    #[default]
    Contains,
    #[serde(alias = "starts_with")]
    StartsWith,
    #[serde(alias = "ends_with")]
    EndsWith,
}

/// A requirement on a single detected element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementMatcher {
    #[serde(rename = "type", default = "default_kind")]
    pub kind: ElementType,
    #[serde(default)]
    pub text: String,
    #[serde(rename = "match", default)]
    pub mode: TextMatchMode,
    /// Text comparison ignores case unless this is set.
    #[serde(default)]
    pub case_sensitive: bool,
}

fn default_kind() -> ElementType {
    ElementType::Any
}

impl ElementMatcher {
    pub fn new(kind: ElementType, text: impl Into<String>, mode: TextMatchMode) -> Self {
        Self {
            kind,
            text: text.into(),
            mode,
            case_sensitive: false,
        }
    }

    pub fn case_sensitive(mut self) -> Self {
        self.case_sensitive = true;
        self
    }
}

impl fmt::Display for ElementMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?} {:?})", self.kind, self.mode, self.text)
    }
}

/// Rectangular screen region `(x, y, w, h)` in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The click point for this region.
    pub fn center(&self) -> (i32, i32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }
}

/// One element reported by a detector. Immutable once part of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedElement {
    pub kind: ElementType,
    pub text: String,
    pub confidence: f32,
    pub bounding_box: BoundingBox,
}

impl DetectedElement {
    pub fn new(kind: ElementType, text: impl Into<String>, bounding_box: BoundingBox) -> Self {
        Self {
            kind,
            text: text.into(),
            confidence: 1.0,
            bounding_box,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }
}

impl fmt::Display for DetectedElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.bounding_box;
        write!(
            f,
            "{} at ({},{},{}x{}): {:?}",
            self.kind, b.x, b.y, b.width, b.height, self.text
        )
    }
}
