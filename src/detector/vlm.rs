use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;

use super::types::{
    ChatContent, ChatMessage, ChatRequest, ChatResponse, ContentPart, ElementsReply, ImageUrl,
    ModelList,
};
use super::{ensure_success, transport_error, Detector, Screenshot};
use crate::error::DetectionError;
use crate::workflow::{BoundingBox, DetectedElement, ElementType};

const SYSTEM_PROMPT: &str = r#"You are a computer vision system that identifies UI elements in game screenshots.
For each UI element return a JSON object with:
- box: {x, y, width, height} in pixels, (0,0) at the top-left corner
- type: button, label, icon, textbox, checkbox, slider or menu
- text: the visible text of the element, kept short
- confidence: a score between 0.0 and 1.0
Report at most 15 elements, preferring buttons, menus and other interactive components.
Respond ONLY with JSON of the form {"elements": [ ... ]}."#;

const USER_PROMPT: &str = "Identify the UI elements in this game screenshot with exact coordinates.";

const DEFAULT_CONFIDENCE: f32 = 0.8;

/// Client for a vision-language model behind an OpenAI-compatible API
/// (LM Studio serving Qwen-VL or Gemma).
pub struct VisionLanguageClient {
    client: Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl VisionLanguageClient {
    pub fn new(base_url: &str, model: impl Into<String>, timeout: Duration) -> Result<Self, DetectionError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .map_err(|e| DetectionError::Backend(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            timeout,
        })
    }

    /// Connects and picks the first served model whose id contains `hint`,
    /// falling back to the first model listed.
    pub async fn discover(base_url: &str, hint: &str, timeout: Duration) -> Result<Self, DetectionError> {
        let mut this = Self::new(base_url, String::new(), timeout)?;
        let response = this
            .client
            .get(format!("{}/v1/models", this.base_url))
            .send()
            .await
            .map_err(|e| transport_error(e, timeout))?;
        let models: ModelList = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| DetectionError::Backend(format!("invalid model list: {e}")))?;

        let hint = hint.to_lowercase();
        let chosen = models
            .data
            .iter()
            .find(|m| m.id.to_lowercase().contains(&hint))
            .or_else(|| models.data.first())
            .ok_or_else(|| DetectionError::Backend("no models served".to_string()))?;

        tracing::info!(model = %chosen.id, url = %this.base_url, "vision model selected");
        this.model = chosen.id.clone();
        Ok(this)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request(&self, screenshot: &Screenshot) -> ChatRequest {
        let image = format!("data:image/png;base64,{}", STANDARD.encode(&screenshot.bytes));
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: ChatContent::Text(SYSTEM_PROMPT.to_string()),
                },
                ChatMessage {
                    role: "user",
                    content: ChatContent::Parts(vec![
                        ContentPart::Text {
                            text: USER_PROMPT.to_string(),
                        },
                        ContentPart::ImageUrl {
                            image_url: ImageUrl { url: image },
                        },
                    ]),
                },
            ],
            temperature: 0.01,
            max_tokens: 1000,
        }
    }
}

/// Returns the first balanced `{...}` object in `text`, ignoring braces inside strings.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_reply(content: &str) -> Result<Vec<DetectedElement>, DetectionError> {
    let json = extract_json_object(content)
        .ok_or_else(|| DetectionError::Backend("model reply contains no JSON object".to_string()))?;
    let reply: ElementsReply = serde_json::from_str(json)
        .map_err(|e| DetectionError::Backend(format!("model reply is not valid JSON: {e}")))?;

    let elements = reply
        .elements
        .into_iter()
        .filter_map(|e| {
            let b = e.bbox?;
            let bbox = BoundingBox::new(
                b.x.round() as i32,
                b.y.round() as i32,
                b.width.round() as i32,
                b.height.round() as i32,
            );
            Some(
                DetectedElement::new(ElementType::from_detector(&e.kind), e.text, bbox)
                    .with_confidence(e.confidence.unwrap_or(DEFAULT_CONFIDENCE)),
            )
        })
        .collect();
    Ok(elements)
}

impl Detector for VisionLanguageClient {
    async fn detect(&self, screenshot: &Screenshot) -> Result<Vec<DetectedElement>, DetectionError> {
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&self.request(screenshot))
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        let body: ChatResponse = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| DetectionError::Backend(format!("invalid chat response: {e}")))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| DetectionError::Backend("chat response has no choices".to_string()))?;

        let elements = parse_reply(&content)?;
        tracing::info!(model = %self.model, count = elements.len(), "vision model detections");
        Ok(elements)
    }
}
