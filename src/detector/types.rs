//! Wire formats of the vision backends.
//!
//! Omniparser answers `POST /parse/` with a list of normalised boxes; the
//! LM Studio family speaks the OpenAI chat-completions dialect and returns
//! its detections as JSON embedded in the reply text.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct ParseRequest<'a> {
    pub base64_image: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParseResponse {
    #[serde(default)]
    pub parsed_content_list: Vec<ParsedContent>,
    pub latency: Option<f64>,
}

/// One Omniparser item. `bbox` is `[x1, y1, x2, y2]` in the 0..1 range.
#[derive(Debug, Clone, Deserialize)]
pub struct ParsedContent {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub bbox: Option<[f64; 4]>,
    #[serde(default)]
    pub interactivity: bool,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: ChatContent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ChatContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatReply,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatReply {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelList {
    #[serde(default)]
    pub data: Vec<ModelInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    pub id: String,
}

/// The JSON document a vision-language model is prompted to produce.
#[derive(Debug, Clone, Deserialize)]
pub struct ElementsReply {
    #[serde(default)]
    pub elements: Vec<ElementReply>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElementReply {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: String,
    pub confidence: Option<f32>,
    #[serde(rename = "box")]
    pub bbox: Option<BoxReply>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BoxReply {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_matches_openai_shape() {
        let req = ChatRequest {
            model: "qwen2-vl".into(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: ChatContent::Text("be precise".into()),
                },
                ChatMessage {
                    role: "user",
                    content: ChatContent::Parts(vec![
                        ContentPart::Text {
                            text: "find buttons".into(),
                        },
                        ContentPart::ImageUrl {
                            image_url: ImageUrl {
                                url: "data:image/png;base64,AAAA".into(),
                            },
                        },
                    ]),
                },
            ],
            temperature: 0.01,
            max_tokens: 1000,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["messages"][0]["content"], "be precise");
        assert_eq!(json["messages"][1]["content"][0]["type"], "text");
        assert_eq!(json["messages"][1]["content"][1]["type"], "image_url");
        assert_eq!(
            json["messages"][1]["content"][1]["image_url"]["url"],
            "data:image/png;base64,AAAA"
        );
    }

    #[test]
    fn parse_response_tolerates_missing_fields() {
        let json = r#"{
            "parsed_content_list": [
                {"type": "text", "bbox": [0.1, 0.2, 0.3, 0.4], "interactivity": true, "content": "PLAY"},
                {"type": "icon"}
            ]
        }"#;
        let resp: ParseResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.parsed_content_list.len(), 2);
        assert!(resp.parsed_content_list[1].bbox.is_none());
        assert!(!resp.parsed_content_list[1].interactivity);
        assert!(resp.latency.is_none());
    }
}
