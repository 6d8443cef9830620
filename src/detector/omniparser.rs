use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;

use super::types::{ParseRequest, ParseResponse, ParsedContent};
use super::{ensure_success, transport_error, Detector, Screenshot};
use crate::error::DetectionError;
use crate::workflow::{BoundingBox, DetectedElement, ElementType};

/// Client for an Omniparser server.
pub struct OmniparserClient {
    client: Client,
    base_url: String,
    screen_width: u32,
    screen_height: u32,
    timeout: Duration,
}

impl OmniparserClient {
    /// `screen` is the SUT resolution used to scale Omniparser's normalised boxes.
    pub fn new(base_url: &str, screen: (u32, u32), timeout: Duration) -> Result<Self, DetectionError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .map_err(|e| DetectionError::Backend(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            screen_width: screen.0,
            screen_height: screen.1,
            timeout,
        })
    }

    pub async fn probe(&self) -> Result<(), DetectionError> {
        let response = self
            .client
            .get(format!("{}/probe", self.base_url))
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;
        ensure_success(response).await?;
        tracing::info!(url = %self.base_url, "omniparser reachable");
        Ok(())
    }

    /// Keeps interactive items that carry text and a box, scaled to screen pixels.
    fn to_elements(&self, items: Vec<ParsedContent>) -> Vec<DetectedElement> {
        let (w, h) = (f64::from(self.screen_width), f64::from(self.screen_height));
        items
            .into_iter()
            .filter(|item| item.interactivity)
            .filter_map(|item| {
                let text = item.content.filter(|c| !c.trim().is_empty())?;
                let [x1, y1, x2, y2] = item.bbox?;
                let x = (x1 * w).round() as i32;
                let y = (y1 * h).round() as i32;
                let right = (x2 * w).round() as i32;
                let bottom = (y2 * h).round() as i32;
                let bbox = BoundingBox::new(x, y, right - x, bottom - y);
                Some(DetectedElement::new(ElementType::from_detector(&item.kind), text, bbox))
            })
            .collect()
    }
}

impl Detector for OmniparserClient {
    async fn detect(&self, screenshot: &Screenshot) -> Result<Vec<DetectedElement>, DetectionError> {
        let encoded = STANDARD.encode(&screenshot.bytes);
        let response = self
            .client
            .post(format!("{}/parse/", self.base_url))
            .json(&ParseRequest {
                base64_image: &encoded,
            })
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        let body: ParseResponse = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| DetectionError::Backend(format!("invalid omniparser response: {e}")))?;

        if let Some(latency) = body.latency {
            tracing::debug!(latency_secs = latency, "omniparser latency");
        }
        let raw = body.parsed_content_list.len();
        let elements = self.to_elements(body.parsed_content_list);
        tracing::info!(raw, kept = elements.len(), "omniparser detections");
        Ok(elements)
    }
}
