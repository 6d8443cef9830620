//! Vision backends that turn a screenshot into detected UI elements.
//!
//! The engine only sees the [`Detector`] trait. The concrete backend is
//! chosen once at start-up through [`VisionBackend`].

mod omniparser;
pub mod types;
mod vlm;

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};

pub use omniparser::OmniparserClient;
pub use vlm::{extract_json_object, VisionLanguageClient};

use crate::error::DetectionError;
use crate::workflow::DetectedElement;

/// Raw PNG bytes captured from the SUT.
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub bytes: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

impl Screenshot {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            captured_at: Utc::now(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

/// Identifies on-screen elements in a screenshot.
pub trait Detector: Send + Sync {
    fn detect(
        &self,
        screenshot: &Screenshot,
    ) -> impl Future<Output = Result<Vec<DetectedElement>, DetectionError>> + Send;
}

/// Backend names accepted on the command line and in `uinav.toml`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum VisionModel {
    Omniparser,
    Qwen,
    Gemma,
}

impl fmt::Display for VisionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisionModel::Omniparser => write!(f, "omniparser"),
            VisionModel::Qwen => write!(f, "qwen"),
            VisionModel::Gemma => write!(f, "gemma"),
        }
    }
}

impl FromStr for VisionModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "omniparser" => Ok(VisionModel::Omniparser),
            "qwen" => Ok(VisionModel::Qwen),
            "gemma" => Ok(VisionModel::Gemma),
            other => Err(format!("unknown vision model '{other}'")),
        }
    }
}

/// The detector selected for a run.
pub enum VisionBackend {
    Omniparser(OmniparserClient),
    VisionLanguage(VisionLanguageClient),
}

impl VisionBackend {
    /// Builds the client for `model` and checks that the service answers.
    pub async fn connect(
        model: VisionModel,
        base_url: &str,
        screen: (u32, u32),
        timeout: Duration,
    ) -> Result<Self, DetectionError> {
        match model {
            VisionModel::Omniparser => {
                let client = OmniparserClient::new(base_url, screen, timeout)?;
                client.probe().await?;
                Ok(VisionBackend::Omniparser(client))
            }
            VisionModel::Qwen | VisionModel::Gemma => {
                let hint = model.to_string();
                let client = VisionLanguageClient::discover(base_url, &hint, timeout).await?;
                Ok(VisionBackend::VisionLanguage(client))
            }
        }
    }
}

impl Detector for VisionBackend {
    async fn detect(&self, screenshot: &Screenshot) -> Result<Vec<DetectedElement>, DetectionError> {
        match self {
            VisionBackend::Omniparser(client) => client.detect(screenshot).await,
            VisionBackend::VisionLanguage(client) => client.detect(screenshot).await,
        }
    }
}

fn transport_error(err: reqwest::Error, timeout: Duration) -> DetectionError {
    if err.is_timeout() {
        DetectionError::Timeout(timeout)
    } else {
        DetectionError::Backend(err.to_string())
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, DetectionError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    Err(DetectionError::Backend(format!("status {}: {body}", status.as_u16())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vision_model_parsing() {
        assert_eq!("Qwen".parse::<VisionModel>().unwrap(), VisionModel::Qwen);
        assert_eq!(VisionModel::Omniparser.to_string(), "omniparser");
        assert!("yolo".parse::<VisionModel>().is_err());
    }

    #[test]
    fn vision_model_from_toml() {
        #[derive(serde::Deserialize)]
        struct Wrapper {
            model: VisionModel,
        }
        let w: Wrapper = toml::from_str(r#"model = "gemma""#).unwrap();
        assert_eq!(w.model, VisionModel::Gemma);
    }
}
