//! Configuração do uinav carregada a partir de `uinav.toml`.
//!
//! A struct [`Settings`] contém os parâmetros da execução: endereço do SUT,
//! backend de visão, limites e timeouts do motor. Valores ausentes no arquivo
//! usam defaults. As variáveis `UINAV_SUT_IP` e `UINAV_MODEL_URL` têm
//! precedência sobre o arquivo; flags da CLI têm precedência sobre ambos.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::detector::VisionModel;
use crate::engine::EngineOptions;

pub const SETTINGS_FILE: &str = "uinav.toml";

/// Configuração de nível superior carregada de `uinav.toml`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    /// Endereço do agente no SUT. Normalmente informado via CLI.
    #[serde(default)]
    pub sut_ip: Option<String>,

    #[serde(default = "default_sut_port")]
    pub sut_port: u16,

    /// URL base do servidor de visão (Omniparser ou LM Studio).
    #[serde(default = "default_model_url")]
    pub model_url: String,

    #[serde(default = "default_vision_model")]
    pub vision_model: VisionModel,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Tentativas de fallback por escopo.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_detect_timeout_secs")]
    pub detect_timeout_secs: u64,

    #[serde(default = "default_action_timeout_secs")]
    pub action_timeout_secs: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Resolução do SUT, usada para converter as caixas normalizadas do Omniparser.
    #[serde(default = "default_screen_width")]
    pub screen_width: u32,

    #[serde(default = "default_screen_height")]
    pub screen_height: u32,
}

fn default_sut_port() -> u16 {
    8080
}

fn default_model_url() -> String {
    "http://127.0.0.1:1234".to_string()
}

fn default_vision_model() -> VisionModel {
    VisionModel::Omniparser
}

fn default_max_iterations() -> u32 {
    50
}

fn default_max_retries() -> u32 {
    3
}

fn default_detect_timeout_secs() -> u64 {
    60
}

fn default_action_timeout_secs() -> u64 {
    10
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_screen_width() -> u32 {
    2560
}

fn default_screen_height() -> u32 {
    1600
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sut_ip: None,
            sut_port: default_sut_port(),
            model_url: default_model_url(),
            vision_model: default_vision_model(),
            max_iterations: default_max_iterations(),
            max_retries: default_max_retries(),
            detect_timeout_secs: default_detect_timeout_secs(),
            action_timeout_secs: default_action_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            screen_width: default_screen_width(),
            screen_height: default_screen_height(),
        }
    }
}

impl Settings {
    /// Carrega `uinav.toml` do diretório atual e aplica as variáveis de ambiente.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self> {
        let mut settings = Self::load_from(Path::new(SETTINGS_FILE))?;
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Lê um arquivo de configuração específico, sem consultar o ambiente.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let settings = toml::from_str::<Settings>(&contents)
            .with_context(|| format!("invalid settings in {}", path.display()))?;
        Ok(settings)
    }

    /// Aplica overrides vindos de `lookup` (o ambiente do processo, em produção).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(ip) = lookup("UINAV_SUT_IP")
            && !ip.is_empty()
        {
            self.sut_ip = Some(ip);
        }
        if let Some(url) = lookup("UINAV_MODEL_URL")
            && !url.is_empty()
        {
            self.model_url = url;
        }
    }

    pub fn detect_timeout(&self) -> Duration {
        Duration::from_secs(self.detect_timeout_secs)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }

    pub fn screen(&self) -> (u32, u32) {
        (self.screen_width, self.screen_height)
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            max_iterations: self.max_iterations,
            max_retries: self.max_retries,
            detect_timeout: self.detect_timeout(),
            action_timeout: self.action_timeout(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_values() {
        let settings = Settings::default();
        assert_eq!(settings.sut_port, 8080);
        assert_eq!(settings.model_url, "http://127.0.0.1:1234");
        assert_eq!(settings.vision_model, VisionModel::Omniparser);
        assert_eq!(settings.screen(), (2560, 1600));
        assert!(settings.sut_ip.is_none());
        assert_eq!(settings.engine_options(), EngineOptions::default());
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            sut_ip = "192.168.0.20"
            vision_model = "qwen"
            max_retries = 5
            poll_interval_ms = 250
        "#;
        let settings: Settings = toml::from_str(toml_str).unwrap();
        assert_eq!(settings.sut_ip.as_deref(), Some("192.168.0.20"));
        assert_eq!(settings.vision_model, VisionModel::Qwen);
        assert_eq!(settings.max_retries, 5);
        assert_eq!(settings.max_iterations, 50);
        assert_eq!(
            settings.engine_options().poll_interval,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn env_overrides_file() {
        let mut settings = Settings::default();
        settings.apply_env(|key| match key {
            "UINAV_SUT_IP" => Some("10.0.0.7".to_string()),
            "UINAV_MODEL_URL" => Some(String::new()),
            _ => None,
        });
        assert_eq!(settings.sut_ip.as_deref(), Some("10.0.0.7"));
        assert_eq!(settings.model_url, "http://127.0.0.1:1234");
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uinav.toml");
        std::fs::write(&path, "sut_port = 9000\nscreen_width = 1920\n").unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.sut_port, 9000);
        assert_eq!(settings.screen(), (1920, 1600));
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uinav.toml");
        std::fs::write(&path, "vision_model = \"yolo\"\n").unwrap();
        assert!(Settings::load_from(&path).is_err());
    }
}
