//! Interface de linha de comando do uinav baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (run, validate)
//! e a flag global --verbose.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Settings;
use crate::detector::VisionModel;

/// uinav: navega a interface de um jogo até a tela alvo usando visão computacional.
#[derive(Debug, Parser)]
#[command(name = "uinav", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Executa um workflow contra o SUT.
    Run(RunArgs),

    /// Carrega e valida um workflow sem executá-lo.
    Validate {
        /// Caminho para o arquivo YAML do workflow.
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(Debug, Clone, clap::Args)]
pub struct RunArgs {
    /// Caminho para o arquivo YAML do workflow.
    #[arg(long)]
    pub config: PathBuf,

    /// Endereço IP do agente no SUT.
    #[arg(long)]
    pub sut_ip: Option<String>,

    #[arg(long)]
    pub sut_port: Option<u16>,

    /// Backend de visão usado para detectar elementos.
    #[arg(long, value_enum)]
    pub vision_model: Option<VisionModel>,

    /// URL base do servidor de visão.
    #[arg(long)]
    pub model_url: Option<String>,

    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Tentativas de fallback por escopo antes de desistir.
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Grava o trace da execução em JSON neste arquivo.
    #[arg(long)]
    pub trace_out: Option<PathBuf>,
}

impl RunArgs {
    /// Flags da CLI têm precedência sobre arquivo e ambiente.
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(ip) = &self.sut_ip {
            settings.sut_ip = Some(ip.clone());
        }
        if let Some(port) = self.sut_port {
            settings.sut_port = port;
        }
        if let Some(model) = self.vision_model {
            settings.vision_model = model;
        }
        if let Some(url) = &self.model_url {
            settings.model_url = url.clone();
        }
        if let Some(max) = self.max_iterations {
            settings.max_iterations = max;
        }
        if let Some(max) = self.max_retries {
            settings.max_retries = max;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_run_subcommand() {
        let cli = Cli::parse_from([
            "uinav",
            "run",
            "--config",
            "cs2.yaml",
            "--sut-ip",
            "192.168.1.50",
            "--vision-model",
            "gemma",
            "--trace-out",
            "trace.json",
        ]);
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.config, PathBuf::from("cs2.yaml"));
                assert_eq!(args.sut_ip.as_deref(), Some("192.168.1.50"));
                assert_eq!(args.vision_model, Some(VisionModel::Gemma));
                assert_eq!(args.trace_out, Some(PathBuf::from("trace.json")));
                assert!(args.sut_port.is_none());
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn cli_parses_validate_with_verbose() {
        let cli = Cli::parse_from(["uinav", "--verbose", "validate", "--config", "wf.yaml"]);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Validate { ref config } if config == &PathBuf::from("wf.yaml")));
    }

    #[test]
    fn run_requires_config() {
        assert!(Cli::try_parse_from(["uinav", "run", "--sut-ip", "1.2.3.4"]).is_err());
    }

    #[test]
    fn flags_override_settings() {
        let cli = Cli::parse_from([
            "uinav",
            "run",
            "--config",
            "wf.yaml",
            "--sut-port",
            "9090",
            "--max-retries",
            "7",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected Run command");
        };
        let mut settings = Settings {
            sut_ip: Some("10.0.0.1".into()),
            ..Settings::default()
        };
        args.apply_to(&mut settings);
        assert_eq!(settings.sut_port, 9090);
        assert_eq!(settings.max_retries, 7);
        assert_eq!(settings.sut_ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(settings.max_iterations, 50);
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
