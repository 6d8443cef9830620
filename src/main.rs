use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use console::Style;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use uinav::cli::{Cli, Command, RunArgs};
use uinav::config::Settings;
use uinav::detector::VisionBackend;
use uinav::engine::{DecisionEngine, TraceEntry};
use uinav::sut::SutClient;
use uinav::ui::RunProgress;
use uinav::workflow::WorkflowGraph;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Command::Validate { config } => validate(&config),
        Command::Run(args) => run(args).await,
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", Style::new().red().bold().apply_to("error:"));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "uinav=debug" } else { "uinav=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn validate(path: &Path) -> Result<ExitCode> {
    let graph = WorkflowGraph::load(path)
        .with_context(|| format!("workflow {} is invalid", path.display()))?;

    let bold = Style::new().bold();
    let green = Style::new().green().bold();
    println!(
        "  {} {} is valid",
        green.apply_to("✓"),
        path.display()
    );
    if let Some(game) = &graph.metadata().game_name {
        println!("  game: {game}");
    }
    println!(
        "  {} {} → {}",
        bold.apply_to("route:"),
        graph.initial_state(),
        graph.target_state()
    );
    println!("  {}", bold.apply_to("states:"));
    for state in graph.states() {
        println!(
            "    {} ({} required, timeout {}s)",
            state.name,
            state.required_elements.len(),
            state.timeout.as_secs_f64()
        );
    }
    println!("  {}", bold.apply_to("transitions:"));
    for transition in graph.transitions() {
        println!("    {}: {}", transition.key, transition.action);
    }
    Ok(ExitCode::SUCCESS)
}

async fn run(args: RunArgs) -> Result<ExitCode> {
    let mut settings = Settings::load()?;
    args.apply_to(&mut settings);

    let graph = WorkflowGraph::load(&args.config)
        .with_context(|| format!("workflow {} is invalid", args.config.display()))?;

    let ip = settings
        .sut_ip
        .clone()
        .context("no SUT address: pass --sut-ip or set UINAV_SUT_IP")?;
    let sut = SutClient::new(&ip, settings.sut_port, settings.action_timeout())?;
    let status = sut
        .status()
        .await
        .with_context(|| format!("SUT at {} is not responding", sut.base_url()))?;
    tracing::info!(url = sut.base_url(), status = ?status.status, "SUT online");

    let detector = VisionBackend::connect(
        settings.vision_model,
        &settings.model_url,
        settings.screen(),
        settings.detect_timeout(),
    )
    .await
    .with_context(|| format!("{} backend at {} is unavailable", settings.vision_model, settings.model_url))?;

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping after the current iteration");
            token.cancel();
        }
    });

    let startup_wait = graph.metadata().startup_wait;
    if !startup_wait.is_zero() {
        tracing::info!(secs = startup_wait.as_secs_f64(), "waiting for the game to start");
        tokio::select! {
            _ = tokio::time::sleep(startup_wait) => {}
            _ = cancel.cancelled() => {}
        }
    }

    let name = graph
        .metadata()
        .game_name
        .clone()
        .unwrap_or_else(|| args.config.display().to_string());
    let progress = RunProgress::start(&name);
    let observer = |entry: &TraceEntry| progress.step(entry);

    let outcome = DecisionEngine::new(&graph, &detector, &sut)
        .with_options(settings.engine_options())
        .with_observer(&observer)
        .run(&cancel)
        .await;

    progress.complete(&outcome);
    progress.print_path(outcome.trace());

    if let Some(path) = &args.trace_out {
        let json = serde_json::to_string_pretty(&outcome)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write trace to {}", path.display()))?;
        tracing::info!(path = %path.display(), "trace written");
    }

    Ok(if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
