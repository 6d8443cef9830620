//! Interface de terminal do uinav: spinner e saída colorida.
//!
//! Usa `indicatif` para o spinner e `console` para as cores. O
//! [`RunProgress`] acompanha visualmente uma execução do motor.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::engine::{Outcome, RunTrace, StepOutcome, TraceEntry};

/// Indicador visual de progresso para uma execução no terminal.
///
/// Mostra um spinner com o estado reconhecido e mensagens coloridas para
/// sucesso (verde), falha (vermelho) e fallback (amarelo).
pub struct RunProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl RunProgress {
    /// Inicia o spinner com o nome do workflow.
    pub fn start(workflow: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("{workflow}: starting"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Atualiza o spinner a cada entrada do trace.
    pub fn step(&self, entry: &TraceEntry) {
        self.pb.set_message(format!("#{} {}", entry.iteration, describe(entry)));
        match &entry.outcome {
            StepOutcome::Fallback { scope, attempt } => {
                self.pb.println(format!(
                    "  {} Fallback '{scope}' attempt {attempt}",
                    self.yellow.apply_to("↻")
                ));
            }
            StepOutcome::Dispatched { transition } => {
                self.pb
                    .println(format!("  {} {transition}", self.green.apply_to("→")));
            }
            _ => {}
        }
        for fault in &entry.faults {
            self.pb
                .println(format!("  {} {fault}", self.yellow.apply_to("!")));
        }
    }

    /// Finaliza o spinner e exibe o resultado final.
    pub fn complete(&self, outcome: &Outcome) {
        self.pb.finish_and_clear();
        let trace = outcome.trace();
        match outcome {
            Outcome::Succeeded { .. } => println!(
                "  {} Target reached after {} iterations ({} actions)",
                self.green.apply_to("✓"),
                trace.len(),
                trace.dispatched_actions()
            ),
            Outcome::Failed { error, .. } => println!(
                "  {} Run failed after {} iterations: {error}",
                self.red.apply_to("✗"),
                trace.len()
            ),
            Outcome::Cancelled { .. } => println!(
                "  {} Run cancelled after {} iterations",
                self.yellow.apply_to("■"),
                trace.len()
            ),
        }
    }

    /// Imprime a sequência de estados reconhecidos.
    pub fn print_path(&self, trace: &RunTrace) {
        let states = trace.states();
        if states.is_empty() {
            return;
        }
        println!("  {}", states.join(" → "));
    }
}

fn describe(entry: &TraceEntry) -> String {
    match &entry.outcome {
        StepOutcome::Waiting { stuck_count } => format!("waiting ({stuck_count} unknown)"),
        StepOutcome::TargetNotVisible { transition } => format!("{transition}: target not visible"),
        _ => entry.recognized.to_string(),
    }
}
