//! Operator-interaction surface (spec §9 "process-global console used for
//! both logging and user prompts": split into a structured logger and an
//! operator-interaction surface so non-interactive drivers never pull in
//! TTY prompts).
//!
//! The structured side is `tracing`; this module is the other half — the
//! accept/edit/skip decision prompt and colored status lines for
//! interactive `process`/`run` sessions.

use console::style;
use dialoguer::{theme::ColorfulTheme, Input, Select};
use shared::types::{ClassificationRecord, ConfidenceBucket};

/// An operator's verdict on a parked classification.
pub enum OperatorDecision {
    Accept,
    Edit(String),
    Skip,
}

/// Presents classifications and pipeline outcomes to whoever is driving the
/// session. Kept as a trait so `index`, `scan`, and tests never construct
/// the interactive, `dialoguer`-backed implementation.
pub trait OperatorInteraction: Send + Sync {
    fn decide(&self, classification: &ClassificationRecord) -> anyhow::Result<OperatorDecision>;
    fn report_failure(&self, path: &str, message: &str);
    fn report_success(&self, path: &str, destination: &str);
}

/// TTY prompts via `dialoguer`, colored status lines via `console`.
pub struct InteractiveOperator {
    confidence_high: f64,
    confidence_medium: f64,
}

impl InteractiveOperator {
    pub fn new(confidence_high: f64, confidence_medium: f64) -> Self {
        Self { confidence_high, confidence_medium }
    }
}

impl OperatorInteraction for InteractiveOperator {
    fn decide(&self, classification: &ClassificationRecord) -> anyhow::Result<OperatorDecision> {
        let bucket = classification.confidence_bucket(self.confidence_high, self.confidence_medium);
        let bucket_label = match bucket {
            ConfidenceBucket::High => style("high").green(),
            ConfidenceBucket::Medium => style("medium").yellow(),
            ConfidenceBucket::Low => style("low").red(),
        };
        println!(
            "{}  confidence {:.0}% ({bucket_label})  tags: {}",
            style(&classification.suggested_destination).bold(),
            classification.confidence * 100.0,
            classification.suggested_tags.join(", ")
        );
        if !classification.reasoning.is_empty() {
            println!("  {}", style(&classification.reasoning).dim());
        }

        let choice = Select::with_theme(&ColorfulTheme::default())
            .items(&["Accept", "Edit destination", "Skip"])
            .default(0)
            .interact()?;

        match choice {
            0 => Ok(OperatorDecision::Accept),
            1 => {
                let destination: String = Input::with_theme(&ColorfulTheme::default())
                    .with_prompt("New destination")
                    .default(classification.suggested_destination.clone())
                    .interact_text()?;
                Ok(OperatorDecision::Edit(destination))
            }
            _ => Ok(OperatorDecision::Skip),
        }
    }

    fn report_failure(&self, path: &str, message: &str) {
        eprintln!("{} {}: {}", style("failed").red().bold(), path, message);
    }

    fn report_success(&self, path: &str, destination: &str) {
        println!("{} {} -> {}", style("moved").green().bold(), path, destination);
    }
}

/// Auto-accepts every classification (spec §4.11 step 4: "in non-interactive
/// mode, always accept"). Used by `run`, `index`, and anywhere a TTY can't
/// be assumed.
pub struct NonInteractiveOperator;

impl OperatorInteraction for NonInteractiveOperator {
    fn decide(&self, _classification: &ClassificationRecord) -> anyhow::Result<OperatorDecision> {
        Ok(OperatorDecision::Accept)
    }

    fn report_failure(&self, path: &str, message: &str) {
        tracing::warn!(path, message, "processing failed");
    }

    fn report_success(&self, path: &str, destination: &str) {
        tracing::info!(path, destination, "moved");
    }
}
