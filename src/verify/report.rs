//! Verification report: the ordered step results of one run

use super::step::{StepOutcome, StepResult};
use crate::registry::AddressRegistry;
use crate::types::Address;
use chrono::{DateTime, Utc};
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub chain_id: u64,
    pub sender: Address,
    /// Deployment the steps ran against
    pub deployment: IndexMap<String, Address>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// False while the run is in progress or if it was interrupted
    #[serde(default)]
    pub complete: bool,
    pub results: Vec<StepResult>,
    /// Labels whose effect is in place on this deployment, across runs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub executed: Vec<String>,
}

impl VerificationReport {
    /// Empty in-progress report. Steps already executed according to
    /// `previous` stay recorded if it covers the same deployment.
    pub fn begin(
        chain_id: u64,
        sender: Address,
        registry: &AddressRegistry,
        previous: Option<&VerificationReport>,
    ) -> Self {
        let executed = previous
            .filter(|report| report.covers(registry))
            .map(|report| report.executed_labels())
            .unwrap_or_default();
        let now = Utc::now();
        Self {
            chain_id,
            sender,
            deployment: registry.to_map(),
            started_at: now,
            finished_at: now,
            complete: false,
            results: Vec::new(),
            executed,
        }
    }

    /// Append one step result
    pub fn record(&mut self, result: StepResult) {
        if result.is_done() && !self.executed.contains(&result.label) {
            self.executed.push(result.label.clone());
        }
        self.finished_at = Utc::now();
        self.results.push(result);
    }

    pub fn finish(&mut self) {
        self.finished_at = Utc::now();
        self.complete = true;
    }

    fn executed_labels(&self) -> Vec<String> {
        let mut labels = self.executed.clone();
        for result in self.results.iter().filter(|r| r.is_done()) {
            if !labels.contains(&result.label) {
                labels.push(result.label.clone());
            }
        }
        labels
    }

    /// No step failed
    pub fn passed(&self) -> bool {
        self.failed_count() == 0
    }

    pub fn count(&self, outcome: StepOutcome) -> usize {
        self.results.iter().filter(|r| r.outcome == outcome).count()
    }

    pub fn failed_count(&self) -> usize {
        self.count(StepOutcome::Failed)
    }

    /// Whether `label`'s effect was recorded as done in this report
    pub fn succeeded(&self, label: &str) -> bool {
        self.executed.iter().any(|l| l == label)
            || self
                .results
                .iter()
                .any(|r| r.label == label && r.is_done())
    }

    /// Whether this report was produced against `registry`'s deployment
    pub fn covers(&self, registry: &AddressRegistry) -> bool {
        self.deployment == registry.to_map()
    }

    /// Pass/fail table keyed by step label
    pub fn render_table(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_header(vec!["Step", "Outcome", "Detail"]);

        for result in &self.results {
            let (color, detail) = match result.outcome {
                StepOutcome::Success => (
                    Color::Green,
                    result
                        .transaction_hash
                        .map(|h| h.to_string())
                        .or_else(|| result.detail.as_ref().map(|d| d.to_string()))
                        .unwrap_or_default(),
                ),
                StepOutcome::Skipped => (
                    Color::Yellow,
                    match &result.detail {
                        Some(detail) => format!("already satisfied: {}", detail),
                        None => "already executed".to_string(),
                    },
                ),
                StepOutcome::Failed => (Color::Red, result.error.clone().unwrap_or_default()),
            };
            table.add_row(vec![
                Cell::new(&result.label),
                Cell::new(result.outcome).fg(color),
                Cell::new(detail),
            ]);
        }
        table.to_string()
    }
}
