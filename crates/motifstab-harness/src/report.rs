//! Human-readable and machine-readable stage reports.

use serde::{Deserialize, Serialize};

/// One named value in a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetric {
    pub name: String,
    pub value: String,
}

/// End-of-stage summary written next to the stage outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub title: String,
    pub stage: String,
    pub timestamp: String,
    pub metrics: Vec<ReportMetric>,
    /// Soft degradations worth a reader's attention.
    pub notes: Vec<String>,
}

impl StageReport {
    #[must_use]
    pub fn new(title: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            stage: stage.into(),
            timestamp: crate::structured_log::now_utc(),
            metrics: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn metric(&mut self, name: impl Into<String>, value: impl ToString) -> &mut Self {
        self.metrics.push(ReportMetric {
            name: name.into(),
            value: value.to_string(),
        });
        self
    }

    pub fn note(&mut self, note: impl Into<String>) -> &mut Self {
        self.notes.push(note.into());
        self
    }

    #[must_use]
    pub fn value(&self, name: &str) -> Option<&str> {
        self.metrics
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.value.as_str())
    }

    /// Render the report as markdown.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# {}\n\n", self.title));
        out.push_str(&format!("- Stage: {}\n", self.stage));
        out.push_str(&format!("- Timestamp: {}\n\n", self.timestamp));

        out.push_str("| Metric | Value |\n");
        out.push_str("|--------|-------|\n");
        for m in &self.metrics {
            out.push_str(&format!("| {} | {} |\n", m.name, m.value));
        }
        if !self.notes.is_empty() {
            out.push_str("\n## Notes\n\n");
            for n in &self.notes {
                out.push_str(&format!("- {n}\n"));
            }
        }
        out
    }

    /// Render the report as JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }
}
