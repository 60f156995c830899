//! Per-stage run context: output directory, JSONL log, and artifact index.
//!
//! A stage writes every output through [`StageContext::write_artifact`], so
//! the index always matches what is on disk. [`StageContext::finish`] writes
//! the report, closes the log and writes `artifact_index.json` last.

use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::artifacts::{ArtifactIndex, INDEX_FILE_NAME};
use crate::error::HarnessError;
use crate::report::StageReport;
use crate::structured_log::{LogEmitter, LogEntry, LogLevel, Outcome, Stage};
use crate::table::OverlongRow;

pub const LOG_FILE_NAME: &str = "motifstab.log.jsonl";

pub struct StageContext {
    stage: Stage,
    outdir: PathBuf,
    log_path: PathBuf,
    log: LogEmitter,
    index: ArtifactIndex,
    warnings: u64,
    rows: u64,
    skipped: u64,
    started: Instant,
}

impl StageContext {
    /// Create `outdir` if needed, open its log and emit `stage_start`.
    pub fn open(stage: Stage, outdir: &Path, run_id: &str) -> Result<Self, HarnessError> {
        std::fs::create_dir_all(outdir).map_err(|e| HarnessError::io(outdir, e))?;
        let run_id = sanitize_run_id(run_id);
        let log_path = outdir.join(LOG_FILE_NAME);
        let log =
            LogEmitter::to_file(&log_path, stage, &run_id).map_err(|e| HarnessError::io(&log_path, e))?;
        let mut ctx = Self {
            stage,
            outdir: outdir.to_path_buf(),
            log_path,
            log,
            index: ArtifactIndex::new(run_id, stage.as_str()),
            warnings: 0,
            rows: 0,
            skipped: 0,
            started: Instant::now(),
        };
        ctx.log(LogLevel::Info, "stage_start", |e| {
            e.with_details(serde_json::json!({ "outdir": outdir.display().to_string() }))
        })?;
        Ok(ctx)
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    #[must_use]
    pub fn outdir(&self) -> &Path {
        &self.outdir
    }

    #[must_use]
    pub fn warnings(&self) -> u64 {
        self.warnings
    }

    /// Rows read and rows skipped, reported on `stage_end`.
    pub fn record_counts(&mut self, rows: usize, skipped: usize) {
        self.rows = rows as u64;
        self.skipped = skipped as u64;
    }

    /// Emit one entry, letting `build` fill in optional fields.
    pub fn log(
        &mut self,
        level: LogLevel,
        event: &str,
        build: impl FnOnce(LogEntry) -> LogEntry,
    ) -> Result<(), HarnessError> {
        if level == LogLevel::Warn {
            self.warnings += 1;
        }
        let entry = build(self.log.entry(level, event));
        self.log
            .emit_entry(entry)
            .map_err(|e| HarnessError::io(&self.log_path, e))
    }

    /// Log a tolerated row-level problem.
    pub fn warn_row(
        &mut self,
        event: &str,
        input: &str,
        line: usize,
        reason: impl Into<String>,
    ) -> Result<(), HarnessError> {
        let reason = reason.into();
        self.log(LogLevel::Warn, event, |e| {
            e.with_input(input)
                .with_line(line)
                .with_details(serde_json::json!({ "reason": reason }))
        })
    }

    /// Log one `extra_fields` warning per row that was cut to the header width.
    pub fn warn_overlong(&mut self, input: &str, rows: &[OverlongRow]) -> Result<(), HarnessError> {
        for row in rows {
            self.warn_row(
                "extra_fields",
                input,
                row.line,
                format!(
                    "{} fields but the header has {}; extra fields dropped",
                    row.found, row.expected
                ),
            )?;
        }
        Ok(())
    }

    /// Write `contents` to `file_name` under the output directory and index it.
    pub fn write_artifact(
        &mut self,
        file_name: &str,
        kind: &str,
        contents: &str,
    ) -> Result<PathBuf, HarnessError> {
        let path = self.outdir.join(file_name);
        std::fs::write(&path, contents).map_err(|e| HarnessError::io(&path, e))?;
        self.index.add(file_name, kind, contents.as_bytes());
        self.log(LogLevel::Debug, "artifact_written", |e| {
            e.with_artifacts(vec![file_name.to_string()])
        })?;
        Ok(path)
    }

    /// Write the report, emit `stage_end`, and write the artifact index.
    pub fn finish(mut self, report: &StageReport) -> Result<ArtifactIndex, HarnessError> {
        let prefix = self.stage.as_str().replace('-', "_");
        self.write_artifact(&format!("{prefix}_report.md"), "report", &report.to_markdown())?;
        self.write_artifact(&format!("{prefix}_report.json"), "report", &report.to_json())?;

        let outcome = if self.warnings == 0 {
            Outcome::Pass
        } else {
            Outcome::Degraded
        };
        let refs = self.index.artifacts.iter().map(|a| a.path.clone()).collect();
        let (rows, skipped) = (self.rows, self.skipped);
        let duration_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.log(LogLevel::Info, "stage_end", |e| {
            e.with_outcome(outcome)
                .with_counts(rows, skipped)
                .with_duration_ms(duration_ms)
                .with_artifacts(refs)
        })?;
        self.log
            .flush()
            .map_err(|e| HarnessError::io(&self.log_path, e))?;

        let log_bytes = std::fs::read(&self.log_path).map_err(|e| HarnessError::io(&self.log_path, e))?;
        self.index.add(LOG_FILE_NAME, "log", &log_bytes);

        let index_path = self.outdir.join(INDEX_FILE_NAME);
        std::fs::write(&index_path, self.index.to_json()?)
            .map_err(|e| HarnessError::io(&index_path, e))?;
        Ok(self.index)
    }

    /// Record a fatal error as `stage_end` with outcome `fail`. No index is written.
    pub fn fail(mut self, error: &HarnessError) -> Result<(), HarnessError> {
        let message = error.to_string();
        let (rows, skipped) = (self.rows, self.skipped);
        self.log(LogLevel::Error, "stage_end", |e| {
            e.with_outcome(Outcome::Fail)
                .with_counts(rows, skipped)
                .with_details(serde_json::json!({ "error": message }))
        })?;
        self.log
            .flush()
            .map_err(|e| HarnessError::io(&self.log_path, e))
    }
}

/// Trace ids use `::` as a separator, so it cannot appear inside a run id.
fn sanitize_run_id(raw: &str) -> String {
    let cleaned = raw.trim().replace(':', "-");
    if cleaned.is_empty() {
        "run".to_string()
    } else {
        cleaned
    }
}

/// Default run id derived from the wall clock.
#[must_use]
pub fn default_run_id() -> String {
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("run-{millis}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_never_contain_separator() {
        assert_eq!(sanitize_run_id("a::b"), "a--b");
        assert_eq!(sanitize_run_id("  "), "run");
        assert!(default_run_id().starts_with("run-"));
    }
}
