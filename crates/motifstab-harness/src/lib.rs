//! File-level pipeline stages for motifstab.
//!
//! Each stage reads CSV inputs, runs the corresponding `motifstab-core`
//! computation and writes:
//! - deterministic CSV tables in the output directory
//! - a markdown + JSON stage report
//! - a JSONL structured log of the run
//! - `artifact_index.json` with SHA-256 digests of everything written

#![forbid(unsafe_code)]

pub mod agreement_run;
pub mod any_cover_run;
pub mod artifacts;
pub mod columns;
pub mod consensus_run;
pub mod context;
pub mod error;
pub mod metrics_run;
pub mod motif_threshold_run;
pub mod permutations;
pub mod report;
pub mod stability_run;
pub mod structured_log;
pub mod table;

pub use artifacts::ArtifactIndex;
pub use context::StageContext;
pub use error::HarnessError;
pub use report::StageReport;
pub use structured_log::{LogEmitter, LogEntry, LogLevel, Outcome, Stage};
pub use table::{Table, TableError, TableWriter};
