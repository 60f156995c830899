//! Integration test: structured log and artifact index written by a stage.
//!
//! Validates that:
//! 1. Every line of the stage log passes schema validation.
//! 2. The log carries stage_start, per-row warnings, and a stage_end with an outcome.
//! 3. Artifact digests match the bytes on disk.
//! 4. A failed stage still leaves a valid log ending in outcome `fail`.
//!
//! Run: cargo test -p motifstab-harness --test log_artifact_test

use std::path::PathBuf;

use motifstab_core::StabilityConfig;
use motifstab_harness::artifacts::{ArtifactIndex, INDEX_FILE_NAME, sha256_hex};
use motifstab_harness::context::LOG_FILE_NAME;
use motifstab_harness::permutations::PermColumns;
use motifstab_harness::stability_run::{self, StabilityStageConfig};
use motifstab_harness::structured_log::validate_log_file;
use motifstab_harness::{Stage, StageContext};

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("motifstab-log-{}-{name}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn log_lines(dir: &std::path::Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(dir.join(LOG_FILE_NAME))
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[test]
fn degraded_stage_log_and_index() {
    let dir = scratch("degraded");
    let input = dir.join("perms.csv");
    std::fs::write(
        &input,
        "motif,perm\nFrontEndMove,3 1 2 4 5 6 7 8 9 10 11 12\nbroken,no tokens here\n",
    )
    .unwrap();

    let mut ctx = StageContext::open(Stage::Stability, &dir, "log-check").unwrap();
    let config = StabilityStageConfig {
        input,
        columns: PermColumns::default(),
        stability: StabilityConfig::new(10, 3).unwrap(),
        unstable_threshold: 0.4,
    };
    let report = stability_run::run(&config, &mut ctx).unwrap();
    ctx.finish(&report).unwrap();

    let (count, errors) = validate_log_file(&dir.join(LOG_FILE_NAME)).unwrap();
    assert!(errors.is_empty(), "log errors: {errors:?}");

    let lines = log_lines(&dir);
    assert_eq!(lines.len(), count);
    assert_eq!(lines[0]["event"], "stage_start");
    assert_eq!(lines[0]["trace_id"], "stability::log-check::001");

    let warn = lines
        .iter()
        .find(|l| l["event"] == "no_event_tokens")
        .expect("warning for the unparseable row");
    assert_eq!(warn["level"], "warn");
    assert_eq!(warn["line"], 3);

    let end = lines.last().unwrap();
    assert_eq!(end["event"], "stage_end");
    assert_eq!(end["outcome"], "degraded");
    assert_eq!(end["rows"], 2);
    assert_eq!(end["skipped"], 1);

    let index = ArtifactIndex::from_file(&dir.join(INDEX_FILE_NAME)).unwrap();
    assert_eq!(index.run_id, "log-check");
    assert_eq!(index.stage, "stability");
    for entry in &index.artifacts {
        let bytes = std::fs::read(dir.join(&entry.path)).unwrap();
        assert_eq!(entry.sha256, sha256_hex(&bytes), "digest of {}", entry.path);
        assert_eq!(entry.size_bytes, bytes.len() as u64);
    }
    assert!(index.get(LOG_FILE_NAME).is_some());
    assert!(index.get("stability_report.json").is_some());
}

#[test]
fn failed_stage_still_logs_outcome() {
    let dir = scratch("failed");
    let mut ctx = StageContext::open(Stage::Stability, &dir, "fail-check").unwrap();
    let config = StabilityStageConfig {
        input: dir.join("missing.csv"),
        columns: PermColumns::default(),
        stability: StabilityConfig::default(),
        unstable_threshold: 0.4,
    };
    let err = stability_run::run(&config, &mut ctx).unwrap_err();
    ctx.fail(&err).unwrap();

    let (_, errors) = validate_log_file(&dir.join(LOG_FILE_NAME)).unwrap();
    assert!(errors.is_empty(), "log errors: {errors:?}");
    let lines = log_lines(&dir);
    let end = lines.last().unwrap();
    assert_eq!(end["outcome"], "fail");
    assert_eq!(end["level"], "error");
    assert!(!dir.join(INDEX_FILE_NAME).exists());
}
