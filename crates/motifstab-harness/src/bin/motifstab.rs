//! CLI entrypoint for the motifstab pipelines.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use motifstab_core::config::{
    DEFAULT_CONSENSUS_FRACTION, DEFAULT_DISPLACEMENT_EXPONENT, DEFAULT_DISPLACEMENT_SCALE,
    DEFAULT_JACCARD_THRESHOLD, DEFAULT_SAMPLES,
};
use motifstab_core::{ConsensusConfig, MetricsConfig, StabilityConfig};
use motifstab_harness::agreement_run::{self, AgreementColumns, AgreementStageConfig, LabelingSource};
use motifstab_harness::any_cover_run::{self, AnyCoverStageConfig};
use motifstab_harness::consensus_run::{self, ConsensusStageConfig};
use motifstab_harness::context::default_run_id;
use motifstab_harness::metrics_run::{self, MetricsStageConfig};
use motifstab_harness::motif_threshold_run::{self, MotifThresholdConfig};
use motifstab_harness::permutations::PermColumns;
use motifstab_harness::stability_run::{self, DEFAULT_UNSTABLE_THRESHOLD, StabilityStageConfig};
use motifstab_harness::structured_log::validate_log_file;
use motifstab_harness::{HarnessError, Stage, StageContext, StageReport};

/// Stability and agreement analysis of permutation motif labels.
#[derive(Debug, Parser)]
#[command(name = "motifstab")]
#[command(about = "Check-order stability, consensus, and agreement of permutation motif labels")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct OutputArgs {
    /// Output directory for tables, reports, log, and artifact index.
    #[arg(long)]
    outdir: Option<PathBuf>,
    /// Run identifier used in trace ids (defaults to a wall-clock id).
    #[arg(long)]
    run_id: Option<String>,
}

#[derive(Debug, Args)]
struct PermArgs {
    /// Permutation table.
    #[arg(long)]
    input: PathBuf,
    /// Column holding the original motif label.
    #[arg(long)]
    motif_column: Option<String>,
    /// Column holding permutation tokens.
    #[arg(long)]
    perm_column: Option<String>,
}

impl PermArgs {
    fn columns(&self) -> PermColumns {
        PermColumns {
            motif: self.motif_column.clone(),
            perm: self.perm_column.clone(),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Label every permutation and estimate its check-order stability.
    Stability {
        #[command(flatten)]
        perms: PermArgs,
        /// Random check-orders drawn per permutation.
        #[arg(long, default_value_t = DEFAULT_SAMPLES)]
        samples: usize,
        /// Root seed; each permutation draws from its own stream.
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Stability below this counts as unstable in the summary.
        #[arg(long, default_value_t = DEFAULT_UNSTABLE_THRESHOLD)]
        unstable_threshold: f64,
        #[command(flatten)]
        out: OutputArgs,
    },
    /// Order-invariant labels, label counts, and violated-cover counts.
    AnyCover {
        #[command(flatten)]
        perms: PermArgs,
        #[command(flatten)]
        out: OutputArgs,
    },
    /// Merge clustering runs into consensus groups.
    Consensus {
        /// Folder of cluster_members_run_*.csv files (also the default outdir).
        #[arg(long)]
        kw_folder: PathBuf,
        /// Jaccard similarity needed to link two clusters.
        #[arg(long, default_value_t = DEFAULT_JACCARD_THRESHOLD)]
        jaccard_threshold: f64,
        /// Fraction of member clusters a permutation must appear in.
        #[arg(long, default_value_t = DEFAULT_CONSENSUS_FRACTION)]
        consensus_fraction: f64,
        /// Also write the Jaccard of every cluster pair.
        #[arg(long)]
        write_debug: bool,
        #[command(flatten)]
        out: OutputArgs,
    },
    /// Compare the canonical labels with independent cluster labelings.
    Agreement {
        /// Canonical per-permutation table (required).
        #[arg(long)]
        canonical: PathBuf,
        /// Independent labeling as NAME=PATH; repeatable.
        #[arg(long = "labeling")]
        labelings: Vec<String>,
        #[arg(long)]
        index_column: Option<String>,
        #[arg(long)]
        label_column: Option<String>,
        #[arg(long)]
        cluster_column: Option<String>,
        #[arg(long)]
        stability_column: Option<String>,
        #[command(flatten)]
        out: OutputArgs,
    },
    /// Count rows below a stability threshold per motif.
    StabilityByMotif {
        /// Merged sensitivity table.
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        motif_column: Option<String>,
        #[arg(long)]
        stability_column: Option<String>,
        #[arg(long, default_value_t = DEFAULT_UNSTABLE_THRESHOLD)]
        threshold: f64,
        #[command(flatten)]
        out: OutputArgs,
    },
    /// Distance-from-canonical metrics for complete permutations.
    Metrics {
        /// Table with pos_* columns or a permutation token column.
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        perm_column: Option<String>,
        /// Headerless before,after cover file (chain covers when absent).
        #[arg(long)]
        covers: Option<PathBuf>,
        /// Exponent on each element's displacement.
        #[arg(long, default_value_t = DEFAULT_DISPLACEMENT_EXPONENT)]
        kappa: f64,
        /// Quadratic scale on the summed displacement.
        #[arg(long, default_value_t = DEFAULT_DISPLACEMENT_SCALE)]
        alpha: f64,
        #[command(flatten)]
        out: OutputArgs,
    },
    /// Validate a JSONL log file against the log schema.
    ValidateLog {
        /// Path to the JSONL log.
        #[arg(long)]
        log: PathBuf,
    },
}

/// Open the stage context, run `body`, and close the context either way.
fn execute(
    stage: Stage,
    out: &OutputArgs,
    default_outdir: &Path,
    body: impl FnOnce(&mut StageContext) -> Result<StageReport, HarnessError>,
) -> Result<(), Box<dyn std::error::Error>> {
    let outdir = out.outdir.clone().unwrap_or_else(|| default_outdir.to_path_buf());
    let run_id = out.run_id.clone().unwrap_or_else(default_run_id);
    eprintln!("[{}] writing to {}", stage.as_str(), outdir.display());

    let mut ctx = StageContext::open(stage, &outdir, &run_id)?;
    match body(&mut ctx) {
        Ok(report) => {
            let index = ctx.finish(&report)?;
            for m in &report.metrics {
                eprintln!("  {}: {}", m.name, m.value);
            }
            for n in &report.notes {
                eprintln!("  note: {n}");
            }
            eprintln!(
                "[{}] wrote {} artifacts to {}",
                stage.as_str(),
                index.artifacts.len(),
                outdir.display()
            );
            Ok(())
        }
        Err(err) => {
            if let Err(log_err) = ctx.fail(&err) {
                eprintln!("could not record failure in log: {log_err}");
            }
            Err(err.into())
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let cwd = PathBuf::from(".");

    match cli.command {
        Command::Stability {
            perms,
            samples,
            seed,
            unstable_threshold,
            out,
        } => {
            let config = StabilityStageConfig {
                input: perms.input.clone(),
                columns: perms.columns(),
                stability: StabilityConfig::new(samples, seed)?,
                unstable_threshold,
            };
            execute(Stage::Stability, &out, &cwd, |ctx| stability_run::run(&config, ctx))?;
        }
        Command::AnyCover { perms, out } => {
            let config = AnyCoverStageConfig {
                input: perms.input.clone(),
                columns: perms.columns(),
            };
            execute(Stage::AnyCover, &out, &cwd, |ctx| any_cover_run::run(&config, ctx))?;
        }
        Command::Consensus {
            kw_folder,
            jaccard_threshold,
            consensus_fraction,
            write_debug,
            out,
        } => {
            let config = ConsensusStageConfig {
                consensus: ConsensusConfig::new(jaccard_threshold, consensus_fraction)?,
                kw_folder,
                write_debug,
            };
            execute(Stage::Consensus, &out, &config.kw_folder, |ctx| {
                consensus_run::run(&config, ctx)
            })?;
        }
        Command::Agreement {
            canonical,
            labelings,
            index_column,
            label_column,
            cluster_column,
            stability_column,
            out,
        } => {
            let labelings = labelings
                .iter()
                .map(|raw| LabelingSource::parse(raw))
                .collect::<Result<Vec<_>, _>>()?;
            let config = AgreementStageConfig {
                canonical,
                labelings,
                columns: AgreementColumns {
                    index: index_column,
                    label: label_column,
                    cluster: cluster_column,
                    stability: stability_column,
                },
            };
            execute(Stage::Agreement, &out, &cwd, |ctx| agreement_run::run(&config, ctx))?;
        }
        Command::StabilityByMotif {
            input,
            motif_column,
            stability_column,
            threshold,
            out,
        } => {
            let config = MotifThresholdConfig {
                input,
                motif_column,
                stability_column,
                threshold,
            };
            execute(Stage::StabilityByMotif, &out, &cwd, |ctx| {
                motif_threshold_run::run(&config, ctx)
            })?;
        }
        Command::Metrics {
            input,
            perm_column,
            covers,
            kappa,
            alpha,
            out,
        } => {
            let config = MetricsStageConfig {
                input,
                perm_column,
                covers,
                metrics: MetricsConfig::new(kappa, alpha)?,
            };
            execute(Stage::Metrics, &out, &cwd, |ctx| metrics_run::run(&config, ctx))?;
        }
        Command::ValidateLog { log } => {
            let (lines, errors) = validate_log_file(&log)?;
            if errors.is_empty() {
                eprintln!("{}: {lines} lines, all valid", log.display());
            } else {
                for e in &errors {
                    eprintln!("{e}");
                }
                return Err(format!(
                    "{}: {} validation error(s) in {lines} lines",
                    log.display(),
                    errors.len()
                )
                .into());
            }
        }
    }

    Ok(())
}
