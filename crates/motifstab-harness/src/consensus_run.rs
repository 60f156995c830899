//! `consensus` stage: merge clustering runs into consensus motif groups.
//!
//! Input is a folder of `cluster_members_run_<n>.csv` files, one per run,
//! each with rows `cluster_id,perm_index[,perm]`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use motifstab_core::consensus::{ConsensusGroup, event_position_stats, perm_strings_by_index};
use motifstab_core::{ClusterRecord, ConsensusBuild, ConsensusConfig, RunId, build_consensus};

use crate::context::StageContext;
use crate::error::HarnessError;
use crate::report::StageReport;
use crate::table::{Table, TableWriter, format_f64};

pub const RUN_FILE_PREFIX: &str = "cluster_members_run_";
pub const RUN_FILE_PATTERN: &str = "cluster_members_run_*.csv";

pub const CONSENSUS_FILE: &str = "consensus_motifs.csv";
pub const SUMMARY_FILE: &str = "motif_stability_summary.csv";
pub const POSITIONS_FILE: &str = "consensus_event_positions.csv";
pub const DEBUG_PAIRS_FILE: &str = "debug_cluster_pairs.csv";

#[derive(Debug, Clone)]
pub struct ConsensusStageConfig {
    pub kw_folder: PathBuf,
    pub consensus: ConsensusConfig,
    pub write_debug: bool,
}

/// Run membership files in `dir`, sorted by file name.
pub fn find_run_files(dir: &Path) -> Result<Vec<PathBuf>, HarnessError> {
    if !dir.is_dir() {
        return Err(HarnessError::MissingInput(dir.to_path_buf()));
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| HarnessError::io(dir, e))? {
        let entry = entry.map_err(|e| HarnessError::io(dir, e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(RUN_FILE_PREFIX) && name.ends_with(".csv") {
            files.push(entry.path());
        }
    }
    if files.is_empty() {
        return Err(HarnessError::NoInputFiles {
            dir: dir.to_path_buf(),
            pattern: RUN_FILE_PATTERN,
        });
    }
    files.sort();
    Ok(files)
}

/// Membership rows of one run table, keyed into `grouped` by `(run, cluster)`.
///
/// The first two columns must be integers; a third non-empty column is taken
/// as the permutation's token string. Rows wider than the header are fatal.
pub fn collect_run(
    table: &Table,
    run_id: &RunId,
    grouped: &mut BTreeMap<(RunId, i64), ClusterRecord>,
) -> Result<usize, HarnessError> {
    table.require_exact_width()?;
    let mut count = 0;
    for record in table.rows() {
        let cluster_id = parse_int::<i64>(table, record.line, record.get(0), "cluster_id")?;
        let perm_index = parse_int::<u64>(table, record.line, record.get(1), "perm_index")?;
        let cluster = grouped
            .entry((run_id.clone(), cluster_id))
            .or_insert_with(|| ClusterRecord::new(run_id.clone(), cluster_id, std::iter::empty()));
        cluster.members.insert(perm_index);
        let perm = record.get(2);
        if !perm.is_empty() {
            cluster.perm_strings.insert(perm_index, perm.to_string());
        }
        count += 1;
    }
    Ok(count)
}

fn parse_int<T: std::str::FromStr>(
    table: &Table,
    line: usize,
    cell: &str,
    what: &str,
) -> Result<T, HarnessError> {
    cell.trim().parse::<T>().map_err(|_| HarnessError::MalformedRow {
        origin: table.origin().to_string(),
        line,
        message: format!("{what} {cell:?} is not an integer"),
    })
}

/// Load every run in `dir` as clusters ordered by `(run, cluster)`.
pub fn load_clusters(dir: &Path) -> Result<(Vec<ClusterRecord>, usize), HarnessError> {
    let mut grouped = BTreeMap::new();
    let mut rows = 0;
    for path in find_run_files(dir)? {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let run_id = RunId::from_file_stem(&stem);
        let table = Table::read(&path)?;
        rows += collect_run(&table, &run_id, &mut grouped)?;
    }
    Ok((grouped.into_values().collect(), rows))
}

fn join<T: ToString>(items: impl IntoIterator<Item = T>) -> String {
    items
        .into_iter()
        .map(|x| x.to_string())
        .collect::<Vec<_>>()
        .join(";")
}

#[must_use]
pub fn consensus_table(groups: &[ConsensusGroup]) -> String {
    let mut w = TableWriter::new(&[
        "consensus_id",
        "n_member_clusters",
        "fragmentation",
        "mean_pairwise_jaccard",
        "n_consensus_perms",
        "member_clusters",
        "consensus_perms",
    ]);
    for g in groups {
        w.push_row([
            g.consensus_id.to_string(),
            g.n_member_clusters().to_string(),
            g.fragmentation().to_string(),
            format_f64(g.mean_pairwise_jaccard),
            g.consensus_perms.len().to_string(),
            g.member_clusters.join(";"),
            join(&g.consensus_perms),
        ]);
    }
    w.finish()
}

#[must_use]
pub fn summary_table(groups: &[ConsensusGroup]) -> String {
    let mut w = TableWriter::new(&[
        "consensus_id",
        "n_member_clusters",
        "fragmentation",
        "mean_pairwise_jaccard",
        "n_consensus_perms",
    ]);
    for g in groups {
        w.push_row([
            g.consensus_id.to_string(),
            g.n_member_clusters().to_string(),
            g.fragmentation().to_string(),
            format_f64(g.mean_pairwise_jaccard),
            g.consensus_perms.len().to_string(),
        ]);
    }
    w.finish()
}

/// Event positions per group. Groups whose consensus permutations lack token
/// strings are left out and returned as the second element.
#[must_use]
pub fn positions_table(groups: &[ConsensusGroup], clusters: &[ClusterRecord]) -> (String, Vec<usize>) {
    let strings = perm_strings_by_index(clusters);
    let mut w = TableWriter::new(&["consensus_id", "event_id", "mean_normalized_position"]);
    let mut missing = Vec::new();
    for g in groups {
        match event_position_stats(&g.consensus_perms, &strings) {
            Some(stats) => {
                for (event, mean) in stats {
                    w.push_row([g.consensus_id.to_string(), event.to_string(), format_f64(mean)]);
                }
            }
            None => missing.push(g.consensus_id),
        }
    }
    (w.finish(), missing)
}

#[must_use]
pub fn debug_pairs_table(build: &ConsensusBuild, clusters: &[ClusterRecord]) -> String {
    let mut w = TableWriter::new(&["i", "j", "run_i", "cluster_i", "run_j", "cluster_j", "jaccard"]);
    for p in &build.pairs {
        let (a, b) = (&clusters[p.i], &clusters[p.j]);
        w.push_row([
            p.i.to_string(),
            p.j.to_string(),
            a.run_id.to_string(),
            a.cluster_id.to_string(),
            b.run_id.to_string(),
            b.cluster_id.to_string(),
            format_f64(p.jaccard),
        ]);
    }
    w.finish()
}

pub fn run(config: &ConsensusStageConfig, ctx: &mut StageContext) -> Result<StageReport, HarnessError> {
    let (clusters, member_rows) = load_clusters(&config.kw_folder)?;

    let build = build_consensus(&clusters, &config.consensus);

    if config.write_debug {
        ctx.write_artifact(DEBUG_PAIRS_FILE, "debug", &debug_pairs_table(&build, &clusters))?;
    }
    ctx.write_artifact(CONSENSUS_FILE, "table", &consensus_table(&build.groups))?;
    ctx.write_artifact(SUMMARY_FILE, "table", &summary_table(&build.groups))?;

    let (positions, missing) = positions_table(&build.groups, &clusters);
    ctx.write_artifact(POSITIONS_FILE, "table", &positions)?;
    let folder = config.kw_folder.display().to_string();
    for id in &missing {
        let id = *id;
        ctx.log(crate::structured_log::LogLevel::Warn, "positions_unavailable", |e| {
            e.with_input(folder.as_str())
                .with_details(serde_json::json!({ "consensus_id": id }))
        })?;
    }

    ctx.record_counts(member_rows, 0);
    let runs: std::collections::BTreeSet<&RunId> = clusters.iter().map(|c| &c.run_id).collect();
    let singletons = build.groups.iter().filter(|g| g.n_member_clusters() == 1).count();
    let mut report = StageReport::new("Cross-run consensus", ctx.stage().as_str());
    report
        .metric("kw_folder", &folder)
        .metric("runs", runs.len())
        .metric("clusters", clusters.len())
        .metric("membership_rows", member_rows)
        .metric("jaccard_threshold", format_f64(config.consensus.jaccard_threshold()))
        .metric("consensus_fraction", format_f64(config.consensus.consensus_fraction()))
        .metric("consensus_groups", build.groups.len())
        .metric("singleton_groups", singletons);
    if !missing.is_empty() {
        report.note(format!(
            "{} group(s) had consensus permutations without token strings; no event positions written for them",
            missing.len()
        ));
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::TableError;

    fn collect(texts: &[(&str, &str)]) -> Vec<ClusterRecord> {
        let mut grouped = BTreeMap::new();
        for (stem, text) in texts {
            let t = Table::parse(text, *stem).unwrap();
            collect_run(&t, &RunId::from_file_stem(stem), &mut grouped).unwrap();
        }
        grouped.into_values().collect()
    }

    #[test]
    fn groups_rows_by_run_and_cluster() {
        let clusters = collect(&[
            ("cluster_members_run_2", "cluster_id,perm_index,perm\n0,1,1;2\n0,2,2;1\n1,5,\n"),
            ("cluster_members_run_10", "cluster_id,perm_index\n3,7\n"),
        ]);
        assert_eq!(clusters.len(), 3);
        assert_eq!(clusters[0].label(), "2-0");
        assert_eq!(clusters[0].members.len(), 2);
        assert_eq!(clusters[0].perm_strings[&2], "2;1");
        assert!(clusters[1].perm_strings.is_empty());
        assert_eq!(clusters[2].label(), "10-3");
    }

    #[test]
    fn non_integer_membership_is_fatal() {
        let t = Table::parse("cluster_id,perm_index\nA,1\n", "run").unwrap();
        let mut grouped = BTreeMap::new();
        let err = collect_run(&t, &RunId::Numbered(1), &mut grouped).unwrap_err();
        assert!(matches!(err, HarnessError::MalformedRow { line: 2, .. }));
    }

    #[test]
    fn wide_membership_row_is_fatal() {
        let t = Table::parse("cluster_id,perm_index
0,1
0,2,3 1 2
", "run").unwrap();
        let mut grouped = BTreeMap::new();
        let err = collect_run(&t, &RunId::Numbered(1), &mut grouped).unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Table(TableError::TooManyFields { line: 3, found: 3, expected: 2, .. })
        ));
        assert!(grouped.is_empty());
    }

    #[test]
    fn tables_for_two_run_merge() {
        let clusters = collect(&[
            ("cluster_members_run_1", "cluster_id,perm_index\n0,1\n0,2\n0,3\n0,4\n"),
            ("cluster_members_run_2", "cluster_id,perm_index\n0,1\n0,2\n0,3\n0,5\n"),
        ]);
        let build = build_consensus(&clusters, &ConsensusConfig::new(0.5, 0.5).unwrap());
        let t = Table::parse(&consensus_table(&build.groups), "out").unwrap();
        assert_eq!(t.len(), 1);
        let row = &t.rows()[0];
        assert_eq!(row.get(1), "2");
        assert_eq!(row.get(2), "2");
        assert_eq!(row.get(3), "0.6");
        assert_eq!(row.get(5), "1-0;2-0");
        assert_eq!(row.get(6), "1;2;3;4;5");

        let (positions, missing) = positions_table(&build.groups, &clusters);
        assert_eq!(missing, vec![0]);
        assert_eq!(Table::parse(&positions, "pos").unwrap().len(), 0);

        let pairs = Table::parse(&debug_pairs_table(&build, &clusters), "dbg").unwrap();
        assert_eq!(pairs.rows()[0].fields(), ["0", "1", "1", "0", "2", "0", "0.6"]);
    }

    #[test]
    fn positions_use_member_token_strings() {
        let clusters = collect(&[(
            "cluster_members_run_1",
            "cluster_id,perm_index,perm\n0,1,1;2;3\n0,2,3;2;1\n",
        )]);
        let build = build_consensus(&clusters, &ConsensusConfig::new(0.5, 0.5).unwrap());
        let (positions, missing) = positions_table(&build.groups, &clusters);
        assert!(missing.is_empty());
        let t = Table::parse(&positions, "pos").unwrap();
        assert_eq!(t.len(), 3);
        assert!(t.rows().iter().all(|r| r.get(2) == "0.5"));
    }
}
