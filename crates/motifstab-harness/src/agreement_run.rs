//! `agreement` stage: compare the canonical labeling with independent
//! cluster labelings after majority-vote relabeling.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use motifstab_core::agreement::{iqr, median, per_motif_preservation};
use motifstab_core::{AgreementStats, LabelMapping, MotifPreservation};

use crate::columns::{
    find_cluster_column, find_index_column, find_label_column, find_stability_column, resolve,
};
use crate::context::StageContext;
use crate::error::HarnessError;
use crate::report::StageReport;
use crate::table::{NA, OverlongRow, Table, TableWriter, format_f64, format_opt, parse_f64};

pub const SUMMARY_FILE: &str = "segmentation_agreement_mapped.csv";
pub const LABEL_TABLE_FILE: &str = "permutation_label_table.csv";

/// One independent labeling, `NAME=PATH` on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelingSource {
    pub name: String,
    pub path: PathBuf,
}

impl LabelingSource {
    pub fn parse(raw: &str) -> Result<Self, HarnessError> {
        let (name, path) = raw
            .split_once('=')
            .ok_or_else(|| HarnessError::InvalidArgument(format!("labeling {raw:?} is not NAME=PATH")))?;
        let name = name.trim();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(HarnessError::InvalidArgument(format!(
                "labeling name {name:?} must be non-empty and use only letters, digits, '_' or '-'"
            )));
        }
        if path.trim().is_empty() {
            return Err(HarnessError::InvalidArgument(format!("labeling {name:?} has an empty path")));
        }
        Ok(Self {
            name: name.to_string(),
            path: PathBuf::from(path.trim()),
        })
    }
}

/// Explicit column names; `None` means auto-detect.
#[derive(Debug, Clone, Default)]
pub struct AgreementColumns {
    pub index: Option<String>,
    pub label: Option<String>,
    pub cluster: Option<String>,
    pub stability: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AgreementStageConfig {
    pub canonical: PathBuf,
    pub labelings: Vec<LabelingSource>,
    pub columns: AgreementColumns,
}

/// A row of the canonical table.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRow {
    pub key: Option<String>,
    pub label: Option<String>,
    pub stability: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct CanonicalInput {
    pub origin: String,
    pub rows: Vec<CanonicalRow>,
    /// Header of the stability column, when one was found.
    pub stability_column: Option<String>,
    pub overlong: Vec<OverlongRow>,
}

/// Per-labeling result. `joined` is `None` when the labeling file was absent.
#[derive(Debug, Clone)]
pub struct LabelingResult {
    pub name: String,
    pub joined: Option<JoinedLabeling>,
}

#[derive(Debug, Clone)]
pub struct JoinedLabeling {
    /// Raw cluster per canonical row.
    pub clusters: Vec<Option<String>>,
    pub mapping: LabelMapping,
    /// Mapped label per canonical row.
    pub mapped: Vec<Option<String>>,
    pub stats: AgreementStats,
    pub preservation: Vec<MotifPreservation>,
}

/// Join key for an index cell: integral numbers lose any `.0` suffix.
#[must_use]
pub fn normalize_key(cell: &str) -> Option<String> {
    let t = cell.trim();
    if t.is_empty() || t == NA {
        return None;
    }
    if let Ok(i) = t.parse::<i64>() {
        return Some(i.to_string());
    }
    match parse_f64(t) {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => Some(format!("{}", f as i64)),
        _ => Some(t.to_string()),
    }
}

fn missing_column(table: &Table, expected: impl Into<String>) -> HarnessError {
    HarnessError::MissingColumn {
        origin: table.origin().to_string(),
        expected: expected.into(),
    }
}

pub fn load_canonical(path: &Path, columns: &AgreementColumns) -> Result<CanonicalInput, HarnessError> {
    if !path.exists() {
        return Err(HarnessError::MissingInput(path.to_path_buf()));
    }
    canonical_from_table(&Table::read(path)?, columns)
}

pub fn canonical_from_table(table: &Table, columns: &AgreementColumns) -> Result<CanonicalInput, HarnessError> {
    let headers = table.headers();
    let index_col = resolve(headers, columns.index.as_deref(), find_index_column)
        .ok_or_else(|| missing_column(table, columns.index.clone().unwrap_or_else(|| "an index column".into())))?;
    let label_col = resolve(headers, columns.label.as_deref(), |h| find_label_column(h, Some(index_col)))
        .ok_or_else(|| missing_column(table, columns.label.clone().unwrap_or_else(|| "a label column".into())))?;
    let stability_col = match columns.stability.as_deref() {
        Some(name) => Some(table.column(name).ok_or_else(|| missing_column(table, name))?),
        None => find_stability_column(headers),
    };

    let rows = table
        .rows()
        .iter()
        .map(|r| CanonicalRow {
            key: normalize_key(r.get(index_col)),
            label: Some(r.get(label_col).trim())
                .filter(|l| !l.is_empty() && *l != NA)
                .map(str::to_string),
            stability: stability_col.and_then(|c| parse_f64(r.get(c))),
        })
        .collect();

    Ok(CanonicalInput {
        origin: table.origin().to_string(),
        rows,
        stability_column: stability_col.map(|c| headers[c].clone()),
        overlong: table.overlong_rows(),
    })
}

/// Index → cluster from one labeling table.
///
/// Repeated identical rows collapse; a repeated index with a different
/// cluster keeps the first and is reported through `conflicts` as line numbers.
pub fn labeling_clusters(
    table: &Table,
    columns: &AgreementColumns,
) -> Result<(HashMap<String, String>, Vec<usize>), HarnessError> {
    let headers = table.headers();
    let index_col = resolve(headers, columns.index.as_deref(), find_index_column)
        .ok_or_else(|| missing_column(table, columns.index.clone().unwrap_or_else(|| "an index column".into())))?;
    let cluster_col = resolve(headers, columns.cluster.as_deref(), |h| find_cluster_column(h, Some(index_col)))
        .ok_or_else(|| missing_column(table, columns.cluster.clone().unwrap_or_else(|| "a cluster column".into())))?;

    let mut map: HashMap<String, String> = HashMap::new();
    let mut conflicts = Vec::new();
    for r in table.rows() {
        let (Some(key), Some(cluster)) = (normalize_key(r.get(index_col)), normalize_key(r.get(cluster_col)))
        else {
            continue;
        };
        match map.get(&key) {
            Some(existing) if *existing != cluster => conflicts.push(r.line),
            Some(_) => {}
            None => {
                map.insert(key, cluster);
            }
        }
    }
    Ok((map, conflicts))
}

/// Left-join `clusters` onto the canonical rows and compute the statistics.
#[must_use]
pub fn join_labeling(canonical: &CanonicalInput, clusters: &HashMap<String, String>) -> JoinedLabeling {
    let joined: Vec<Option<String>> = canonical
        .rows
        .iter()
        .map(|r| r.key.as_ref().and_then(|k| clusters.get(k)).cloned())
        .collect();

    let mapping = LabelMapping::build_majority(
        canonical
            .rows
            .iter()
            .zip(&joined)
            .filter_map(|(r, c)| Some((c.as_deref()?, r.label.as_deref()?))),
    );
    let mapped: Vec<Option<String>> = joined
        .iter()
        .map(|c| c.as_deref().and_then(|c| mapping.apply(c)).map(str::to_string))
        .collect();

    let stats = AgreementStats::from_pairs(
        canonical
            .rows
            .iter()
            .zip(&mapped)
            .map(|(r, m)| (r.label.as_deref(), m.as_deref())),
    );
    let preservation = per_motif_preservation(
        canonical
            .rows
            .iter()
            .zip(&mapped)
            .filter_map(|(r, m)| Some((r.label.as_deref()?, m.as_deref()))),
    );

    JoinedLabeling {
        clusters: joined,
        mapping,
        mapped,
        stats,
        preservation,
    }
}

#[must_use]
pub fn summary_table(canonical: &CanonicalInput, results: &[LabelingResult]) -> String {
    let stability: Vec<f64> = canonical.rows.iter().filter_map(|r| r.stability).collect();
    let mut w = TableWriter::new(&["metric", "value"]);
    w.push_row(["median_stability_fraction".to_string(), format_opt(median(&stability))]);
    w.push_row(["iqr_stability_fraction".to_string(), format_opt(iqr(&stability))]);
    for res in results {
        let stats = res.joined.as_ref().map(|j| j.stats);
        let name = &res.name;
        w.push_row([format!("ari_canonical_{name}"), format_opt(stats.and_then(|s| s.ari))]);
        w.push_row([format!("kappa_canonical_{name}"), format_opt(stats.and_then(|s| s.kappa))]);
        w.push_row([
            format!("n_joined_{name}"),
            stats.map_or_else(|| NA.to_string(), |s| s.n_joined.to_string()),
        ]);
    }
    w.finish()
}

#[must_use]
pub fn mapping_table(name: &str, mapping: &LabelMapping) -> String {
    let mut w = TableWriter::new(&[format!("cluster_{name}"), "mapped_motif".to_string()]);
    for (cluster, motif) in mapping.entries() {
        w.push_row([cluster, motif]);
    }
    w.finish()
}

#[must_use]
pub fn preservation_table(preservation: &[MotifPreservation]) -> String {
    let mut w = TableWriter::new(&["motif", "count_in_canonical", "fraction_preserved"]);
    for p in preservation {
        w.push_row([
            p.motif.clone(),
            p.count_in_canonical.to_string(),
            format_f64(p.fraction_preserved),
        ]);
    }
    w.finish()
}

/// One row per canonical row: label, then raw and mapped cluster per present labeling.
#[must_use]
pub fn label_table(canonical: &CanonicalInput, results: &[LabelingResult]) -> String {
    let present: Vec<(&str, &JoinedLabeling)> = results
        .iter()
        .filter_map(|r| Some((r.name.as_str(), r.joined.as_ref()?)))
        .collect();

    let mut headers = vec!["index".to_string(), "primary_label_canonical".to_string()];
    for (name, _) in &present {
        headers.push(format!("cluster_{name}"));
        headers.push(format!("{name}_mapped"));
    }
    if let Some(col) = &canonical.stability_column {
        headers.push(col.clone());
    }

    let mut w = TableWriter::new(&headers);
    for (i, row) in canonical.rows.iter().enumerate() {
        let mut fields = vec![
            row.key.clone().unwrap_or_default(),
            row.label.clone().unwrap_or_default(),
        ];
        for (_, j) in &present {
            fields.push(j.clusters[i].clone().unwrap_or_default());
            fields.push(j.mapped[i].clone().unwrap_or_default());
        }
        if canonical.stability_column.is_some() {
            fields.push(row.stability.map(format_f64).unwrap_or_default());
        }
        w.push_row(fields);
    }
    w.finish()
}

pub fn run(config: &AgreementStageConfig, ctx: &mut StageContext) -> Result<StageReport, HarnessError> {
    let mut names = BTreeSet::new();
    for l in &config.labelings {
        if !names.insert(l.name.as_str()) {
            return Err(HarnessError::InvalidArgument(format!("labeling {:?} given twice", l.name)));
        }
    }

    let canonical = load_canonical(&config.canonical, &config.columns)?;
    ctx.warn_overlong(&canonical.origin, &canonical.overlong)?;
    let unkeyed = canonical.rows.iter().filter(|r| r.key.is_none()).count();
    ctx.record_counts(canonical.rows.len(), unkeyed);

    // Nothing is written until every labeling has loaded.
    let mut results = Vec::with_capacity(config.labelings.len());
    for source in &config.labelings {
        if !source.path.exists() {
            let path = source.path.display().to_string();
            ctx.log(crate::structured_log::LogLevel::Warn, "labeling_missing", |e| {
                e.with_input(path)
                    .with_details(serde_json::json!({ "labeling": source.name }))
            })?;
            results.push(LabelingResult {
                name: source.name.clone(),
                joined: None,
            });
            continue;
        }

        let table = Table::read(&source.path)?;
        let (clusters, conflicts) = labeling_clusters(&table, &config.columns)?;
        ctx.warn_overlong(table.origin(), &table.overlong_rows())?;
        for line in conflicts {
            ctx.warn_row(
                "duplicate_index",
                table.origin(),
                line,
                "index already assigned to a different cluster; first assignment kept",
            )?;
        }
        results.push(LabelingResult {
            name: source.name.clone(),
            joined: Some(join_labeling(&canonical, &clusters)),
        });
    }

    for res in &results {
        let Some(joined) = &res.joined else { continue };
        ctx.write_artifact(
            &format!("cluster_to_motif_mapping_{}.csv", res.name),
            "table",
            &mapping_table(&res.name, &joined.mapping),
        )?;
        ctx.write_artifact(
            &format!("preservation_{}.csv", res.name),
            "table",
            &preservation_table(&joined.preservation),
        )?;
    }
    ctx.write_artifact(SUMMARY_FILE, "table", &summary_table(&canonical, &results))?;
    ctx.write_artifact(LABEL_TABLE_FILE, "table", &label_table(&canonical, &results))?;

    let stability: Vec<f64> = canonical.rows.iter().filter_map(|r| r.stability).collect();
    let mut report = StageReport::new("Labeling agreement", ctx.stage().as_str());
    report
        .metric("canonical", &canonical.origin)
        .metric("canonical_rows", canonical.rows.len())
        .metric("median_stability_fraction", format_opt(median(&stability)))
        .metric("iqr_stability_fraction", format_opt(iqr(&stability)));
    for res in &results {
        match &res.joined {
            Some(j) => {
                report
                    .metric(format!("ari_canonical_{}", res.name), format_opt(j.stats.ari))
                    .metric(format!("kappa_canonical_{}", res.name), format_opt(j.stats.kappa))
                    .metric(format!("n_joined_{}", res.name), j.stats.n_joined)
                    .metric(format!("clusters_{}", res.name), j.mapping.len());
            }
            None => {
                report.note(format!("labeling {} not found; its statistics are {NA}", res.name));
            }
        }
    }
    if unkeyed > 0 {
        report.note(format!("{unkeyed} canonical row(s) had no index and cannot join"));
    }
    Ok(report)
}
