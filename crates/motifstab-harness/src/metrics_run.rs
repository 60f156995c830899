//! `metrics` stage: distance-from-canonical metrics per permutation.

use std::path::{Path, PathBuf};

use motifstab_core::cover::chain_covers;
use motifstab_core::perm::parse_perm;
use motifstab_core::{Cover, EventId, MetricsConfig, PermutationMetrics, compute_metrics};

use crate::columns::PERM_NAMES;
use crate::context::StageContext;
use crate::error::HarnessError;
use crate::report::StageReport;
use crate::table::{Table, TableWriter, format_f64, parse_f64};

pub const OUTPUT_FILE: &str = "permutation_metrics.csv";
pub const POSITION_PREFIX: &str = "pos_";

#[derive(Debug, Clone)]
pub struct MetricsStageConfig {
    pub input: PathBuf,
    /// Token column used when the table has no `pos_*` columns.
    pub perm_column: Option<String>,
    /// Two-column `before,after` file; chain covers over `1..=n` otherwise.
    pub covers: Option<PathBuf>,
    pub metrics: MetricsConfig,
}

/// One input row turned into events. `None` when a cell was not an event id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsInputRow {
    pub index: usize,
    pub line: usize,
    pub perm: Option<Vec<EventId>>,
}

fn parse_event(cell: &str) -> Option<EventId> {
    let t = cell.trim();
    if let Ok(v) = t.parse::<EventId>() {
        return Some(v);
    }
    let f = parse_f64(t)?;
    (f.fract() == 0.0 && f >= 0.0 && f <= f64::from(EventId::MAX)).then_some(f as EventId)
}

/// Rows of `table` as event sequences, read from `pos_*` columns in header
/// order, or from a token column when there are none.
pub fn read_rows(table: &Table, perm_column: Option<&str>) -> Result<Vec<MetricsInputRow>, HarnessError> {
    let headers = table.headers();
    let pos_cols: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| h.starts_with(POSITION_PREFIX))
        .map(|(i, _)| i)
        .collect();

    if perm_column.is_none() && !pos_cols.is_empty() {
        return Ok(table
            .rows()
            .iter()
            .enumerate()
            .map(|(index, r)| MetricsInputRow {
                index,
                line: r.line,
                perm: pos_cols.iter().map(|&c| parse_event(r.get(c))).collect(),
            })
            .collect());
    }

    let col = match perm_column {
        Some(name) => table.column(name),
        None => headers.iter().position(|h| PERM_NAMES.contains(&h.as_str())),
    }
    .ok_or_else(|| HarnessError::MissingColumn {
        origin: table.origin().to_string(),
        expected: perm_column.map_or_else(|| "pos_* columns or a perm column".to_string(), str::to_string),
    })?;

    Ok(table
        .rows()
        .iter()
        .enumerate()
        .map(|(index, r)| MetricsInputRow {
            index,
            line: r.line,
            perm: Some(parse_perm(r.get(col))),
        })
        .collect())
}

/// Covers from a headerless `before,after` file. Lines whose first two
/// fields are not integers (a header, comments) are skipped and counted.
pub fn read_covers(path: &Path) -> Result<(Vec<Cover>, usize), HarnessError> {
    if !path.exists() {
        return Err(HarnessError::MissingInput(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path).map_err(|e| HarnessError::io(path, e))?;
    Ok(parse_covers(&text))
}

#[must_use]
pub fn parse_covers(text: &str) -> (Vec<Cover>, usize) {
    let mut covers = Vec::new();
    let mut skipped = 0;
    for line in text.trim_start_matches('\u{feff}').lines() {
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.split(',').map(str::trim);
        let parsed = match (fields.next(), fields.next()) {
            (Some(a), Some(b)) => a.parse::<EventId>().ok().zip(b.parse::<EventId>().ok()),
            _ => None,
        };
        match parsed {
            Some((a, b)) => covers.push(Cover::new(a, b)),
            None => skipped += 1,
        }
    }
    (covers, skipped)
}

#[must_use]
pub fn metrics_table(rows: &[(usize, PermutationMetrics)]) -> String {
    let mut w = TableWriter::new(&[
        "perm_index",
        "dK",
        "disp_kappa_scaled",
        "adjacency_violations",
        "single_move",
        "max_block_move",
        "order_dual_proximity",
        "score_dir",
    ]);
    for (index, m) in rows {
        w.push_row([
            index.to_string(),
            format_f64(m.kendall_distance),
            format_f64(m.displacement_scaled),
            m.adjacency_violations.to_string(),
            m.single_move.to_string(),
            m.max_block.to_string(),
            format_f64(m.order_dual_proximity),
            format_f64(m.score_dir),
        ]);
    }
    w.finish()
}

pub fn run(config: &MetricsStageConfig, ctx: &mut StageContext) -> Result<StageReport, HarnessError> {
    if !config.input.exists() {
        return Err(HarnessError::MissingInput(config.input.clone()));
    }
    let table = Table::read(&config.input)?;
    let rows = read_rows(&table, config.perm_column.as_deref())?;
    ctx.warn_overlong(table.origin(), &table.overlong_rows())?;

    let explicit_covers = match &config.covers {
        Some(path) => {
            let (covers, skipped) = read_covers(path)?;
            if skipped > 0 {
                let origin = path.display().to_string();
                ctx.log(crate::structured_log::LogLevel::Debug, "cover_lines_skipped", |e| {
                    e.with_input(origin).with_counts(covers.len() as u64, skipped as u64)
                })?;
            }
            Some(covers)
        }
        None => None,
    };

    let mut computed = Vec::with_capacity(rows.len());
    for row in &rows {
        let metrics = row.perm.as_ref().and_then(|perm| {
            let chain;
            let covers = match &explicit_covers {
                Some(c) => c.as_slice(),
                None => {
                    chain = chain_covers(EventId::try_from(perm.len()).ok()?);
                    chain.as_slice()
                }
            };
            compute_metrics(perm, covers, &config.metrics)
        });
        match metrics {
            Some(m) => computed.push((row.index, m)),
            None => ctx.warn_row(
                "incomplete_permutation",
                table.origin(),
                row.line,
                "not a complete permutation of 1..n; row skipped",
            )?,
        }
    }
    let skipped = rows.len() - computed.len();
    ctx.record_counts(rows.len(), skipped);

    ctx.write_artifact(OUTPUT_FILE, "table", &metrics_table(&computed))?;

    let mean = |f: fn(&PermutationMetrics) -> f64| {
        if computed.is_empty() {
            crate::table::NA.to_string()
        } else {
            format_f64(computed.iter().map(|(_, m)| f(m)).sum::<f64>() / computed.len() as f64)
        }
    };
    let mut report = StageReport::new("Permutation distance metrics", ctx.stage().as_str());
    report
        .metric("input", table.origin())
        .metric("permutations", rows.len())
        .metric("scored", computed.len())
        .metric("skipped_incomplete", skipped)
        .metric(
            "covers",
            explicit_covers
                .as_ref()
                .map_or_else(|| "chain".to_string(), |c| format!("{} from file", c.len())),
        )
        .metric("displacement_exponent", format_f64(config.metrics.displacement_exponent()))
        .metric("displacement_scale", format_f64(config.metrics.displacement_scale()))
        .metric("mean_dK", mean(|m| m.kendall_distance))
        .metric("mean_score_dir", mean(|m| m.score_dir));
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_columns_take_precedence() {
        let t = Table::parse("id,pos_1,pos_2,pos_3,perm\n0,2,1,3,1 2 3\n1,1.0,x,3,1 2 3\n", "mem").unwrap();
        let rows = read_rows(&t, None).unwrap();
        assert_eq!(rows[0].perm, Some(vec![2, 1, 3]));
        assert_eq!(rows[1].perm, None);

        let by_tokens = read_rows(&t, Some("perm")).unwrap();
        assert_eq!(by_tokens[1].perm, Some(vec![1, 2, 3]));
    }

    #[test]
    fn token_column_fallback_and_missing() {
        let t = Table::parse("motif,permutation\nA,3;1;2\n", "mem").unwrap();
        assert_eq!(read_rows(&t, None).unwrap()[0].perm, Some(vec![3, 1, 2]));
        let none = Table::parse("a,b\n1,2\n", "mem").unwrap();
        assert!(matches!(read_rows(&none, None), Err(HarnessError::MissingColumn { .. })));
    }

    #[test]
    fn cover_file_skips_non_integer_lines() {
        let (covers, skipped) = parse_covers("\u{feff}before,after\n1,2\n\n 2 , 4 \nx\n");
        assert_eq!(covers, vec![Cover::new(1, 2), Cover::new(2, 4)]);
        assert_eq!(skipped, 2);
    }

    #[test]
    fn table_layout() {
        let m = compute_metrics(&[2, 1, 3], &chain_covers(3), &MetricsConfig::default()).unwrap();
        let t = Table::parse(&metrics_table(&[(4, m)]), "out").unwrap();
        assert_eq!(t.headers()[0], "perm_index");
        assert_eq!(t.headers()[5], "max_block_move");
        let row = &t.rows()[0];
        assert_eq!(row.get(0), "4");
        assert_eq!(row.get(3), "1");
        assert_eq!(row.get(4), "1");
    }
}
