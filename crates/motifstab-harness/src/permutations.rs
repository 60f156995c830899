//! Loading the permutation input table shared by the classification stages.

use std::path::Path;

use motifstab_core::EventId;
use motifstab_core::perm::parse_perm;

use crate::columns::{find_motif_column, find_perm_column, resolve};
use crate::error::HarnessError;
use crate::table::{OverlongRow, Table};

/// One input permutation, numbered by row position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermutationRow {
    pub index: usize,
    pub line: usize,
    pub orig_motif: String,
    pub perm_str: String,
    pub perm: Vec<EventId>,
}

/// Which columns hold the label and the permutation tokens.
#[derive(Debug, Clone, Default)]
pub struct PermColumns {
    pub motif: Option<String>,
    pub perm: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PermutationInput {
    pub origin: String,
    pub rows: Vec<PermutationRow>,
    /// Rows that were wider than the header and were truncated.
    pub overlong: Vec<OverlongRow>,
}

impl PermutationInput {
    /// Rows whose permutation string yielded no event tokens.
    pub fn empty_rows(&self) -> impl Iterator<Item = &PermutationRow> {
        self.rows.iter().filter(|r| r.perm.is_empty())
    }
}

/// Read the permutation table at `path`.
///
/// A missing file or a table with no usable permutation column is fatal.
/// The label column is optional; rows without one get an empty label.
pub fn load_permutations(path: &Path, columns: &PermColumns) -> Result<PermutationInput, HarnessError> {
    if !path.exists() {
        return Err(HarnessError::MissingInput(path.to_path_buf()));
    }
    let table = Table::read(path)?;
    from_table(&table, columns)
}

pub fn from_table(table: &Table, columns: &PermColumns) -> Result<PermutationInput, HarnessError> {
    let headers = table.headers();
    let perm_col = resolve(headers, columns.perm.as_deref(), find_perm_column).ok_or_else(|| {
        HarnessError::MissingColumn {
            origin: table.origin().to_string(),
            expected: columns
                .perm
                .clone()
                .unwrap_or_else(|| "perm, permutation, permuted, or a second column".to_string()),
        }
    })?;

    let motif_col = match columns.motif.as_deref() {
        Some(name) => Some(headers.iter().position(|h| h == name).ok_or_else(|| {
            HarnessError::MissingColumn {
                origin: table.origin().to_string(),
                expected: name.to_string(),
            }
        })?),
        None => find_motif_column(headers, Some(perm_col)),
    };

    let rows = table
        .rows()
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let perm_str = record.get(perm_col).to_string();
            PermutationRow {
                index,
                line: record.line,
                orig_motif: motif_col.map(|c| record.get(c).to_string()).unwrap_or_default(),
                perm: parse_perm(&perm_str),
                perm_str,
            }
        })
        .collect();

    Ok(PermutationInput {
        origin: table.origin().to_string(),
        rows,
        overlong: table.overlong_rows(),
    })
}
