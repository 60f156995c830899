//! Column discovery for loosely specified input tables.
//!
//! Inputs come from several upstream tools with inconsistent headers, so each
//! role has a small lookup rule. An explicit column name from the command line
//! always wins over the rule.

/// Exact (case-insensitive) names accepted for a permutation index column.
pub const INDEX_NAMES: [&str; 4] = ["index", "perm_index", "perm", "id"];

/// Substrings that mark the canonical label column, in no particular priority.
pub const CANONICAL_LABEL_KEYS: [&str; 6] = [
    "orig_motif",
    "primary_label",
    "modal_label",
    "motif",
    "label",
    "cluster",
];

/// Substrings that mark a raw cluster column in an independent labeling.
pub const CLUSTER_KEYS: [&str; 4] = ["cluster", "label", "primary_label", "motif"];

/// Exact names accepted for the permutation token column.
pub const PERM_NAMES: [&str; 3] = ["perm", "permutation", "permuted"];

/// Motif columns of a merged sensitivity table, in preference order.
pub const MOTIF_LABEL_NAMES: [&str; 3] = ["motif_label", "human_mapped", "rule_any_label"];

fn contains_any(header: &str, keys: &[&str]) -> bool {
    let lower = header.to_ascii_lowercase();
    keys.iter().any(|k| lower.contains(k))
}

/// Position of `name` when given, otherwise the result of `rule`.
///
/// An explicit name that is absent resolves to `None`; it never falls back.
pub fn resolve(
    headers: &[String],
    explicit: Option<&str>,
    rule: impl FnOnce(&[String]) -> Option<usize>,
) -> Option<usize> {
    match explicit {
        Some(name) => headers.iter().position(|h| h == name),
        None => rule(headers),
    }
}

/// First header equal (ignoring case) to one of [`INDEX_NAMES`].
#[must_use]
pub fn find_index_column(headers: &[String]) -> Option<usize> {
    headers
        .iter()
        .position(|h| INDEX_NAMES.iter().any(|n| h.eq_ignore_ascii_case(n)))
}

/// First non-index header containing a canonical label key.
#[must_use]
pub fn find_label_column(headers: &[String], index_col: Option<usize>) -> Option<usize> {
    headers
        .iter()
        .enumerate()
        .find(|&(i, h)| Some(i) != index_col && contains_any(h, &CANONICAL_LABEL_KEYS))
        .map(|(i, _)| i)
}

/// First non-index header containing a cluster key.
#[must_use]
pub fn find_cluster_column(headers: &[String], index_col: Option<usize>) -> Option<usize> {
    headers
        .iter()
        .enumerate()
        .find(|&(i, h)| {
            Some(i) != index_col
                && !h.eq_ignore_ascii_case("index")
                && contains_any(h, &CLUSTER_KEYS)
        })
        .map(|(i, _)| i)
}

/// First header whose name contains `stability`.
#[must_use]
pub fn find_stability_column(headers: &[String]) -> Option<usize> {
    headers.iter().position(|h| contains_any(h, &["stability"]))
}

/// A [`PERM_NAMES`] header, else the second column.
#[must_use]
pub fn find_perm_column(headers: &[String]) -> Option<usize> {
    PERM_NAMES
        .iter()
        .find_map(|n| headers.iter().position(|h| h == n))
        .or_else(|| (headers.len() >= 2).then_some(1))
}

/// The `motif` header, else the first column unless it holds permutations.
#[must_use]
pub fn find_motif_column(headers: &[String], perm_col: Option<usize>) -> Option<usize> {
    headers
        .iter()
        .position(|h| h == "motif")
        .or_else(|| (!headers.is_empty() && perm_col != Some(0)).then_some(0))
}

/// First of [`MOTIF_LABEL_NAMES`] present.
#[must_use]
pub fn find_motif_label_column(headers: &[String]) -> Option<usize> {
    MOTIF_LABEL_NAMES
        .iter()
        .find_map(|n| headers.iter().position(|h| h == n))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn stability_output_resolves_expected_roles() {
        let headers = h(&[
            "index",
            "orig_motif",
            "perm_str",
            "violated_covers",
            "baseline_first_label",
            "baseline_trigger",
            "any_cover_label",
            "stability_fraction_first",
            "trigger_stability_first",
            "modal_label_first",
        ]);
        let idx = find_index_column(&headers);
        assert_eq!(idx, Some(0));
        assert_eq!(find_label_column(&headers, idx), Some(1));
        assert_eq!(find_stability_column(&headers), Some(7));
    }

    #[test]
    fn index_match_is_exact_but_case_insensitive() {
        assert_eq!(find_index_column(&h(&["perm_str", "Perm_Index"])), Some(1));
        assert_eq!(find_index_column(&h(&["indexes", "label"])), None);
    }

    #[test]
    fn cluster_column_skips_index() {
        let headers = h(&["perm_index", "cluster_label"]);
        let idx = find_index_column(&headers);
        assert_eq!(find_cluster_column(&headers, idx), Some(1));
        let headers = h(&["id", "score", "Motif"]);
        assert_eq!(find_cluster_column(&headers, find_index_column(&headers)), Some(2));
    }

    #[test]
    fn perm_and_motif_fallbacks() {
        let headers = h(&["name", "tokens"]);
        let perm = find_perm_column(&headers);
        assert_eq!(perm, Some(1));
        assert_eq!(find_motif_column(&headers, perm), Some(0));

        let headers = h(&["permutation"]);
        let perm = find_perm_column(&headers);
        assert_eq!(perm, Some(0));
        assert_eq!(find_motif_column(&headers, perm), None);
    }

    #[test]
    fn explicit_name_overrides_rule() {
        let headers = h(&["index", "orig_motif", "my_label"]);
        assert_eq!(resolve(&headers, Some("my_label"), |hs| find_label_column(hs, None)), Some(2));
        assert_eq!(resolve(&headers, Some("missing"), |hs| find_label_column(hs, None)), None);
        assert_eq!(resolve(&headers, None, |hs| find_label_column(hs, None)), Some(1));
    }

    #[test]
    fn motif_label_preference() {
        assert_eq!(
            find_motif_label_column(&h(&["rule_any_label", "human_mapped"])),
            Some(1)
        );
        assert_eq!(find_motif_label_column(&h(&["other"])), None);
    }
}
