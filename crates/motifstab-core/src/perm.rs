//! Permutation token parsing.

use crate::cover::EventId;

/// Parse a permutation string such as `"6 8 3 10"` or `"6;8;3;10"`.
///
/// Tokens are split on whitespace and `;`. Tokens that are not plain decimal
/// digits (or overflow an event id) are dropped.
#[must_use]
pub fn parse_perm(raw: &str) -> Vec<EventId> {
    raw.split(|c: char| c.is_whitespace() || c == ';')
        .filter(|tok| !tok.is_empty() && tok.bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|tok| tok.parse::<EventId>().ok())
        .collect()
}

/// True when `perm` holds every id in `1..=n` exactly once.
#[must_use]
pub fn is_complete_permutation(perm: &[EventId], n: EventId) -> bool {
    if perm.len() != n as usize {
        return false;
    }
    let mut seen = vec![false; perm.len()];
    for &v in perm {
        if v == 0 || v > n {
            return false;
        }
        let slot = &mut seen[(v - 1) as usize];
        if *slot {
            return false;
        }
        *slot = true;
    }
    true
}
