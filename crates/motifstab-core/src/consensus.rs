//! Cross-run consensus over clustering outputs.
//!
//! Each clustering run yields clusters of permutation indices. Clusters from
//! all runs become vertices of a similarity graph with an edge wherever the
//! Jaccard similarity reaches the threshold. Every connected component is one
//! consensus group, summarised by the indices that a sufficient fraction of
//! its member clusters agree on.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::config::ConsensusConfig;
use crate::cover::EventId;
use crate::perm::parse_perm;

/// Identifier of one clustering run, taken from its membership file name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum RunId {
    Numbered(u64),
    Named(String),
}

impl RunId {
    /// `cluster_members_run_7` → `Numbered(7)`; a stem without a numeric
    /// suffix after its last `_` keeps the whole stem as its name.
    #[must_use]
    pub fn from_file_stem(stem: &str) -> Self {
        let tail = stem.rsplit('_').next().unwrap_or(stem);
        match tail.parse::<u64>() {
            Ok(n) => Self::Numbered(n),
            Err(_) => Self::Named(stem.to_string()),
        }
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numbered(n) => write!(f, "{n}"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// One cluster from one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterRecord {
    pub run_id: RunId,
    pub cluster_id: i64,
    pub members: BTreeSet<u64>,
    /// Token strings of member permutations, when the run file carried them.
    pub perm_strings: BTreeMap<u64, String>,
}

impl ClusterRecord {
    #[must_use]
    pub fn new(run_id: RunId, cluster_id: i64, members: impl IntoIterator<Item = u64>) -> Self {
        Self {
            run_id,
            cluster_id,
            members: members.into_iter().collect(),
            perm_strings: BTreeMap::new(),
        }
    }

    /// `"run-cluster"` label used in member lists.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}-{}", self.run_id, self.cluster_id)
    }
}

/// Jaccard similarity `|A ∩ B| / |A ∪ B|`; two empty sets count as identical.
#[must_use]
pub fn jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let inter = a.intersection(b).count();
    let union = a.len() + b.len() - inter;
    if union == 0 {
        0.0
    } else {
        inter as f64 / union as f64
    }
}

/// Similarity of one unordered vertex pair, `i < j`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PairSimilarity {
    pub i: usize,
    pub j: usize,
    pub jaccard: f64,
}

/// Jaccard of every unordered pair, in `(i, j)` lexicographic order.
#[must_use]
pub fn pairwise_jaccard(clusters: &[ClusterRecord]) -> Vec<PairSimilarity> {
    let n = clusters.len();
    let mut pairs = Vec::with_capacity(n.saturating_mul(n.saturating_sub(1)) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            pairs.push(PairSimilarity {
                i,
                j,
                jaccard: jaccard(&clusters[i].members, &clusters[j].members),
            });
        }
    }
    pairs
}

/// Connected components of the graph whose edges are pairs with similarity `>= threshold`.
///
/// Components come out ordered by their smallest vertex and each is sorted.
#[must_use]
pub fn connected_components(n: usize, pairs: &[PairSimilarity], threshold: f64) -> Vec<Vec<usize>> {
    let mut adj = vec![Vec::new(); n];
    for p in pairs.iter().filter(|p| p.jaccard >= threshold && p.i != p.j) {
        adj[p.i].push(p.j);
        adj[p.j].push(p.i);
    }

    let mut visited = vec![false; n];
    let mut components = Vec::new();
    for start in 0..n {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        let mut stack = vec![start];
        let mut comp = Vec::new();
        while let Some(v) = stack.pop() {
            comp.push(v);
            for &w in &adj[v] {
                if !visited[w] {
                    visited[w] = true;
                    stack.push(w);
                }
            }
        }
        comp.sort_unstable();
        components.push(comp);
    }
    components
}

/// Minimum member count `⌈fraction · m⌉` for an index to enter the consensus set.
#[must_use]
pub fn consensus_threshold(fraction: f64, member_count: usize) -> usize {
    (fraction * member_count as f64).ceil() as usize
}

/// One consensus group, numbered by discovery order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsensusGroup {
    pub consensus_id: usize,
    /// Vertex indices into the cluster list, ascending.
    pub vertices: Vec<usize>,
    /// `"run-cluster"` labels in vertex order.
    pub member_clusters: Vec<String>,
    pub runs: BTreeSet<RunId>,
    pub mean_pairwise_jaccard: f64,
    pub consensus_perms: BTreeSet<u64>,
}

impl ConsensusGroup {
    #[must_use]
    pub fn n_member_clusters(&self) -> usize {
        self.vertices.len()
    }

    /// Number of distinct runs that contributed a member.
    #[must_use]
    pub fn fragmentation(&self) -> usize {
        self.runs.len()
    }
}

/// Aggregate one component into its consensus group.
#[must_use]
pub fn build_consensus_group(
    consensus_id: usize,
    component: &[usize],
    clusters: &[ClusterRecord],
    consensus_fraction: f64,
) -> ConsensusGroup {
    let members: Vec<&ClusterRecord> = component.iter().map(|&v| &clusters[v]).collect();

    let mut counts: BTreeMap<u64, usize> = BTreeMap::new();
    for c in &members {
        for &p in &c.members {
            *counts.entry(p).or_insert(0) += 1;
        }
    }
    let needed = consensus_threshold(consensus_fraction, members.len());
    let consensus_perms = counts
        .into_iter()
        .filter(|&(_, n)| n >= needed)
        .map(|(p, _)| p)
        .collect();

    let mut total = 0.0;
    let mut pairs = 0usize;
    for (k, a) in members.iter().enumerate() {
        for b in &members[k + 1..] {
            total += jaccard(&a.members, &b.members);
            pairs += 1;
        }
    }
    let mean_pairwise_jaccard = if pairs == 0 { 1.0 } else { total / pairs as f64 };

    ConsensusGroup {
        consensus_id,
        vertices: component.to_vec(),
        member_clusters: members.iter().map(|c| c.label()).collect(),
        runs: members.iter().map(|c| c.run_id.clone()).collect(),
        mean_pairwise_jaccard,
        consensus_perms,
    }
}

/// Full consensus result: every pair similarity and the groups.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusBuild {
    pub pairs: Vec<PairSimilarity>,
    pub groups: Vec<ConsensusGroup>,
}

/// Run the whole pipeline over `clusters` in the given vertex order.
#[must_use]
pub fn build_consensus(clusters: &[ClusterRecord], config: &ConsensusConfig) -> ConsensusBuild {
    let pairs = pairwise_jaccard(clusters);
    let groups = connected_components(clusters.len(), &pairs, config.jaccard_threshold())
        .iter()
        .enumerate()
        .map(|(id, comp)| build_consensus_group(id, comp, clusters, config.consensus_fraction()))
        .collect();
    ConsensusBuild { pairs, groups }
}

/// Index → token string over all clusters; later clusters overwrite earlier ones.
#[must_use]
pub fn perm_strings_by_index(clusters: &[ClusterRecord]) -> BTreeMap<u64, String> {
    let mut out = BTreeMap::new();
    for c in clusters {
        for (idx, s) in &c.perm_strings {
            out.insert(*idx, s.clone());
        }
    }
    out
}

/// Mean normalised position of every event across the consensus permutations.
///
/// A position is `index / max(1, len - 1)` of the event's first occurrence.
/// Returns `None` when any consensus permutation has no token string, and an
/// empty map when the consensus set is empty.
#[must_use]
pub fn event_position_stats(
    consensus_perms: &BTreeSet<u64>,
    strings: &BTreeMap<u64, String>,
) -> Option<BTreeMap<EventId, f64>> {
    let mut perms = Vec::with_capacity(consensus_perms.len());
    for idx in consensus_perms {
        perms.push(parse_perm(strings.get(idx)?));
    }

    let mut sums: BTreeMap<EventId, (f64, usize)> = BTreeMap::new();
    for perm in &perms {
        let denom = perm.len().saturating_sub(1).max(1) as f64;
        let mut seen = BTreeSet::new();
        for (pos, &event) in perm.iter().enumerate() {
            if seen.insert(event) {
                let slot = sums.entry(event).or_insert((0.0, 0));
                slot.0 += pos as f64 / denom;
                slot.1 += 1;
            }
        }
    }
    Some(
        sums.into_iter()
            .map(|(event, (sum, n))| (event, sum / n as f64))
            .collect(),
    )
}
