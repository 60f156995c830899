//! # motifstab-core
//!
//! Pure algorithms for motif classification of event-order permutations.
//!
//! This crate provides:
//! - Cover-violation detection against a fixed canonical partial order
//! - Priority (check-order dependent) and any-cover (order-invariant) classifiers
//! - Monte Carlo estimation of label stability under random check-orders
//! - Jaccard-graph consensus over repeated clustering runs
//! - Agreement statistics between canonical and remapped labelings
//! - Distance metrics between a permutation and the canonical order
//!
//! Nothing here touches the file system; table I/O lives in `motifstab-harness`.

#![deny(unsafe_code)]

pub mod agreement;
pub mod classify;
pub mod config;
pub mod consensus;
pub mod cover;
pub mod metrics;
pub mod perm;
pub mod stability;

pub use agreement::{AgreementStats, LabelMapping, MotifPreservation};
pub use classify::{Classification, MotifLabel, classify_any_cover, classify_first_violated};
pub use config::{ConfigError, ConsensusConfig, MetricsConfig, StabilityConfig};
pub use consensus::{ClusterRecord, ConsensusBuild, ConsensusGroup, RunId, build_consensus, jaccard};
pub use cover::{Cover, CoverSet, EventId, ViolatedSet};
pub use metrics::{PermutationMetrics, compute_metrics};
pub use stability::{StabilityEstimator, StabilityRecord};
