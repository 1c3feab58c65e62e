//! Cross-platform entity resolution: blocking, pairwise signals and
//! scoring, transitive clustering and canonical merging.

pub const CRATE_NAME: &str = "lettings-match";

pub mod blocking;
pub mod cluster;
pub mod config;
pub mod merge;
pub mod pipeline;
pub mod review;
pub mod scoring;
pub mod signals;
pub mod text;

pub use blocking::BlockingIndex;
pub use cluster::{Cluster, ClusterBuilder, ClusterReport, UnionFind};
pub use config::{ConfigError, MatchSettings, RunConfig, SignalSettings, SignalWeights};
pub use merge::{dedupe_by_identity, select_canonical, MergeEngine, MergeError};
pub use pipeline::{
    load_batch_input, load_seed_clusters, run_once_from_env, BatchInput, EvidenceMode, EvidenceStats,
    ExcludedCluster, MatchOutcome, MatchPipeline, MatchStats, Resolver, RunSummary,
};
pub use review::{export_review_queue, load_labels, parse_labels, review_queue, Label, ReviewItem};
pub use scoring::{pair_id, Classification, PairScore, Scorer};
pub use signals::{
    coordinates_match, evaluate_all, haversine_m, prices_match, prices_within, Candidate, SignalContext,
    SignalKind, SignalResult, SignalSet,
};
pub use text::TfidfIndex;
