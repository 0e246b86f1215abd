//! Mention deduplication engine.
//!
//! Stages:
//! 1. Canonicalize links (tracking params, fragment, host case, trailing slash)
//! 2. Normalize titles into an exact key, a token set and a fingerprint
//! 3. Score similarity (Jaccard over tokens, Levenshtein ratio over fingerprints)
//! 4. Resolve duplicates: by canon, by exact title key, by fuzzy aggregator suppression
//! 5. Apply drops to the store by exact member value
//!
//! [`analysis`] holds the read-only source, overview and spike reports.

pub mod analysis;
pub mod canon;
pub mod ingest;
pub mod pass;
pub mod policy;
pub mod similarity;
pub mod sweep;
pub mod title;

pub use analysis::{run_overview, run_source_report, run_spike_report};
pub use canon::{canonical_key, canonicalize, canonicalize_with, host_of};
pub use pass::{
    run_canon_sweep, run_cleanup, run_title_sweep, CleanupReport, CleanupRequest, Mode,
};
pub use policy::{DropCounts, DropReason, DuplicatePolicy, Resolution};
pub use similarity::{jaccard, levenshtein, similarity_ratio};
pub use title::{fingerprint, normalize_title_key, title_tokens};

#[cfg(test)]
mod tests;
