//! Duplicate resolution over one window of stored mentions.
//!
//! Three drop passes run in order, each over what the previous left standing:
//! canonical-URL groups, exact title-key buckets, then fuzzy suppression of
//! aggregator items that resemble a surviving original anywhere in the window.

use crate::canon::{canonical_key, host_of};
use crate::similarity::jaccard;
use crate::title::{normalize_title_key, title_tokens};
use nd_core::config::DedupConfig;
use nd_core::StoredMention;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    ByCanon,
    ByTitleExact,
    ByTitleFuzzy,
}

/// Per-mention features the policy decides on.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub index: usize,
    pub canon: String,
    pub title_key: String,
    pub tokens: BTreeSet<String>,
    pub aggregator: bool,
    pub ts: i64,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Drop {
    pub index: usize,
    pub reason: DropReason,
    /// Best Jaccard score, for fuzzy drops.
    pub similarity: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DropCounts {
    pub by_canon: usize,
    pub by_title_exact: usize,
    pub by_title_fuzzy: usize,
}

impl DropCounts {
    pub fn total(&self) -> usize {
        self.by_canon + self.by_title_exact + self.by_title_fuzzy
    }
}

/// Keep/drop decision for a window. Indices refer to the input slice.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub kept: Vec<usize>,
    pub drops: Vec<Drop>,
}

impl Resolution {
    pub fn counts(&self) -> DropCounts {
        let mut c = DropCounts::default();
        for d in &self.drops {
            match d.reason {
                DropReason::ByCanon => c.by_canon += 1,
                DropReason::ByTitleExact => c.by_title_exact += 1,
                DropReason::ByTitleFuzzy => c.by_title_fuzzy += 1,
            }
        }
        c
    }

    pub fn is_dropped(&self, index: usize) -> bool {
        self.drops.iter().any(|d| d.index == index)
    }
}

/// Newest first; equal timestamps fall back to the smaller id, then index.
fn newest_first(a: &Candidate, b: &Candidate) -> Ordering {
    b.ts.cmp(&a.ts)
        .then_with(|| a.id.cmp(&b.id))
        .then_with(|| a.index.cmp(&b.index))
}

pub struct DuplicatePolicy<'c> {
    config: &'c DedupConfig,
}

impl<'c> DuplicatePolicy<'c> {
    pub fn new(config: &'c DedupConfig) -> Self {
        Self { config }
    }

    pub fn classify(&self, index: usize, stored: &StoredMention) -> Candidate {
        let m = &stored.mention;
        let link = m.identity_link().unwrap_or("");
        // Unparseable links never join a canon group.
        let canon = canonical_key(link, &self.config.tracking_params).unwrap_or_default();
        let aggregator = host_of(link)
            .map(|h| self.config.is_aggregator_host(&h))
            .unwrap_or(false);
        Candidate {
            index,
            canon,
            title_key: normalize_title_key(&m.title),
            tokens: title_tokens(&m.title),
            aggregator,
            ts: stored.ts(),
            id: m.id.clone(),
        }
    }

    pub fn resolve(&self, items: &[StoredMention]) -> Resolution {
        let candidates: Vec<Candidate> = items
            .iter()
            .enumerate()
            .map(|(i, s)| self.classify(i, s))
            .collect();
        self.resolve_candidates(&candidates)
    }

    pub fn resolve_candidates(&self, candidates: &[Candidate]) -> Resolution {
        let mut dropped: BTreeMap<usize, Drop> = BTreeMap::new();

        // Pass 1: canonical URL.
        let mut by_canon: BTreeMap<&str, Vec<&Candidate>> = BTreeMap::new();
        for c in candidates.iter().filter(|c| !c.canon.is_empty()) {
            by_canon.entry(c.canon.as_str()).or_default().push(c);
        }
        for (canon, mut group) in by_canon {
            if group.len() < 2 {
                continue;
            }
            group.sort_by(|a, b| newest_first(a, b));
            for c in &group[1..] {
                debug!(canon, index = c.index, "drop by canon");
                let drop = Drop { index: c.index, reason: DropReason::ByCanon, similarity: None };
                dropped.insert(c.index, drop);
            }
        }

        // Pass 2: exact title key, originals preferred over aggregators.
        let mut by_title: BTreeMap<&str, (Vec<&Candidate>, Vec<&Candidate>)> = BTreeMap::new();
        for c in candidates
            .iter()
            .filter(|c| !c.title_key.is_empty() && !dropped.contains_key(&c.index))
        {
            let bucket = by_title.entry(c.title_key.as_str()).or_default();
            if c.aggregator {
                bucket.1.push(c);
            } else {
                bucket.0.push(c);
            }
        }
        for (key, (mut originals, mut aggregators)) in by_title {
            originals.sort_by(|a, b| newest_first(a, b));
            aggregators.sort_by(|a, b| newest_first(a, b));
            let losers: Vec<&Candidate> = if originals.is_empty() {
                aggregators.iter().skip(1).copied().collect()
            } else {
                originals.iter().skip(1).chain(aggregators.iter()).copied().collect()
            };
            for c in losers {
                debug!(title_key = key, index = c.index, "drop by exact title");
                let drop = Drop {
                    index: c.index,
                    reason: DropReason::ByTitleExact,
                    similarity: None,
                };
                dropped.insert(c.index, drop);
            }
        }

        // Pass 3: aggregator vs every surviving original, O(aggregators x originals).
        let survivors: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| !c.title_key.is_empty() && !dropped.contains_key(&c.index))
            .collect();
        let originals: Vec<&Candidate> = survivors
            .iter()
            .filter(|c| !c.aggregator && !c.tokens.is_empty())
            .copied()
            .collect();
        let threshold = self.config.fuzzy_threshold;
        for agg in survivors.iter().filter(|c| c.aggregator) {
            let best = originals
                .iter()
                .map(|o| jaccard(&agg.tokens, &o.tokens))
                .fold(0.0_f64, f64::max);
            if best > 0.0 && best >= threshold {
                debug!(index = agg.index, similarity = best, "drop by fuzzy title");
                let drop = Drop {
                    index: agg.index,
                    reason: DropReason::ByTitleFuzzy,
                    similarity: Some(best),
                };
                dropped.insert(agg.index, drop);
            }
        }

        let kept = candidates
            .iter()
            .map(|c| c.index)
            .filter(|i| !dropped.contains_key(i))
            .collect();
        Resolution { kept, drops: dropped.into_values().collect() }
    }
}
