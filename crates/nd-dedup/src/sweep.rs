//! Whole-store sweeps that predate the windowed policy and are still run by hand.

use crate::canon::canonical_key;
use crate::similarity::{ratio_upper_bound, similarity_ratio};
use crate::title::fingerprint;
use nd_core::config::DedupConfig;
use nd_core::StoredMention;

/// Outcome of a canon sweep over newest-first items.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonSweepPlan {
    pub unique: usize,
    pub drops: Vec<usize>,
}

/// First occurrence of each canonical link wins. `items` must be newest first,
/// which is how the store scans.
pub fn plan_canon_sweep(items: &[StoredMention], config: &DedupConfig) -> CanonSweepPlan {
    let mut seen = std::collections::HashSet::new();
    let mut plan = CanonSweepPlan::default();
    for (i, item) in items.iter().enumerate() {
        let Some(link) = item.mention.identity_link() else { continue };
        let Some(canon) = canonical_key(link, &config.tracking_params) else {
            continue;
        };
        if seen.insert(canon) {
            plan.unique += 1;
        } else {
            plan.drops.push(i);
        }
    }
    plan
}

/// Near-identical titles grouped around a representative fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct TitleGroup {
    pub fingerprint: String,
    /// Oldest first; the head is kept.
    pub members: Vec<usize>,
}

impl TitleGroup {
    pub fn keep(&self) -> usize {
        self.members[0]
    }

    pub fn duplicates(&self) -> &[usize] {
        &self.members[1..]
    }
}

/// Greedy single-link grouping: each title joins the first group whose
/// representative fingerprint is at least `threshold` similar, else starts one.
pub fn plan_title_sweep(items: &[StoredMention], threshold: f64) -> Vec<TitleGroup> {
    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by(|&a, &b| {
        items[a]
            .ts()
            .cmp(&items[b].ts())
            .then_with(|| items[a].mention.id.cmp(&items[b].mention.id))
            .then_with(|| a.cmp(&b))
    });

    let mut groups: Vec<TitleGroup> = Vec::new();
    for i in order {
        let fp = fingerprint(&items[i].mention.title);
        if fp.is_empty() {
            continue;
        }
        let home = groups.iter_mut().find(|g| {
            ratio_upper_bound(&fp, &g.fingerprint) >= threshold
                && similarity_ratio(&fp, &g.fingerprint) >= threshold
        });
        match home {
            Some(g) => g.members.push(i),
            None => groups.push(TitleGroup { fingerprint: fp, members: vec![i] }),
        }
    }
    groups
}
