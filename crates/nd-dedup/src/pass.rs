//! Store-driven passes: scan, decide, and (optionally) remove by exact value.

use crate::policy::{DropCounts, DropReason, DuplicatePolicy};
use crate::sweep::{plan_canon_sweep, plan_title_sweep};
use crate::title::fingerprint;
use chrono::{DateTime, Utc};
use nd_core::config::DedupConfig;
use nd_core::{NdError, Result, ScanWindow, StoredMention, Window};
use nd_storage::{MentionStore, RawMember};
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Preview,
    Delete,
}

impl Mode {
    /// `delete` (any case) deletes; anything else previews.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()) {
            Some(s) if s == "delete" => Mode::Delete,
            _ => Mode::Preview,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupRequest {
    pub window: Window,
    pub mode: Mode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedSample {
    pub title: Option<String>,
    pub source: Option<String>,
    pub link: Option<String>,
    pub canon: Option<String>,
    pub reason: DropReason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupReport {
    pub mode: Mode,
    pub window: String,
    pub scanned: usize,
    pub skipped: usize,
    pub kept: usize,
    pub dropped: usize,
    pub drops_by_reason: DropCounts,
    pub removed: usize,
    pub not_removed: usize,
    pub sample: Vec<DroppedSample>,
}

/// Decode raw members, skipping (and counting) the ones that are not mention JSON.
pub fn decode_members(raw: Vec<RawMember>) -> (Vec<StoredMention>, usize) {
    let mut skipped = 0;
    let items = raw
        .into_iter()
        .filter_map(|m| match StoredMention::decode(m.member, m.score) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(score = m.score, error = %e, "skipping undecodable member");
                skipped += 1;
                None
            }
        })
        .collect();
    (items, skipped)
}

fn non_empty(s: &str) -> Option<String> {
    Some(s).filter(|s| !s.is_empty()).map(str::to_string)
}

pub(crate) async fn scan_decoded<S: MentionStore + ?Sized>(
    store: &S,
    window: ScanWindow,
) -> Result<(Vec<StoredMention>, usize)> {
    let raw = store.scan(window).await?;
    if raw.len() >= window.limit && window.limit > 0 {
        warn!(
            limit = window.limit,
            "scan reached its limit; older members in range were not considered"
        );
    }
    Ok(decode_members(raw))
}

/// Remove each member by exact value. Returns (removed, not_removed).
async fn remove_all<'a, S, I>(store: &S, members: I) -> Result<(usize, usize)>
where
    S: MentionStore + ?Sized,
    I: IntoIterator<Item = &'a str>,
{
    let (mut removed, mut missing) = (0, 0);
    for member in members {
        if store.remove(member).await? {
            removed += 1;
        } else {
            debug!("member no longer present");
            missing += 1;
        }
    }
    Ok((removed, missing))
}

/// Windowed resolution pass: canon, exact title and fuzzy aggregator drops.
pub async fn run_cleanup<S: MentionStore + ?Sized>(
    store: &S,
    config: &DedupConfig,
    request: CleanupRequest,
    now: DateTime<Utc>,
) -> Result<CleanupReport> {
    config.validate()?;
    let since = request.window.start(now, &config.timezone)?;
    let (items, skipped) = scan_decoded(store, ScanWindow::since(since, config.scan_limit)).await?;

    let resolution = DuplicatePolicy::new(config).resolve(&items);
    let counts = resolution.counts();

    let (removed, not_removed) = match request.mode {
        Mode::Delete => {
            remove_all(store, resolution.drops.iter().map(|d| items[d.index].raw.as_str()).collect::<Vec<&str>>()).await?
        }
        Mode::Preview => (0, 0),
    };

    let sample = resolution
        .drops
        .iter()
        .take(config.sample_limit)
        .map(|d| {
            let m = &items[d.index].mention;
            DroppedSample {
                title: non_empty(&m.title),
                source: non_empty(&m.source),
                link: m.link.clone(),
                canon: m.canon.clone(),
                reason: d.reason,
            }
        })
        .collect();

    let report = CleanupReport {
        mode: request.mode,
        window: request.window.to_string(),
        scanned: items.len(),
        skipped,
        kept: resolution.kept.len(),
        dropped: counts.total(),
        drops_by_reason: counts,
        removed,
        not_removed,
        sample,
    };
    info!(
        mode = ?report.mode,
        window = %report.window,
        scanned = report.scanned,
        dropped = report.dropped,
        removed = report.removed,
        "cleanup pass complete"
    );
    Ok(report)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonSweepReport {
    pub scanned: usize,
    pub skipped: usize,
    pub unique: usize,
    pub removed: usize,
    pub not_removed: usize,
}

/// Newest-N sweep keeping the newest member per canonical link. Always applies.
pub async fn run_canon_sweep<S: MentionStore + ?Sized>(
    store: &S,
    config: &DedupConfig,
) -> Result<CanonSweepReport> {
    let scan = ScanWindow::newest(config.canon_sweep_depth);
    let (items, skipped) = scan_decoded(store, scan).await?;
    let plan = plan_canon_sweep(&items, config);
    let members: Vec<&str> = plan.drops.iter().map(|&i| items[i].raw.as_str()).collect();
    let (removed, not_removed) = remove_all(store, members).await?;
    info!(scanned = items.len(), unique = plan.unique, removed, "canon sweep complete");
    Ok(CanonSweepReport {
        scanned: items.len(),
        skipped,
        unique: plan.unique,
        removed,
        not_removed,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweptMention {
    pub id: String,
    pub title: String,
    pub source: String,
    pub published_ts: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateGroupSample {
    pub normalized_title: String,
    pub keep: SweptMention,
    pub remove: Vec<SweptMention>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TitleSweepReport {
    pub dry_run: bool,
    pub threshold: f64,
    pub scanned: usize,
    pub skipped: usize,
    pub groups: usize,
    pub duplicate_groups: usize,
    pub duplicates: usize,
    pub removed: usize,
    pub remaining: usize,
    pub sample: Vec<DuplicateGroupSample>,
}

fn swept(s: &StoredMention) -> SweptMention {
    SweptMention {
        id: s.mention.id.clone(),
        title: s.mention.title.clone(),
        source: s.mention.source.clone(),
        published_ts: s.ts(),
    }
}

/// Levenshtein-ratio grouping over fingerprints; the oldest of each group is kept.
pub async fn run_title_sweep<S: MentionStore + ?Sized>(
    store: &S,
    config: &DedupConfig,
    threshold: Option<f64>,
    dry_run: bool,
) -> Result<TitleSweepReport> {
    let threshold = threshold.unwrap_or(config.title_similarity);
    if !(threshold > 0.0 && threshold <= 1.0) {
        return Err(NdError::InvalidRequest(format!(
            "threshold must be within (0, 1], got {threshold}"
        )));
    }
    let (items, skipped) = scan_decoded(store, ScanWindow::newest(config.scan_limit)).await?;
    let groups = plan_title_sweep(&items, threshold);
    let duplicate_groups: Vec<_> = groups.iter().filter(|g| g.members.len() > 1).collect();
    let duplicates: usize = duplicate_groups.iter().map(|g| g.duplicates().len()).sum();

    let removed = if dry_run {
        0
    } else {
        let items_ref = &items;
        let members: Vec<&str> = duplicate_groups
            .iter()
            .flat_map(move |g| g.duplicates().iter().map(move |&i| items_ref[i].raw.as_str()))
            .collect();
        remove_all(store, members).await?.0
    };

    let sample = duplicate_groups
        .iter()
        .take(config.sample_limit)
        .map(|g| DuplicateGroupSample {
            normalized_title: fingerprint(&items[g.keep()].mention.title),
            keep: swept(&items[g.keep()]),
            remove: g.duplicates().iter().map(|&i| swept(&items[i])).collect(),
        })
        .collect();

    let remaining = items.len() - if dry_run { duplicates } else { removed };
    info!(
        scanned = items.len(),
        groups = groups.len(),
        duplicates,
        removed,
        dry_run,
        "title sweep complete"
    );
    Ok(TitleSweepReport {
        dry_run,
        threshold,
        scanned: items.len(),
        skipped,
        groups: groups.len(),
        duplicate_groups: duplicate_groups.len(),
        duplicates,
        removed,
        remaining,
        sample,
    })
}
