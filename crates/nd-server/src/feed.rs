//! Newest-first mention retrieval with simple filters.

use nd_core::{Mention, Result, ScanWindow};
use nd_dedup::pass::decode_members;
use nd_storage::MentionStore;
use serde::Deserialize;

pub const DEFAULT_LIMIT: usize = 300;
pub const MAX_LIMIT: usize = 1000;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedQuery {
    pub limit: Option<String>,
    pub origin: Option<String>,
    pub section: Option<String>,
    pub q: Option<String>,
}

impl FeedQuery {
    /// Clamped to `1..=1000`; missing or unparseable means 300.
    pub fn limit(&self) -> usize {
        self.limit
            .as_deref()
            .and_then(|l| l.trim().parse::<i64>().ok())
            .map(|l| l.clamp(1, MAX_LIMIT as i64) as usize)
            .unwrap_or(DEFAULT_LIMIT)
    }

    fn origin(&self) -> Option<String> {
        non_blank(&self.origin).map(|o| o.to_lowercase())
    }

    fn section(&self) -> Option<&str> {
        non_blank(&self.section)
    }

    fn needle(&self) -> Option<String> {
        non_blank(&self.q).map(|q| q.to_lowercase())
    }

    fn is_filtered(&self) -> bool {
        self.origin().is_some() || self.section().is_some() || self.needle().is_some()
    }

    pub fn matches(&self, m: &Mention) -> bool {
        if let Some(origin) = self.origin() {
            let have = m.origin.as_ref().map(|o| o.as_str().to_lowercase()).unwrap_or_default();
            if have != origin {
                return false;
            }
        }
        if let Some(section) = self.section() {
            if m.section.as_deref().unwrap_or("") != section {
                return false;
            }
        }
        if let Some(q) = self.needle() {
            let hit = m.title.to_lowercase().contains(&q)
                || m.source.to_lowercase().contains(&q)
                || m.matched.iter().any(|t| t.to_lowercase().contains(&q));
            if !hit {
                return false;
            }
        }
        true
    }
}

fn non_blank(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Up to `query.limit()` mentions, newest first. Filtered queries look at
/// the newest `scan_limit` members.
pub async fn list_mentions<S: MentionStore + ?Sized>(
    store: &S,
    query: &FeedQuery,
    scan_limit: usize,
) -> Result<Vec<Mention>> {
    let limit = query.limit();
    let depth = if query.is_filtered() {
        scan_limit.max(limit)
    } else {
        limit
    };
    let (items, _) = decode_members(store.scan(ScanWindow::newest(depth)).await?);

    let mut out: Vec<(i64, Mention)> = items
        .into_iter()
        .filter(|s| query.matches(&s.mention))
        .map(|s| (s.ts(), s.mention))
        .collect();
    out.sort_by(|a, b| b.0.cmp(&a.0));
    out.truncate(limit);
    Ok(out.into_iter().map(|(_, m)| m).collect())
}
