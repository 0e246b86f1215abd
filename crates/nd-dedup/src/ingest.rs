//! Normalizing raw records from webhooks and collectors into stored mentions.

use crate::canon::canonical_key;
use chrono::{DateTime, SecondsFormat, Utc};
use nd_core::config::{DedupConfig, IngestConfig};
use nd_core::{Mention, Origin, Result};
use nd_storage::MentionStore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

/// A record as posted by an upstream adapter. Everything is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncomingMention {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub origin: Option<Origin>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub published: Option<String>,
    #[serde(default)]
    pub published_ts: Option<i64>,
    #[serde(default)]
    pub matched: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub received: usize,
    pub stored: usize,
    pub skipped_seen: usize,
    pub rejected: usize,
    pub trimmed: usize,
}

fn parse_published(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .map(|dt| dt.timestamp())
        .ok()
}

/// Configured keywords found in `text`, case-insensitively, in config order.
pub fn match_keywords(text: &str, keywords: &[String]) -> Vec<String> {
    let haystack = text.to_lowercase();
    keywords
        .iter()
        .filter(|k| !k.is_empty() && haystack.contains(k.to_lowercase().as_str()))
        .cloned()
        .collect()
}

/// Build the stored form of an incoming record, or `None` when it has neither
/// a title nor a link.
///
/// Records without a parseable link get no `canon`; their id then comes from
/// title, source and timestamp.
pub fn build_mention(
    incoming: IncomingMention,
    dedup: &DedupConfig,
    ingest: &IngestConfig,
    now: DateTime<Utc>,
) -> Option<Mention> {
    let title = incoming.title.as_deref().map(str::trim).unwrap_or("").to_string();
    // Providers use "#" as a placeholder for "no link".
    let link = incoming
        .link
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty() && *l != "#")
        .map(str::to_string);
    if title.is_empty() && link.is_none() {
        return None;
    }

    let ts = incoming
        .published_ts
        .filter(|ts| *ts > 0)
        .or_else(|| incoming.published.as_deref().and_then(parse_published))
        .unwrap_or_else(|| now.timestamp());
    let published = DateTime::<Utc>::from_timestamp(ts, 0)
        .unwrap_or(now)
        .to_rfc3339_opts(SecondsFormat::Secs, true);

    let canon = link
        .as_deref()
        .and_then(|l| canonical_key(l, &dedup.tracking_params));

    let text = format!("{title}\n{}", link.as_deref().unwrap_or(""));
    let tags = incoming.matched.unwrap_or_default();
    let mut matched: Vec<String> = Vec::new();
    for tag in tags.into_iter().chain(match_keywords(&text, &ingest.keywords)) {
        if !tag.is_empty() && !matched.contains(&tag) {
            matched.push(tag);
        }
    }

    let title = if title.is_empty() {
        "(untitled)".to_string()
    } else {
        title
    };
    let mut mention = Mention::new(
        title,
        link,
        incoming.source.filter(|s| !s.trim().is_empty()).unwrap_or_default(),
        ts,
    )
    .with_origin(incoming.origin.unwrap_or(Origin::Rss));
    mention.canon = canon;
    mention.section = incoming.section;
    mention.provider = incoming.provider;
    mention.published = Some(published);
    mention.matched = matched;
    mention.extra = incoming.extra;
    // Identity is always derived here, never taken from the sender.
    for key in ["id", "canon"] {
        mention.extra.remove(key);
    }
    mention.assign_id();
    Some(mention)
}

/// Store each record once per id, then enforce the retention cap.
pub async fn run_ingest<S: MentionStore + ?Sized>(
    store: &S,
    dedup: &DedupConfig,
    ingest: &IngestConfig,
    items: Vec<IncomingMention>,
    now: DateTime<Utc>,
) -> Result<IngestReport> {
    let mut report = IngestReport { received: items.len(), ..Default::default() };

    for incoming in items {
        let Some(mention) = build_mention(incoming, dedup, ingest, now) else {
            report.rejected += 1;
            continue;
        };
        if !store.mark_seen(&mention.id).await? {
            debug!(id = %mention.id, "already seen");
            report.skipped_seen += 1;
            continue;
        }
        store.add(mention.published_ts, &mention.to_json()?).await?;
        report.stored += 1;
    }

    if report.stored > 0 {
        report.trimmed = store.trim_oldest(ingest.max_mentions).await?;
    }
    info!(
        received = report.received,
        stored = report.stored,
        skipped_seen = report.skipped_seen,
        trimmed = report.trimmed,
        "ingest complete"
    );
    Ok(report)
}
