//! Read-only reports over stored mentions: source mix, volume and sentiment,
//! and monitoring spikes.

use crate::canon::host_of;
use crate::pass::scan_decoded;
use chrono::{DateTime, SecondsFormat, Utc};
use nd_core::config::DedupConfig;
use nd_core::{Mention, Origin, Result, ScanWindow, StoredMention, Window};
use nd_storage::MentionStore;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;
use tracing::info;

const SAMPLE_TITLES: usize = 3;
const HOUR: i64 = 3600;

static RE_STATUS_COUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([\d.,]+)\s*(K|M|B)?\s*(?:social\s*)?mentions").unwrap()
});
static RE_STATUS_PCT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"↑\s*([0-9]+)%").unwrap());

// ========== Sources ==========

/// Why a source is worth a second look before it is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFlag {
    Video,
    Social,
    Blog,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OriginCount {
    pub origin: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceStat {
    pub source: String,
    pub count: usize,
    pub percentage: f64,
    pub origins: BTreeMap<String, usize>,
    pub aggregator: bool,
    pub flag: Option<SourceFlag>,
    pub sample_titles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceReport {
    pub window: String,
    pub scanned: usize,
    pub skipped: usize,
    pub unique_sources: usize,
    pub by_origin: Vec<OriginCount>,
    pub flagged_sources: usize,
    pub flagged_mentions: usize,
    pub sources: Vec<SourceStat>,
}

/// Lowercased source with `www.`/`amp.` dropped; the provider stands in for a
/// missing source, and `unknown` for both.
pub fn normalize_source(m: &Mention) -> String {
    let raw = Some(m.source.as_str())
        .filter(|s| !s.trim().is_empty())
        .or_else(|| m.provider.as_deref().filter(|p| !p.trim().is_empty()))
        .unwrap_or("unknown");
    let lower = raw.trim().to_lowercase();
    let stripped = lower
        .strip_prefix("www.")
        .or_else(|| lower.strip_prefix("amp."))
        .unwrap_or(&lower);
    stripped.to_string()
}

pub fn source_flag(source: &str) -> Option<SourceFlag> {
    const VIDEO: &[&str] = &["youtube.com", "youtu.be"];
    const SOCIAL: &[&str] = &["twitter.com", "x.com", "facebook.com", "reddit.com", "tiktok.com"];
    const BLOG: &[&str] = &["blog", "wordpress", "medium.com", "substack.com"];

    if source.is_empty() || source == "unknown" {
        Some(SourceFlag::Unknown)
    } else if VIDEO.iter().any(|p| source.contains(p)) {
        Some(SourceFlag::Video)
    } else if SOCIAL.iter().any(|p| source.contains(p)) {
        Some(SourceFlag::Social)
    } else if BLOG.iter().any(|p| source.contains(p)) {
        Some(SourceFlag::Blog)
    } else {
        None
    }
}

fn origin_label(m: &Mention) -> String {
    m.origin
        .as_ref()
        .map(Origin::as_str)
        .unwrap_or("unknown")
        .to_string()
}

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (count as f64 * 10_000.0 / total as f64).round() / 100.0
}

fn origin_counts<'a>(items: impl IntoIterator<Item = &'a StoredMention>) -> Vec<OriginCount> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for s in items {
        *counts.entry(origin_label(&s.mention)).or_default() += 1;
    }
    let mut out: Vec<OriginCount> = counts
        .into_iter()
        .map(|(origin, count)| OriginCount { origin, count })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.origin.cmp(&b.origin)));
    out
}

/// Per-source counts, most prolific first; ties sort by name.
pub fn source_breakdown(items: &[StoredMention], config: &DedupConfig) -> Vec<SourceStat> {
    let mut by_source: BTreeMap<String, SourceStat> = BTreeMap::new();
    for s in items {
        let m = &s.mention;
        let source = normalize_source(m);
        let stat = by_source.entry(source.clone()).or_insert_with(|| SourceStat {
            flag: source_flag(&source),
            source,
            count: 0,
            percentage: 0.0,
            origins: BTreeMap::new(),
            aggregator: false,
            sample_titles: Vec::new(),
        });
        stat.count += 1;
        *stat.origins.entry(origin_label(m)).or_default() += 1;
        let host = m.identity_link().and_then(host_of);
        if host.is_some_and(|h| config.is_aggregator_host(&h)) {
            stat.aggregator = true;
        }
        if stat.sample_titles.len() < SAMPLE_TITLES {
            stat.sample_titles.push(m.title.clone());
        }
    }

    let mut stats: Vec<SourceStat> = by_source.into_values().collect();
    for stat in &mut stats {
        stat.percentage = percentage(stat.count, items.len());
    }
    stats.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.source.cmp(&b.source)));
    stats
}

/// Source mix over a window, or over the newest `scan_limit` members when
/// no window is given.
pub async fn run_source_report<S: MentionStore + ?Sized>(
    store: &S,
    config: &DedupConfig,
    window: Option<Window>,
    now: DateTime<Utc>,
) -> Result<SourceReport> {
    let scan = match window {
        Some(w) => ScanWindow::since(w.start(now, &config.timezone)?, config.scan_limit),
        None => ScanWindow::newest(config.scan_limit),
    };
    let (items, skipped) = scan_decoded(store, scan).await?;
    let sources = source_breakdown(&items, config);
    let flagged: Vec<&SourceStat> = sources.iter().filter(|s| s.flag.is_some()).collect();

    let report = SourceReport {
        window: window.map_or_else(|| "all".to_string(), |w| w.to_string()),
        scanned: items.len(),
        skipped,
        unique_sources: sources.len(),
        by_origin: origin_counts(&items),
        flagged_sources: flagged.len(),
        flagged_mentions: flagged.iter().map(|s| s.count).sum(),
        sources,
    };
    info!(
        window = %report.window,
        scanned = report.scanned,
        sources = report.unique_sources,
        "source report complete"
    );
    Ok(report)
}

// ========== Overview ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_ascii_lowercase();
        if raw.is_empty() {
            None
        } else if raw.starts_with("pos") {
            Some(SentimentLabel::Positive)
        } else if raw.starts_with("neg") {
            Some(SentimentLabel::Negative)
        } else {
            Some(SentimentLabel::Neutral)
        }
    }

    fn from_score(score: f64) -> Self {
        if score > 0.0 {
            SentimentLabel::Positive
        } else if score < 0.0 {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sentiment {
    pub label: SentimentLabel,
    pub score: Option<f64>,
}

/// Sentiment carried by a provider in the record's extra fields: `sentiment`
/// as a label, a number or `{label, score}`, plus an optional `sentiment_score`.
pub fn sentiment_of(m: &Mention) -> Option<Sentiment> {
    let (mut label, mut score) = match m.extra.get("sentiment") {
        Some(Value::String(s)) => (SentimentLabel::parse(s), None),
        Some(Value::Number(n)) => (None, n.as_f64()),
        Some(Value::Object(o)) => (
            o.get("label").and_then(Value::as_str).and_then(SentimentLabel::parse),
            o.get("score").and_then(Value::as_f64),
        ),
        _ => (None, None),
    };
    if score.is_none() {
        score = m.extra.get("sentiment_score").and_then(Value::as_f64);
    }
    if label.is_none() {
        label = score.map(SentimentLabel::from_score);
    }
    label.map(|label| Sentiment { label, score })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SentimentSummary {
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
    pub unscored: usize,
    pub average_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentimentSample {
    pub id: String,
    pub title: String,
    pub source: String,
    pub published_ts: i64,
    pub sentiment: Sentiment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HourBucket {
    pub start: i64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub window: String,
    pub since: i64,
    pub total: usize,
    pub skipped: usize,
    pub by_origin: Vec<OriginCount>,
    pub hourly: Vec<HourBucket>,
    pub sentiment: SentimentSummary,
    pub latest: Option<SentimentSample>,
}

/// Hour-aligned buckets from the hour containing `since` through the one
/// containing `now`, empty hours included.
pub fn hourly_volume(items: &[StoredMention], since: i64, now: i64) -> Vec<HourBucket> {
    let first = since.div_euclid(HOUR) * HOUR;
    let last = now.max(since).div_euclid(HOUR) * HOUR;
    let mut buckets: Vec<HourBucket> = (first..=last)
        .step_by(HOUR as usize)
        .map(|start| HourBucket { start, count: 0 })
        .collect();
    for s in items {
        let ts = s.ts();
        if ts < since || ts > now {
            continue;
        }
        let slot = ((ts.div_euclid(HOUR) * HOUR - first) / HOUR) as usize;
        if let Some(b) = buckets.get_mut(slot) {
            b.count += 1;
        }
    }
    buckets
}

/// Volume and sentiment over newest-first items.
pub fn overview(items: &[StoredMention], window: Window, since: i64, now: i64) -> Overview {
    let mut summary = SentimentSummary::default();
    let mut latest = None;
    let (mut total_score, mut scored) = (0.0, 0usize);

    for s in items {
        let Some(sentiment) = sentiment_of(&s.mention) else {
            summary.unscored += 1;
            continue;
        };
        match sentiment.label {
            SentimentLabel::Positive => summary.positive += 1,
            SentimentLabel::Negative => summary.negative += 1,
            SentimentLabel::Neutral => summary.neutral += 1,
        }
        if let Some(score) = sentiment.score {
            total_score += score;
            scored += 1;
        }
        if latest.is_none() {
            latest = Some(SentimentSample {
                id: s.mention.id.clone(),
                title: s.mention.title.clone(),
                source: s.mention.source.clone(),
                published_ts: s.ts(),
                sentiment,
            });
        }
    }
    if scored > 0 {
        summary.average_score = Some(total_score / scored as f64);
    }

    Overview {
        window: window.to_string(),
        since,
        total: items.len(),
        skipped: 0,
        by_origin: origin_counts(items),
        hourly: hourly_volume(items, since, now),
        sentiment: summary,
        latest,
    }
}

pub async fn run_overview<S: MentionStore + ?Sized>(
    store: &S,
    config: &DedupConfig,
    window: Window,
    now: DateTime<Utc>,
) -> Result<Overview> {
    let since = window.start(now, &config.timezone)?;
    let (items, skipped) = scan_decoded(store, ScanWindow::since(since, config.scan_limit)).await?;
    let mut report = overview(&items, window, since, now.timestamp());
    report.skipped = skipped;
    info!(
        window = %report.window,
        total = report.total,
        positive = report.sentiment.positive,
        negative = report.sentiment.negative,
        "overview complete"
    );
    Ok(report)
}

// ========== Spikes ==========

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Spike {
    pub title: String,
    pub platform: &'static str,
    pub spike_percentage: Option<u32>,
    pub mention_count: Option<u64>,
    pub detected_at: String,
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpikeReport {
    pub window: String,
    pub scanned: usize,
    pub spikes: Vec<Spike>,
}

/// `(mention_count, spike_percentage)` from a monitoring status line such as
/// `2.4K Social mentions ↑ 76%`.
pub fn parse_status_line(line: &str) -> Option<(Option<u64>, Option<u32>)> {
    let count = RE_STATUS_COUNT.captures(line).and_then(|c| {
        let n: f64 = c[1].replace(',', "").parse().ok()?;
        let unit = c.get(2).map(|u| u.as_str().to_ascii_uppercase());
        let scale = match unit.as_deref() {
            Some("K") => 1e3,
            Some("M") => 1e6,
            Some("B") => 1e9,
            _ => 1.0,
        };
        Some((n * scale).round() as u64)
    });
    let pct = RE_STATUS_PCT.captures(line).and_then(|c| c[1].parse().ok());
    if count.is_none() && pct.is_none() {
        None
    } else {
        Some((count, pct))
    }
}

fn is_monitoring_alert(m: &Mention) -> bool {
    let eq = |v: Option<&str>| v.is_some_and(|s| s.eq_ignore_ascii_case("meltwater"));
    m.origin == Some(Origin::Meltwater)
        || eq(m.section.as_deref())
        || eq(m.provider.as_deref())
        || m.matched.iter().any(|t| t.eq_ignore_ascii_case("meltwater-alert"))
}

fn status_line(m: &Mention) -> Option<&str> {
    m.extra
        .get("statusLine")
        .or_else(|| m.extra.get("provider_raw").and_then(|v| v.get("statusLine")))
        .or_else(|| m.extra.get("provider_meta").and_then(|v| v.get("statusLine")))
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn platform_of(title: &str, status: &str) -> &'static str {
    let text = format!("{title} {status}").to_lowercase();
    if text.contains("twitter") || text.contains("x ") {
        "x"
    } else if text.contains("reddit") {
        "reddit"
    } else if text.contains("social") {
        "social"
    } else if text.contains("news") {
        "news"
    } else {
        "social"
    }
}

/// Monitoring alerts whose status line reports a volume change, newest first,
/// one per title and platform.
pub fn detect_spikes(items: &[StoredMention]) -> Vec<Spike> {
    let mut ordered: Vec<&StoredMention> = items.iter().collect();
    ordered.sort_by(|a, b| b.ts().cmp(&a.ts()));

    let mut seen = HashSet::new();
    let mut spikes = Vec::new();
    for s in ordered {
        let m = &s.mention;
        if !is_monitoring_alert(m) {
            continue;
        }
        let Some(status) = status_line(m) else { continue };
        let Some((mention_count, spike_percentage)) = parse_status_line(status) else {
            continue;
        };
        let platform = platform_of(&m.title, status);
        if !seen.insert((m.title.clone(), platform)) {
            continue;
        }
        let detected_at = DateTime::<Utc>::from_timestamp(s.ts(), 0)
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default();
        spikes.push(Spike {
            title: m.title.clone(),
            platform,
            spike_percentage,
            mention_count,
            detected_at,
            link: m.link.clone(),
        });
    }
    spikes
}

pub async fn run_spike_report<S: MentionStore + ?Sized>(
    store: &S,
    config: &DedupConfig,
    window: Window,
    now: DateTime<Utc>,
) -> Result<SpikeReport> {
    let since = window.start(now, &config.timezone)?;
    let (items, _) = scan_decoded(store, ScanWindow::since(since, config.scan_limit)).await?;
    let spikes = detect_spikes(&items);
    info!(window = %window, scanned = items.len(), spikes = spikes.len(), "spike report complete");
    Ok(SpikeReport { window: window.to_string(), scanned: items.len(), spikes })
}
