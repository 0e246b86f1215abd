use crate::*;
use crate::ingest::{build_mention, match_keywords, run_ingest, IncomingMention};
use crate::pass::decode_members;
use crate::similarity::ratio_upper_bound;
use crate::sweep::{plan_canon_sweep, plan_title_sweep};
use crate::title::clean_title;
use chrono::{TimeZone, Utc};
use nd_core::config::{DedupConfig, IngestConfig};
use nd_core::{mention_id, Mention, Origin, ScanWindow, StoredMention, Window};
use nd_storage::{MemoryStore, MentionStore, RawMember};
use async_trait::async_trait;
use std::collections::BTreeSet;

const NOW: i64 = 1_700_000_000;
const DEFAULT_TRACKING: &[&str] = nd_core::config::DEFAULT_TRACKING_PARAMS;

fn stored(id: &str, title: &str, link: &str, ts: i64) -> StoredMention {
    let mut m = Mention::new(title, Some(link.to_string()), "Outlet", ts);
    m.id = id.to_string();
    StoredMention::decode(m.to_json().unwrap(), ts).unwrap()
}

fn set(words: &[&str]) -> BTreeSet<String> {
    words.iter().map(|w| w.to_string()).collect()
}

fn dropped_with(res: &Resolution, reason: DropReason) -> Vec<usize> {
    res.drops.iter().filter(|d| d.reason == reason).map(|d| d.index).collect()
}

// ========== Canonicalization ==========

#[test]
fn test_canonicalize_strips_noise() {
    assert_eq!(
        canonicalize("https://x.com/a?utm_source=y&ref=z#top"),
        canonicalize("https://X.com/a/")
    );
    assert_eq!(canonicalize("https://X.com/a/"), "https://x.com/a");
}

#[test]
fn test_canonicalize_keeps_meaningful_query() {
    assert_eq!(
        canonicalize("https://example.com/story?id=5&utm_medium=email&fbclid=abc"),
        "https://example.com/story?id=5"
    );
}

#[test]
fn test_canonicalize_idempotent() {
    for input in [
        "https://example.com/a//",
        "https://example.com/",
        "https://Example.COM/path/?gclid=1#frag",
        "https://example.com/x?b=2&a=1",
        "not a url",
        "",
    ] {
        let once = canonicalize(input);
        assert_eq!(canonicalize(&once), once, "not a fixed point: {input:?}");
    }
    assert_eq!(canonicalize("https://example.com/a//"), "https://example.com/a");
}

#[test]
fn test_canonicalize_unparseable_is_trimmed() {
    assert_eq!(canonicalize("  Senate passes bill  "), "Senate passes bill");
}

#[test]
fn test_canonical_key_requires_a_parseable_link() {
    assert_eq!(canonical_key("not a url", DEFAULT_TRACKING), None);
    assert_eq!(canonical_key("   ", DEFAULT_TRACKING), None);
    assert_eq!(canonical_key("Senate passes bill", DEFAULT_TRACKING), None);
    assert_eq!(
        canonical_key(" https://A.com/x/?utm_source=y ", DEFAULT_TRACKING).as_deref(),
        Some("https://a.com/x")
    );
}

#[test]
fn test_canonicalize_with_custom_params() {
    let url = "https://example.com/a?session=9&id=1";
    assert_eq!(canonicalize_with(url, &["session"]), "https://example.com/a?id=1");
    assert_eq!(canonicalize(url), url);
}

#[test]
fn test_host_of() {
    assert_eq!(host_of("https://News.CryptoPanic.com/x").as_deref(), Some("news.cryptopanic.com"));
    assert_eq!(host_of("no scheme here"), None);
}

// ========== Titles ==========

#[test]
fn test_title_key_cuts_site_suffix() {
    assert_eq!(
        normalize_title_key("Hello — World | SiteName"),
        normalize_title_key("hello - world")
    );
    assert_eq!(normalize_title_key("Fed holds rates | Reuters"), "fed holds rates");
}

#[test]
fn test_title_key_quotes_and_whitespace() {
    assert_eq!(
        normalize_title_key("  \u{201C}Big\u{201D}   (news)  it\u{2019}s [here] "),
        "big news its here"
    );
    assert_eq!(normalize_title_key(""), "");
}

#[test]
fn test_title_tokens_min_length() {
    let tokens = title_tokens("SEC sues Binance over BTC trading - CoinDesk");
    assert_eq!(tokens, set(&["binance", "over", "sues", "trading"]));
    assert!(title_tokens("Up to us").is_empty());
}

#[test]
fn test_fingerprint_and_clean_title() {
    assert_eq!(clean_title("Tom &amp; Jerry <b>return</b>"), "Tom & Jerry return");
    assert_eq!(fingerprint("Bitcoin hits new high!"), "bitcoin hits new high");
    assert_eq!(fingerprint(&"a".repeat(300)).chars().count(), 100);
    assert_eq!(fingerprint(""), "");
}

// ========== Similarity ==========

#[test]
fn test_jaccard_properties() {
    let a = set(&["bitcoin", "surges", "past"]);
    let b = set(&["surges", "past", "record"]);
    assert_eq!(jaccard(&a, &a), 1.0);
    assert_eq!(jaccard(&a, &b), jaccard(&b, &a));
    assert_eq!(jaccard(&a, &b), 0.5);
    assert_eq!(jaccard(&BTreeSet::new(), &BTreeSet::new()), 0.0);
    assert_eq!(jaccard(&a, &BTreeSet::new()), 0.0);
}

#[test]
fn test_levenshtein_ratio() {
    assert_eq!(levenshtein("kitten", "sitting"), 3);
    assert_eq!(levenshtein("", "abc"), 3);
    assert!((similarity_ratio("abc", "abd") - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(similarity_ratio("", ""), 1.0);
    assert_eq!(ratio_upper_bound("ab", "abcd"), 0.5);
    assert!(similarity_ratio("ab", "abcd") <= ratio_upper_bound("ab", "abcd"));
}

// ========== Resolution policy ==========

#[test]
fn test_canon_group_keeps_newest() {
    let cfg = DedupConfig::default();
    let items = vec![
        stored("m_1", "Senate advances stablecoin bill", "https://outlet.com/story", 100),
        stored("m_2", "Senate advances bill (updated)", "https://outlet.com/story/?ref=x", 200),
    ];
    let res = DuplicatePolicy::new(&cfg).resolve(&items);
    assert_eq!(res.kept, vec![1]);
    assert_eq!(dropped_with(&res, DropReason::ByCanon), vec![0]);
}

#[test]
fn test_canon_tie_breaks_on_smaller_id() {
    let cfg = DedupConfig::default();
    let items = vec![
        stored("m_b", "One", "https://outlet.com/a", 100),
        stored("m_a", "Two", "https://outlet.com/a", 100),
    ];
    let res = DuplicatePolicy::new(&cfg).resolve(&items);
    assert_eq!(res.kept, vec![1]);
}

#[test]
fn test_exact_title_prefers_original_over_aggregator() {
    let cfg = DedupConfig::default();
    let items = vec![
        stored("m_1", "Ether ETF approved - CryptoPanic", "https://cryptopanic.com/news/1", 300),
        stored("m_2", "Ether ETF approved | The Block", "https://theblock.co/post/9", 100),
    ];
    let res = DuplicatePolicy::new(&cfg).resolve(&items);
    assert_eq!(res.kept, vec![1]);
    assert_eq!(dropped_with(&res, DropReason::ByTitleExact), vec![0]);
}

#[test]
fn test_exact_title_among_originals_keeps_newest() {
    let cfg = DedupConfig::default();
    let items = vec![
        stored("m_1", "Ether ETF approved", "https://a.com/1", 100),
        stored("m_2", "Ether ETF approved", "https://b.com/2", 200),
        stored("m_3", "Ether ETF approved", "https://cryptopanic.com/n/3", 300),
    ];
    let res = DuplicatePolicy::new(&cfg).resolve(&items);
    assert_eq!(res.kept, vec![1]);
    assert_eq!(res.counts().by_title_exact, 2);
}

#[test]
fn test_exact_title_aggregators_only_keep_newest() {
    let cfg = DedupConfig::default();
    let items = vec![
        stored("m_1", "Ether ETF approved", "https://cryptopanic.com/n/1", 100),
        stored("m_2", "Ether ETF approved", "https://www.cryptopanic.com/n/2", 200),
    ];
    let res = DuplicatePolicy::new(&cfg).resolve(&items);
    assert_eq!(res.kept, vec![1]);
}

#[test]
fn test_fuzzy_drops_similar_aggregator() {
    let cfg = DedupConfig::default();
    let items = vec![
        stored("m_1", "Solana validators approve upgrade", "https://outlet.com/sol", 100),
        stored("m_2", "Solana validators approve proposal", "https://cryptopanic.com/n/2", 200),
    ];
    let res = DuplicatePolicy::new(&cfg).resolve(&items);
    assert_eq!(res.kept, vec![0]);
    assert_eq!(res.drops.len(), 1);
    assert_eq!(res.drops[0].reason, DropReason::ByTitleFuzzy);
    assert!((res.drops[0].similarity.unwrap() - 0.6).abs() < 1e-9);
}

#[test]
fn test_fuzzy_keeps_dissimilar_aggregator() {
    let cfg = DedupConfig::default();
    let items = vec![
        stored("m_1", "Solana validators approve upgrade", "https://outlet.com/sol", 100),
        stored("m_2", "Solana validators reject", "https://cryptopanic.com/n/2", 200),
    ];
    let res = DuplicatePolicy::new(&cfg).resolve(&items);
    assert_eq!(res.kept, vec![0, 1]);
    assert!(res.drops.is_empty());
}

#[test]
fn test_fuzzy_never_drops_originals() {
    let cfg = DedupConfig::default();
    let items = vec![
        stored("m_1", "Solana validators approve upgrade", "https://a.com/1", 100),
        stored("m_2", "Solana validators approve proposal", "https://b.com/2", 200),
    ];
    let res = DuplicatePolicy::new(&cfg).resolve(&items);
    assert!(res.drops.is_empty());
}

#[test]
fn test_empty_or_tokenless_aggregator_title_kept() {
    let cfg = DedupConfig::default();
    let items = vec![
        stored("m_1", "Solana validators approve upgrade", "https://outlet.com/sol", 100),
        stored("m_2", "", "https://cryptopanic.com/n/2", 200),
        stored("m_3", "Up to us", "https://cryptopanic.com/n/3", 300),
    ];
    let res = DuplicatePolicy::new(&cfg).resolve(&items);
    assert_eq!(res.kept, vec![0, 1, 2]);
}

#[test]
fn test_threshold_is_configurable() {
    let cfg = DedupConfig { fuzzy_threshold: 0.7, ..DedupConfig::default() };
    let items = vec![
        stored("m_1", "Solana validators approve upgrade", "https://outlet.com/sol", 100),
        stored("m_2", "Solana validators approve proposal", "https://cryptopanic.com/n/2", 200),
    ];
    assert!(DuplicatePolicy::new(&cfg).resolve(&items).drops.is_empty());
}

#[test]
fn test_custom_aggregator_domains() {
    let cfg = DedupConfig {
        aggregator_domains: vec!["newsnow.co.uk".into()],
        ..DedupConfig::default()
    };
    let items = vec![
        stored("m_1", "Ether ETF approved", "https://cryptopanic.com/n/1", 300),
        stored("m_2", "Ether ETF approved", "https://outlet.com/2", 100),
    ];
    // Both count as originals now, so the newer one wins.
    let res = DuplicatePolicy::new(&cfg).resolve(&items);
    assert_eq!(res.kept, vec![0]);
}

#[test]
fn test_window_scenario() {
    let cfg = DedupConfig::default();
    let bill = "Senate committee advances stablecoin bill";
    let btc = "Bitcoin surges past record high as inflows climb";
    let btc_repost = "Bitcoin surges past record high, inflows climb further";
    let eth = "Ethereum developers schedule network upgrade";
    let items = vec![
        stored("m_1", bill, "https://outlet1.com/story", 500),
        stored("m_2", bill, "https://outlet1.com/story?utm_source=rss", 400),
        stored("m_3", btc, "https://outlet2.com/btc", 300),
        stored("m_4", btc_repost, "https://cryptopanic.com/news/4", 200),
        stored("m_5", eth, "https://cryptopanic.com/news/5", 100),
    ];
    let res = DuplicatePolicy::new(&cfg).resolve(&items);
    let counts = res.counts();
    assert_eq!(counts.by_canon, 1);
    assert_eq!(counts.by_title_exact, 0);
    assert_eq!(counts.by_title_fuzzy, 1);
    assert_eq!(res.kept, vec![0, 2, 4]);
    assert!(res.is_dropped(1));
    assert!(res.is_dropped(3));
}

#[test]
fn test_unparseable_link_not_grouped_by_canon() {
    let cfg = DedupConfig::default();
    let items = vec![
        stored("m_1", "Alpha story one", "not a url", 200),
        stored("m_2", "Beta entirely different", "not a url", 100),
    ];
    let res = DuplicatePolicy::new(&cfg).resolve(&items);
    assert_eq!(res.counts(), DropCounts::default());
    assert_eq!(res.kept, vec![0, 1]);
    assert!(res.drops.is_empty());
}

#[test]
fn test_resolution_is_order_independent() {
    let cfg = DedupConfig::default();
    let mut items = vec![
        stored("m_1", "Ether ETF approved", "https://a.com/1", 100),
        stored("m_2", "Ether ETF approved", "https://b.com/2", 100),
        stored("m_3", "Solana validators approve proposal", "https://cryptopanic.com/3", 100),
        stored("m_4", "Solana validators approve upgrade", "https://c.com/4", 100),
    ];
    let kept_ids = |items: &[StoredMention]| -> BTreeSet<String> {
        DuplicatePolicy::new(&cfg)
            .resolve(items)
            .kept
            .iter()
            .map(|&i| items[i].mention.id.clone())
            .collect()
    };
    let forward = kept_ids(&items);
    items.reverse();
    assert_eq!(kept_ids(&items), forward);
    assert_eq!(forward, set(&["m_1", "m_4"]));
}

// ========== Sweeps ==========

#[test]
fn test_plan_canon_sweep_first_wins() {
    let cfg = DedupConfig::default();
    let items = vec![
        stored("m_1", "A", "https://a.com/x", 300),
        stored("m_2", "A", "https://a.com/x/#frag", 200),
        stored("m_3", "B", "https://b.com/y", 100),
    ];
    let plan = plan_canon_sweep(&items, &cfg);
    assert_eq!(plan.unique, 2);
    assert_eq!(plan.drops, vec![1]);
}

#[test]
fn test_plan_canon_sweep_skips_unparseable_links() {
    let cfg = DedupConfig::default();
    let items = vec![
        stored("m_1", "A", "not a url", 300),
        stored("m_2", "B", "not a url", 200),
        stored("m_3", "C", "https://c.com/z", 100),
    ];
    let plan = plan_canon_sweep(&items, &cfg);
    assert_eq!(plan.unique, 1);
    assert!(plan.drops.is_empty());
}

#[test]
fn test_plan_title_sweep_keeps_oldest() {
    let items = vec![
        stored("m_1", "Bitcoin hits new high!", "https://a.com/1", 300),
        stored("m_2", "Bitcoin hits new high", "https://b.com/2", 100),
        stored("m_3", "Totally different headline", "https://c.com/3", 200),
    ];
    let groups = plan_title_sweep(&items, 0.85);
    assert_eq!(groups.len(), 2);
    let dup = groups.iter().find(|g| g.members.len() == 2).unwrap();
    assert_eq!(dup.keep(), 1);
    assert_eq!(dup.duplicates(), &[0]);
}

// ========== Ingest ==========

#[test]
fn test_build_mention_defaults() {
    let cfg = DedupConfig::default();
    let now = Utc.timestamp_opt(NOW, 0).unwrap();
    let incoming = IncomingMention {
        title: Some("  Fed holds rates ".into()),
        link: Some("https://Example.com/fed/?utm_source=rss".into()),
        published_ts: Some(NOW - 60),
        matched: Some(vec!["fed".into(), "fed".into(), "".into()]),
        ..Default::default()
    };
    let m = build_mention(incoming, &cfg, &IngestConfig::default(), now).unwrap();
    assert_eq!(m.title, "Fed holds rates");
    assert_eq!(m.canon.as_deref(), Some("https://example.com/fed"));
    assert_eq!(m.origin, Some(Origin::Rss));
    assert!(m.id.starts_with("m_"));
    assert_eq!(m.matched, vec!["fed".to_string()]);
    assert_eq!(m.published_ts, NOW - 60);
    assert_eq!(m.published.as_deref(), Some("2023-11-14T22:12:20Z"));
}

#[test]
fn test_build_mention_placeholder_link_and_origin_prefix() {
    let cfg = DedupConfig::default();
    let now = Utc.timestamp_opt(NOW, 0).unwrap();
    let incoming = IncomingMention {
        title: Some("X".into()),
        link: Some("#".into()),
        origin: Some(Origin::GoogleAlerts),
        published: Some("Tue, 14 Nov 2023 22:00:00 +0000".into()),
        ..Default::default()
    };
    let m = build_mention(incoming, &cfg, &IngestConfig::default(), now).unwrap();
    assert_eq!(m.link, None);
    assert_eq!(m.canon, None);
    assert_eq!(m.published_ts, NOW - 800);
    assert_eq!(m.id, mention_id("ga", &format!("X||{}", NOW - 800)));
}

#[test]
fn test_build_mention_rejects_empty() {
    let cfg = DedupConfig::default();
    let now = Utc.timestamp_opt(NOW, 0).unwrap();
    let ingest = IngestConfig::default();
    assert!(build_mention(IncomingMention::default(), &cfg, &ingest, now).is_none());
    let untitled = IncomingMention { link: Some("https://a.com/1".into()), ..Default::default() };
    let m = build_mention(untitled, &cfg, &IngestConfig::default(), now).unwrap();
    assert_eq!(m.title, "(untitled)");
    assert_eq!(m.published_ts, NOW);
}

#[test]
fn test_build_mention_ignores_sender_identity() {
    let cfg = DedupConfig::default();
    let now = Utc.timestamp_opt(NOW, 0).unwrap();
    let incoming: IncomingMention = serde_json::from_value(serde_json::json!({
        "id": "forged",
        "title": "Bill signed",
        "link": "https://a.com/bill",
        "reach": 1200
    }))
    .unwrap();
    let m = build_mention(incoming, &cfg, &IngestConfig::default(), now).unwrap();
    assert_ne!(m.id, "forged");
    assert!(!m.extra.contains_key("id"));
    assert_eq!(m.extra["reach"], 1200);
}

#[test]
fn test_build_mention_tags_keywords() {
    let cfg = DedupConfig::default();
    let ingest = IngestConfig {
        keywords: vec!["taiwan".into(), "export controls".into(), "tariff".into()],
        ..Default::default()
    };
    let now = Utc.timestamp_opt(NOW, 0).unwrap();
    let incoming = IncomingMention {
        title: Some("New Export Controls target chips".into()),
        link: Some("https://a.com/taiwan-news".into()),
        matched: Some(vec!["meltwater-alert".into(), "taiwan".into()]),
        ..Default::default()
    };
    let m = build_mention(incoming, &cfg, &ingest, now).unwrap();
    assert_eq!(m.matched, vec!["meltwater-alert", "taiwan", "export controls"]);
}

#[test]
fn test_match_keywords_case_insensitive() {
    let keywords = vec!["china".to_string(), "".to_string(), "beijing".to_string()];
    assert_eq!(match_keywords("CHINA responds", &keywords), vec!["china"]);
    assert!(match_keywords("Nothing here", &keywords).is_empty());
}

#[tokio::test]
async fn test_linkless_records_with_shared_title_stay_distinct() {
    let store = MemoryStore::new();
    let cfg = DedupConfig::default();
    let ingest = IngestConfig::default();
    let now = Utc.timestamp_opt(NOW, 0).unwrap();
    let briefing = |source: &str, ts: i64| IncomingMention {
        title: Some("Weekly China briefing".into()),
        source: Some(source.into()),
        origin: Some(Origin::Newsletter),
        published_ts: Some(ts),
        ..Default::default()
    };

    let a = build_mention(briefing("Axios China", NOW - 100), &cfg, &ingest, now).unwrap();
    let b = build_mention(briefing("Politico China", NOW - 50), &cfg, &ingest, now).unwrap();
    assert_eq!(a.canon, None);
    assert_eq!(b.canon, None);
    assert_ne!(a.id, b.id);
    assert!(a.id.starts_with("nl_"));
    let key = format!("Weekly China briefing|Axios China|{}", NOW - 100);
    assert_eq!(a.id, mention_id("nl", &key));

    let items = vec![briefing("Axios China", NOW - 100), briefing("Politico China", NOW - 50)];
    let report = run_ingest(&store, &cfg, &ingest, items, now).await.unwrap();
    assert_eq!(report.stored, 2);
    assert_eq!(report.skipped_seen, 0);

    let (stored_items, _) = decode_members(store.scan(ScanWindow::newest(10)).await.unwrap());
    let res = DuplicatePolicy::new(&cfg).resolve(&stored_items);
    assert_eq!(res.counts().by_canon, 0);
}

#[tokio::test]
async fn test_run_ingest_seen_and_trim() {
    let store = MemoryStore::new();
    let dedup = DedupConfig::default();
    let ingest = IngestConfig { max_mentions: 2, ..Default::default() };
    let now = Utc.timestamp_opt(NOW, 0).unwrap();
    let item = |title: &str, link: &str, ts: i64| IncomingMention {
        title: Some(title.into()),
        link: Some(link.into()),
        published_ts: Some(ts),
        ..Default::default()
    };
    let items = vec![
        item("One", "https://a.com/1", NOW - 300),
        item("One again", "https://a.com/1/", NOW - 200),
        item("Two", "https://a.com/2", NOW - 100),
        item("Three", "https://a.com/3", NOW),
        IncomingMention::default(),
    ];
    let report = run_ingest(&store, &dedup, &ingest, items, now).await.unwrap();
    assert_eq!(report.received, 5);
    assert_eq!(report.stored, 3);
    assert_eq!(report.skipped_seen, 1);
    assert_eq!(report.rejected, 1);
    assert_eq!(report.trimmed, 1);
    assert_eq!(store.count().await.unwrap(), 2);

    let again = run_ingest(&store, &dedup, &ingest, vec![item("Two", "https://a.com/2", NOW)], now)
        .await
        .unwrap();
    assert_eq!(again.skipped_seen, 1);
    assert_eq!(again.trimmed, 0);
}

// ========== Store passes ==========

async fn seed(store: &MemoryStore, items: &[StoredMention]) {
    for s in items {
        store.add(s.score, &s.raw).await.unwrap();
    }
}

fn scenario() -> Vec<StoredMention> {
    let bill = "Senate committee advances stablecoin bill";
    let eth = "Ethereum developers schedule network upgrade";
    vec![
        stored("m_1", bill, "https://outlet1.com/story", NOW - 3600),
        stored("m_2", bill, "https://outlet1.com/story/", NOW - 7200),
        stored("m_3", "Solana validators approve upgrade", "https://outlet2.com/sol", NOW - 1800),
        stored("m_4", "Solana validators approve proposal", "https://cryptopanic.com/4", NOW - 900),
        stored("m_5", eth, "https://cryptopanic.com/news/5", NOW - 600),
        // Outside a 24h window.
        stored("m_6", bill, "https://outlet1.com/story", NOW - 90_000),
    ]
}

#[tokio::test]
async fn test_run_cleanup_preview_leaves_store_untouched() {
    let store = MemoryStore::new();
    let items = scenario();
    seed(&store, &items).await;
    store.add(NOW - 100, "not json").await.unwrap();

    let cfg = DedupConfig::default();
    let request = CleanupRequest { window: Window::Hours(24), mode: Mode::Preview };
    let now = Utc.timestamp_opt(NOW, 0).unwrap();
    let report = run_cleanup(&store, &cfg, request, now).await.unwrap();

    assert_eq!(report.window, "24h");
    assert_eq!(report.scanned, 5);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.dropped, 2);
    assert_eq!(report.kept, 3);
    assert_eq!(report.drops_by_reason.by_canon, 1);
    assert_eq!(report.drops_by_reason.by_title_fuzzy, 1);
    assert_eq!(report.removed, 0);
    assert_eq!(report.sample.len(), 2);
    assert_eq!(store.count().await.unwrap(), 7);
}

#[tokio::test]
async fn test_run_cleanup_delete_removes_exact_members() {
    let store = MemoryStore::new();
    let items = scenario();
    seed(&store, &items).await;

    let cfg = DedupConfig::default();
    let now = Utc.timestamp_opt(NOW, 0).unwrap();
    let request = CleanupRequest { window: Window::Hours(24), mode: Mode::Delete };
    let report = run_cleanup(&store, &cfg, request, now).await.unwrap();

    assert_eq!(report.removed, 2);
    assert_eq!(report.not_removed, 0);
    assert!(!store.contains(&items[1].raw));
    assert!(!store.contains(&items[3].raw));
    assert!(store.contains(&items[0].raw));
    assert!(store.contains(&items[5].raw));

    let second = run_cleanup(&store, &cfg, request, now).await.unwrap();
    assert_eq!(second.dropped, 0);
}

/// Loses one member right after every scan, as when another writer removes
/// it between the scan and the delete.
struct VanishingStore {
    inner: MemoryStore,
    vanish: String,
}

#[async_trait]
impl MentionStore for VanishingStore {
    fn backend(&self) -> &'static str {
        "vanishing"
    }

    async fn scan(&self, window: ScanWindow) -> nd_core::Result<Vec<RawMember>> {
        let members = self.inner.scan(window).await?;
        self.inner.remove(&self.vanish).await?;
        Ok(members)
    }

    async fn add(&self, score: i64, member: &str) -> nd_core::Result<bool> {
        self.inner.add(score, member).await
    }

    async fn remove(&self, member: &str) -> nd_core::Result<bool> {
        self.inner.remove(member).await
    }

    async fn count(&self) -> nd_core::Result<usize> {
        self.inner.count().await
    }

    async fn trim_oldest(&self, keep: usize) -> nd_core::Result<usize> {
        self.inner.trim_oldest(keep).await
    }

    async fn mark_seen(&self, id: &str) -> nd_core::Result<bool> {
        self.inner.mark_seen(id).await
    }
}

#[tokio::test]
async fn test_run_cleanup_counts_members_gone_before_delete() {
    let items = scenario();
    let store = VanishingStore { inner: MemoryStore::new(), vanish: items[1].raw.clone() };
    seed(&store.inner, &items).await;

    let cfg = DedupConfig::default();
    let request = CleanupRequest { window: Window::Hours(24), mode: Mode::Delete };
    let report = run_cleanup(&store, &cfg, request, Utc.timestamp_opt(NOW, 0).unwrap())
        .await
        .unwrap();

    assert_eq!(report.dropped, 2);
    assert_eq!(report.removed, report.dropped - 1);
    assert_eq!(report.not_removed, 1);
    assert!(!store.inner.contains(&items[3].raw));
    assert!(store.inner.contains(&items[0].raw));
}

#[tokio::test]
async fn test_run_cleanup_sample_is_capped() {
    let store = MemoryStore::new();
    let items: Vec<StoredMention> = (0..5)
        .map(|i| stored(&format!("m_{i}"), "Same headline", &format!("https://a.com/{i}"), NOW - i))
        .collect();
    seed(&store, &items).await;

    let cfg = DedupConfig { sample_limit: 2, ..DedupConfig::default() };
    let request = CleanupRequest { window: Window::Hours(1), mode: Mode::Preview };
    let now = Utc.timestamp_opt(NOW, 0).unwrap();
    let report = run_cleanup(&store, &cfg, request, now).await.unwrap();
    assert_eq!(report.dropped, 4);
    assert_eq!(report.sample.len(), 2);
    assert_eq!(report.sample[0].reason, DropReason::ByTitleExact);
}

#[tokio::test]
async fn test_run_cleanup_rejects_bad_threshold() {
    let store = MemoryStore::new();
    let cfg = DedupConfig { fuzzy_threshold: 0.0, ..DedupConfig::default() };
    let request = CleanupRequest { window: Window::Today, mode: Mode::Preview };
    assert!(run_cleanup(&store, &cfg, request, Utc::now()).await.is_err());
}

#[tokio::test]
async fn test_run_canon_sweep() {
    let store = MemoryStore::new();
    let items = scenario();
    seed(&store, &items).await;

    let report = run_canon_sweep(&store, &DedupConfig::default()).await.unwrap();
    assert_eq!(report.scanned, 6);
    assert_eq!(report.removed, 2);
    assert!(store.contains(&items[0].raw));
    assert!(!store.contains(&items[1].raw));
    assert!(!store.contains(&items[5].raw));
}

#[tokio::test]
async fn test_run_title_sweep_dry_run_then_apply() {
    let store = MemoryStore::new();
    let items = vec![
        stored("m_1", "Bitcoin hits new high!", "https://a.com/1", NOW),
        stored("m_2", "Bitcoin hits new high", "https://b.com/2", NOW - 100),
        stored("m_3", "Totally different headline", "https://c.com/3", NOW - 50),
    ];
    seed(&store, &items).await;
    let cfg = DedupConfig::default();

    let preview = run_title_sweep(&store, &cfg, None, true).await.unwrap();
    assert_eq!(preview.threshold, 0.85);
    assert_eq!(preview.duplicate_groups, 1);
    assert_eq!(preview.duplicates, 1);
    assert_eq!(preview.removed, 0);
    assert_eq!(preview.remaining, 2);
    assert_eq!(preview.sample[0].keep.id, "m_2");
    assert_eq!(store.count().await.unwrap(), 3);

    let applied = run_title_sweep(&store, &cfg, None, false).await.unwrap();
    assert_eq!(applied.removed, 1);
    assert!(!store.contains(&items[0].raw));

    assert!(run_title_sweep(&store, &cfg, Some(1.5), true).await.is_err());
}

#[test]
fn test_decode_members_skips_garbage() {
    let good = stored("m_1", "A", "https://a.com", 1);
    let (items, skipped) = decode_members(vec![
        RawMember::new(good.raw.clone(), 1),
        RawMember::new("{broken", 2),
        RawMember::new("42", 3),
    ]);
    assert_eq!(items.len(), 1);
    assert_eq!(skipped, 2);
}

#[test]
fn test_mode_parse() {
    assert_eq!(Mode::parse(Some("delete")), Mode::Delete);
    assert_eq!(Mode::parse(Some(" DELETE ")), Mode::Delete);
    assert_eq!(Mode::parse(Some("yes")), Mode::Preview);
    assert_eq!(Mode::parse(None), Mode::Preview);
}

// ========== Analysis ==========

fn mention_with(
    id: &str,
    title: &str,
    source: &str,
    link: &str,
    ts: i64,
    configure: impl FnOnce(&mut Mention),
) -> StoredMention {
    let mut m = Mention::new(title, Some(link.to_string()), source, ts);
    m.id = id.to_string();
    configure(&mut m);
    StoredMention::decode(m.to_json().unwrap(), ts).unwrap()
}

#[test]
fn test_source_breakdown_merges_and_flags() {
    let cfg = DedupConfig::default();
    let rss = |m: &mut Mention| m.origin = Some(Origin::Rss);
    let items = vec![
        mention_with("m_1", "Fed holds", "www.CoinDesk.com", "https://coindesk.com/1", 700, rss),
        mention_with("m_2", "Fed cuts", "coindesk.com", "https://coindesk.com/2", 600, rss),
        mention_with("m_3", "Fed waits", "CoinDesk.com", "https://coindesk.com/3", 500, |m| {
            m.origin = Some(Origin::Newsletter)
        }),
        mention_with("m_4", "Alert", "", "https://app.meltwater.com/4", 400, |m| {
            m.provider = Some("Meltwater".into())
        }),
        mention_with("m_5", "Orphan", "", "https://x.org/5", 300, |_| {}),
        mention_with("m_6", "Clip", "youtube.com", "https://youtube.com/watch?v=6", 200, |_| {}),
        mention_with("m_7", "Repost", "CryptoPanic", "https://cryptopanic.com/n/7", 100, |_| {}),
    ];

    let stats = analysis::source_breakdown(&items, &cfg);
    let names: Vec<&str> = stats.iter().map(|s| s.source.as_str()).collect();
    assert_eq!(names, vec!["coindesk.com", "cryptopanic", "meltwater", "unknown", "youtube.com"]);

    let coindesk = &stats[0];
    assert_eq!(coindesk.count, 3);
    assert_eq!(coindesk.percentage, 42.86);
    assert_eq!(coindesk.origins["rss"], 2);
    assert_eq!(coindesk.origins["newsletter"], 1);
    assert_eq!(coindesk.sample_titles.len(), 3);
    assert_eq!(coindesk.flag, None);

    assert!(stats[1].aggregator);
    assert!(!stats[0].aggregator);
    assert_eq!(stats[3].flag, Some(analysis::SourceFlag::Unknown));
    assert_eq!(stats[4].flag, Some(analysis::SourceFlag::Video));
}

#[test]
fn test_source_flag_patterns() {
    use analysis::{source_flag, SourceFlag};
    assert_eq!(source_flag("reddit.com"), Some(SourceFlag::Social));
    assert_eq!(source_flag("someone.substack.com"), Some(SourceFlag::Blog));
    assert_eq!(source_flag(""), Some(SourceFlag::Unknown));
    assert_eq!(source_flag("reuters.com"), None);
}

fn sentiment_items() -> Vec<StoredMention> {
    // Newest first, as the store scans.
    vec![
        mention_with("m_d", "No score", "a.com", "https://a.com/d", NOW - 100, |_| {}),
        mention_with("m_n", "Also new", "a.com", "https://a.com/n", NOW - 200, |_| {}),
        mention_with("m_c", "Score only", "b.com", "https://b.com/c", NOW - 3000, |m| {
            m.extra.insert("sentiment_score".into(), serde_json::json!(0.2));
        }),
        mention_with("m_b", "Object form", "c.com", "https://c.com/b", NOW - 4000, |m| {
            m.extra.insert(
                "sentiment".into(),
                serde_json::json!({ "label": "negative", "score": -0.6 }),
            );
        }),
        mention_with("m_a", "Label only", "d.com", "https://d.com/a", NOW - 7000, |m| {
            m.extra.insert("sentiment".into(), serde_json::json!("Positive"));
        }),
    ]
}

#[test]
fn test_sentiment_of_accepts_provider_shapes() {
    use analysis::{sentiment_of, SentimentLabel};
    let items = sentiment_items();
    assert_eq!(sentiment_of(&items[0].mention), None);
    let c = sentiment_of(&items[2].mention).unwrap();
    assert_eq!((c.label, c.score), (SentimentLabel::Positive, Some(0.2)));
    let b = sentiment_of(&items[3].mention).unwrap();
    assert_eq!((b.label, b.score), (SentimentLabel::Negative, Some(-0.6)));
    let a = sentiment_of(&items[4].mention).unwrap();
    assert_eq!((a.label, a.score), (SentimentLabel::Positive, None));
}

#[test]
fn test_overview_volume_and_sentiment() {
    let items = sentiment_items();
    let since = NOW - 7200;
    let view = analysis::overview(&items, Window::Hours(2), since, NOW);

    assert_eq!(view.window, "2h");
    assert_eq!(view.total, 5);
    assert_eq!(view.sentiment.positive, 2);
    assert_eq!(view.sentiment.negative, 1);
    assert_eq!(view.sentiment.neutral, 0);
    assert_eq!(view.sentiment.unscored, 2);
    assert!((view.sentiment.average_score.unwrap() + 0.2).abs() < 1e-9);
    assert_eq!(view.latest.as_ref().map(|l| l.id.as_str()), Some("m_c"));

    // NOW sits 800s past an hour boundary.
    let starts: Vec<i64> = view.hourly.iter().map(|b| b.start).collect();
    assert_eq!(starts, vec![NOW - 8000, NOW - 4400, NOW - 800]);
    let counts: Vec<usize> = view.hourly.iter().map(|b| b.count).collect();
    assert_eq!(counts, vec![1, 2, 2]);
    assert_eq!(counts.iter().sum::<usize>(), view.total);
}

#[tokio::test]
async fn test_run_overview_scans_window_only() {
    let store = MemoryStore::new();
    let mut items = sentiment_items();
    items.push(mention_with("m_old", "Old", "e.com", "https://e.com/o", NOW - 9000, |m| {
        m.extra.insert("sentiment".into(), serde_json::json!(-1.0));
    }));
    seed(&store, &items).await;
    store.add(NOW - 10, "not json").await.unwrap();

    let cfg = DedupConfig::default();
    let now = Utc.timestamp_opt(NOW, 0).unwrap();
    let view = run_overview(&store, &cfg, Window::Hours(2), now).await.unwrap();
    assert_eq!(view.total, 5);
    assert_eq!(view.skipped, 1);
    assert_eq!(view.sentiment.negative, 1);
    assert_eq!(view.by_origin[0].origin, "unknown");
    assert_eq!(view.by_origin[0].count, 5);
}

#[tokio::test]
async fn test_run_source_report_whole_store_and_window() {
    let store = MemoryStore::new();
    let items = vec![
        stored("m_1", "A", "https://a.com/1", NOW - 100),
        stored("m_2", "B", "https://a.com/2", NOW - 200),
        stored("m_3", "C", "https://a.com/3", NOW - 90_000),
    ];
    seed(&store, &items).await;
    let cfg = DedupConfig::default();
    let now = Utc.timestamp_opt(NOW, 0).unwrap();

    let all = run_source_report(&store, &cfg, None, now).await.unwrap();
    assert_eq!(all.window, "all");
    assert_eq!(all.scanned, 3);
    assert_eq!(all.unique_sources, 1);
    assert_eq!(all.sources[0].source, "outlet");
    assert_eq!(all.sources[0].percentage, 100.0);

    let recent = run_source_report(&store, &cfg, Some(Window::Hours(24)), now).await.unwrap();
    assert_eq!(recent.window, "24h");
    assert_eq!(recent.scanned, 2);
    assert_eq!(recent.flagged_sources, 0);
}

#[test]
fn test_parse_status_line() {
    use analysis::parse_status_line;
    assert_eq!(parse_status_line("2.4K Social mentions ↑ 76%"), Some((Some(2400), Some(76))));
    assert_eq!(parse_status_line("1,234 mentions today"), Some((Some(1234), None)));
    assert_eq!(parse_status_line("Volume ↑ 12%"), Some((None, Some(12))));
    assert_eq!(parse_status_line("quiet day"), None);
}

#[test]
fn test_detect_spikes_filters_and_dedupes() {
    let status = |line: &'static str| {
        move |m: &mut Mention| {
            m.origin = Some(Origin::Meltwater);
            m.extra.insert("statusLine".into(), serde_json::json!(line));
        }
    };
    let items = vec![
        mention_with("mw_1", "Chip rules chatter", "mw", "https://a.com/1", NOW - 100, |m| {
            m.provider = Some("Meltwater".into());
            m.extra.insert(
                "provider_meta".into(),
                serde_json::json!({ "statusLine": "Reddit: 120 mentions ↑ 40%" }),
            );
        }),
        mention_with("mw_2", "Tariff spike", "mw", "https://a.com/2", NOW - 200, status(
            "2361 Social mentions on Twitter ↑ 76%",
        )),
        mention_with("mw_3", "Tariff spike", "mw", "https://a.com/3", NOW - 300, status(
            "1900 Social mentions on Twitter ↑ 50%",
        )),
        // Not a monitoring alert.
        mention_with("m_4", "Tariff spike", "rss", "https://a.com/4", NOW - 50, |m| {
            m.extra.insert("statusLine".into(), serde_json::json!("99 mentions ↑ 9%"));
        }),
        mention_with("mw_5", "No status", "mw", "https://a.com/5", NOW - 10, |m| {
            m.origin = Some(Origin::Meltwater)
        }),
    ];

    let spikes = analysis::detect_spikes(&items);
    assert_eq!(spikes.len(), 2);
    assert_eq!(spikes[0].title, "Chip rules chatter");
    assert_eq!(spikes[0].platform, "reddit");
    assert_eq!(spikes[0].mention_count, Some(120));
    assert_eq!(spikes[1].platform, "x");
    assert_eq!(spikes[1].spike_percentage, Some(76));
    assert_eq!(spikes[1].mention_count, Some(2361));
    assert_eq!(spikes[1].detected_at, "2023-11-14T22:10:00Z");
}
