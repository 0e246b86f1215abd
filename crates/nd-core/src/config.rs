use crate::error::{NdError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Query parameters that never contribute to a mention's identity.
pub const DEFAULT_TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "utm_id",
    "mc_cid",
    "mc_eid",
    "ref",
    "fbclid",
    "gclid",
    "igshid",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsdeskConfig {
    pub store: StoreConfig,
    pub dedup: DedupConfig,
    pub server: ServerConfig,
    pub ingest: IngestConfig,
}

/// Upstash Redis REST connection and key names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub url: Option<String>,
    pub token: Option<String>,
    pub mentions_key: String,
    pub seen_key: String,
    pub flagged_key: String,
}

/// Tunables for the resolution policy and the sweeps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    pub fuzzy_threshold: f64,
    pub aggregator_domains: Vec<String>,
    pub tracking_params: Vec<String>,
    pub sample_limit: usize,
    pub scan_limit: usize,
    pub title_similarity: f64,
    pub canon_sweep_depth: usize,
    pub timezone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub admin_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub max_mentions: usize,
    /// Lowercased terms tagged into `matched` when a title or link contains them.
    pub keywords: Vec<String>,
}

impl Default for NewsdeskConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            dedup: DedupConfig::default(),
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 8080,
                admin_key: None,
            },
            ingest: IngestConfig::default(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_mentions: 5000,
            keywords: Vec::new(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            mentions_key: "mentions:z".into(),
            seen_key: "mentions:seen".into(),
            flagged_key: "articles:flagged".into(),
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.55,
            aggregator_domains: vec!["cryptopanic.com".into()],
            tracking_params: DEFAULT_TRACKING_PARAMS.iter().map(|p| p.to_string()).collect(),
            sample_limit: 10,
            scan_limit: 5000,
            title_similarity: 0.85,
            canon_sweep_depth: 2000,
            timezone: "America/New_York".into(),
        }
    }
}

impl DedupConfig {
    /// Whether `host` is one of the aggregator domains or a subdomain of one.
    pub fn is_aggregator_host(&self, host: &str) -> bool {
        if host.is_empty() {
            return false;
        }
        let host = host.to_ascii_lowercase();
        self.aggregator_domains.iter().any(|d| {
            let d = d.trim().to_ascii_lowercase();
            !d.is_empty() && (host == d || host.ends_with(&format!(".{d}")))
        })
    }

    /// Both similarity thresholds must lie in `(0, 1]`.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("fuzzy_threshold", self.fuzzy_threshold),
            ("title_similarity", self.title_similarity),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(NdError::Config(format!(
                    "{name} must be within (0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }
}

impl NewsdeskConfig {
    /// Load configuration from the process environment, reading `.env` first when present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();

        cfg.store.url = optional_env("KV_REST_API_URL");
        cfg.store.token = optional_env("KV_REST_API_TOKEN");

        if let Some(host) = optional_env("HOST") {
            cfg.server.host = host;
        }
        if let Some(port) = parse_env::<u16>("PORT")? {
            cfg.server.port = port;
        }
        cfg.server.admin_key = optional_env("ADMIN_KEY");

        if let Some(threshold) = parse_env::<f64>("DEDUP_FUZZY_THRESHOLD")? {
            cfg.dedup.fuzzy_threshold = threshold;
        }
        if let Some(domains) = optional_env("AGGREGATOR_DOMAINS") {
            cfg.dedup.aggregator_domains = split_list(&domains);
        }
        if let Some(limit) = parse_env::<usize>("SCAN_LIMIT")? {
            cfg.dedup.scan_limit = limit;
        }
        if let Some(max) = parse_env::<usize>("MAX_MENTIONS")? {
            cfg.ingest.max_mentions = max;
        }
        if let Some(keywords) = optional_env("KEYWORDS") {
            cfg.ingest.keywords = split_list(&keywords.to_lowercase());
        }

        cfg.dedup.validate()?;
        Ok(cfg)
    }
}

/// Split a comma-separated list, dropping blanks.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>> {
    match optional_env(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| NdError::Config(format!("{key} has an invalid value: {raw:?}"))),
    }
}
