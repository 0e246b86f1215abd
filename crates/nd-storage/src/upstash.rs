//! Upstash Redis over its REST interface.
//!
//! Each command is POSTed as a JSON array (`["ZADD", key, score, member]`)
//! with a bearer token; replies are `{"result": ...}` or `{"error": "..."}`.

use crate::store::{FlagStore, MentionStore, RawMember};
use async_trait::async_trait;
use nd_core::config::StoreConfig;
use nd_core::{FlaggedArticle, NdError, Result, ScanWindow};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct Reply<T> {
    result: Option<T>,
    error: Option<String>,
}

pub struct UpstashStore {
    client: reqwest::Client,
    url: String,
    token: String,
    mentions_key: String,
    seen_key: String,
    flagged_key: String,
}

impl UpstashStore {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        let defaults = StoreConfig::default();
        Self {
            client: reqwest::Client::new(),
            url: url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            mentions_key: defaults.mentions_key,
            seen_key: defaults.seen_key,
            flagged_key: defaults.flagged_key,
        }
    }

    /// Build from config; `None` when no REST url/token is configured.
    pub fn from_config(cfg: &StoreConfig) -> Option<Self> {
        let (url, token) = (cfg.url.as_ref()?, cfg.token.as_ref()?);
        let mut store = Self::new(url.clone(), token.clone());
        store.mentions_key = cfg.mentions_key.clone();
        store.seen_key = cfg.seen_key.clone();
        store.flagged_key = cfg.flagged_key.clone();
        Some(store)
    }

    async fn command<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T> {
        debug!(command = args.first().copied().unwrap_or(""), "upstash command");
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&args)
            .send()
            .await
            .map_err(|e| NdError::Store(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| NdError::Store(e.to_string()))?;
        let reply: Reply<T> = match serde_json::from_str(&body) {
            Ok(r) => r,
            Err(_) if !status.is_success() => {
                return Err(NdError::Upstream { status: status.as_u16(), message: body });
            }
            Err(e) => return Err(e.into()),
        };
        if let Some(message) = reply.error {
            return Err(NdError::Upstream { status: status.as_u16(), message });
        }
        let command = args.first().copied().unwrap_or("");
        reply
            .result
            .ok_or_else(|| NdError::Store(format!("empty reply to {command}")))
    }

    async fn flagged_raw(&self) -> Result<Vec<String>> {
        self.command(&["SMEMBERS", &self.flagged_key]).await
    }
}

/// Decode a `WITHSCORES` reply: a flat `[member, score, member, score, ...]` array.
pub fn parse_scored_members(values: Vec<Value>) -> Vec<RawMember> {
    values
        .chunks(2)
        .filter_map(|pair| {
            let [member, score] = pair else { return None };
            let member = match member {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let score = match score {
                Value::Number(n) => n.as_f64()?,
                Value::String(s) => s.parse::<f64>().ok()?,
                _ => return None,
            };
            Some(RawMember::new(member, score as i64))
        })
        .collect()
}

#[async_trait]
impl MentionStore for UpstashStore {
    fn backend(&self) -> &'static str {
        "upstash"
    }

    async fn scan(&self, window: ScanWindow) -> Result<Vec<RawMember>> {
        if window.limit == 0 {
            return Ok(Vec::new());
        }
        let limit = window.limit.to_string();
        let values: Vec<Value> = match window.since {
            Some(since) => {
                let since = since.to_string();
                self.command(&[
                    "ZRANGE", &self.mentions_key, "+inf", &since, "BYSCORE", "REV",
                    "LIMIT", "0", &limit, "WITHSCORES",
                ])
                .await?
            }
            None => {
                let stop = (window.limit - 1).to_string();
                self.command(&["ZRANGE", &self.mentions_key, "0", &stop, "REV", "WITHSCORES"])
                    .await?
            }
        };
        Ok(parse_scored_members(values))
    }

    async fn add(&self, score: i64, member: &str) -> Result<bool> {
        let score = score.to_string();
        let added: i64 = self.command(&["ZADD", &self.mentions_key, &score, member]).await?;
        Ok(added == 1)
    }

    async fn remove(&self, member: &str) -> Result<bool> {
        let removed: i64 = self.command(&["ZREM", &self.mentions_key, member]).await?;
        Ok(removed == 1)
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = self.command(&["ZCARD", &self.mentions_key]).await?;
        Ok(n.max(0) as usize)
    }

    async fn trim_oldest(&self, keep: usize) -> Result<usize> {
        let total = self.count().await?;
        if total <= keep {
            return Ok(0);
        }
        let stop = (total - keep - 1).to_string();
        let removed: i64 = self
            .command(&["ZREMRANGEBYRANK", &self.mentions_key, "0", &stop])
            .await?;
        Ok(removed.max(0) as usize)
    }

    async fn mark_seen(&self, id: &str) -> Result<bool> {
        let added: i64 = self.command(&["SADD", &self.seen_key, id]).await?;
        Ok(added == 1)
    }
}

#[async_trait]
impl FlagStore for UpstashStore {
    async fn flag(&self, article: &FlaggedArticle) -> Result<()> {
        self.unflag(&article.id).await?;
        let member = serde_json::to_string(article)?;
        let _: i64 = self.command(&["SADD", &self.flagged_key, &member]).await?;
        Ok(())
    }

    async fn unflag(&self, id: &str) -> Result<bool> {
        let mut removed = false;
        for raw in self.flagged_raw().await? {
            let Ok(article) = serde_json::from_str::<FlaggedArticle>(&raw) else { continue };
            if article.id == id {
                let _: i64 = self.command(&["SREM", &self.flagged_key, &raw]).await?;
                removed = true;
            }
        }
        Ok(removed)
    }

    async fn flagged(&self) -> Result<Vec<FlaggedArticle>> {
        let mut out = Vec::new();
        for raw in self.flagged_raw().await? {
            match serde_json::from_str::<FlaggedArticle>(&raw) {
                Ok(article) => out.push(article),
                Err(e) => warn!(error = %e, "skipping undecodable flagged member"),
            }
        }
        out.sort_by(|a, b| b.flagged_at.cmp(&a.flagged_at));
        Ok(out)
    }
}
