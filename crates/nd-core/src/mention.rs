use crate::error::Result;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Ingestion channel a mention arrived through.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Origin {
    Rss,
    GoogleAlerts,
    Newsletter,
    Congress,
    Meltwater,
    Other(String),
}

impl Origin {
    pub fn as_str(&self) -> &str {
        match self {
            Origin::Rss => "rss",
            Origin::GoogleAlerts => "google_alerts",
            Origin::Newsletter => "newsletter",
            Origin::Congress => "congress",
            Origin::Meltwater => "meltwater",
            Origin::Other(s) => s,
        }
    }

    /// Prefix used by [`mention_id`] for records of this origin.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Origin::Rss => "m",
            Origin::GoogleAlerts => "ga",
            Origin::Newsletter => "nl",
            Origin::Congress => "cg",
            Origin::Meltwater => "mw",
            Origin::Other(_) => "x",
        }
    }
}

impl From<String> for Origin {
    fn from(s: String) -> Self {
        match s.as_str() {
            "rss" => Origin::Rss,
            "google_alerts" => Origin::GoogleAlerts,
            "newsletter" => Origin::Newsletter,
            "congress" => Origin::Congress,
            "meltwater" => Origin::Meltwater,
            _ => Origin::Other(s),
        }
    }
}

impl From<Origin> for String {
    fn from(o: Origin) -> Self {
        match o {
            Origin::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ingested article, alert, bill or newsletter item.
///
/// Provider-specific fields (reach, sentiment, permalink, ...) are not
/// interpreted here; they ride along in `extra` so a kept record keeps them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mention {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canon: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
    #[serde(default, deserialize_with = "lenient_ts")]
    pub published_ts: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub matched: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Mention {
    pub fn new(
        title: impl Into<String>,
        link: Option<String>,
        source: impl Into<String>,
        published_ts: i64,
    ) -> Self {
        Self {
            id: String::new(),
            title: title.into(),
            link,
            canon: None,
            source: source.into(),
            section: None,
            origin: None,
            provider: None,
            published: None,
            published_ts,
            matched: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn with_canon(mut self, canon: impl Into<String>) -> Self {
        self.canon = Some(canon.into());
        self
    }

    /// The canonical link when one was recorded, else the raw link.
    pub fn identity_link(&self) -> Option<&str> {
        self.canon
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .or_else(|| self.link.as_deref().filter(|l| !l.trim().is_empty()))
    }

    /// Recompute `id` from `canon`, or from title, source and timestamp when there is no canon.
    pub fn assign_id(&mut self) {
        let prefix = self.origin.as_ref().map(Origin::id_prefix).unwrap_or("m");
        let key = match self.canon.as_deref().filter(|c| !c.is_empty()) {
            Some(canon) => canon.to_string(),
            None => format!("{}|{}|{}", self.title, self.source, self.published_ts),
        };
        self.id = mention_id(prefix, &key);
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Deterministic id: a 32-bit `h * 31 + c` rolling hash over UTF-16 code units.
///
/// Matches the ids already present in long-lived stores, so re-ingesting an
/// old link lands on the same id.
pub fn mention_id(prefix: &str, key: &str) -> String {
    let h = key
        .encode_utf16()
        .fold(0u32, |h, c| h.wrapping_mul(31).wrapping_add(c as u32));
    format!("{prefix}_{h:x}")
}

/// A mention as read from the store, paired with the exact member string.
///
/// Removal is by exact value, so `raw` is what gets sent back to the store;
/// re-serializing `mention` would not reliably reproduce it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMention {
    pub raw: String,
    pub score: i64,
    pub mention: Mention,
}

impl StoredMention {
    pub fn decode(raw: impl Into<String>, score: i64) -> Result<Self> {
        let raw = raw.into();
        let mention: Mention = serde_json::from_str(&raw)?;
        Ok(Self { raw, score, mention })
    }

    /// Publication time, falling back to the store score for records without one.
    pub fn ts(&self) -> i64 {
        if self.mention.published_ts > 0 {
            self.mention.published_ts
        } else {
            self.score
        }
    }
}

fn null_as_default<'de, D, T>(d: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

// Older records carry the timestamp as a float or a numeric string.
fn lenient_ts<'de, D>(d: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(d)?;
    Ok(match v {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse::<f64>().map(|f| f as i64).unwrap_or(0),
        _ => 0,
    })
}
