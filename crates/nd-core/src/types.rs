use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An article flagged by an editor for follow-up summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedArticle {
    pub id: String,
    pub title: String,
    pub link: String,
    pub source: String,
    pub flagged_at: DateTime<Utc>,
}

impl FlaggedArticle {
    pub fn new(
        id: impl Into<String>,
        title: Option<String>,
        link: Option<String>,
        source: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.filter(|t| !t.is_empty()).unwrap_or_else(|| "Unknown".into()),
            link: link.filter(|l| !l.is_empty()).unwrap_or_else(|| "#".into()),
            source: source.filter(|s| !s.is_empty()).unwrap_or_else(|| "Unknown".into()),
            flagged_at: Utc::now(),
        }
    }
}
