use async_trait::async_trait;
use nd_core::{FlaggedArticle, Result, ScanWindow};

/// One sorted-set member exactly as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMember {
    pub member: String,
    pub score: i64,
}

impl RawMember {
    pub fn new(member: impl Into<String>, score: i64) -> Self {
        Self { member: member.into(), score }
    }
}

/// Timestamp-ordered mention collection.
///
/// Removal is by exact member value; removing an absent value is a no-op
/// that reports `false`.
#[async_trait]
pub trait MentionStore: Send + Sync {
    /// Short backend name for health output.
    fn backend(&self) -> &'static str;

    /// Members inside `window`, newest first.
    async fn scan(&self, window: ScanWindow) -> Result<Vec<RawMember>>;

    /// Insert or rescore a member. Returns `true` when it was not present.
    async fn add(&self, score: i64, member: &str) -> Result<bool>;

    async fn remove(&self, member: &str) -> Result<bool>;

    async fn count(&self) -> Result<usize>;

    /// Drop the lowest-scored members until at most `keep` remain.
    async fn trim_oldest(&self, keep: usize) -> Result<usize>;

    /// Record an id in the seen set. Returns `true` the first time.
    async fn mark_seen(&self, id: &str) -> Result<bool>;
}

#[async_trait]
pub trait FlagStore: Send + Sync {
    /// Flag an article, replacing any earlier flag for the same id.
    async fn flag(&self, article: &FlaggedArticle) -> Result<()>;

    /// Returns `false` when the id was not flagged.
    async fn unflag(&self, id: &str) -> Result<bool>;

    /// All flagged articles, most recently flagged first.
    async fn flagged(&self) -> Result<Vec<FlaggedArticle>>;
}

/// Everything the HTTP layer needs from one backend.
pub trait Store: MentionStore + FlagStore {}

impl<T: MentionStore + FlagStore> Store for T {}
