//! In-memory backend with sorted-set semantics.

use crate::store::{FlagStore, MentionStore, RawMember};
use async_trait::async_trait;
use nd_core::{FlaggedArticle, Result, ScanWindow};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Debug, Default)]
struct SortedSet {
    scores: HashMap<String, i64>,
    ordered: BTreeSet<(i64, String)>,
}

impl SortedSet {
    fn insert(&mut self, score: i64, member: &str) -> bool {
        match self.scores.insert(member.to_string(), score) {
            Some(old) => {
                self.ordered.remove(&(old, member.to_string()));
                self.ordered.insert((score, member.to_string()));
                false
            }
            None => {
                self.ordered.insert((score, member.to_string()));
                true
            }
        }
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => self.ordered.remove(&(score, member.to_string())),
            None => false,
        }
    }
}

/// Process-local store for tests and store-less local runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    mentions: RwLock<SortedSet>,
    seen: RwLock<HashSet<String>>,
    flags: RwLock<HashMap<String, FlaggedArticle>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a member with exactly this value is present.
    pub fn contains(&self, member: &str) -> bool {
        self.mentions.read().scores.contains_key(member)
    }
}

#[async_trait]
impl MentionStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn scan(&self, window: ScanWindow) -> Result<Vec<RawMember>> {
        let set = self.mentions.read();
        Ok(set
            .ordered
            .iter()
            .rev()
            .take_while(|(score, _)| window.admits(*score))
            .take(window.limit)
            .map(|(score, member)| RawMember::new(member.clone(), *score))
            .collect())
    }

    async fn add(&self, score: i64, member: &str) -> Result<bool> {
        Ok(self.mentions.write().insert(score, member))
    }

    async fn remove(&self, member: &str) -> Result<bool> {
        Ok(self.mentions.write().remove(member))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.mentions.read().scores.len())
    }

    async fn trim_oldest(&self, keep: usize) -> Result<usize> {
        let mut set = self.mentions.write();
        let mut removed = 0;
        while set.scores.len() > keep {
            let Some((_, member)) = set.ordered.pop_first() else { break };
            set.scores.remove(&member);
            removed += 1;
        }
        Ok(removed)
    }

    async fn mark_seen(&self, id: &str) -> Result<bool> {
        Ok(self.seen.write().insert(id.to_string()))
    }
}

#[async_trait]
impl FlagStore for MemoryStore {
    async fn flag(&self, article: &FlaggedArticle) -> Result<()> {
        self.flags.write().insert(article.id.clone(), article.clone());
        Ok(())
    }

    async fn unflag(&self, id: &str) -> Result<bool> {
        Ok(self.flags.write().remove(id).is_some())
    }

    async fn flagged(&self) -> Result<Vec<FlaggedArticle>> {
        let mut out: Vec<FlaggedArticle> = self.flags.read().values().cloned().collect();
        out.sort_by(|a, b| b.flagged_at.cmp(&a.flagged_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }
}
