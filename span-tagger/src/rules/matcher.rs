//! Rule match cache
//!
//! Rules for a `(source, collection set)` pair are fetched once and then
//! served from memory. The key is order independent: collections are
//! sorted and deduplicated before keying and querying.

use span_common::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::store::RuleStore;
use super::AttachmentRule;

/// Source ID plus the sorted, deduplicated collection set
pub type MatchKey = (String, Vec<String>);

/// Cache key for a record of `source_id` in `collections`
pub fn match_key(source_id: &str, collections: &[String]) -> MatchKey {
    (source_id.to_string(), normalize(collections))
}

fn normalize(collections: &[String]) -> Vec<String> {
    let mut sorted: Vec<String> = collections
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();
    sorted.sort();
    sorted.dedup();
    sorted
}

pub struct RuleMatcher {
    store: Arc<dyn RuleStore>,
    cache: RwLock<HashMap<MatchKey, Arc<Vec<AttachmentRule>>>>,
    empty: Arc<Vec<AttachmentRule>>,
}

impl RuleMatcher {
    pub fn new(store: Arc<dyn RuleStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
            empty: Arc::new(Vec::new()),
        }
    }

    /// Rules that apply to a record of `source_id` in `collections`.
    ///
    /// No collections means no rules, without a store query. A store failure
    /// or an invalid rule is returned as an error and nothing is cached.
    pub async fn matching_rules(
        &self,
        source_id: &str,
        collections: &[String],
    ) -> Result<Arc<Vec<AttachmentRule>>> {
        let key = match_key(source_id, collections);
        if key.1.is_empty() {
            return Ok(self.empty.clone());
        }

        if let Some(rules) = self.cache.read().await.get(&key) {
            return Ok(rules.clone());
        }

        let rows = self.store.find_rules(source_id, &key.1).await?;
        let rules = rows
            .into_iter()
            .map(AttachmentRule::try_from)
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(source_id, collections = ?key.1, rules = rules.len(), "Cached rule match");

        let mut cache = self.cache.write().await;
        let entry = cache.entry(key).or_insert_with(|| Arc::new(rules));
        Ok(entry.clone())
    }

    /// Number of cached `(source, collection set)` keys
    pub async fn cached(&self) -> usize {
        self.cache.read().await.len()
    }
}
