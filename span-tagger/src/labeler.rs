//! Per-record label computation
//!
//! A [`Labeler`] decides the label set of one record. The pipeline calls it
//! from many workers at once; all shared state lives in read-mostly caches.

use async_trait::async_trait;
use chrono::NaiveDate;
use span_common::record::parse_label_line;
use span_common::{Error, Record, Result};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::filter::{Deduplicator, Tagger};
use crate::holdings::HoldingsCache;
use crate::rules::{AttachmentMode, RuleMatcher};

#[async_trait]
pub trait Labeler: Send + Sync {
    /// Set `record.labels`. Errors are fatal for the run.
    async fn label(&self, record: &mut Record) -> Result<()>;
}

/// Labels from the rule store, with holdings evaluation
pub struct RuleLabeler {
    matcher: RuleMatcher,
    holdings: Arc<HoldingsCache>,
    /// Evaluation date for moving walls, fixed for the run
    today: NaiveDate,
}

impl RuleLabeler {
    pub fn new(matcher: RuleMatcher, holdings: Arc<HoldingsCache>, today: NaiveDate) -> Self {
        Self {
            matcher,
            holdings,
            today,
        }
    }

    /// Institutions entitled to the record
    pub async fn labels(&self, record: &Record) -> Result<BTreeSet<String>> {
        let rules = self
            .matcher
            .matching_rules(&record.source_id, &record.collections)
            .await?;

        let mut labels = BTreeSet::new();
        for rule in rules.iter() {
            if labels.contains(&rule.institution) {
                continue;
            }
            match &rule.mode {
                AttachmentMode::Unconditional => {
                    labels.insert(rule.institution.clone());
                }
                AttachmentMode::Holdings(link) => {
                    if self.holdings.covers(link, record, self.today).await? {
                        labels.insert(rule.institution.clone());
                    }
                }
                AttachmentMode::ContentFile(link) => {
                    debug!(rule = %rule, link = %link, "Content file rule, not evaluated");
                }
            }
        }
        Ok(labels)
    }
}

#[async_trait]
impl Labeler for RuleLabeler {
    async fn label(&self, record: &mut Record) -> Result<()> {
        let labels = self.labels(record).await?;
        record.labels = labels.into_iter().collect();
        Ok(())
    }
}

/// Labels from a filter configuration, optionally deduplicated
pub struct FilterLabeler {
    tagger: Tagger,
    dedup: Option<Deduplicator>,
    today: NaiveDate,
}

impl FilterLabeler {
    pub fn new(tagger: Tagger, dedup: Option<Deduplicator>, today: NaiveDate) -> Self {
        Self {
            tagger,
            dedup,
            today,
        }
    }
}

#[async_trait]
impl Labeler for FilterLabeler {
    async fn label(&self, record: &mut Record) -> Result<()> {
        let mut labels = self.tagger.labels(record, self.today);
        if let Some(dedup) = &self.dedup {
            dedup.apply(record, &mut labels).await?;
        }
        record.labels = labels.into_iter().collect();
        Ok(())
    }
}

/// Labels from a detached `id<TAB>labels` file
///
/// Records not listed in the file keep their labels.
pub struct LabelFileLabeler {
    labels: HashMap<String, Vec<String>>,
}

impl LabelFileLabeler {
    pub fn from_text(text: &str) -> Self {
        let mut labels = HashMap::new();
        for (number, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match parse_label_line(line) {
                Some((id, values)) => {
                    let sorted: BTreeSet<String> = values.into_iter().collect();
                    labels.insert(id, sorted.into_iter().collect());
                }
                None => warn!(line = number + 1, "Skipping malformed label line"),
            }
        }
        Self { labels }
    }

    pub async fn from_path(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Config(format!("label file {}: {}", path.display(), e)))?;
        let labeler = Self::from_text(&text);
        debug!(path = %path.display(), records = labeler.len(), "Loaded label file");
        Ok(labeler)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[async_trait]
impl Labeler for LabelFileLabeler {
    async fn label(&self, record: &mut Record) -> Result<()> {
        if let Some(labels) = self.labels.get(&record.id) {
            record.labels = labels.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_label_file_replaces_listed_records_only() {
        let labeler = LabelFileLabeler::from_text("a\tDE-15,DE-14\nb\t\n\nbroken line\n");
        assert_eq!(labeler.len(), 2);

        let mut listed = Record {
            id: "a".to_string(),
            labels: vec!["OLD".to_string()],
            ..Default::default()
        };
        labeler.label(&mut listed).await.unwrap();
        assert_eq!(listed.labels, vec!["DE-14", "DE-15"]);

        let mut cleared = Record {
            id: "b".to_string(),
            labels: vec!["OLD".to_string()],
            ..Default::default()
        };
        labeler.label(&mut cleared).await.unwrap();
        assert!(cleared.labels.is_empty());

        let mut unlisted = Record {
            id: "c".to_string(),
            labels: vec!["OLD".to_string()],
            ..Default::default()
        };
        labeler.label(&mut unlisted).await.unwrap();
        assert_eq!(unlisted.labels, vec!["OLD"]);
    }

    #[tokio::test]
    async fn test_missing_label_file() {
        let result = LabelFileLabeler::from_path(Path::new("/nonexistent/labels.tsv")).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
