//! Label deduplication against a search index
//!
//! Before emitting a label, look the record's DOI up in the index. If a
//! document with the same label from a source of equal or higher preference
//! is already indexed, the label is dropped. Indexed copies from less
//! preferred sources are only reported; the index cannot be updated from
//! here.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use span_common::{Error, Record, Result};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info};

/// Source IDs in order of preference, most preferred first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePreferences {
    order: Vec<String>,
}

impl SourcePreferences {
    /// Parse a whitespace separated preference list
    pub fn parse(list: &str) -> Self {
        Self {
            order: list.split_whitespace().map(str::to_string).collect(),
        }
    }

    /// Position of a source; unlisted sources rank after every listed one
    pub fn position(&self, source_id: &str) -> usize {
        self.order
            .iter()
            .position(|s| s == source_id)
            .unwrap_or(self.order.len())
    }
}

/// Index document, reduced to the fields used for deduplication
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IndexedDoc {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub institution: Vec<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub source_id: String,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

#[derive(Debug, Deserialize)]
struct SelectResponse {
    response: SelectDocs,
}

#[derive(Debug, Deserialize)]
struct SelectDocs {
    #[serde(default)]
    docs: Vec<IndexedDoc>,
}

/// Lookup of already indexed documents
#[async_trait]
pub trait RecordIndex: Send + Sync {
    async fn find_by_doi(&self, doi: &str) -> Result<Vec<IndexedDoc>>;
}

/// Solr select handler client
pub struct SolrIndex {
    http_client: reqwest::Client,
    server: String,
}

/// Prepend `http://` unless the server already names a scheme
pub fn prepend_http(server: &str) -> String {
    if server.starts_with("http://") || server.starts_with("https://") {
        server.trim_end_matches('/').to_string()
    } else {
        format!("http://{}", server.trim_end_matches('/'))
    }
}

impl SolrIndex {
    pub fn new(server: &str, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            server: prepend_http(server),
        })
    }

    pub fn server(&self) -> &str {
        &self.server
    }
}

#[async_trait]
impl RecordIndex for SolrIndex {
    async fn find_by_doi(&self, doi: &str) -> Result<Vec<IndexedDoc>> {
        let index_error = |message: String| Error::Index {
            server: self.server.clone(),
            message,
        };
        let link = format!("{}/select", self.server);
        let query = format!("\"{}\"", doi);

        let response = self
            .http_client
            .get(&link)
            .query(&[("df", "allfields"), ("wt", "json"), ("q", query.as_str())])
            .send()
            .await
            .map_err(|e| index_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(index_error(format!("HTTP {} for DOI {}", status.as_u16(), doi)));
        }

        let body = response.bytes().await.map_err(|e| index_error(e.to_string()))?;
        let select: SelectResponse = serde_json::from_slice(&body).map_err(|e| {
            index_error(format!(
                "undecodable response for DOI {}: {} ({})",
                doi,
                e,
                String::from_utf8_lossy(&body)
            ))
        })?;
        Ok(select.response.docs)
    }
}

/// Drops labels already served by a preferred indexed copy
pub struct Deduplicator {
    index: std::sync::Arc<dyn RecordIndex>,
    preferences: SourcePreferences,
    ignore_same_identifier: bool,
}

impl Deduplicator {
    pub fn new(
        index: std::sync::Arc<dyn RecordIndex>,
        preferences: SourcePreferences,
        ignore_same_identifier: bool,
    ) -> Self {
        Self {
            index,
            preferences,
            ignore_same_identifier,
        }
    }

    /// Labels of `record` that an indexed copy already carries with equal
    /// or higher preference.
    pub async fn droppable(
        &self,
        record: &Record,
        labels: &BTreeSet<String>,
    ) -> Result<BTreeSet<String>> {
        let doi = record.doi.trim();
        if doi.is_empty() || labels.is_empty() {
            return Ok(BTreeSet::new());
        }

        let docs = self.index.find_by_doi(doi).await?;
        let own_position = self.preferences.position(&record.source_id);
        let mut dropped = BTreeSet::new();

        for label in labels {
            for doc in &docs {
                if self.ignore_same_identifier && doc.id == record.id {
                    continue;
                }
                if !doc.institution.iter().any(|i| i == label) {
                    continue;
                }
                if own_position >= self.preferences.position(&doc.source_id) {
                    debug!(
                        record = %record.id,
                        doi,
                        label = %label,
                        indexed = %doc.id,
                        "Label already served by preferred indexed copy"
                    );
                    dropped.insert(label.clone());
                    break;
                }
                info!(
                    record = %record.id,
                    doi,
                    indexed = %doc.id,
                    "Lower priority copy already indexed, cannot update index"
                );
            }
        }

        Ok(dropped)
    }

    /// Remove droppable labels from `labels`
    pub async fn apply(&self, record: &Record, labels: &mut BTreeSet<String>) -> Result<()> {
        let dropped = self.droppable(record, labels).await?;
        if !dropped.is_empty() {
            let before = labels.len();
            labels.retain(|l| !dropped.contains(l));
            debug!(record = %record.id, before, after = labels.len(), "Deduplicated labels");
        }
        Ok(())
    }
}
