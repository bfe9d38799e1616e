//! Bibliographic record subset consumed by the attachment engine
//!
//! Records are newline-delimited JSON in the intermediate schema. Only the
//! keys below are interpreted. On output every key of the input object is
//! written back as read, whatever its shape; only `x.labels` is replaced.

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

const LABELS_KEY: &str = "x.labels";

/// Intermediate schema record, reduced to the fields used for labelling
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    /// Globally unique record identifier
    pub id: String,

    /// Data provider; integers are accepted and normalized to strings
    pub source_id: String,

    /// Collection names (mega collections and technical collection IDs)
    pub collections: Vec<String>,

    pub issn: Vec<String>,
    pub eissn: Vec<String>,
    pub raw_date: String,
    pub volume: String,
    pub issue: String,
    pub doi: String,
    pub packages: Vec<String>,

    /// Institution codes (ISIL); the only field the engine writes
    pub labels: Vec<String>,

    /// The object as read. Interpreted fields are not synced back into it,
    /// so apart from `labels` they are read-only for decoded records.
    pub original: Map<String, Value>,
}

/// Interpreted keys, decoded leniently from the original object
#[derive(Deserialize)]
struct Fields {
    #[serde(rename = "finc.id", default, deserialize_with = "lenient_string")]
    id: String,
    #[serde(rename = "finc.source_id", default, deserialize_with = "lenient_string")]
    source_id: String,
    #[serde(rename = "finc.mega_collection", default, deserialize_with = "lenient_strings")]
    collections: Vec<String>,
    #[serde(rename = "rft.issn", default, deserialize_with = "lenient_strings")]
    issn: Vec<String>,
    #[serde(rename = "rft.eissn", default, deserialize_with = "lenient_strings")]
    eissn: Vec<String>,
    #[serde(rename = "rft.date", default, deserialize_with = "lenient_string")]
    raw_date: String,
    #[serde(rename = "rft.volume", default, deserialize_with = "lenient_string")]
    volume: String,
    #[serde(rename = "rft.issue", default, deserialize_with = "lenient_string")]
    issue: String,
    #[serde(default, deserialize_with = "lenient_string")]
    doi: String,
    #[serde(rename = "x.packages", default, deserialize_with = "lenient_strings")]
    packages: Vec<String>,
    #[serde(rename = "x.labels", default, deserialize_with = "lenient_strings")]
    labels: Vec<String>,
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let fields = Fields::deserialize(&value).map_err(serde::de::Error::custom)?;
        match value {
            Value::Object(original) => Ok(Record {
                id: fields.id,
                source_id: fields.source_id,
                collections: fields.collections,
                issn: fields.issn,
                eissn: fields.eissn,
                raw_date: fields.raw_date,
                volume: fields.volume,
                issue: fields.issue,
                doi: fields.doi,
                packages: fields.packages,
                labels: fields.labels,
                original,
            }),
            other => Err(serde::de::Error::custom(format!(
                "expected object, got {}",
                other
            ))),
        }
    }
}

impl Serialize for Record {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        for (key, value) in &self.original {
            if key == LABELS_KEY {
                map.serialize_entry(key, &self.labels)?;
            } else {
                map.serialize_entry(key, value)?;
            }
        }

        // Fields set in code for keys the input did not carry
        let strings = [
            ("finc.id", &self.id),
            ("finc.source_id", &self.source_id),
            ("rft.date", &self.raw_date),
            ("rft.volume", &self.volume),
            ("rft.issue", &self.issue),
            ("doi", &self.doi),
        ];
        for (key, value) in strings {
            if !value.is_empty() && !self.original.contains_key(key) {
                map.serialize_entry(key, value)?;
            }
        }
        let lists = [
            ("finc.mega_collection", &self.collections),
            ("rft.issn", &self.issn),
            ("rft.eissn", &self.eissn),
            ("x.packages", &self.packages),
        ];
        for (key, value) in lists {
            if !value.is_empty() && !self.original.contains_key(key) {
                map.serialize_entry(key, value)?;
            }
        }

        if !self.original.contains_key(LABELS_KEY) {
            map.serialize_entry(LABELS_KEY, &self.labels)?;
        }
        map.end()
    }
}

impl Record {
    /// Print and online serial numbers, print first
    pub fn serial_numbers(&self) -> impl Iterator<Item = &str> {
        self.issn.iter().chain(self.eissn.iter()).map(String::as_str)
    }

    /// Identifier used in diagnostics; falls back when the record has none
    pub fn display_id(&self) -> &str {
        if self.id.is_empty() {
            "<no id>"
        } else {
            &self.id
        }
    }
}

/// Accept strings, numbers and null where a string is expected
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => {
            return Err(serde::de::Error::custom(format!(
                "expected string, got {}",
                other
            )))
        }
    })
}

/// Accept a list, a single scalar or null where a list of strings is expected
fn lenient_strings<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    fn scalar(value: Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    Ok(match Value::deserialize(deserializer)? {
        Value::Null => Vec::new(),
        Value::Array(items) => items.into_iter().filter_map(scalar).collect(),
        other => scalar(other).into_iter().collect(),
    })
}

/// Output encoding for labelled records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Full record, one JSON object per line
    #[default]
    Json,
    /// `recordID<TAB>label,label,...`
    Tsv,
}

impl OutputFormat {
    /// Encode a labelled record as one newline-terminated output line
    pub fn encode(&self, record: &Record, buf: &mut Vec<u8>) -> Result<()> {
        match self {
            OutputFormat::Json => {
                serde_json::to_writer(&mut *buf, record)?;
            }
            OutputFormat::Tsv => {
                buf.extend_from_slice(record.id.as_bytes());
                buf.push(b'\t');
                buf.extend_from_slice(record.labels.join(",").as_bytes());
            }
        }
        buf.push(b'\n');
        Ok(())
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" | "ndj" | "ldj" => Ok(OutputFormat::Json),
            "tsv" => Ok(OutputFormat::Tsv),
            other => Err(Error::Config(format!(
                "unknown output format {:?} (expected json or tsv)",
                other
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Tsv => f.write_str("tsv"),
        }
    }
}

/// Parse one line of the compact label format.
///
/// Returns `None` for blank lines and lines without a tab separator.
pub fn parse_label_line(line: &str) -> Option<(String, Vec<String>)> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (id, labels) = line.split_once('\t')?;
    let id = id.trim();
    if id.is_empty() {
        return None;
    }
    let labels = labels
        .split(',')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();
    Some((id.to_string(), labels))
}
