//! Declarative filter configuration
//!
//! A filter configuration maps institution codes to an ordered list of
//! predicate declarations. An institution is attached when any of its
//! predicates holds. Each declaration is a JSON object with exactly one key
//! naming the predicate kind:
//!
//! ```json
//! {
//!   "DE-15": [{"source": ["49"]}, {"holding": {"files": ["http://.../DE-15.tsv"]}}],
//!   "DE-14": [{"blacklist": {"file": "excluded.txt", "filter": {"collection": ["ColA"]}}}]
//! }
//! ```
//!
//! Declarations are compiled into [`Filter`] values by the [`Tagger`], which
//! also keeps the declaration for dumping.

use serde::{Deserialize, Serialize};
use span_common::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub mod dedup;
pub mod tagger;

pub use dedup::{Deduplicator, IndexedDoc, RecordIndex, SolrIndex, SourcePreferences};
pub use tagger::{Filter, Tagger};

/// One predicate declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterDecl {
    /// Always holds
    Any(AnyDecl),
    /// Record source is one of these
    Source(Vec<String>),
    /// Record ID is listed
    List(ListDecl),
    /// Record belongs to one of these collections
    Collection(Vec<String>),
    /// Record is covered by a holdings file
    Holding(HoldingDecl),
    /// Inner predicate holds and the record ID is not listed
    Blacklist(BlacklistDecl),
    /// Record is part of one of these packages
    Package(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnyDecl {}

/// Inline IDs and/or a file with one ID per line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListDecl {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HoldingDecl {
    /// Holdings references (links or paths); any one covering suffices
    pub files: Vec<String>,
    /// Optional collection restriction
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collections: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlacklistDecl {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(default = "any_filter")]
    pub filter: Box<FilterDecl>,
}

fn any_filter() -> Box<FilterDecl> {
    Box::new(FilterDecl::Any(AnyDecl {}))
}

impl FilterDecl {
    /// Visit this declaration and every nested one
    fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a FilterDecl)) {
        visit(self);
        if let FilterDecl::Blacklist(decl) = self {
            decl.filter.walk(visit);
        }
    }
}

/// Institution code to predicate declarations, ordered by institution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterConfig {
    pub institutions: BTreeMap<String, Vec<FilterDecl>>,
}

impl FilterConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Filter(e.to_string()))
    }

    /// Load from inline JSON or, when the argument is not a JSON object,
    /// from the file it names.
    pub fn load(arg: &str) -> Result<Self> {
        if arg.trim_start().starts_with('{') {
            return Self::from_json(arg);
        }
        Self::from_file(Path::new(arg))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Filter(format!("read {}: {}", path.display(), e)))?;
        Self::from_json(&text)
            .map_err(|e| Error::Filter(format!("{}: {}", path.display(), e)))
    }

    /// Pretty-printed JSON with institutions in sorted order
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a FilterDecl)) {
        for decls in self.institutions.values() {
            for decl in decls {
                decl.walk(visit);
            }
        }
    }

    /// Distinct holdings references used by any `holding` predicate
    pub fn holdings_references(&self) -> Vec<String> {
        let mut refs = Vec::new();
        self.walk(&mut |decl| {
            if let FilterDecl::Holding(h) = decl {
                refs.extend(h.files.iter().cloned());
            }
        });
        refs.sort();
        refs.dedup();
        refs
    }

    /// Distinct ID list files used by `list` and `blacklist` predicates
    pub fn list_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        self.walk(&mut |decl| match decl {
            FilterDecl::List(ListDecl { file: Some(f), .. }) => files.push(f.clone()),
            FilterDecl::Blacklist(BlacklistDecl { file: Some(f), .. }) => files.push(f.clone()),
            _ => {}
        });
        files.sort();
        files.dedup();
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "DE-15": [
            {"source": ["49", "55"]},
            {"holding": {"files": ["http://holdings.test/DE-15.tsv"], "collections": ["ColA"]}}
        ],
        "DE-14": [
            {"blacklist": {"file": "excluded.txt", "filter": {"collection": ["ColB"]}}},
            {"list": {"ids": ["ai-49-1"]}}
        ],
        "DE-Ch1": [{"any": {}}, {"package": ["pkg-1"]}]
    }"#;

    #[test]
    fn test_decode_all_kinds() {
        let config = FilterConfig::from_json(CONFIG).unwrap();
        assert_eq!(config.institutions.len(), 3);
        assert_eq!(
            config.institutions["DE-15"][0],
            FilterDecl::Source(vec!["49".to_string(), "55".to_string()])
        );
        match &config.institutions["DE-14"][0] {
            FilterDecl::Blacklist(b) => {
                assert_eq!(b.file, Some(PathBuf::from("excluded.txt")));
                assert_eq!(*b.filter, FilterDecl::Collection(vec!["ColB".to_string()]));
            }
            other => panic!("expected blacklist, got {:?}", other),
        }
        assert_eq!(config.institutions["DE-Ch1"][0], FilterDecl::Any(AnyDecl {}));
    }

    #[test]
    fn test_dump_round_trip() {
        let config = FilterConfig::from_json(CONFIG).unwrap();
        let dumped = config.to_json_pretty().unwrap();
        let again = FilterConfig::from_json(&dumped).unwrap();

        assert_eq!(config, again);
        assert_eq!(dumped, again.to_json_pretty().unwrap());
        // Sorted institution order
        let first = dumped.find("DE-14").unwrap();
        assert!(first < dumped.find("DE-15").unwrap());
        assert!(dumped.find("DE-15").unwrap() < dumped.find("DE-Ch1").unwrap());
    }

    #[test]
    fn test_blacklist_defaults_to_any() {
        let config = FilterConfig::from_json(r#"{"X": [{"blacklist": {"ids": ["a"]}}]}"#).unwrap();
        match &config.institutions["X"][0] {
            FilterDecl::Blacklist(b) => assert_eq!(*b.filter, FilterDecl::Any(AnyDecl {})),
            other => panic!("expected blacklist, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_kind_and_fields_are_rejected() {
        assert!(matches!(
            FilterConfig::from_json(r#"{"X": [{"issn": ["1234-5678"]}]}"#),
            Err(Error::Filter(_))
        ));
        assert!(matches!(
            FilterConfig::from_json(r#"{"X": [{"holding": {"files": [], "extra": 1}}]}"#),
            Err(Error::Filter(_))
        ));
        assert!(matches!(
            FilterConfig::from_json(r#"{"X": [{"any": {}, "source": ["49"]}]}"#),
            Err(Error::Filter(_))
        ));
        assert!(matches!(
            FilterConfig::from_json(r#"{"X": {"any": {}}}"#),
            Err(Error::Filter(_))
        ));
    }

    #[test]
    fn test_collects_references() {
        let config = FilterConfig::from_json(CONFIG).unwrap();
        assert_eq!(
            config.holdings_references(),
            vec!["http://holdings.test/DE-15.tsv".to_string()]
        );
        assert_eq!(config.list_files(), vec![PathBuf::from("excluded.txt")]);
    }

    #[test]
    fn test_load_inline_or_file() {
        let inline = FilterConfig::load(r#" {"DE-15": [{"any": {}}]}"#).unwrap();
        assert_eq!(inline.institutions.len(), 1);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filter.json");
        std::fs::write(&path, CONFIG).unwrap();
        let from_file = FilterConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(from_file.institutions.len(), 3);

        assert!(matches!(
            FilterConfig::load(dir.path().join("missing.json").to_str().unwrap()),
            Err(Error::Filter(_))
        ));
    }
}
