//! Compiled filters
//!
//! Compilation runs in two phases. External inputs (holdings files, ID list
//! files) are resolved first, asynchronously; the declarations are then
//! compiled synchronously against the resolved inputs, so a [`Filter`] is
//! pure and cheap to apply.

use chrono::NaiveDate;
use span_common::{Error, Record, Result};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use super::{BlacklistDecl, FilterConfig, FilterDecl, HoldingDecl, ListDecl};
use crate::holdings::{CoverageIndex, HoldingsCache};

/// A predicate over a record
#[derive(Debug)]
pub enum Filter {
    Any,
    Source(HashSet<String>),
    List(HashSet<String>),
    Collection(HashSet<String>),
    Holding {
        indexes: Vec<Arc<CoverageIndex>>,
        collections: HashSet<String>,
    },
    Blacklist {
        ids: HashSet<String>,
        inner: Box<Filter>,
    },
    Package(HashSet<String>),
}

fn intersects(values: &[String], set: &HashSet<String>) -> bool {
    values.iter().any(|v| set.contains(v))
}

impl Filter {
    pub fn apply(&self, record: &Record, today: NaiveDate) -> bool {
        match self {
            Filter::Any => true,
            Filter::Source(sources) => sources.contains(&record.source_id),
            Filter::List(ids) => ids.contains(&record.id),
            Filter::Collection(collections) => intersects(&record.collections, collections),
            Filter::Holding {
                indexes,
                collections,
            } => {
                if !collections.is_empty() && !intersects(&record.collections, collections) {
                    return false;
                }
                indexes.iter().any(|index| index.covers_record(record, today))
            }
            Filter::Blacklist { ids, inner } => {
                !ids.contains(&record.id) && inner.apply(record, today)
            }
            Filter::Package(packages) => intersects(&record.packages, packages),
        }
    }
}

/// Inputs a declaration refers to, loaded ahead of compilation
#[derive(Default)]
struct Resolved {
    holdings: HashMap<String, Arc<CoverageIndex>>,
    lists: HashMap<PathBuf, HashSet<String>>,
}

impl Resolved {
    async fn load(config: &FilterConfig, cache: &HoldingsCache) -> Result<Self> {
        let mut resolved = Self::default();

        for reference in config.holdings_references() {
            let index = cache.resolve(&reference).await?;
            resolved.holdings.insert(reference, index);
        }

        for path in config.list_files() {
            let text = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Filter(format!("list file {}: {}", path.display(), e)))?;
            let ids = text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect();
            resolved.lists.insert(path, ids);
        }

        Ok(resolved)
    }

    fn ids(&self, inline: &[String], file: &Option<PathBuf>) -> Result<HashSet<String>> {
        let mut ids: HashSet<String> = inline.iter().cloned().collect();
        if let Some(path) = file {
            let listed = self
                .lists
                .get(path)
                .ok_or_else(|| Error::Internal(format!("unresolved list {}", path.display())))?;
            ids.extend(listed.iter().cloned());
        }
        Ok(ids)
    }

    fn compile(&self, decl: &FilterDecl) -> Result<Filter> {
        let set = |values: &[String]| values.iter().cloned().collect::<HashSet<_>>();

        Ok(match decl {
            FilterDecl::Any(_) => Filter::Any,
            FilterDecl::Source(sources) => Filter::Source(set(sources)),
            FilterDecl::List(ListDecl { ids, file }) => Filter::List(self.ids(ids, file)?),
            FilterDecl::Collection(collections) => Filter::Collection(set(collections)),
            FilterDecl::Holding(HoldingDecl { files, collections }) => {
                if files.is_empty() {
                    return Err(Error::Filter(
                        "holding filter needs at least one file".to_string(),
                    ));
                }
                let indexes = files
                    .iter()
                    .map(|f| {
                        self.holdings.get(f).cloned().ok_or_else(|| {
                            Error::Internal(format!("unresolved holdings file {}", f))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Filter::Holding {
                    indexes,
                    collections: set(collections),
                }
            }
            FilterDecl::Blacklist(BlacklistDecl { ids, file, filter }) => Filter::Blacklist {
                ids: self.ids(ids, file)?,
                inner: Box::new(self.compile(filter)?),
            },
            FilterDecl::Package(packages) => Filter::Package(set(packages)),
        })
    }
}

/// Institution filters compiled from a [`FilterConfig`]
pub struct Tagger {
    config: FilterConfig,
    filters: Vec<(String, Vec<Filter>)>,
}

impl Tagger {
    /// Resolve every holdings file and list file the configuration names,
    /// then compile its predicates.
    pub async fn compile(config: FilterConfig, cache: &HoldingsCache) -> Result<Self> {
        let resolved = Resolved::load(&config, cache).await?;

        let mut filters = Vec::with_capacity(config.institutions.len());
        for (institution, decls) in &config.institutions {
            let compiled = decls
                .iter()
                .map(|decl| resolved.compile(decl))
                .collect::<Result<Vec<_>>>()
                .map_err(|e| match e {
                    Error::Filter(message) => {
                        Error::Filter(format!("{}: {}", institution, message))
                    }
                    other => other,
                })?;
            filters.push((institution.clone(), compiled));
        }

        tracing::debug!(institutions = filters.len(), "Compiled filter configuration");
        Ok(Self { config, filters })
    }

    /// The declaration this tagger was compiled from
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Institutions for which any predicate holds
    pub fn labels(&self, record: &Record, today: NaiveDate) -> BTreeSet<String> {
        self.filters
            .iter()
            .filter(|(_, filters)| filters.iter().any(|f| f.apply(record, today)))
            .map(|(institution, _)| institution.clone())
            .collect()
    }

    /// Replace the record's labels with the matching institutions
    pub fn tag(&self, record: &mut Record, today: NaiveDate) {
        record.labels = self.labels(record, today).into_iter().collect();
    }
}
