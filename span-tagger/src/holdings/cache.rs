//! Two-level holdings cache
//!
//! Raw holdings files are persisted under the cache directory with a
//! content-addressed name (SHA-256 of the reference), so later runs skip the
//! download. Parsed indexes are memoized per process; each reference is
//! loaded at most once, concurrent callers wait for the first load.
//!
//! Only `http://` and `https://` references are downloaded. Plain paths and
//! `file://` references are read in place.

use sha2::{Digest, Sha256};
use span_common::{Error, Record, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::fetch::Fetch;
use super::{kbart, CoverageIndex};
use chrono::NaiveDate;

/// When to re-download a file that is already on disk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Always download on first use in this process
    pub force: bool,
    /// Download when the cached file is older than this
    pub max_age: Option<Duration>,
}

impl RefreshPolicy {
    pub fn from_days(force: bool, max_age_days: Option<u64>) -> Self {
        Self {
            force,
            max_age: max_age_days.map(|d| Duration::from_secs(d * 24 * 60 * 60)),
        }
    }
}

/// Lowercase hex SHA-256 of a holdings reference
pub fn cache_key(reference: &str) -> String {
    let digest = Sha256::digest(reference.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

fn is_remote(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

/// Holdings file cache shared by all workers of a run
pub struct HoldingsCache {
    root: PathBuf,
    fetcher: Arc<dyn Fetch>,
    refresh: RefreshPolicy,
    indexes: Mutex<HashMap<String, Arc<OnceCell<Arc<CoverageIndex>>>>>,
}

impl HoldingsCache {
    pub fn new(root: impl Into<PathBuf>, fetcher: Arc<dyn Fetch>) -> Self {
        Self {
            root: root.into(),
            fetcher,
            refresh: RefreshPolicy::default(),
            indexes: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_refresh(mut self, refresh: RefreshPolicy) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// On-disk location of a downloaded reference
    pub fn cache_path(&self, reference: &str) -> PathBuf {
        self.root.join(cache_key(reference))
    }

    /// Coverage index for a holdings reference, loading it on first use.
    pub async fn resolve(&self, reference: &str) -> Result<Arc<CoverageIndex>> {
        let cell = {
            let mut indexes = self
                .indexes
                .lock()
                .map_err(|_| Error::Internal("holdings cache lock poisoned".to_string()))?;
            indexes.entry(reference.to_string()).or_default().clone()
        };

        let index = cell.get_or_try_init(|| self.load(reference)).await?;
        Ok(index.clone())
    }

    /// Whether the holdings behind `reference` cover the record
    pub async fn covers(&self, reference: &str, record: &Record, today: NaiveDate) -> Result<bool> {
        Ok(self.resolve(reference).await?.covers_record(record, today))
    }

    /// Number of references held in memory
    pub fn loaded(&self) -> usize {
        self.indexes
            .lock()
            .map(|m| m.values().filter(|c| c.initialized()).count())
            .unwrap_or(0)
    }

    async fn load(&self, reference: &str) -> Result<Arc<CoverageIndex>> {
        let bytes = self.read_bytes(reference).await?;

        let owned = reference.to_string();
        let index = tokio::task::spawn_blocking(move || kbart::read_holdings(&bytes, &owned))
            .await
            .map_err(|e| Error::Internal(format!("holdings parser task failed: {}", e)))??;

        if index.is_empty() {
            warn!(reference, "No entries in holdings file, may not be KBART");
        } else {
            info!(
                reference,
                entries = index.row_count(),
                issns = index.len(),
                "Parsed holdings file"
            );
        }
        Ok(Arc::new(index))
    }

    async fn read_bytes(&self, reference: &str) -> Result<Vec<u8>> {
        if !is_remote(reference) {
            let path = reference.strip_prefix("file://").unwrap_or(reference);
            return tokio::fs::read(path).await.map_err(|e| Error::Holdings {
                reference: reference.to_string(),
                message: e.to_string(),
            });
        }

        let path = self.cache_path(reference);
        if self.is_fresh(&path).await {
            debug!(reference, path = %path.display(), "Using cached holdings file");
            return tokio::fs::read(&path).await.map_err(|e| Error::Holdings {
                reference: reference.to_string(),
                message: format!("{}: {}", path.display(), e),
            });
        }

        let bytes = self.fetcher.fetch(reference).await?;
        write_atomic(&self.root, &path, &bytes).await?;
        debug!(reference, path = %path.display(), bytes = bytes.len(), "Cached holdings file");
        Ok(bytes)
    }

    async fn is_fresh(&self, path: &Path) -> bool {
        if self.refresh.force {
            return false;
        }
        let Ok(metadata) = tokio::fs::metadata(path).await else {
            return false;
        };
        let Some(max_age) = self.refresh.max_age else {
            return true;
        };
        metadata
            .modified()
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .map(|age| age <= max_age)
            .unwrap_or(true)
    }
}

/// Write to a uniquely named temp file next to `path`, then rename.
async fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    tokio::fs::create_dir_all(dir).await?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = dir.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    if let Err(e) = tokio::fs::write(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}
