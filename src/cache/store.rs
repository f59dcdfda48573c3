//! On-disk persistence for successful build results

use crate::cache::BuildResult;
use crate::error::{KilnError, KilnResult};
use crate::module::CacheKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// One persisted result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResult {
    pub key: CacheKey,
    pub result: BuildResult,
    pub built_at: DateTime<Utc>,
}

impl CachedResult {
    pub fn new(key: CacheKey, result: BuildResult) -> Self {
        Self {
            key,
            result,
            built_at: Utc::now(),
        }
    }

    /// A persisted result is only reusable while its install tree exists
    pub fn is_valid(&self) -> bool {
        self.result.is_ok() && self.result.output_dir.is_dir()
    }
}

/// Directory of JSON files, one per (module, variant)
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    /// Store rooted at `<state_dir>/results`
    pub fn new(state_dir: &Path) -> Self {
        Self {
            dir: state_dir.join("results"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for a key: first 16 hex chars of the SHA-256 of its display form
    pub fn file_name(key: &CacheKey) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.to_string().as_bytes());
        let hash = hex::encode(hasher.finalize());
        format!("{}.json", &hash[..16])
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(Self::file_name(key))
    }

    /// Persist a result. Failed results are not written.
    pub async fn save(&self, key: &CacheKey, result: &BuildResult) -> KilnResult<()> {
        if result.is_failed() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| KilnError::io(format!("creating {}", self.dir.display()), e))?;

        let path = self.entry_path(key);
        let entry = CachedResult::new(key.clone(), result.clone());
        let content = serde_json::to_string_pretty(&entry)?;
        fs::write(&path, content)
            .await
            .map_err(|e| KilnError::io(format!("writing {}", path.display()), e))?;

        debug!("Persisted result for {}", key);
        Ok(())
    }

    /// Every readable entry, ordered by key. Unreadable files are skipped.
    pub async fn list(&self) -> KilnResult<Vec<CachedResult>> {
        let mut entries = Vec::new();
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => {
                return Err(KilnError::io(format!("reading {}", self.dir.display()), e));
            }
        };

        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| KilnError::io(format!("reading {}", self.dir.display()), e))?
        {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_entry(&path).await {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("Skipping cached result: {}", e),
            }
        }

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    /// Entries that can be reused by a new run
    pub async fn load_valid(&self) -> KilnResult<Vec<(CacheKey, BuildResult)>> {
        let entries = self.list().await?;
        let total = entries.len();
        let valid: Vec<_> = entries
            .into_iter()
            .filter(CachedResult::is_valid)
            .map(|e| (e.key, e.result))
            .collect();
        debug!("Loaded {} of {} cached results", valid.len(), total);
        Ok(valid)
    }

    /// Remove every persisted result, returning how many were removed
    pub async fn clear(&self) -> KilnResult<usize> {
        let entries = self.list().await?;
        for entry in &entries {
            let path = self.entry_path(&entry.key);
            fs::remove_file(&path)
                .await
                .map_err(|e| KilnError::io(format!("removing {}", path.display()), e))?;
        }
        Ok(entries.len())
    }

    async fn read_entry(path: &Path) -> KilnResult<CachedResult> {
        let invalid = |reason: String| KilnError::CacheEntryInvalid {
            path: path.to_path_buf(),
            reason,
        };
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| invalid(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))
    }
}
