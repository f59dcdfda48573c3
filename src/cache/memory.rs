use crate::cache::BuildResult;
use crate::error::{KilnError, KilnResult};
use crate::module::CacheKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

type Slot = Arc<Mutex<Option<BuildResult>>>;

/// Concurrent (module, variant) → result map.
///
/// The outer lock is only held long enough to find or create a key's slot;
/// reads and writes of the result itself lock that slot alone, so work on
/// unrelated keys never serializes.
#[derive(Debug, Default)]
pub struct ResultCache {
    slots: RwLock<HashMap<CacheKey, Slot>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefill from previously persisted results
    pub fn with_entries(entries: impl IntoIterator<Item = (CacheKey, BuildResult)>) -> Self {
        let slots = entries
            .into_iter()
            .map(|(key, result)| (key, Arc::new(Mutex::new(Some(result)))))
            .collect();
        Self {
            slots: RwLock::new(slots),
        }
    }

    /// The stored result for `key`, if any
    pub fn get(&self, key: &CacheKey) -> Option<BuildResult> {
        let slot = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()?;
        let value = slot.lock().unwrap_or_else(PoisonError::into_inner);
        value.clone()
    }

    /// Store `result` under `key`.
    ///
    /// The first write wins; a second write for the same key is an error and
    /// leaves the stored result untouched.
    pub fn put(&self, key: CacheKey, result: BuildResult) -> KilnResult<()> {
        let slot = self.slot(&key);
        let mut value = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if value.is_some() {
            return Err(KilnError::DuplicateResult(key));
        }
        *value = Some(result);
        Ok(())
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.get(key).is_some()
    }

    /// Number of stored results
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All stored results, ordered by key
    pub fn snapshot(&self) -> Vec<(CacheKey, BuildResult)> {
        let slots: Vec<(CacheKey, Slot)> = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, s)| (k.clone(), s.clone()))
            .collect();

        let mut entries: Vec<(CacheKey, BuildResult)> = slots
            .into_iter()
            .filter_map(|(key, slot)| {
                let value = slot.lock().unwrap_or_else(PoisonError::into_inner);
                value.clone().map(|result| (key, result))
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    fn slot(&self, key: &CacheKey) -> Slot {
        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return slot.clone();
        }
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
            .or_default()
            .clone()
    }
}
