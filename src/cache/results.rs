use std::sync::Arc;

use metrics::counter;
use tracing::info;

use crate::domain::digest::ContentDigest;

use super::store::{KeyValueStore, MemoryStore, StoreError};

/// Namespace for run results inside the shared store.
pub const CACHE_PREFIX: &str = "run_code_result_";

/// Content-addressed cache of the last run output per code digest.
///
/// Each entry holds the full accumulated output of the most recent run as a
/// single blob. Cloning is cheap; clones share the underlying store.
#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn KeyValueStore>,
}

impl ResultCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Cache over a fresh [`MemoryStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn key_for(digest: &ContentDigest) -> String {
        format!("{CACHE_PREFIX}{digest}")
    }

    pub fn get(&self, digest: &ContentDigest) -> Result<Option<String>, StoreError> {
        self.store.get(&Self::key_for(digest))
    }

    /// Replace the cached output for `digest`.
    pub fn set(&self, digest: &ContentDigest, value: &str) -> Result<(), StoreError> {
        self.store.set(&Self::key_for(digest), value)
    }

    /// Remove every prefixed entry. Keys outside the namespace are untouched.
    pub fn clear_all(&self) -> Result<(), StoreError> {
        let mut removed = 0usize;
        for key in self.store.keys()? {
            if key.starts_with(CACHE_PREFIX) {
                self.store.remove(&key)?;
                removed += 1;
            }
        }

        counter!("fencerun_cache_cleared_total").increment(removed as u64);
        info!(
            target = "fencerun::cache",
            op = "cache::clear_all",
            removed,
            "Cleared cached run results"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with_store() -> (ResultCache, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (ResultCache::new(store.clone()), store)
    }

    #[test]
    fn set_then_get_round_trips() {
        let cache = ResultCache::in_memory();
        let digest = ContentDigest::of("--run--\necho hi");

        assert_eq!(cache.get(&digest).expect("get"), None);
        cache.set(&digest, "hi").expect("set");
        assert_eq!(cache.get(&digest).expect("get").as_deref(), Some("hi"));

        cache.set(&digest, "replaced").expect("set");
        assert_eq!(cache.get(&digest).expect("get").as_deref(), Some("replaced"));
    }

    #[test]
    fn keys_are_prefixed_digests() {
        let (cache, store) = cache_with_store();
        let digest = ContentDigest::of("x");
        cache.set(&digest, "out").expect("set");

        let keys = store.keys().expect("keys");
        assert_eq!(keys, vec![format!("run_code_result_{digest}")]);
    }

    #[test]
    fn clear_all_only_removes_prefixed_keys() {
        let (cache, store) = cache_with_store();
        store.set("other_key", "keep me").expect("set");
        cache.set(&ContentDigest::of("a"), "1").expect("set");
        cache.set(&ContentDigest::of("b"), "2").expect("set");

        cache.clear_all().expect("clear");
        assert_eq!(store.keys().expect("keys"), vec!["other_key".to_string()]);

        cache.clear_all().expect("second clear is a no-op");
        assert_eq!(store.keys().expect("keys"), vec!["other_key".to_string()]);
        assert_eq!(
            store.get("other_key").expect("get").as_deref(),
            Some("keep me")
        );
    }
}
