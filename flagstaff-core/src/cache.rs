//! In-process resolution cache.
//!
//! Memoizes resolved and stored values per (feature, scope). Entries are never
//! evicted; they are removed only by explicit invalidation.

use crate::scope::ScopeKey;
use dashmap::DashMap;
use serde_json::Value;
use tracing::trace;

/// Delimiter between feature name and scope in cache keys.
const DELIMITER: char = '\0';

/// Build the cache key for a feature and scope.
pub fn cache_key(feature: &str, scope: &ScopeKey) -> String {
    let mut key = String::with_capacity(feature.len() + scope.as_str().len() + 1);
    key.push_str(feature);
    key.push(DELIMITER);
    key.push_str(scope.as_str());
    key
}

/// Unbounded cache of (feature, scope) to value.
///
/// Presence is the hit signal: `false`, `0` and `null` are valid cached values.
#[derive(Debug, Default)]
pub struct ResolutionCache {
    entries: DashMap<String, Value>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cached value, `None` on a miss.
    pub fn get(&self, key: &str) -> Option<Value> {
        let hit = self.entries.get(key).map(|entry| entry.value().clone());
        if hit.is_some() {
            trace!(key = %key.replace(DELIMITER, "|"), "resolution cache hit");
        }
        hit
    }

    pub fn set(&self, key: String, value: Value) {
        self.entries.insert(key, value);
    }

    pub fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove every entry belonging to `feature`, across all scopes.
    pub fn delete_by_prefix(&self, feature: &str) -> usize {
        let prefix = format!("{feature}{DELIMITER}");
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(&prefix));
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cache_key_layout() {
        let key = cache_key("beta", &ScopeKey::new("User:1"));
        assert_eq!(key, "beta\0User:1");
    }

    #[test]
    fn test_falsy_values_are_hits() {
        let cache = ResolutionCache::new();
        let key = cache_key("flag", &ScopeKey::global());

        assert_eq!(cache.get(&key), None);

        cache.set(key.clone(), json!(false));
        assert_eq!(cache.get(&key), Some(json!(false)));

        cache.set(key.clone(), json!(0));
        assert_eq!(cache.get(&key), Some(json!(0)));

        cache.set(key.clone(), Value::Null);
        assert_eq!(cache.get(&key), Some(Value::Null));
        assert!(cache.contains(&key));
    }

    #[test]
    fn test_delete() {
        let cache = ResolutionCache::new();
        let key = cache_key("flag", &ScopeKey::global());
        cache.set(key.clone(), json!(true));

        cache.delete(&key);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_delete_by_prefix_only_touches_feature() {
        let cache = ResolutionCache::new();
        cache.set(cache_key("beta", &ScopeKey::new("User:1")), json!(true));
        cache.set(cache_key("beta", &ScopeKey::new("User:2")), json!(false));
        cache.set(cache_key("beta-v2", &ScopeKey::new("User:1")), json!(true));
        cache.set(cache_key("other", &ScopeKey::global()), json!(1));

        let removed = cache.delete_by_prefix("beta");

        assert_eq!(removed, 2);
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&cache_key("beta-v2", &ScopeKey::new("User:1"))));
    }

    #[test]
    fn test_clear() {
        let cache = ResolutionCache::new();
        cache.set(cache_key("a", &ScopeKey::global()), json!(true));
        cache.set(cache_key("b", &ScopeKey::global()), json!(true));

        cache.clear();
        assert!(cache.is_empty());
    }
}
