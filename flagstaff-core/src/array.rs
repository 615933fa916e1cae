//! In-memory feature store.
//!
//! The reference driver, used in tests and ephemeral deployments. Records
//! live as long as the store instance.

use crate::error::FeatureResult;
use crate::scope::ScopeKey;
use crate::store::{FeatureStore, StoreEntry, StoredFeature};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

type Records = BTreeMap<String, BTreeMap<ScopeKey, StoredFeature>>;

/// Driver kind registered for [`ArrayStore`].
pub const ARRAY_DRIVER: &str = "array";

/// In-memory feature store.
#[derive(Clone, Default)]
pub struct ArrayStore {
    records: Arc<RwLock<Records>>,
}

impl ArrayStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records across all features.
    pub async fn len(&self) -> usize {
        self.records.read().await.values().map(BTreeMap::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn upsert(records: &mut Records, feature: &str, scope: &ScopeKey, value: Value) {
        let scopes = records.entry(feature.to_string()).or_default();
        match scopes.get_mut(scope) {
            Some(record) => record.update(value),
            None => {
                scopes.insert(
                    scope.clone(),
                    StoredFeature::new(feature, scope.clone(), value),
                );
            }
        }
    }
}

#[async_trait]
impl FeatureStore for ArrayStore {
    fn name(&self) -> &str {
        ARRAY_DRIVER
    }

    async fn get(&self, feature: &str, scope: &ScopeKey) -> FeatureResult<Option<Value>> {
        let records = self.records.read().await;
        Ok(records
            .get(feature)
            .and_then(|scopes| scopes.get(scope))
            .map(|record| record.value.clone()))
    }

    async fn get_many(
        &self,
        features: &[&str],
        scope: &ScopeKey,
    ) -> FeatureResult<HashMap<String, Value>> {
        let records = self.records.read().await;
        Ok(features
            .iter()
            .filter_map(|feature| {
                records
                    .get(*feature)
                    .and_then(|scopes| scopes.get(scope))
                    .map(|record| ((*feature).to_string(), record.value.clone()))
            })
            .collect())
    }

    async fn set(&self, feature: &str, scope: &ScopeKey, value: Value) -> FeatureResult<()> {
        let mut records = self.records.write().await;
        Self::upsert(&mut records, feature, scope, value);
        Ok(())
    }

    async fn set_many(&self, entries: &[StoreEntry]) -> FeatureResult<()> {
        // Single write guard: readers never observe a partial batch.
        let mut records = self.records.write().await;
        for entry in entries {
            Self::upsert(&mut records, &entry.feature, &entry.scope, entry.value.clone());
        }
        Ok(())
    }

    async fn forget(&self, feature: &str, scope: &ScopeKey) -> FeatureResult<()> {
        let mut records = self.records.write().await;
        if let Some(scopes) = records.get_mut(feature) {
            scopes.remove(scope);
            if scopes.is_empty() {
                records.remove(feature);
            }
        }
        Ok(())
    }

    async fn purge(&self, feature: &str) -> FeatureResult<()> {
        self.records.write().await.remove(feature);
        Ok(())
    }

    async fn purge_all(&self) -> FeatureResult<()> {
        self.records.write().await.clear();
        Ok(())
    }

    async fn feature_names(&self) -> FeatureResult<Vec<String>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|(_, scopes)| !scopes.is_empty())
            .map(|(feature, _)| feature.clone())
            .collect())
    }

    async fn all_for(&self, feature: &str) -> FeatureResult<Vec<StoredFeature>> {
        let records = self.records.read().await;
        Ok(records
            .get(feature)
            .map(|scopes| scopes.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_for_all_scopes(&self, feature: &str, value: Value) -> FeatureResult<()> {
        let mut records = self.records.write().await;
        if let Some(scopes) = records.get_mut(feature) {
            for record in scopes.values_mut() {
                record.update(value.clone());
            }
        }
        Ok(())
    }
}
