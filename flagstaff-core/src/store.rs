//! Feature store trait definition.

use crate::error::FeatureResult;
use crate::scope::ScopeKey;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A persisted feature value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFeature {
    /// Feature name
    pub feature: String,
    /// Serialized scope
    pub scope: ScopeKey,
    /// Stored value
    pub value: Value,
    /// First write
    pub created_at: DateTime<Utc>,
    /// Last overwrite
    pub updated_at: DateTime<Utc>,
}

impl StoredFeature {
    /// Create a record stamped with the current time.
    pub fn new(feature: impl Into<String>, scope: ScopeKey, value: Value) -> Self {
        let now = Utc::now();
        Self {
            feature: feature.into(),
            scope,
            value,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the value, keeping `created_at`.
    pub fn update(&mut self, value: Value) {
        self.value = value;
        self.updated_at = Utc::now();
    }
}

/// One write in a [`FeatureStore::set_many`] batch.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreEntry {
    pub feature: String,
    pub scope: ScopeKey,
    pub value: Value,
}

impl StoreEntry {
    pub fn new(feature: impl Into<String>, scope: ScopeKey, value: Value) -> Self {
        Self {
            feature: feature.into(),
            scope,
            value,
        }
    }
}

/// Persistence contract every feature driver implements.
///
/// One record exists per (feature, scope). Drivers own their transactional
/// guarantees; the manager never retries or falls back to another driver.
#[async_trait]
pub trait FeatureStore: Send + Sync {
    /// Driver kind, used in logs.
    fn name(&self) -> &str;

    /// Get the stored value for a feature and scope.
    ///
    /// Returns `Ok(None)` when no record exists.
    async fn get(&self, feature: &str, scope: &ScopeKey) -> FeatureResult<Option<Value>>;

    /// Get stored values for several features of one scope.
    ///
    /// Only features with a record appear in the result.
    async fn get_many(
        &self,
        features: &[&str],
        scope: &ScopeKey,
    ) -> FeatureResult<HashMap<String, Value>> {
        let mut found = HashMap::with_capacity(features.len());
        for feature in features {
            if let Some(value) = self.get(feature, scope).await? {
                found.insert((*feature).to_string(), value);
            }
        }
        Ok(found)
    }

    /// Insert or overwrite a value.
    ///
    /// Overwrites advance `updated_at` and keep `created_at`.
    async fn set(&self, feature: &str, scope: &ScopeKey, value: Value) -> FeatureResult<()>;

    /// Write several values.
    ///
    /// Semantically a sequence of [`FeatureStore::set`] calls; drivers with
    /// transactions apply the batch atomically.
    async fn set_many(&self, entries: &[StoreEntry]) -> FeatureResult<()> {
        for entry in entries {
            self.set(&entry.feature, &entry.scope, entry.value.clone())
                .await?;
        }
        Ok(())
    }

    /// Delete the record for one feature and scope.
    async fn forget(&self, feature: &str, scope: &ScopeKey) -> FeatureResult<()>;

    /// Delete every record of a feature.
    async fn purge(&self, feature: &str) -> FeatureResult<()>;

    /// Delete every record.
    async fn purge_all(&self) -> FeatureResult<()>;

    /// Sorted, distinct names of features with at least one record.
    async fn feature_names(&self) -> FeatureResult<Vec<String>>;

    /// Every record of a feature, ordered by scope.
    async fn all_for(&self, feature: &str) -> FeatureResult<Vec<StoredFeature>>;

    /// Overwrite every existing record of a feature with `value`.
    ///
    /// Scopes without a record are left alone.
    async fn set_for_all_scopes(&self, feature: &str, value: Value) -> FeatureResult<()> {
        let entries: Vec<StoreEntry> = self
            .all_for(feature)
            .await?
            .into_iter()
            .map(|record| StoreEntry::new(record.feature, record.scope, value.clone()))
            .collect();
        if entries.is_empty() {
            return Ok(());
        }
        self.set_many(&entries).await
    }

    /// Create whatever backing schema the driver needs.
    ///
    /// Idempotent. Returns `true` when the driver did any work; drivers
    /// without a schema keep the default no-op.
    async fn ensure_schema(&self) -> FeatureResult<bool> {
        Ok(false)
    }
}
