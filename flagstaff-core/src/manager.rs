//! Feature manager.
//!
//! Reads consult the resolution cache, then the configured store, then the
//! definition registry. A value produced by a resolver is persisted before it
//! is cached, so the cache never holds a value the store rejected.

use crate::cache::{cache_key, ResolutionCache};
use crate::config::{DriverConfig, FeaturesConfig};
use crate::definition::{DefinitionRegistry, FeatureResolver};
use crate::driver::DriverRegistry;
use crate::error::{FeatureError, FeatureResult};
use crate::events::{FeatureEvent, FeatureEventBus};
use crate::scope::{serialize, FeatureScope, ScopeKey};
use crate::scoped::ScopedFeatures;
use crate::store::{FeatureStore, StoreEntry, StoredFeature};
use dashmap::DashMap;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Whether a feature value counts as active.
///
/// `null`, `false`, zero, the empty string and empty arrays or objects are
/// inactive; everything else is active.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Resolves, persists and caches feature values.
///
/// Cloning is cheap; clones share registries, cache and drivers.
///
/// # Examples
///
/// ```
/// use flagstaff_core::{FeatureManager, FeatureScope, ScopeKey};
///
/// struct User(u64);
///
/// impl FeatureScope for User {
///     fn scope_id(&self) -> String {
///         self.0.to_string()
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let features = FeatureManager::default();
/// features.define("rollout", |scope: &ScopeKey| {
///     scope.id().and_then(|id| id.parse::<u64>().ok()).is_some_and(|id| id % 10 == 0)
/// });
///
/// assert!(features.active("rollout", Some(&User(40))).await.unwrap());
/// assert!(features.inactive("rollout", Some(&User(41))).await.unwrap());
/// # });
/// ```
#[derive(Clone)]
pub struct FeatureManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: Option<FeaturesConfig>,
    definitions: DefinitionRegistry,
    cache: ResolutionCache,
    drivers: DriverRegistry,
    events: FeatureEventBus,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
}

impl Default for FeatureManager {
    fn default() -> Self {
        Self::new(FeaturesConfig::default())
    }
}

impl FeatureManager {
    /// Create a manager with the given configuration.
    pub fn new(config: FeaturesConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> FeatureManagerBuilder {
        FeatureManagerBuilder::new()
    }

    // ========== Configuration & Drivers ==========

    /// Active configuration.
    pub fn config(&self) -> FeatureResult<&FeaturesConfig> {
        self.inner.config.as_ref().ok_or_else(|| {
            FeatureError::NotConfigured("no feature store configuration was provided".to_string())
        })
    }

    /// The default driver's store.
    pub fn store(&self) -> FeatureResult<Arc<dyn FeatureStore>> {
        let config = self.config()?;
        self.inner.drivers.resolve(&config.default, config)
    }

    /// A named driver's store.
    pub fn driver(&self, name: &str) -> FeatureResult<Arc<dyn FeatureStore>> {
        self.inner.drivers.resolve(name, self.config()?)
    }

    /// Register a factory for a custom driver kind.
    pub fn extend<F>(&self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&DriverConfig) -> FeatureResult<Arc<dyn FeatureStore>>
            + Send
            + Sync
            + 'static,
    {
        self.inner.drivers.extend(kind, factory);
    }

    /// Run the driver's schema setup, if it has one.
    ///
    /// Uses the default driver when `driver` is `None`.
    pub async fn ensure_schema(&self, driver: Option<&str>) -> FeatureResult<bool> {
        let store = match driver {
            Some(name) => self.driver(name)?,
            None => self.store()?,
        };
        let created = store.ensure_schema().await?;
        if created {
            info!("Feature store schema created for driver: {}", store.name());
        }
        Ok(created)
    }

    pub fn events(&self) -> &FeatureEventBus {
        &self.inner.events
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.inner.cache
    }

    // ========== Definitions ==========

    pub fn definitions(&self) -> &DefinitionRegistry {
        &self.inner.definitions
    }

    /// Define a feature with a synchronous closure.
    pub fn define<F, V>(&self, name: impl Into<String>, resolver: F)
    where
        F: Fn(&ScopeKey) -> V + Send + Sync + 'static,
        V: Into<Value>,
    {
        self.inner.definitions.define(name, resolver);
    }

    /// Define a feature with an asynchronous, fallible closure.
    pub fn define_async<F, Fut>(&self, name: impl Into<String>, resolver: F)
    where
        F: Fn(ScopeKey) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FeatureResult<Value>> + Send + 'static,
    {
        self.inner.definitions.define_async(name, resolver);
    }

    /// Define a feature with a constant value.
    pub fn define_value(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.inner.definitions.define_value(name, value);
    }

    /// Register a resolver type, returning its feature name.
    pub fn define_resolver<R: FeatureResolver>(&self, name: Option<&str>, resolver: R) -> String {
        self.inner.definitions.define_resolver(name, resolver)
    }

    /// Names of all defined features.
    pub fn defined(&self) -> Vec<String> {
        self.inner.definitions.defined()
    }

    // ========== Scoped Handles ==========

    /// Bind a scope for repeated calls.
    pub fn for_scope<'a>(&'a self, scope: &'a dyn FeatureScope) -> ScopedFeatures<'a> {
        ScopedFeatures::new(self, Some(scope))
    }

    /// Handle bound to the global scope.
    pub fn global(&self) -> ScopedFeatures<'_> {
        ScopedFeatures::new(self, None)
    }

    // ========== Reads ==========

    /// Resolve a feature's value for a scope.
    pub async fn value(&self, feature: &str, scope: Option<&dyn FeatureScope>) -> FeatureResult<Value> {
        let scope = serialize(scope);
        self.value_for(feature, &scope).await
    }

    /// Whether the feature's value is truthy.
    pub async fn active(&self, feature: &str, scope: Option<&dyn FeatureScope>) -> FeatureResult<bool> {
        Ok(is_truthy(&self.value(feature, scope).await?))
    }

    pub async fn inactive(&self, feature: &str, scope: Option<&dyn FeatureScope>) -> FeatureResult<bool> {
        Ok(!self.active(feature, scope).await?)
    }

    /// Resolve once and run exactly one branch.
    pub async fn when<T, A, I>(
        &self,
        feature: &str,
        on_active: A,
        on_inactive: I,
        scope: Option<&dyn FeatureScope>,
    ) -> FeatureResult<T>
    where
        A: FnOnce(Value) -> T,
        I: FnOnce() -> T,
    {
        let value = self.value(feature, scope).await?;
        if is_truthy(&value) {
            Ok(on_active(value))
        } else {
            Ok(on_inactive())
        }
    }

    /// Resolve several features for one scope with a single batched store read.
    pub async fn values(
        &self,
        features: &[&str],
        scope: Option<&dyn FeatureScope>,
    ) -> FeatureResult<HashMap<String, Value>> {
        let scope = serialize(scope);
        self.values_for(features, &scope).await
    }

    pub async fn all_are_active(&self, features: &[&str], scope: Option<&dyn FeatureScope>) -> FeatureResult<bool> {
        let values = self.values(features, scope).await?;
        Ok(values.values().all(is_truthy))
    }

    pub async fn some_are_active(&self, features: &[&str], scope: Option<&dyn FeatureScope>) -> FeatureResult<bool> {
        let values = self.values(features, scope).await?;
        Ok(values.values().any(is_truthy))
    }

    pub async fn all_are_inactive(&self, features: &[&str], scope: Option<&dyn FeatureScope>) -> FeatureResult<bool> {
        Ok(!self.some_are_active(features, scope).await?)
    }

    pub async fn some_are_inactive(&self, features: &[&str], scope: Option<&dyn FeatureScope>) -> FeatureResult<bool> {
        Ok(!self.all_are_active(features, scope).await?)
    }

    pub(crate) async fn value_for(&self, feature: &str, scope: &ScopeKey) -> FeatureResult<Value> {
        let key = cache_key(feature, scope);
        if let Some(value) = self.inner.cache.get(&key) {
            return Ok(value);
        }

        let store = self.store()?;
        if let Some(value) = store.get(feature, scope).await? {
            self.inner.cache.set(key, value.clone());
            return Ok(value);
        }

        self.resolve_missing(&store, feature, scope).await
    }

    pub(crate) async fn values_for(
        &self,
        features: &[&str],
        scope: &ScopeKey,
    ) -> FeatureResult<HashMap<String, Value>> {
        let mut results = HashMap::with_capacity(features.len());
        let mut misses = Vec::new();

        for feature in unique(features) {
            match self.inner.cache.get(&cache_key(feature, scope)) {
                Some(value) => {
                    results.insert(feature.to_string(), value);
                }
                None => misses.push(feature),
            }
        }

        if misses.is_empty() {
            return Ok(results);
        }

        let store = self.store()?;
        let stored = store.get_many(&misses, scope).await?;

        for feature in misses {
            let value = match stored.get(feature) {
                Some(value) => {
                    self.inner.cache.set(cache_key(feature, scope), value.clone());
                    value.clone()
                }
                None => self.resolve_missing(&store, feature, scope).await?,
            };
            results.insert(feature.to_string(), value);
        }

        Ok(results)
    }

    // ========== Eager Loading ==========

    /// Pre-warm the cache for every feature and scope.
    ///
    /// Each scope costs one batched store read and, when something had to be
    /// resolved, one batched store write. Values are returned per feature in
    /// scope order.
    pub async fn load(
        &self,
        features: &[&str],
        scopes: &[Option<&dyn FeatureScope>],
    ) -> FeatureResult<HashMap<String, Vec<Value>>> {
        self.load_scopes(features, scopes, false).await
    }

    /// Like [`FeatureManager::load`], skipping pairs already cached.
    pub async fn load_missing(
        &self,
        features: &[&str],
        scopes: &[Option<&dyn FeatureScope>],
    ) -> FeatureResult<HashMap<String, Vec<Value>>> {
        self.load_scopes(features, scopes, true).await
    }

    /// Load every defined feature for the scopes.
    pub async fn load_all(
        &self,
        scopes: &[Option<&dyn FeatureScope>],
    ) -> FeatureResult<HashMap<String, Vec<Value>>> {
        let defined = self.defined();
        let features: Vec<&str> = defined.iter().map(String::as_str).collect();
        self.load_scopes(&features, scopes, false).await
    }

    async fn load_scopes(
        &self,
        features: &[&str],
        scopes: &[Option<&dyn FeatureScope>],
        skip_cached: bool,
    ) -> FeatureResult<HashMap<String, Vec<Value>>> {
        let features = unique(features);
        let mut loaded: HashMap<String, Vec<Value>> = features
            .iter()
            .map(|feature| (feature.to_string(), Vec::with_capacity(scopes.len())))
            .collect();

        if features.is_empty() {
            return Ok(loaded);
        }

        let store = self.store()?;
        for scope in scopes {
            let scope = serialize(*scope);
            let mut values = HashMap::with_capacity(features.len());
            let mut pending = Vec::with_capacity(features.len());

            for feature in &features {
                let cached = if skip_cached {
                    self.inner.cache.get(&cache_key(feature, &scope))
                } else {
                    None
                };
                match cached {
                    Some(value) => {
                        values.insert(feature.to_string(), value);
                    }
                    None => pending.push(*feature),
                }
            }

            if !pending.is_empty() {
                values.extend(self.load_scope(&store, &pending, &scope).await?);
            }

            for feature in &features {
                if let (Some(value), Some(per_scope)) = (values.remove(*feature), loaded.get_mut(*feature)) {
                    per_scope.push(value);
                }
            }
        }

        Ok(loaded)
    }

    async fn load_scope(
        &self,
        store: &Arc<dyn FeatureStore>,
        features: &[&str],
        scope: &ScopeKey,
    ) -> FeatureResult<HashMap<String, Value>> {
        let values = store.get_many(features, scope).await?;
        for (feature, value) in &values {
            self.inner.cache.set(cache_key(feature, scope), value.clone());
        }

        let missing: Vec<&str> = features
            .iter()
            .copied()
            .filter(|feature| !values.contains_key(*feature))
            .collect();
        if missing.is_empty() {
            return Ok(values);
        }

        if !self.single_flight() {
            return self.resolve_batch(store, &missing, scope, values, false).await;
        }

        // Sorted acquisition keeps overlapping loads from deadlocking.
        let mut keys: Vec<String> = missing.iter().map(|feature| cache_key(feature, scope)).collect();
        keys.sort();
        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            guards.push(self.gate(key).lock_owned().await);
        }

        let result = self.resolve_batch(store, &missing, scope, values, true).await;

        drop(guards);
        for key in &keys {
            self.release_gate(key);
        }
        result
    }

    /// Resolve `missing`, persist them with one `set_many`, then cache and emit.
    ///
    /// With `recheck`, values cached by a concurrent resolution are taken
    /// instead of resolving again.
    async fn resolve_batch(
        &self,
        store: &Arc<dyn FeatureStore>,
        missing: &[&str],
        scope: &ScopeKey,
        mut values: HashMap<String, Value>,
        recheck: bool,
    ) -> FeatureResult<HashMap<String, Value>> {
        let mut entries = Vec::with_capacity(missing.len());
        for feature in missing {
            if recheck {
                if let Some(value) = self.inner.cache.get(&cache_key(feature, scope)) {
                    values.insert(feature.to_string(), value);
                    continue;
                }
            }
            let value = self.resolve(feature, scope).await?;
            entries.push(StoreEntry::new(*feature, scope.clone(), value));
        }

        if entries.is_empty() {
            return Ok(values);
        }

        store.set_many(&entries).await?;
        debug!("Loaded {} unresolved features for scope: {}", entries.len(), scope);

        for entry in entries {
            self.inner
                .cache
                .set(cache_key(&entry.feature, scope), entry.value.clone());
            self.inner
                .events
                .emit(FeatureEvent::resolved(
                    entry.feature.clone(),
                    scope.clone(),
                    entry.value.clone(),
                ))
                .await;
            values.insert(entry.feature, entry.value);
        }

        Ok(values)
    }

    // ========== Resolution ==========

    async fn resolve(&self, feature: &str, scope: &ScopeKey) -> FeatureResult<Value> {
        let definition = self
            .inner
            .definitions
            .lookup(feature)
            .ok_or_else(|| FeatureError::NotDefined(feature.to_string()))?;
        definition.resolve(scope).await
    }

    async fn resolve_missing(
        &self,
        store: &Arc<dyn FeatureStore>,
        feature: &str,
        scope: &ScopeKey,
    ) -> FeatureResult<Value> {
        if !self.single_flight() {
            return self.resolve_and_persist(store, feature, scope).await;
        }

        let key = cache_key(feature, scope);
        let guard = self.gate(&key).lock_owned().await;
        let result = match self.inner.cache.get(&key) {
            Some(value) => Ok(value),
            None => self.resolve_and_persist(store, feature, scope).await,
        };

        drop(guard);
        self.release_gate(&key);
        result
    }

    /// Single-flight gate for a cache key, created on first use.
    fn gate(&self, key: &str) -> Arc<Mutex<()>> {
        self.inner
            .in_flight
            .entry(key.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Drop the gate once only the map still holds it.
    fn release_gate(&self, key: &str) {
        self.inner
            .in_flight
            .remove_if(key, |_, gate| Arc::strong_count(gate) == 1);
    }

    async fn resolve_and_persist(
        &self,
        store: &Arc<dyn FeatureStore>,
        feature: &str,
        scope: &ScopeKey,
    ) -> FeatureResult<Value> {
        let value = self.resolve(feature, scope).await?;
        store.set(feature, scope, value.clone()).await?;
        self.inner.cache.set(cache_key(feature, scope), value.clone());
        self.inner
            .events
            .emit(FeatureEvent::resolved(feature, scope.clone(), value.clone()))
            .await;
        Ok(value)
    }

    fn single_flight(&self) -> bool {
        self.inner
            .config
            .as_ref()
            .is_some_and(|config| config.single_flight)
    }

    // ========== Writes ==========

    /// Store `value` (or `true`) for a scope without consulting the resolver.
    pub async fn activate(
        &self,
        feature: &str,
        value: Option<Value>,
        scope: Option<&dyn FeatureScope>,
    ) -> FeatureResult<()> {
        let scope = serialize(scope);
        self.write(feature, &scope, value.unwrap_or(Value::Bool(true)))
            .await
    }

    /// Store `false` for a scope.
    pub async fn deactivate(&self, feature: &str, scope: Option<&dyn FeatureScope>) -> FeatureResult<()> {
        let scope = serialize(scope);
        self.write(feature, &scope, Value::Bool(false)).await
    }

    /// Store `value` (or `true`) at the global scope and over every scope
    /// that already has a record.
    pub async fn activate_for_everyone(&self, feature: &str, value: Option<Value>) -> FeatureResult<()> {
        self.write_everywhere(feature, value.unwrap_or(Value::Bool(true)))
            .await
    }

    /// Store `false` at the global scope and over every stored scope.
    pub async fn deactivate_for_everyone(&self, feature: &str) -> FeatureResult<()> {
        self.write_everywhere(feature, Value::Bool(false)).await
    }

    async fn write_everywhere(&self, feature: &str, value: Value) -> FeatureResult<()> {
        let store = self.store()?;
        let global = ScopeKey::global();
        store.set_for_all_scopes(feature, value.clone()).await?;
        store.set(feature, &global, value.clone()).await?;

        // Stale per-scope entries are re-read from the store on next access.
        self.inner.cache.delete_by_prefix(feature);
        self.inner.cache.set(cache_key(feature, &global), value.clone());
        debug!("Set feature {} for every stored scope", feature);

        self.inner
            .events
            .emit(FeatureEvent::updated(feature, global, value))
            .await;
        Ok(())
    }

    pub(crate) async fn write(&self, feature: &str, scope: &ScopeKey, value: Value) -> FeatureResult<()> {
        self.store()?.set(feature, scope, value.clone()).await?;
        self.inner.cache.set(cache_key(feature, scope), value.clone());
        self.inner
            .events
            .emit(FeatureEvent::updated(feature, scope.clone(), value))
            .await;
        Ok(())
    }

    // ========== Cleanup ==========

    /// Delete the stored value for one scope; the next read re-resolves.
    pub async fn forget(&self, feature: &str, scope: Option<&dyn FeatureScope>) -> FeatureResult<()> {
        let scope = serialize(scope);
        self.store()?.forget(feature, &scope).await?;
        self.inner.cache.delete(&cache_key(feature, &scope));
        self.inner
            .events
            .emit(FeatureEvent::deleted(Some(feature.to_string()), Some(scope)))
            .await;
        Ok(())
    }

    /// Delete a feature's stored values for every scope.
    pub async fn purge(&self, feature: &str) -> FeatureResult<()> {
        self.store()?.purge(feature).await?;
        let swept = self.inner.cache.delete_by_prefix(feature);
        debug!("Purged feature {} ({} cached entries swept)", feature, swept);
        self.inner
            .events
            .emit(FeatureEvent::deleted(Some(feature.to_string()), None))
            .await;
        Ok(())
    }

    /// Delete every stored value and empty the cache.
    pub async fn purge_all(&self) -> FeatureResult<()> {
        self.store()?.purge_all().await?;
        self.inner.cache.clear();
        info!("Purged all stored features");
        self.inner.events.emit(FeatureEvent::deleted(None, None)).await;
        Ok(())
    }

    /// Names of features with at least one stored value.
    pub async fn stored(&self) -> FeatureResult<Vec<String>> {
        self.store()?.feature_names().await
    }

    /// Every stored record of a feature, ordered by scope.
    pub async fn stored_records(&self, feature: &str) -> FeatureResult<Vec<StoredFeature>> {
        self.store()?.all_for(feature).await
    }

    /// Empty the resolution cache, keeping stored values.
    pub fn flush_cache(&self) {
        self.inner.cache.clear();
    }

    /// Drop created driver instances; the next store access rebuilds them.
    pub fn forget_drivers(&self) {
        self.inner.drivers.forget_instances();
    }

    /// Clear definitions, cache, driver instances and custom driver factories.
    ///
    /// Event listeners stay subscribed.
    pub fn reset(&self) {
        self.inner.definitions.clear();
        self.inner.cache.clear();
        self.inner.drivers.clear();
        self.inner.in_flight.clear();
        debug!("Feature manager reset");
    }
}

/// Drop repeated feature names, keeping first occurrences in order.
fn unique<'a>(features: &[&'a str]) -> Vec<&'a str> {
    let mut seen = HashSet::with_capacity(features.len());
    features
        .iter()
        .copied()
        .filter(|feature| seen.insert(*feature))
        .collect()
}

/// Builder for [`FeatureManager`].
#[derive(Default)]
pub struct FeatureManagerBuilder {
    config: Option<FeaturesConfig>,
    events: Option<FeatureEventBus>,
}

impl FeatureManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the store configuration.
    pub fn config(mut self, config: FeaturesConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Share an existing event bus.
    pub fn events(mut self, events: FeatureEventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> FeatureManager {
        FeatureManager {
            inner: Arc::new(Inner {
                config: self.config,
                definitions: DefinitionRegistry::new(),
                cache: ResolutionCache::new(),
                drivers: DriverRegistry::new(),
                events: self.events.unwrap_or_default(),
                in_flight: DashMap::new(),
            }),
        }
    }
}
