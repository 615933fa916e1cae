//! Driver lookup and instantiation.
//!
//! Drivers are requested by name. The name's configuration entry selects a
//! driver kind, and the kind selects a factory: custom factories registered
//! with [`DriverRegistry::extend`] first, then the built-in kinds. Instances
//! are created on first use and kept for the life of the registry.

use crate::array::{ArrayStore, ARRAY_DRIVER};
use crate::config::{DriverConfig, FeaturesConfig};
use crate::error::{FeatureError, FeatureResult};
use crate::store::FeatureStore;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Factory building a store from its driver configuration.
pub type DriverFactory =
    Arc<dyn Fn(&DriverConfig) -> FeatureResult<Arc<dyn FeatureStore>> + Send + Sync>;

/// Registry of driver factories and created driver instances.
#[derive(Default)]
pub struct DriverRegistry {
    factories: DashMap<String, DriverFactory>,
    instances: DashMap<String, Arc<dyn FeatureStore>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for a custom driver kind.
    ///
    /// # Examples
    ///
    /// ```
    /// use flagstaff_core::driver::DriverRegistry;
    /// use flagstaff_core::{ArrayStore, FeatureStore};
    /// use std::sync::Arc;
    ///
    /// let registry = DriverRegistry::new();
    /// registry.extend("memory", |_config| {
    ///     Ok(Arc::new(ArrayStore::new()) as Arc<dyn FeatureStore>)
    /// });
    /// ```
    pub fn extend<F>(&self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&DriverConfig) -> FeatureResult<Arc<dyn FeatureStore>> + Send + Sync + 'static,
    {
        let kind = kind.into();
        debug!(driver = %kind, "registered custom feature driver");
        self.factories.insert(kind, Arc::new(factory));
    }

    /// Get the store for a driver name, creating it on first access.
    pub fn resolve(&self, name: &str, config: &FeaturesConfig) -> FeatureResult<Arc<dyn FeatureStore>> {
        if let Some(store) = self.instances.get(name) {
            return Ok(store.value().clone());
        }

        let driver_config = config.driver(name)?;
        let store = self.create(driver_config)?;
        debug!(name = %name, driver = %driver_config.driver, "created feature store");

        // A concurrent first access may have won; keep whichever landed first.
        let store = self
            .instances
            .entry(name.to_string())
            .or_insert(store)
            .value()
            .clone();
        Ok(store)
    }

    fn create(&self, config: &DriverConfig) -> FeatureResult<Arc<dyn FeatureStore>> {
        let factory = self
            .factories
            .get(&config.driver)
            .map(|factory| factory.value().clone());
        if let Some(factory) = factory {
            return factory(config);
        }

        match config.driver.as_str() {
            ARRAY_DRIVER => Ok(Arc::new(ArrayStore::new())),
            other => Err(FeatureError::UnsupportedDriver(other.to_string())),
        }
    }

    /// Drop created instances; the next access builds fresh stores.
    pub fn forget_instances(&self) {
        self.instances.clear();
    }

    /// Drop instances and custom factories.
    pub fn clear(&self) {
        self.instances.clear();
        self.factories.clear();
    }

    pub fn has_factory(&self, kind: &str) -> bool {
        kind == ARRAY_DRIVER || self.factories.contains_key(kind)
    }
}
