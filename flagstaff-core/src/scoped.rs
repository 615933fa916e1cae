//! Scope-bound view of a [`FeatureManager`].

use crate::error::FeatureResult;
use crate::manager::FeatureManager;
use crate::scope::{serialize, FeatureScope, ScopeKey};
use serde_json::Value;
use std::collections::HashMap;

/// A manager handle with one scope pre-bound.
///
/// Every call forwards to the manager with the bound scope. A handle from
/// [`FeatureManager::global`] targets the global scope.
#[derive(Clone, Copy)]
pub struct ScopedFeatures<'a> {
    manager: &'a FeatureManager,
    scope: Option<&'a dyn FeatureScope>,
}

impl<'a> ScopedFeatures<'a> {
    pub(crate) fn new(manager: &'a FeatureManager, scope: Option<&'a dyn FeatureScope>) -> Self {
        Self { manager, scope }
    }

    /// Serialized key of the bound scope.
    pub fn scope_key(&self) -> ScopeKey {
        serialize(self.scope)
    }

    pub fn manager(&self) -> &'a FeatureManager {
        self.manager
    }

    pub async fn value(&self, feature: &str) -> FeatureResult<Value> {
        self.manager.value(feature, self.scope).await
    }

    pub async fn active(&self, feature: &str) -> FeatureResult<bool> {
        self.manager.active(feature, self.scope).await
    }

    pub async fn inactive(&self, feature: &str) -> FeatureResult<bool> {
        self.manager.inactive(feature, self.scope).await
    }

    pub async fn when<T, A, I>(&self, feature: &str, on_active: A, on_inactive: I) -> FeatureResult<T>
    where
        A: FnOnce(Value) -> T,
        I: FnOnce() -> T,
    {
        self.manager
            .when(feature, on_active, on_inactive, self.scope)
            .await
    }

    pub async fn values(&self, features: &[&str]) -> FeatureResult<HashMap<String, Value>> {
        self.manager.values(features, self.scope).await
    }

    pub async fn all_are_active(&self, features: &[&str]) -> FeatureResult<bool> {
        self.manager.all_are_active(features, self.scope).await
    }

    pub async fn some_are_active(&self, features: &[&str]) -> FeatureResult<bool> {
        self.manager.some_are_active(features, self.scope).await
    }

    pub async fn all_are_inactive(&self, features: &[&str]) -> FeatureResult<bool> {
        self.manager.all_are_inactive(features, self.scope).await
    }

    pub async fn some_are_inactive(&self, features: &[&str]) -> FeatureResult<bool> {
        self.manager.some_are_inactive(features, self.scope).await
    }

    /// Eager-load features for the bound scope.
    pub async fn load(&self, features: &[&str]) -> FeatureResult<HashMap<String, Value>> {
        let loaded = self.manager.load(features, &[self.scope]).await?;
        Ok(first_per_feature(loaded))
    }

    /// Eager-load features not yet cached for the bound scope.
    pub async fn load_missing(&self, features: &[&str]) -> FeatureResult<HashMap<String, Value>> {
        let loaded = self.manager.load_missing(features, &[self.scope]).await?;
        Ok(first_per_feature(loaded))
    }

    pub async fn activate(&self, feature: &str, value: Option<Value>) -> FeatureResult<()> {
        self.manager.activate(feature, value, self.scope).await
    }

    pub async fn deactivate(&self, feature: &str) -> FeatureResult<()> {
        self.manager.deactivate(feature, self.scope).await
    }

    pub async fn forget(&self, feature: &str) -> FeatureResult<()> {
        self.manager.forget(feature, self.scope).await
    }
}

fn first_per_feature(loaded: HashMap<String, Vec<Value>>) -> HashMap<String, Value> {
    loaded
        .into_iter()
        .filter_map(|(feature, values)| values.into_iter().next().map(|value| (feature, value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::manager::FeatureManager;
    use crate::scope::{FeatureScope, ScopeKey};
    use serde_json::json;

    struct Team(&'static str);

    impl FeatureScope for Team {
        fn scope_id(&self) -> String {
            self.0.to_string()
        }
    }

    #[tokio::test]
    async fn test_handle_binds_scope() {
        let manager = FeatureManager::default();
        manager.define("team-beta", |scope: &ScopeKey| scope.id() == Some("core"));

        let core = Team("core");
        let web = Team("web");

        assert!(manager.for_scope(&core).active("team-beta").await.unwrap());
        assert!(manager.for_scope(&web).inactive("team-beta").await.unwrap());
        assert_eq!(manager.for_scope(&core).scope_key().as_str(), "Team:core");
    }

    #[tokio::test]
    async fn test_writes_stay_in_scope() {
        let manager = FeatureManager::default();
        manager.define_value("beta", false);

        let core = Team("core");
        let handle = manager.for_scope(&core);
        handle.activate("beta", None).await.unwrap();

        assert!(handle.active("beta").await.unwrap());
        assert!(manager.global().inactive("beta").await.unwrap());
        assert!(manager.global().scope_key().is_global());

        handle.forget("beta").await.unwrap();
        assert!(handle.inactive("beta").await.unwrap());
    }

    #[tokio::test]
    async fn test_load_single_scope() {
        let manager = FeatureManager::default();
        manager.define_value("a", 1);
        manager.define_value("b", "two");

        let loaded = manager.global().load(&["a", "b"]).await.unwrap();

        assert_eq!(loaded["a"], json!(1));
        assert_eq!(loaded["b"], json!("two"));
        assert_eq!(manager.cache().len(), 2);
    }

    #[tokio::test]
    async fn test_when_and_batches() {
        let manager = FeatureManager::default();
        manager.define_value("on", true);
        manager.define_value("off", false);

        let core = Team("core");
        let handle = manager.for_scope(&core);

        assert_eq!(handle.when("on", |_| 1, || 0).await.unwrap(), 1);
        assert!(handle.some_are_active(&["on", "off"]).await.unwrap());
        assert!(!handle.all_are_active(&["on", "off"]).await.unwrap());
        assert!(handle.all_are_inactive(&["off"]).await.unwrap());
        assert!(handle.some_are_inactive(&["on", "off"]).await.unwrap());
        assert_eq!(handle.values(&["on"]).await.unwrap()["on"], json!(true));
    }
}
