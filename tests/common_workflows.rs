//! Integration tests for common Flagstaff workflows.
//!
//! These tests verify that the most common use cases work correctly.

use flagstaff::prelude::*;
use flagstaff::{RecordingListener, StoredFeature};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct User {
    id: u64,
}

impl User {
    fn new(id: u64) -> Self {
        Self { id }
    }
}

impl FeatureScope for User {
    fn scope_id(&self) -> String {
        self.id.to_string()
    }
}

struct Organization(&'static str);

impl FeatureScope for Organization {
    fn scope_id(&self) -> String {
        self.0.to_string()
    }

    fn scope_type(&self) -> String {
        "Org".to_string()
    }
}

// =============================================================================
// Definition & Resolution Tests
// =============================================================================

#[tokio::test]
async fn test_gradual_rollout_workflow() {
    let features = FeatureManager::default();
    features.define("new-search", |scope: &ScopeKey| {
        scope
            .id()
            .and_then(|id| id.parse::<u64>().ok())
            .is_some_and(|id| id % 10 == 0)
    });

    let enabled: Vec<u64> = {
        let mut ids = Vec::new();
        for id in 1..=30 {
            let user = User::new(id);
            if features.active("new-search", Some(&user)).await.unwrap() {
                ids.push(id);
            }
        }
        ids
    };
    assert_eq!(enabled, vec![10, 20, 30]);

    // Roll out to everyone once confident
    features.activate_for_everyone("new-search", None).await.unwrap();
    let user = User::new(7);
    assert!(features.active("new-search", Some(&user)).await.unwrap());
    assert!(features.active("new-search", None).await.unwrap());

    // And pull it back
    features.deactivate_for_everyone("new-search").await.unwrap();
    assert!(features.inactive("new-search", Some(&user)).await.unwrap());
}

#[tokio::test]
async fn test_rich_values_workflow() {
    let features = FeatureManager::default();
    features.define("purchase-button", |scope: &ScopeKey| {
        match scope.id().and_then(|id| id.parse::<u64>().ok()) {
            Some(id) if id % 2 == 0 => json!("blue-sapphire"),
            Some(_) => json!("seafoam-green"),
            None => Value::Null,
        }
    });

    let even = User::new(2);
    let odd = User::new(3);

    let color = features
        .when(
            "purchase-button",
            |value| value.as_str().map(str::to_string),
            || None,
            Some(&even),
        )
        .await
        .unwrap();
    assert_eq!(color.as_deref(), Some("blue-sapphire"));

    assert_eq!(
        features.value("purchase-button", Some(&odd)).await.unwrap(),
        json!("seafoam-green")
    );
    assert!(features.global().inactive("purchase-button").await.unwrap());
}

#[tokio::test]
async fn test_async_resolver_workflow() {
    let features = FeatureManager::default();
    let lookups = Arc::new(AtomicUsize::new(0));
    let counter = lookups.clone();

    features.define_async("billing-v2", move |scope: ScopeKey| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(json!(scope.as_str().starts_with("Org:")))
        }
    });

    let org = Organization("acme");
    let handle = features.for_scope(&org);

    assert!(handle.active("billing-v2").await.unwrap());
    assert!(handle.active("billing-v2").await.unwrap());
    assert_eq!(handle.scope_key().as_str(), "Org:acme");
    assert_eq!(lookups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_resolver_type_workflow() {
    struct InternalTools {
        domain: &'static str,
    }

    #[async_trait::async_trait]
    impl FeatureResolver for InternalTools {
        async fn resolve(&self, scope: &ScopeKey) -> FeatureResult<Value> {
            Ok(json!(scope.as_str().ends_with(self.domain)))
        }
    }

    let features = FeatureManager::default();
    let name = features.define_resolver(None, InternalTools { domain: "staff" });
    assert_eq!(name, "internal-tools");
    assert_eq!(features.defined(), vec!["internal-tools"]);

    let staff = ScopeKey::new("User:staff");
    assert!(features.active(&name, Some(&staff)).await.unwrap());
    assert!(features.inactive(&name, None).await.unwrap());
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[tokio::test]
async fn test_manual_override_workflow() {
    let features = FeatureManager::default();
    features.define_value("beta-program", false);

    let tester = User::new(1);
    let regular = User::new(2);

    features
        .for_scope(&tester)
        .activate("beta-program", None)
        .await
        .unwrap();

    assert!(features.active("beta-program", Some(&tester)).await.unwrap());
    assert!(features.inactive("beta-program", Some(&regular)).await.unwrap());

    let records: Vec<StoredFeature> = features.stored_records("beta-program").await.unwrap();
    let scopes: Vec<&str> = records.iter().map(|r| r.scope.as_str()).collect();
    assert_eq!(scopes, vec!["User:1", "User:2"]);

    features.purge("beta-program").await.unwrap();
    assert!(features.stored().await.unwrap().is_empty());
    assert!(features.inactive("beta-program", Some(&tester)).await.unwrap());
}

#[tokio::test]
async fn test_eager_loading_workflow() {
    let features = FeatureManager::default();
    features.define_value("dark-mode", true);
    features.define_value("layout", "compact");

    let users: Vec<User> = (1..=3).map(User::new).collect();
    let scopes: Vec<Option<&dyn FeatureScope>> = users
        .iter()
        .map(|user| Some(user as &dyn FeatureScope))
        .collect();

    let loaded = features.load_all(&scopes).await.unwrap();

    assert_eq!(loaded["layout"].len(), 3);
    assert!(loaded["dark-mode"].iter().all(is_truthy));
    assert!(
        features
            .all_are_active(&["dark-mode", "layout"], Some(&users[2]))
            .await
            .unwrap()
    );
}

// =============================================================================
// Configuration & Events Tests
// =============================================================================

#[tokio::test]
async fn test_configured_manager_workflow() {
    let config = FeaturesConfig::from_json_str(
        r#"{
            "default": "primary",
            "drivers": { "primary": { "driver": "array" } }
        }"#,
    )
    .unwrap();

    let bus = FeatureEventBus::new();
    let recorder = RecordingListener::new();
    bus.listen_all(recorder.clone());

    let features = FeatureManager::builder().config(config).events(bus).build();
    assert!(!features.ensure_schema(None).await.unwrap());

    features.define_value("audit-log", true);
    features.value("audit-log", None).await.unwrap();
    features.deactivate("audit-log", None).await.unwrap();
    features.purge_all().await.unwrap();

    let kinds: Vec<FeatureEventKind> = recorder.events().iter().map(FeatureEvent::kind).collect();
    assert_eq!(
        kinds,
        vec![
            FeatureEventKind::Resolved,
            FeatureEventKind::Updated,
            FeatureEventKind::Deleted,
        ]
    );
}

#[tokio::test]
async fn test_unconfigured_manager_errors() {
    let features = FeatureManager::builder().build();
    features.define_value("beta", true);

    let err = features.active("beta", None).await.unwrap_err();
    assert!(matches!(err, FeatureError::NotConfigured(_)));
}
