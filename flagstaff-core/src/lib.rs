//! Feature flag resolution for Flagstaff
//!
//! Features are defined once, resolved lazily per scope, persisted through a
//! pluggable store and cached for the life of the manager.
//!
//! # Features
//!
//! - **Definitions** - Closures, constant values or resolver types
//! - **Scopes** - Any type implementing [`FeatureScope`], or global
//! - **Stores** - Named drivers with an in-memory default and custom factories
//! - **Caching** - Each feature and scope pair resolves at most once
//! - **Eager Loading** - Batched store reads and writes per scope
//! - **Events** - Resolved, updated and deleted notifications
//!
//! # Quick Start
//!
//! ```
//! use flagstaff_core::*;
//!
//! struct User {
//!     id: u64,
//! }
//!
//! impl FeatureScope for User {
//!     fn scope_id(&self) -> String {
//!         self.id.to_string()
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let features = FeatureManager::new(FeaturesConfig::default());
//! features.define("new-dashboard", |scope: &ScopeKey| !scope.is_global());
//!
//! let user = User { id: 7 };
//! if features.active("new-dashboard", Some(&user)).await.unwrap() {
//!     // Show new dashboard
//! }
//! # });
//! ```
//!
//! # Resolver Types
//!
//! ```
//! use flagstaff_core::*;
//! use serde_json::{json, Value};
//!
//! struct CheckoutTheme;
//!
//! #[async_trait::async_trait]
//! impl FeatureResolver for CheckoutTheme {
//!     async fn resolve(&self, _scope: &ScopeKey) -> FeatureResult<Value> {
//!         Ok(json!("dark"))
//!     }
//! }
//!
//! let features = FeatureManager::default();
//! let name = features.define_resolver(None, CheckoutTheme);
//! assert_eq!(name, "checkout-theme");
//! ```
//!
//! # Eager Loading
//!
//! ```
//! use flagstaff_core::*;
//!
//! # tokio_test::block_on(async {
//! let features = FeatureManager::default();
//! features.define_value("a", true);
//! features.define_value("b", "blue");
//!
//! // One batched read and one batched write for the global scope.
//! let loaded = features.load(&["a", "b"], &[None]).await.unwrap();
//! assert_eq!(loaded["b"][0], "blue");
//! # });
//! ```

pub mod array;
pub mod cache;
pub mod config;
pub mod definition;
pub mod driver;
pub mod error;
pub mod events;
#[cfg(feature = "tracing-subscriber")]
pub mod logging;
pub mod manager;
pub mod scope;
pub mod scoped;
pub mod store;

pub use array::{ArrayStore, ARRAY_DRIVER};
pub use cache::ResolutionCache;
pub use config::{DriverConfig, FeaturesConfig, FileFormat};
pub use definition::{DefinitionRegistry, FeatureResolver};
pub use driver::{DriverFactory, DriverRegistry};
pub use error::{FeatureError, FeatureResult};
pub use events::{
    EventHandlerError, FeatureEvent, FeatureEventBus, FeatureEventKind, FeatureEventListener,
    RecordingListener,
};
pub use manager::{is_truthy, FeatureManager, FeatureManagerBuilder};
pub use scope::{FeatureScope, ScopeKey, GLOBAL_SCOPE};
pub use scoped::ScopedFeatures;
pub use store::{FeatureStore, StoreEntry, StoredFeature};

/// Prelude for common imports.
///
/// ```
/// use flagstaff_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{DriverConfig, FeaturesConfig};
    pub use crate::definition::FeatureResolver;
    pub use crate::error::{FeatureError, FeatureResult};
    pub use crate::events::{FeatureEvent, FeatureEventKind, FeatureEventListener};
    pub use crate::manager::FeatureManager;
    pub use crate::scope::{FeatureScope, ScopeKey};
    pub use crate::scoped::ScopedFeatures;
    pub use crate::store::FeatureStore;
}
