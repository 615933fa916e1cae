// Flagstaff - Feature flags for Rust services
//
// This library resolves named features per scope, persists the results
// through a pluggable store and caches them for the life of the manager.

// Re-export core functionality
pub use flagstaff_core::*;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        DriverConfig,
        FeatureError,
        // Events
        FeatureEvent,
        FeatureEventBus,
        FeatureEventKind,
        FeatureEventListener,
        FeatureManager,
        FeatureResolver,
        FeatureResult,
        FeatureScope,
        FeatureStore,
        FeaturesConfig,
        ScopeKey,
        ScopedFeatures,
        is_truthy,
    };
}
