//! Scope serialization.
//!
//! Every feature value is resolved and stored against a scope key. A scope is
//! any entity with a stable identifier (a user, a team, an account); the
//! absence of a scope maps to the global sentinel.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Key used for values resolved without a scope.
pub const GLOBAL_SCOPE: &str = "__global__";

/// An entity that features can be resolved against.
///
/// # Examples
///
/// ```
/// use flagstaff_core::scope::{serialize, FeatureScope};
///
/// struct User {
///     id: u64,
/// }
///
/// impl FeatureScope for User {
///     fn scope_id(&self) -> String {
///         self.id.to_string()
///     }
/// }
///
/// assert_eq!(serialize(Some(&User { id: 7 })).as_str(), "User:7");
/// assert_eq!(serialize(None).as_str(), "__global__");
/// ```
pub trait FeatureScope: Send + Sync {
    /// Stable identifier of the entity.
    fn scope_id(&self) -> String;

    /// Type discriminator. Defaults to the short runtime type name.
    fn scope_type(&self) -> String {
        short_type_name::<Self>().to_string()
    }

    /// Canonical key for this scope.
    fn scope_key(&self) -> ScopeKey {
        ScopeKey(format!("{}:{}", self.scope_type(), self.scope_id()))
    }
}

/// Serialized scope, `"<Type>:<id>"` or the global sentinel.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeKey(String);

impl ScopeKey {
    /// Wrap an already serialized key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The global sentinel key.
    pub fn global() -> Self {
        Self(GLOBAL_SCOPE.to_string())
    }

    pub fn is_global(&self) -> bool {
        self.0 == GLOBAL_SCOPE
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identifier part of a `"<Type>:<id>"` key.
    pub fn id(&self) -> Option<&str> {
        self.0.split_once(':').map(|(_, id)| id)
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ScopeKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Already serialized keys pass through unchanged.
impl FeatureScope for ScopeKey {
    fn scope_id(&self) -> String {
        self.id().unwrap_or(&self.0).to_string()
    }

    fn scope_key(&self) -> ScopeKey {
        self.clone()
    }
}

/// Serialize an optional scope into its canonical key.
pub fn serialize(scope: Option<&dyn FeatureScope>) -> ScopeKey {
    match scope {
        Some(scope) => scope.scope_key(),
        None => ScopeKey::global(),
    }
}

/// Type name without module path or generic arguments.
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct User {
        id: u64,
    }

    impl FeatureScope for User {
        fn scope_id(&self) -> String {
            self.id.to_string()
        }
    }

    struct Team(&'static str);

    impl FeatureScope for Team {
        fn scope_id(&self) -> String {
            self.0.to_string()
        }

        fn scope_type(&self) -> String {
            "Organization".to_string()
        }
    }

    #[allow(dead_code)]
    struct Wrapper<T>(T);

    #[test]
    fn test_global_scope() {
        let key = serialize(None);
        assert_eq!(key.as_str(), GLOBAL_SCOPE);
        assert!(key.is_global());
        assert_eq!(key, ScopeKey::global());
    }

    #[test]
    fn test_type_name_discriminator() {
        let key = serialize(Some(&User { id: 42 }));
        assert_eq!(key.as_str(), "User:42");
        assert_eq!(key.id(), Some("42"));
        assert!(!key.is_global());
    }

    #[test]
    fn test_type_override() {
        let key = serialize(Some(&Team("acme")));
        assert_eq!(key.to_string(), "Organization:acme");
    }

    #[test]
    fn test_distinct_types_distinct_keys() {
        let user = serialize(Some(&User { id: 1 }));
        let key = serialize(Some(&ScopeKey::new("Team:1")));
        assert_ne!(user, key);
    }

    #[test]
    fn test_scope_key_passes_through() {
        let key = ScopeKey::new("User:9");
        assert_eq!(serialize(Some(&key)), key);
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name::<User>(), "User");
        assert_eq!(short_type_name::<Wrapper<String>>(), "Wrapper");
        assert_eq!(short_type_name::<u32>(), "u32");
    }
}
