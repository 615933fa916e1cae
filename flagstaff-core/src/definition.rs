//! Feature definitions and the registry that holds them.
//!
//! A feature is defined either by a closure taking the serialized scope key,
//! or by a type implementing [`FeatureResolver`]. Closures and resolver types
//! live in separate maps; when the same name is present in both, the closure
//! wins.

use crate::error::{FeatureError, FeatureResult};
use crate::scope::{short_type_name, ScopeKey};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Type-erased closure resolver.
pub type ResolverFn = Arc<dyn Fn(ScopeKey) -> BoxFuture<'static, FeatureResult<Value>> + Send + Sync>;

/// A resolver type for features that need state or dependencies.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use flagstaff_core::definition::FeatureResolver;
/// use flagstaff_core::{FeatureResult, ScopeKey};
/// use serde_json::{json, Value};
///
/// struct NewCheckoutExperience;
///
/// #[async_trait]
/// impl FeatureResolver for NewCheckoutExperience {
///     async fn resolve(&self, scope: &ScopeKey) -> FeatureResult<Value> {
///         Ok(json!(!scope.is_global()))
///     }
/// }
/// ```
#[async_trait]
pub trait FeatureResolver: Send + Sync + 'static {
    /// Explicit registration key. When `None`, the kebab-cased type name is used.
    fn feature_name() -> Option<&'static str>
    where
        Self: Sized,
    {
        None
    }

    /// Compute the feature value for a serialized scope.
    async fn resolve(&self, scope: &ScopeKey) -> FeatureResult<Value>;
}

/// A registered definition, dispatched through [`Definition::resolve`].
#[derive(Clone)]
pub enum Definition {
    Closure(ResolverFn),
    Resolver(Arc<dyn FeatureResolver>),
}

impl Definition {
    /// Invoke the definition for `scope`.
    pub async fn resolve(&self, scope: &ScopeKey) -> FeatureResult<Value> {
        match self {
            Definition::Closure(resolver) => resolver(scope.clone()).await,
            Definition::Resolver(resolver) => resolver.resolve(scope).await,
        }
    }
}

impl std::fmt::Debug for Definition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Definition::Closure(_) => f.write_str("Definition::Closure"),
            Definition::Resolver(_) => f.write_str("Definition::Resolver"),
        }
    }
}

/// Registry of feature definitions keyed by name.
#[derive(Default)]
pub struct DefinitionRegistry {
    closures: DashMap<String, ResolverFn>,
    resolvers: DashMap<String, Arc<dyn FeatureResolver>>,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a feature with a synchronous closure.
    pub fn define<F, V>(&self, name: impl Into<String>, resolver: F)
    where
        F: Fn(&ScopeKey) -> V + Send + Sync + 'static,
        V: Into<Value>,
    {
        let resolver: ResolverFn = Arc::new(move |scope: ScopeKey| {
            let value = resolver(&scope).into();
            futures::future::ready(Ok::<_, FeatureError>(value)).boxed()
        });
        self.insert_closure(name.into(), resolver);
    }

    /// Define a feature with an asynchronous, fallible closure.
    pub fn define_async<F, Fut>(&self, name: impl Into<String>, resolver: F)
    where
        F: Fn(ScopeKey) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FeatureResult<Value>> + Send + 'static,
    {
        let resolver: ResolverFn = Arc::new(move |scope: ScopeKey| resolver(scope).boxed());
        self.insert_closure(name.into(), resolver);
    }

    /// Define a feature that always resolves to `value`.
    pub fn define_value(&self, name: impl Into<String>, value: impl Into<Value>) {
        let value = value.into();
        self.define(name, move |_| value.clone());
    }

    /// Register a resolver type and return the key it was stored under.
    pub fn define_resolver<R: FeatureResolver>(&self, name: Option<&str>, resolver: R) -> String {
        let name = name
            .map(str::to_string)
            .or_else(|| R::feature_name().map(str::to_string))
            .unwrap_or_else(|| kebab_case(short_type_name::<R>()));

        if self.closures.contains_key(&name) {
            debug!(feature = %name, "closure definition shadows resolver type");
        }
        debug!(feature = %name, resolver = short_type_name::<R>(), "defined feature resolver");
        self.resolvers.insert(name.clone(), Arc::new(resolver));
        name
    }

    fn insert_closure(&self, name: String, resolver: ResolverFn) {
        if self.resolvers.contains_key(&name) {
            debug!(feature = %name, "closure definition shadows resolver type");
        }
        debug!(feature = %name, "defined feature");
        self.closures.insert(name, resolver);
    }

    /// Find the definition for `name`, closures first.
    pub fn lookup(&self, name: &str) -> Option<Definition> {
        if let Some(resolver) = self.closures.get(name) {
            return Some(Definition::Closure(resolver.value().clone()));
        }
        self.resolvers
            .get(name)
            .map(|resolver| Definition::Resolver(resolver.value().clone()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.closures.contains_key(name) || self.resolvers.contains_key(name)
    }

    /// Names from both registries.
    pub fn defined(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .closures
            .iter()
            .map(|entry| entry.key().clone())
            .chain(self.resolvers.iter().map(|entry| entry.key().clone()))
            .collect();
        names.sort();
        names
    }

    pub fn clear(&self) {
        self.closures.clear();
        self.resolvers.clear();
    }
}

/// Kebab-case a type or feature name.
///
/// `NewCheckoutExperience` becomes `new-checkout-experience`. Whitespace,
/// underscore and hyphen runs collapse into a single hyphen.
pub fn kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut pending = false;

    for c in name.chars() {
        if c.is_whitespace() || c == '_' || c == '-' {
            pending = !out.is_empty();
            continue;
        }
        if (pending || c.is_uppercase()) && !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
        pending = false;
        out.extend(c.to_lowercase());
    }

    out
}
