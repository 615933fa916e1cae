//! Feature event notifications.
//!
//! The manager emits an event after every successful resolution, explicit
//! update and deletion. Listeners subscribe to one kind or to all of them.
//! Listener failures are logged and never fail the operation that emitted
//! the event.

use crate::scope::ScopeKey;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Marker rendered for wildcard features and scopes.
pub const WILDCARD: &str = "*";

/// Kind of feature event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureEventKind {
    Resolved,
    Updated,
    Deleted,
}

impl FeatureEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureEventKind::Resolved => "resolved",
            FeatureEventKind::Updated => "updated",
            FeatureEventKind::Deleted => "deleted",
        }
    }
}

/// A feature notification with a flat payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum FeatureEvent {
    /// First successful resolution of a feature for a scope
    Resolved {
        feature: String,
        scope: ScopeKey,
        value: Value,
        occurred_at: DateTime<Utc>,
    },

    /// Explicit activation or deactivation
    Updated {
        feature: String,
        scope: ScopeKey,
        value: Value,
        occurred_at: DateTime<Utc>,
    },

    /// Forget, purge or purge-all. `None` means every feature or every scope.
    Deleted {
        feature: Option<String>,
        scope: Option<ScopeKey>,
        occurred_at: DateTime<Utc>,
    },
}

impl FeatureEvent {
    pub fn resolved(feature: impl Into<String>, scope: ScopeKey, value: Value) -> Self {
        Self::Resolved {
            feature: feature.into(),
            scope,
            value,
            occurred_at: Utc::now(),
        }
    }

    pub fn updated(feature: impl Into<String>, scope: ScopeKey, value: Value) -> Self {
        Self::Updated {
            feature: feature.into(),
            scope,
            value,
            occurred_at: Utc::now(),
        }
    }

    pub fn deleted(feature: Option<String>, scope: Option<ScopeKey>) -> Self {
        Self::Deleted {
            feature,
            scope,
            occurred_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> FeatureEventKind {
        match self {
            FeatureEvent::Resolved { .. } => FeatureEventKind::Resolved,
            FeatureEvent::Updated { .. } => FeatureEventKind::Updated,
            FeatureEvent::Deleted { .. } => FeatureEventKind::Deleted,
        }
    }

    /// Feature name, or [`WILDCARD`].
    pub fn feature(&self) -> &str {
        match self {
            FeatureEvent::Resolved { feature, .. } | FeatureEvent::Updated { feature, .. } => {
                feature
            }
            FeatureEvent::Deleted { feature, .. } => feature.as_deref().unwrap_or(WILDCARD),
        }
    }

    /// Scope key, or [`WILDCARD`].
    pub fn scope(&self) -> &str {
        match self {
            FeatureEvent::Resolved { scope, .. } | FeatureEvent::Updated { scope, .. } => {
                scope.as_str()
            }
            FeatureEvent::Deleted { scope, .. } => {
                scope.as_ref().map(ScopeKey::as_str).unwrap_or(WILDCARD)
            }
        }
    }

    /// Value carried by resolved and updated events.
    pub fn value(&self) -> Option<&Value> {
        match self {
            FeatureEvent::Resolved { value, .. } | FeatureEvent::Updated { value, .. } => {
                Some(value)
            }
            FeatureEvent::Deleted { .. } => None,
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            FeatureEvent::Resolved { occurred_at, .. }
            | FeatureEvent::Updated { occurred_at, .. }
            | FeatureEvent::Deleted { occurred_at, .. } => *occurred_at,
        }
    }
}

/// Event handler error
#[derive(Debug, thiserror::Error)]
pub enum EventHandlerError {
    #[error("Handler failed: {0}")]
    HandlerFailed(String),

    #[error("Event processing error: {0}")]
    ProcessingError(String),
}

/// Receives feature events.
#[async_trait]
pub trait FeatureEventListener: Send + Sync {
    async fn handle(&self, event: &FeatureEvent) -> Result<(), EventHandlerError>;
}

/// Dispatches feature events to registered listeners.
#[derive(Clone, Default)]
pub struct FeatureEventBus {
    listeners: Arc<DashMap<FeatureEventKind, Vec<Arc<dyn FeatureEventListener>>>>,
}

impl FeatureEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a listener to one event kind.
    pub fn listen<L>(&self, kind: FeatureEventKind, listener: L)
    where
        L: FeatureEventListener + 'static,
    {
        self.listen_arc(kind, Arc::new(listener));
    }

    /// Subscribe one listener to every event kind.
    pub fn listen_all<L>(&self, listener: L)
    where
        L: FeatureEventListener + 'static,
    {
        let listener: Arc<dyn FeatureEventListener> = Arc::new(listener);
        for kind in [
            FeatureEventKind::Resolved,
            FeatureEventKind::Updated,
            FeatureEventKind::Deleted,
        ] {
            self.listen_arc(kind, listener.clone());
        }
    }

    fn listen_arc(&self, kind: FeatureEventKind, listener: Arc<dyn FeatureEventListener>) {
        self.listeners.entry(kind).or_default().push(listener);
        debug!("Subscribed listener for feature event: {}", kind.as_str());
    }

    /// Deliver an event to its listeners, in subscription order.
    pub async fn emit(&self, event: FeatureEvent) {
        let listeners = match self.listeners.get(&event.kind()) {
            Some(listeners) => listeners.clone(),
            None => return,
        };

        for listener in listeners {
            if let Err(e) = listener.handle(&event).await {
                warn!(
                    "Feature event listener failed for {} [{}] at [{}]: {}",
                    event.kind().as_str(),
                    event.feature(),
                    event.scope(),
                    e
                );
            }
        }
    }

    pub fn listener_count(&self, kind: FeatureEventKind) -> usize {
        self.listeners.get(&kind).map(|l| l.len()).unwrap_or(0)
    }

    /// Remove every listener.
    pub fn clear(&self) {
        self.listeners.clear();
    }
}

/// Listener that records every event it receives, useful in tests.
#[derive(Clone, Default)]
pub struct RecordingListener {
    events: Arc<std::sync::Mutex<Vec<FeatureEvent>>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far.
    pub fn events(&self) -> Vec<FeatureEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Events of one kind received so far.
    pub fn of_kind(&self, kind: FeatureEventKind) -> Vec<FeatureEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.kind() == kind)
            .collect()
    }
}

#[async_trait]
impl FeatureEventListener for RecordingListener {
    async fn handle(&self, event: &FeatureEvent) -> Result<(), EventHandlerError> {
        self.events
            .lock()
            .map_err(|e| EventHandlerError::ProcessingError(e.to_string()))?
            .push(event.clone());
        Ok(())
    }
}
