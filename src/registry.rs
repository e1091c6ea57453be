//! Tagged binding registry.
//!
//! Each application owns a `Registry` of capability records. Bindings carry a
//! set of tags so that extensions (health checks in particular) can be
//! discovered by category instead of by key. The health sub-application uses
//! [`Registry::find`] against the main application's registry to copy the
//! live and ready checks across.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::health::HealthCheck;

/// Tag for liveness check extensions
pub const LIVE_CHECK: &str = "live-check";

/// Tag for readiness check extensions
pub const READY_CHECK: &str = "ready-check";

/// Value held by a binding
#[derive(Clone)]
pub enum BindingValue {
    /// A mounted component, identified by name
    Component(&'static str),
    /// A health check extension
    HealthCheck(Arc<dyn HealthCheck>),
    /// A plain configuration value
    Constant(serde_json::Value),
}

impl fmt::Debug for BindingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingValue::Component(name) => f.debug_tuple("Component").field(name).finish(),
            BindingValue::HealthCheck(check) => {
                f.debug_tuple("HealthCheck").field(&check.name()).finish()
            }
            BindingValue::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
        }
    }
}

/// A named, tagged registration.
#[derive(Debug, Clone)]
pub struct Binding {
    key: String,
    tags: BTreeSet<String>,
    value: BindingValue,
}

impl Binding {
    pub fn new(key: impl Into<String>, value: BindingValue) -> Self {
        Self {
            key: key.into(),
            tags: BTreeSet::new(),
            value,
        }
    }

    /// Add a tag, builder style.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn value(&self) -> &BindingValue {
        &self.value
    }

    /// The health check held by this binding, if any
    pub fn as_health_check(&self) -> Option<&Arc<dyn HealthCheck>> {
        match &self.value {
            BindingValue::HealthCheck(check) => Some(check),
            _ => None,
        }
    }

    /// Whether this binding is tagged as a live or ready check
    pub fn is_health_extension(&self) -> bool {
        self.has_tag(LIVE_CHECK) || self.has_tag(READY_CHECK)
    }
}

/// Insertion-ordered collection of bindings, unique by key.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    bindings: Vec<Binding>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding, replacing any existing binding with the same key in place.
    pub fn add(&mut self, binding: Binding) {
        match self.bindings.iter_mut().find(|b| b.key == binding.key) {
            Some(existing) => {
                tracing::debug!(key = %binding.key, "Replacing binding");
                *existing = binding;
            }
            None => {
                tracing::debug!(key = %binding.key, tags = ?binding.tags, "Adding binding");
                self.bindings.push(binding);
            }
        }
    }

    /// All bindings matching `predicate`, in insertion order.
    pub fn find<F>(&self, predicate: F) -> Vec<Binding>
    where
        F: Fn(&Binding) -> bool,
    {
        self.bindings
            .iter()
            .filter(|b| predicate(b))
            .cloned()
            .collect()
    }

    pub fn find_by_tag(&self, tag: &str) -> Vec<Binding> {
        self.find(|b| b.has_tag(tag))
    }

    pub fn get(&self, key: &str) -> Option<&Binding> {
        self.bindings.iter().find(|b| b.key == key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|b| b.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
