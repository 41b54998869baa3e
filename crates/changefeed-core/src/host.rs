//! Host framework configuration model: collections, hooks, endpoints.
//!
//! Only the parts the changefeed plugin reads or extends are modelled here.

use std::fmt;
use std::sync::Arc;

use crate::hooks::{AfterChangeHook, AfterDeleteHook};

/// Who may perform an operation through the host's public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessRule {
    /// Any caller, authenticated or not.
    #[default]
    Anyone,
    /// Only callers with an authenticated user.
    Authenticated,
    /// No API caller; internal code bypasses access rules.
    Nobody,
}

impl AccessRule {
    /// Returns whether a caller is allowed, given whether it is authenticated.
    #[must_use]
    pub fn allows(self, authenticated: bool) -> bool {
        match self {
            Self::Anyone => true,
            Self::Authenticated => authenticated,
            Self::Nobody => false,
        }
    }
}

/// Per-operation access rules of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccessRules {
    /// Rule for reads.
    pub read: AccessRule,
    /// Rule for creates.
    pub create: AccessRule,
    /// Rule for updates.
    pub update: AccessRule,
    /// Rule for deletes.
    pub delete: AccessRule,
}

/// Hooks registered on a collection, run in registration order.
#[derive(Clone, Default)]
pub struct CollectionHooks {
    /// Run after a create or update succeeded.
    pub after_change: Vec<Arc<dyn AfterChangeHook>>,
    /// Run after a delete succeeded.
    pub after_delete: Vec<Arc<dyn AfterDeleteHook>>,
}

impl fmt::Debug for CollectionHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionHooks")
            .field("after_change", &self.after_change.len())
            .field("after_delete", &self.after_delete.len())
            .finish()
    }
}

/// A collection registered with the host.
#[derive(Debug, Clone, Default)]
pub struct CollectionConfig {
    /// Unique collection slug.
    pub slug: String,
    /// Admin panel display options, opaque to the plugin.
    pub admin: serde_json::Map<String, serde_json::Value>,
    /// Public API access rules.
    pub access: AccessRules,
    /// Lifecycle hooks.
    pub hooks: CollectionHooks,
    /// Whether the host maintains `createdAt`/`updatedAt`.
    pub timestamps: bool,
}

impl CollectionConfig {
    /// Creates a collection with default access and no hooks.
    #[must_use]
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            timestamps: true,
            ..Self::default()
        }
    }
}

/// HTTP method of a custom endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `DELETE`
    Delete,
}

/// A custom endpoint mounted under the host's API prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Path relative to the API prefix, e.g. `/_events/stream`.
    pub path: String,
    /// HTTP method.
    pub method: HttpMethod,
}

/// The host configuration a plugin receives and returns.
#[derive(Debug, Clone, Default)]
pub struct HostConfig {
    /// Registered collections.
    pub collections: Vec<CollectionConfig>,
    /// Custom endpoints.
    pub endpoints: Vec<EndpointConfig>,
}

impl HostConfig {
    /// Looks up a collection by slug.
    #[must_use]
    pub fn collection(&self, slug: &str) -> Option<&CollectionConfig> {
        self.collections.iter().find(|c| c.slug == slug)
    }
}
