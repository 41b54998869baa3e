//! Plugin configuration.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::record::{EVENTS_COLLECTION, JOBS_COLLECTION};

/// Default event retention window (1 hour).
pub const DEFAULT_RETENTION_MS: u64 = 60 * 60 * 1000;

/// Default change-stream poll interval (1 second).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Default retention sweep interval (5 minutes).
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 5 * 60 * 1000;

/// Which host collections get change hooks.
///
/// Serialized as the literal `"all"` or as a list of slugs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CollectionSelection {
    /// Every collection registered with the host.
    #[default]
    All,
    /// Only the listed collection slugs.
    Only(Vec<String>),
}

impl Serialize for CollectionSelection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::All => serializer.serialize_str("all"),
            Self::Only(slugs) => slugs.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for CollectionSelection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Literal(String),
            Slugs(Vec<String>),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Literal(s) if s == "all" => Ok(Self::All),
            Raw::Literal(s) => Err(de::Error::custom(format!(
                "expected \"all\" or a list of collection slugs, got {s:?}"
            ))),
            Raw::Slugs(slugs) => Ok(Self::Only(slugs)),
        }
    }
}

/// Plugin options as supplied by the host, every field optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PluginOptions {
    /// Collections to broadcast events for.
    pub collections: Option<CollectionSelection>,
    /// Event retention period in milliseconds.
    pub retention_ms: Option<u64>,
    /// Change-stream polling interval in milliseconds.
    pub poll_interval_ms: Option<u64>,
    /// Retention sweep interval in milliseconds.
    pub sweep_interval_ms: Option<u64>,
    /// Disables hooks and the sweeper; the events collection stays registered.
    pub disabled: Option<bool>,
    /// Admin display overrides for the events collection.
    pub admin: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Plugin configuration with every default applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginConfig {
    /// Collections to broadcast events for.
    pub collections: CollectionSelection,
    /// Event retention period in milliseconds.
    pub retention_ms: u64,
    /// Change-stream polling interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Retention sweep interval in milliseconds.
    pub sweep_interval_ms: u64,
    /// Whether the plugin is disabled.
    pub disabled: bool,
    /// Admin display overrides for the events collection.
    pub admin: serde_json::Map<String, serde_json::Value>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            collections: CollectionSelection::All,
            retention_ms: DEFAULT_RETENTION_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            disabled: false,
            admin: serde_json::Map::new(),
        }
    }
}

impl From<PluginOptions> for PluginConfig {
    fn from(options: PluginOptions) -> Self {
        let defaults = Self::default();
        Self {
            collections: options.collections.unwrap_or(defaults.collections),
            retention_ms: options.retention_ms.unwrap_or(defaults.retention_ms),
            poll_interval_ms: options
                .poll_interval_ms
                .unwrap_or(defaults.poll_interval_ms),
            sweep_interval_ms: options
                .sweep_interval_ms
                .unwrap_or(defaults.sweep_interval_ms),
            disabled: options.disabled.unwrap_or(defaults.disabled),
            admin: options.admin.unwrap_or(defaults.admin),
        }
    }
}

impl PluginConfig {
    /// Retention window as a `Duration`.
    #[must_use]
    pub fn retention(&self) -> Duration {
        Duration::from_millis(self.retention_ms)
    }

    /// Poll interval as a `Duration`. Zero is clamped to one millisecond.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Sweep interval as a `Duration`. Zero is clamped to one millisecond.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }

    /// Resolves the collection slugs that receive change hooks, given every
    /// slug registered with the host. The jobs collection is always included
    /// and the events collection never is.
    #[must_use]
    pub fn target_collections(&self, registered: &[&str]) -> Vec<String> {
        let mut targets: Vec<String> = match &self.collections {
            CollectionSelection::All => registered.iter().map(|s| (*s).to_owned()).collect(),
            CollectionSelection::Only(slugs) => slugs.clone(),
        };
        targets.push(JOBS_COLLECTION.to_owned());
        targets.retain(|slug| slug != EVENTS_COLLECTION);
        targets.sort();
        targets.dedup();
        targets
    }
}
