//! Definition of the event records collection.

use changefeed_core::host::{AccessRule, AccessRules, CollectionConfig};
use changefeed_core::record::EVENTS_COLLECTION;
use serde_json::{Map, Value, json};

/// Access rules of the events collection: authenticated users may read and
/// delete; records are only ever created by the plugin and never updated.
pub const EVENTS_ACCESS: AccessRules = AccessRules {
    read: AccessRule::Authenticated,
    create: AccessRule::Nobody,
    update: AccessRule::Nobody,
    delete: AccessRule::Authenticated,
};

fn default_admin() -> Map<String, Value> {
    let mut admin = Map::new();
    admin.insert("group".into(), json!("System"));
    admin.insert("hidden".into(), json!(true));
    admin.insert("defaultColumns".into(), json!(["name", "createdAt"]));
    admin
}

/// Builds the events collection, applying `admin_overrides` on top of the
/// default admin options.
#[must_use]
pub fn events_collection(admin_overrides: &Map<String, Value>) -> CollectionConfig {
    let mut admin = default_admin();
    for (key, value) in admin_overrides {
        admin.insert(key.clone(), value.clone());
    }

    CollectionConfig {
        slug: EVENTS_COLLECTION.to_owned(),
        admin,
        access: EVENTS_ACCESS,
        timestamps: true,
        ..CollectionConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_collection_uses_default_admin_options() {
        let collection = events_collection(&Map::new());

        assert_eq!(collection.slug, "payload-events");
        assert_eq!(collection.admin["group"], json!("System"));
        assert_eq!(collection.admin["hidden"], json!(true));
        assert!(collection.timestamps);
        assert!(collection.hooks.after_change.is_empty());
    }

    #[test]
    fn test_events_collection_merges_admin_overrides() {
        let mut overrides = Map::new();
        overrides.insert("hidden".into(), json!(false));

        let collection = events_collection(&overrides);

        assert_eq!(collection.admin["hidden"], json!(false));
        assert_eq!(collection.admin["group"], json!("System"));
    }

    #[test]
    fn test_events_access_denies_api_writes() {
        assert!(EVENTS_ACCESS.read.allows(true));
        assert!(!EVENTS_ACCESS.read.allows(false));
        assert!(!EVENTS_ACCESS.create.allows(true));
        assert!(!EVENTS_ACCESS.update.allows(true));
        assert!(EVENTS_ACCESS.delete.allows(true));
        assert!(!EVENTS_ACCESS.delete.allows(false));
    }
}
