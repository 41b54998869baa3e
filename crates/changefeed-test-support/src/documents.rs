//! A stand-in for the host's document store that runs collection hooks.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use changefeed_core::hooks::{ChangeKind, HookContext};
use changefeed_core::host::{CollectionHooks, HostConfig};
use changefeed_core::store::WriteContext;

/// Stores documents per collection, assigns numeric ids starting at 1 and
/// runs the configured `after_change` / `after_delete` hooks the way the
/// host framework does.
#[derive(Debug)]
pub struct InMemoryDocumentStore {
    hooks: HashMap<String, CollectionHooks>,
    documents: Mutex<HashMap<String, BTreeMap<i64, serde_json::Value>>>,
    next_id: Mutex<i64>,
}

impl InMemoryDocumentStore {
    /// Build a store for every collection registered in `host`.
    #[must_use]
    pub fn new(host: &HostConfig) -> Self {
        Self {
            hooks: host
                .collections
                .iter()
                .map(|c| (c.slug.clone(), c.hooks.clone()))
                .collect(),
            documents: Mutex::new(HashMap::new()),
            next_id: Mutex::new(0),
        }
    }

    /// Create a document and run the collection's after-change hooks.
    ///
    /// Returns `None` if the collection is not registered.
    ///
    /// # Panics
    ///
    /// Panics if an internal mutex is poisoned.
    pub async fn create(
        &self,
        collection: &str,
        mut data: serde_json::Value,
        context: WriteContext,
    ) -> Option<serde_json::Value> {
        let hooks = self.hooks.get(collection)?;
        let id = {
            let mut next_id = self.next_id.lock().unwrap();
            *next_id += 1;
            *next_id
        };
        if let Some(object) = data.as_object_mut() {
            object.insert("id".into(), serde_json::json!(id));
        }
        self.documents
            .lock()
            .unwrap()
            .entry(collection.to_owned())
            .or_default()
            .insert(id, data.clone());

        Some(run_after_change(hooks, data, ChangeKind::Create, context).await)
    }

    /// Merge `patch` into an existing document and run the after-change hooks.
    ///
    /// Returns `None` if the collection or document does not exist.
    ///
    /// # Panics
    ///
    /// Panics if an internal mutex is poisoned.
    pub async fn update(
        &self,
        collection: &str,
        id: i64,
        patch: serde_json::Value,
        context: WriteContext,
    ) -> Option<serde_json::Value> {
        let hooks = self.hooks.get(collection)?;
        let updated = {
            let mut documents = self.documents.lock().unwrap();
            let document = documents.get_mut(collection)?.get_mut(&id)?;
            if let (Some(target), Some(source)) = (document.as_object_mut(), patch.as_object()) {
                for (key, value) in source {
                    target.insert(key.clone(), value.clone());
                }
            }
            document.clone()
        };

        Some(run_after_change(hooks, updated, ChangeKind::Update, context).await)
    }

    /// Delete a document and run the collection's after-delete hooks.
    ///
    /// Returns `None` if the collection or document does not exist.
    ///
    /// # Panics
    ///
    /// Panics if an internal mutex is poisoned.
    pub async fn delete(
        &self,
        collection: &str,
        id: i64,
        context: WriteContext,
    ) -> Option<serde_json::Value> {
        let hooks = self.hooks.get(collection)?;
        let removed = self
            .documents
            .lock()
            .unwrap()
            .get_mut(collection)?
            .remove(&id)?;

        let mut hook_context = HookContext::from(context);
        let mut document = removed;
        for hook in &hooks.after_delete {
            document = hook.after_delete(document, &mut hook_context).await;
        }
        Some(document)
    }
}

async fn run_after_change(
    hooks: &CollectionHooks,
    mut document: serde_json::Value,
    kind: ChangeKind,
    context: WriteContext,
) -> serde_json::Value {
    let mut hook_context = HookContext::from(context);
    for hook in &hooks.after_change {
        document = hook.after_change(document, kind, &mut hook_context).await;
    }
    document
}
