//! Collection hook surface provided by the host framework.

use async_trait::async_trait;

use crate::store::WriteContext;

/// The kind of change reported to an after-change hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// The document was just created.
    Create,
    /// The document was updated.
    Update,
}

/// Mutable context bag shared by every hook of one host operation.
#[derive(Debug, Clone, Default)]
pub struct HookContext {
    /// Suppresses event recording for this operation.
    pub skip_events: bool,
    /// Free-form values other hooks may attach.
    pub values: serde_json::Map<String, serde_json::Value>,
}

impl From<WriteContext> for HookContext {
    fn from(context: WriteContext) -> Self {
        Self {
            skip_events: context.skip_events,
            values: serde_json::Map::new(),
        }
    }
}

/// Invoked by the host after a document was created or updated.
#[async_trait]
pub trait AfterChangeHook: Send + Sync {
    /// Returns the (possibly unchanged) document.
    async fn after_change(
        &self,
        document: serde_json::Value,
        kind: ChangeKind,
        context: &mut HookContext,
    ) -> serde_json::Value;
}

/// Invoked by the host after a document was deleted.
#[async_trait]
pub trait AfterDeleteHook: Send + Sync {
    /// Returns the (possibly unchanged) document.
    async fn after_delete(
        &self,
        document: serde_json::Value,
        context: &mut HookContext,
    ) -> serde_json::Value;
}
