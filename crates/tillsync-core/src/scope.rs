//! # Sync Scope
//!
//! The partition under which one offline queue and one conflict list live.
//!
//! ## Key Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  scope_id = <tenant>:<branch | "no-branch">:<actor>:<terminal | ...>   │
//! │                                                                         │
//! │  offline-sales-queue:acme:no-branch:u-42:till-3      → [QueuedSale]    │
//! │  offline-sales-conflicts:acme:no-branch:u-42:till-3  → [ConflictedSale]│
//! │                                                                         │
//! │  Two cashiers on the same terminal, or one cashier on two tenants,     │
//! │  never share a record. `%` and `:` inside an id are percent-escaped    │
//! │  so the separator stays unambiguous.                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Placeholder used in keys when no branch is known.
pub const NO_BRANCH: &str = "no-branch";

/// Placeholder used in keys when no terminal is known.
pub const NO_TERMINAL: &str = "no-terminal";

/// Key prefix of the per-scope queue record.
pub const QUEUE_KEY_PREFIX: &str = "offline-sales-queue";

/// Key prefix of the per-scope conflict record.
pub const CONFLICTS_KEY_PREFIX: &str = "offline-sales-conflicts";

/// Identity of one isolated queue/conflict partition.
///
/// Derived fresh on every operation from the session and device context;
/// never persisted on its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SyncScope {
    pub tenant_id: String,
    pub branch_id: Option<String>,
    pub actor_id: String,
    pub terminal_id: Option<String>,
}

impl SyncScope {
    /// Creates a scope without branch or terminal.
    pub fn new(tenant_id: impl Into<String>, actor_id: impl Into<String>) -> Self {
        SyncScope {
            tenant_id: tenant_id.into(),
            branch_id: None,
            actor_id: actor_id.into(),
            terminal_id: None,
        }
    }

    /// Sets the branch.
    pub fn with_branch(mut self, branch_id: impl Into<String>) -> Self {
        self.branch_id = Some(branch_id.into());
        self
    }

    /// Sets the terminal.
    pub fn with_terminal(mut self, terminal_id: impl Into<String>) -> Self {
        self.terminal_id = Some(terminal_id.into());
        self
    }

    /// Deterministic partition id built from all four fields.
    ///
    /// Empty optional fields are treated as absent so that `Some("")` and
    /// `None` map to the same record.
    pub fn scope_id(&self) -> String {
        let branch = non_empty(self.branch_id.as_deref()).unwrap_or(NO_BRANCH);
        let terminal = non_empty(self.terminal_id.as_deref()).unwrap_or(NO_TERMINAL);
        format!(
            "{}:{}:{}:{}",
            escape(&self.tenant_id),
            escape(branch),
            escape(&self.actor_id),
            escape(terminal)
        )
    }

    /// Storage key of this scope's queue.
    pub fn queue_key(&self) -> String {
        format!("{}:{}", QUEUE_KEY_PREFIX, self.scope_id())
    }

    /// Storage key of this scope's conflict list.
    pub fn conflicts_key(&self) -> String {
        format!("{}:{}", CONFLICTS_KEY_PREFIX, self.scope_id())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// `%` first, so an escaped `:` can never be produced by the input itself.
fn escape(component: &str) -> String {
    component.replace('%', "%25").replace(':', "%3A")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_id_uses_placeholders() {
        let scope = SyncScope::new("t1", "u1");
        assert_eq!(scope.scope_id(), "t1:no-branch:u1:no-terminal");

        let scope = scope.with_branch("b9").with_terminal("till-2");
        assert_eq!(scope.scope_id(), "t1:b9:u1:till-2");
    }

    #[test]
    fn test_empty_optional_fields_are_absent() {
        let blank = SyncScope::new("t1", "u1").with_branch("  ").with_terminal("");
        assert_eq!(blank.scope_id(), SyncScope::new("t1", "u1").scope_id());
    }

    #[test]
    fn test_keys_differ_per_actor_and_kind() {
        let a = SyncScope::new("t1", "alice");
        let b = SyncScope::new("t1", "bob");
        assert_ne!(a.queue_key(), b.queue_key());
        assert_ne!(a.queue_key(), a.conflicts_key());
        assert_eq!(a.queue_key(), "offline-sales-queue:t1:no-branch:alice:no-terminal");
        assert_eq!(
            a.conflicts_key(),
            "offline-sales-conflicts:t1:no-branch:alice:no-terminal"
        );
    }

    #[test]
    fn test_separator_inside_ids_cannot_collide() {
        // "a:b" as tenant vs tenant "a" on branch "b"
        let joined = SyncScope::new("a:b", "c").with_branch("d");
        let split = SyncScope::new("a", "c").with_branch("b:d");
        assert_ne!(joined.scope_id(), split.scope_id());
        assert_eq!(joined.scope_id(), "a%3Ab:d:c:no-terminal");

        // A literal "%3A" stays distinct from an escaped ':'
        let literal = SyncScope::new("a%3Ab", "c").with_branch("d");
        assert_ne!(literal.scope_id(), joined.scope_id());
        assert_eq!(literal.scope_id(), "a%253Ab:d:c:no-terminal");
    }
}
