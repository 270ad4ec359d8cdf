//! # Scope Resolution
//!
//! Works out which partition the current operation belongs to.
//!
//! ## Resolution Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      SessionScopeProvider                               │
//! │                                                                         │
//! │  session (user_id + token, both non-empty)?  ── no ──► None            │
//! │       │ yes                                                             │
//! │       ▼                                                                 │
//! │  tenant  = session.tenant_id  ?? terminal.tenant_id   ── none ──► None │
//! │  branch  = session.branch_id  ?? terminal.branch_id                    │
//! │  actor   = session.user_id                                             │
//! │  terminal= terminal.terminal_id                                        │
//! │                                                                         │
//! │  Resolved fresh on every call: a logout or tenant switch takes effect  │
//! │  on the very next operation.                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::{Arc, RwLock};

use tillsync_core::SyncScope;

// =============================================================================
// Collaborator Types
// =============================================================================

/// The authenticated user as the session store reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub token: String,
    pub tenant_id: Option<String>,
    pub branch_id: Option<String>,
}

impl Session {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Session {
            user_id: user_id.into(),
            token: token.into(),
            tenant_id: None,
            branch_id: None,
        }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_branch(mut self, branch_id: impl Into<String>) -> Self {
        self.branch_id = Some(branch_id.into());
        self
    }

    fn is_authenticated(&self) -> bool {
        !self.user_id.trim().is_empty() && !self.token.trim().is_empty()
    }
}

/// Identity of a terminal running in kiosk/terminal mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerminalContext {
    pub tenant_id: Option<String>,
    pub branch_id: Option<String>,
    pub terminal_id: Option<String>,
}

/// Supplies the current login session.
pub trait SessionSource: Send + Sync {
    fn current_session(&self) -> Option<Session>;

    /// Bearer token of the current session.
    fn access_token(&self) -> Option<String> {
        self.current_session()
            .map(|s| s.token)
            .filter(|t| !t.trim().is_empty())
    }
}

/// Supplies the active terminal-mode context, if the device is in one.
pub trait DeviceModeSource: Send + Sync {
    fn terminal_context(&self) -> Option<TerminalContext>;
}

impl DeviceModeSource for TerminalContext {
    fn terminal_context(&self) -> Option<TerminalContext> {
        Some(self.clone())
    }
}

/// A session slot the host updates on login/logout.
#[derive(Debug, Default)]
pub struct SessionSlot {
    session: RwLock<Option<Session>>,
}

impl SessionSlot {
    pub fn new(session: Option<Session>) -> Self {
        SessionSlot {
            session: RwLock::new(session),
        }
    }

    pub fn set(&self, session: Session) {
        if let Ok(mut guard) = self.session.write() {
            *guard = Some(session);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.session.write() {
            *guard = None;
        }
    }
}

impl SessionSource for SessionSlot {
    fn current_session(&self) -> Option<Session> {
        self.session.read().ok().and_then(|s| s.clone())
    }
}

// =============================================================================
// Scope Provider
// =============================================================================

/// Derives the partition for the current operation. `None` means
/// "unauthenticated": the engine treats every operation as a no-op.
pub trait ScopeProvider: Send + Sync {
    fn resolve_scope(&self) -> Option<SyncScope>;
}

/// Scope from the session store plus the device-mode store.
pub struct SessionScopeProvider {
    session: Arc<dyn SessionSource>,
    device: Option<Arc<dyn DeviceModeSource>>,
}

impl SessionScopeProvider {
    pub fn new(session: Arc<dyn SessionSource>) -> Self {
        SessionScopeProvider {
            session,
            device: None,
        }
    }

    pub fn with_device(mut self, device: Arc<dyn DeviceModeSource>) -> Self {
        self.device = Some(device);
        self
    }
}

impl ScopeProvider for SessionScopeProvider {
    fn resolve_scope(&self) -> Option<SyncScope> {
        let session = self.session.current_session()?;
        if !session.is_authenticated() {
            return None;
        }

        let terminal = self
            .device
            .as_ref()
            .and_then(|d| d.terminal_context())
            .unwrap_or_default();

        let tenant_id = non_empty(session.tenant_id).or_else(|| non_empty(terminal.tenant_id))?;
        let branch_id = non_empty(session.branch_id).or_else(|| non_empty(terminal.branch_id));

        Some(SyncScope {
            tenant_id,
            branch_id,
            actor_id: session.user_id,
            terminal_id: non_empty(terminal.terminal_id),
        })
    }
}

/// A fixed scope (or none). Used by headless agents and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticScopeProvider {
    scope: Option<SyncScope>,
}

impl StaticScopeProvider {
    pub fn new(scope: SyncScope) -> Self {
        StaticScopeProvider { scope: Some(scope) }
    }

    pub fn unauthenticated() -> Self {
        StaticScopeProvider { scope: None }
    }
}

impl ScopeProvider for StaticScopeProvider {
    fn resolve_scope(&self) -> Option<SyncScope> {
        self.scope.clone()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
