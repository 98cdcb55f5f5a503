//! In-memory map of live swarm sessions.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::content::ContentId;
use crate::swarm::SwarmSession;

/// Result of offering a session to the registry.
pub enum Registration {
    /// Stored; no session was registered for the identifier before.
    Inserted,
    /// Stored in place of an older session, which the caller must close.
    Replaced(Arc<dyn SwarmSession>),
    /// The registry is closed; the caller must close the returned session.
    Refused(Arc<dyn SwarmSession>),
}

#[derive(Default)]
struct RegistryState {
    sessions: HashMap<ContentId, Arc<dyn SwarmSession>>,
    closed: bool,
}

/// Identifier to live-session map guarded by a single reader-writer lock.
///
/// The lock is only held for map operations. Closing sessions is left to the
/// caller so no engine call runs while it is held.
#[derive(Default)]
pub struct SessionRegistry {
    state: RwLock<RegistryState>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live session for `id`.
    pub fn lookup(&self, id: &ContentId) -> Option<Arc<dyn SwarmSession>> {
        self.state.read().sessions.get(id).cloned()
    }

    /// Stores `session` under `id` unless the registry has been closed.
    pub fn register(&self, id: ContentId, session: Arc<dyn SwarmSession>) -> Registration {
        let mut state = self.state.write();
        if state.closed {
            return Registration::Refused(session);
        }
        match state.sessions.insert(id, session) {
            Some(previous) => Registration::Replaced(previous),
            None => Registration::Inserted,
        }
    }

    /// Removes and returns the session for `id`.
    pub fn remove(&self, id: &ContentId) -> Option<Arc<dyn SwarmSession>> {
        self.state.write().sessions.remove(id)
    }

    /// Removes `session` from under `id` only if it is still the one stored.
    pub fn remove_session(&self, id: &ContentId, session: &Arc<dyn SwarmSession>) -> bool {
        let mut state = self.state.write();
        let current = state
            .sessions
            .get(id)
            .is_some_and(|stored| Arc::ptr_eq(stored, session));
        if current {
            state.sessions.remove(id);
        }
        current
    }

    /// Refuses further registrations and drains every stored session.
    pub fn close(&self) -> Vec<Arc<dyn SwarmSession>> {
        let mut state = self.state.write();
        state.closed = true;
        state.sessions.drain().map(|(_, session)| session).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }

    pub fn len(&self) -> usize {
        self.state.read().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
