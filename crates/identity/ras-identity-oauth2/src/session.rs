//! Per-user session isolation.

use crate::engine::SessionState;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Maps a user/session id to its token state.
///
/// Each entry has its own lock: operations on one id run one at a time, while
/// different ids never wait on each other.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, Arc<Mutex<SessionState>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The state for `user_id`, created on first use.
    pub fn resolve(&self, user_id: &str) -> Arc<Mutex<SessionState>> {
        if let Some(existing) = self.sessions.get(user_id) {
            return existing.clone();
        }

        self.sessions
            .entry(user_id.to_string())
            .or_insert_with(|| {
                debug!("Created session state");
                Arc::new(Mutex::new(SessionState::new()))
            })
            .clone()
    }

    /// The state for `user_id`, if a session exists. Never creates one.
    pub fn get(&self, user_id: &str) -> Option<Arc<Mutex<SessionState>>> {
        self.sessions.get(user_id).map(|entry| entry.clone())
    }

    /// Whether `state` is still the entry for `user_id`. An entry removed
    /// while a caller waited on its lock must not receive further writes.
    pub fn is_current(&self, user_id: &str, state: &Arc<Mutex<SessionState>>) -> bool {
        self.sessions
            .get(user_id)
            .is_some_and(|entry| Arc::ptr_eq(entry.value(), state))
    }

    /// Remove `state` if it is still the entry for `user_id`.
    pub(crate) fn remove_if_current(&self, user_id: &str, state: &Arc<Mutex<SessionState>>) {
        self.sessions
            .remove_if(user_id, |_, entry| Arc::ptr_eq(entry, state));
    }

    /// Remove the state for `user_id`. Returns whether there was any.
    pub fn clear(&self, user_id: &str) -> bool {
        self.sessions.remove(user_id).is_some()
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.sessions.contains_key(user_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
