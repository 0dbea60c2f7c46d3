/*!
Session-backed checkpoint storage for request mode.

The host owns a keyed session context that outlives a single request. The
relay receives it as a collaborator instead of reaching for process-global
state.
*/

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::{debug, info};

use super::StateBackend;
use crate::metadata::{Checkpoint, CheckpointDocument};
use crate::{BatonError, Result};

/// Keyed session storage provided by the host
pub trait SessionContext {
    /// Whether the session has been started for the current request
    fn is_active(&self) -> bool;

    /// Start the session
    fn start(&mut self) -> Result<()>;

    /// Read the value stored under `key`
    fn get(&self, key: &str) -> Option<Value>;

    /// Store `value` under `key`
    fn set(&mut self, key: &str, value: Value);

    /// Unset `key`, returning the previous value
    fn remove(&mut self, key: &str) -> Option<Value>;
}

/// Checkpoint storage in one slot of a host session
#[derive(Debug)]
pub struct SessionBackend<S: SessionContext> {
    session: S,
    key: String,
}

impl<S: SessionContext> SessionBackend<S> {
    /// Bind to `key` in `session`, starting the session if needed
    ///
    /// # Errors
    /// [`BatonError::SessionUnavailable`] if the session is not active and
    /// cannot be started
    pub fn new(mut session: S, key: impl Into<String>) -> Result<Self> {
        let key = key.into();

        if !session.is_active() {
            debug!(key = %key, "Starting host session");
            session
                .start()
                .map_err(|e| BatonError::session(format!("can't start session: {e}")))?;
        }

        if !session.is_active() {
            return Err(BatonError::session("can't start session"));
        }

        Ok(Self { session, key })
    }

    /// Slot name inside the session
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl<S: SessionContext> StateBackend for SessionBackend<S> {
    fn load(&mut self) -> Result<Option<Checkpoint>> {
        let Some(stored) = self.session.get(&self.key) else {
            return Ok(None);
        };

        let document: CheckpointDocument = serde_json::from_value(stored)?;
        let checkpoint = document.open()?;
        info!(key = %self.key, epoch = checkpoint.epoch, "Loaded checkpoint from session");
        Ok(Some(checkpoint))
    }

    fn flush(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        let document = checkpoint.seal()?;
        self.session.set(&self.key, serde_json::to_value(&document)?);
        info!(key = %self.key, epoch = checkpoint.epoch, "Flushed checkpoint to session");
        Ok(())
    }

    fn clean(&mut self) -> Result<()> {
        if self.session.remove(&self.key).is_some() {
            info!(key = %self.key, "Removed checkpoint from session");
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("session key {}", self.key)
    }
}

#[derive(Debug, Default)]
struct SessionSlots {
    active: bool,
    refuse_start: bool,
    slots: HashMap<String, Value>,
}

/// In-process session context
///
/// Clones share the same slots, so a host can hand one clone to a relay and
/// keep another to carry the session across requests.
#[derive(Debug, Clone, Default)]
pub struct MemorySession {
    inner: Arc<Mutex<SessionSlots>>,
}

impl MemorySession {
    /// A session that has not been started yet
    pub fn new() -> Self {
        Self::default()
    }

    /// A session that is already active
    pub fn started() -> Self {
        let session = Self::new();
        session.slots().active = true;
        session
    }

    /// A session whose `start` never succeeds
    pub fn refusing_start() -> Self {
        let session = Self::new();
        session.slots().refuse_start = true;
        session
    }

    /// Close the session, keeping its slots for the next start
    pub fn end(&self) {
        self.slots().active = false;
    }

    /// Whether any value is stored under `key`
    pub fn contains_key(&self, key: &str) -> bool {
        self.slots().slots.contains_key(key)
    }

    fn slots(&self) -> MutexGuard<'_, SessionSlots> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionContext for MemorySession {
    fn is_active(&self) -> bool {
        self.slots().active
    }

    fn start(&mut self) -> Result<()> {
        let mut slots = self.slots();
        if !slots.refuse_start {
            slots.active = true;
        }
        Ok(())
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.slots().slots.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) {
        self.slots().slots.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) -> Option<Value> {
        self.slots().slots.remove(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateStore;
    use serde_json::json;

    #[test]
    fn test_backend_starts_inactive_session() {
        let session = MemorySession::new();
        assert!(!session.is_active());

        let backend = SessionBackend::new(session.clone(), "slot").unwrap();

        assert!(session.is_active());
        assert_eq!(backend.key(), "slot");
    }

    #[test]
    fn test_unstartable_session_is_unavailable() {
        let result = SessionBackend::new(MemorySession::refusing_start(), "slot");

        assert!(matches!(result, Err(BatonError::SessionUnavailable(_))));
    }

    #[test]
    fn test_flush_load_clean_through_shared_session() {
        let session = MemorySession::started();
        let mut backend = SessionBackend::new(session.clone(), "slot").unwrap();

        let mut state = StateStore::new();
        state.set("rows.done", json!(120));
        let checkpoint = Checkpoint::new(2, state);

        backend.flush(&checkpoint).unwrap();
        assert!(session.contains_key("slot"));

        // A later request binds a fresh backend to the same session.
        let mut next = SessionBackend::new(session.clone(), "slot").unwrap();
        assert_eq!(next.load().unwrap(), Some(checkpoint));

        next.clean().unwrap();
        assert!(!session.contains_key("slot"));
        assert_eq!(next.load().unwrap(), None);
    }

    #[test]
    fn test_other_session_keys_are_untouched() {
        let mut session = MemorySession::started();
        session.set("user", json!("alice"));
        let mut backend = SessionBackend::new(session.clone(), "slot").unwrap();

        backend.flush(&Checkpoint::new(1, StateStore::new())).unwrap();
        backend.clean().unwrap();

        assert_eq!(session.get("user"), Some(json!("alice")));
    }

    #[test]
    fn test_garbage_in_slot_fails_to_load() {
        let mut session = MemorySession::started();
        session.set("slot", json!("not a checkpoint"));
        let mut backend = SessionBackend::new(session, "slot").unwrap();

        assert!(matches!(backend.load(), Err(BatonError::Json(_))));
    }
}
