//! Sessions and the per-application session store.
//!
//! A [`Session`] is shared by every in-flight request presenting the same
//! identifier, so all of its mutable state sits behind short-lived locks.
//! Context mutations interleave with no isolation beyond freedom from data
//! corruption; identifier and creation time are set once per issue.
//!
//! The [`SessionManager`] owns one application's store. `resolve` embodies
//! the whole lookup contract: unknown or invalid tokens mint a fresh
//! session, a bound-address mismatch is treated exactly like not-found
//! (never surfaced to the client, never reusing the other address's
//! session), and a good match refreshes the access time and clears the
//! recent flag.

use crate::ids::{new_session_key, SessionId};
use crate::pool::{Pool, Recyclable};
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, SystemTime};
use tracing::debug;

/// Separator between identifier and key in the external token.
const TOKEN_SEPARATOR: char = '.';

#[derive(Debug)]
struct SessionState {
    id: Option<SessionId>,
    id_key: Option<String>,
    created: SystemTime,
    access: SystemTime,
    /// True until the session is reused by a second request
    recent: bool,
    /// Client address the session is bound to (anti-spoofing heuristic)
    remote_addr: Option<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        let now = SystemTime::now();
        Self {
            id: None,
            id_key: None,
            created: now,
            access: now,
            recent: true,
            remote_addr: None,
        }
    }
}

/// One client session.
#[derive(Debug, Default)]
pub struct Session {
    state: Mutex<SessionState>,
    context: RwLock<HashMap<String, Value>>,
    errors: RwLock<HashMap<String, String>>,
}

impl Session {
    fn state(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> Option<SessionId> {
        self.state().id
    }

    /// External token carried in the session cookie: `<id>.<key>`.
    pub fn token(&self) -> Option<String> {
        let state = self.state();
        match (&state.id, &state.id_key) {
            (Some(id), Some(key)) => Some(format!("{id}{TOKEN_SEPARATOR}{key}")),
            _ => None,
        }
    }

    pub fn creation_time(&self) -> SystemTime {
        self.state().created
    }

    pub fn access_time(&self) -> SystemTime {
        self.state().access
    }

    /// True until the first reuse after creation.
    pub fn is_recent(&self) -> bool {
        self.state().recent
    }

    pub fn remote_addr(&self) -> Option<String> {
        self.state().remote_addr.clone()
    }

    /// Arbitrary per-session value store.
    pub fn put(&self, key: &str, value: Value) {
        if let Ok(mut ctx) = self.context.write() {
            ctx.insert(key.to_string(), value);
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.context.read().ok()?.get(key).cloned()
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.context.write().ok()?.remove(key)
    }

    /// Keyed error messages accumulated for this session.
    pub fn put_error(&self, key: &str, message: &str) {
        if let Ok(mut errors) = self.errors.write() {
            errors.insert(key.to_string(), message.to_string());
        }
    }

    pub fn error(&self, key: &str) -> Option<String> {
        self.errors.read().ok()?.get(key).cloned()
    }

    pub fn clear_errors(&self) {
        if let Ok(mut errors) = self.errors.write() {
            errors.clear();
        }
    }

    /// Stamp a recycled session with a fresh identity. Identifier, key and
    /// bound address are set once here and never rebound.
    fn issue(&mut self, id: SessionId, id_key: String, remote_addr: &str) {
        let now = SystemTime::now();
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.id = Some(id);
        state.id_key = Some(id_key);
        state.created = now;
        state.access = now;
        state.recent = true;
        state.remote_addr = if remote_addr.is_empty() {
            None
        } else {
            Some(remote_addr.to_string())
        };
    }

    /// Whether a presented key and client address match this session.
    fn presented_by(&self, id_key: &str, remote_addr: &str) -> bool {
        let state = self.state();
        let key_ok = state.id_key.as_deref() == Some(id_key);
        let addr_ok = match &state.remote_addr {
            Some(bound) => bound == remote_addr,
            None => remote_addr.is_empty(),
        };
        key_ok && addr_ok
    }

    /// Record a reuse: refresh the access time, drop the recent flag.
    fn touch(&self) {
        let mut state = self.state();
        let now = SystemTime::now();
        // accessTime >= creationTime always
        state.access = state.access.max(now).max(state.created);
        state.recent = false;
    }
}

impl Recyclable for Session {
    fn recycle(&mut self) {
        let now = SystemTime::now();
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.id = None;
        state.id_key = None;
        state.created = now;
        state.access = now;
        state.recent = true;
        state.remote_addr = None;
        if let Ok(mut ctx) = self.context.write() {
            ctx.clear();
        }
        if let Ok(mut errors) = self.errors.write() {
            errors.clear();
        }
    }
}

/// Split an external token into identifier and key parts.
fn split_token(token: &str) -> Option<(&str, &str)> {
    let (id, key) = token.split_once(TOKEN_SEPARATOR)?;
    if id.is_empty() || key.is_empty() {
        None
    } else {
        Some((id, key))
    }
}

/// One application's session store.
pub struct SessionManager {
    sessions: DashMap<String, Arc<Session>>,
    pool: Arc<Pool<Session>>,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(ttl: Duration, pool: Arc<Pool<Session>>) -> Self {
        Self {
            sessions: DashMap::new(),
            pool,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Resolve the session for a request.
    ///
    /// A missing, unknown or mismatched token (wrong key, or a client
    /// address other than the one the session is bound to) yields a fresh
    /// session; the stored one is never exposed across addresses. A match
    /// refreshes the access time and clears the recent flag.
    pub fn resolve(&self, token: Option<&str>, remote_addr: &str) -> Arc<Session> {
        if let Some((id, key)) = token.and_then(split_token) {
            if let Some(existing) = self.sessions.get(id).map(|e| Arc::clone(e.value())) {
                if existing.presented_by(key, remote_addr) {
                    existing.touch();
                    return existing;
                }
                debug!(session = id, "presented token rejected, issuing fresh session");
            }
        }
        self.create(remote_addr)
    }

    fn create(&self, remote_addr: &str) -> Arc<Session> {
        let mut fresh = self.pool.acquire();
        // ULIDs do not collide in practice; the loop keeps the per-store
        // uniqueness invariant explicit anyway.
        let mut id = SessionId::new();
        while self.sessions.contains_key(&id.to_string()) {
            id = SessionId::new();
        }
        fresh.issue(id, new_session_key(), remote_addr);
        let session = Arc::new(fresh);
        self.sessions
            .insert(id.to_string(), Arc::clone(&session));
        debug!(session = %id, sessions = self.sessions.len(), "session created");
        session
    }

    /// Remove every session whose access time is at least `ttl` old.
    ///
    /// Removal is per entry; concurrent `resolve` calls for other sessions
    /// are never blocked for longer than one entry's removal. Removed
    /// sessions with no remaining references are recycled into the pool.
    pub fn expire(&self, now: SystemTime, ttl: Duration) -> usize {
        let stale = |session: &Arc<Session>| {
            now.duration_since(session.access_time())
                .map(|age| age >= ttl)
                .unwrap_or(false)
        };
        let candidates: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| stale(entry.value()))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for key in candidates {
            // Re-check at removal time; the session may have been touched
            // since the scan.
            if let Some((_, session)) = self.sessions.remove_if(&key, |_, s| stale(s)) {
                removed += 1;
                if let Ok(inner) = Arc::try_unwrap(session) {
                    self.pool.release(inner);
                }
            }
        }
        if removed > 0 {
            debug!(removed, remaining = self.sessions.len(), "session sweep");
        }
        removed
    }

    /// Sweep with the store's configured TTL.
    pub fn sweep(&self, now: SystemTime) -> usize {
        self.expire(now, self.ttl)
    }

    /// Explicitly drop one session, recycling it when unreferenced.
    pub fn invalidate(&self, id: &str) -> bool {
        match self.sessions.remove(id) {
            Some((_, session)) => {
                if let Ok(inner) = Arc::try_unwrap(session) {
                    self.pool.release(inner);
                }
                true
            }
            None => false,
        }
    }

    /// Drop every session. Used when the owning application stops.
    pub fn drain(&self) {
        self.sessions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_token() {
        assert_eq!(split_token("abc.def"), Some(("abc", "def")));
        assert!(split_token("abc").is_none());
        assert!(split_token(".def").is_none());
        assert!(split_token("abc.").is_none());
    }

    #[test]
    fn test_access_time_never_precedes_creation() {
        let session = Session::default();
        session.touch();
        assert!(session.access_time() >= session.creation_time());
    }
}
