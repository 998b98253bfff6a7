//! Voice-session cache: TTL expiry plus least-recently-used capacity
//! eviction.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::VoiceConditioning;

struct VoiceSession {
    conditioning: VoiceConditioning,
    #[allow(dead_code)]
    created_at: Instant,
    updated_at: Instant,
    /// Insertion order, the deterministic tie-break when two sessions share
    /// an `updated_at`.
    seq: u64,
}

/// Server-side store of prepared reference voices.
///
/// Every operation serializes through one lock and is atomic with respect
/// to the others. Expiry and eviction run cooperatively at the top of each
/// request rather than on a background timer, so after a cleanup pass no
/// entry is older than the TTL and the store never exceeds its capacity.
pub struct SessionStore {
    inner: Mutex<Inner>,
    ttl: Duration,
    max_sessions: usize,
}

struct Inner {
    sessions: HashMap<String, VoiceSession>,
    next_seq: u64,
}

impl SessionStore {
    pub fn new(ttl: Duration, max_sessions: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                sessions: HashMap::new(),
                next_seq: 0,
            }),
            ttl,
            max_sessions,
        }
    }

    /// Store a prepared voice under a fresh unguessable id and return the id.
    ///
    /// Runs a cleanup pass after the insert so the capacity bound holds at
    /// every observation point.
    pub fn insert(&self, conditioning: VoiceConditioning) -> String {
        self.insert_at(conditioning, Instant::now())
    }

    fn insert_at(&self, conditioning: VoiceConditioning, now: Instant) -> String {
        let id = Uuid::new_v4().simple().to_string();

        let mut inner = self.inner.lock().unwrap();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.sessions.insert(
            id.clone(),
            VoiceSession {
                conditioning,
                created_at: now,
                updated_at: now,
                seq,
            },
        );
        self.cleanup_inner(&mut inner, now);

        id
    }

    /// Fetch the conditioning for `id`.
    ///
    /// A miss is read-only (no entry is created) and does not refresh
    /// `updated_at`; callers touch the session only after a successful
    /// generation.
    pub fn get(&self, id: &str) -> Result<VoiceConditioning> {
        let inner = self.inner.lock().unwrap();
        inner
            .sessions
            .get(id)
            .map(|session| session.conditioning.clone())
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))
    }

    /// Replace the stored conditioning and refresh `updated_at`.
    ///
    /// Silently ignored when `id` is gone: a session evicted mid-generation
    /// loses its write-back, but the generation result still reaches the
    /// caller.
    pub fn touch(&self, id: &str, conditioning: VoiceConditioning) {
        self.touch_at(id, conditioning, Instant::now())
    }

    fn touch_at(&self, id: &str, conditioning: VoiceConditioning, now: Instant) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(session) = inner.sessions.get_mut(id) {
            session.conditioning = conditioning;
            session.updated_at = now;
        }
    }

    /// Expire idle sessions, then evict the least-recently-used entries
    /// until the store fits its capacity.
    pub fn cleanup(&self) {
        self.cleanup_at(Instant::now())
    }

    fn cleanup_at(&self, now: Instant) {
        let mut inner = self.inner.lock().unwrap();
        self.cleanup_inner(&mut inner, now);
    }

    fn cleanup_inner(&self, inner: &mut Inner, now: Instant) {
        let before = inner.sessions.len();
        let ttl = self.ttl;
        inner
            .sessions
            .retain(|_, session| now.duration_since(session.updated_at) <= ttl);
        let expired = before - inner.sessions.len();

        let mut evicted = 0;
        while inner.sessions.len() > self.max_sessions {
            let oldest = inner
                .sessions
                .iter()
                .min_by_key(|(_, session)| (session.updated_at, session.seq))
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    inner.sessions.remove(&id);
                    evicted += 1;
                }
                None => break,
            }
        }

        if expired > 0 || evicted > 0 {
            debug!(
                "Session cleanup: {} expired, {} evicted, {} live",
                expired,
                evicted,
                inner.sessions.len()
            );
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub(crate) fn updated_at(&self, id: &str) -> Option<Instant> {
        self.inner
            .lock()
            .unwrap()
            .sessions
            .get(id)
            .map(|session| session.updated_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(byte: u8) -> VoiceConditioning {
        VoiceConditioning::from_bytes(vec![byte])
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_insert_then_get_roundtrip() {
        let store = SessionStore::new(secs(60), 8);

        let a = store.insert(blob(1));
        let b = store.insert(blob(2));

        assert_ne!(a, b);
        assert_eq!(store.get(&a).unwrap(), blob(1));
        assert_eq!(store.get(&b).unwrap(), blob(2));
    }

    #[test]
    fn test_get_miss_is_read_only() {
        let store = SessionStore::new(secs(60), 8);

        assert!(matches!(
            store.get("no-such-session"),
            Err(Error::SessionNotFound(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_touch_replaces_conditioning_and_refreshes_timestamp() {
        let store = SessionStore::new(secs(60), 8);
        let id = store.insert(blob(1));
        let first = store.updated_at(&id).unwrap();

        store.touch_at(&id, blob(9), first + secs(5));

        assert_eq!(store.get(&id).unwrap(), blob(9));
        assert_eq!(store.updated_at(&id).unwrap(), first + secs(5));
    }

    #[test]
    fn test_touch_after_eviction_is_a_noop() {
        let store = SessionStore::new(secs(60), 8);

        store.touch("gone", blob(1));

        assert!(store.is_empty());
    }

    #[test]
    fn test_ttl_expiry() {
        let store = SessionStore::new(secs(10), 8);
        let now = Instant::now();

        let stale = store.insert_at(blob(1), now);
        let fresh = store.insert_at(blob(2), now + secs(8));

        store.cleanup_at(now + secs(12));

        assert!(store.get(&stale).is_err());
        assert!(store.get(&fresh).is_ok());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_touch_defers_expiry() {
        let store = SessionStore::new(secs(10), 8);
        let now = Instant::now();

        let id = store.insert_at(blob(1), now);
        store.touch_at(&id, blob(1), now + secs(9));
        store.cleanup_at(now + secs(15));

        assert!(store.get(&id).is_ok());
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let store = SessionStore::new(secs(3600), 3);
        let now = Instant::now();

        let a = store.insert_at(blob(1), now);
        let b = store.insert_at(blob(2), now + secs(1));
        let c = store.insert_at(blob(3), now + secs(2));
        // A is touched, so B becomes the oldest entry.
        store.touch_at(&a, blob(1), now + secs(3));

        let d = store.insert_at(blob(4), now + secs(4));

        assert_eq!(store.len(), 3);
        assert!(store.get(&b).is_err());
        assert!(store.get(&a).is_ok());
        assert!(store.get(&c).is_ok());
        assert!(store.get(&d).is_ok());
    }

    #[test]
    fn test_capacity_tie_breaks_by_insertion_order() {
        let store = SessionStore::new(secs(3600), 2);
        let now = Instant::now();

        let a = store.insert_at(blob(1), now);
        let b = store.insert_at(blob(2), now);
        let c = store.insert_at(blob(3), now);

        assert_eq!(store.len(), 2);
        assert!(store.get(&a).is_err());
        assert!(store.get(&b).is_ok());
        assert!(store.get(&c).is_ok());
    }

    #[test]
    fn test_cleanup_bounds_hold_after_pass() {
        let store = SessionStore::new(secs(10), 4);
        let now = Instant::now();

        for i in 0..10 {
            store.insert_at(blob(i), now + Duration::from_millis(i as u64));
        }
        store.cleanup_at(now + secs(1));

        assert!(store.len() <= 4);
    }
}
