use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// How long a sign-in may take between `/auth/login` and the callback.
pub const STATE_TTL_MINUTES: i64 = 10;

/// Outstanding OAuth `state` values issued by `/auth/login`. Each value can
/// be consumed once, within `STATE_TTL_MINUTES` of being issued.
#[derive(Clone)]
pub struct OAuthStateStore {
    states: Arc<Mutex<HashMap<String, DateTime<Utc>>>>,
    ttl: Duration,
}

impl Default for OAuthStateStore {
    fn default() -> Self {
        Self::with_ttl(Duration::minutes(STATE_TTL_MINUTES))
    }
}

impl OAuthStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            states: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    fn states(&self) -> MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        // A poisoned map is still a valid map of strings.
        self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn purge_expired(&self, states: &mut HashMap<String, DateTime<Utc>>, now: DateTime<Utc>) {
        let before = states.len();
        states.retain(|_, issued_at| now - *issued_at < self.ttl);
        let dropped = before - states.len();
        if dropped > 0 {
            log::debug!("Dropped {} abandoned sign-in states", dropped);
        }
    }

    pub fn issue(&self) -> String {
        self.issue_at(Utc::now())
    }

    pub fn issue_at(&self, now: DateTime<Utc>) -> String {
        let state = Uuid::new_v4().to_string();
        let mut states = self.states();
        self.purge_expired(&mut states, now);
        states.insert(state.clone(), now);
        state
    }

    pub fn consume(&self, state: &str) -> bool {
        self.consume_at(state, Utc::now())
    }

    /// Removes `state` and reports whether it was issued and still fresh.
    pub fn consume_at(&self, state: &str, now: DateTime<Utc>) -> bool {
        let mut states = self.states();
        let fresh = states
            .remove(state)
            .is_some_and(|issued_at| now - issued_at < self.ttl);
        self.purge_expired(&mut states, now);
        fresh
    }

    pub fn clear(&self) {
        self.states().clear();
    }

    pub fn pending(&self) -> usize {
        self.states().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_are_single_use() {
        let store = OAuthStateStore::new();
        let state = store.issue();
        assert!(store.consume(&state));
        assert!(!store.consume(&state));
        assert!(!store.consume("forged"));
    }

    #[test]
    fn clear_forgets_everything() {
        let store = OAuthStateStore::new();
        store.issue();
        store.issue();
        assert_eq!(store.pending(), 2);
        store.clear();
        assert_eq!(store.pending(), 0);
    }

    #[test]
    fn expired_states_are_refused() {
        let store = OAuthStateStore::new();
        let start = Utc::now();
        let state = store.issue_at(start);

        let late = start + Duration::minutes(STATE_TTL_MINUTES);
        assert!(!store.consume_at(&state, late));
        assert_eq!(store.pending(), 0);
    }

    #[test]
    fn abandoned_logins_do_not_accumulate() {
        let store = OAuthStateStore::with_ttl(Duration::minutes(10));
        let start = Utc::now();
        for _ in 0..1_000 {
            store.issue_at(start);
        }
        assert_eq!(store.pending(), 1_000);

        let fresh = store.issue_at(start + Duration::minutes(11));
        assert_eq!(store.pending(), 1);
        assert!(store.consume_at(&fresh, start + Duration::minutes(12)));
    }
}
