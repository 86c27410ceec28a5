//! Single-use OAuth callback state.
//!
//! Bridges the external provider round trip back to the domain and
//! redirect URL a sign-in was initiated for. Entries are consumed at most
//! once; abandoned flows are swept by a periodic reaper.

use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use dashmap::DashMap;
use rand::RngCore;
use rand::rngs::OsRng;
use url::Url;

use crate::domain::Domain;
use crate::error::{Result, ServerError};

/// How long an initiated flow may wait for its callback.
const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);
/// Sweep period for abandoned entries.
const REAP_PERIOD: Duration = Duration::from_secs(60);
/// Entropy of state identifiers, in bytes.
const STATE_LENGTH: usize = 24;

/// Ephemeral record bridging an OAuth redirect back to its tenant.
#[derive(Clone, Debug)]
pub struct StateEntry {
    pub domain: Domain,
    pub redirect_url: Url,
    expires_at: Instant,
}

impl StateEntry {
    fn expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Short-lived, single-use mapping from a CSRF state token to its entry.
#[derive(Debug)]
pub struct StateBroker {
    entries: DashMap<String, StateEntry>,
    ttl: Duration,
}

impl Default for StateBroker {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }
}

impl StateBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Store a new entry and return its opaque state identifier, to be
    /// round-tripped through the external provider.
    pub fn begin(&self, domain: Domain, redirect_url: Url) -> String {
        let mut bytes = [0u8; STATE_LENGTH];
        OsRng.fill_bytes(&mut bytes);
        let state = URL_SAFE_NO_PAD.encode(bytes);

        self.entries.insert(
            state.clone(),
            StateEntry {
                domain,
                redirect_url,
                expires_at: Instant::now() + self.ttl,
            },
        );

        state
    }

    /// Atomically look up AND remove the entry for `state`.
    ///
    /// The removal is a single compare-and-remove step, so two concurrent
    /// callbacks with the same state cannot both observe "found". Expiry
    /// is re-checked at consumption.
    pub fn complete(&self, state: &str) -> Result<StateEntry> {
        let (_, entry) = self
            .entries
            .remove(state)
            .ok_or(ServerError::StateExpiredOrUnknown)?;

        if entry.expired() {
            return Err(ServerError::StateExpiredOrUnknown);
        }

        Ok(entry)
    }

    /// Evict entries whose expiry has passed, whether or not they were
    /// ever completed.
    pub fn reap(&self) {
        self.entries.retain(|_, entry| !entry.expired());
    }

    /// Spawn the background sweep bounding memory growth from abandoned
    /// flows.
    pub fn spawn_reaper(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(REAP_PERIOD);
            interval.tick().await; // first tick fires immediately.
            loop {
                interval.tick().await;
                self.reap();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redirect() -> Url {
        Url::parse("https://app.example.com/after-login").unwrap()
    }

    fn domain() -> Domain {
        Domain::parse("app.example.com").unwrap()
    }

    #[test]
    fn test_complete_exactly_once() {
        let broker = StateBroker::new();
        let state = broker.begin(domain(), redirect());

        let entry = broker.complete(&state).unwrap();
        assert_eq!(entry.domain, domain());
        assert_eq!(entry.redirect_url, redirect());

        assert!(matches!(
            broker.complete(&state),
            Err(ServerError::StateExpiredOrUnknown)
        ));
    }

    #[test]
    fn test_unknown_state() {
        let broker = StateBroker::new();
        assert!(broker.complete("never-issued").is_err());
    }

    #[test]
    fn test_expired_state_rejected() {
        let broker = StateBroker::with_ttl(Duration::ZERO);
        let state = broker.begin(domain(), redirect());

        assert!(matches!(
            broker.complete(&state),
            Err(ServerError::StateExpiredOrUnknown)
        ));
    }

    #[test]
    fn test_reaper_purges_abandoned_entries() {
        let broker = StateBroker::with_ttl(Duration::ZERO);
        broker.begin(domain(), redirect());
        broker.begin(domain(), redirect());
        assert_eq!(broker.entries.len(), 2);

        broker.reap();
        assert!(broker.entries.is_empty());
    }

    #[test]
    fn test_concurrent_completion_single_winner() {
        let broker = Arc::new(StateBroker::new());
        let state = broker.begin(domain(), redirect());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let broker = Arc::clone(&broker);
                let state = state.clone();
                std::thread::spawn(move || broker.complete(&state).is_ok())
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|&ok| ok)
            .count();
        assert_eq!(successes, 1);
    }

    #[test]
    fn test_state_identifiers_unique() {
        let broker = StateBroker::new();
        let first = broker.begin(domain(), redirect());
        let second = broker.begin(domain(), redirect());
        assert_ne!(first, second);
    }
}
