//! Session Memory Store
//!
//! Short-lived per-conversation filter state that lets a follow-up turn
//! ("cheaper ones", "what about in Dallas") inherit the brand, category,
//! price and city of the previous turn.
//!
//! Entries expire after an idle TTL that every successful `get` refreshes.
//! A sweep removes expired entries and, if the store is still over capacity,
//! evicts the least recently touched 20 %. The store is volatile: losing an
//! entry only means the next turn starts without context.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sdk::envelope::Capability;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::SessionConfig;

/// Fraction of sessions evicted when the store is over capacity
const EVICTION_FRACTION: f64 = 0.2;

/// Filter context carried across turns of one conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_vertical: Option<Capability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    /// Intent attribute flags (e.g. "waterproof", "pet_friendly")
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub attributes: BTreeSet<String>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            updated_at: Utc::now(),
            ..Default::default()
        }
    }

    /// Whether any filter is set
    pub fn has_filters(&self) -> bool {
        self.brand.is_some()
            || self.category.is_some()
            || self.min_price.is_some()
            || self.max_price.is_some()
            || self.city.is_some()
            || self.gender.is_some()
            || !self.attributes.is_empty()
    }
}

/// Injectable session store
///
/// Every method is infallible: a missing or expired session is `None`.
pub trait SessionStore: Send + Sync {
    /// Fetch a live session, refreshing its TTL
    fn get(&self, session_id: &str) -> Option<SessionState>;

    /// Insert or replace a session
    fn set(&self, session_id: &str, state: SessionState);

    /// Remove a session, returning whether it existed
    fn delete(&self, session_id: &str) -> bool;

    /// Refresh a live session's TTL without reading it
    fn refresh_ttl(&self, session_id: &str) -> bool;
}

/// Result of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub evicted: usize,
}

#[derive(Debug, Clone)]
struct Entry {
    state: SessionState,
    last_touched: Instant,
    /// Monotonic touch order, breaks ties between equal instants
    touch_seq: u64,
}

/// In-memory session store on a sharded concurrent map
pub struct InMemorySessionStore {
    sessions: DashMap<String, Entry>,
    ttl: Duration,
    max_sessions: usize,
    touch_counter: AtomicU64,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
            max_sessions: max_sessions.max(1),
            touch_counter: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.ttl(), config.max_sessions)
    }

    /// Number of stored sessions, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn next_seq(&self) -> u64 {
        self.touch_counter.fetch_add(1, Ordering::Relaxed)
    }

    fn is_expired(&self, entry: &Entry, now: Instant) -> bool {
        now.duration_since(entry.last_touched) >= self.ttl
    }

    /// Remove `session_id` only if it is still expired at `now`
    ///
    /// A `set` that lands between the expiry check and the removal keeps
    /// its entry.
    fn remove_if_expired(&self, session_id: &str, now: Instant) -> bool {
        self.sessions
            .remove_if(session_id, |_, entry| self.is_expired(entry, now))
            .is_some()
    }

    /// Remove expired sessions, then evict the least recently touched
    /// 20 % if still over capacity
    pub fn sweep(&self) -> SweepReport {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, entry| !self.is_expired(entry, now));
        let expired = before.saturating_sub(self.sessions.len());

        let mut evicted = 0;
        let len = self.sessions.len();
        if len > self.max_sessions {
            let quota = ((len as f64) * EVICTION_FRACTION).ceil() as usize;
            let to_evict = quota.max(len - self.max_sessions);

            let mut by_touch: Vec<(u64, String)> = self
                .sessions
                .iter()
                .map(|r| (r.value().touch_seq, r.key().clone()))
                .collect();
            by_touch.sort_unstable_by_key(|(seq, _)| *seq);

            for (_, id) in by_touch.into_iter().take(to_evict) {
                if self.sessions.remove(&id).is_some() {
                    evicted += 1;
                }
            }
        }

        if expired > 0 || evicted > 0 {
            debug!(
                "Session sweep: {} expired, {} evicted, {} remaining",
                expired,
                evicted,
                self.sessions.len()
            );
        }

        SweepReport { expired, evicted }
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, session_id: &str) -> Option<SessionState> {
        let now = Instant::now();
        let seq = self.next_seq();

        let state = {
            let mut entry = self.sessions.get_mut(session_id)?;
            if self.is_expired(&entry, now) {
                None
            } else {
                entry.last_touched = now;
                entry.touch_seq = seq;
                Some(entry.state.clone())
            }
        };

        if state.is_none() && self.remove_if_expired(session_id, now) {
            debug!("Session {} expired", session_id);
        }
        state
    }

    fn set(&self, session_id: &str, state: SessionState) {
        let entry = Entry {
            state,
            last_touched: Instant::now(),
            touch_seq: self.next_seq(),
        };
        let is_new = self.sessions.insert(session_id.to_string(), entry).is_none();

        if is_new && self.sessions.len() > self.max_sessions {
            self.sweep();
        }
    }

    fn delete(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    fn refresh_ttl(&self, session_id: &str) -> bool {
        let now = Instant::now();
        let seq = self.next_seq();
        match self.sessions.get_mut(session_id) {
            Some(mut entry) if !self.is_expired(&entry, now) => {
                entry.last_touched = now;
                entry.touch_seq = seq;
                true
            }
            _ => false,
        }
    }
}

/// Spawn the periodic sweep task
///
/// The task stops when `token` is cancelled.
pub fn spawn_sweeper(
    store: Arc<InMemorySessionStore>,
    interval: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Session sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    store.sweep();
                }
            }
        }
    })
}
