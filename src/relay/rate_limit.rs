//! Fixed-window rate limiting per client identity and endpoint.
//!
//! Each client gets one request per window: issuing and registering are heavily
//! throttled to defend against secret guessing and delivery spam, listing is
//! lightly throttled. The clock is `tokio::time::Instant` so tests can pause
//! and advance time.

use std::{
    collections::{HashMap, hash_map::Entry},
    sync::{Mutex, PoisonError},
};
use tokio::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
    PublicKeys,
    GetSecret,
    AddKey,
}

impl Endpoint {
    const fn window(self) -> Duration {
        match self {
            Self::PublicKeys => Duration::from_secs(10),
            Self::GetSecret | Self::AddKey => Duration::from_secs(20 * 60),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Limited,
}

/// One allowed request per (client, endpoint) window.
#[derive(Debug, Default)]
pub struct FixedWindowLimiter {
    windows: Mutex<HashMap<(String, Endpoint), Instant>>,
}

impl FixedWindowLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self, client: &str, endpoint: Endpoint) -> Decision {
        let now = Instant::now();
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // An expired entry no longer limits anyone; drop it so the map stays
        // bounded by the set of recently active clients.
        windows.retain(|(_, endpoint), started| now.duration_since(*started) < endpoint.window());

        match windows.entry((client.to_string(), endpoint)) {
            Entry::Occupied(mut entry) => {
                if now.duration_since(*entry.get()) >= endpoint.window() {
                    entry.insert(now);
                    Decision::Allowed
                } else {
                    Decision::Limited
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                Decision::Allowed
            }
        }
    }
}
