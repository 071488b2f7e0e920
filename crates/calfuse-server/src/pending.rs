//! Issued-but-unredeemed authorization requests.
//!
//! Every `state` handed out by `/auth-url` is recorded here until its
//! callback arrives. Entries are one-shot: [`PendingTable::take`] removes the
//! entry whatever the outcome, so a replayed `state` is never found again.
//!
//! Expired entries are not dropped at once. They stay as tombstones for one
//! more TTL so that a late callback can be told its request expired rather
//! than that it was never issued.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use calfuse_core::ProviderId;
use tracing::{debug, trace};

/// One outstanding authorization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    /// Provider the consent URL was built for.
    pub provider: ProviderId,
    /// The issued `state`.
    pub state: String,
    /// Scopes placed in the consent URL.
    pub scopes: Vec<String>,
    /// When the request stops being redeemable (monotonic clock).
    expires_at: Instant,
}

impl PendingRequest {
    /// Creates a request redeemable for `ttl`.
    pub fn new(
        provider: ProviderId,
        state: impl Into<String>,
        scopes: Vec<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            provider,
            state: state.into(),
            scopes,
            expires_at: Instant::now() + ttl,
        }
    }

    /// Returns true if the request can no longer be redeemed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Returns the time left before expiry.
    pub fn time_until_expiry(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

/// Why [`PendingTable::take`] did not yield a usable request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TakeError {
    /// Never issued, already redeemed, or purged.
    Unknown,
    /// Issued for `provider` but past its lifetime.
    Expired { provider: ProviderId },
}

/// Pending requests keyed by `state`.
#[derive(Debug)]
pub struct PendingTable {
    /// Lifetime of new entries.
    ttl: Duration,
    entries: HashMap<String, PendingRequest>,
}

impl Default for PendingTable {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

impl PendingTable {
    /// Creates an empty table whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Records a freshly issued `state`.
    pub fn insert(&mut self, provider: ProviderId, state: impl Into<String>, scopes: Vec<String>) {
        let request = PendingRequest::new(provider, state, scopes, self.ttl);
        debug!(provider = %provider, ttl_secs = self.ttl.as_secs(), "recorded pending request");
        self.entries.insert(request.state.clone(), request);
    }

    /// Removes and returns the request for `state`.
    ///
    /// The entry is gone after this call even when it had expired.
    pub fn take(&mut self, state: &str) -> Result<PendingRequest, TakeError> {
        let request = self.entries.remove(state).ok_or(TakeError::Unknown)?;
        if request.is_expired() {
            debug!(provider = %request.provider, "pending request expired before callback");
            return Err(TakeError::Expired {
                provider: request.provider,
            });
        }
        Ok(request)
    }

    /// Drops tombstones older than one extra TTL. Returns how many were removed.
    pub fn purge(&mut self) -> usize {
        let grace = self.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, request| {
            let keep = request.expires_at + grace > Instant::now();
            if !keep {
                trace!(provider = %request.provider, "purging expired pending request");
            }
            keep
        });
        let purged = before - self.entries.len();
        if purged > 0 {
            debug!(purged, "purged expired pending requests");
        }
        purged
    }

    /// Returns the number of entries, tombstones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no entries are held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
