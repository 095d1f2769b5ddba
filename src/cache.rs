//! TTL-guarded cache-or-fetch policy.
//!
//! Every backend resource the dashboard shows (guild list, roles, channels,
//! emojis, gift config, security logs, unban requests, module status) goes
//! through the same decision: serve a fresh-enough snapshot from the store,
//! or call the backend and refresh the snapshot. This module implements that
//! decision once, parameterized per resource, instead of repeating it per
//! data type.

use crate::error::Result;
use crate::store::{keys, Store};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};

/// Per-resource cache parameters.
///
/// TTLs are policy constants, not computed values.
#[derive(Debug, Clone, Copy)]
pub struct ResourcePolicy {
    /// Store key holding the serialized payload
    pub key: &'static str,
    /// Store key holding the last-updated timestamp (milliseconds)
    pub timestamp_key: &'static str,
    /// Maximum age at which the snapshot is still trusted
    pub ttl_ms: i64,
    /// Optional store key holding a variant tag (e.g. channel wish type)
    pub variant_key: Option<&'static str>,
}

/// Guild list, 10 minute cache.
pub const GUILD_LIST: ResourcePolicy = ResourcePolicy {
    key: keys::GUILDS,
    timestamp_key: keys::GUILDS_LAST_UPDATED,
    ttl_ms: 600_000,
    variant_key: None,
};

/// Guild roles, 5 minute cache.
pub const GUILD_ROLES: ResourcePolicy = ResourcePolicy {
    key: keys::GUILD_ROLES,
    timestamp_key: keys::GUILD_ROLES_TIMESTAMP,
    ttl_ms: 300_000,
    variant_key: None,
};

/// Guild channels, 5 minute cache, tagged with the requested wish type.
pub const GUILD_CHANNELS: ResourcePolicy = ResourcePolicy {
    key: keys::GUILD_CHANNELS,
    timestamp_key: keys::GUILD_CHANNELS_TIMESTAMP,
    ttl_ms: 300_000,
    variant_key: Some(keys::GUILD_CHANNELS_TYPE),
};

/// Guild emojis, 5 minute cache.
pub const GUILD_EMOJIS: ResourcePolicy = ResourcePolicy {
    key: keys::GUILD_EMOJIS,
    timestamp_key: keys::GUILD_EMOJIS_TIMESTAMP,
    ttl_ms: 300_000,
    variant_key: None,
};

/// Gift/event embed config, 30 second cache.
pub const GIFT_CONFIG: ResourcePolicy = ResourcePolicy {
    key: keys::GIFT_CONFIG,
    timestamp_key: keys::GIFT_CONFIG_TIMESTAMP,
    ttl_ms: 30_000,
    variant_key: None,
};

/// Security log config, 30 second cache, tagged with the log type.
pub const SECURITY_LOGS: ResourcePolicy = ResourcePolicy {
    key: keys::SECURITY_LOGS,
    timestamp_key: keys::SECURITY_LOGS_TIMESTAMP,
    ttl_ms: 30_000,
    variant_key: Some(keys::SECURITY_LOGS_TYPE),
};

/// Unban requests, 15 second cache.
pub const UNBAN_REQUESTS: ResourcePolicy = ResourcePolicy {
    key: keys::UNBAN_REQUESTS,
    timestamp_key: keys::UNBAN_REQUESTS_TIMESTAMP,
    ttl_ms: 15_000,
    variant_key: None,
};

/// Module/task completion status, 30 second cache.
pub const MODULE_STATUS: ResourcePolicy = ResourcePolicy {
    key: keys::MODULE_STATUS,
    timestamp_key: keys::MODULE_STATUS_TIMESTAMP,
    ttl_ms: 30_000,
    variant_key: None,
};

/// Result of a cache-or-fetch resolution.
#[derive(Debug)]
pub enum Outcome<T> {
    /// Served from the store, no network call happened
    Hit(T),
    /// Fetched from the backend, store refreshed
    Fetched(T),
    /// A fetch for the same key is already running; nothing was done
    InFlight,
}

impl<T> Outcome<T> {
    /// The resolved value, if any.
    pub fn into_value(self) -> Option<T> {
        match self {
            Outcome::Hit(value) | Outcome::Fetched(value) => Some(value),
            Outcome::InFlight => None,
        }
    }

    /// Whether a network call was made.
    pub fn was_fetched(&self) -> bool {
        matches!(self, Outcome::Fetched(_))
    }
}

/// Removes its key from the in-flight set when dropped, so the guard is
/// released on every exit path including fetch errors.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<&'static str>>>,
    key: &'static str,
}

impl InFlightGuard {
    fn acquire(set: &Arc<Mutex<HashSet<&'static str>>>, key: &'static str) -> Option<Self> {
        let mut in_flight = set.lock().expect("in-flight set poisoned");
        if !in_flight.insert(key) {
            return None;
        }
        Some(Self {
            set: Arc::clone(set),
            key,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.set.lock() {
            in_flight.remove(self.key);
        }
    }
}

/// Cache coordinator over the persistent store.
#[derive(Clone)]
pub struct Cache {
    store: Store,
    in_flight: Arc<Mutex<HashSet<&'static str>>>,
}

impl Cache {
    /// Create a cache over an initialized store.
    pub fn new(store: Store) -> Self {
        Self {
            store,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Access to the underlying store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Resolve a resource: serve the stored snapshot if it is still valid,
    /// otherwise run `fetch` and refresh the snapshot.
    ///
    /// A snapshot is valid when payload and timestamp exist, the timestamp is
    /// younger than the policy TTL, `no_cache` was not requested, and the
    /// stored variant tag (if the policy tracks one) matches `variant`. A
    /// variant mismatch forces a refresh even inside the TTL window. A
    /// snapshot that fails to deserialize is treated as a miss.
    ///
    /// If a fetch for the same key is already in flight the call returns
    /// [`Outcome::InFlight`] without touching the store or the network.
    ///
    /// # Errors
    ///
    /// Returns the fetch error unchanged on a failed refresh; nothing is
    /// written to the store in that case.
    pub async fn resolve<T, F, Fut>(
        &self,
        policy: &ResourcePolicy,
        variant: Option<&str>,
        no_cache: bool,
        now_ms: i64,
        fetch: F,
    ) -> Result<Outcome<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let _guard = match InFlightGuard::acquire(&self.in_flight, policy.key) {
            Some(guard) => guard,
            None => return Ok(Outcome::InFlight),
        };

        if !no_cache {
            if let Some(snapshot) = self.valid_snapshot(policy, variant, now_ms).await? {
                match serde_json::from_str::<T>(&snapshot) {
                    Ok(value) => return Ok(Outcome::Hit(value)),
                    Err(e) => {
                        // corrupt snapshot: refetch instead of failing
                        tracing::warn!(key = policy.key, error = %e, "discarding unreadable cache snapshot");
                    }
                }
            }
        }

        let value = fetch().await?;

        self.store
            .set(policy.key, &serde_json::to_string(&value)?)
            .await?;
        self.store
            .set(policy.timestamp_key, &now_ms.to_string())
            .await?;
        if let (Some(variant_key), Some(variant)) = (policy.variant_key, variant) {
            self.store.set(variant_key, variant).await?;
        }

        Ok(Outcome::Fetched(value))
    }

    /// Return the stored payload if it is within TTL and variant-correct.
    async fn valid_snapshot(
        &self,
        policy: &ResourcePolicy,
        variant: Option<&str>,
        now_ms: i64,
    ) -> Result<Option<String>> {
        let payload = match self.store.get(policy.key).await? {
            Some(payload) => payload,
            None => return Ok(None),
        };
        let timestamp = match self.store.get(policy.timestamp_key).await? {
            Some(raw) => match raw.parse::<i64>() {
                Ok(ts) => ts,
                Err(_) => return Ok(None),
            },
            None => return Ok(None),
        };

        if now_ms - timestamp >= policy.ttl_ms {
            return Ok(None);
        }

        if let (Some(variant_key), Some(wanted)) = (policy.variant_key, variant) {
            if self.store.get(variant_key).await?.as_deref() != Some(wanted) {
                return Ok(None);
            }
        }

        Ok(Some(payload))
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
