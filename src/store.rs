//! Persistent key-value store.
//!
//! SQLite-backed string storage that serves as the substrate for both the
//! session state (OAuth state token, active guild) and the TTL-guarded
//! resource cache. TTL handling is layered on top by the cache module; the
//! store itself only knows strings.

use crate::error::{ClankDashError, Result};
use rusqlite::Connection;
use std::path::Path;

/// Well-known store keys.
///
/// Centralized so that cache policies, the auth flow and the cleanup
/// allow-list cannot drift apart on spelling.
pub mod keys {
    pub const STATE: &str = "state";
    pub const STATE_EXPIRY: &str = "state_expiry";
    pub const FIRST_LOGIN: &str = "first_login";
    pub const ACTIVE_GUILD: &str = "active_guild";
    pub const GUILDS: &str = "guilds";
    pub const GUILDS_LAST_UPDATED: &str = "guilds_last_updated";
    pub const GUILD_ROLES: &str = "guild_roles";
    pub const GUILD_ROLES_TIMESTAMP: &str = "guild_roles_timestamp";
    pub const GUILD_CHANNELS: &str = "guild_channels";
    pub const GUILD_CHANNELS_TIMESTAMP: &str = "guild_channels_timestamp";
    pub const GUILD_CHANNELS_TYPE: &str = "guild_channels_type";
    pub const GUILD_EMOJIS: &str = "guild_emojis";
    pub const GUILD_EMOJIS_TIMESTAMP: &str = "guild_emojis_timestamp";
    pub const GIFT_CONFIG: &str = "gift_config";
    pub const GIFT_CONFIG_TIMESTAMP: &str = "gift_config_timestamp";
    pub const GUILD_VIP: &str = "guild_vip";
    pub const SECURITY_LOGS: &str = "security_logs";
    pub const SECURITY_LOGS_TIMESTAMP: &str = "security_logs_timestamp";
    pub const SECURITY_LOGS_TYPE: &str = "security_logs_type";
    pub const UNBAN_REQUESTS: &str = "unban_requests";
    pub const UNBAN_REQUESTS_TIMESTAMP: &str = "unban_requests_timestamp";
    pub const MODULE_STATUS: &str = "module_status";
    pub const MODULE_STATUS_TIMESTAMP: &str = "module_status_timestamp";
    pub const DARK: &str = "dark";
    pub const LANG: &str = "lang";
    pub const ACCESS_TOKEN: &str = "access_token";
}

/// Keys preserved when session state is cleared on a guild switch.
///
/// `active_guild` is appended conditionally by the caller.
pub const IMPORTANT_KEYS: &[&str] = &[
    keys::ACCESS_TOKEN,
    keys::DARK,
    keys::LANG,
    keys::GUILDS,
    keys::GUILDS_LAST_UPDATED,
];

/// Persistent string key-value store backed by SQLite.
#[derive(Debug, Clone)]
pub struct Store {
    db_path: String,
}

/// Initialize the store schema.
///
/// Creates the `kv` table if it doesn't already exist. Also creates the
/// parent directory if needed.
///
/// # Errors
///
/// Returns an error if the database cannot be created or initialized.
pub async fn init_store(path: &str) -> Result<()> {
    let path = path.to_string();
    tokio::task::spawn_blocking(move || init_store_sync(&path))
        .await
        .map_err(|e| ClankDashError::Storage(format!("Task join error: {}", e)))??;
    Ok(())
}

fn init_store_sync(path: &str) -> Result<()> {
    // Create parent directory if it doesn't exist
    if let Some(parent) = Path::new(path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv (
            key TEXT NOT NULL PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

impl Store {
    /// Create a store handle for an initialized database.
    pub fn new(db_path: String) -> Self {
        Self { db_path }
    }

    /// Get the value stored under `key`.
    ///
    /// # Returns
    ///
    /// Returns `Some(value)` if present, `None` otherwise.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let db_path = self.db_path.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)?;
            let mut stmt = conn.prepare("SELECT value FROM kv WHERE key = ?1")?;

            let mut rows = stmt.query(rusqlite::params![key])?;

            if let Some(row) = rows.next()? {
                Ok(Some(row.get(0)?))
            } else {
                Ok(None)
            }
        })
        .await
        .map_err(|e| ClankDashError::Storage(format!("Task join error: {}", e)))?
    }

    /// Insert or replace the value stored under `key`.
    ///
    /// Last write wins; the store carries no locking of its own.
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        let db_path = self.db_path.clone();
        let key = key.to_string();
        let value = value.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)?;
            conn.execute(
                "INSERT INTO kv (key, value)
                 VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = ?2",
                rusqlite::params![key, value],
            )?;
            Ok::<_, ClankDashError>(())
        })
        .await
        .map_err(|e| ClankDashError::Storage(format!("Task join error: {}", e)))??;
        Ok(())
    }

    /// Remove the value stored under `key`, if any.
    pub async fn remove(&self, key: &str) -> Result<()> {
        let db_path = self.db_path.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)?;
            conn.execute("DELETE FROM kv WHERE key = ?1", rusqlite::params![key])?;
            Ok::<_, ClankDashError>(())
        })
        .await
        .map_err(|e| ClankDashError::Storage(format!("Task join error: {}", e)))??;
        Ok(())
    }

    /// Delete every key that is not in the `keep` allow-list.
    ///
    /// Used on guild switch to drop stale guild-scoped cache entries while
    /// preserving login and preference keys.
    pub async fn retain_only(&self, keep: &[&str]) -> Result<()> {
        let db_path = self.db_path.clone();
        let keep: Vec<String> = keep.iter().map(|k| k.to_string()).collect();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)?;

            let placeholders = keep
                .iter()
                .enumerate()
                .map(|(i, _)| format!("?{}", i + 1))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!("DELETE FROM kv WHERE key NOT IN ({})", placeholders);

            conn.execute(&sql, rusqlite::params_from_iter(keep.iter()))?;
            Ok::<_, ClankDashError>(())
        })
        .await
        .map_err(|e| ClankDashError::Storage(format!("Task join error: {}", e)))??;
        Ok(())
    }

    /// Delete every stored key. Used on logout.
    pub async fn clear(&self) -> Result<()> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)?;
            conn.execute("DELETE FROM kv", [])?;
            Ok::<_, ClankDashError>(())
        })
        .await
        .map_err(|e| ClankDashError::Storage(format!("Task join error: {}", e)))??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Helper function to create a test store in a temporary directory
    pub async fn setup_test_store() -> (TempDir, Store) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        let db_path_str = db_path.to_str().expect("Invalid path").to_string();

        init_store(&db_path_str)
            .await
            .expect("Failed to initialize store");

        let store = Store::new(db_path_str);
        (temp_dir, store)
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (_temp_dir, store) = setup_test_store().await;

        assert!(store.get("missing").await.unwrap().is_none());

        store.set(keys::LANG, "de").await.unwrap();
        assert_eq!(store.get(keys::LANG).await.unwrap(), Some("de".to_string()));

        // overwrite
        store.set(keys::LANG, "en").await.unwrap();
        assert_eq!(store.get(keys::LANG).await.unwrap(), Some("en".to_string()));
    }

    #[tokio::test]
    async fn test_remove() {
        let (_temp_dir, store) = setup_test_store().await;

        store.set(keys::STATE, "abc").await.unwrap();
        store.remove(keys::STATE).await.unwrap();
        assert!(store.get(keys::STATE).await.unwrap().is_none());

        // removing a missing key should not error
        assert!(store.remove("missing").await.is_ok());
    }

    #[tokio::test]
    async fn test_retain_only_keeps_allow_list() {
        let (_temp_dir, store) = setup_test_store().await;

        store.set(keys::DARK, "true").await.unwrap();
        store.set(keys::GUILDS, "[]").await.unwrap();
        store.set(keys::GUILD_ROLES, "[]").await.unwrap();
        store.set(keys::GUILD_ROLES_TIMESTAMP, "123").await.unwrap();
        store.set(keys::ACTIVE_GUILD, "{}").await.unwrap();

        store.retain_only(IMPORTANT_KEYS).await.unwrap();

        assert!(store.get(keys::DARK).await.unwrap().is_some());
        assert!(store.get(keys::GUILDS).await.unwrap().is_some());
        assert!(store.get(keys::GUILD_ROLES).await.unwrap().is_none());
        assert!(store
            .get(keys::GUILD_ROLES_TIMESTAMP)
            .await
            .unwrap()
            .is_none());
        // active_guild was not in the allow-list, so it is gone too
        assert!(store.get(keys::ACTIVE_GUILD).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear() {
        let (_temp_dir, store) = setup_test_store().await;

        store.set(keys::STATE, "abc").await.unwrap();
        store.set(keys::DARK, "true").await.unwrap();

        store.clear().await.unwrap();

        assert!(store.get(keys::STATE).await.unwrap().is_none());
        assert!(store.get(keys::DARK).await.unwrap().is_none());
    }
}
