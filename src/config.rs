//! Configuration management for clank-dash.
//!
//! This module handles loading and validating environment variables and application settings.

use crate::error::{ClankDashError, Result};
use std::env;

/// Discord OAuth2 authorization endpoint.
pub const AUTHORIZE_URL: &str = "https://discord.com/oauth2/authorize";

/// OAuth2 scopes requested during login.
pub const OAUTH_SCOPES: &str = "identify guilds guilds.members.read";

/// Configuration for the application, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the dashboard backend API
    pub api_url: String,
    /// Discord application client id
    pub client_id: String,
    /// OAuth2 redirect URL registered with Discord
    pub redirect_url: String,
    /// Path to the SQLite key-value store file
    pub store_path: String,
    /// Pacing delay between chained fetches, in milliseconds.
    ///
    /// Ordering of chained fetches is guaranteed by awaiting completion;
    /// this delay only spaces the requests out.
    pub settle_delay_ms: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This will attempt to load a .env file if present using dotenv,
    /// then read required environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required environment variable is missing or invalid.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use clank_dash::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load configuration");
    /// println!("API: {}", config.api_url);
    /// ```
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (ignore errors - it's optional)
        dotenv::dotenv().ok();

        let api_url = env::var("CLANK_API_URL").map_err(|_| {
            ClankDashError::Config(
                "Missing CLANK_API_URL environment variable. Set it in your environment or .env file (e.g., CLANK_API_URL=https://api.example.com).".to_string(),
            )
        })?;
        Self::validate_http_url(&api_url, "CLANK_API_URL")?;

        let client_id = env::var("CLANK_CLIENT_ID").map_err(|_| {
            ClankDashError::Config(
                "Missing CLANK_CLIENT_ID environment variable. Set it to your Discord application id.".to_string(),
            )
        })?;
        Self::validate_client_id(&client_id)?;

        let redirect_url = env::var("CLANK_REDIRECT_URL").map_err(|_| {
            ClankDashError::Config(
                "Missing CLANK_REDIRECT_URL environment variable. Set it to the OAuth2 redirect URL registered with Discord.".to_string(),
            )
        })?;
        Self::validate_http_url(&redirect_url, "CLANK_REDIRECT_URL")?;

        let store_path = Self::get_store_path()?;

        let settle_delay_ms = match env::var("CLANK_SETTLE_DELAY_MS") {
            Ok(value) => value.parse::<u64>().map_err(|_| {
                ClankDashError::Config(format!(
                    "Invalid CLANK_SETTLE_DELAY_MS: '{}'. Expected a number of milliseconds.",
                    value
                ))
            })?,
            Err(_) => 500,
        };

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            client_id,
            redirect_url,
            store_path,
            settle_delay_ms,
        })
    }

    /// Get the store path from environment or use default.
    fn get_store_path() -> Result<String> {
        match env::var("CLANK_STORE_PATH") {
            Ok(path) => Ok(path),
            Err(_) => {
                let mut path = env::current_dir().map_err(|e| {
                    ClankDashError::Config(format!("Failed to determine current directory: {}", e))
                })?;

                path.push("data");
                path.push("clank_dash.db");

                path.into_os_string().into_string().map_err(|os_str| {
                    ClankDashError::Config(format!(
                        "Store path contains invalid Unicode: {:?}",
                        os_str
                    ))
                })
            }
        }
    }

    /// Validate an http(s) URL using proper URL parsing.
    fn validate_http_url(url_str: &str, var_name: &str) -> Result<()> {
        use url::Url;

        let parsed_url = Url::parse(url_str).map_err(|e| {
            ClankDashError::Config(format!("Invalid {} '{}': {}", var_name, url_str, e))
        })?;

        let scheme = parsed_url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(ClankDashError::Config(format!(
                "{} must use http:// or https:// scheme, got: '{}'",
                var_name, scheme
            )));
        }

        if parsed_url.host_str().is_none() {
            return Err(ClankDashError::Config(format!(
                "{} must contain a valid host: '{}'",
                var_name, url_str
            )));
        }

        Ok(())
    }

    /// Validate that the client id looks like a Discord snowflake.
    fn validate_client_id(client_id: &str) -> Result<()> {
        if client_id.is_empty() || !client_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(ClankDashError::Config(format!(
                "Invalid CLANK_CLIENT_ID: '{}'. Expected a numeric Discord application id.",
                client_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_validate_http_url() {
        assert!(Config::validate_http_url("https://api.example.com", "X").is_ok());
        assert!(Config::validate_http_url("http://localhost:3000", "X").is_ok());

        assert!(Config::validate_http_url("ftp://example.com", "X").is_err());
        assert!(Config::validate_http_url("not a url", "X").is_err());
        assert!(Config::validate_http_url("", "X").is_err());
    }

    #[test]
    fn test_validate_client_id() {
        assert!(Config::validate_client_id("123456789012345678").is_ok());

        assert!(Config::validate_client_id("").is_err());
        assert!(Config::validate_client_id("abc123").is_err());
        assert!(Config::validate_client_id("12345 678").is_err());
    }

    #[test]
    fn test_get_store_path_with_env_var() {
        // Save original value (if any)
        let original_value = env::var("CLANK_STORE_PATH").ok();

        let custom_path = "/custom/path/to/store.db";
        env::set_var("CLANK_STORE_PATH", custom_path);

        let result = Config::get_store_path();
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), custom_path);

        // Restore original value
        match original_value {
            Some(val) => env::set_var("CLANK_STORE_PATH", val),
            None => env::remove_var("CLANK_STORE_PATH"),
        }
    }

    #[test]
    fn test_get_store_path_default() {
        let original_value = env::var("CLANK_STORE_PATH").ok();

        env::remove_var("CLANK_STORE_PATH");

        let result = Config::get_store_path();
        assert!(result.is_ok());

        let path = result.unwrap();
        assert!(path.contains("data"));
        assert!(path.contains("clank_dash.db"));

        match original_value {
            Some(val) => env::set_var("CLANK_STORE_PATH", val),
            None => {}
        }
    }
}
