//! Dashboard backend REST client.
//!
//! Thin typed wrapper over the backend endpoints. Authentication is
//! session-cookie based, so the client carries a cookie store; no token ever
//! reaches this side. Failures surface as [`ClankDashError::Api`] with the
//! HTTP status (or `Network`, which classifies as status 0) and are mapped to
//! user-facing reasons by the caller.

use crate::error::{ClankDashError, Result};
use crate::tasks::TaskCompletionMap;
use crate::types::{
    Channel, DiscordUser, Emoji, EmbedConfigRaw, Guild, GuildUsage, Role, SecurityLogs,
    UnbanRequest,
};
use serde_json::json;

/// HTTP client for the dashboard backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_url: String,
}

impl ApiClient {
    /// Create a client for the given backend base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(api_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Check the response status, turning non-2xx into an API error that
    /// carries the status code.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        Err(ClankDashError::Api { status, message })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .http
            .get(format!("{}{}", self.api_url, path))
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn post_json(&self, path: &str, body: serde_json::Value) -> Result<()> {
        let response = self
            .http
            .post(format!("{}{}", self.api_url, path))
            .json(&body)
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    /// Register a freshly generated OAuth state value with the backend.
    pub async fn save_state(&self, state: &str) -> Result<()> {
        self.post_json("/auth/saveState", json!({ "state": state }))
            .await
    }

    /// Exchange the authorization code for a session cookie.
    pub async fn exchange_code(&self, code: &str, state: &str) -> Result<()> {
        self.post_json("/auth/discord", json!({ "code": code, "state": state }))
            .await
    }

    /// Fetch the authenticated user's profile.
    pub async fn get_profile(&self) -> Result<DiscordUser> {
        self.get_json("/auth/me").await
    }

    /// Invalidate the backend session.
    pub async fn logout(&self) -> Result<()> {
        self.post_json("/auth/logout", json!({})).await
    }

    /// List the guilds the authenticated user can manage.
    pub async fn get_guilds(&self) -> Result<Vec<Guild>> {
        self.get_json("/guilds").await
    }

    pub async fn get_guild_roles(&self, guild_id: &str) -> Result<Vec<Role>> {
        self.get_json(&format!("/guilds/{}/roles", guild_id)).await
    }

    pub async fn get_guild_channels(&self, guild_id: &str) -> Result<Vec<Channel>> {
        self.get_json(&format!("/guilds/{}/channels", guild_id))
            .await
    }

    pub async fn get_guild_emojis(&self, guild_id: &str) -> Result<Vec<Emoji>> {
        self.get_json(&format!("/guilds/{}/emojis", guild_id)).await
    }

    /// Giveaway embed configuration plus the guild's VIP flag.
    pub async fn get_event_config(&self, guild_id: &str) -> Result<EmbedConfigRaw> {
        self.get_json(&format!("/guilds/{}/events/config", guild_id))
            .await
    }

    pub async fn get_security_logs(&self, guild_id: &str) -> Result<SecurityLogs> {
        self.get_json(&format!("/guilds/{}/security/logs", guild_id))
            .await
    }

    pub async fn get_unban_requests(&self, guild_id: &str) -> Result<Vec<UnbanRequest>> {
        self.get_json(&format!("/guilds/{}/security/unban-requests", guild_id))
            .await
    }

    /// Most active guilds for the dashboard slider.
    pub async fn get_guild_usage(&self, limit: u32) -> Result<Vec<GuildUsage>> {
        self.get_json(&format!("/guilds/usage?limit={}", limit))
            .await
    }

    /// Per-module task completion report for a guild.
    pub async fn get_module_status(&self, guild_id: &str) -> Result<TaskCompletionMap> {
        self.get_json(&format!("/guilds/{}/modules/status", guild_id))
            .await
    }
}
