//! Shared session and guild context.
//!
//! The explicit context object every consumer works against: the selected
//! guild, the authenticated profile, the in-memory copies of the cached
//! resources, loading flags, the current route and the error display state.
//! Each resource operation follows the same shape: check preconditions, ask
//! the cache-or-fetch policy, classify failures into a redirect.

use crate::api::ApiClient;
use crate::auth;
use crate::cache::{
    now_millis, Cache, GIFT_CONFIG, GUILD_CHANNELS, GUILD_EMOJIS, GUILD_LIST, GUILD_ROLES,
    MODULE_STATUS, SECURITY_LOGS, UNBAN_REQUESTS,
};
use crate::config::Config;
use crate::error::{ClankDashError, Result};
use crate::reason::{classify, CallSite, ErrorReason};
use crate::store::{init_store, keys, Store, IMPORTANT_KEYS};
use crate::tasks::{self, Task};
use crate::types::{
    default_emojis, Channel, ColorCode, DiscordUser, Emoji, EmbedConfig, Guild, GuildUsage, Role,
    SecurityLogs, UnbanRequest, WishType,
};
use std::time::Duration;
use tokio::sync::watch;

/// Client-side navigation target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Landing,
    Dashboard,
    ErrorSimple,
}

/// Error display state, overwritten on each new error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    pub reason: ErrorReason,
    pub title_key: String,
    pub desc_key: String,
}

/// Shared session state and resource coordinator.
pub struct Session {
    config: Config,
    api: ApiClient,
    cache: Cache,

    pub active_guild: Option<Guild>,
    pub profile: Option<DiscordUser>,
    pub servers: Vec<Guild>,
    pub guild_roles: Vec<Role>,
    pub guild_channels: Vec<Channel>,
    pub guild_emojis: Vec<Emoji>,
    pub embed_config: EmbedConfig,
    pub has_vip: bool,
    pub security_logs: SecurityLogs,
    pub unban_requests: Vec<UnbanRequest>,
    pub guild_usage: Vec<GuildUsage>,
    pub tasks: Vec<Task>,

    pub is_loading: bool,
    pub is_fetching: bool,
    pub is_emojis_loading: bool,

    pub error: Option<ErrorContext>,
    pub route: Route,

    allow_data_fetch: watch::Sender<bool>,
}

/// Embed defaults shown before the guild config is loaded.
fn default_embed_config() -> EmbedConfig {
    EmbedConfig {
        color_code: Some(ColorCode::Hex("#706fd3".to_string())),
        thumbnail_url: Some("https://i.imgur.com/8eajG1v.gif".to_string()),
        banner_url: None,
        emoji_reaction: None,
    }
}

impl Session {
    /// Initialize the store and build a session against the configured backend.
    pub async fn connect(config: Config) -> Result<Self> {
        init_store(&config.store_path).await?;
        let api = ApiClient::new(&config.api_url)?;
        let store = Store::new(config.store_path.clone());
        Ok(Self::with_parts(config, api, Cache::new(store)))
    }

    /// Build a session from pre-constructed parts (used by tests).
    pub fn with_parts(config: Config, api: ApiClient, cache: Cache) -> Self {
        let (allow_data_fetch, _) = watch::channel(false);
        Self {
            config,
            api,
            cache,
            active_guild: None,
            profile: None,
            servers: Vec::new(),
            guild_roles: Vec::new(),
            guild_channels: Vec::new(),
            guild_emojis: Vec::new(),
            embed_config: default_embed_config(),
            has_vip: false,
            security_logs: SecurityLogs::default(),
            unban_requests: Vec::new(),
            guild_usage: Vec::new(),
            tasks: tasks::default_tasks(),
            is_loading: true,
            is_fetching: false,
            is_emojis_loading: true,
            error: None,
            route: Route::Landing,
            allow_data_fetch,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn store(&self) -> &Store {
        self.cache.store()
    }

    /// Subscribe to the "data fetching is now allowed" signal.
    pub fn subscribe_data_fetch(&self) -> watch::Receiver<bool> {
        self.allow_data_fetch.subscribe()
    }

    /// Tell downstream consumers that guild-scoped fetches may proceed.
    pub fn signal_data_fetch(&self) {
        let _ = self.allow_data_fetch.send(true);
    }

    /// Restore the active guild persisted by a previous run.
    ///
    /// An unreadable record is dropped rather than propagated.
    pub async fn restore(&mut self) -> Result<()> {
        if let Some(raw) = self.store().get(keys::ACTIVE_GUILD).await? {
            match serde_json::from_str::<Guild>(&raw) {
                Ok(guild) => self.active_guild = Some(guild),
                Err(_) => self.store().remove(keys::ACTIVE_GUILD).await?,
            }
        }
        Ok(())
    }

    /// Record an error display and navigate to the generic error page.
    ///
    /// Every reason except Unknown/Offline invalidates the selected guild,
    /// forcing re-selection.
    pub async fn redirect_login_error(&mut self, reason: ErrorReason) -> Result<()> {
        self.error = Some(ErrorContext {
            reason,
            title_key: reason.title_key(),
            desc_key: reason.desc_key(),
        });

        if reason.clears_guild() {
            self.store().remove(keys::ACTIVE_GUILD).await?;
            self.active_guild = None;
        }

        self.route = Route::ErrorSimple;
        Ok(())
    }

    /// Classify a guild-scoped fetch failure and redirect where the taxonomy
    /// demands it; anything else only clears the loading state.
    pub async fn handle_api_error(&mut self, err: &ClankDashError) -> Result<()> {
        let reason = classify(CallSite::Data, err.status());
        match reason {
            ErrorReason::Forbidden
            | ErrorReason::NoClank
            | ErrorReason::Requests
            | ErrorReason::Offline => self.redirect_login_error(reason).await?,
            _ => {}
        }
        self.is_loading = false;
        Ok(())
    }

    /// Failure mapping for the config-style fetches (event config, security
    /// logs, unban requests): rate limit, offline, or unknown.
    async fn redirect_fetch_error(&mut self, err: &ClankDashError) -> Result<()> {
        self.is_loading = false;
        self.is_fetching = false;
        let reason = match err.status() {
            429 => ErrorReason::Requests,
            0 => ErrorReason::Offline,
            _ => ErrorReason::Unknown,
        };
        self.redirect_login_error(reason).await
    }

    async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(self.config.settle_delay_ms)).await;
    }

    /// Fetch the manageable guild list (10 minute cache).
    ///
    /// Keeps only guilds where the user is admin or owner and the guild has
    /// the COMMUNITY feature, attaches icon URLs and sorts by name.
    pub async fn get_guilds(&mut self, no_cache: bool) -> Result<()> {
        self.is_fetching = true;

        let api = self.api.clone();
        let result = self
            .cache
            .resolve(&GUILD_LIST, None, no_cache, now_millis(), || async move {
                let guilds = api.get_guilds().await?;
                Ok(prepare_guilds(guilds))
            })
            .await;

        match result {
            Ok(outcome) => {
                if let Some(servers) = outcome.into_value() {
                    self.servers = servers;
                }
                self.is_fetching = false;
                if self.active_guild.is_none() {
                    self.is_loading = false;
                }
                Ok(())
            }
            Err(err) => {
                self.is_fetching = false;
                match err.status() {
                    429 => self.redirect_login_error(ErrorReason::Requests).await?,
                    // 401 from the guild list is noise during login handoff
                    401 => {}
                    _ => self.redirect_login_error(ErrorReason::Expired).await?,
                }
                Ok(())
            }
        }
    }

    /// Fetch the active guild's roles (5 minute cache).
    pub async fn get_guild_roles(&mut self, no_cache: bool) -> Result<()> {
        let guild_id = match &self.active_guild {
            Some(guild) if !self.is_fetching => guild.id.clone(),
            _ => return Ok(()),
        };
        self.is_fetching = true;

        let api = self.api.clone();
        let result = self
            .cache
            .resolve(&GUILD_ROLES, None, no_cache, now_millis(), || async move {
                api.get_guild_roles(&guild_id).await
            })
            .await;

        self.is_fetching = false;
        match result {
            Ok(outcome) => {
                if let Some(roles) = outcome.into_value() {
                    self.guild_roles = roles;
                }
                Ok(())
            }
            Err(err) => self.handle_api_error(&err).await,
        }
    }

    /// Fetch the active guild's channels (5 minute cache).
    ///
    /// The full list is cached with `wish_type` as the variant tag; the type
    /// filter is applied in memory.
    pub async fn get_guild_channels(&mut self, no_cache: bool, wish_type: WishType) -> Result<()> {
        let guild_id = match &self.active_guild {
            Some(guild) => guild.id.clone(),
            None => return Ok(()),
        };
        self.is_fetching = true;

        let api = self.api.clone();
        let result = self
            .cache
            .resolve(
                &GUILD_CHANNELS,
                Some(wish_type.as_str()),
                no_cache,
                now_millis(),
                || async move { api.get_guild_channels(&guild_id).await },
            )
            .await;

        self.is_fetching = false;
        match result {
            Ok(outcome) => {
                if let Some(channels) = outcome.into_value() {
                    self.guild_channels = channels
                        .into_iter()
                        .filter(|channel| wish_type.matches(channel))
                        .collect();
                }
                self.is_loading = false;
                Ok(())
            }
            Err(err) => self.handle_api_error(&err).await,
        }
    }

    /// Fetch the active guild's emojis (5 minute cache).
    ///
    /// An empty emoji list is replaced with the placeholder set before it is
    /// cached, so consumers always have something to pick from.
    pub async fn get_guild_emojis(&mut self, no_cache: bool) -> Result<()> {
        let guild_id = match &self.active_guild {
            Some(guild) => guild.id.clone(),
            None => return Ok(()),
        };
        self.is_emojis_loading = true;

        let api = self.api.clone();
        let result = self
            .cache
            .resolve(&GUILD_EMOJIS, None, no_cache, now_millis(), || async move {
                let emojis = api.get_guild_emojis(&guild_id).await?;
                Ok(if emojis.is_empty() {
                    default_emojis()
                } else {
                    emojis
                })
            })
            .await;

        match result {
            Ok(outcome) => {
                if let Some(emojis) = outcome.into_value() {
                    self.guild_emojis = if emojis.is_empty() {
                        default_emojis()
                    } else {
                        emojis
                    };
                }
                self.is_emojis_loading = false;
                self.is_loading = false;
                Ok(())
            }
            Err(err) => {
                self.is_emojis_loading = false;
                let reason = match err.status() {
                    429 => ErrorReason::Requests,
                    401 => ErrorReason::NoClank,
                    _ => ErrorReason::Expired,
                };
                self.redirect_login_error(reason).await
            }
        }
    }

    /// Fetch the giveaway embed configuration (30 second cache), then the
    /// guild emojis. The emoji fetch starts only after the config resolved.
    pub async fn get_event_config(&mut self, no_cache: bool) -> Result<()> {
        let guild_id = match &self.active_guild {
            Some(guild) => guild.id.clone(),
            None => return Ok(()),
        };
        self.is_fetching = true;

        let api = self.api.clone();
        let result = self
            .cache
            .resolve(&GIFT_CONFIG, None, no_cache, now_millis(), || async move {
                api.get_event_config(&guild_id).await
            })
            .await;

        match result {
            Ok(outcome) => {
                if let Some(raw) = outcome.into_value() {
                    let mut config = raw.config;
                    config.normalize_color();
                    self.embed_config = config;
                    self.has_vip = raw.has_vip.unwrap_or(false);
                    self.store()
                        .set(keys::GUILD_VIP, &self.has_vip.to_string())
                        .await?;
                }
                self.is_loading = false;
                self.is_fetching = false;

                self.settle().await;
                self.get_guild_emojis(no_cache).await
            }
            Err(err) => self.redirect_fetch_error(&err).await,
        }
    }

    /// Fetch the security log configuration (30 second cache), optionally
    /// chaining into the unban requests once the logs resolved.
    pub async fn get_security_logs(&mut self, check_unban: bool, no_cache: bool) -> Result<()> {
        let guild_id = match &self.active_guild {
            Some(guild) => guild.id.clone(),
            None => return Ok(()),
        };
        self.is_fetching = true;

        let api = self.api.clone();
        let result = self
            .cache
            .resolve(
                &SECURITY_LOGS,
                Some("DEFAULT"),
                no_cache,
                now_millis(),
                || async move { api.get_security_logs(&guild_id).await },
            )
            .await;

        match result {
            Ok(outcome) => {
                if let Some(logs) = outcome.into_value() {
                    self.security_logs = logs;
                }

                if check_unban {
                    self.settle().await;
                    self.get_unban_requests(no_cache).await
                } else {
                    self.is_loading = false;
                    self.is_fetching = false;
                    Ok(())
                }
            }
            Err(err) => self.redirect_fetch_error(&err).await,
        }
    }

    /// Fetch the pending unban requests (15 second cache).
    pub async fn get_unban_requests(&mut self, no_cache: bool) -> Result<()> {
        let guild_id = match &self.active_guild {
            Some(guild) => guild.id.clone(),
            None => return Ok(()),
        };

        let api = self.api.clone();
        let result = self
            .cache
            .resolve(
                &UNBAN_REQUESTS,
                None,
                no_cache,
                now_millis(),
                || async move { api.get_unban_requests(&guild_id).await },
            )
            .await;

        match result {
            Ok(outcome) => {
                if let Some(requests) = outcome.into_value() {
                    self.unban_requests = requests;
                }
                self.is_loading = false;
                self.is_fetching = false;
                Ok(())
            }
            Err(err) => self.redirect_fetch_error(&err).await,
        }
    }

    /// Fetch the dashboard data: the bot-usage slider, then (once that
    /// resolved) the module status merged into the task list.
    ///
    /// The first load after login always bypasses the module-status cache;
    /// the `first_login` marker is consumed after one successful merge.
    pub async fn get_server_data(&mut self, no_cache: bool) -> Result<()> {
        let guild_id = match &self.active_guild {
            Some(guild) => guild.id.clone(),
            None => return Ok(()),
        };

        let first_login = self.store().get(keys::FIRST_LOGIN).await?.is_some();

        match self.api.get_guild_usage(100).await {
            Ok(usage) => self.guild_usage = usage,
            Err(err) => return self.handle_api_error(&err).await,
        }

        self.settle().await;

        let api = self.api.clone();
        let result = self
            .cache
            .resolve(
                &MODULE_STATUS,
                None,
                first_login || no_cache,
                now_millis(),
                || async move { api.get_module_status(&guild_id).await },
            )
            .await;

        match result {
            Ok(outcome) => {
                if let Some(report) = outcome.into_value() {
                    tasks::merge_completion(&mut self.tasks, &report);
                }
                self.is_loading = false;
                if first_login {
                    self.store().remove(keys::FIRST_LOGIN).await?;
                }
                Ok(())
            }
            Err(err) => self.handle_api_error(&err).await,
        }
    }

    /// Select a guild as the management context, or deselect it when it is
    /// already active. Switching guilds drops all guild-scoped store entries
    /// while preserving login and preference keys.
    pub async fn select_guild(&mut self, guild: Guild) -> Result<()> {
        let reselected = self
            .active_guild
            .as_ref()
            .is_some_and(|active| active.id == guild.id);

        if reselected {
            self.store().retain_only(IMPORTANT_KEYS).await?;
            self.active_guild = None;
            self.route = Route::Dashboard;
            return Ok(());
        }

        self.store()
            .set(keys::ACTIVE_GUILD, &serde_json::to_string(&guild)?)
            .await?;
        let mut keep = IMPORTANT_KEYS.to_vec();
        keep.push(keys::ACTIVE_GUILD);
        self.store().retain_only(&keep).await?;

        self.active_guild = Some(guild);
        self.route = Route::Dashboard;
        self.signal_data_fetch();
        Ok(())
    }
}

/// Filter and decorate the raw guild list: admin-or-owner plus COMMUNITY,
/// icon URLs attached, sorted by name.
fn prepare_guilds(guilds: Vec<Guild>) -> Vec<Guild> {
    let mut servers: Vec<Guild> = guilds
        .into_iter()
        .filter(|guild| {
            (auth::is_admin(&guild.permissions) || guild.owner)
                && guild.features.iter().any(|f| f == "COMMUNITY")
        })
        .map(|mut guild| {
            guild.image_url = guild.icon_url();
            guild
        })
        .collect();
    servers.sort_by(|a, b| a.name.cmp(&b.name));
    servers
}
