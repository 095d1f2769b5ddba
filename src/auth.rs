//! OAuth2 login flow.
//!
//! Login happens in two legs. `begin_login` generates a random state token,
//! registers it with the backend and hands out the Discord authorize URL.
//! `authenticate` receives the code and state from the redirect, checks the
//! state against the stored token (expiry first, then a byte-exact compare)
//! and exchanges the code for a session cookie. The access token itself never
//! reaches this side.

use crate::cache::now_millis;
use crate::config::{Config, AUTHORIZE_URL, OAUTH_SCOPES};
use crate::error::{ClankDashError, Result};
use crate::reason::{classify, CallSite, ErrorReason};
use crate::session::{Route, Session};
use crate::store::keys;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::Rng;
use std::time::Duration;
use url::Url;

/// How long a generated state token stays valid.
const STATE_TTL_MS: i64 = 5 * 60 * 1000;

/// Discord's ADMINISTRATOR permission bit.
const ADMINISTRATOR: u128 = 0x8;

/// Whether a permission bitmask (decimal string) carries ADMINISTRATOR.
///
/// Permission values routinely exceed 2^53, so the string is parsed as a
/// 128-bit integer. Unparseable input counts as no permissions.
pub fn is_admin(permissions: &str) -> bool {
    permissions
        .parse::<u128>()
        .map(|bits| bits & ADMINISTRATOR != 0)
        .unwrap_or(false)
}

/// 32 random bytes, hex-encoded.
fn generate_state() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Build the Discord authorize URL for a state token.
///
/// If the base URL somehow already carries a `state` parameter it is
/// replaced, never duplicated.
fn authorize_url(config: &Config, state: &str) -> Result<Url> {
    let mut url = Url::parse(AUTHORIZE_URL)
        .map_err(|e| ClankDashError::Auth(format!("Invalid authorize URL: {}", e)))?;
    url.query_pairs_mut()
        .append_pair("client_id", &config.client_id)
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", &config.redirect_url)
        .append_pair("scope", OAUTH_SCOPES);
    set_state_param(&mut url, state);
    Ok(url)
}

/// Set the `state` query parameter, replacing any existing one.
fn set_state_param(url: &mut Url, state: &str) {
    let others: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "state")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut pairs = url.query_pairs_mut();
    pairs.clear();
    for (k, v) in &others {
        pairs.append_pair(k, v);
    }
    pairs.append_pair("state", state);
    drop(pairs);
}

/// Start the login flow: generate and persist a state token, register it
/// with the backend and return the authorize URL to open.
///
/// If the backend rejects the registration the stored token is removed
/// again and the session is redirected to the generic error page.
pub async fn begin_login(session: &mut Session) -> Result<Url> {
    let state = generate_state();

    session
        .store()
        .set(keys::STATE, &BASE64.encode(&state))
        .await?;
    session
        .store()
        .set(keys::STATE_EXPIRY, &(now_millis() + STATE_TTL_MS).to_string())
        .await?;

    if let Err(err) = session.api().save_state(&state).await {
        tracing::warn!(error = %err, "state registration rejected");
        session.store().remove(keys::STATE).await?;
        session.store().remove(keys::STATE_EXPIRY).await?;
        session.redirect_login_error(ErrorReason::Unknown).await?;
        return Err(err);
    }

    authorize_url(session.config(), &state)
}

/// Decode the stored state token back to its generated form.
async fn stored_state(session: &Session) -> Result<Option<String>> {
    let encoded = match session.store().get(keys::STATE).await? {
        Some(encoded) => encoded,
        None => return Ok(None),
    };
    let decoded = BASE64
        .decode(&encoded)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok());
    Ok(decoded)
}

/// Whether the stored state token is missing, unreadable or past expiry.
async fn state_expired(session: &Session) -> Result<bool> {
    let expiry = match session.store().get(keys::STATE_EXPIRY).await? {
        Some(raw) => raw,
        None => return Ok(true),
    };
    Ok(match expiry.parse::<i64>() {
        Ok(expiry) => now_millis() > expiry,
        Err(_) => true,
    })
}

/// Second leg of the login flow: verify the returned state and exchange the
/// authorization code for a session cookie.
///
/// Expiry is checked before the comparison, so a stale token exits as
/// `EXPIRED` even when the returned state would still match. On success the
/// state keys are consumed, the first-login marker is set and the session
/// navigates to the dashboard.
pub async fn authenticate(session: &mut Session, code: &str, state: &str) -> Result<()> {
    if state_expired(session).await? {
        session.store().remove(keys::STATE).await?;
        session.store().remove(keys::STATE_EXPIRY).await?;
        return session.redirect_login_error(ErrorReason::Expired).await;
    }

    if stored_state(session).await?.as_deref() != Some(state) {
        return session.redirect_login_error(ErrorReason::Invalid).await;
    }

    match session.api().exchange_code(code, state).await {
        Ok(()) => {
            session.store().remove(keys::STATE).await?;
            session.store().remove(keys::STATE_EXPIRY).await?;
            session.store().set(keys::FIRST_LOGIN, "true").await?;
            session.route = Route::Dashboard;
            Ok(())
        }
        Err(err) => {
            tracing::warn!(status = err.status(), "code exchange failed");
            let reason = classify(CallSite::Auth, err.status());
            session.redirect_login_error(reason).await
        }
    }
}

/// Fetch the authenticated profile and, on success, kick off the post-login
/// sequence: guild list first, then the signal that guild-scoped data may be
/// fetched.
///
/// Any profile failure invalidates the session: logout runs first, then the
/// error is classified (401 exits as `EXPIRED`).
pub async fn fetch_profile(session: &mut Session) -> Result<()> {
    match session.api().get_profile().await {
        Ok(profile) => {
            session.profile = Some(profile);
            session.get_guilds(false).await?;

            tokio::time::sleep(Duration::from_millis(session.config().settle_delay_ms)).await;
            session.signal_data_fetch();
            Ok(())
        }
        Err(err) => {
            let reason = classify(CallSite::Profile, err.status());
            logout(session).await?;
            session.redirect_login_error(reason).await
        }
    }
}

/// End the session: invalidate the backend cookie, then drop all local state
/// regardless of whether the backend call succeeded.
pub async fn logout(session: &mut Session) -> Result<()> {
    let result = session.api().logout().await;

    session.store().clear().await?;
    session.profile = None;
    session.active_guild = None;
    session.route = Route::Landing;

    if let Err(err) = result {
        tracing::warn!(status = err.status(), "logout call failed");
        let reason = classify(CallSite::Auth, err.status());
        session.redirect_login_error(reason).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiClient;
    use crate::cache::Cache;
    use crate::store::{init_store, Store};
    use tempfile::TempDir;

    async fn setup_session(api_url: &str) -> (TempDir, Session) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        let db_path_str = db_path.to_str().expect("Invalid path").to_string();

        init_store(&db_path_str)
            .await
            .expect("Failed to initialize store");

        let config = Config {
            api_url: api_url.to_string(),
            client_id: "123456789012345678".to_string(),
            redirect_url: "https://dash.example.com/callback".to_string(),
            store_path: db_path_str.clone(),
            settle_delay_ms: 0,
        };
        let api = ApiClient::new(api_url).unwrap();
        let session = Session::with_parts(config, api, Cache::new(Store::new(db_path_str)));
        (temp_dir, session)
    }

    fn reason_of(session: &Session) -> ErrorReason {
        session.error.as_ref().expect("no error recorded").reason
    }

    #[test]
    fn test_is_admin() {
        assert!(is_admin("8"));
        assert!(is_admin("9"));
        // admin bit inside a mask well beyond 2^53
        assert!(is_admin(&((1u128 << 60) + 8).to_string()));

        assert!(!is_admin("0"));
        assert!(!is_admin("4"));
        assert!(!is_admin(&(1u128 << 60).to_string()));
        assert!(!is_admin(""));
        assert!(!is_admin("-8"));
        assert!(!is_admin("not a number"));
    }

    #[test]
    fn test_generated_state_shape() {
        let a = generate_state();
        let b = generate_state();

        // 32 bytes hex-encoded, and two draws never collide
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_authorize_url_carries_single_state_param() {
        let config = Config {
            api_url: "https://api.example.com".to_string(),
            client_id: "123456789012345678".to_string(),
            redirect_url: "https://dash.example.com/callback".to_string(),
            store_path: "unused".to_string(),
            settle_delay_ms: 0,
        };

        let url = authorize_url(&config, "tok123").unwrap();
        let states: Vec<String> = url
            .query_pairs()
            .filter(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .collect();
        assert_eq!(states, vec!["tok123"]);

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("client_id".to_string(), "123456789012345678".to_string())));
        assert!(pairs.contains(&("response_type".to_string(), "code".to_string())));
        assert!(pairs.contains(&("scope".to_string(), OAUTH_SCOPES.to_string())));
    }

    #[test]
    fn test_set_state_param_replaces_existing() {
        let mut url = Url::parse("https://example.com/?a=1&state=old&b=2").unwrap();
        set_state_param(&mut url, "new");

        let states: Vec<String> = url
            .query_pairs()
            .filter(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .collect();
        assert_eq!(states, vec!["new"]);
        assert!(url.query_pairs().any(|(k, v)| k == "a" && v == "1"));
        assert!(url.query_pairs().any(|(k, v)| k == "b" && v == "2"));
    }

    #[tokio::test]
    async fn test_begin_login_persists_state_and_builds_url() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/saveState")
            .with_status(200)
            .create_async()
            .await;

        let (_tmp, mut session) = setup_session(&server.url()).await;
        let url = begin_login(&mut session).await.unwrap();

        // the URL state matches the decoded stored token
        let url_state = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert_eq!(stored_state(&session).await.unwrap().as_deref(), Some(url_state.as_str()));

        // expiry sits about five minutes out
        let expiry: i64 = session
            .store()
            .get(keys::STATE_EXPIRY)
            .await
            .unwrap()
            .unwrap()
            .parse()
            .unwrap();
        let delta = expiry - now_millis();
        assert!(delta > STATE_TTL_MS - 10_000 && delta <= STATE_TTL_MS);
    }

    #[tokio::test]
    async fn test_begin_login_rolls_back_on_rejected_registration() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/saveState")
            .with_status(500)
            .create_async()
            .await;

        let (_tmp, mut session) = setup_session(&server.url()).await;
        assert!(begin_login(&mut session).await.is_err());

        assert!(session.store().get(keys::STATE).await.unwrap().is_none());
        assert!(session.store().get(keys::STATE_EXPIRY).await.unwrap().is_none());
        assert_eq!(reason_of(&session), ErrorReason::Unknown);
    }

    #[tokio::test]
    async fn test_authenticate_happy_path() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/saveState")
            .with_status(200)
            .create_async()
            .await;
        server
            .mock("POST", "/auth/discord")
            .with_status(200)
            .create_async()
            .await;

        let (_tmp, mut session) = setup_session(&server.url()).await;
        let url = begin_login(&mut session).await.unwrap();
        let state = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();

        authenticate(&mut session, "the-code", &state).await.unwrap();

        assert_eq!(session.route, Route::Dashboard);
        assert!(session.error.is_none());
        // state consumed, first-login marker set
        assert!(session.store().get(keys::STATE).await.unwrap().is_none());
        assert!(session.store().get(keys::STATE_EXPIRY).await.unwrap().is_none());
        assert_eq!(
            session.store().get(keys::FIRST_LOGIN).await.unwrap().as_deref(),
            Some("true")
        );
    }

    #[tokio::test]
    async fn test_authenticate_rejects_mutated_state() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/saveState")
            .with_status(200)
            .create_async()
            .await;
        let exchange = server
            .mock("POST", "/auth/discord")
            .expect(0)
            .create_async()
            .await;

        let (_tmp, mut session) = setup_session(&server.url()).await;
        let url = begin_login(&mut session).await.unwrap();
        let state = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();

        // flip one hex digit
        let mut mutated: Vec<char> = state.chars().collect();
        mutated[0] = if mutated[0] == '0' { '1' } else { '0' };
        let mutated: String = mutated.into_iter().collect();

        authenticate(&mut session, "the-code", &mutated).await.unwrap();

        assert_eq!(reason_of(&session), ErrorReason::Invalid);
        assert_eq!(session.route, Route::ErrorSimple);
        exchange.assert_async().await;
    }

    #[tokio::test]
    async fn test_expired_state_short_circuits_before_comparison() {
        let server = mockito::Server::new_async().await;
        let (_tmp, mut session) = setup_session(&server.url()).await;

        // a token that would match, but with an expiry in the past
        session
            .store()
            .set(keys::STATE, &BASE64.encode("matching-state"))
            .await
            .unwrap();
        session
            .store()
            .set(keys::STATE_EXPIRY, &(now_millis() - 1_000).to_string())
            .await
            .unwrap();

        authenticate(&mut session, "the-code", "matching-state")
            .await
            .unwrap();

        assert_eq!(reason_of(&session), ErrorReason::Expired);
        assert!(session.store().get(keys::STATE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rate_limited_exchange_exits_blocked() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/saveState")
            .with_status(200)
            .create_async()
            .await;
        server
            .mock("POST", "/auth/discord")
            .with_status(429)
            .create_async()
            .await;

        let (_tmp, mut session) = setup_session(&server.url()).await;
        let url = begin_login(&mut session).await.unwrap();
        let state = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();

        authenticate(&mut session, "the-code", &state).await.unwrap();

        assert_eq!(reason_of(&session), ErrorReason::Blocked);
        assert_ne!(session.route, Route::Dashboard);
        // no session established, no first-login marker
        assert!(session.store().get(keys::FIRST_LOGIN).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_profile_success_chains_guilds_and_signal() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/auth/me")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"42","username":"clank"}"#)
            .create_async()
            .await;
        let guilds = server
            .mock("GET", "/guilds")
            .with_status(200)
            .with_body("[]")
            .expect(1)
            .create_async()
            .await;

        let (_tmp, mut session) = setup_session(&server.url()).await;
        let mut watcher = session.subscribe_data_fetch();

        fetch_profile(&mut session).await.unwrap();

        assert_eq!(session.profile.as_ref().unwrap().username, "clank");
        assert!(*watcher.borrow_and_update());
        guilds.assert_async().await;
    }

    #[tokio::test]
    async fn test_profile_401_logs_out_and_exits_expired() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/auth/me")
            .with_status(401)
            .create_async()
            .await;
        server
            .mock("POST", "/auth/logout")
            .with_status(200)
            .create_async()
            .await;

        let (_tmp, mut session) = setup_session(&server.url()).await;
        session.store().set(keys::DARK, "true").await.unwrap();

        fetch_profile(&mut session).await.unwrap();

        assert_eq!(reason_of(&session), ErrorReason::Expired);
        assert!(session.profile.is_none());
        // logout cleared the local store
        assert!(session.store().get(keys::DARK).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_logout_clears_local_state_even_when_backend_fails() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/logout")
            .with_status(500)
            .create_async()
            .await;

        let (_tmp, mut session) = setup_session(&server.url()).await;
        session.store().set(keys::STATE, "abc").await.unwrap();
        session.route = Route::Dashboard;

        logout(&mut session).await.unwrap();

        assert!(session.store().get(keys::STATE).await.unwrap().is_none());
        assert!(session.profile.is_none());
        assert_eq!(reason_of(&session), ErrorReason::Unknown);
    }
}
