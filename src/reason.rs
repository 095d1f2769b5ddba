//! Classification of backend failures into user-facing error reasons.
//!
//! A failed HTTP call is mapped, by status code and call-site context, to one
//! reason from a small taxonomy. The reason selects two localized message
//! keys and decides whether the active guild context must be dropped. The
//! mapping is looked up in fixed tables, never computed.

use std::fmt;

/// User-facing failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorReason {
    /// Bad or forged input (invalid code, state mismatch)
    Invalid,
    /// Session or state token timed out
    Expired,
    /// Rate-limited during authentication
    Blocked,
    /// Rate-limited during data fetch
    Requests,
    /// Permission denied
    Forbidden,
    /// No connectivity, the request never reached the server
    Offline,
    /// The bot is missing from the guild or the session is gone (data 401)
    NoClank,
    /// Anything uncategorized
    Unknown,
}

/// Where the failing call originated; 401 and 429 map differently per site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallSite {
    /// Code exchange, state registration, logout
    Auth,
    /// Authenticated profile fetch
    Profile,
    /// Guild-scoped resource fetch
    Data,
}

const AUTH_TABLE: &[(u16, ErrorReason)] = &[
    (400, ErrorReason::Invalid),
    (429, ErrorReason::Blocked),
];

const PROFILE_TABLE: &[(u16, ErrorReason)] = &[
    (401, ErrorReason::Expired),
    (429, ErrorReason::Requests),
];

const DATA_TABLE: &[(u16, ErrorReason)] = &[
    (400, ErrorReason::Invalid),
    (401, ErrorReason::NoClank),
    (403, ErrorReason::Forbidden),
    (429, ErrorReason::Requests),
    (0, ErrorReason::Offline),
];

/// Map an HTTP status code to an error reason for the given call site.
///
/// Unmapped statuses fall through to [`ErrorReason::Unknown`].
pub fn classify(site: CallSite, status: u16) -> ErrorReason {
    let table = match site {
        CallSite::Auth => AUTH_TABLE,
        CallSite::Profile => PROFILE_TABLE,
        CallSite::Data => DATA_TABLE,
    };
    table
        .iter()
        .find(|(code, _)| *code == status)
        .map(|(_, reason)| *reason)
        .unwrap_or(ErrorReason::Unknown)
}

impl ErrorReason {
    /// Uppercase tag used inside the localized message keys.
    fn tag(self) -> &'static str {
        match self {
            ErrorReason::Invalid => "INVALID",
            ErrorReason::Expired => "EXPIRED",
            ErrorReason::Blocked => "BLOCKED",
            ErrorReason::Requests => "REQUESTS",
            ErrorReason::Forbidden => "FORBIDDEN",
            ErrorReason::Offline => "OFFLINE",
            ErrorReason::NoClank => "NO_CLANK",
            ErrorReason::Unknown => "UNKNOWN",
        }
    }

    /// Localized title key for the error display page.
    pub fn title_key(self) -> String {
        match self {
            ErrorReason::Unknown | ErrorReason::Offline => format!("ERROR_{}_TITLE", self.tag()),
            _ => format!("ERROR_LOGIN_{}_TITLE", self.tag()),
        }
    }

    /// Localized description key for the error display page.
    pub fn desc_key(self) -> String {
        match self {
            ErrorReason::Unknown | ErrorReason::Offline => format!("ERROR_{}_DESC", self.tag()),
            _ => format!("ERROR_LOGIN_{}_DESC", self.tag()),
        }
    }

    /// Whether this reason invalidates the selected guild context.
    ///
    /// Everything except Unknown and Offline is treated as a session or
    /// authorization invalidation requiring guild re-selection.
    pub fn clears_guild(self) -> bool {
        !matches!(self, ErrorReason::Unknown | ErrorReason::Offline)
    }
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_context_mapping() {
        assert_eq!(classify(CallSite::Auth, 400), ErrorReason::Invalid);
        assert_eq!(classify(CallSite::Auth, 429), ErrorReason::Blocked);
        assert_eq!(classify(CallSite::Auth, 500), ErrorReason::Unknown);
        assert_eq!(classify(CallSite::Auth, 401), ErrorReason::Unknown);
    }

    #[test]
    fn test_profile_context_mapping() {
        assert_eq!(classify(CallSite::Profile, 401), ErrorReason::Expired);
        assert_eq!(classify(CallSite::Profile, 429), ErrorReason::Requests);
        assert_eq!(classify(CallSite::Profile, 503), ErrorReason::Unknown);
    }

    #[test]
    fn test_data_context_mapping() {
        assert_eq!(classify(CallSite::Data, 400), ErrorReason::Invalid);
        assert_eq!(classify(CallSite::Data, 401), ErrorReason::NoClank);
        assert_eq!(classify(CallSite::Data, 403), ErrorReason::Forbidden);
        assert_eq!(classify(CallSite::Data, 429), ErrorReason::Requests);
        assert_eq!(classify(CallSite::Data, 0), ErrorReason::Offline);
        assert_eq!(classify(CallSite::Data, 500), ErrorReason::Unknown);
    }

    #[test]
    fn test_message_keys() {
        assert_eq!(ErrorReason::Invalid.title_key(), "ERROR_LOGIN_INVALID_TITLE");
        assert_eq!(ErrorReason::Invalid.desc_key(), "ERROR_LOGIN_INVALID_DESC");
        assert_eq!(ErrorReason::NoClank.title_key(), "ERROR_LOGIN_NO_CLANK_TITLE");

        // Unknown and Offline use the generic keys, not the login ones
        assert_eq!(ErrorReason::Unknown.title_key(), "ERROR_UNKNOWN_TITLE");
        assert_eq!(ErrorReason::Offline.desc_key(), "ERROR_OFFLINE_DESC");
    }

    #[test]
    fn test_clears_guild() {
        assert!(ErrorReason::Invalid.clears_guild());
        assert!(ErrorReason::Expired.clears_guild());
        assert!(ErrorReason::Blocked.clears_guild());
        assert!(ErrorReason::Requests.clears_guild());
        assert!(ErrorReason::Forbidden.clears_guild());
        assert!(ErrorReason::NoClank.clears_guild());

        assert!(!ErrorReason::Unknown.clears_guild());
        assert!(!ErrorReason::Offline.clears_guild());
    }
}
