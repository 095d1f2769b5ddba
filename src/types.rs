//! Discord-facing data model.
//!
//! Shapes returned by the dashboard backend, plus the CDN/formatting helpers
//! the presentation layer needs.

use serde::{Deserialize, Serialize};

/// A Discord guild as returned by the guild list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Guild {
    pub id: String,
    pub name: String,
    /// Icon hash; animated icons start with `a_`
    #[serde(default)]
    pub icon: Option<String>,
    /// Whether the authenticated user owns this guild
    #[serde(default)]
    pub owner: bool,
    /// Permission bitmask as a decimal string (may exceed 2^53)
    #[serde(default)]
    pub permissions: String,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub approximate_member_count: Option<u64>,
    #[serde(default)]
    pub approximate_presence_count: Option<u64>,
    /// Derived CDN icon URL, filled in after fetching
    #[serde(default)]
    pub image_url: Option<String>,
}

impl Guild {
    /// CDN URL for the guild icon, or `None` if the guild has no icon.
    pub fn icon_url(&self) -> Option<String> {
        self.icon.as_ref().map(|icon| {
            let ext = if icon.starts_with("a_") { "gif" } else { "png" };
            format!("https://cdn.discordapp.com/icons/{}/{}.{}", self.id, icon, ext)
        })
    }
}

/// A guild role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Role {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: u32,
    #[serde(default)]
    pub position: i32,
}

/// A guild channel. `kind` uses Discord's numeric channel types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Channel {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: u8,
}

impl Channel {
    pub fn is_text(&self) -> bool {
        self.kind == 0
    }

    /// Voice and stage channels both count as voice.
    pub fn is_voice(&self) -> bool {
        self.kind == 2 || self.kind == 13
    }
}

/// Channel filter requested by a consumer. Applied in memory after the
/// channel list is fetched or loaded from cache; the tag is also stored as
/// the cache variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WishType {
    #[default]
    All,
    Text,
    Voice,
    Forum,
}

impl WishType {
    pub fn as_str(self) -> &'static str {
        match self {
            WishType::All => "ALL",
            WishType::Text => "TEXT",
            WishType::Voice => "VOICE",
            WishType::Forum => "FORUM",
        }
    }

    /// Whether a channel passes this filter.
    pub fn matches(self, channel: &Channel) -> bool {
        match self {
            WishType::All => true,
            WishType::Text => channel.kind == 0,
            WishType::Voice => channel.kind == 2,
            WishType::Forum => channel.kind == 15,
        }
    }
}

/// A guild emoji: either a custom emoji object or a plain unicode string
/// (the placeholder set uses the latter).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Emoji {
    Custom {
        id: String,
        name: String,
        #[serde(default)]
        animated: bool,
    },
    Unicode(String),
}

/// Non-empty placeholder set used when a guild has no custom emojis.
pub fn default_emojis() -> Vec<Emoji> {
    ["🎉", "🎁", "⭐", "💎", "🔥", "❤️", "👍", "🚀"]
        .iter()
        .map(|e| Emoji::Unicode((*e).to_string()))
        .collect()
}

/// CDN URL for a custom emoji given its id.
pub fn emoji_cdn_url_from_id(id: &str, animated: bool) -> String {
    format!(
        "https://cdn.discordapp.com/emojis/{}.{}",
        id,
        if animated { "gif" } else { "png" }
    )
}

/// Resolve Discord emoji markup (`<:name:id>` or `<a:name:id>`) to its CDN
/// URL. Anything that is not custom-emoji markup is returned unchanged.
pub fn emoji_cdn_url(emoji: &str) -> String {
    let inner = match emoji.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
        Some(inner) => inner,
        None => return emoji.to_string(),
    };

    let (animated, rest) = match inner.strip_prefix("a:") {
        Some(rest) => (true, rest),
        None => match inner.strip_prefix(':') {
            Some(rest) => (false, rest),
            None => return emoji.to_string(),
        },
    };

    let (name, id) = match rest.split_once(':') {
        Some(parts) => parts,
        None => return emoji.to_string(),
    };
    if name.is_empty() || id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
        return emoji.to_string();
    }

    emoji_cdn_url_from_id(id, animated)
}

/// The authenticated Discord user profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscordUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub discriminator: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub global_name: Option<String>,
}

/// Giveaway embed color: the backend sends either a decimal number or a
/// `#rrggbb` string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ColorCode {
    Num(u32),
    Hex(String),
}

impl ColorCode {
    /// Normalize to a `#rrggbb` string.
    pub fn to_hex(&self) -> String {
        match self {
            ColorCode::Num(n) => format!("#{:06x}", n),
            ColorCode::Hex(s) => s.clone(),
        }
    }
}

/// Giveaway/event embed configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbedConfig {
    #[serde(default)]
    pub color_code: Option<ColorCode>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub banner_url: Option<String>,
    #[serde(default)]
    pub emoji_reaction: Option<String>,
}

impl EmbedConfig {
    /// Rewrite a numeric color code as its `#rrggbb` form.
    pub fn normalize_color(&mut self) {
        if let Some(color) = &self.color_code {
            self.color_code = Some(ColorCode::Hex(color.to_hex()));
        }
    }
}

/// Event config endpoint response: the embed config plus the VIP flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedConfigRaw {
    pub config: EmbedConfig,
    #[serde(default)]
    pub has_vip: Option<bool>,
}

/// Security log thread configuration for a guild.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SecurityLogs {
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub guild_thread_id: Option<String>,
    #[serde(default)]
    pub bot_thread_id: Option<String>,
    #[serde(default)]
    pub channel_roles_thread_id: Option<String>,
    #[serde(default)]
    pub message_thread_id: Option<String>,
    #[serde(default)]
    pub emoji_thread_id: Option<String>,
    #[serde(default)]
    pub join_leave_thread_id: Option<String>,
    #[serde(default)]
    pub unban_thread_id: Option<String>,
}

/// A pending unban request filed through the bot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnbanRequest {
    pub user_id: String,
    pub user_name: String,
    #[serde(default)]
    pub user_avatar: Option<String>,
    #[serde(default)]
    pub excuse: Option<String>,
    #[serde(default)]
    pub status: u8,
    #[serde(default)]
    pub updated_date: Option<String>,
}

/// One entry of the bot-usage slider on the dashboard landing area.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GuildUsage {
    pub guild_name: String,
    #[serde(default)]
    pub guild_invite: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub member_count: Option<u64>,
}

/// Format a count with dot thousands separators (`28000` → `"28.000"`).
pub fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    let offset = digits.len() % 3;
    for (i, c) in digits.chars().enumerate() {
        if i != 0 && (i + 3 - offset) % 3 == 0 {
            out.push('.');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guild_icon_url() {
        let mut guild = Guild {
            id: "123".to_string(),
            name: "Test".to_string(),
            icon: Some("abcdef".to_string()),
            owner: false,
            permissions: "8".to_string(),
            features: vec![],
            approximate_member_count: None,
            approximate_presence_count: None,
            image_url: None,
        };
        assert_eq!(
            guild.icon_url().unwrap(),
            "https://cdn.discordapp.com/icons/123/abcdef.png"
        );

        guild.icon = Some("a_abcdef".to_string());
        assert_eq!(
            guild.icon_url().unwrap(),
            "https://cdn.discordapp.com/icons/123/a_abcdef.gif"
        );

        guild.icon = None;
        assert!(guild.icon_url().is_none());
    }

    #[test]
    fn test_emoji_cdn_url() {
        assert_eq!(
            emoji_cdn_url("<:present:873708141085343764>"),
            "https://cdn.discordapp.com/emojis/873708141085343764.png"
        );
        assert_eq!(
            emoji_cdn_url("<a:present:873708141085343764>"),
            "https://cdn.discordapp.com/emojis/873708141085343764.gif"
        );

        // non-markup input passes through unchanged
        assert_eq!(emoji_cdn_url("🎉"), "🎉");
        assert_eq!(emoji_cdn_url("<:broken>"), "<:broken>");
        assert_eq!(emoji_cdn_url("<:name:notdigits>"), "<:name:notdigits>");
    }

    #[test]
    fn test_emoji_untagged_deserialization() {
        let custom: Emoji = serde_json::from_str(r#"{"id":"1","name":"pog","animated":true}"#).unwrap();
        assert_eq!(
            custom,
            Emoji::Custom {
                id: "1".to_string(),
                name: "pog".to_string(),
                animated: true
            }
        );

        let unicode: Emoji = serde_json::from_str(r#""🎉""#).unwrap();
        assert_eq!(unicode, Emoji::Unicode("🎉".to_string()));
    }

    #[test]
    fn test_default_emojis_not_empty() {
        assert!(!default_emojis().is_empty());
    }

    #[test]
    fn test_color_code_normalization() {
        assert_eq!(ColorCode::Num(0x706fd3).to_hex(), "#706fd3");
        assert_eq!(ColorCode::Num(0xff).to_hex(), "#0000ff");
        assert_eq!(ColorCode::Hex("#123456".to_string()).to_hex(), "#123456");

        let mut config: EmbedConfig =
            serde_json::from_str(r#"{"color_code": 7368659, "thumbnail_url": null}"#).unwrap();
        config.normalize_color();
        assert_eq!(
            config.color_code,
            Some(ColorCode::Hex("#706fd3".to_string()))
        );
    }

    #[test]
    fn test_wish_type_matches() {
        let text = Channel { id: "1".to_string(), name: "general".to_string(), kind: 0 };
        let voice = Channel { id: "2".to_string(), name: "talk".to_string(), kind: 2 };
        let forum = Channel { id: "3".to_string(), name: "help".to_string(), kind: 15 };

        assert!(WishType::All.matches(&text));
        assert!(WishType::All.matches(&voice));
        assert!(WishType::Text.matches(&text));
        assert!(!WishType::Text.matches(&voice));
        assert!(WishType::Voice.matches(&voice));
        assert!(WishType::Forum.matches(&forum));
        assert!(!WishType::Forum.matches(&text));
    }

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1000), "1.000");
        assert_eq!(format_count(28000), "28.000");
        assert_eq!(format_count(1234567), "1.234.567");
    }
}
