use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use teloxide::types::{ChatId, Recipient, UserId};
use thiserror::Error;

pub const BOT_TOKEN: &str = "BOT_TOKEN";
pub const API_SECRET: &str = "API_SECRET";
pub const REQUIRED_CHANNEL: &str = "REQUIRED_CHANNEL";
pub const ADMIN_IDS: &str = "ADMIN_IDS";
pub const BOT_USERNAME: &str = "BOT_USERNAME";
pub const LISTEN_ADDR: &str = "LISTEN_ADDR";
pub const PORT: &str = "PORT";

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
    #[error("invalid listen address {0:?}")]
    InvalidListenAddr(String),
}

/// Bot settings. Built once at startup and shared read-only afterwards.
#[derive(Clone)]
pub struct Config {
    pub bot_token: String,
    pub api_secret: String,
    /// Channel handle (`@news`) or numeric chat id.
    pub required_channel: String,
    pub admin_ids: HashSet<UserId>,
    pub bot_username: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bot_token", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .field("required_channel", &self.required_channel)
            .field("admin_ids", &self.admin_ids)
            .field("bot_username", &self.bot_username)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`. Blank values count as absent. Values
    /// are trimmed, except `API_SECRET`, which is compared byte for byte.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bot_token = read(BOT_TOKEN);
        let api_secret = lookup(API_SECRET).filter(|v| !v.trim().is_empty());
        let required_channel = read(REQUIRED_CHANNEL);

        let (bot_token, api_secret, required_channel) =
            match (bot_token, api_secret, required_channel) {
                (Some(t), Some(s), Some(c)) => (t, s, c),
                (t, s, c) => {
                    let missing = [(BOT_TOKEN, t), (API_SECRET, s), (REQUIRED_CHANNEL, c)]
                        .into_iter()
                        .filter(|(_, v)| v.is_none())
                        .map(|(k, _)| k)
                        .collect();
                    return Err(ConfigError::Missing(missing));
                }
            };

        let admin_ids = read(ADMIN_IDS)
            .map(|raw| parse_admin_ids(&raw))
            .unwrap_or_default();

        let bot_username = read(BOT_USERNAME).map(|name| name.trim_start_matches('@').to_string());

        Ok(Self {
            bot_token,
            api_secret,
            required_channel,
            admin_ids,
            bot_username,
        })
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.admin_ids.contains(&user_id)
    }

    /// Chat the membership lookup is addressed to.
    pub fn channel_recipient(&self) -> Recipient {
        match self.required_channel.parse::<i64>() {
            Ok(id) => Recipient::Id(ChatId(id)),
            Err(_) => Recipient::ChannelUsername(self.required_channel.clone()),
        }
    }

    /// Public link to the required channel, without the leading `@`.
    pub fn channel_link(&self) -> String {
        format!(
            "https://t.me/{}",
            self.required_channel.trim_start_matches('@')
        )
    }
}

/// Parses a comma-separated id list. Entries that are not numbers are dropped,
/// and so are negative numbers, since user ids are unsigned.
pub fn parse_admin_ids(raw: &str) -> HashSet<UserId> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<u64>().ok())
        .map(UserId)
        .collect()
}

/// HTTP server settings, loaded even when the bot itself is disabled.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = lookup(LISTEN_ADDR)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .or_else(|| {
                lookup(PORT)
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .map(|p| format!("0.0.0.0:{p}"))
            })
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());

        let listen_addr = raw
            .parse()
            .map_err(|_| ConfigError::InvalidListenAddr(raw.clone()))?;
        Ok(Self { listen_addr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn full_env() -> Vec<(&'static str, &'static str)> {
        vec![
            (BOT_TOKEN, "123:abc"),
            (API_SECRET, "s3cret"),
            (REQUIRED_CHANNEL, "@news"),
            (ADMIN_IDS, "1, 42"),
        ]
    }

    #[test]
    fn test_loads_all_settings() {
        let cfg = Config::from_lookup(lookup(&full_env())).unwrap();
        assert_eq!(cfg.bot_token, "123:abc");
        assert_eq!(cfg.api_secret, "s3cret");
        assert_eq!(cfg.required_channel, "@news");
        assert!(cfg.is_admin(UserId(1)));
        assert!(cfg.is_admin(UserId(42)));
        assert!(!cfg.is_admin(UserId(2)));
        assert_eq!(cfg.bot_username, None);
    }

    #[test]
    fn test_admin_ids_drop_non_numeric_entries() {
        let ids = parse_admin_ids("7, abc,, 9x, -3 ,11");
        assert_eq!(ids, HashSet::from([UserId(7), UserId(11)]));
    }

    #[test]
    fn test_admin_ids_optional() {
        let env: Vec<_> = full_env().into_iter().filter(|(k, _)| *k != ADMIN_IDS).collect();
        let cfg = Config::from_lookup(lookup(&env)).unwrap();
        assert!(cfg.admin_ids.is_empty());
    }

    #[test]
    fn test_reports_every_missing_variable() {
        let err = Config::from_lookup(lookup(&[(API_SECRET, "s")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing(vec![BOT_TOKEN, REQUIRED_CHANNEL]));
        assert!(err.to_string().contains("BOT_TOKEN, REQUIRED_CHANNEL"));
    }

    #[test]
    fn test_blank_value_counts_as_missing() {
        let mut env = full_env();
        env.retain(|(k, _)| *k != API_SECRET);
        env.push((API_SECRET, "   "));
        let err = Config::from_lookup(lookup(&env)).unwrap_err();
        assert_eq!(err, ConfigError::Missing(vec![API_SECRET]));
    }

    #[test]
    fn test_api_secret_kept_verbatim() {
        let mut env = full_env();
        env.retain(|(k, _)| *k != API_SECRET);
        env.push((API_SECRET, " s3cret "));
        let cfg = Config::from_lookup(lookup(&env)).unwrap();
        assert_eq!(cfg.api_secret, " s3cret ");
        assert_eq!(cfg.bot_token, "123:abc");
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let cfg = Config::from_lookup(lookup(&full_env())).unwrap();
        let out = format!("{cfg:?}");
        assert!(!out.contains("123:abc"));
        assert!(!out.contains("s3cret"));
        assert!(out.contains("@news"));
    }

    #[test]
    fn test_channel_link_strips_leading_at() {
        let cfg = Config::from_lookup(lookup(&full_env())).unwrap();
        assert_eq!(cfg.channel_link(), "https://t.me/news");
        assert_eq!(
            cfg.channel_recipient(),
            Recipient::ChannelUsername("@news".to_string())
        );
    }

    #[test]
    fn test_numeric_channel_is_chat_id() {
        let mut env = full_env();
        env.retain(|(k, _)| *k != REQUIRED_CHANNEL);
        env.push((REQUIRED_CHANNEL, "-1001234"));
        let cfg = Config::from_lookup(lookup(&env)).unwrap();
        assert_eq!(cfg.channel_recipient(), Recipient::Id(ChatId(-1001234)));
    }

    #[test]
    fn test_bot_username_strips_at() {
        let mut env = full_env();
        env.push((BOT_USERNAME, "@gate_bot"));
        let cfg = Config::from_lookup(lookup(&env)).unwrap();
        assert_eq!(cfg.bot_username.as_deref(), Some("gate_bot"));
    }

    #[test]
    fn test_server_listen_addr_defaults() {
        let cfg = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.listen_addr.to_string(), "0.0.0.0:8080");
    }

    #[test]
    fn test_server_port_fallback() {
        let cfg = ServerConfig::from_lookup(lookup(&[(PORT, "9000")])).unwrap();
        assert_eq!(cfg.listen_addr.to_string(), "0.0.0.0:9000");

        let cfg = ServerConfig::from_lookup(lookup(&[
            (PORT, "9000"),
            (LISTEN_ADDR, "127.0.0.1:3000"),
        ]))
        .unwrap();
        assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:3000");
    }

    #[test]
    fn test_server_rejects_bad_addr() {
        let err = ServerConfig::from_lookup(lookup(&[(LISTEN_ADDR, "nowhere")])).unwrap_err();
        assert_eq!(err, ConfigError::InvalidListenAddr("nowhere".to_string()));
    }
}
