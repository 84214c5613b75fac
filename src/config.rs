use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::{
    net::{IpAddr, Ipv4Addr},
    sync::LazyLock,
};
use url::Url;

/// Application configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// HTTP server listen address (e.g., "0.0.0.0", "127.0.0.1").
    /// Env: `LISTEN_ADDR`. Default: `0.0.0.0`.
    #[serde(default = "default_listen_ip")]
    pub listen_addr: IpAddr,

    /// HTTP server listen port.
    /// Env: `LISTEN_PORT`. Default: `8000`.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// SQLite URL of the local fallback store (holds the cached counter).
    /// Env: `DATABASE_URL`. Default: `sqlite://local.db`.
    #[serde(default)]
    pub database_url: String,

    /// Log level for tracing subscriber initialization (e.g., "error", "warn", "info", "debug", "trace").
    /// Env: `LOGLEVEL`. Default: `info`.
    #[serde(default)]
    pub loglevel: String,

    /// Optional upstream HTTP proxy. If set, used for reqwest clients.
    /// Env: `PROXY`. Example: `http://127.0.0.1:1080`.
    #[serde(default)]
    pub proxy: Option<Url>,

    /// Base URL of the hosted database service. Empty means "not configured".
    /// Env: `SUPABASE_URL`. Example: `https://abcd.supabase.co`.
    #[serde(default)]
    pub supabase_url: String,

    /// Anonymous API key of the hosted database service. Empty means "not configured".
    /// Env: `SUPABASE_ANON_KEY`.
    #[serde(default)]
    pub supabase_anon_key: String,

    /// Remote table holding quotes.
    /// Env: `QUOTES_TABLE`. Default: `motivational_quotes`.
    #[serde(default)]
    pub quotes_table: String,

    /// Remote single-row table holding the motivation counter.
    /// Env: `STATS_TABLE`. Default: `motivation_stats`.
    #[serde(default)]
    pub stats_table: String,

    /// Primary key of the counter row.
    /// Env: `COUNTER_ID`. Default: `1`.
    #[serde(default)]
    pub counter_id: i64,

    /// Admin password checked by the login endpoint (required, non-empty).
    /// Env: `ADMIN_KEY`. Must be provided.
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_string_lax")]
    pub admin_key: String,

    /// Admin login attempts allowed per minute.
    /// Env: `LOGIN_PER_MINUTE`. Default: `10`.
    #[serde(default)]
    pub login_per_minute: u32,

    /// Drop the `Secure` attribute on the admin session cookie (plain-HTTP deployments).
    /// Env: `INSECURE_COOKIE`. Default: `false`.
    #[serde(default)]
    pub insecure_cookie: bool,

    /// Allow HTTP/2 multiplexing for reqwest clients; disabled forces HTTP/1.
    /// Env: `ENABLE_MULTIPLEXING`. Default: `false`.
    #[serde(default)]
    pub enable_multiplexing: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_ip(),
            listen_port: default_listen_port(),
            database_url: "sqlite://local.db".to_string(),
            loglevel: "info".to_string(),
            proxy: None,
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            quotes_table: "motivational_quotes".to_string(),
            stats_table: "motivation_stats".to_string(),
            counter_id: 1,
            admin_key: String::new(),
            login_per_minute: 10,
            insecure_cookie: false,
            enable_multiplexing: false,
        }
    }
}

impl Config {
    /// Builds a Figment that merges defaults and environment variables.
    /// Uses raw env mapping, so field names map to env vars in UPPER_SNAKE_CASE.
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Env::raw())
    }

    /// Loads configuration from the environment (with defaults) and validates required fields.
    pub fn from_env() -> Self {
        let cfg: Self = Self::figment()
            .extract()
            .expect("failed to extract configuration via Figment");
        if cfg.admin_key.trim().is_empty() {
            panic!("ADMIN_KEY must be set and non-empty");
        }
        cfg
    }

    /// Both the service URL and the anonymous key are present.
    pub fn remote_configured(&self) -> bool {
        !self.supabase_url.trim().is_empty() && !self.supabase_anon_key.trim().is_empty()
    }
}

fn deserialize_string_lax<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;

    match v {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(serde::de::Error::custom(
            "expected a string or a number for ADMIN_KEY",
        )),
    }
}

/// Global, lazily-initialized configuration instance.
pub static CONFIG: LazyLock<Config> = LazyLock::new(Config::from_env);

pub const USER_AGENT: &str = concat!("quote-nexus/", env!("CARGO_PKG_VERSION"));

/// Default IP address for the HTTP server listen address.
pub fn default_listen_ip() -> IpAddr {
    Ipv4Addr::new(0, 0, 0, 0).into()
}

/// Default port for the HTTP server.
pub fn default_listen_port() -> u16 {
    8000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_requires_both_url_and_key() {
        let mut cfg = Config::default();
        assert!(!cfg.remote_configured());

        cfg.supabase_url = "https://example.supabase.co".to_string();
        assert!(!cfg.remote_configured());

        cfg.supabase_anon_key = "  ".to_string();
        assert!(!cfg.remote_configured());

        cfg.supabase_anon_key = "anon".to_string();
        assert!(cfg.remote_configured());
    }

    #[test]
    fn defaults_name_the_original_tables() {
        let cfg = Config::default();
        assert_eq!(cfg.quotes_table, "motivational_quotes");
        assert_eq!(cfg.stats_table, "motivation_stats");
        assert_eq!(cfg.counter_id, 1);
    }
}
