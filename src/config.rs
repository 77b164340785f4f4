use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_CHAT_MAX_TOKENS: u32 = 1000;
const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Process-wide settings, read once at start-up.
#[derive(Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_api_base: String,
    pub openai_model: String,
    pub chat_max_tokens: u32,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub webhook_tolerance_secs: u64,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub addr: SocketAddr,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any key lookup, so tests don't have to touch the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let optional = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let host: IpAddr = parse_or(optional("HOST"), "HOST", IpAddr::from([127, 0, 0, 1]))?;
        let port: u16 = parse_or(optional("PORT"), "PORT", 3000)?;

        let cors_allowed_origins = optional("CORS_ALLOWED_ORIGINS").map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(String::from)
                .collect()
        });

        Ok(Config {
            openai_api_key: required("OPENAI_API_KEY")?,
            openai_api_base: optional("OPENAI_API_BASE")
                .map(|base| base.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_OPENAI_API_BASE.to_string()),
            openai_model: optional("OPENAI_MODEL")
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            chat_max_tokens: parse_or(
                optional("CHAT_MAX_TOKENS"),
                "CHAT_MAX_TOKENS",
                DEFAULT_CHAT_MAX_TOKENS,
            )?,
            stripe_secret_key: required("STRIPE_SECRET_KEY")?,
            stripe_webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
            webhook_tolerance_secs: parse_or(
                optional("WEBHOOK_TOLERANCE_SECS"),
                "WEBHOOK_TOLERANCE_SECS",
                DEFAULT_WEBHOOK_TOLERANCE_SECS,
            )?,
            cors_allowed_origins,
            addr: SocketAddr::new(host, port),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    raw: Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

// Secrets stay out of logs.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("openai_api_base", &self.openai_api_base)
            .field("openai_model", &self.openai_model)
            .field("chat_max_tokens", &self.chat_max_tokens)
            .field("webhook_tolerance_secs", &self.webhook_tolerance_secs)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}
