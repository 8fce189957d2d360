//! Startup configuration from the environment

use crate::messenger::UserId;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_API_URL: &str = "https://api.telegram.org";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_IDLE_MINUTES: u64 = 30;
const DEFAULT_STORE_TIMEOUT_SECS: u64 = 5;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// How updates reach the bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingress {
    Polling,
    Webhook { port: u16, secret: String },
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub token: String,
    pub admin_ids: Vec<UserId>,
    pub db_path: PathBuf,
    pub ingress: Ingress,
    pub api_url: String,
    /// `None` disables the idle reaper
    pub session_idle: Option<Duration>,
    pub store_timeout: Duration,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let token = var("BOT_TOKEN").ok_or(ConfigError::Missing("BOT_TOKEN"))?;

        let admin_ids = match var("ADMIN_IDS") {
            Some(raw) => parse_admin_ids(&raw)?,
            None => Vec::new(),
        };

        let db_path = var("CATALOG_DB_PATH").map_or_else(
            || {
                let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".catalog-bot").join("catalog.db")
            },
            PathBuf::from,
        );

        let ingress = match var("BOT_MODE").as_deref().map(str::trim) {
            None | Some("polling") => Ingress::Polling,
            Some("webhook") => Ingress::Webhook {
                port: parse_or("WEBHOOK_PORT", var("WEBHOOK_PORT"), DEFAULT_PORT)?,
                secret: var("WEBHOOK_SECRET").ok_or(ConfigError::Missing("WEBHOOK_SECRET"))?,
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "BOT_MODE",
                    value: other.to_string(),
                    reason: "expected 'polling' or 'webhook'".to_string(),
                })
            }
        };

        let api_url = var("TELEGRAM_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let idle_minutes = parse_or(
            "SESSION_IDLE_MINUTES",
            var("SESSION_IDLE_MINUTES"),
            DEFAULT_IDLE_MINUTES,
        )?;
        let session_idle = (idle_minutes > 0).then(|| Duration::from_secs(idle_minutes * 60));

        let timeout_secs = parse_or(
            "STORE_TIMEOUT_SECS",
            var("STORE_TIMEOUT_SECS"),
            DEFAULT_STORE_TIMEOUT_SECS,
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "STORE_TIMEOUT_SECS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            token,
            admin_ids,
            db_path,
            ingress,
            api_url,
            session_idle,
            store_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn parse_or<T>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => {
            let parsed = value.trim().parse();
            parsed.map_err(|e: T::Err| ConfigError::Invalid {
                name,
                reason: e.to_string(),
                value,
            })
        }
    }
}

fn parse_admin_ids(raw: &str) -> Result<Vec<UserId>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse().map(UserId).map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
                name: "ADMIN_IDS",
                value: id.to_string(),
                reason: e.to_string(),
            })
        })
        .collect()
}
