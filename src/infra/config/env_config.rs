// Environment-backed configuration.
//
// `main` calls `dotenv` first, then `from_env`. Parsing goes through a lookup
// closure so tests never have to touch the real process environment.

use crate::core::moderation::{
    AkismetConfig, AliyunConfig, KeywordConfig, KeywordMode, ModeratorConfig, TencentConfig,
};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_DATABASE_PATH: &str = "data/comments.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Everything the binary needs at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub moderator: ModeratorConfig,
}

pub fn from_env() -> Result<AppConfig, ConfigError> {
    from_lookup(|key| std::env::var(key).ok())
}

pub fn from_lookup<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let env = Lookup(lookup);
    let defaults = ModeratorConfig::default();

    let keywords_pending = env.parse_or("KEYWORDS_PENDING", false)?;
    let keywords = KeywordConfig {
        enabled: env.parse_or("KEYWORDS_ENABLED", false)?,
        files: env
            .string("KEYWORDS_FILES")
            .map(|files| {
                files
                    .split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(PathBuf::from)
                    .collect()
            })
            .unwrap_or_default(),
        separator: env
            .raw("KEYWORDS_FILE_SEP")
            .map(|sep| unescape(&sep))
            .unwrap_or_else(|| "\n".to_string()),
        mode: if keywords_pending {
            KeywordMode::Flag
        } else {
            KeywordMode::Redact {
                filler: redaction_filler(&env)?,
            }
        },
    };

    let moderator = ModeratorConfig {
        pending_default: env.parse_or("MODERATOR_PENDING_DEFAULT", false)?,
        api_fail_block: env.parse_or("MODERATOR_API_FAIL_BLOCK", false)?,
        akismet: AkismetConfig {
            api_key: env.string("AKISMET_KEY").unwrap_or_default(),
        },
        tencent: TencentConfig {
            enabled: env.parse_or("TENCENT_ENABLED", false)?,
            secret_id: env.string("TENCENT_SECRET_ID").unwrap_or_default(),
            secret_key: env.string("TENCENT_SECRET_KEY").unwrap_or_default(),
            region: env
                .string("TENCENT_REGION")
                .unwrap_or_else(|| "ap-guangzhou".to_string()),
        },
        aliyun: AliyunConfig {
            enabled: env.parse_or("ALIYUN_ENABLED", false)?,
            access_key_id: env.string("ALIYUN_ACCESS_KEY_ID").unwrap_or_default(),
            access_key_secret: env.string("ALIYUN_ACCESS_KEY_SECRET").unwrap_or_default(),
            region: env
                .string("ALIYUN_REGION")
                .unwrap_or_else(|| "cn-shanghai".to_string()),
        },
        keywords,
        workers: env.parse_or("MODERATOR_WORKERS", defaults.workers)?,
        queue_capacity: env.parse_or("MODERATOR_QUEUE_CAPACITY", defaults.queue_capacity)?,
        detector_timeout: Duration::from_secs(env.parse_or(
            "MODERATOR_DETECTOR_TIMEOUT_SECS",
            defaults.detector_timeout.as_secs(),
        )?),
    };

    Ok(AppConfig {
        database_path: env
            .string("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH)),
        moderator,
    })
}

/// `KEYWORDS_REPLACE_TO`: unset means `x`, set but empty disables rewriting.
/// Anything longer than one character would change the content's length.
fn redaction_filler<F>(env: &Lookup<F>) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    const KEY: &str = "KEYWORDS_REPLACE_TO";

    match (env.0)(KEY) {
        None => Ok("x".to_string()),
        Some(filler) if filler.chars().count() <= 1 => Ok(filler),
        Some(filler) => Err(ConfigError::InvalidValue { key: KEY, value: filler }),
    }
}

struct Lookup<F>(F);

impl<F: Fn(&str) -> Option<String>> Lookup<F> {
    /// Untrimmed value; separators may be whitespace.
    fn raw(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse_or<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.string(key) {
            None => Ok(default),
            Some(value) => parse_value(key, &value),
        }
    }
}

fn parse_value<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    // Accept the usual spellings for booleans.
    let normalized = match value.to_ascii_lowercase().as_str() {
        "1" | "yes" | "on" if is_bool_key(key) => "true".to_string(),
        "0" | "no" | "off" if is_bool_key(key) => "false".to_string(),
        other => other.to_string(),
    };

    normalized.parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

fn is_bool_key(key: &str) -> bool {
    key.ends_with("_ENABLED")
        || matches!(
            key,
            "KEYWORDS_PENDING" | "MODERATOR_PENDING_DEFAULT" | "MODERATOR_API_FAIL_BLOCK"
        )
}

/// Turn `\n`, `\t` and `\r` escapes typed into a .env file into real characters.
fn unescape(value: &str) -> String {
    value
        .replace("\\n", "\n")
        .replace("\\t", "\t")
        .replace("\\r", "\r")
}
