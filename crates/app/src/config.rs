use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use mirror_infra::disqus::DisqusCredentials;
use mirror_infra::facebook::FacebookCredentials;

const DEFAULT_GUEST_EMAIL: &str = "example@disqus.com";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub manifest_path: PathBuf,
    pub snapshot_path: PathBuf,
    pub poll_interval: Duration,
    pub create_delay: Duration,
    pub request_timeout: Duration,
    pub prefer_manifest: bool,
    pub oauth_redirect_url: String,
    pub disqus: Option<DisqusCredentials>,
    pub facebook: Option<FacebookCredentials>,
    pub ea_forum_owner: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid integer for {0}: {1}")]
    InvalidNumber(&'static str, String),
    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
    #[error(".env line {line}: {message}")]
    Dotenv { line: usize, message: &'static str },
    #[error("cannot read .env: {0}")]
    Io(#[from] std::io::Error),
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(lookup);
        let poll_interval_secs = env.u64("COMMENT_MIRROR_POLL_INTERVAL_SECS", 300)?;
        if poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "COMMENT_MIRROR_POLL_INTERVAL_SECS",
                "0".to_string(),
            ));
        }
        let create_delay_secs = env.u64("COMMENT_MIRROR_CREATE_DELAY_SECS", 10)?;
        let request_timeout_secs = env.u64("COMMENT_MIRROR_REQUEST_TIMEOUT_SECS", 15)?;
        let prefer_manifest = env.bool("COMMENT_MIRROR_PREFER_MANIFEST")?;

        let disqus = match (
            env.optional("DISQUS_GLOBAL_KEY"),
            env.optional("DISQUS_PUBLIC_KEY"),
            env.optional("DISQUS_SECRET_KEY"),
            env.optional("DISQUS_FORUM"),
        ) {
            (Some(global_key), Some(public_key), Some(secret_key), Some(forum)) => {
                Some(DisqusCredentials {
                    global_key,
                    public_key,
                    secret_key,
                    forum,
                    access_token: env.optional("DISQUS_ACCESS_TOKEN"),
                    guest_email: env.string("DISQUS_GUEST_EMAIL", DEFAULT_GUEST_EMAIL),
                    page_limit: env.u32("DISQUS_PAGE_LIMIT", 100)?,
                })
            }
            _ => None,
        };

        let facebook = match (
            env.optional("FACEBOOK_APP_ID"),
            env.optional("FACEBOOK_APP_SECRET"),
            env.optional("FACEBOOK_USER_ID"),
        ) {
            (Some(app_id), Some(app_secret), Some(user_id)) => Some(FacebookCredentials {
                app_id,
                app_secret,
                user_id,
                access_token: env.optional("FACEBOOK_ACCESS_TOKEN"),
            }),
            _ => None,
        };

        Ok(Self {
            manifest_path: PathBuf::from(env.string("COMMENT_MIRROR_MANIFEST_PATH", "./posts.json")),
            snapshot_path: PathBuf::from(
                env.string("COMMENT_MIRROR_SNAPSHOT_PATH", "./data/registry.json"),
            ),
            poll_interval: Duration::from_secs(poll_interval_secs),
            create_delay: Duration::from_secs(create_delay_secs),
            request_timeout: Duration::from_secs(request_timeout_secs),
            prefer_manifest,
            oauth_redirect_url: env.string("COMMENT_MIRROR_OAUTH_REDIRECT_URL", "http://localhost/"),
            disqus,
            facebook,
            ea_forum_owner: env.optional("EA_FORUM_OWNER"),
        })
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn u64(&self, key: &'static str, default: u64) -> Result<u64, ConfigError> {
        match self.optional(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidNumber(key, raw)),
        }
    }

    fn u32(&self, key: &'static str, default: u32) -> Result<u32, ConfigError> {
        match self.optional(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidNumber(key, raw)),
        }
    }

    fn bool(&self, key: &'static str) -> Result<bool, ConfigError> {
        match self.optional(key).map(|raw| raw.to_ascii_lowercase()) {
            None => Ok(false),
            Some(raw) => match raw.as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::InvalidValue(key, raw)),
            },
        }
    }
}

/// Loads `.env` from the working directory. Variables already present in
/// the environment win.
pub fn load_dotenv() -> Result<(), ConfigError> {
    let path = Path::new(".env");
    if !path.exists() {
        return Ok(());
    }
    let contents = std::fs::read_to_string(path)?;
    for (key, value) in parse_dotenv(&contents)? {
        if std::env::var_os(&key).is_none() {
            // Safety: invoked during startup before any threads are spawned.
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }
    Ok(())
}

fn parse_dotenv(contents: &str) -> Result<Vec<(String, String)>, ConfigError> {
    let mut pairs = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let dotenv_error = |message| ConfigError::Dotenv {
            line: idx + 1,
            message,
        };
        let (key, value) = trimmed.split_once('=').ok_or_else(|| dotenv_error("expected KEY=VALUE"))?;
        let key = key.trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            return Err(dotenv_error("invalid key"));
        }
        let value = unquote(value.trim()).ok_or_else(|| dotenv_error("unterminated quote"))?;
        pairs.push((key.to_string(), value));
    }
    Ok(pairs)
}

fn unquote(value: &str) -> Option<String> {
    for quote in ['"', '\''] {
        if let Some(rest) = value.strip_prefix(quote) {
            let inner = rest.strip_suffix(quote)?;
            return Some(if quote == '"' {
                unescape(inner)
            } else {
                inner.to_string()
            });
        }
    }
    let unquoted = match value.split_once(" #") {
        Some((value, _comment)) => value.trim_end(),
        None => value,
    };
    Some(unquoted.to_string())
}

fn unescape(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            output.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => output.push('\n'),
            Some('t') => output.push('\t'),
            Some(other @ ('\\' | '"')) => output.push(other),
            Some(other) => {
                output.push('\\');
                output.push(other);
            }
            None => output.push('\\'),
        }
    }
    output
}
