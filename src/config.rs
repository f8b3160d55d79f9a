use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use log::debug;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Invalid value {value:?} for {name}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Unable to determine configuration directories")]
    NoProjectDirs,

    #[error(
        "No cached authorization at {0:?}. Authorize read-only Youtube access \
         out of band and save the token JSON there, or set VIDRELAY_ACCESS_TOKEN"
    )]
    TokenMissing(PathBuf),

    #[error("Unable to read cached authorization {path:?}")]
    TokenUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid cached authorization {path:?}")]
    TokenInvalid {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// What to do when an announcement cannot be delivered
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NotifyFailure {
    /// Stop the relay
    Fatal,
    /// Log a warning and carry on with the next upload
    Log,
}

impl NotifyFailure {
    pub fn from_str(name: &str) -> Option<Self> {
        match name {
            "fatal" => Some(NotifyFailure::Fatal),
            "log" => Some(NotifyFailure::Log),
            _ => None,
        }
    }
}

pub struct Config {
    pub discord_token: Option<String>,
    pub discord_channel_id: Option<String>,
    /// Used instead of the cached token file when set
    pub access_token: Option<String>,
    token_filepath: PathBuf,
    /// Pause after polling each channel
    pub channel_delay: Duration,
    /// Extra attempts for transient platform errors, 0 means any error is fatal
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub notify_failure: NotifyFailure,
    /// Sent to the destination when the relay starts
    pub greeting: Option<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Config{{discord_channel_id: {:?}, token_filepath: {:?}, channel_delay: {:?}, max_retries: {}, notify_failure: {:?}}}",
            self.discord_channel_id,
            self.token_filepath,
            self.channel_delay,
            self.max_retries,
            self.notify_failure,
        )
    }
}

fn parse_num<T: std::str::FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(v) => v.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            value: v.clone(),
            reason: e.to_string(),
        }),
    }
}

impl Config {
    /// Load settings from the environment, after reading a `.env` file from
    /// the working directory if there is one
    pub fn load() -> Result<Config, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => debug!("Loaded environment from {:?}", path),
            Err(e) => debug!("No .env file loaded: {}", e),
        }
        Config::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F: Fn(&str) -> Option<String>>(get: F) -> Result<Config, ConfigError> {
        // Treat blank values as unset
        let get = |name: &str| get(name).filter(|v| !v.trim().is_empty());

        let token_filepath = match get("VIDRELAY_TOKEN_FILE") {
            Some(p) => PathBuf::from(p),
            None => {
                let data_dir = match get("VIDRELAY_CONFIG_DIR") {
                    Some(d) => PathBuf::from(d),
                    None => ProjectDirs::from("uk.co", "dbrweb", "vidrelay")
                        .ok_or(ConfigError::NoProjectDirs)?
                        .data_dir()
                        .to_path_buf(),
                };
                data_dir.join("youtube-token.json")
            }
        };

        let notify_failure = match get("VIDRELAY_NOTIFY_FAILURE") {
            None => NotifyFailure::Fatal,
            Some(v) => NotifyFailure::from_str(v.trim()).ok_or_else(|| ConfigError::Invalid {
                name: "VIDRELAY_NOTIFY_FAILURE",
                value: v.clone(),
                reason: "expected \"fatal\" or \"log\"".into(),
            })?,
        };

        Ok(Config {
            discord_token: get("VIDRELAY_DISCORD_TOKEN"),
            discord_channel_id: get("VIDRELAY_DISCORD_CHANNEL_ID"),
            access_token: get("VIDRELAY_ACCESS_TOKEN"),
            token_filepath,
            channel_delay: Duration::from_secs(parse_num(
                "VIDRELAY_CHANNEL_DELAY_SECS",
                get("VIDRELAY_CHANNEL_DELAY_SECS"),
                10,
            )?),
            max_retries: parse_num("VIDRELAY_MAX_RETRIES", get("VIDRELAY_MAX_RETRIES"), 0)?,
            retry_backoff: Duration::from_secs(parse_num(
                "VIDRELAY_RETRY_BACKOFF_SECS",
                get("VIDRELAY_RETRY_BACKOFF_SECS"),
                30,
            )?),
            notify_failure,
            greeting: get("VIDRELAY_GREETING"),
        })
    }

    pub fn token_filepath(&self) -> &PathBuf {
        &self.token_filepath
    }

    /// Bot token and destination channel, both needed to post to Discord
    pub fn discord(&self) -> Result<(&str, &str), ConfigError> {
        let token = self
            .discord_token
            .as_deref()
            .ok_or(ConfigError::Missing("VIDRELAY_DISCORD_TOKEN"))?;
        let chan = self
            .discord_channel_id
            .as_deref()
            .ok_or(ConfigError::Missing("VIDRELAY_DISCORD_CHANNEL_ID"))?;
        Ok((token, chan))
    }
}
