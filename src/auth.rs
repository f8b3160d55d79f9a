use chrono::{DateTime, Datelike, Utc};
use log::{debug, warn};

use crate::config::{Config, ConfigError};

/// OAuth token as cached on disk after authorizing out of band
#[derive(Serialize, Deserialize, Debug, Clone)]
struct CachedToken {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    /// RFC 3339. Zero dates (year 1) mean "does not expire".
    #[serde(default)]
    expiry: Option<String>,
}

impl CachedToken {
    fn expiry(&self) -> Option<DateTime<Utc>> {
        let raw = self.expiry.as_deref()?;
        match DateTime::parse_from_rfc3339(raw) {
            Ok(when) if when.year() > 1 => Some(when.with_timezone(&Utc)),
            Ok(_) => None,
            Err(e) => {
                warn!("Ignoring unparseable token expiry {:?}: {}", raw, e);
                None
            }
        }
    }
}

fn parse_token(text: &str, cfg: &Config) -> Result<String, ConfigError> {
    let path = cfg.token_filepath();
    let tok: CachedToken =
        serde_json::from_str(text).map_err(|source| ConfigError::TokenInvalid {
            path: path.clone(),
            source,
        })?;

    if let Some(tt) = &tok.token_type {
        if !tt.eq_ignore_ascii_case("bearer") {
            warn!("Unexpected token type {:?} in {:?}", tt, path);
        }
    }

    if let Some(expiry) = tok.expiry() {
        if expiry < Utc::now() {
            if tok.refresh_token.is_some() {
                warn!(
                    "Cached authorization expired at {}, re-authorize to refresh {:?}",
                    expiry, path
                );
            } else {
                warn!("Cached authorization expired at {}", expiry);
            }
        }
    }

    Ok(tok.access_token)
}

/// Bearer token for the Youtube API: the configured override, otherwise the
/// cached authorization
pub fn access_token(cfg: &Config) -> Result<String, ConfigError> {
    if let Some(tok) = &cfg.access_token {
        debug!("Using access token from environment");
        return Ok(tok.clone());
    }

    let path = cfg.token_filepath();
    debug!("Loading cached authorization from {:?}", path);
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::TokenMissing(path.clone()))
        }
        Err(source) => {
            return Err(ConfigError::TokenUnreadable {
                path: path.clone(),
                source,
            })
        }
    };
    parse_token(&text, cfg)
}
