use std::time::Duration;

use log::{debug, info, trace, warn};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Failed to send message to {destination}")]
    Transport {
        destination: String,
        #[source]
        source: attohttpc::Error,
    },

    #[error("Message to {destination} rejected (HTTP {status}): {body}")]
    Rejected {
        destination: String,
        status: u16,
        body: String,
    },
}

/// Somewhere announcements of new uploads end up
pub trait Notifier {
    fn notify(&self, destination: &str, message: &str) -> Result<(), DeliveryError>;
}

fn api_prefix() -> String {
    #[cfg(test)]
    let prefix: String = mockito::server_url();

    #[cfg(not(test))]
    let prefix: String = std::env::var("VIDRELAY_DISCORD_URL")
        .ok()
        .unwrap_or_else(|| "https://discord.com".into());

    prefix
}

/// Longest pause taken for a single rate limit before trying again
const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

#[derive(Serialize, Debug)]
struct CreateMessage<'a> {
    content: &'a str,
}

/// Body of an HTTP 429 from Discord
#[derive(Deserialize, Debug)]
struct RateLimited {
    retry_after: f64,
}

/// How long Discord asked us to back off, from the JSON body (fractional
/// seconds) or else the `Retry-After` header. One second if neither says.
fn rate_limit_wait(header: Option<&str>, body: &str) -> Duration {
    let secs = serde_json::from_str::<RateLimited>(body)
        .ok()
        .map(|r| r.retry_after)
        .or_else(|| header.and_then(|h| h.trim().parse::<f64>().ok()))
        .filter(|s| s.is_finite() && *s >= 0.0);
    match secs {
        Some(s) if s < MAX_RATE_LIMIT_WAIT.as_secs_f64() => Duration::from_secs_f64(s),
        Some(_) => MAX_RATE_LIMIT_WAIT,
        None => Duration::from_secs(1),
    }
}

/// Posts messages to a Discord channel through the bot REST API
pub struct DiscordNotifier {
    prefix: String,
    token: String,
    max_retries: u32,
}

impl DiscordNotifier {
    pub fn new(token: &str) -> DiscordNotifier {
        DiscordNotifier {
            prefix: api_prefix(),
            token: token.into(),
            max_retries: 3,
        }
    }

    /// Times a rate limited message is sent again before giving up
    #[cfg(test)]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}

impl std::fmt::Debug for DiscordNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DiscordNotifier{{prefix: {:?}}}", self.prefix)
    }
}

impl Notifier for DiscordNotifier {
    fn notify(&self, destination: &str, message: &str) -> Result<(), DeliveryError> {
        let url = format!(
            "{prefix}/api/v10/channels/{chan}/messages",
            prefix = self.prefix,
            chan = destination
        );
        debug!("Posting message to {}", &url);
        let transport = |source| DeliveryError::Transport {
            destination: destination.into(),
            source,
        };

        let mut attempt = 0;
        loop {
            let resp = attohttpc::post(&url)
                .header(attohttpc::header::AUTHORIZATION, format!("Bot {}", self.token))
                .json(&CreateMessage { content: message })
                .map_err(transport)?
                .send()
                .map_err(transport)?;

            let status = resp.status();
            let retry_after = resp
                .headers()
                .get(attohttpc::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            let text = resp.text().map_err(transport)?;
            trace!("Raw response: {}", &text);

            let limited = status == attohttpc::StatusCode::TOO_MANY_REQUESTS;
            if limited && attempt < self.max_retries {
                attempt += 1;
                let wait = rate_limit_wait(retry_after.as_deref(), &text);
                warn!(
                    "Rate limited posting to {}. Retry {}/{} in {:?}",
                    destination, attempt, self.max_retries, wait
                );
                std::thread::sleep(wait);
                continue;
            }
            if !status.is_success() {
                return Err(DeliveryError::Rejected {
                    destination: destination.into(),
                    status: status.as_u16(),
                    body: text,
                });
            }
            return Ok(());
        }
    }
}

/// Only logs announcements, for dry runs
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, destination: &str, message: &str) -> Result<(), DeliveryError> {
        info!("[dry run] to {}: {}", destination, message.replace('\n', " "));
        Ok(())
    }
}
