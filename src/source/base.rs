use thiserror::Error;

use crate::common::{ChannelId, Upload};

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Authorization rejected by platform (HTTP {status}): {message}")]
    Auth { status: u16, message: String },

    #[error("API quota exceeded (HTTP {status}): {message}")]
    Quota { status: u16, message: String },

    #[error("Platform server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("Unexpected response (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: attohttpc::Error,
    },

    #[error("Malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },

    #[error("Channel {0} not found")]
    NotFound(ChannelId),

    #[error("Invalid {kind} ID {value:?}")]
    InvalidId { kind: &'static str, value: String },
}

impl PlatformError {
    /// Whether the same request might succeed if simply sent again later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PlatformError::Server { .. } | PlatformError::Transport { .. }
        )
    }
}

pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

/// Important info about channel
#[derive(Debug, Clone)]
pub struct ChannelMetadata {
    pub title: String,
    /// ID of the playlist holding every upload of the channel
    pub uploads_playlist: String,
}

/// Access to the video platform on behalf of the authenticated user.
pub trait VideoPlatform {
    /// Channels the user is subscribed to (first page only, up to 50)
    fn subscriptions(&self) -> PlatformResult<Vec<ChannelId>>;

    /// Get basic info on channel, including where its uploads are listed
    fn channel_metadata(&self, chan: &ChannelId) -> PlatformResult<ChannelMetadata>;

    /// First page of items in the given playlist, in whatever order the
    /// platform returns them
    fn playlist_uploads(&self, playlist_id: &str) -> PlatformResult<Vec<Upload>>;
}
