use std::fmt;

use chrono::{DateTime, Utc};

/// Identifier for a channel on Youtube
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId {
    pub id: String,
}

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        ChannelId { id: id.into() }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// A single published video as seen in a channel's uploads playlist
#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub video_id: String,
    pub title: String,
    pub channel_title: String,
    pub published_at: DateTime<Utc>,
}

impl Upload {
    /// Public watch page for this video
    pub fn watch_url(&self) -> String {
        format!("https://youtube.com/watch?v={id}", id = self.video_id)
    }

    /// Text posted to the chat destination for this upload
    pub fn announcement(&self) -> String {
        if self.title.is_empty() {
            return self.watch_url();
        }
        if self.channel_title.is_empty() {
            format!("New upload: {}\n{}", self.title, self.watch_url())
        } else {
            format!(
                "New upload from {}: {}\n{}",
                self.channel_title,
                self.title,
                self.watch_url()
            )
        }
    }
}
