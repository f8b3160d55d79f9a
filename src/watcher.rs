//! Per-channel diffing of "uploads visible now" against what was already seen.

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::common::{ChannelId, Upload};
use crate::source::base::{PlatformResult, VideoPlatform};
use crate::watermark::WatermarkStore;

/// Result of comparing one fetched page of uploads against a watermark
#[derive(Debug, PartialEq)]
pub struct Diff {
    /// Uploads newer than the watermark, oldest first
    pub new_uploads: Vec<Upload>,
    /// Watermark after this fetch. `None` only if there was no watermark and
    /// nothing was fetched.
    pub watermark: Option<DateTime<Utc>>,
}

/// Outcome of polling a single channel
#[derive(Debug)]
pub struct ChannelPoll {
    pub new_uploads: Vec<Upload>,
    pub watermark: Option<DateTime<Utc>>,
    /// Channel had no watermark before this poll
    pub first_contact: bool,
}

/// Newest first. Equal publish times are ordered by video ID so the result
/// does not depend on the order the platform returned them in.
fn sort_newest_first(uploads: &mut [Upload]) {
    uploads.sort_by(|a, b| {
        b.published_at
            .cmp(&a.published_at)
            .then_with(|| b.video_id.cmp(&a.video_id))
    });
}

pub fn diff_uploads(mut uploads: Vec<Upload>, watermark: Option<DateTime<Utc>>) -> Diff {
    sort_newest_first(&mut uploads);

    let newest = match uploads.first() {
        Some(u) => u.published_at,
        None => {
            return Diff {
                new_uploads: vec![],
                watermark,
            }
        }
    };

    let new_uploads = match watermark {
        // First contact, only record where we are
        None => vec![],
        Some(mark) => uploads
            .into_iter()
            .filter(|u| u.published_at > mark)
            .rev()
            .collect(),
    };

    let updated = match watermark {
        Some(mark) if mark > newest => mark,
        _ => newest,
    };

    Diff {
        new_uploads,
        watermark: Some(updated),
    }
}

/// Fetch the current uploads of `chan`, returning those not seen before and
/// advancing its watermark in `store`.
pub fn poll_channel<P: VideoPlatform + ?Sized>(
    platform: &P,
    chan: &ChannelId,
    store: &mut WatermarkStore,
) -> PlatformResult<ChannelPoll> {
    let meta = platform.channel_metadata(chan)?;
    debug!("Channel {} ({}) uploads to {}", chan, meta.title, meta.uploads_playlist);
    let uploads = platform.playlist_uploads(&meta.uploads_playlist)?;
    debug!("Fetched {} uploads for {}", uploads.len(), chan);

    let previous = store.get(chan);
    let diff = diff_uploads(uploads, previous);

    let watermark = match diff.watermark {
        Some(mark) => Some(store.advance(chan, mark)),
        None => {
            debug!("No uploads on {}, watermark unchanged", chan);
            None
        }
    };

    if previous.is_none() {
        info!(
            "No previous uploads recorded for {} ({}), will announce from {:?} on",
            chan, meta.title, watermark
        );
    } else if diff.new_uploads.is_empty() {
        debug!("No new uploads on {}", chan);
    } else {
        info!("{} new uploads on {} ({})", diff.new_uploads.len(), chan, meta.title);
    }

    Ok(ChannelPoll {
        new_uploads: diff.new_uploads,
        watermark,
        first_contact: previous.is_none(),
    })
}
