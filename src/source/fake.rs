//! In-memory platform for exercising the watcher and driver without HTTP.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};

use chrono::{TimeZone, Utc};

use crate::common::{ChannelId, Upload};
use crate::source::base::{ChannelMetadata, PlatformError, PlatformResult, VideoPlatform};

/// Upload published `secs` after the epoch
pub fn upload(id: &str, secs: i64) -> Upload {
    Upload {
        video_id: id.into(),
        title: format!("Video {}", id),
        channel_title: "Test Channel".into(),
        published_at: Utc.timestamp_opt(secs, 0).unwrap(),
    }
}

#[derive(Default)]
pub struct FakePlatform {
    subscriptions: RefCell<Vec<ChannelId>>,
    uploads: RefCell<HashMap<String, Vec<Upload>>>,
    /// Handed out, one per call, before any upload listing succeeds
    failures: RefCell<VecDeque<PlatformError>>,
    pub subscription_calls: Cell<usize>,
    pub upload_calls: Cell<usize>,
}

impl FakePlatform {
    pub fn new() -> FakePlatform {
        FakePlatform::default()
    }

    pub fn subscribe(&self, chan: &ChannelId) {
        self.subscriptions.borrow_mut().push(chan.clone());
        self.uploads
            .borrow_mut()
            .entry(playlist_for(chan))
            .or_insert_with(Vec::new);
    }

    pub fn set_uploads(&self, chan: &ChannelId, uploads: Vec<Upload>) {
        self.uploads.borrow_mut().insert(playlist_for(chan), uploads);
    }

    pub fn fail_next(&self, err: PlatformError) {
        self.failures.borrow_mut().push_back(err);
    }
}

fn playlist_for(chan: &ChannelId) -> String {
    format!("uploads-{}", chan.id)
}

impl VideoPlatform for FakePlatform {
    fn subscriptions(&self) -> PlatformResult<Vec<ChannelId>> {
        self.subscription_calls.set(self.subscription_calls.get() + 1);
        Ok(self.subscriptions.borrow().clone())
    }

    fn channel_metadata(&self, chan: &ChannelId) -> PlatformResult<ChannelMetadata> {
        let playlist = playlist_for(chan);
        if !self.uploads.borrow().contains_key(&playlist) {
            return Err(PlatformError::NotFound(chan.clone()));
        }
        Ok(ChannelMetadata {
            title: format!("Channel {}", chan.id),
            uploads_playlist: playlist,
        })
    }

    fn playlist_uploads(&self, playlist_id: &str) -> PlatformResult<Vec<Upload>> {
        self.upload_calls.set(self.upload_calls.get() + 1);
        if let Some(err) = self.failures.borrow_mut().pop_front() {
            return Err(err);
        }
        Ok(self
            .uploads
            .borrow()
            .get(playlist_id)
            .cloned()
            .unwrap_or_default())
    }
}
