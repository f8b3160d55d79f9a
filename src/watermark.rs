use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::common::ChannelId;

/// Publish time of the newest upload seen on each channel. Lives for the
/// process lifetime only.
#[derive(Debug, Default)]
pub struct WatermarkStore {
    marks: HashMap<ChannelId, DateTime<Utc>>,
}

impl WatermarkStore {
    pub fn new() -> WatermarkStore {
        WatermarkStore::default()
    }

    /// `None` if the channel has never been polled
    pub fn get(&self, chan: &ChannelId) -> Option<DateTime<Utc>> {
        self.marks.get(chan).copied()
    }

    /// Record `mark` for the channel. The stored value never moves backwards.
    pub fn advance(&mut self, chan: &ChannelId, mark: DateTime<Utc>) -> DateTime<Utc> {
        let entry = self.marks.entry(chan.clone()).or_insert(mark);
        if mark > *entry {
            *entry = mark;
        }
        *entry
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
}
