use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;

use crate::common::ChannelId;
use crate::config::{Config, NotifyFailure};
use crate::notify::{DeliveryError, Notifier};
use crate::source::base::{PlatformError, PlatformResult, VideoPlatform};
use crate::watcher::poll_channel;
use crate::watermark::WatermarkStore;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Failed to list subscriptions")]
    Subscriptions(#[source] PlatformError),

    #[error("Failed to check channel {chan} for uploads")]
    Poll {
        chan: ChannelId,
        #[source]
        source: PlatformError,
    },

    #[error("Failed to announce video {video_id} from channel {chan}")]
    Delivery {
        chan: ChannelId,
        video_id: String,
        #[source]
        source: DeliveryError,
    },
}

/// Blocks the driver between channels and between retries
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread
#[derive(Debug, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration)
    }
}

#[derive(Debug, Clone)]
pub struct DriverSettings {
    /// Chat channel announcements are sent to
    pub destination: String,
    pub channel_delay: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub notify_failure: NotifyFailure,
}

impl DriverSettings {
    pub fn from_config(cfg: &Config, destination: &str) -> DriverSettings {
        DriverSettings {
            destination: destination.into(),
            channel_delay: cfg.channel_delay,
            max_retries: cfg.max_retries,
            retry_backoff: cfg.retry_backoff,
            notify_failure: cfg.notify_failure,
        }
    }
}

/// Tally of one pass over every subscription
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CycleReport {
    pub channels: usize,
    pub first_contact: usize,
    pub announced: usize,
    pub delivery_failures: usize,
}

/// Run `op`, retrying errors the platform flags as transient up to
/// `settings.max_retries` times with a linearly growing pause
fn with_retry<T>(
    settings: &DriverSettings,
    sleeper: &dyn Sleeper,
    what: &str,
    mut op: impl FnMut() -> PlatformResult<T>,
) -> PlatformResult<T> {
    let mut tries = 0;
    loop {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && tries < settings.max_retries => {
                tries += 1;
                let wait = settings
                    .retry_backoff
                    .checked_mul(tries)
                    .unwrap_or(Duration::MAX);
                warn!(
                    "{} failed: {}. Retry {}/{} in {:?}",
                    what, e, tries, settings.max_retries, wait
                );
                sleeper.sleep(wait);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Owns the watermarks and drives the watcher over every subscription
pub struct Driver<'a> {
    platform: &'a dyn VideoPlatform,
    notifier: &'a dyn Notifier,
    sleeper: &'a dyn Sleeper,
    settings: DriverSettings,
    store: WatermarkStore,
    cycles: u64,
}

impl<'a> Driver<'a> {
    pub fn new(
        platform: &'a dyn VideoPlatform,
        notifier: &'a dyn Notifier,
        sleeper: &'a dyn Sleeper,
        settings: DriverSettings,
    ) -> Driver<'a> {
        Driver {
            platform,
            notifier,
            sleeper,
            settings,
            store: WatermarkStore::new(),
            cycles: 0,
        }
    }

    #[cfg(test)]
    pub fn watermarks(&self) -> &WatermarkStore {
        &self.store
    }

    /// Completed cycles so far
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Poll every subscribed channel once, announcing anything new
    pub fn run_cycle(&mut self) -> Result<CycleReport, DriverError> {
        let platform = self.platform;
        let notifier = self.notifier;
        let sleeper = self.sleeper;
        let settings = &self.settings;
        let store = &mut self.store;

        let channels = with_retry(settings, sleeper, "Listing subscriptions", || {
            platform.subscriptions()
        })
        .map_err(DriverError::Subscriptions)?;
        info!("Checking {} subscribed channels", channels.len());

        let mut report = CycleReport::default();
        for chan in channels {
            let what = format!("Polling {}", chan);
            let poll = with_retry(settings, sleeper, &what, || {
                poll_channel(platform, &chan, store)
            })
            .map_err(|source| DriverError::Poll {
                chan: chan.clone(),
                source,
            })?;

            debug!("Watermark for {} now {:?}", chan, poll.watermark);
            report.channels += 1;
            if poll.first_contact {
                report.first_contact += 1;
            }

            for upload in &poll.new_uploads {
                info!(
                    "Announcing {} {:?} published {}",
                    upload.video_id, upload.title, upload.published_at
                );
                match notifier.notify(&settings.destination, &upload.announcement()) {
                    Ok(()) => report.announced += 1,
                    Err(e) => match settings.notify_failure {
                        NotifyFailure::Fatal => {
                            return Err(DriverError::Delivery {
                                chan: chan.clone(),
                                video_id: upload.video_id.clone(),
                                source: e,
                            })
                        }
                        NotifyFailure::Log => {
                            warn!("Could not announce {}: {}", upload.video_id, e);
                            report.delivery_failures += 1;
                        }
                    },
                }
            }

            debug!("Waiting {:?} before next channel", settings.channel_delay);
            sleeper.sleep(settings.channel_delay);
        }

        self.cycles += 1;
        Ok(report)
    }

    /// Run cycles until `max_cycles` have completed, or forever if `None`
    pub fn run(&mut self, max_cycles: Option<u64>) -> Result<(), DriverError> {
        loop {
            if let Some(max) = max_cycles {
                if self.cycles >= max {
                    return Ok(());
                }
            }
            let report = self.run_cycle()?;
            info!(
                "Cycle {} done: {} channels ({} new), {} announced, {} failed, {} watermarks held",
                self.cycles,
                report.channels,
                report.first_contact,
                report.announced,
                report.delivery_failures,
                self.store.len(),
            );
        }
    }
}
