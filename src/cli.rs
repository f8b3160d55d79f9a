use anyhow::{Context, Result};
use clap::{App, Arg, SubCommand};
use log::{debug, info, warn};

use crate::common::ChannelId;
use crate::config::Config;
use crate::driver::{Driver, DriverSettings, ThreadSleeper};
use crate::notify::{DiscordNotifier, LogNotifier, Notifier};
use crate::source::base::VideoPlatform;
use crate::source::youtube::YoutubeClient;

fn youtube(cfg: &Config) -> Result<YoutubeClient> {
    let token = crate::auth::access_token(cfg).context("Youtube authorization")?;
    Ok(YoutubeClient::new(&token))
}

/// Relay new uploads until killed, or for the given number of cycles
fn run(cycles: Option<u64>, dry_run: bool) -> Result<()> {
    debug!("Loading config");
    let cfg = Config::load()?;
    debug!("{:?}", &cfg);

    let (notifier, destination): (Box<dyn Notifier>, String) = if dry_run {
        info!("Dry run, announcements are only logged");
        let dest = cfg
            .discord_channel_id
            .clone()
            .unwrap_or_else(|| "dry-run".into());
        (Box::new(LogNotifier), dest)
    } else {
        let (token, chan) = cfg.discord()?;
        (Box::new(DiscordNotifier::new(token)), chan.into())
    };
    let yt = youtube(&cfg)?;

    if let Some(greeting) = &cfg.greeting {
        notifier
            .notify(&destination, greeting)
            .context("Failed to send greeting")?;
    }

    let settings = DriverSettings::from_config(&cfg, &destination);
    let sleeper = ThreadSleeper;
    let mut driver = Driver::new(&yt, notifier.as_ref(), &sleeper, settings);
    driver.run(cycles)?;
    info!("Stopped after {} cycles", driver.cycles());
    Ok(())
}

/// List subscribed channels
fn subscriptions() -> Result<()> {
    let cfg = Config::load()?;
    let yt = youtube(&cfg)?;

    let channels = yt.subscriptions()?;
    if channels.is_empty() {
        warn!("Not subscribed to any channels");
    }
    for c in channels {
        println!("{}", c);
    }
    Ok(())
}

/// List current uploads of one channel
fn uploads(chan: &str) -> Result<()> {
    let cfg = Config::load()?;
    let yt = youtube(&cfg)?;

    let chan = ChannelId::new(chan);
    let meta = yt.channel_metadata(&chan)?;
    let mut uploads = yt.playlist_uploads(&meta.uploads_playlist)?;
    uploads.sort_by(|a, b| b.published_at.cmp(&a.published_at));

    println!("{} - {} (uploads playlist {})", chan, meta.title, meta.uploads_playlist);
    for u in uploads {
        println!(
            "ID: {}\nTitle: {}\nURL: {}\nPublished: {}\n----",
            u.video_id,
            u.title,
            u.watch_url(),
            u.published_at
        );
    }
    Ok(())
}

fn config_logging(verbosity: u64) -> Result<()> {
    // Level for this application
    let internal_level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,  // -v
        2 => log::LevelFilter::Debug, // -vv
        _ => log::LevelFilter::Trace, // -vvv
    };

    // Show log output for 3rd party library at -vvv
    let thirdparty_level = match verbosity {
        0..=2 => log::LevelFilter::Warn,
        _ => log::LevelFilter::Debug, // -vvv
    };

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(thirdparty_level)
        .level_for("vidrelay", internal_level)
        .chain(std::io::stdout())
        .apply()?;

    Ok(())
}

pub fn main() -> Result<()> {
    // Relay subcommand
    let sc_run = SubCommand::with_name("run")
        .about("announce new uploads of subscribed channels")
        .arg(
            Arg::with_name("cycles")
                .long("cycles")
                .takes_value(true)
                .value_name("N")
                .help("stop after N passes over all subscriptions"),
        )
        .arg(
            Arg::with_name("dry-run")
                .long("dry-run")
                .help("log announcements instead of posting them"),
        );

    let sc_subscriptions =
        SubCommand::with_name("subscriptions").about("list subscribed channel IDs");

    let sc_uploads = SubCommand::with_name("uploads")
        .about("list current uploads of a channel")
        .arg(Arg::with_name("chanid").required(true));

    // Main command
    let app = App::new("vidrelay")
        .about("Relays new Youtube uploads from your subscriptions to a Discord channel")
        .subcommand(sc_run)
        .subcommand(sc_subscriptions)
        .subcommand(sc_uploads)
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .takes_value(false)
                .global(true),
        );

    // Parse
    let app_m = app.get_matches();

    // Logging levels
    let verbosity = app_m.occurrences_of("verbose");
    config_logging(verbosity)?;

    match app_m.subcommand() {
        ("run", Some(sub_m)) => {
            let cycles = sub_m
                .value_of("cycles")
                .map(|c| c.parse::<u64>())
                .transpose()
                .context("--cycles must be a number")?;
            run(cycles, sub_m.is_present("dry-run"))?
        }
        ("subscriptions", Some(_sub_m)) => subscriptions()?,
        ("uploads", Some(sub_m)) => uploads(
            sub_m
                .value_of("chanid")
                .context("required arg chanid missing")?,
        )?,
        _ => {
            return Err(anyhow::anyhow!("Unhandled subcommand"));
        }
    };

    Ok(())
}
