use anyhow::Result;

#[macro_use]
extern crate serde_derive;

mod auth;
mod cli;
mod common;
mod config;
mod driver;
mod notify;
mod source;
mod watcher;
mod watermark;

fn main() -> Result<()> {
    cli::main()
}
