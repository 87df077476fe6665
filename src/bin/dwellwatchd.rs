//! dwellwatchd - forgotten object watcher daemon
//!
//! Loads the configuration once, runs a single worker in the foreground and
//! exits at end of stream or on Ctrl-C.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use dwell_watch::config::DEFAULT_CONFIG_PATH;
use dwell_watch::{WatchConfig, Worker};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Configuration file (JSON).
    #[arg(long, env = "DWELL_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = WatchConfig::load_from(&args.config)?;
    log::info!(
        "dwellwatchd {} watching {} (forgotten after {}s, targets: {})",
        env!("CARGO_PKG_VERSION"),
        cfg.video_source,
        cfg.forgotten_time.as_secs(),
        cfg.target_objects.join(", ")
    );
    let handle = Worker::from_config(&cfg)?.spawn()?;

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    loop {
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                log::info!("shutdown signal received, stopping worker...");
                return handle.stop();
            }
            Err(RecvTimeoutError::Timeout) if handle.is_finished() => {
                return handle.join();
            }
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
}
