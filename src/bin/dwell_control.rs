//! dwell_control - configuration form and worker supervisor
//!
//! Serves the loopback control surface. A worker is started from the
//! existing configuration when it loads; every form submission rewrites the
//! file and restarts the worker.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::{mpsc, Arc, Mutex};

use dwell_watch::config::DEFAULT_CONFIG_PATH;
use dwell_watch::{ControlConfig, ControlServer, WorkerSupervisor};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Address for the control surface (loopback recommended).
    #[arg(long, env = "DWELL_CONTROL_ADDR", default_value = "127.0.0.1:8780")]
    addr: String,
    /// Configuration file rewritten by the form.
    #[arg(long, env = "DWELL_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let supervisor = Arc::new(Mutex::new(WorkerSupervisor::default()));
    if args.config.exists() {
        let started = supervisor
            .lock()
            .map_err(|_| anyhow!("supervisor lock poisoned"))?
            .restart_from(&args.config);
        if let Err(err) = started {
            log::warn!("existing configuration not started: {:#}", err);
        }
    } else {
        log::info!(
            "no configuration at {}; waiting for the form",
            args.config.display()
        );
    }

    let handle = ControlServer::new(
        ControlConfig {
            addr: args.addr,
            config_path: args.config,
        },
        Arc::clone(&supervisor),
    )
    .spawn()?;
    log::info!("control surface listening on http://{}", handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("dwell_control waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping...");
    handle.stop()?;
    supervisor
        .lock()
        .map_err(|_| anyhow!("supervisor lock poisoned"))?
        .stop();
    Ok(())
}
