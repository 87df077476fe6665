//! Notification orchestration.
//!
//! When an identity alerts for the first time the `Notifier`:
//! 1. composes the message text,
//! 2. writes a snapshot of the frame with the object boxed in red and the
//!    frame's other overlays drawn in their state colors,
//! 3. appends the detection log,
//! 4. fans the alert out to every channel slot.
//!
//! Each channel is its own failure domain. A send returns a `DispatchOutcome`;
//! errors and panics inside one channel are contained and reported, never
//! propagated to the frame loop and never retried. The one-shot guarantee
//! lives upstream in `AlertDeduplicator`, so it holds whether dispatch runs
//! inline or on the background dispatcher thread.

mod email;
mod telegram;

use anyhow::{anyhow, Result};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

pub use email::EmailChannel;
pub use telegram::TelegramChannel;

use crate::config::WatchConfig;
use crate::detect::BoundingBox;
use crate::frame::Frame;
use crate::journal::DetectionLog;
use crate::render::{draw_overlays, draw_rect, Overlay, FORGOTTEN_COLOR};
use crate::resolve::IdentityKey;
use crate::snapshot::SnapshotWriter;

pub const ALERT_SUBJECT: &str = "Forgotten object";

/// Alert payload handed to every channel.
#[derive(Clone, Debug)]
pub struct Alert {
    pub key: IdentityKey,
    pub bbox: BoundingBox,
    pub subject: String,
    pub message: String,
    /// Time of the forgotten transition, same epoch as the dwell tracker.
    pub raised_at: Duration,
    pub snapshot: Option<PathBuf>,
}

impl Alert {
    pub fn compose(key: IdentityKey, bbox: BoundingBox, raised_at: Duration) -> Self {
        let message = format!("{}: {} ({}, {})", ALERT_SUBJECT, key.label, bbox.x, bbox.y);
        Self {
            key,
            bbox,
            subject: ALERT_SUBJECT.to_string(),
            message,
            raised_at,
            snapshot: None,
        }
    }
}

/// Result of one channel send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    ChannelDisabled,
    Failed(String),
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent => f.write_str("sent"),
            Self::ChannelDisabled => f.write_str("disabled"),
            Self::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

/// A notification transport.
///
/// `send` must not panic or block indefinitely; implementations bound their
/// network I/O with timeouts. Panics are still contained by the orchestrator.
pub trait NotificationChannel: Send {
    fn send(&self, alert: &Alert) -> DispatchOutcome;
}

/// A named channel position that may be unconfigured.
pub struct ChannelSlot {
    name: &'static str,
    channel: Option<Box<dyn NotificationChannel>>,
}

impl ChannelSlot {
    pub fn enabled(name: &'static str, channel: impl NotificationChannel + 'static) -> Self {
        Self {
            name,
            channel: Some(Box::new(channel)),
        }
    }

    pub fn disabled(name: &'static str) -> Self {
        Self {
            name,
            channel: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.channel.is_some()
    }

    fn dispatch(&self, alert: &Alert) -> DispatchOutcome {
        let Some(channel) = &self.channel else {
            return DispatchOutcome::ChannelDisabled;
        };
        catch_unwind(AssertUnwindSafe(|| channel.send(alert)))
            .unwrap_or_else(|_| DispatchOutcome::Failed("channel panicked".to_string()))
    }
}

/// Per-channel outcomes for one alert.
#[derive(Clone, Debug)]
pub struct DispatchReport {
    pub key: IdentityKey,
    pub outcomes: Vec<(&'static str, DispatchOutcome)>,
}

impl DispatchReport {
    pub fn outcome(&self, channel: &str) -> Option<&DispatchOutcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| *name == channel)
            .map(|(_, outcome)| outcome)
    }

    pub fn sent(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| *o == DispatchOutcome::Sent)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, DispatchOutcome::Failed(_)))
            .count()
    }
}

/// Send `alert` through every slot, in order, containing failures.
pub fn dispatch_all(slots: &[ChannelSlot], alert: &Alert) -> DispatchReport {
    let outcomes = slots
        .iter()
        .map(|slot| (slot.name, slot.dispatch(alert)))
        .collect();
    let report = DispatchReport {
        key: alert.key.clone(),
        outcomes,
    };
    log_report(&report);
    report
}

fn log_report(report: &DispatchReport) {
    for (name, outcome) in &report.outcomes {
        match outcome {
            DispatchOutcome::Sent => log::info!("alert {} sent via {}", report.key, name),
            DispatchOutcome::ChannelDisabled => {
                log::debug!("alert {}: {} channel disabled", report.key, name)
            }
            DispatchOutcome::Failed(reason) => {
                log::warn!("alert {}: {} failed: {}", report.key, name, reason)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchMode {
    /// Send on the caller's thread and return the report.
    Inline,
    /// Queue to a dedicated dispatcher thread.
    Background,
}

enum Sink {
    Inline(Vec<ChannelSlot>),
    Background(Dispatcher),
}

/// Background dispatcher: owns the channels and drains a queue of alerts.
struct Dispatcher {
    tx: Option<Sender<Alert>>,
    join: Option<JoinHandle<()>>,
}

impl Dispatcher {
    fn spawn(slots: Vec<ChannelSlot>) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Alert>();
        let join = std::thread::Builder::new()
            .name("alert-dispatch".into())
            .spawn(move || {
                for alert in rx {
                    dispatch_all(&slots, &alert);
                }
                log::debug!("alert dispatcher drained");
            })
            .map_err(|e| anyhow!("failed to spawn alert dispatcher: {}", e))?;
        Ok(Self {
            tx: Some(tx),
            join: Some(join),
        })
    }

    fn enqueue(&self, alert: Alert) {
        let queued = self.tx.as_ref().map(|tx| tx.send(alert));
        if !matches!(queued, Some(Ok(()))) {
            log::error!("alert dispatcher is gone; alert dropped");
        }
    }

    /// Close the queue and wait for queued alerts to be sent.
    fn shutdown(&mut self) {
        self.tx.take();
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::error!("alert dispatcher thread panicked");
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Composes alerts and fans them out to the configured channels.
pub struct Notifier {
    log: DetectionLog,
    snapshots: Option<SnapshotWriter>,
    sink: Sink,
}

impl Notifier {
    pub fn new(
        log: DetectionLog,
        snapshots: Option<SnapshotWriter>,
        slots: Vec<ChannelSlot>,
        mode: DispatchMode,
    ) -> Result<Self> {
        let sink = match mode {
            DispatchMode::Inline => Sink::Inline(slots),
            DispatchMode::Background => Sink::Background(Dispatcher::spawn(slots)?),
        };
        Ok(Self {
            log,
            snapshots,
            sink,
        })
    }

    /// Build the log, snapshot writer and channel slots from configuration.
    pub fn from_config(cfg: &WatchConfig) -> Result<Self> {
        let snapshots = match SnapshotWriter::new(&cfg.snapshot_dir) {
            Ok(writer) => Some(writer),
            Err(err) => {
                log::warn!("snapshots disabled: {:#}", err);
                None
            }
        };
        let email = match &cfg.email {
            Some(settings) => {
                ChannelSlot::enabled("email", EmailChannel::new(settings.clone(), cfg.notify_timeout))
            }
            None => ChannelSlot::disabled("email"),
        };
        let telegram = match &cfg.telegram {
            Some(settings) => ChannelSlot::enabled(
                "telegram",
                TelegramChannel::new(settings.clone(), cfg.notify_timeout),
            ),
            None => ChannelSlot::disabled("telegram"),
        };
        let mode = if cfg.background_dispatch {
            DispatchMode::Background
        } else {
            DispatchMode::Inline
        };
        Self::new(
            DetectionLog::new(&cfg.log_path),
            snapshots,
            vec![email, telegram],
            mode,
        )
    }

    /// Raise the alert for a newly forgotten object.
    ///
    /// `overlays` are the frame's other annotations, drawn on the snapshot
    /// under the alerted box. Returns the dispatch report in inline mode,
    /// `None` when queued.
    pub fn notify(
        &mut self,
        key: IdentityKey,
        bbox: BoundingBox,
        frame: Option<&Frame>,
        overlays: &[Overlay],
        now: Duration,
    ) -> Option<DispatchReport> {
        let mut alert = Alert::compose(key, bbox, now);
        log::warn!("{} [{}]", alert.message, alert.key);

        if let (Some(writer), Some(frame)) = (&self.snapshots, frame) {
            match snapshot_image(frame, overlays, bbox).and_then(|img| writer.write(&alert.key.label, now, &img))
            {
                Ok(path) => alert.snapshot = Some(path),
                Err(err) => log::warn!("snapshot for {} failed: {:#}", alert.key, err),
            }
        }

        if let Err(err) = self.log.append(&alert.message) {
            log::warn!("{:#}", err);
        }

        match &self.sink {
            Sink::Inline(slots) => Some(dispatch_all(slots, &alert)),
            Sink::Background(dispatcher) => {
                dispatcher.enqueue(alert);
                None
            }
        }
    }

    /// Flush queued alerts and stop the dispatcher thread, if any.
    pub fn shutdown(&mut self) {
        if let Sink::Background(dispatcher) = &mut self.sink {
            dispatcher.shutdown();
        }
    }
}

fn snapshot_image(
    frame: &Frame,
    overlays: &[Overlay],
    bbox: BoundingBox,
) -> Result<image::RgbImage> {
    let mut image = frame.to_rgb_image()?;
    draw_overlays(&mut image, overlays);
    draw_rect(&mut image, bbox, FORGOTTEN_COLOR);
    Ok(image)
}
