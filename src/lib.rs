//! dwell-watch: forgotten object detection.
//!
//! A camera or video file is scanned frame by frame. Each detection that
//! passes the confidence, label and area filters is reduced to an identity
//! key; an identity that stays in view longer than the configured
//! `forgotten_time` is classified Forgotten and raises exactly one alert
//! (detection log line, snapshot, email and/or Telegram message).
//!
//! # Module Structure
//!
//! - `frame`: decoded RGB frames
//! - `ingest`: frame sources (synthetic, V4L2 devices, local files)
//! - `detect`: detector backends and detection types
//! - `resolve`, `dwell`, `alert`: identity keys, dwell classification, one-shot gate
//! - `engine`: the per-frame pipeline tying the above together
//! - `notify`, `journal`, `snapshot`, `render`: alert side effects
//! - `worker`: the frame loop thread and its supervisor
//! - `control`: loopback configuration form and status endpoints

pub mod alert;
pub mod config;
pub mod control;
pub mod detect;
pub mod dwell;
pub mod engine;
pub mod frame;
pub mod ingest;
pub mod journal;
pub mod notify;
pub mod render;
pub mod resolve;
pub mod snapshot;
pub mod worker;

pub use alert::AlertDeduplicator;
pub use config::{VideoSource, WatchConfig, WatchConfigFile};
pub use control::{ControlConfig, ControlHandle, ControlServer};
pub use detect::{BoundingBox, Detection, DetectorBackend, ScriptedBackend};
pub use dwell::{DwellState, DwellTracker};
pub use engine::{ForgottenObjectEngine, FrameReport};
pub use frame::Frame;
pub use ingest::{open_source, FrameSource};
pub use notify::{Alert, ChannelSlot, DispatchMode, DispatchOutcome, NotificationChannel, Notifier};
pub use resolve::{IdentityKey, IdentityResolver};
pub use worker::{Worker, WorkerHandle, WorkerStats, WorkerSupervisor};
