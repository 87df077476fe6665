//! Per-frame classification engine.
//!
//! Detection → identity key → dwell classification → one-shot gate →
//! notification. The engine owns all tracking state and is driven by exactly
//! one thread (the worker); it holds no locks.

use anyhow::Result;
use std::collections::HashMap;
use std::time::Duration;

use crate::alert::AlertDeduplicator;
use crate::config::WatchConfig;
use crate::detect::Detection;
use crate::dwell::{DwellState, DwellTracker};
use crate::frame::Frame;
use crate::notify::{DispatchReport, Notifier};
use crate::render::Overlay;
use crate::resolve::{IdentityKey, IdentityResolver};

/// What one frame produced.
#[derive(Debug, Default)]
pub struct FrameReport {
    /// One overlay per accepted detection, Fresh or Forgotten.
    pub overlays: Vec<Overlay>,
    /// Keys that alerted on this frame.
    pub alerted: Vec<IdentityKey>,
    /// Dispatch reports for inline notifiers.
    pub dispatches: Vec<DispatchReport>,
    /// Tracked objects evicted after this frame.
    pub evicted: usize,
}

pub struct ForgottenObjectEngine {
    resolver: IdentityResolver,
    tracker: DwellTracker,
    alerts: AlertDeduplicator,
    notifier: Notifier,
    match_radius: Option<u32>,
    idle_eviction: Option<Duration>,
}

impl ForgottenObjectEngine {
    pub fn new(resolver: IdentityResolver, tracker: DwellTracker, notifier: Notifier) -> Self {
        Self {
            resolver,
            tracker,
            alerts: AlertDeduplicator::new(),
            notifier,
            match_radius: None,
            idle_eviction: None,
        }
    }

    pub fn from_config(cfg: &WatchConfig) -> Result<Self> {
        let engine = Self::new(
            IdentityResolver::from_config(cfg),
            DwellTracker::new(cfg.forgotten_time),
            Notifier::from_config(cfg)?,
        )
        .with_match_radius(cfg.match_radius)
        .with_idle_eviction(cfg.idle_eviction);
        Ok(engine)
    }

    /// Re-anchor new keys onto tracked keys within `radius` pixels.
    pub fn with_match_radius(mut self, radius: Option<u32>) -> Self {
        self.match_radius = radius;
        self
    }

    /// Forget objects unseen for longer than `idle`.
    pub fn with_idle_eviction(mut self, idle: Option<Duration>) -> Self {
        self.idle_eviction = idle;
        self
    }

    /// Classify one frame's detections at time `now`.
    pub fn process(&mut self, frame: &Frame, detections: &[Detection], now: Duration) -> FrameReport {
        let mut report = FrameReport::default();
        let mut observed: HashMap<IdentityKey, DwellState> = HashMap::new();

        for detection in detections {
            let Some(key) = self.resolver.resolve(detection, frame.width, frame.height) else {
                continue;
            };
            let key = match self.match_radius {
                Some(radius) => self.tracker.anchor(key, radius),
                None => key,
            };

            let state = match observed.get(&key) {
                Some(state) => *state,
                None => {
                    let state = self.tracker.observe(&key, now);
                    observed.insert(key.clone(), state);
                    state
                }
            };

            if state == DwellState::Forgotten && self.alerts.should_alert(&key) {
                report.alerted.push(key.clone());
                if let Some(dispatch) = self.notifier.notify(
                    key.clone(),
                    detection.bbox,
                    Some(frame),
                    &report.overlays,
                    now,
                ) {
                    report.dispatches.push(dispatch);
                }
            }

            report.overlays.push(Overlay {
                bbox: detection.bbox,
                label: key.label,
                state,
            });
        }

        if let Some(idle) = self.idle_eviction {
            report.evicted = self.tracker.evict_idle(now, idle);
            if report.evicted > 0 {
                log::debug!(
                    "evicted {} idle objects, {} still tracked",
                    report.evicted,
                    self.tracker.len()
                );
            }
        }

        report
    }

    pub fn tracked(&self) -> usize {
        self.tracker.len()
    }

    pub fn alerted(&self) -> usize {
        self.alerts.len()
    }

    /// Flush pending notifications.
    pub fn shutdown(&mut self) {
        self.notifier.shutdown();
    }
}
