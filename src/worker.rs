//! The frame loop and its lifecycle.
//!
//! A `Worker` owns one source, one detector backend and one engine. It runs
//! on its own thread behind a `WorkerHandle`; monitoring reads go through the
//! shared `WorkerStats` atomics. `WorkerSupervisor` guarantees at most one
//! live worker: `restart` stops and joins the previous one before launching.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::config::{VideoSource, WatchConfig};
use crate::detect::{open_backend, DetectorBackend};
use crate::engine::ForgottenObjectEngine;
use crate::ingest::{open_source, FrameSource};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);
/// Pacing for synthetic sources, which never block on capture.
const SYNTHETIC_FRAME_INTERVAL: Duration = Duration::from_millis(100);

/// Wall-clock time on the dwell tracker's epoch.
pub fn now_since_epoch() -> Result<Duration> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| anyhow!("system clock before unix epoch: {}", e))
}

/// Counters shared between the worker thread and monitoring readers.
#[derive(Debug, Default)]
pub struct WorkerStats {
    frames: AtomicU64,
    alerts: AtomicU64,
    tracked: AtomicU64,
    detector_errors: AtomicU64,
    running: AtomicBool,
    failure: Mutex<Option<String>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub frames_processed: u64,
    pub alerts_raised: u64,
    pub tracked_objects: u64,
    pub detector_errors: u64,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl WorkerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_processed: self.frames.load(Ordering::Relaxed),
            alerts_raised: self.alerts.load(Ordering::Relaxed),
            tracked_objects: self.tracked.load(Ordering::Relaxed),
            detector_errors: self.detector_errors.load(Ordering::Relaxed),
            running: self.running.load(Ordering::SeqCst),
            failure: self.failure.lock().ok().and_then(|f| f.clone()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn record_failure(&self, err: &anyhow::Error) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = Some(format!("{err:#}"));
        }
    }
}

pub struct Worker {
    source: Box<dyn FrameSource>,
    backend: Box<dyn DetectorBackend>,
    engine: ForgottenObjectEngine,
    stats: Arc<WorkerStats>,
    frame_interval: Duration,
}

impl Worker {
    pub fn new(
        source: Box<dyn FrameSource>,
        backend: Box<dyn DetectorBackend>,
        engine: ForgottenObjectEngine,
    ) -> Self {
        Self {
            source,
            backend,
            engine,
            stats: Arc::new(WorkerStats::default()),
            frame_interval: Duration::ZERO,
        }
    }

    pub fn from_config(cfg: &WatchConfig) -> Result<Self> {
        let source = open_source(&cfg.video_source)?;
        let backend = open_backend(&cfg.detector)?;
        let engine = ForgottenObjectEngine::from_config(cfg)?;
        let mut worker = Self::new(source, backend, engine);
        if matches!(&cfg.video_source, VideoSource::Path(p) if p.starts_with("stub://")) {
            worker.frame_interval = SYNTHETIC_FRAME_INTERVAL;
        }
        Ok(worker)
    }

    /// Minimum time between frames; zero runs as fast as the source yields.
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Run until end of stream or until `stop` is set. Source errors end the
    /// run with an error; detector errors skip the frame.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<()> {
        self.stats.running.store(true, Ordering::SeqCst);
        let result = self.run_loop(stop);
        self.engine.shutdown();
        if let Err(err) = &result {
            self.stats.record_failure(err);
        }
        self.stats.running.store(false, Ordering::SeqCst);
        result
    }

    fn run_loop(&mut self, stop: &AtomicBool) -> Result<()> {
        self.source.connect().context("connect frame source")?;
        self.backend
            .warm_up()
            .with_context(|| format!("warm up {} detector", self.backend.name()))?;
        log::info!(
            "worker running: source={} detector={}",
            self.source.stats().source,
            self.backend.name()
        );

        let mut last_health_log = Instant::now();
        while !stop.load(Ordering::SeqCst) {
            let started = Instant::now();
            let Some(frame) = self.source.next_frame().context("read frame")? else {
                log::info!(
                    "end of stream after {} frames",
                    self.stats.frames.load(Ordering::Relaxed)
                );
                break;
            };

            match self.backend.detect(&frame) {
                Ok(detections) => {
                    let report = self.engine.process(&frame, &detections, now_since_epoch()?);
                    self.stats
                        .alerts
                        .fetch_add(report.alerted.len() as u64, Ordering::Relaxed);
                    log::debug!(
                        "frame {}: {} detections, {} overlays",
                        frame.index,
                        detections.len(),
                        report.overlays.len()
                    );
                    for caption in report.overlays.iter().filter_map(|o| o.caption()) {
                        log::debug!("frame {}: {}", frame.index, caption);
                    }
                }
                Err(err) => {
                    self.stats.detector_errors.fetch_add(1, Ordering::Relaxed);
                    log::warn!("detector failed on frame {}: {:#}", frame.index, err);
                }
            }
            self.stats.frames.fetch_add(1, Ordering::Relaxed);
            self.stats
                .tracked
                .store(self.engine.tracked() as u64, Ordering::Relaxed);

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                let stats = self.source.stats();
                log::info!(
                    "source health={} frames={} source={} tracked={}",
                    self.source.is_healthy(),
                    stats.frames_captured,
                    stats.source,
                    self.engine.tracked()
                );
                last_health_log = Instant::now();
            }

            if let Some(rest) = self.frame_interval.checked_sub(started.elapsed()) {
                std::thread::sleep(rest);
            }
        }
        Ok(())
    }

    /// Move the worker onto its own thread.
    pub fn spawn(mut self) -> Result<WorkerHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let stats = self.stats();
        let thread_stop = Arc::clone(&stop);
        let join = std::thread::Builder::new()
            .name("dwell-worker".to_string())
            .spawn(move || {
                let result = self.run(&thread_stop);
                if let Err(err) = &result {
                    log::error!("worker stopped: {:#}", err);
                }
                result
            })
            .context("spawn worker thread")?;
        Ok(WorkerHandle {
            stop,
            stats,
            join: Some(join),
        })
    }
}

pub struct WorkerHandle {
    stop: Arc<AtomicBool>,
    stats: Arc<WorkerStats>,
    join: Option<JoinHandle<Result<()>>>,
}

impl WorkerHandle {
    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, |join| join.is_finished())
    }

    /// Signal the worker and wait for it.
    pub fn stop(mut self) -> Result<()> {
        self.stop.store(true, Ordering::SeqCst);
        self.wait()
    }

    /// Wait for the worker to end on its own.
    pub fn join(mut self) -> Result<()> {
        self.wait()
    }

    fn wait(&mut self) -> Result<()> {
        match self.join.take() {
            Some(join) => join
                .join()
                .map_err(|_| anyhow!("worker thread panicked"))?,
            None => Ok(()),
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        let _ = self.wait();
    }
}

/// Builds a worker from a validated configuration.
pub type Launcher = Box<dyn Fn(&WatchConfig) -> Result<Worker> + Send>;

/// Status as reported by the control surface.
#[derive(Clone, Debug, Serialize)]
pub struct SupervisorStatus {
    pub generation: u64,
    pub worker: Option<StatsSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Owns the single live worker.
pub struct WorkerSupervisor {
    launcher: Launcher,
    current: Option<WorkerHandle>,
    generation: u64,
    last_error: Option<String>,
}

impl Default for WorkerSupervisor {
    fn default() -> Self {
        Self::new(Box::new(Worker::from_config))
    }
}

impl WorkerSupervisor {
    pub fn new(launcher: Launcher) -> Self {
        Self {
            launcher,
            current: None,
            generation: 0,
            last_error: None,
        }
    }

    /// Stop the current worker, then start one for `cfg`.
    pub fn restart(&mut self, cfg: &WatchConfig) -> Result<u64> {
        self.relaunch(|launcher| launcher(cfg))
    }

    /// Like `restart`, loading the configuration from `path` first. A load
    /// failure still stops the current worker.
    pub fn restart_from(&mut self, path: &Path) -> Result<u64> {
        self.relaunch(|launcher| {
            let cfg = WatchConfig::load_from(path)?;
            launcher(&cfg)
        })
    }

    fn relaunch(&mut self, build: impl FnOnce(&Launcher) -> Result<Worker>) -> Result<u64> {
        self.stop();
        self.generation += 1;
        match build(&self.launcher).and_then(Worker::spawn) {
            Ok(handle) => {
                log::info!("worker generation {} started", self.generation);
                self.current = Some(handle);
                self.last_error = None;
                Ok(self.generation)
            }
            Err(err) => {
                log::error!("worker generation {} failed to start: {:#}", self.generation, err);
                self.last_error = Some(format!("{err:#}"));
                Err(err)
            }
        }
    }

    /// Stop and join the current worker, if any.
    pub fn stop(&mut self) {
        if let Some(handle) = self.current.take() {
            if let Err(err) = handle.stop() {
                log::warn!("previous worker ended with error: {:#}", err);
            }
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_running(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|handle| handle.stats.is_running() || !handle.is_finished())
    }

    pub fn status(&self) -> SupervisorStatus {
        SupervisorStatus {
            generation: self.generation,
            worker: self.current.as_ref().map(|h| h.stats.snapshot()),
            last_error: self.last_error.clone(),
        }
    }
}

impl Drop for WorkerSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}
