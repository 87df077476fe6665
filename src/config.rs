use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DEFAULT_GRID_CELL: u32 = 1;
const DEFAULT_LOG_PATH: &str = "detections.log";
const DEFAULT_SNAPSHOT_DIR: &str = "snapshots";
const DEFAULT_SMTP_RELAY: &str = "127.0.0.1:25";
const DEFAULT_NOTIFY_TIMEOUT_SECS: u64 = 10;
const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// On-disk configuration. Every field is optional here; `WatchConfig::from_file`
/// decides which absences are fatal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_area: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forgotten_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_source: Option<VideoSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_objects: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_notify: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_chat_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_threshold: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_cell: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_radius: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_eviction_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp_relay: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_api_base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_dispatch: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detector: Option<DetectorConfigFile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectorConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_path: Option<PathBuf>,
}

impl WatchConfigFile {
    /// Read a configuration file without validating it.
    pub fn read(path: &Path) -> Result<Self> {
        read_config_file(path)
    }

    /// Write the file as pretty JSON, replacing any previous content.
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, format!("{json}\n"))
            .map_err(|e| anyhow!("failed to write config file {}: {}", path.display(), e))
    }
}

/// Where frames come from: a capture device index or a path/URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VideoSource {
    Device(u32),
    Path(String),
}

impl VideoSource {
    /// Parse a form or environment value. All-digit strings are device indices.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(anyhow!("video_source must not be empty"));
        }
        if value.bytes().all(|b| b.is_ascii_digit()) {
            let index = value
                .parse()
                .map_err(|_| anyhow!("video_source device index out of range: {}", value))?;
            return Ok(Self::Device(index));
        }
        Ok(Self::Path(value.to_string()))
    }

    fn normalized(self) -> Result<Self> {
        match self {
            Self::Path(path) => Self::parse(&path),
            device => Ok(device),
        }
    }
}

impl fmt::Display for VideoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(index) => write!(f, "device:{index}"),
            Self::Path(path) => f.write_str(path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailSettings {
    /// Sender and recipient address.
    pub address: String,
    /// Local mail relay, `host:port`.
    pub relay: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramSettings {
    pub token: String,
    pub chat_id: String,
    pub api_base: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectorSettings {
    pub model_path: Option<PathBuf>,
    pub script_path: Option<PathBuf>,
}

/// Validated configuration for one worker run.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub min_area: i64,
    pub forgotten_time: Duration,
    pub video_source: VideoSource,
    pub target_objects: Vec<String>,
    pub confidence_threshold: f32,
    pub grid_cell: u32,
    pub match_radius: Option<u32>,
    pub idle_eviction: Option<Duration>,
    pub log_path: PathBuf,
    pub snapshot_dir: PathBuf,
    pub email: Option<EmailSettings>,
    pub telegram: Option<TelegramSettings>,
    pub notify_timeout: Duration,
    pub background_dispatch: bool,
    pub detector: DetectorSettings,
}

impl WatchConfig {
    /// Load from `DWELL_CONFIG` (or `config.json`), apply env overrides, validate.
    pub fn load() -> Result<Self> {
        let path = std::env::var("DWELL_CONFIG")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path))
    }

    /// Load a specific file, apply env overrides, validate.
    pub fn load_from(path: &Path) -> Result<Self> {
        let file = read_config_file(path)?;
        let mut cfg = Self::from_file(file)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Convert a parsed file. Missing core fields are fatal; channel problems
    /// only disable the channel.
    pub fn from_file(file: WatchConfigFile) -> Result<Self> {
        let min_area = file.min_area.ok_or_else(|| missing("min_area"))?;
        let forgotten_time = file
            .forgotten_time
            .map(Duration::from_secs)
            .ok_or_else(|| missing("forgotten_time"))?;
        let video_source = file
            .video_source
            .ok_or_else(|| missing("video_source"))?
            .normalized()?;
        let target_objects = file
            .target_objects
            .unwrap_or_default()
            .into_iter()
            .map(|label| label.trim().to_string())
            .filter(|label| !label.is_empty())
            .collect();

        let email = file
            .email_notify
            .map(|address| address.trim().to_string())
            .filter(|address| !address.is_empty())
            .map(|address| EmailSettings {
                address,
                relay: file
                    .smtp_relay
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SMTP_RELAY.to_string()),
            });
        let telegram = telegram_settings(
            file.telegram_token.as_deref(),
            file.telegram_chat_id.as_deref(),
            file.telegram_api_base
                .unwrap_or_else(|| DEFAULT_TELEGRAM_API_BASE.to_string()),
        );
        let detector = file
            .detector
            .map(|d| DetectorSettings {
                model_path: d.model_path,
                script_path: d.script_path,
            })
            .unwrap_or_default();

        Ok(Self {
            min_area,
            forgotten_time,
            video_source,
            target_objects,
            confidence_threshold: file
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            grid_cell: file.grid_cell.unwrap_or(DEFAULT_GRID_CELL),
            match_radius: file.match_radius,
            idle_eviction: file.idle_eviction_secs.map(Duration::from_secs),
            log_path: file
                .log_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_PATH)),
            snapshot_dir: file
                .snapshot_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_DIR)),
            email,
            telegram,
            notify_timeout: Duration::from_secs(
                file.notify_timeout_secs
                    .unwrap_or(DEFAULT_NOTIFY_TIMEOUT_SECS),
            ),
            background_dispatch: file.background_dispatch.unwrap_or(true),
            detector,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(source) = std::env::var("DWELL_VIDEO_SOURCE") {
            if !source.trim().is_empty() {
                self.video_source = VideoSource::parse(&source)?;
            }
        }
        if let Ok(secs) = std::env::var("DWELL_FORGOTTEN_TIME") {
            if !secs.trim().is_empty() {
                let secs: u64 = secs.trim().parse().map_err(|_| {
                    anyhow!("DWELL_FORGOTTEN_TIME must be an integer number of seconds")
                })?;
                self.forgotten_time = Duration::from_secs(secs);
            }
        }
        if let Ok(path) = std::env::var("DWELL_LOG_PATH") {
            if !path.trim().is_empty() {
                self.log_path = PathBuf::from(path);
            }
        }
        if let Ok(dir) = std::env::var("DWELL_SNAPSHOT_DIR") {
            if !dir.trim().is_empty() {
                self.snapshot_dir = PathBuf::from(dir);
            }
        }
        if let Ok(relay) = std::env::var("DWELL_SMTP_RELAY") {
            if !relay.trim().is_empty() {
                if let Some(email) = self.email.as_mut() {
                    email.relay = relay;
                }
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.min_area < 0 {
            return Err(anyhow!("min_area must not be negative"));
        }
        if !(0.0..1.0).contains(&self.confidence_threshold) {
            return Err(anyhow!("confidence_threshold must be within [0, 1)"));
        }
        if self.grid_cell == 0 {
            return Err(anyhow!("grid_cell must be at least 1"));
        }
        if self.notify_timeout.is_zero() {
            return Err(anyhow!("notify_timeout_secs must be greater than zero"));
        }
        if self.target_objects.is_empty() {
            log::warn!("target_objects is empty; no detection will ever be tracked");
        }
        if let Some(email) = &self.email {
            if !email.address.contains('@') {
                log::warn!(
                    "email channel disabled: '{}' is not an email address",
                    email.address
                );
                self.email = None;
            }
        }
        Ok(())
    }
}

fn telegram_settings(
    token: Option<&str>,
    chat_id: Option<&str>,
    api_base: String,
) -> Option<TelegramSettings> {
    let token = token.map(str::trim).filter(|t| !t.is_empty());
    let chat_id = chat_id.map(str::trim).filter(|c| !c.is_empty());
    match (token, chat_id) {
        (Some(token), Some(chat_id)) => Some(TelegramSettings {
            token: token.to_string(),
            chat_id: chat_id.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }),
        (None, None) => None,
        _ => {
            log::warn!(
                "telegram channel disabled: telegram_token and telegram_chat_id are both required"
            );
            None
        }
    }
}

fn missing(field: &str) -> anyhow::Error {
    anyhow!("config is missing required field `{}`", field)
}

fn read_config_file(path: &Path) -> Result<WatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

pub(crate) fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
