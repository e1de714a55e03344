use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::{CacheCodec, CacheSettings};
use crate::helper::DEFAULT_HELPER_COMMAND;
use crate::ingest::camera::CameraConfig;
use crate::DEFAULT_TICK_MS;

const DEFAULT_REOPEN_BACKOFF_MS: u64 = 1000;
const DEFAULT_OUTPUT_DIR: &str = "./";
const DEFAULT_WINDOW_TITLE: &str = "SpikeBall Live";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SbliveConfigFile {
    camera: Option<CameraConfigFile>,
    cache: Option<CacheConfigFile>,
    helper: Option<HelperConfigFile>,
    tick_interval_ms: Option<u64>,
    reopen_backoff_ms: Option<u64>,
    window_title: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    buffer_frames: Option<u32>,
    read_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CacheConfigFile {
    path: Option<PathBuf>,
    codec: Option<String>,
    fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct HelperConfigFile {
    enabled: Option<bool>,
    command: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct SbliveConfig {
    pub camera: CameraConfig,
    pub cache: CacheSettings,
    pub helper: HelperSettings,
    pub tick_interval: Duration,
    pub reopen_backoff: Duration,
    /// Snapshot export directory (`-o/--output`). Recorded but not yet written to.
    pub output_dir: PathBuf,
    pub window_title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperSettings {
    pub enabled: bool,
    pub command: Vec<String>,
}

impl Default for HelperSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            command: DEFAULT_HELPER_COMMAND.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for SbliveConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            cache: CacheSettings::default(),
            helper: HelperSettings::default(),
            tick_interval: Duration::from_millis(DEFAULT_TICK_MS),
            reopen_backoff: Duration::from_millis(DEFAULT_REOPEN_BACKOFF_MS),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            window_title: DEFAULT_WINDOW_TITLE.to_string(),
        }
    }
}

impl SbliveConfig {
    /// Load from `path`, or from `SBLIVE_CONFIG` when no path is given, then
    /// apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("SBLIVE_CONFIG")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);
        let file_cfg = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => Some(read_config_file(&path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Set the output directory given on the command line.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    fn from_file(file: SbliveConfigFile) -> Result<Self> {
        let defaults = Self::default();

        let camera_file = file.camera.unwrap_or_default();
        let camera = CameraConfig {
            device: camera_file.device.unwrap_or(defaults.camera.device),
            width: camera_file.width.unwrap_or(defaults.camera.width),
            height: camera_file.height.unwrap_or(defaults.camera.height),
            buffer_frames: camera_file
                .buffer_frames
                .unwrap_or(defaults.camera.buffer_frames),
            read_timeout: camera_file
                .read_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.camera.read_timeout),
        };

        let cache_file = file.cache.unwrap_or_default();
        let cache = CacheSettings {
            path: cache_file.path.unwrap_or(defaults.cache.path),
            codec: match cache_file.codec.as_deref() {
                Some(codec) => CacheCodec::parse(codec)?,
                None => defaults.cache.codec,
            },
            fps: cache_file.fps.unwrap_or(defaults.cache.fps),
            width: cache_file.width.unwrap_or(defaults.cache.width),
            height: cache_file.height.unwrap_or(defaults.cache.height),
        };

        let helper_file = file.helper.unwrap_or_default();
        let helper = HelperSettings {
            enabled: helper_file.enabled.unwrap_or(defaults.helper.enabled),
            command: helper_file.command.unwrap_or(defaults.helper.command),
        };

        Ok(Self {
            camera,
            cache,
            helper,
            tick_interval: file
                .tick_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.tick_interval),
            reopen_backoff: file
                .reopen_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.reopen_backoff),
            output_dir: defaults.output_dir,
            window_title: file.window_title.unwrap_or(defaults.window_title),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(device) = std::env::var("SBLIVE_CAMERA_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.device = device.trim().to_string();
            }
        }
        if let Ok(path) = std::env::var("SBLIVE_CACHE_PATH") {
            if !path.trim().is_empty() {
                self.cache.path = PathBuf::from(path);
            }
        }
        if let Ok(codec) = std::env::var("SBLIVE_CACHE_CODEC") {
            if !codec.trim().is_empty() {
                self.cache.codec = CacheCodec::parse(&codec)?;
            }
        }
        if let Ok(command) = std::env::var("SBLIVE_HELPER_CMD") {
            let parsed = split_args(&command);
            if !parsed.is_empty() {
                self.helper.command = parsed;
            }
        }
        if let Ok(tick) = std::env::var("SBLIVE_TICK_MS") {
            let millis: u64 = tick
                .trim()
                .parse()
                .map_err(|_| anyhow!("SBLIVE_TICK_MS must be an integer number of milliseconds"))?;
            self.tick_interval = Duration::from_millis(millis);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.camera.device.trim().is_empty() {
            return Err(anyhow!("camera.device must not be empty"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        if self.camera.buffer_frames == 0 {
            return Err(anyhow!("camera.buffer_frames must be greater than zero"));
        }
        if self.cache.path.as_os_str().is_empty() {
            return Err(anyhow!("cache.path must not be empty"));
        }
        if self.cache.fps == 0 {
            return Err(anyhow!("cache.fps must be greater than zero"));
        }
        if self.cache.width == 0 || self.cache.height == 0 {
            return Err(anyhow!("cache width and height must be greater than zero"));
        }
        if self.tick_interval.is_zero() {
            return Err(anyhow!("tick interval must be greater than zero"));
        }
        if self.helper.enabled && self.helper.command.is_empty() {
            return Err(anyhow!("helper.command must not be empty when the helper is enabled"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<SbliveConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn split_args(value: &str) -> Vec<String> {
    value.split_whitespace().map(|arg| arg.to_string()).collect()
}
