// src/config.rs - Startup configuration, read once from a JSON file
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::SetupError;
use crate::gesture::{IDLE_ROTATION_STEP, SMOOTHING};

pub const CONFIG_ENV: &str = "HAND_ORBIT_CONFIG";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub camera: CameraConfig,
    pub estimator: EstimatorConfig,
    pub gesture: GestureConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    MediaPipe,
    Simulated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delegate {
    Gpu,
    Cpu,
}

impl Delegate {
    pub fn as_arg(self) -> &'static str {
        match self {
            Delegate::Gpu => "GPU",
            Delegate::Cpu => "CPU",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub backend: Backend,
    pub python: PathBuf,
    pub script: PathBuf,
    pub model: PathBuf,
    pub delegate: Delegate,
    /// Run the simulated hand when the model file is missing instead of failing setup.
    pub fallback_to_simulation: bool,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            backend: Backend::MediaPipe,
            python: PathBuf::from("python3"),
            script: PathBuf::from("scripts/hand_landmarker.py"),
            model: PathBuf::from("models/hand_landmarker.task"),
            delegate: Delegate::Gpu,
            fallback_to_simulation: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    pub smoothing: f32,
    pub idle_rotation_step: f32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            smoothing: SMOOTHING,
            idle_rotation_step: IDLE_ROTATION_STEP,
        }
    }
}

impl GestureConfig {
    /// Smoothing must lie in `(0, 1]` and the idle step in `[0, π]`; anything
    /// else could drive the transform to infinity or freeze it.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.smoothing > 0.0 && self.smoothing <= 1.0) {
            return Err(format!("gesture.smoothing must be in (0, 1], got {}", self.smoothing));
        }
        if !(0.0..=std::f32::consts::PI).contains(&self.idle_rotation_step) {
            return Err(format!(
                "gesture.idle_rotation_step must be in [0, pi], got {}",
                self.idle_rotation_step
            ));
        }
        Ok(())
    }
}

impl AppConfig {
    /// `$HAND_ORBIT_CONFIG`, else `config.json` in the platform config directory.
    pub fn default_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        directories::ProjectDirs::from("dev", "handorbit", "hand-orbit")
            .map(|dirs| dirs.config_dir().join("config.json"))
    }

    pub fn load() -> Result<Self, SetupError> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => {
                tracing::info!("no config directory available, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, SetupError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(SetupError::ConfigRead {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let config: Self = serde_json::from_str(&text).map_err(|source| SetupError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        config
            .gesture
            .validate()
            .map_err(|message| SetupError::Setting {
                path: path.to_path_buf(),
                message,
            })?;
        tracing::info!(path = %path.display(), "loaded config");
        Ok(config)
    }
}
