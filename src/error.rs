// src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Failures that end the session before the first tick. The `Display` text is
/// shown to the user as-is.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Camera unavailable: {0}. Check that a camera is connected and that camera access is allowed.")]
    Camera(String),

    #[error("Hand tracking model failed to load: {0}")]
    Model(String),

    #[error("Could not start the hand tracking process: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Could not read configuration file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration in {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration in {path}: {message}")]
    Setting { path: PathBuf, message: String },
}
