// src/mediapipe_bridge.rs - MediaPipe hand landmarker behind a helper process
use anyhow::{Context, Result};
use serde::Deserialize;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use crate::config::EstimatorConfig;
use crate::error::SetupError;
use crate::tracking::{Detection, Keypoint, PoseEstimator};
use crate::video::Frame;

const NUM_HANDS: u32 = 1;
const RUNNING_MODE: &str = "VIDEO";
const READY: &str = "READY";
const RGB_CHANNELS: u32 = 3;

#[derive(Debug, Deserialize)]
struct LandmarkJson {
    x: f32,
    y: f32,
    z: f32,
    #[serde(default)]
    visibility: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct HandJson {
    #[serde(default)]
    score: f32,
    landmarks: Vec<LandmarkJson>,
}

#[derive(Debug, Deserialize)]
struct ResponseJson {
    #[serde(default)]
    hands: Vec<HandJson>,
    #[serde(default)]
    error: Option<String>,
}

/// Frame header: width, height, channel count and timestamp in milliseconds,
/// all little-endian.
pub fn encode_header(width: u32, height: u32, channels: u32, timestamp_ms: u64) -> [u8; 20] {
    let mut header = [0u8; 20];
    header[0..4].copy_from_slice(&width.to_le_bytes());
    header[4..8].copy_from_slice(&height.to_le_bytes());
    header[8..12].copy_from_slice(&channels.to_le_bytes());
    header[12..20].copy_from_slice(&timestamp_ms.to_le_bytes());
    header
}

/// Parses one response line. Only the first hand is kept; landmark count is
/// not checked here.
pub fn parse_response(line: &str) -> Result<Detection> {
    let response: ResponseJson = serde_json::from_str(line.trim())
        .with_context(|| format!("malformed landmarker response: {}", line.trim()))?;

    if let Some(error) = response.error {
        tracing::warn!("landmarker reported an error: {error}");
        return Ok(None);
    }

    Ok(response.hands.into_iter().next().map(|hand| {
        tracing::debug!(score = hand.score, points = hand.landmarks.len(), "hand detected");
        hand.landmarks
            .into_iter()
            .map(|lm| Keypoint {
                x: lm.x,
                y: lm.y,
                z: lm.z,
                visibility: lm.visibility,
            })
            .collect()
    }))
}

pub struct MediaPipeBridge {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    last_timestamp_ms: Option<u64>,
}

impl MediaPipeBridge {
    pub fn spawn(config: &EstimatorConfig) -> Result<Self, SetupError> {
        if !config.model.exists() {
            return Err(SetupError::Model(format!(
                "model file not found at {}",
                config.model.display()
            )));
        }
        if !config.script.exists() {
            return Err(SetupError::Model(format!(
                "landmarker script not found at {}",
                config.script.display()
            )));
        }

        tracing::info!(
            model = %config.model.display(),
            delegate = config.delegate.as_arg(),
            "starting MediaPipe hand landmarker"
        );

        let mut process = Command::new(&config.python)
            .arg(&config.script)
            .arg("--model")
            .arg(&config.model)
            .args(["--delegate", config.delegate.as_arg()])
            .args(["--num-hands", &NUM_HANDS.to_string()])
            .args(["--running-mode", RUNNING_MODE])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        let (stdin, stdout) = match (process.stdin.take(), process.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = process.kill();
                let _ = process.wait();
                return Err(SetupError::Model("landmarker pipes unavailable".to_string()));
            }
        };
        let mut bridge = Self {
            process,
            stdin,
            stdout: BufReader::new(stdout),
            last_timestamp_ms: None,
        };

        // Early returns below drop `bridge`, which reaps the child.
        let mut line = String::new();
        let read = bridge.stdout.read_line(&mut line)?;
        if read == 0 {
            return Err(SetupError::Model(
                "landmarker exited during initialization".to_string(),
            ));
        }
        if line.trim() != READY {
            return Err(SetupError::Model(format!(
                "unexpected landmarker handshake: {}",
                line.trim()
            )));
        }

        tracing::info!("MediaPipe hand landmarker ready");
        Ok(bridge)
    }

    // VIDEO mode rejects non-increasing timestamps.
    fn next_timestamp_ms(&mut self, frame: &Frame) -> u64 {
        let mut ms = frame.timestamp.as_millis() as u64;
        if let Some(last) = self.last_timestamp_ms {
            if ms <= last {
                ms = last + 1;
            }
        }
        self.last_timestamp_ms = Some(ms);
        ms
    }
}

impl PoseEstimator for MediaPipeBridge {
    fn name(&self) -> &'static str {
        "mediapipe"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Detection> {
        let timestamp_ms = self.next_timestamp_ms(frame);
        let header = encode_header(frame.width(), frame.height(), RGB_CHANNELS, timestamp_ms);

        self.stdin.write_all(&header).context("failed to send frame header")?;
        self.stdin
            .write_all(frame.image.as_raw())
            .context("failed to send frame data")?;
        self.stdin.flush()?;

        let mut line = String::new();
        let read = self
            .stdout
            .read_line(&mut line)
            .context("failed to read landmarker response")?;
        if read == 0 {
            anyhow::bail!("landmarker process closed its output");
        }

        parse_response(&line)
    }
}

impl Drop for MediaPipeBridge {
    fn drop(&mut self) {
        tracing::info!("shutting down MediaPipe hand landmarker");
        let _ = self.process.kill();
        let _ = self.process.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_little_endian() {
        let header = encode_header(640, 480, 3, 0x0102);
        assert_eq!(header.len(), 20);
        assert_eq!(&header[0..4], &640u32.to_le_bytes());
        assert_eq!(&header[4..8], &480u32.to_le_bytes());
        assert_eq!(&header[8..12], &[3, 0, 0, 0]);
        assert_eq!(&header[12..14], &[0x02, 0x01]);
    }

    #[test]
    fn first_hand_is_returned() {
        let line = r#"{"hands":[
            {"score":0.9,"landmarks":[{"x":0.1,"y":0.2,"z":-0.1,"visibility":0.8},{"x":0.3,"y":0.4,"z":0.0}]},
            {"score":0.5,"landmarks":[]}
        ]}"#;
        let points = parse_response(line).unwrap().unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].visibility, Some(0.8));
        assert_eq!(points[1].visibility, None);
        assert_eq!(points[1].x, 0.3);
    }

    #[test]
    fn empty_hands_is_no_detection() {
        assert!(parse_response(r#"{"hands":[]}"#).unwrap().is_none());
        assert!(parse_response("{}\n").unwrap().is_none());
    }

    #[test]
    fn reported_error_is_no_detection() {
        let detection = parse_response(r#"{"hands":[],"error":"bad frame"}"#).unwrap();
        assert!(detection.is_none());
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_response("Traceback (most recent call last):").is_err());
    }

    #[test]
    fn missing_model_fails_setup() {
        let config = EstimatorConfig {
            model: std::env::temp_dir().join("hand-orbit-missing.task"),
            ..EstimatorConfig::default()
        };
        match MediaPipeBridge::spawn(&config) {
            Err(SetupError::Model(message)) => assert!(message.contains("hand-orbit-missing")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("spawn should fail without a model"),
        }
    }
}
