// src/gesture.rs - Fingertip/pinch to rotation/zoom mapping with exponential smoothing
use std::f32::consts::PI;

use crate::tracking::{HandPose, Keypoint};

/// Rotation sweep per unit of fingertip offset from the image centre.
pub const ROTATION_GAIN: f32 = 2.5;
/// Pinch distance (normalized image units) that maps to the far end of the zoom range.
pub const PINCH_NEAR: f32 = 0.05;
/// Spread distance that maps to the near end of the zoom range.
pub const PINCH_FAR: f32 = 0.3;
pub const ZOOM_FAR: f32 = 8.0;
pub const ZOOM_NEAR: f32 = 3.0;
pub const INITIAL_ZOOM: f32 = 5.0;
/// Per-tick interpolation weight toward the gesture target.
pub const SMOOTHING: f32 = 0.1;
/// Radians added to both axes on every tick without a hand.
pub const IDLE_ROTATION_STEP: f32 = 0.005;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandState {
    Present,
    Absent,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureTargets {
    pub rotation_x: f32,
    pub rotation_y: f32,
    pub zoom: f32,
}

impl GestureTargets {
    pub fn from_pose(pose: &HandPose) -> Self {
        let tip = pose.index_tip();
        let (rotation_x, rotation_y) = rotation_target(tip);
        Self {
            rotation_x,
            rotation_y,
            zoom: zoom_target(pinch_distance(pose.thumb_tip(), tip)),
        }
    }

    fn is_finite(&self) -> bool {
        self.rotation_x.is_finite() && self.rotation_y.is_finite() && self.zoom.is_finite()
    }
}

/// Returns `(rotation_x, rotation_y)`. A fingertip at the image centre gives zero
/// on both axes; the image edges give `±ROTATION_GAIN·π/2`.
pub fn rotation_target(tip: &Keypoint) -> (f32, f32) {
    let rotation_y = (tip.x - 0.5) * PI * ROTATION_GAIN;
    let rotation_x = (tip.y - 0.5) * PI * ROTATION_GAIN;
    (rotation_x, rotation_y)
}

pub fn pinch_distance(thumb: &Keypoint, tip: &Keypoint) -> f32 {
    let dx = thumb.x - tip.x;
    let dy = thumb.y - tip.y;
    let dz = thumb.z - tip.z;
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// Maps `[PINCH_NEAR, PINCH_FAR]` onto `[ZOOM_FAR, ZOOM_NEAR]`. The range is
/// inverted on purpose: a closed pinch pulls the camera back to 8, a wide
/// spread brings it in to 3.
pub fn zoom_target(pinch: f32) -> f32 {
    let t = (pinch - PINCH_NEAR) / (PINCH_FAR - PINCH_NEAR);
    let mapped = ZOOM_FAR + t * (ZOOM_NEAR - ZOOM_FAR);
    mapped.clamp(ZOOM_NEAR, ZOOM_FAR)
}

/// Displayed rotation and camera distance, carried across ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformState {
    pub rotation_x: f32,
    pub rotation_y: f32,
    pub zoom: f32,
}

impl Default for TransformState {
    fn default() -> Self {
        Self {
            rotation_x: 0.0,
            rotation_y: 0.0,
            zoom: INITIAL_ZOOM,
        }
    }
}

impl TransformState {
    pub fn approach(&mut self, targets: &GestureTargets, alpha: f32) {
        self.rotation_x += alpha * (targets.rotation_x - self.rotation_x);
        self.rotation_y += alpha * (targets.rotation_y - self.rotation_y);
        self.zoom += alpha * (targets.zoom - self.zoom);
        self.zoom = self.zoom.clamp(ZOOM_NEAR, ZOOM_FAR);
    }

    pub fn idle(&mut self, step: f32) {
        self.rotation_x += step;
        self.rotation_y += step;
    }
}

#[derive(Debug, Clone)]
pub struct GestureMapper {
    pub smoothing: f32,
    pub idle_step: f32,
}

impl Default for GestureMapper {
    fn default() -> Self {
        Self {
            smoothing: SMOOTHING,
            idle_step: IDLE_ROTATION_STEP,
        }
    }
}

impl GestureMapper {
    /// Out-of-range settings fall back to the defaults so the transform stays
    /// finite.
    pub fn new(smoothing: f32, idle_step: f32) -> Self {
        let smoothing = if smoothing > 0.0 && smoothing <= 1.0 {
            smoothing
        } else {
            tracing::warn!(smoothing, "smoothing out of range, using {SMOOTHING}");
            SMOOTHING
        };
        let idle_step = if (0.0..=PI).contains(&idle_step) {
            idle_step
        } else {
            tracing::warn!(idle_step, "idle rotation step out of range, using {IDLE_ROTATION_STEP}");
            IDLE_ROTATION_STEP
        };
        Self {
            smoothing,
            idle_step,
        }
    }

    /// Advances `state` by one tick. Short or non-finite keypoint sets fall back
    /// to the idle policy exactly like an empty detection.
    pub fn step(&self, state: &mut TransformState, detection: Option<&[Keypoint]>) -> HandState {
        let targets = detection
            .and_then(HandPose::from_keypoints)
            .map(|pose| GestureTargets::from_pose(&pose))
            .filter(GestureTargets::is_finite);

        match targets {
            Some(targets) => {
                state.approach(&targets, self.smoothing);
                HandState::Present
            }
            None => {
                state.idle(self.idle_step);
                HandState::Absent
            }
        }
    }
}
