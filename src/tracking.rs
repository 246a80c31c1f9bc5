// src/tracking.rs - Hand keypoints and the pose estimator seam
use anyhow::Result;
use std::f32::consts::PI;

use crate::video::Frame;

pub const WRIST: usize = 0;
pub const THUMB_CMC: usize = 1;
pub const THUMB_MCP: usize = 2;
pub const THUMB_IP: usize = 3;
pub const THUMB_TIP: usize = 4;
pub const INDEX_MCP: usize = 5;
pub const INDEX_PIP: usize = 6;
pub const INDEX_DIP: usize = 7;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_MCP: usize = 9;
pub const MIDDLE_PIP: usize = 10;
pub const MIDDLE_DIP: usize = 11;
pub const MIDDLE_TIP: usize = 12;
pub const RING_MCP: usize = 13;
pub const RING_PIP: usize = 14;
pub const RING_DIP: usize = 15;
pub const RING_TIP: usize = 16;
pub const PINKY_MCP: usize = 17;
pub const PINKY_PIP: usize = 18;
pub const PINKY_DIP: usize = 19;
pub const PINKY_TIP: usize = 20;

pub const HAND_KEYPOINTS: usize = 21;

/// Bone segments of the 21-point hand graph, for the debug overlay. The palm is
/// closed by the wrist links to the thumb, index and pinky plus the knuckle line.
#[rustfmt::skip]
pub const HAND_CONNECTIONS: [(usize, usize); 21] = [
    (WRIST, THUMB_CMC), (THUMB_CMC, THUMB_MCP), (THUMB_MCP, THUMB_IP), (THUMB_IP, THUMB_TIP),
    (WRIST, INDEX_MCP), (INDEX_MCP, INDEX_PIP), (INDEX_PIP, INDEX_DIP), (INDEX_DIP, INDEX_TIP),
    (MIDDLE_MCP, MIDDLE_PIP), (MIDDLE_PIP, MIDDLE_DIP), (MIDDLE_DIP, MIDDLE_TIP),
    (RING_MCP, RING_PIP), (RING_PIP, RING_DIP), (RING_DIP, RING_TIP),
    (WRIST, PINKY_MCP), (PINKY_MCP, PINKY_PIP), (PINKY_PIP, PINKY_DIP), (PINKY_DIP, PINKY_TIP),
    (INDEX_MCP, MIDDLE_MCP), (MIDDLE_MCP, RING_MCP), (RING_MCP, PINKY_MCP),
];

/// One tracked point in normalized image space. `z` is depth relative to the wrist.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub visibility: Option<f32>,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            visibility: None,
        }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Raw estimator output for one frame, before validation.
pub type Detection = Option<Vec<Keypoint>>;

/// A validated single-hand pose: always exactly 21 finite keypoints.
#[derive(Debug, Clone, PartialEq)]
pub struct HandPose {
    keypoints: [Keypoint; HAND_KEYPOINTS],
}

impl HandPose {
    /// `None` for fewer than 21 points or any non-finite coordinate. Points past
    /// index 20 are ignored.
    pub fn from_keypoints(points: &[Keypoint]) -> Option<Self> {
        if points.len() < HAND_KEYPOINTS {
            return None;
        }
        let mut keypoints = [Keypoint::default(); HAND_KEYPOINTS];
        for (slot, point) in keypoints.iter_mut().zip(points) {
            if !point.is_finite() {
                return None;
            }
            *slot = *point;
        }
        Some(Self { keypoints })
    }

    pub fn keypoints(&self) -> &[Keypoint; HAND_KEYPOINTS] {
        &self.keypoints
    }

    pub fn thumb_tip(&self) -> &Keypoint {
        &self.keypoints[THUMB_TIP]
    }

    pub fn index_tip(&self) -> &Keypoint {
        &self.keypoints[INDEX_TIP]
    }
}

/// Single-hand landmark detector. Implementations may queue work on an
/// accelerator; the loop sees a synchronous call per new frame.
pub trait PoseEstimator {
    fn name(&self) -> &'static str;

    fn detect(&mut self, frame: &Frame) -> Result<Detection>;
}

/// Synthetic hand that sweeps the fingertip along a slow Lissajous path and
/// opens and closes the pinch. Used when no landmark model is installed.
pub struct SimulatedHand {
    pub sweep_x: f32,
    pub sweep_y: f32,
    /// Seconds of every period spent with the hand out of view.
    pub absent_window: f32,
    pub period: f32,
}

impl Default for SimulatedHand {
    fn default() -> Self {
        Self {
            sweep_x: 0.3,
            sweep_y: 0.25,
            absent_window: 2.0,
            period: 20.0,
        }
    }
}

// Template hand in image-space offsets from the wrist, fingers pointing up.
const FINGER_BASES: [(f32, f32); 4] = [(-0.05, -0.12), (-0.015, -0.13), (0.02, -0.125), (0.05, -0.11)];
const FINGER_LENGTHS: [f32; 4] = [0.16, 0.175, 0.16, 0.13];

impl SimulatedHand {
    pub fn pose_at(&self, t: f32) -> Option<Vec<Keypoint>> {
        if self.period > 0.0 && t.rem_euclid(self.period) > self.period - self.absent_window {
            return None;
        }

        let tip = (
            0.5 + self.sweep_x * (0.7 * t).sin(),
            0.5 + self.sweep_y * (0.9 * t).sin(),
        );
        let pinch = 0.175 + 0.15 * (0.5 * t).sin();

        let mut points = vec![Keypoint::default(); HAND_KEYPOINTS];
        let wrist = (tip.0 + 0.015, tip.1 + FINGER_BASES[0].1.abs() + FINGER_LENGTHS[0]);
        points[WRIST] = Keypoint::new(wrist.0, wrist.1, 0.0);

        for (finger, (&(bx, by), &len)) in FINGER_BASES.iter().zip(&FINGER_LENGTHS).enumerate() {
            let mcp = INDEX_MCP + finger * 4;
            let base = (wrist.0 + bx, wrist.1 + by);
            // The index finger runs straight to the fingertip target; the others fan out.
            let dir = if finger == 0 {
                let (dx, dy) = (tip.0 - base.0, tip.1 - base.1);
                let n = (dx * dx + dy * dy).sqrt().max(1e-6);
                (dx / n, dy / n)
            } else {
                let angle = -PI / 2.0 + (finger as f32 - 1.5) * 0.12;
                (angle.cos(), angle.sin())
            };
            for joint in 0..4 {
                let f = joint as f32 / 3.0;
                points[mcp + joint] = Keypoint::new(
                    base.0 + dir.0 * len * f,
                    base.1 + dir.1 * len * f,
                    -0.01 * joint as f32,
                );
            }
        }
        points[INDEX_TIP] = Keypoint::new(tip.0, tip.1, -0.03);

        let thumb_tip = (tip.0 - pinch * 0.8, tip.1 + pinch * 0.6);
        for joint in 0..4 {
            let f = (joint + 1) as f32 / 4.0;
            points[THUMB_CMC + joint] = Keypoint::new(
                wrist.0 + (thumb_tip.0 - wrist.0) * f,
                wrist.1 + (thumb_tip.1 - wrist.1) * f,
                -0.01 * joint as f32,
            );
        }
        points[THUMB_TIP] = Keypoint::new(thumb_tip.0, thumb_tip.1, -0.03);

        Some(points)
    }
}

impl PoseEstimator for SimulatedHand {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Detection> {
        Ok(self.pose_at(frame.timestamp.as_secs_f32()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::pinch_distance;
    use std::time::Duration;

    fn hand(n: usize) -> Vec<Keypoint> {
        (0..n).map(|i| Keypoint::new(i as f32 / 30.0, 0.5, 0.0)).collect()
    }

    #[test]
    fn pose_requires_twenty_one_points() {
        assert!(HandPose::from_keypoints(&hand(20)).is_none());
        assert!(HandPose::from_keypoints(&[]).is_none());
        assert!(HandPose::from_keypoints(&hand(21)).is_some());
    }

    #[test]
    fn extra_points_are_ignored() {
        let pose = HandPose::from_keypoints(&hand(22)).unwrap();
        assert_eq!(pose.keypoints().len(), HAND_KEYPOINTS);
        assert_eq!(pose.index_tip().x, 8.0 / 30.0);
    }

    #[test]
    fn non_finite_points_are_rejected() {
        let mut points = hand(21);
        points[INDEX_TIP].y = f32::NAN;
        assert!(HandPose::from_keypoints(&points).is_none());
    }

    #[test]
    fn connections_stay_in_range() {
        for (a, b) in HAND_CONNECTIONS {
            assert!(a < HAND_KEYPOINTS && b < HAND_KEYPOINTS && a != b);
        }
    }

    #[test]
    fn connections_match_the_hand_graph() {
        let mut degree = [0usize; HAND_KEYPOINTS];
        for (i, &(a, b)) in HAND_CONNECTIONS.iter().enumerate() {
            let earlier = &HAND_CONNECTIONS[..i];
            assert!(!earlier.contains(&(a, b)) && !earlier.contains(&(b, a)));
            degree[a] += 1;
            degree[b] += 1;
        }
        assert!(degree.iter().all(|&d| d > 0));
        assert_eq!(degree[WRIST], 3);
        assert_eq!(degree[THUMB_CMC], 2);
        for tip in [THUMB_TIP, INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP] {
            assert_eq!(degree[tip], 1);
        }
        assert!(!HAND_CONNECTIONS.contains(&(THUMB_CMC, INDEX_MCP)));
        assert!(!HAND_CONNECTIONS.contains(&(WRIST, MIDDLE_MCP)));
    }

    #[test]
    fn simulated_hand_is_valid_and_moves() {
        let sim = SimulatedHand::default();
        let a = HandPose::from_keypoints(&sim.pose_at(1.0).unwrap()).unwrap();
        let b = HandPose::from_keypoints(&sim.pose_at(3.0).unwrap()).unwrap();
        assert_ne!(a.index_tip(), b.index_tip());

        let expected = 0.175 + 0.15 * 0.5f32.sin();
        assert!((pinch_distance(a.thumb_tip(), a.index_tip()) - expected).abs() < 1e-3);
    }

    #[test]
    fn simulated_hand_leaves_the_frame_periodically() {
        let sim = SimulatedHand::default();
        assert!(sim.pose_at(19.0).is_none());
        assert!(sim.pose_at(21.0).is_some());
    }

    #[test]
    fn simulated_estimator_reads_the_frame_clock() {
        let mut sim = SimulatedHand::default();
        let frame = Frame::blank(Duration::from_secs(1));
        let detected = sim.detect(&frame).unwrap().unwrap();
        assert_eq!(detected, sim.pose_at(1.0).unwrap());
    }
}
