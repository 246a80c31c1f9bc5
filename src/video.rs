// src/video.rs - Camera frame source
use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution,
};
use nokhwa::Camera;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::CameraConfig;
use crate::error::SetupError;

/// How long `open` waits for the stream to start and deliver its first frame.
const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(10);
const CAPTURE_RETRY_DELAY: Duration = Duration::from_millis(50);

/// One decoded camera frame. `timestamp` is the capture time and increases
/// strictly from frame to frame of a given source.
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub timestamp: Duration,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    #[cfg(test)]
    pub fn blank(timestamp: Duration) -> Self {
        Self {
            image: RgbImage::new(4, 3),
            timestamp,
        }
    }
}

/// Pull-based access to the most recent frame of a live stream. Must not block
/// waiting for the device; asking twice between captures returns the same frame.
pub trait FrameSource {
    fn latest_frame(&mut self) -> Result<Frame>;
}

/// Capture timestamps relative to stream start, forced strictly increasing.
struct CaptureClock {
    started: Instant,
    last: Option<Duration>,
}

impl CaptureClock {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            last: None,
        }
    }

    fn stamp(&mut self) -> Duration {
        let mut now = self.started.elapsed();
        if let Some(last) = self.last {
            if now <= last {
                now = last + Duration::from_micros(1);
            }
        }
        self.last = Some(now);
        now
    }
}

/// Single-slot mailbox between the capture thread and the loop. Newer frames
/// overwrite older ones.
#[derive(Clone, Default)]
struct FrameSlot(Arc<Mutex<Option<Frame>>>);

impl FrameSlot {
    fn publish(&self, frame: Frame) {
        *self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(frame);
    }

    fn latest(&self) -> Option<Frame> {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// Live camera read on a background thread. The thread owns the device, so
/// opening, capture and stopping the stream all happen there.
pub struct CameraSource {
    slot: FrameSlot,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl CameraSource {
    pub fn open(config: &CameraConfig) -> Result<Self, SetupError> {
        tracing::info!(
            index = config.index,
            width = config.width,
            height = config.height,
            fps = config.fps,
            "opening camera"
        );

        let slot = FrameSlot::default();
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = mpsc::channel();

        let worker = {
            let config = config.clone();
            let slot = slot.clone();
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name("camera-capture".into())
                .spawn(move || capture_loop(&config, &slot, &running, ready_tx))
                .map_err(|e| SetupError::Camera(format!("could not start the capture thread: {e}")))?
        };

        let mut source = Self {
            slot,
            running,
            worker: Some(worker),
        };

        // Dropping `source` on any error below stops and joins the thread.
        match ready_rx.recv_timeout(FIRST_FRAME_TIMEOUT) {
            Ok(Ok(())) => Ok(source),
            Ok(Err(message)) => Err(SetupError::Camera(message)),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // The thread may be stuck inside the driver; don't wait on it.
                source.running.store(false, Ordering::SeqCst);
                source.worker.take();
                Err(SetupError::Camera("the camera did not deliver a frame".into()))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(SetupError::Camera("the capture thread exited during startup".into()))
            }
        }
    }
}

fn open_camera(config: &CameraConfig) -> Result<Camera, String> {
    let format = CameraFormat::new(
        Resolution::new(config.width, config.height),
        FrameFormat::MJPEG,
        config.fps,
    );
    let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format));

    let mut camera =
        Camera::new(CameraIndex::Index(config.index), requested).map_err(|e| e.to_string())?;
    camera
        .open_stream()
        .map_err(|e| format!("could not start the video stream: {e}"))?;

    let resolution = camera.resolution();
    tracing::info!(
        width = resolution.width(),
        height = resolution.height(),
        fps = camera.frame_rate(),
        "camera stream open"
    );
    Ok(camera)
}

fn capture(camera: &mut Camera) -> Result<RgbImage> {
    let buffer = camera.frame().context("failed to capture frame")?;
    buffer
        .decode_image::<RgbFormat>()
        .context("failed to decode frame")
}

fn capture_loop(
    config: &CameraConfig,
    slot: &FrameSlot,
    running: &AtomicBool,
    ready: mpsc::Sender<Result<(), String>>,
) {
    let mut camera = match open_camera(config) {
        Ok(camera) => camera,
        Err(message) => {
            let _ = ready.send(Err(message));
            return;
        }
    };

    let mut clock = CaptureClock::new();
    let mut ready = Some(ready);
    while running.load(Ordering::SeqCst) {
        match capture(&mut camera) {
            Ok(image) => {
                slot.publish(Frame {
                    image,
                    timestamp: clock.stamp(),
                });
                if let Some(ready) = ready.take() {
                    let _ = ready.send(Ok(()));
                }
            }
            Err(e) => {
                tracing::warn!("{e:#}");
                thread::sleep(CAPTURE_RETRY_DELAY);
            }
        }
    }

    if let Err(e) = camera.stop_stream() {
        tracing::warn!("failed to stop camera stream: {e}");
    } else {
        tracing::info!("camera stream stopped");
    }
}

impl FrameSource for CameraSource {
    fn latest_frame(&mut self) -> Result<Frame> {
        if self.worker.as_ref().map_or(true, |worker| worker.is_finished()) {
            return Err(anyhow!("camera capture thread has stopped"));
        }
        self.slot
            .latest()
            .ok_or_else(|| anyhow!("no frame captured yet"))
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("camera capture thread panicked");
            }
        }
    }
}

pub fn list_cameras() {
    match nokhwa::query(ApiBackend::Auto) {
        Ok(cameras) => {
            tracing::info!("found {} camera(s)", cameras.len());
            for camera in &cameras {
                tracing::info!("  [{}] {}", camera.index(), camera.human_name());
            }
        }
        Err(e) => tracing::warn!("failed to query cameras: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_clock_is_strictly_increasing() {
        let mut clock = CaptureClock::new();
        let mut previous = clock.stamp();
        for _ in 0..1000 {
            let next = clock.stamp();
            assert!(next > previous);
            previous = next;
        }
    }

    #[test]
    fn slot_is_empty_until_the_first_capture() {
        let slot = FrameSlot::default();
        assert!(slot.latest().is_none());
    }

    #[test]
    fn repeated_reads_between_captures_return_the_same_frame() {
        let slot = FrameSlot::default();
        slot.publish(Frame::blank(Duration::from_millis(33)));

        let first = slot.latest().unwrap();
        let second = slot.latest().unwrap();
        assert_eq!(first.timestamp, second.timestamp);

        slot.publish(Frame::blank(Duration::from_millis(66)));
        assert_eq!(slot.latest().unwrap().timestamp, Duration::from_millis(66));
    }

    #[test]
    fn slot_is_shared_across_threads() {
        let slot = FrameSlot::default();
        let writer = slot.clone();
        thread::spawn(move || writer.publish(Frame::blank(Duration::from_millis(5))))
            .join()
            .unwrap();
        assert_eq!(slot.latest().unwrap().timestamp, Duration::from_millis(5));
    }
}
