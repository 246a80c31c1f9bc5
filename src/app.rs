// src/app.rs - Per-repaint orchestration loop and the eframe application shell
use eframe::egui;
use std::time::{Duration, Instant};

use crate::config::{AppConfig, Backend};
use crate::error::SetupError;
use crate::gesture::{GestureMapper, HandState, TransformState};
use crate::mediapipe_bridge::MediaPipeBridge;
use crate::scene::Scene;
use crate::tracking::{HandPose, Keypoint, PoseEstimator, SimulatedHand};
use crate::ui::{self, PreviewPanel, ShellState, Status, Theme};
use crate::video::{CameraSource, Frame, FrameSource};

const PREVIEW_WIDTH: f32 = 240.0;

/// Outcome of one tick.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub hand: HandState,
    /// The pose that drove this tick, for the debug overlay.
    pub pose: Option<HandPose>,
    /// Whether the estimator ran, i.e. the frame was new.
    pub estimated: bool,
}

/// Owns every collaborator of the loop. Dropping it releases the camera and the
/// estimator.
pub struct Session {
    source: Box<dyn FrameSource>,
    estimator: Box<dyn PoseEstimator>,
    mapper: GestureMapper,
    state: TransformState,
    scene: Scene,
    last_timestamp: Option<Duration>,
    detection: Option<Vec<Keypoint>>,
    latest_frame: Option<Frame>,
}

impl Session {
    pub fn new(
        source: Box<dyn FrameSource>,
        estimator: Box<dyn PoseEstimator>,
        mapper: GestureMapper,
    ) -> Self {
        Self {
            source,
            estimator,
            mapper,
            state: TransformState::default(),
            scene: Scene::default(),
            last_timestamp: None,
            detection: None,
            latest_frame: None,
        }
    }

    /// Camera first, then the estimator. If the estimator fails the camera is
    /// dropped (and its stream stopped) on the way out.
    pub fn start(config: &AppConfig) -> Result<Self, SetupError> {
        let camera = CameraSource::open(&config.camera)?;
        let estimator = build_estimator(config)?;
        tracing::info!(estimator = estimator.name(), "session started");

        let mapper = GestureMapper::new(config.gesture.smoothing, config.gesture.idle_rotation_step);
        Ok(Self::new(Box::new(camera), estimator, mapper))
    }

    pub fn tick(&mut self, elapsed: Duration) -> TickReport {
        let mut estimated = false;
        match self.source.latest_frame() {
            Ok(frame) => {
                if self.last_timestamp != Some(frame.timestamp) {
                    self.last_timestamp = Some(frame.timestamp);
                    self.detection = match self.estimator.detect(&frame) {
                        Ok(detection) => detection,
                        Err(e) => {
                            tracing::warn!("pose estimation failed: {e:#}");
                            None
                        }
                    };
                    estimated = true;
                }
                self.latest_frame = Some(frame);
            }
            Err(e) => tracing::warn!("no frame this tick: {e:#}"),
        }

        let detection = self.detection.as_deref();
        let hand = self.mapper.step(&mut self.state, detection);
        let pose = match hand {
            HandState::Present => detection.and_then(HandPose::from_keypoints),
            HandState::Absent => None,
        };

        self.scene.apply_transform(&self.state);
        self.scene.animate(elapsed);

        TickReport {
            hand,
            pose,
            estimated,
        }
    }

    pub fn state(&self) -> &TransformState {
        &self.state
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn latest_frame(&self) -> Option<&Frame> {
        self.latest_frame.as_ref()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        tracing::info!("session ended");
    }
}

fn build_estimator(config: &AppConfig) -> Result<Box<dyn PoseEstimator>, SetupError> {
    let estimator = &config.estimator;
    match estimator.backend {
        Backend::Simulated => Ok(Box::new(SimulatedHand::default())),
        Backend::MediaPipe if !estimator.model.exists() && estimator.fallback_to_simulation => {
            tracing::warn!(
                model = %estimator.model.display(),
                "hand landmarker model not found, running the simulated hand"
            );
            Ok(Box::new(SimulatedHand::default()))
        }
        Backend::MediaPipe => Ok(Box::new(MediaPipeBridge::spawn(estimator)?)),
    }
}

pub struct HandOrbitApp {
    config: Result<AppConfig, SetupError>,
    shell: ShellState,
    session: Option<Session>,
    theme: Theme,
    preview: PreviewPanel,
    started: Instant,
    loading_shown: bool,
    last_report: Option<TickReport>,
}

impl HandOrbitApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, config: Result<AppConfig, SetupError>) -> Self {
        Self {
            config,
            shell: ShellState::default(),
            session: None,
            theme: Theme::default(),
            preview: PreviewPanel::default(),
            started: Instant::now(),
            loading_shown: false,
            last_report: None,
        }
    }

    fn initialize(&mut self) {
        let config = match &self.config {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("setup failed: {e}");
                self.shell.fail(e.to_string());
                return;
            }
        };

        match Session::start(config) {
            Ok(session) => {
                self.session = Some(session);
                self.started = Instant::now();
                self.shell.ready();
            }
            Err(e) => {
                tracing::error!("setup failed: {e}");
                self.shell.fail(e.to_string());
            }
        }
    }

    fn render_scene(&self, ctx: &egui::Context) {
        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| {
                let (response, painter) = ui.allocate_painter(ui.available_size(), egui::Sense::hover());
                match &self.session {
                    Some(session) => session.scene().render(&painter, response.rect),
                    None => {
                        painter.rect_filled(response.rect, 0.0, egui::Color32::from_rgb(8, 8, 16));
                    }
                }
            });
    }

    fn render_preview(&self, ctx: &egui::Context) {
        let Some(session) = &self.session else {
            return;
        };
        let report = self.last_report.as_ref();
        let state = session.state();
        let (rotation_x, rotation_y) = (state.rotation_x, state.rotation_y);
        let zoom = session.scene().camera_distance();

        egui::Area::new(egui::Id::new("camera_preview"))
            .anchor(egui::Align2::RIGHT_BOTTOM, [-16.0, -16.0])
            .show(ctx, |ui| {
                egui::Frame::popup(ui.style()).show(ui, |ui| {
                    ui.vertical(|ui| {
                        let hand = report.map(|r| r.hand).unwrap_or(HandState::Absent);
                        ui::draw_hand_indicator(ui, hand, &self.theme);
                        self.preview.show(
                            ui,
                            PREVIEW_WIDTH,
                            report.and_then(|r| r.pose.as_ref()),
                            &self.theme,
                        );
                        ui.label(
                            egui::RichText::new(format!(
                                "rotation {rotation_x:+.2} / {rotation_y:+.2} rad   zoom {zoom:.2}"
                            ))
                            .small()
                            .color(self.theme.text_secondary),
                        );
                    });
                });
            });
    }
}

impl eframe::App for HandOrbitApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Paint one Loading frame before blocking on camera and model setup.
        if self.shell.status() == &Status::Loading {
            if self.loading_shown {
                self.initialize();
            } else {
                self.loading_shown = true;
            }
            ctx.request_repaint();
        }

        if let Some(session) = self.session.as_mut() {
            let report = session.tick(self.started.elapsed());
            // Only a new capture needs a texture upload.
            if report.estimated {
                if let Some(frame) = session.latest_frame() {
                    self.preview.update_frame(ctx, frame);
                }
            }
            self.last_report = Some(report);
            ctx.request_repaint();
        }

        ui::draw_status_banner(ctx, &self.shell, &self.theme);
        self.render_scene(ctx);
        self.render_preview(ctx);
        ui::draw_instructions(ctx, &mut self.shell, &self.theme);
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.session = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::{IDLE_ROTATION_STEP, INITIAL_ZOOM};
    use crate::tracking::{Detection, INDEX_TIP, THUMB_TIP};
    use anyhow::Result;
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// Replays a fixed list of timestamps, repeating the last one.
    struct ScriptedSource {
        timestamps: VecDeque<u64>,
        last: u64,
    }

    impl ScriptedSource {
        fn new(timestamps: &[u64]) -> Self {
            Self {
                timestamps: timestamps.iter().copied().collect(),
                last: 0,
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn latest_frame(&mut self) -> Result<Frame> {
            if let Some(ts) = self.timestamps.pop_front() {
                self.last = ts;
            }
            Ok(Frame::blank(Duration::from_millis(self.last)))
        }
    }

    struct FailingSource;

    impl FrameSource for FailingSource {
        fn latest_frame(&mut self) -> Result<Frame> {
            anyhow::bail!("device unplugged")
        }
    }

    /// Returns scripted detections and counts calls.
    struct ScriptedEstimator {
        results: VecDeque<Result<Detection>>,
        calls: Rc<Cell<usize>>,
    }

    impl PoseEstimator for ScriptedEstimator {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn detect(&mut self, _frame: &Frame) -> Result<Detection> {
            self.calls.set(self.calls.get() + 1);
            self.results.pop_front().unwrap_or(Ok(None))
        }
    }

    fn hand_at(x: f32, y: f32) -> Vec<Keypoint> {
        let mut points = vec![Keypoint::new(0.5, 0.9, 0.0); 21];
        points[INDEX_TIP] = Keypoint::new(x, y, 0.0);
        points[THUMB_TIP] = Keypoint::new(x, y, 0.0);
        points
    }

    fn session(timestamps: &[u64], results: Vec<Result<Detection>>) -> (Session, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let estimator = ScriptedEstimator {
            results: results.into(),
            calls: Rc::clone(&calls),
        };
        let session = Session::new(
            Box::new(ScriptedSource::new(timestamps)),
            Box::new(estimator),
            GestureMapper::default(),
        );
        (session, calls)
    }

    #[test]
    fn stale_frames_skip_estimation_but_keep_smoothing() {
        let (mut session, calls) = session(&[10, 10, 20], vec![Ok(Some(hand_at(1.0, 0.5)))]);

        let first = session.tick(Duration::ZERO);
        assert!(first.estimated);
        assert_eq!(first.hand, HandState::Present);
        let after_first = session.state().rotation_y;

        let second = session.tick(Duration::from_millis(16));
        assert!(!second.estimated);
        assert_eq!(second.hand, HandState::Present);
        assert!(session.state().rotation_y > after_first);
        assert_eq!(calls.get(), 1);

        let third = session.tick(Duration::from_millis(32));
        assert!(third.estimated);
        assert_eq!(third.hand, HandState::Absent);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn no_hand_spins_idle_and_keeps_zoom() {
        let (mut session, _) = session(&[1, 2, 3], vec![]);
        for t in 0..3 {
            let report = session.tick(Duration::from_millis(t * 16));
            assert_eq!(report.hand, HandState::Absent);
            assert!(report.pose.is_none());
        }
        assert!((session.state().rotation_x - 3.0 * IDLE_ROTATION_STEP).abs() < 1e-6);
        assert_eq!(session.state().zoom, INITIAL_ZOOM);
        assert_eq!(session.scene().camera_distance(), INITIAL_ZOOM);
    }

    #[test]
    fn hand_present_is_re_evaluated_every_tick() {
        let (mut session, _) = session(
            &[1, 2, 3],
            vec![Ok(Some(hand_at(0.5, 0.5))), Ok(None), Ok(Some(hand_at(0.5, 0.5)))],
        );
        let states: Vec<HandState> = (0..3).map(|_| session.tick(Duration::ZERO).hand).collect();
        assert_eq!(states, vec![HandState::Present, HandState::Absent, HandState::Present]);
    }

    #[test]
    fn short_detection_degrades_to_no_hand() {
        let mut short = hand_at(0.9, 0.9);
        short.truncate(12);
        let (mut session, _) = session(&[1], vec![Ok(Some(short))]);

        let report = session.tick(Duration::ZERO);
        assert_eq!(report.hand, HandState::Absent);
        assert!((session.state().rotation_y - IDLE_ROTATION_STEP).abs() < 1e-6);
    }

    #[test]
    fn estimator_errors_count_as_no_hand() {
        let (mut session, _) = session(&[1], vec![Err(anyhow::anyhow!("pipe closed"))]);
        let report = session.tick(Duration::ZERO);
        assert!(report.estimated);
        assert_eq!(report.hand, HandState::Absent);
    }

    #[test]
    fn frame_errors_do_not_stop_the_loop() {
        let calls = Rc::new(Cell::new(0));
        let estimator = ScriptedEstimator {
            results: VecDeque::new(),
            calls: Rc::clone(&calls),
        };
        let mut session = Session::new(Box::new(FailingSource), Box::new(estimator), GestureMapper::default());

        let report = session.tick(Duration::from_millis(500));
        assert!(!report.estimated);
        assert_eq!(report.hand, HandState::Absent);
        assert_eq!(calls.get(), 0);
        assert!(session.latest_frame().is_none());
    }

    #[test]
    fn report_carries_the_pose_for_the_overlay() {
        let (mut session, _) = session(&[1], vec![Ok(Some(hand_at(0.3, 0.6)))]);
        let report = session.tick(Duration::ZERO);
        let pose = report.pose.expect("pose for overlay");
        assert_eq!(pose.index_tip().x, 0.3);
    }

    #[test]
    fn scene_follows_the_smoothed_state() {
        let (mut session, _) = session(&[1, 2], vec![Ok(Some(hand_at(0.0, 0.0))), Ok(Some(hand_at(0.0, 0.0)))]);
        session.tick(Duration::ZERO);
        session.tick(Duration::ZERO);
        let state = *session.state();
        assert_eq!(session.scene().rotation(), (state.rotation_x, state.rotation_y));
        assert_eq!(session.scene().camera_distance(), state.zoom);
    }

    #[test]
    fn ambient_animation_runs_with_and_without_a_hand() {
        let (mut session, _) = session(&[1, 2, 3, 3], vec![Ok(Some(hand_at(0.2, 0.7))), Ok(None)]);
        let mut stars = session.scene().star_rotation();
        let mut lights: Vec<_> = session.scene().lights().iter().map(|l| l.position).collect();

        let expected = [
            HandState::Present,
            HandState::Absent,
            HandState::Absent,
            HandState::Absent,
        ];
        for (i, hand) in expected.into_iter().enumerate() {
            let report = session.tick(Duration::from_millis(100 * (i as u64 + 1)));
            assert_eq!(report.hand, hand);

            assert!(session.scene().star_rotation() > stars);
            stars = session.scene().star_rotation();

            let now: Vec<_> = session.scene().lights().iter().map(|l| l.position).collect();
            assert_ne!(now, lights);
            lights = now;
        }
    }

    #[test]
    fn simulated_backend_needs_no_model() {
        let mut config = AppConfig::default();
        config.estimator.backend = Backend::Simulated;
        let estimator = build_estimator(&config).unwrap();
        assert_eq!(estimator.name(), "simulated");
    }

    #[test]
    fn missing_model_falls_back_only_when_allowed() {
        let mut config = AppConfig::default();
        config.estimator.model = std::env::temp_dir().join("hand-orbit-no-model.task");

        let fallback = build_estimator(&config).unwrap();
        assert_eq!(fallback.name(), "simulated");

        config.estimator.fallback_to_simulation = false;
        assert!(matches!(build_estimator(&config), Err(SetupError::Model(_))));
    }
}
