// src/ui.rs - Status banner, instructions window and the camera preview panel
use eframe::egui::{self, Color32, Pos2, Rect, Stroke, Vec2};

use crate::gesture::HandState;
use crate::tracking::{HandPose, HAND_CONNECTIONS, INDEX_TIP, THUMB_TIP};
use crate::video::Frame;

#[derive(Debug, Clone)]
pub struct Theme {
    pub primary: Color32,
    pub secondary: Color32,
    pub surface: Color32,
    pub error: Color32,
    pub success: Color32,
    pub text_primary: Color32,
    pub text_secondary: Color32,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary: Color32::from_rgb(70, 130, 240),
            secondary: Color32::from_rgb(255, 152, 0),
            surface: Color32::from_rgb(30, 30, 35),
            error: Color32::from_rgb(244, 67, 54),
            success: Color32::from_rgb(76, 175, 80),
            text_primary: Color32::WHITE,
            text_secondary: Color32::from_rgb(200, 200, 200),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Loading,
    Ready,
    Error(String),
}

/// Everything the shell needs to decide what to show. Transitions happen only
/// through the methods below.
#[derive(Debug, Clone)]
pub struct ShellState {
    status: Status,
    instructions_dismissed: bool,
}

impl Default for ShellState {
    fn default() -> Self {
        Self {
            status: Status::Loading,
            instructions_dismissed: false,
        }
    }
}

impl ShellState {
    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn ready(&mut self) {
        if self.status == Status::Loading {
            self.status = Status::Ready;
        }
    }

    /// Errors are terminal; a later `ready` does not clear them.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = Status::Error(message.into());
    }

    pub fn dismiss_instructions(&mut self) {
        self.instructions_dismissed = true;
    }

    pub fn show_instructions(&self) -> bool {
        self.status == Status::Ready && !self.instructions_dismissed
    }
}

pub fn draw_status_banner(ctx: &egui::Context, shell: &ShellState, theme: &Theme) {
    let (text, color) = match shell.status() {
        Status::Ready => return,
        Status::Loading => ("Starting camera and loading hand tracking model...".to_string(), theme.primary),
        Status::Error(message) => (message.clone(), theme.error),
    };

    egui::TopBottomPanel::top("status_banner")
        .frame(egui::Frame::none().fill(color).inner_margin(egui::Margin::symmetric(16.0, 10.0)))
        .show(ctx, |ui| {
            ui.horizontal(|ui| {
                if shell.status() == &Status::Loading {
                    ui.spinner();
                }
                ui.label(egui::RichText::new(text).size(16.0).color(theme.text_primary));
            });
        });
}

pub fn draw_instructions(ctx: &egui::Context, shell: &mut ShellState, theme: &Theme) {
    if !shell.show_instructions() {
        return;
    }

    let mut open = true;
    let mut dismissed = false;
    egui::Window::new("How to play")
        .open(&mut open)
        .collapsible(false)
        .resizable(false)
        .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
        .show(ctx, |ui| {
            ui.label(egui::RichText::new("Hold one hand up to the camera.").size(16.0));
            ui.add_space(8.0);
            ui.label("☝ Move your index finger to rotate the object.");
            ui.label("🤏 Pinch thumb and index together to pull the camera back.");
            ui.label("🖐 Spread them apart to bring it closer.");
            ui.add_space(8.0);
            ui.colored_label(theme.text_secondary, "With no hand in view the object spins on its own.");
            ui.add_space(12.0);
            ui.vertical_centered(|ui| {
                if ui.button("Got it").clicked() {
                    dismissed = true;
                }
            });
        });

    if dismissed || !open {
        shell.dismiss_instructions();
    }
}

pub fn draw_hand_indicator(ui: &mut egui::Ui, hand: HandState, theme: &Theme) {
    let (text, color) = match hand {
        HandState::Present => ("● Hand tracked", theme.success),
        HandState::Absent => ("○ Show your hand", theme.text_secondary),
    };
    ui.label(egui::RichText::new(text).color(color));
}

/// Mirrored camera feed with the skeleton overlay on top.
#[derive(Default)]
pub struct PreviewPanel {
    texture: Option<egui::TextureHandle>,
    aspect_ratio: Option<f32>,
}

impl PreviewPanel {
    pub fn update_frame(&mut self, ctx: &egui::Context, frame: &Frame) {
        let size = [frame.width() as usize, frame.height() as usize];
        let image = egui::ColorImage::from_rgb(size, frame.image.as_raw());
        self.aspect_ratio = Some(frame.width() as f32 / frame.height().max(1) as f32);

        match self.texture.as_mut() {
            Some(texture) => texture.set(image, egui::TextureOptions::LINEAR),
            None => {
                self.texture = Some(ctx.load_texture("camera_preview", image, egui::TextureOptions::LINEAR));
            }
        }
    }

    pub fn show(&self, ui: &mut egui::Ui, width: f32, pose: Option<&HandPose>, theme: &Theme) {
        let height = width / self.aspect_ratio.unwrap_or(4.0 / 3.0);
        let (rect, _response) = ui.allocate_exact_size(Vec2::new(width, height), egui::Sense::hover());
        let painter = ui.painter_at(rect);

        match &self.texture {
            Some(texture) => {
                // Flipped UVs mirror the feed horizontally.
                let uv = Rect::from_min_max(Pos2::new(1.0, 0.0), Pos2::new(0.0, 1.0));
                painter.image(texture.id(), rect, uv, Color32::WHITE);
            }
            None => {
                painter.rect_filled(rect, egui::Rounding::same(4.0), theme.surface);
                painter.text(
                    rect.center(),
                    egui::Align2::CENTER_CENTER,
                    "No Video Signal",
                    egui::FontId::proportional(14.0),
                    theme.text_secondary,
                );
            }
        }

        if let Some(pose) = pose {
            draw_hand_skeleton(&painter, rect, pose, theme);
        }
        painter.rect_stroke(rect, egui::Rounding::same(4.0), Stroke::new(1.0, theme.primary));
    }
}

/// Maps a normalized keypoint into `rect`, mirrored to match the preview.
pub fn overlay_position(rect: Rect, x: f32, y: f32) -> Pos2 {
    Pos2::new(rect.right() - x * rect.width(), rect.top() + y * rect.height())
}

pub fn draw_hand_skeleton(painter: &egui::Painter, rect: Rect, pose: &HandPose, theme: &Theme) {
    let points: Vec<Pos2> = pose
        .keypoints()
        .iter()
        .map(|kp| overlay_position(rect, kp.x, kp.y))
        .collect();

    for &(from, to) in HAND_CONNECTIONS.iter() {
        painter.line_segment([points[from], points[to]], Stroke::new(2.0, theme.success));
    }

    for (i, (pos, kp)) in points.iter().zip(pose.keypoints()).enumerate() {
        let color = if i == THUMB_TIP || i == INDEX_TIP {
            theme.secondary
        } else {
            theme.error
        };
        // Joints the model is unsure about fade out.
        let visibility = kp.visibility.unwrap_or(1.0).clamp(0.3, 1.0);
        painter.circle_filled(*pos, 3.0, color.gamma_multiply(visibility));
    }

    painter.line_segment(
        [points[THUMB_TIP], points[INDEX_TIP]],
        Stroke::new(1.0, theme.secondary),
    );
}
