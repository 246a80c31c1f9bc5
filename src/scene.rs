// src/scene.rs - Scene controller: lit object, orbiting lights, starfield
use eframe::egui::{self, Color32, Pos2, Rect, Shape, Stroke};
use nalgebra::{Point3, Rotation3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::time::Duration;

use crate::gesture::{TransformState, ZOOM_FAR, ZOOM_NEAR};

const FIELD_OF_VIEW: f32 = 75.0 * std::f32::consts::PI / 180.0;
const NEAR_PLANE: f32 = 0.1;
const OBJECT_RADIUS: f32 = 1.4;
const OBJECT_SUBDIVISIONS: usize = 1;
const AMBIENT: f32 = 0.18;

const STAR_COUNT: usize = 900;
const STAR_SEED: u64 = 0x5EED_57A2;
const STAR_SHELL_MIN: f32 = 20.0;
const STAR_SHELL_MAX: f32 = 60.0;
/// Radians per tick.
const STAR_DRIFT: f32 = 0.0005;

const BACKGROUND: Color32 = Color32::from_rgb(8, 8, 16);

struct Mesh {
    vertices: Vec<Vector3<f32>>,
    faces: Vec<[usize; 3]>,
}

impl Mesh {
    fn icosahedron() -> Self {
        let t = (1.0 + 5.0f32.sqrt()) / 2.0;
        #[rustfmt::skip]
        let vertices = [
            (-1.0, t, 0.0), (1.0, t, 0.0), (-1.0, -t, 0.0), (1.0, -t, 0.0),
            (0.0, -1.0, t), (0.0, 1.0, t), (0.0, -1.0, -t), (0.0, 1.0, -t),
            (t, 0.0, -1.0), (t, 0.0, 1.0), (-t, 0.0, -1.0), (-t, 0.0, 1.0),
        ]
        .iter()
        .map(|&(x, y, z)| Vector3::new(x, y, z).normalize())
        .collect();

        #[rustfmt::skip]
        let faces = vec![
            [0, 11, 5], [0, 5, 1], [0, 1, 7], [0, 7, 10], [0, 10, 11],
            [1, 5, 9], [5, 11, 4], [11, 10, 2], [10, 7, 6], [7, 1, 8],
            [3, 9, 4], [3, 4, 2], [3, 2, 6], [3, 6, 8], [3, 8, 9],
            [4, 9, 5], [2, 4, 11], [6, 2, 10], [8, 6, 7], [9, 8, 1],
        ];

        Self { vertices, faces }
    }

    /// Splits every triangle into four, pushing the new edge midpoints out to the
    /// unit sphere.
    fn subdivide(&self) -> Self {
        let mut vertices = self.vertices.clone();
        let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();
        let mut faces = Vec::with_capacity(self.faces.len() * 4);

        let mut midpoint = |a: usize, b: usize, vertices: &mut Vec<Vector3<f32>>| -> usize {
            let key = if a <= b { (a, b) } else { (b, a) };
            *midpoints.entry(key).or_insert_with(|| {
                vertices.push(((vertices[a] + vertices[b]) * 0.5).normalize());
                vertices.len() - 1
            })
        };

        for &[a, b, c] in &self.faces {
            let ab = midpoint(a, b, &mut vertices);
            let bc = midpoint(b, c, &mut vertices);
            let ca = midpoint(c, a, &mut vertices);
            faces.extend_from_slice(&[[a, ab, ca], [b, bc, ab], [c, ca, bc], [ab, bc, ca]]);
        }

        Self { vertices, faces }
    }

    fn icosphere(subdivisions: usize) -> Self {
        (0..subdivisions).fold(Self::icosahedron(), |mesh, _| mesh.subdivide())
    }
}

#[derive(Debug, Clone)]
pub struct PointLight {
    pub color: [f32; 3],
    pub intensity: f32,
    pub orbit_radius: f32,
    pub orbit_height: f32,
    /// Radians per second.
    pub speed: f32,
    pub phase: f32,
    pub position: Vector3<f32>,
}

impl PointLight {
    fn new(color: [f32; 3], intensity: f32, orbit_radius: f32, orbit_height: f32, speed: f32, phase: f32) -> Self {
        let mut light = Self {
            color,
            intensity,
            orbit_radius,
            orbit_height,
            speed,
            phase,
            position: Vector3::zeros(),
        };
        light.orbit(0.0);
        light
    }

    fn orbit(&mut self, seconds: f32) {
        let angle = seconds * self.speed + self.phase;
        self.position = Vector3::new(
            angle.cos() * self.orbit_radius,
            (angle * 0.5).sin() * self.orbit_height,
            angle.sin() * self.orbit_radius,
        );
    }

    fn color32(&self) -> Color32 {
        let [r, g, b] = self.color;
        Color32::from_rgb((r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8)
    }
}

/// Owns everything that gets drawn. The orchestration loop pushes the smoothed
/// transform in each tick and calls `render` once.
pub struct Scene {
    mesh: Mesh,
    base_color: [f32; 3],
    rotation_x: f32,
    rotation_y: f32,
    camera_distance: f32,
    lights: Vec<PointLight>,
    stars: Vec<Vector3<f32>>,
    star_rotation: f32,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        let mut rng = StdRng::seed_from_u64(STAR_SEED);
        let stars = (0..STAR_COUNT)
            .map(|_| {
                let direction = loop {
                    let v = Vector3::new(
                        rng.gen_range(-1.0f32..1.0),
                        rng.gen_range(-1.0f32..1.0),
                        rng.gen_range(-1.0f32..1.0),
                    );
                    let n = v.norm();
                    if n > 0.05 && n <= 1.0 {
                        break v / n;
                    }
                };
                direction * rng.gen_range(STAR_SHELL_MIN..STAR_SHELL_MAX)
            })
            .collect();

        Self {
            mesh: Mesh::icosphere(OBJECT_SUBDIVISIONS),
            base_color: [0.35, 0.55, 1.0],
            rotation_x: 0.0,
            rotation_y: 0.0,
            camera_distance: TransformState::default().zoom,
            lights: vec![
                PointLight::new([0.2, 0.9, 1.0], 2.2, 3.2, 1.5, 0.8, 0.0),
                PointLight::new([1.0, 0.3, 0.8], 1.8, 3.6, 2.0, 0.6, std::f32::consts::PI),
            ],
            stars,
            star_rotation: 0.0,
        }
    }

    pub fn apply_transform(&mut self, state: &TransformState) {
        self.rotation_x = state.rotation_x;
        self.rotation_y = state.rotation_y;
        self.camera_distance = state.zoom.clamp(ZOOM_NEAR, ZOOM_FAR);
    }

    /// Lights follow wall-clock time; the starfield advances a fixed step per call.
    pub fn animate(&mut self, elapsed: Duration) {
        let seconds = elapsed.as_secs_f32();
        for light in &mut self.lights {
            light.orbit(seconds);
        }
        self.star_rotation = (self.star_rotation + STAR_DRIFT) % std::f32::consts::TAU;
    }

    pub fn camera_distance(&self) -> f32 {
        self.camera_distance
    }

    #[cfg(test)]
    pub fn rotation(&self) -> (f32, f32) {
        (self.rotation_x, self.rotation_y)
    }

    #[cfg(test)]
    pub fn lights(&self) -> &[PointLight] {
        &self.lights
    }

    #[cfg(test)]
    pub fn star_rotation(&self) -> f32 {
        self.star_rotation
    }

    fn object_rotation(&self) -> Rotation3<f32> {
        Rotation3::from_axis_angle(&Vector3::x_axis(), self.rotation_x)
            * Rotation3::from_axis_angle(&Vector3::y_axis(), self.rotation_y)
    }

    fn camera_position(&self) -> Point3<f32> {
        Point3::new(0.0, 0.0, self.camera_distance)
    }

    /// Perspective projection for a camera on +Z looking at the origin. Returns
    /// the screen position and the view depth, or `None` behind the near plane.
    pub fn project(&self, point: &Point3<f32>, viewport: Rect) -> Option<(Pos2, f32)> {
        let depth = self.camera_distance - point.z;
        if depth < NEAR_PLANE {
            return None;
        }
        let focal = viewport.height() * 0.5 / (FIELD_OF_VIEW * 0.5).tan();
        let center = viewport.center();
        Some((
            Pos2::new(center.x + focal * point.x / depth, center.y - focal * point.y / depth),
            depth,
        ))
    }

    pub fn render(&self, painter: &egui::Painter, viewport: Rect) {
        painter.rect_filled(viewport, 0.0, BACKGROUND);
        self.paint_stars(painter, viewport);

        let (behind, in_front): (Vec<&PointLight>, Vec<&PointLight>) =
            self.lights.iter().partition(|light| light.position.z < 0.0);
        for light in behind {
            self.paint_light(painter, viewport, light);
        }
        self.paint_object(painter, viewport);
        for light in in_front {
            self.paint_light(painter, viewport, light);
        }
    }

    fn paint_stars(&self, painter: &egui::Painter, viewport: Rect) {
        let spin = Rotation3::from_axis_angle(&Vector3::y_axis(), self.star_rotation);
        for (i, star) in self.stars.iter().enumerate() {
            let p = Point3::from(spin * star);
            if let Some((pos, depth)) = self.project(&p, viewport) {
                if !viewport.contains(pos) {
                    continue;
                }
                let brightness = (1.0 - depth / (STAR_SHELL_MAX * 1.2)).clamp(0.2, 1.0);
                let shade = (brightness * 255.0) as u8;
                let radius = if i % 7 == 0 { 1.4 } else { 0.8 };
                painter.circle_filled(pos, radius, Color32::from_rgb(shade, shade, shade));
            }
        }
    }

    fn paint_light(&self, painter: &egui::Painter, viewport: Rect, light: &PointLight) {
        if let Some((pos, depth)) = self.project(&Point3::from(light.position), viewport) {
            let size = 60.0 / depth;
            let color = light.color32();
            painter.circle_filled(pos, size * 2.0, color.linear_multiply(0.15));
            painter.circle_filled(pos, size, color);
        }
    }

    fn shade(&self, centroid: &Vector3<f32>, normal: &Vector3<f32>) -> Color32 {
        let mut rgb = self.base_color.map(|c| c * AMBIENT);
        for light in &self.lights {
            let to_light = light.position - centroid;
            let distance_sq = to_light.norm_squared();
            let lambert = normal.dot(&to_light.normalize()).max(0.0);
            let falloff = light.intensity / (1.0 + 0.05 * distance_sq);
            for (channel, (base, tint)) in rgb.iter_mut().zip(self.base_color.iter().zip(light.color)) {
                *channel += base * tint * lambert * falloff;
            }
        }
        let [r, g, b] = rgb.map(|c| (c.clamp(0.0, 1.0) * 255.0) as u8);
        Color32::from_rgb(r, g, b)
    }

    fn paint_object(&self, painter: &egui::Painter, viewport: Rect) {
        let rotation = self.object_rotation();
        let camera = self.camera_position().coords;
        let world: Vec<Vector3<f32>> = self
            .mesh
            .vertices
            .iter()
            .map(|v| rotation * (v * OBJECT_RADIUS))
            .collect();

        let mut faces: Vec<(f32, Shape)> = Vec::with_capacity(self.mesh.faces.len());
        for &[a, b, c] in &self.mesh.faces {
            let (va, vb, vc) = (world[a], world[b], world[c]);
            let centroid = (va + vb + vc) / 3.0;
            let mut normal = (vb - va).cross(&(vc - va)).normalize();
            if normal.dot(&centroid) < 0.0 {
                normal = -normal;
            }
            if normal.dot(&(camera - centroid)) <= 0.0 {
                continue;
            }

            let points: Option<Vec<Pos2>> = [va, vb, vc]
                .iter()
                .map(|v| self.project(&Point3::from(*v), viewport).map(|(pos, _)| pos))
                .collect();
            let Some(points) = points else { continue };

            let fill = self.shade(&centroid, &normal);
            let edge = Stroke::new(0.6, Color32::from_rgba_unmultiplied(255, 255, 255, 28));
            faces.push(((camera - centroid).norm(), Shape::convex_polygon(points, fill, edge)));
        }

        faces.sort_by(|a, b| b.0.total_cmp(&a.0));
        for (_, shape) in faces {
            painter.add(shape);
        }
    }
}
