//! Per-tick compositing of all projections into one output frame
//!
//! Layers are painted in registry order. Every layer is clipped to its quad
//! polygon; later layers fully overwrite earlier ones where they overlap.
//! The mesh overlay is drawn last and is never clipped.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut, draw_line_segment_mut};
use tracing::debug;

use crate::config::{EditorConfig, RenderConfig};
use crate::geometry::{CanvasSize, Point, Quad};
use crate::projection::Registry;
use crate::transform::{bilinear_sample, Homography};

/// Overlay colors and handle size
#[derive(Debug, Clone)]
pub struct OverlayStyle {
    pub mesh: Rgb<u8>,
    pub selected: Rgb<u8>,
    pub handle_fill: Rgb<u8>,
    pub handle_outline: Rgb<u8>,
    pub handle_radius: i32,
}

impl OverlayStyle {
    pub fn from_config(render: &RenderConfig, editor: &EditorConfig) -> Self {
        Self {
            mesh: Rgb(render.mesh_color),
            selected: Rgb(render.selected_color),
            handle_fill: Rgb(render.handle_fill),
            handle_outline: Rgb(render.handle_outline),
            handle_radius: editor.handle_radius.round().max(1.0) as i32,
        }
    }
}

/// Per-tick render switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderFlags {
    pub live_warp: bool,
    pub show_mesh: bool,
}

/// Counters for the most recent composite
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub drawn: usize,
    pub not_ready: usize,
    pub degenerate: usize,
}

pub struct Compositor {
    background: Rgb<u8>,
    style: OverlayStyle,
    output: RgbImage,
    last_stats: TickStats,
}

impl Compositor {
    pub fn new(canvas: CanvasSize, background: [u8; 3], style: OverlayStyle) -> Self {
        Self {
            background: Rgb(background),
            style,
            output: RgbImage::from_pixel(canvas.width, canvas.height, Rgb(background)),
            last_stats: TickStats::default(),
        }
    }

    pub fn last_stats(&self) -> TickStats {
        self.last_stats
    }

    /// The most recently composed frame
    pub fn output(&self) -> &RgbImage {
        &self.output
    }

    /// Render every projection into a canvas-sized frame.
    ///
    /// Never fails: projections without a frame this tick, and projections
    /// whose transform is degenerate, are left out of this frame.
    pub fn composite(&mut self, registry: &mut Registry, flags: RenderFlags) -> &RgbImage {
        let canvas = registry.canvas();
        if self.output.dimensions() != (canvas.width, canvas.height) {
            self.output = RgbImage::new(canvas.width, canvas.height);
        }
        fill(&mut self.output, self.background);

        let mut stats = TickStats::default();
        for projection in registry.iter_mut() {
            let Some(frame) = projection.next_frame() else {
                stats.not_ready += 1;
                continue;
            };

            if flags.live_warp {
                match Homography::solve(projection.native_size(), &projection.quad) {
                    Ok(h) => h.warp_into(&frame, &mut self.output, &projection.quad),
                    Err(e) => {
                        debug!("Skipping projection {} this tick: {}", projection.id(), e);
                        stats.degenerate += 1;
                        continue;
                    }
                }
            } else {
                draw_fitted(&frame, &mut self.output, &projection.quad);
            }
            stats.drawn += 1;
        }

        if flags.show_mesh {
            self.draw_overlay(registry);
        }

        self.last_stats = stats;
        &self.output
    }

    /// Quad outlines and corner handles; the selected projection is highlighted
    fn draw_overlay(&mut self, registry: &Registry) {
        let selected = registry.selected();
        let r = self.style.handle_radius;

        for (idx, projection) in registry.iter().enumerate() {
            let color = if Some(idx) == selected {
                self.style.selected
            } else {
                self.style.mesh
            };

            // Two-pixel outline
            for (a, b) in projection.quad.edges() {
                for (dx, dy) in [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)] {
                    draw_line_segment_mut(
                        &mut self.output,
                        ((a.x + dx) as f32, (a.y + dy) as f32),
                        ((b.x + dx) as f32, (b.y + dy) as f32),
                        color,
                    );
                }
            }

            for p in &projection.quad.points {
                let center = (p.x.round() as i32, p.y.round() as i32);
                draw_filled_circle_mut(&mut self.output, center, r, self.style.handle_fill);
                draw_hollow_circle_mut(&mut self.output, center, r, self.style.handle_outline);
            }
        }
    }
}

fn fill(img: &mut RgbImage, color: Rgb<u8>) {
    for px in img.pixels_mut() {
        *px = color;
    }
}

/// Scale `frame` to fit the quad's bounding box (keeping aspect ratio),
/// center it there, and paint only the part inside the quad.
///
/// Only canvas pixels are visited; each is mapped back into the source and
/// sampled, so quads far larger than the canvas cost no more than the canvas.
fn draw_fitted(frame: &RgbImage, out: &mut RgbImage, quad: &Quad) {
    let (src_w, src_h) = frame.dimensions();
    if src_w == 0 || src_h == 0 {
        return;
    }

    let (min, max) = quad.bounds();
    let box_w = (max.x.floor() - min.x.floor()).max(1.0);
    let box_h = (max.y.floor() - min.y.floor()).max(1.0);
    let scale = fit_scale(src_w, src_h, box_w, box_h);
    if !scale.is_finite() || scale <= 0.0 {
        return;
    }

    let fit_w = src_w as f64 * scale;
    let fit_h = src_h as f64 * scale;
    let origin_x = min.x.floor() + ((box_w - fit_w) / 2.0).floor();
    let origin_y = min.y.floor() + ((box_h - fit_h) / 2.0).floor();

    let src_stride = src_w as usize * 3;
    let src_raw = frame.as_raw();
    let canvas = CanvasSize::new(out.width(), out.height());
    let (x0, y0, x1, y1) = quad.pixel_bounds(canvas);
    for y in y0..y1 {
        let fy = y as f64 - origin_y;
        if !(fy >= 0.0 && fy < fit_h) {
            continue;
        }
        for x in x0..x1 {
            let fx = x as f64 - origin_x;
            if !(fx >= 0.0 && fx < fit_w) {
                continue;
            }
            if !quad.contains(Point::new(x as f64, y as f64)) {
                continue;
            }
            // Pixel centers map to pixel centers
            let sx = (fx + 0.5) / scale - 0.5;
            let sy = (fy + 0.5) / scale - 0.5;
            let pixel =
                bilinear_sample(src_raw, src_stride, src_w as usize, src_h as usize, sx, sy);
            out.put_pixel(x, y, Rgb(pixel));
        }
    }
}

/// Largest scale that fits a `src_w x src_h` frame inside `box_w x box_h`
fn fit_scale(src_w: u32, src_h: u32, box_w: f64, box_h: f64) -> f64 {
    (box_w / src_w as f64).min(box_h / src_h as f64)
}
