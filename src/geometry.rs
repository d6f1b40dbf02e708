//! Canvas-space geometry: points and the four-point surface quad

use serde::{Deserialize, Serialize};

/// A 2D point in output-canvas pixel coordinates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Manhattan (L1) distance, the metric used for handle picking
    pub fn manhattan_distance(&self, other: Point) -> f64 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    pub fn offset(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Clamp into `[0, width] x [0, height]`
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        Self::new(
            self.x.clamp(0.0, width as f64),
            self.y.clamp(0.0, height as f64),
        )
    }
}

/// Output canvas dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl CanvasSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Destination surface boundary.
///
/// Always exactly four points; index `i` is handle `i`. No convexity or
/// winding is enforced, so self-intersecting and degenerate quads are valid
/// values and every consumer must tolerate them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    pub points: [Point; 4],
}

impl Quad {
    pub fn new(points: [Point; 4]) -> Self {
        Self { points }
    }

    /// Inset rectangle with a margin of `margin_ratio` times the shorter canvas side.
    /// Order: top-left, top-right, bottom-right, bottom-left
    pub fn inset(canvas: CanvasSize, margin_ratio: f64) -> Self {
        let w = canvas.width.max(1) as f64;
        let h = canvas.height.max(1) as f64;
        let margin = w.min(h) * margin_ratio;
        Self::new([
            Point::new(margin, margin),
            Point::new(w - margin, margin),
            Point::new(w - margin, h - margin),
            Point::new(margin, h - margin),
        ])
    }

    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.points.map(|p| p.offset(dx, dy)))
    }

    /// Axis-aligned bounding box as `(min, max)`
    pub fn bounds(&self) -> (Point, Point) {
        let mut min = self.points[0];
        let mut max = self.points[0];
        for p in &self.points[1..] {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        (min, max)
    }

    /// Bounding box clipped to the canvas as half-open pixel ranges
    /// `(x0, y0, x1, y1)`. Empty when the quad lies fully outside.
    pub fn pixel_bounds(&self, canvas: CanvasSize) -> (u32, u32, u32, u32) {
        let (min, max) = self.bounds();
        let clip = |v: f64, limit: u32| -> u32 {
            if v.is_nan() {
                0
            } else {
                v.clamp(0.0, limit as f64) as u32
            }
        };
        let x0 = clip(min.x.floor(), canvas.width);
        let y0 = clip(min.y.floor(), canvas.height);
        let x1 = clip(max.x.ceil() + 1.0, canvas.width);
        let y1 = clip(max.y.ceil() + 1.0, canvas.height);
        (x0, y0, x1.max(x0), y1.max(y0))
    }

    /// Even-odd point-in-polygon test against the four edges.
    /// Works for self-intersecting quads (the crossed lobes count as inside).
    pub fn contains(&self, p: Point) -> bool {
        let mut inside = false;
        let mut j = 3;
        for i in 0..4 {
            let a = self.points[i];
            let b = self.points[j];
            if (a.y > p.y) != (b.y > p.y) {
                let x_cross = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
                if p.x < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }

    /// True when any three of the four points are (nearly) collinear,
    /// including coincident points.
    pub fn has_collinear_triple(&self) -> bool {
        let (min, max) = self.bounds();
        let extent = (max.x - min.x).hypot(max.y - min.y);
        let tolerance = 1e-9 * (extent * extent).max(1.0);

        const TRIPLES: [[usize; 3]; 4] = [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];
        TRIPLES.iter().any(|&[a, b, c]| {
            let (pa, pb, pc) = (self.points[a], self.points[b], self.points[c]);
            let cross = (pb.x - pa.x) * (pc.y - pa.y) - (pb.y - pa.y) * (pc.x - pa.x);
            cross.abs() <= tolerance
        })
    }

    /// Quad edges as consecutive point pairs, closing back to handle 0
    pub fn edges(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        (0..4).map(move |i| (self.points[i], self.points[(i + 1) % 4]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Quad {
        Quad::new([
            Point::new(x0, y0),
            Point::new(x1, y0),
            Point::new(x1, y1),
            Point::new(x0, y1),
        ])
    }

    #[test]
    fn test_inset_uses_shorter_side() {
        let quad = Quad::inset(CanvasSize::new(600, 400), 0.1);
        assert_eq!(quad, square(40.0, 40.0, 560.0, 360.0));
    }

    #[test]
    fn test_inset_zero_canvas() {
        // Zero-sized canvases are treated as 1x1
        let quad = Quad::inset(CanvasSize::new(0, 0), 0.1);
        assert!((quad.points[2].x - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_contains_square() {
        let quad = square(10.0, 10.0, 20.0, 20.0);
        assert!(quad.contains(Point::new(15.0, 15.0)));
        assert!(!quad.contains(Point::new(5.0, 15.0)));
        assert!(!quad.contains(Point::new(15.0, 25.0)));
    }

    #[test]
    fn test_contains_bowtie() {
        // Crossed quad: handles 2 and 3 swapped
        let quad = Quad::new([
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(0.0, 10.0),
            Point::new(10.0, 10.0),
        ]);
        assert!(quad.contains(Point::new(5.0, 2.0)));
        assert!(quad.contains(Point::new(5.0, 8.0)));
        assert!(!quad.contains(Point::new(1.0, 5.0)));
    }

    #[test]
    fn test_collinear_detection() {
        assert!(!square(0.0, 0.0, 10.0, 10.0).has_collinear_triple());

        let flat = Quad::new([
            Point::new(0.0, 0.0),
            Point::new(5.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(5.0, 10.0),
        ]);
        assert!(flat.has_collinear_triple());

        let coincident = Quad::new([
            Point::new(0.0, 0.0),
            Point::new(0.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ]);
        assert!(coincident.has_collinear_triple());
    }

    #[test]
    fn test_pixel_bounds_clipped() {
        let quad = square(-50.0, 10.5, 30.2, 500.0);
        let (x0, y0, x1, y1) = quad.pixel_bounds(CanvasSize::new(100, 100));
        assert_eq!((x0, y0), (0, 10));
        assert_eq!(x1, 32);
        assert_eq!(y1, 100);
    }

    #[test]
    fn test_pixel_bounds_outside_is_empty() {
        let quad = square(200.0, 200.0, 300.0, 300.0);
        let (x0, y0, x1, y1) = quad.pixel_bounds(CanvasSize::new(100, 100));
        assert_eq!(x0, x1);
        assert_eq!(y0, y1);
    }

    #[test]
    fn test_clamp_point() {
        let p = Point::new(-3.0, 900.0).clamp_to(640, 480);
        assert_eq!(p, Point::new(0.0, 480.0));
    }
}
