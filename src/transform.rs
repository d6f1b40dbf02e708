//! Perspective transformation for projection surfaces
//!
//! This module implements the perspective (homography) transformation that
//! maps a media frame's native rectangle onto an arbitrary destination quad,
//! and the inverse-mapped warp that paints the frame into the canvas.

use image::RgbImage;
use nalgebra::{Matrix3, SMatrix, SVector};

use crate::error::{EngineError, EngineResult};
use crate::geometry::{CanvasSize, Point, Quad};

/// Perspective transformation matrix (3x3 homography)
#[derive(Debug, Clone)]
pub struct Homography {
    /// Source rectangle -> destination quad, normalized so `h33 == 1`
    forward: Matrix3<f64>,
    /// Destination quad -> source rectangle (used for warping)
    inverse: Matrix3<f64>,
}

impl Homography {
    /// Solve the transform taking the source rectangle
    /// `(0,0)-(w-1,0)-(w-1,h-1)-(0,h-1)` onto `dst`, corner for corner.
    ///
    /// Fails with [`EngineError::DegenerateTransform`] when the source has no
    /// area, when three destination points are collinear, or when the linear
    /// system has no usable solution.
    pub fn solve(src_size: (u32, u32), dst: &Quad) -> EngineResult<Self> {
        let (w, h) = src_size;
        if w < 2 || h < 2 {
            return Err(EngineError::degenerate(format!(
                "source rectangle {}x{} has no area",
                w, h
            )));
        }
        if dst.points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(EngineError::degenerate("non-finite destination point"));
        }
        if dst.has_collinear_triple() {
            return Err(EngineError::degenerate(
                "three destination points are collinear",
            ));
        }

        let max_x = (w - 1) as f64;
        let max_y = (h - 1) as f64;
        let src = [
            Point::new(0.0, 0.0),
            Point::new(max_x, 0.0),
            Point::new(max_x, max_y),
            Point::new(0.0, max_y),
        ];

        let forward = compute_homography(&src, &dst.points)
            .ok_or_else(|| EngineError::degenerate("singular correspondence system"))?;
        let inverse = forward
            .try_inverse()
            .ok_or_else(|| EngineError::degenerate("transform is not invertible"))?;

        Ok(Self { forward, inverse })
    }

    /// Transform a point from source to destination coordinates
    #[inline]
    pub fn map(&self, p: Point) -> Option<Point> {
        apply_homography(&self.forward, p)
    }

    /// Transform a point from destination to source coordinates (inverse)
    #[inline]
    pub fn unmap(&self, p: Point) -> Option<Point> {
        apply_homography(&self.inverse, p)
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.forward
    }

    /// Paint `src` into `dst` through this transform.
    ///
    /// Only canvas pixels inside `clip` are written; each is inverse-mapped
    /// into the source and sampled with bilinear interpolation. Everything
    /// outside the clip polygon is left untouched.
    pub fn warp_into(&self, src: &RgbImage, dst: &mut RgbImage, clip: &Quad) {
        let canvas = CanvasSize::new(dst.width(), dst.height());
        let (x0, y0, x1, y1) = clip.pixel_bounds(canvas);
        let src_w = src.width() as usize;
        let src_h = src.height() as usize;
        if src_w == 0 || src_h == 0 {
            return;
        }
        let src_stride = src_w * 3;
        let src_raw = src.as_raw();

        for dst_y in y0..y1 {
            for dst_x in x0..x1 {
                let canvas_pt = Point::new(dst_x as f64, dst_y as f64);
                if !clip.contains(canvas_pt) {
                    continue;
                }

                // Map destination pixel to source coordinates
                let Some(src_pt) = self.unmap(canvas_pt) else {
                    continue;
                };

                let pixel = bilinear_sample(src_raw, src_stride, src_w, src_h, src_pt.x, src_pt.y);
                dst.put_pixel(dst_x, dst_y, image::Rgb(pixel));
            }
        }
    }
}

/// Compute a 3x3 homography matrix from 4 point correspondences
/// using the Direct Linear Transform (DLT) with `h33` fixed to 1
fn compute_homography(src: &[Point; 4], dst: &[Point; 4]) -> Option<Matrix3<f64>> {
    // For each correspondence (x,y) -> (x',y') we get two rows:
    //  x*h1 + y*h2 + h3 - x'*x*h7 - x'*y*h8 = x'
    //  x*h4 + y*h5 + h6 - y'*x*h7 - y'*y*h8 = y'
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for i in 0..4 {
        let (x, y) = (src[i].x, src[i].y);
        let (xp, yp) = (dst[i].x, dst[i].y);

        let row1 = i * 2;
        let row2 = i * 2 + 1;

        a[(row1, 0)] = x;
        a[(row1, 1)] = y;
        a[(row1, 2)] = 1.0;
        a[(row1, 6)] = -xp * x;
        a[(row1, 7)] = -xp * y;
        b[row1] = xp;

        a[(row2, 3)] = x;
        a[(row2, 4)] = y;
        a[(row2, 5)] = 1.0;
        a[(row2, 6)] = -yp * x;
        a[(row2, 7)] = -yp * y;
        b[row2] = yp;
    }

    let h = a.lu().solve(&b)?;
    if h.iter().any(|v| !v.is_finite()) {
        return None;
    }

    Some(Matrix3::new(
        h[0], h[1], h[2], //
        h[3], h[4], h[5], //
        h[6], h[7], 1.0,
    ))
}

/// Apply a homography matrix to a point
#[inline]
fn apply_homography(h: &Matrix3<f64>, p: Point) -> Option<Point> {
    let w = h[(2, 0)] * p.x + h[(2, 1)] * p.y + h[(2, 2)];
    if w.abs() < 1e-12 {
        return None; // Point maps to infinity
    }
    let xp = (h[(0, 0)] * p.x + h[(0, 1)] * p.y + h[(0, 2)]) / w;
    let yp = (h[(1, 0)] * p.x + h[(1, 1)] * p.y + h[(1, 2)]) / w;
    Some(Point::new(xp, yp))
}

/// Bilinear interpolation sampling of a packed RGB buffer
#[inline]
pub(crate) fn bilinear_sample(
    src: &[u8],
    stride: usize,
    width: usize,
    height: usize,
    x: f64,
    y: f64,
) -> [u8; 3] {
    // Clamp coordinates
    let x = x.max(0.0).min((width - 1) as f64);
    let y = y.max(0.0).min((height - 1) as f64);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let mut result = [0u8; 3];

    for (c, out) in result.iter_mut().enumerate() {
        let p00 = src.get(y0 * stride + x0 * 3 + c).copied().unwrap_or(0) as f64;
        let p10 = src.get(y0 * stride + x1 * 3 + c).copied().unwrap_or(0) as f64;
        let p01 = src.get(y1 * stride + x0 * 3 + c).copied().unwrap_or(0) as f64;
        let p11 = src.get(y1 * stride + x1 * 3 + c).copied().unwrap_or(0) as f64;

        let value = p00 * (1.0 - fx) * (1.0 - fy)
            + p10 * fx * (1.0 - fy)
            + p01 * (1.0 - fx) * fy
            + p11 * fx * fy;

        *out = value.round().clamp(0.0, 255.0) as u8;
    }

    result
}
