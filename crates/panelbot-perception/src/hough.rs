//! Gradient Hough circle transform.
//!
//! Every Canny edge pixel votes along its gradient line, in both directions,
//! for every radius in `[min_radius, max_radius]`.  Accumulator local maxima
//! above `accumulator_threshold` become centre candidates, strongest first.
//! A candidate closer than `min_dist` to an accepted centre is dropped.  The
//! radius of an accepted centre is the distance most supported by the
//! surrounding edge pixels.
//!
//! # Example
//!
//! ```rust
//! use image::{GrayImage, Luma};
//! use imageproc::drawing::draw_filled_circle_mut;
//! use panelbot_perception::hough::{HoughParams, detect_circles};
//!
//! let mut img = GrayImage::from_pixel(120, 120, Luma([230]));
//! draw_filled_circle_mut(&mut img, (60, 60), 20, Luma([20]));
//!
//! let params = HoughParams {
//!     canny_high: 100.0,
//!     accumulator_threshold: 20,
//!     min_dist: 10.0,
//!     min_radius: 10,
//!     max_radius: 40,
//! };
//! let circles = detect_circles(&img, &params);
//! assert!(circles.iter().any(|c| (c.x - 60.0).abs() < 3.0 && (c.radius - 20.0).abs() < 3.0));
//! ```

use image::GrayImage;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use serde::{Deserialize, Serialize};

/// Smoothing applied before taking gradient directions.
const GRADIENT_SIGMA: f32 = 1.4;

/// A detected circle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
}

/// Tuning of [`detect_circles`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoughParams {
    /// Upper Canny threshold; the lower one is half of it.
    pub canny_high: f32,
    /// Minimum accumulator votes for a centre, and minimum edge support for
    /// its radius.
    pub accumulator_threshold: u32,
    /// Minimum distance between accepted centres.
    pub min_dist: f64,
    pub min_radius: u32,
    pub max_radius: u32,
}

/// Detect circles in `gray`.  Returns them strongest first.
pub fn detect_circles(gray: &GrayImage, params: &HoughParams) -> Vec<Circle> {
    let (width, height) = gray.dimensions();
    if width < 3 || height < 3 || params.max_radius < params.min_radius {
        return Vec::new();
    }
    let (w, h) = (width as usize, height as usize);

    let edges = canny(gray, params.canny_high / 2.0, params.canny_high);
    let smooth = gaussian_blur_f32(gray, GRADIENT_SIGMA);
    let gx = horizontal_sobel(&smooth);
    let gy = vertical_sobel(&smooth);

    let mut acc = vec![0u32; w * h];
    let mut rows: Vec<Vec<u32>> = vec![Vec::new(); h];
    let min_r = params.min_radius.max(1);

    for (x, y, px) in edges.enumerate_pixels() {
        if px[0] == 0 {
            continue;
        }
        let dx = gx.get_pixel(x, y)[0] as f64;
        let dy = gy.get_pixel(x, y)[0] as f64;
        let mag = dx.hypot(dy);
        if mag < 1e-6 {
            continue;
        }
        rows[y as usize].push(x);
        let (ux, uy) = (dx / mag, dy / mag);
        for sign in [1.0, -1.0] {
            for r in min_r..=params.max_radius {
                let cx = (x as f64 + sign * ux * r as f64).round();
                let cy = (y as f64 + sign * uy * r as f64).round();
                if cx < 0.0 || cy < 0.0 || cx >= width as f64 || cy >= height as f64 {
                    break;
                }
                acc[cy as usize * w + cx as usize] += 1;
            }
        }
    }

    let mut centres = Vec::new();
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let i = y * w + x;
            let v = acc[i];
            if v > params.accumulator_threshold
                && v > acc[i - 1]
                && v >= acc[i + 1]
                && v > acc[i - w]
                && v >= acc[i + w]
            {
                centres.push((v, x, y));
            }
        }
    }
    centres.sort_by(|a, b| b.0.cmp(&a.0).then(a.2.cmp(&b.2)).then(a.1.cmp(&b.1)));

    let min_dist_sq = params.min_dist * params.min_dist;
    let mut circles: Vec<Circle> = Vec::new();
    for (_, x, y) in centres {
        let (cx, cy) = (x as f64, y as f64);
        if circles
            .iter()
            .any(|c| (c.x - cx).powi(2) + (c.y - cy).powi(2) < min_dist_sq)
        {
            continue;
        }
        if let Some(radius) = estimate_radius(&rows, cx, cy, min_r, params) {
            circles.push(Circle { x: cx, y: cy, radius });
        }
    }
    circles
}

/// Best-supported radius around `(cx, cy)`, as the mean distance of the edge
/// pixels in the strongest three-bin window.
fn estimate_radius(
    rows: &[Vec<u32>],
    cx: f64,
    cy: f64,
    min_r: u32,
    params: &HoughParams,
) -> Option<f64> {
    let max_r = params.max_radius as f64;
    let bins = params.max_radius as usize + 2;
    let mut counts = vec![0u32; bins];
    let mut sums = vec![0f64; bins];

    let y_lo = (cy - max_r).floor().max(0.0) as usize;
    let y_hi = ((cy + max_r).ceil() as usize).min(rows.len().saturating_sub(1));
    for (y, xs) in rows.iter().enumerate().take(y_hi + 1).skip(y_lo) {
        let dy = y as f64 - cy;
        for &x in xs {
            let d = (x as f64 - cx).hypot(dy);
            if d < min_r as f64 || d > max_r {
                continue;
            }
            let bin = d.round() as usize;
            counts[bin] += 1;
            sums[bin] += d;
        }
    }

    let mut best: Option<(u32, usize)> = None;
    for r in min_r as usize..=params.max_radius as usize {
        let support = counts[r - 1] + counts[r] + counts[r + 1];
        if best.is_none_or(|(s, _)| support > s) {
            best = Some((support, r));
        }
    }
    let (support, r) = best?;
    if support < params.accumulator_threshold || support == 0 {
        return None;
    }
    let total: f64 = sums[r - 1] + sums[r] + sums[r + 1];
    Some(total / support as f64)
}
