//! Frame preprocessing for the wrench board.
//!
//! Three independent steps, applied in this order by the wrench selector:
//!
//! 1. [`crop_occlusions`] – drop the bottom of the frame (gripper and arm) and
//!    everything right of the first strong vertical edge (board frame).
//! 2. [`stretch_limits`] + [`adjust_contrast`] – per-channel linear stretch.
//! 3. [`suppress_background`] – brighten every channel by half its most
//!    frequent value so the board washes out.

use image::{GrayImage, Luma, RgbImage, imageops};
use imageproc::edges::canny;
use imageproc::morphology::{Mask, grayscale_dilate};
use serde::{Deserialize, Serialize};

/// Edge dilation: two passes of a 1×5 horizontal kernel.
const EDGE_KERNEL_WIDTH: u32 = 5;
const EDGE_DILATION_PASSES: usize = 2;

/// Share of pixels clipped at each end of a percentile stretch.
const CLIP_FRACTION: f64 = 0.01;

// ─────────────────────────────────────────────────────────────────────────────
// Occlusion crop
// ─────────────────────────────────────────────────────────────────────────────

/// Crop the frame to the region free of arm and board-frame occlusions.
///
/// Keeps the top `keep_fraction` of the rows.  Then runs Canny with the
/// thresholds in `canny_thresholds` (order does not matter), widens edges
/// horizontally and crops the width at the left-most column whose edge count
/// reaches `edge_fraction` of the kept height.  Without such a column only
/// the height is cropped.
pub fn crop_occlusions(
    frame: &RgbImage,
    keep_fraction: f64,
    canny_thresholds: [f32; 2],
    edge_fraction: f64,
) -> RgbImage {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        return frame.clone();
    }
    let keep = ((height as f64 * keep_fraction.clamp(0.0, 1.0)).floor() as u32).max(1);
    let top = imageops::crop_imm(frame, 0, 0, width, keep).to_image();

    let low = canny_thresholds[0].min(canny_thresholds[1]);
    let high = canny_thresholds[0].max(canny_thresholds[1]);
    let edges = canny(&imageops::grayscale(&top), low, high);

    match box_edge_column(&edges, edge_fraction) {
        Some(col) if col > 0 => imageops::crop_imm(&top, 0, 0, col, keep).to_image(),
        _ => top,
    }
}

/// Left-most column with the highest count of (dilated) edge pixels, if that
/// count reaches `edge_fraction` of the image height.
fn box_edge_column(edges: &GrayImage, edge_fraction: f64) -> Option<u32> {
    let (width, height) = edges.dimensions();
    let widen = Mask::from_image(&GrayImage::from_pixel(EDGE_KERNEL_WIDTH, 1, Luma([255])), 2, 0);
    let mut dilated = edges.clone();
    for _ in 0..EDGE_DILATION_PASSES {
        dilated = grayscale_dilate(&dilated, &widen);
    }

    let mut counts = vec![0u32; width as usize];
    for (x, _, px) in dilated.enumerate_pixels() {
        if px[0] != 0 {
            counts[x as usize] += 1;
        }
    }

    let (col, best) = counts
        .iter()
        .enumerate()
        .fold((0usize, 0u32), |(bi, bc), (i, &c)| if c > bc { (i, c) } else { (bi, bc) });
    (best > 0 && best as f64 >= edge_fraction * height as f64).then_some(col as u32)
}

// ─────────────────────────────────────────────────────────────────────────────
// Contrast stretch
// ─────────────────────────────────────────────────────────────────────────────

/// How the upper stretch limit is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StretchMode {
    /// Clip 1 % of pixels at each end of every channel.
    #[default]
    Percentile,
    /// Clip 1 % at the low end only and stretch up to 255.
    FixedUpper,
}

/// Input range of one channel that is mapped onto `0..=255`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelLimits {
    pub low: u8,
    pub high: u8,
}

fn channel_histograms(img: &RgbImage) -> [[u32; 256]; 3] {
    let mut hist = [[0u32; 256]; 3];
    for px in img.pixels() {
        for (c, h) in hist.iter_mut().enumerate() {
            h[px[c] as usize] += 1;
        }
    }
    hist
}

/// Compute the per-channel stretch limits of `img`.
///
/// The low limit is the first intensity at which the cumulative count from
/// the dark end reaches 1 % of the pixels; the high limit is the mirror
/// image from the bright end (or 255 in [`StretchMode::FixedUpper`]).
pub fn stretch_limits(img: &RgbImage, mode: StretchMode) -> [ChannelLimits; 3] {
    let total = img.width() as u64 * img.height() as u64;
    let clip = (total as f64 * CLIP_FRACTION).floor() as u64;
    let hist = channel_histograms(img);

    let mut limits = [ChannelLimits { low: 0, high: 255 }; 3];
    if clip == 0 {
        return limits;
    }
    for (limit, h) in limits.iter_mut().zip(hist.iter()) {
        limit.low = percentile_from(h.iter().enumerate(), clip);
        limit.high = match mode {
            StretchMode::Percentile => percentile_from(h.iter().enumerate().rev(), clip),
            StretchMode::FixedUpper => 255,
        };
    }
    limits
}

fn percentile_from<'a>(bins: impl Iterator<Item = (usize, &'a u32)>, clip: u64) -> u8 {
    let mut acc = 0u64;
    for (value, &count) in bins {
        acc += count as u64;
        if acc >= clip {
            return value as u8;
        }
    }
    255
}

/// Linearly map each channel's `[low, high]` onto `[0, 255]`, clipping
/// outside values.  A channel with `high <= low` is copied unchanged.
pub fn adjust_contrast(img: &RgbImage, limits: &[ChannelLimits; 3]) -> RgbImage {
    let luts: Vec<[u8; 256]> = limits.iter().map(stretch_lut).collect();
    let mut out = img.clone();
    for px in out.pixels_mut() {
        for (c, lut) in luts.iter().enumerate() {
            px[c] = lut[px[c] as usize];
        }
    }
    out
}

fn stretch_lut(limit: &ChannelLimits) -> [u8; 256] {
    let mut lut = [0u8; 256];
    let (lo, hi) = (limit.low as f64, limit.high as f64);
    for (v, slot) in lut.iter_mut().enumerate() {
        *slot = if limit.high <= limit.low {
            v as u8
        } else {
            let clipped = (v as f64).clamp(lo, hi);
            ((clipped - lo) * 255.0 / (hi - lo)).round() as u8
        };
    }
    lut
}

// ─────────────────────────────────────────────────────────────────────────────
// Background suppression
// ─────────────────────────────────────────────────────────────────────────────

/// Add half of each channel's modal value to that channel, saturating at 255.
pub fn suppress_background(img: &RgbImage) -> RgbImage {
    let hist = channel_histograms(img);
    let shift: Vec<u8> = hist
        .iter()
        .map(|h| {
            let mode = h
                .iter()
                .enumerate()
                .fold((0usize, 0u32), |(bi, bc), (i, &c)| if c > bc { (i, c) } else { (bi, bc) })
                .0;
            (mode / 2) as u8
        })
        .collect();

    let mut out = img.clone();
    for px in out.pixels_mut() {
        for (c, s) in shift.iter().enumerate() {
            px[c] = px[c].saturating_add(*s);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gray_rgb(width: u32, height: u32, value: u8) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([value; 3]))
    }

    /// 200 pixels: one at 0, one at 255, 99 at 60 and 99 at 180.
    fn two_level_image() -> RgbImage {
        let mut img = gray_rgb(20, 10, 60);
        for (i, px) in img.pixels_mut().enumerate() {
            if i >= 100 {
                *px = Rgb([180; 3]);
            }
        }
        img.put_pixel(0, 0, Rgb([0; 3]));
        img.put_pixel(19, 9, Rgb([255; 3]));
        img
    }

    #[test]
    fn percentile_limits_ignore_outliers() {
        let limits = stretch_limits(&two_level_image(), StretchMode::Percentile);
        for limit in limits {
            assert_eq!(limit, ChannelLimits { low: 60, high: 180 });
        }
    }

    #[test]
    fn fixed_upper_keeps_full_top_range() {
        let limits = stretch_limits(&two_level_image(), StretchMode::FixedUpper);
        assert_eq!(limits[0], ChannelLimits { low: 60, high: 255 });
    }

    #[test]
    fn contrast_stretch_maps_limits_to_full_range() {
        let img = two_level_image();
        let limits = stretch_limits(&img, StretchMode::Percentile);
        let out = adjust_contrast(&img, &limits);
        assert_eq!(out.get_pixel(1, 0)[0], 0);
        assert_eq!(out.get_pixel(0, 9)[0], 255);
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(19, 9)[0], 255);
    }

    #[test]
    fn degenerate_limits_copy_channel() {
        let img = gray_rgb(4, 4, 90);
        let limits = [ChannelLimits { low: 90, high: 90 }; 3];
        assert_eq!(adjust_contrast(&img, &limits), img);
    }

    #[test]
    fn background_shift_saturates() {
        let mut img = gray_rgb(10, 10, 100);
        img.put_pixel(3, 3, Rgb([230; 3]));
        let out = suppress_background(&img);
        assert_eq!(out.get_pixel(0, 0)[0], 150);
        assert_eq!(out.get_pixel(3, 3)[0], 255);
    }

    #[test]
    fn crop_removes_bottom_rows_without_box_edge() {
        let img = gray_rgb(96, 96, 200);
        let out = crop_occlusions(&img, 69.0 / 96.0, [100.0, 30.0], 0.9);
        assert_eq!(out.dimensions(), (96, 69));
    }

    #[test]
    fn crop_stops_at_vertical_board_edge() {
        let mut img = gray_rgb(96, 96, 230);
        for y in 0..96 {
            for x in 60..62 {
                img.put_pixel(x, y, Rgb([0; 3]));
            }
        }
        let out = crop_occlusions(&img, 69.0 / 96.0, [100.0, 30.0], 0.9);
        assert_eq!(out.height(), 69);
        assert!(out.width() > 50 && out.width() < 60, "width {}", out.width());
    }

    #[test]
    fn edge_dilation_widens_lines_by_four_columns() {
        let mut edges = GrayImage::new(60, 20);
        for y in 0..20 {
            edges.put_pixel(30, y, Luma([255]));
        }
        assert_eq!(box_edge_column(&edges, 0.9), Some(26));
        assert_eq!(box_edge_column(&GrayImage::new(60, 20), 0.9), None);
    }
}
