//! Foreground segmentation of dark tools against a bright board.
//!
//! grayscale → median blur → Otsu threshold → small-component removal →
//! elliptical opening → inversion.  The output binary image has the tools at
//! 255 and the board at 0.

use image::{GrayImage, Luma, RgbImage, imageops};
use imageproc::contrast::otsu_level;
use imageproc::filter::median_filter;
use imageproc::morphology::{Mask, grayscale_open};
use imageproc::region_labelling::{Connectivity, connected_components};

/// Largest opening element; [`Mask`] anchors are 8-bit.
const MAX_ELEMENT_SIZE: u32 = 255;

/// Both images produced by [`segment`].
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// Median-blurred grayscale frame, reused by the circle detector.
    pub gray: GrayImage,
    /// Foreground mask: tools at 255, background at 0.
    pub binary: GrayImage,
}

/// Segment `img` into a binary foreground mask.
///
/// `median_size` is the aperture of the median blur, `min_component_area`
/// the smallest bright region kept after thresholding and `kernel_size` the
/// diameter of the elliptical opening element.
pub fn segment(
    img: &RgbImage,
    median_size: u32,
    min_component_area: u32,
    kernel_size: u32,
) -> Segmentation {
    let gray = imageops::grayscale(img);
    let radius = median_size / 2;
    let gray = median_filter(&gray, radius, radius);

    let level = otsu_level(&gray);
    let mut binary = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y)[0] > level {
            Luma([255])
        } else {
            Luma([0])
        }
    });

    remove_small_components(&mut binary, min_component_area);
    let mut binary = grayscale_open(&binary, &ellipse_element(kernel_size));
    imageops::invert(&mut binary);
    Segmentation { gray, binary }
}

/// Zero every 8-connected bright region with fewer than `min_area` pixels.
fn remove_small_components(binary: &mut GrayImage, min_area: u32) {
    let labels = connected_components(&*binary, Connectivity::Eight, Luma([0u8]));
    let max_label = labels.pixels().map(|p| p[0]).max().unwrap_or(0) as usize;
    let mut areas = vec![0u32; max_label + 1];
    for p in labels.pixels() {
        areas[p[0] as usize] += 1;
    }
    for (x, y, label) in labels.enumerate_pixels() {
        let l = label[0] as usize;
        if l != 0 && areas[l] < min_area {
            binary.put_pixel(x, y, Luma([0]));
        }
    }
}

/// Elliptical structuring element of the given diameter, anchored at
/// `(size / 2, size / 2)`.  Row `i` spans `±round(c·√(r² − dy²)/r)` columns
/// around the centre, so even sizes are one row shorter at the bottom.
pub(crate) fn ellipse_element(size: u32) -> Mask {
    let size = size.clamp(1, MAX_ELEMENT_SIZE);
    let r = (size / 2) as i32;
    let mut footprint = GrayImage::new(size, size);
    if r == 0 {
        footprint.put_pixel(0, 0, Luma([255]));
        return Mask::from_image(&footprint, 0, 0);
    }
    for i in 0..size as i32 {
        let dy = i - r;
        let dx = (r as f64 * (((r * r - dy * dy) as f64) / (r * r) as f64).sqrt()).round() as i32;
        let j1 = (r - dx).max(0);
        let j2 = (r + dx + 1).min(size as i32);
        for j in j1..j2 {
            footprint.put_pixel(j as u32, i as u32, Luma([255]));
        }
    }
    Mask::from_image(&footprint, r as u8, r as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use imageproc::morphology::grayscale_dilate;

    fn board_with_tool() -> RgbImage {
        let mut img = RgbImage::from_pixel(100, 60, Rgb([240; 3]));
        for y in 10..40 {
            for x in 20..50 {
                img.put_pixel(x, y, Rgb([30; 3]));
            }
        }
        // Bright speck inside the tool, too small to survive.
        for y in 24..27 {
            for x in 34..37 {
                img.put_pixel(x, y, Rgb([250; 3]));
            }
        }
        img
    }

    #[test]
    fn tool_is_foreground_board_is_background() {
        let seg = segment(&board_with_tool(), 3, 30, 8);
        assert_eq!(seg.binary.get_pixel(25, 15)[0], 255);
        assert_eq!(seg.binary.get_pixel(80, 50)[0], 0);
        assert_eq!(seg.binary.get_pixel(5, 5)[0], 0);
    }

    #[test]
    fn small_bright_regions_are_filled() {
        let seg = segment(&board_with_tool(), 3, 30, 8);
        assert_eq!(seg.binary.get_pixel(35, 25)[0], 255);
    }

    #[test]
    fn gray_output_is_median_blurred_frame() {
        let seg = segment(&board_with_tool(), 3, 30, 8);
        assert_eq!(seg.gray.dimensions(), (100, 60));
        assert_eq!(seg.gray.get_pixel(80, 50)[0], 240);
    }

    #[test]
    fn ellipse_element_footprint() {
        let mut point = GrayImage::new(21, 21);
        point.put_pixel(10, 10, Luma([255]));
        let spread = grayscale_dilate(&point, &ellipse_element(8));
        for (x, y) in [(10, 10), (10, 7), (10, 13), (7, 7), (13, 13)] {
            assert_eq!(spread.get_pixel(x, y)[0], 255, "({x}, {y})");
        }
        // Corners of the bounding square are outside the ellipse.
        assert_eq!(spread.get_pixel(6, 6)[0], 0);
        assert_eq!(spread.get_pixel(14, 14)[0], 0);
    }

    #[test]
    fn opening_removes_thin_bright_lines() {
        let mut bin = GrayImage::new(40, 40);
        for y in 0..40 {
            bin.put_pixel(20, y, Luma([255]));
        }
        for y in 5..25 {
            for x in 5..18 {
                bin.put_pixel(x, y, Luma([255]));
            }
        }
        let opened = grayscale_open(&bin, &ellipse_element(8));
        assert_eq!(opened.get_pixel(20, 35)[0], 0);
        assert_eq!(opened.get_pixel(11, 15)[0], 255);
    }
}
