//! Shape descriptors of segmented tools.
//!
//! Every contour of the binary mask, outer borders and hole borders alike,
//! is reduced to its polygon-moment centroid, its axis-aligned bounding box
//! and its enclosed area.  A ringed tool therefore yields two shapes.

use image::GrayImage;
use imageproc::contours::find_contours;
use imageproc::point::Point;
use panelbot_types::Pixel;

use crate::error::LocalizeError;

/// Geometry of one contour.
#[derive(Debug, Clone, PartialEq)]
pub struct ContourGeometry {
    pub centroid: Pixel,
    /// Bounding-box height; the tools hang vertically.
    pub length: f64,
    /// Bounding-box width.
    pub width: f64,
    /// Polygon area enclosed by the contour.
    pub area: f64,
}

/// Extract the contours of `binary` whose area exceeds `min_area`, sorted
/// left to right.  Hole borders are kept next to outer borders.
///
/// # Errors
///
/// [`LocalizeError::ContourCountMismatch`] when the number of contours kept
/// differs from `expected`.
pub fn extract_geometry(
    binary: &GrayImage,
    min_area: f64,
    expected: usize,
) -> Result<Vec<ContourGeometry>, LocalizeError> {
    let mut shapes: Vec<ContourGeometry> = find_contours::<i32>(binary)
        .iter()
        .map(|c| describe(&c.points))
        .filter(|g| g.area > min_area)
        .collect();
    shapes.sort_by(|a, b| a.centroid.x.total_cmp(&b.centroid.x));

    if shapes.len() != expected {
        return Err(LocalizeError::ContourCountMismatch {
            expected,
            found: shapes.len(),
        });
    }
    Ok(shapes)
}

fn describe(points: &[Point<i32>]) -> ContourGeometry {
    let (mut min_x, mut max_x) = (i32::MAX, i32::MIN);
    let (mut min_y, mut max_y) = (i32::MAX, i32::MIN);
    for p in points {
        min_x = min_x.min(p.x);
        max_x = max_x.max(p.x);
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }

    let mut twice_area = 0.0f64;
    let (mut cx, mut cy) = (0.0f64, 0.0f64);
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        let (x0, y0, x1, y1) = (p.x as f64, p.y as f64, q.x as f64, q.y as f64);
        let cross = x0 * y1 - x1 * y0;
        twice_area += cross;
        cx += (x0 + x1) * cross;
        cy += (y0 + y1) * cross;
    }

    let centroid = if twice_area.abs() < f64::EPSILON {
        let n = points.len().max(1) as f64;
        Pixel::new(
            points.iter().map(|p| p.x as f64).sum::<f64>() / n,
            points.iter().map(|p| p.y as f64).sum::<f64>() / n,
        )
    } else {
        Pixel::new(cx / (3.0 * twice_area), cy / (3.0 * twice_area))
    };

    ContourGeometry {
        centroid,
        length: (max_y - min_y + 1) as f64,
        width: (max_x - min_x + 1) as f64,
        area: twice_area.abs() / 2.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn fill(img: &mut GrayImage, x0: u32, y0: u32, w: u32, h: u32) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                img.put_pixel(x, y, Luma([255]));
            }
        }
    }

    fn three_bars() -> GrayImage {
        let mut img = GrayImage::new(200, 100);
        fill(&mut img, 140, 10, 11, 51);
        fill(&mut img, 20, 10, 11, 71);
        fill(&mut img, 80, 20, 21, 41);
        // Speck below the area threshold.
        fill(&mut img, 180, 90, 3, 3);
        img
    }

    #[test]
    fn bars_are_sorted_left_to_right() {
        let shapes = extract_geometry(&three_bars(), 100.0, 3).unwrap();
        let xs: Vec<f64> = shapes.iter().map(|s| s.centroid.x).collect();
        assert!(xs.windows(2).all(|w| w[0] < w[1]));
        assert!((shapes[0].centroid.x - 25.0).abs() < 1e-9);
        assert!((shapes[0].centroid.y - 45.0).abs() < 1e-9);
    }

    #[test]
    fn bounding_box_and_area() {
        let shapes = extract_geometry(&three_bars(), 100.0, 3).unwrap();
        assert_eq!(shapes[0].length, 71.0);
        assert_eq!(shapes[0].width, 11.0);
        assert_eq!(shapes[1].length, 41.0);
        assert_eq!(shapes[1].width, 21.0);
        // Polygon through the boundary pixel centres.
        assert!((shapes[2].area - 10.0 * 50.0).abs() < 1e-9);
    }

    #[test]
    fn count_mismatch_is_reported() {
        assert_eq!(
            extract_geometry(&three_bars(), 100.0, 6),
            Err(LocalizeError::ContourCountMismatch { expected: 6, found: 3 })
        );
    }

    #[test]
    fn empty_mask_has_no_shapes() {
        let img = GrayImage::new(20, 20);
        assert_eq!(extract_geometry(&img, 0.0, 0), Ok(Vec::new()));
    }

    #[test]
    fn ring_yields_outer_and_hole_borders() {
        use imageproc::contours::BorderType;

        let mut img = GrayImage::new(80, 80);
        fill(&mut img, 20, 20, 40, 40);
        for y in 30..50 {
            for x in 30..50 {
                img.put_pixel(x, y, Luma([0]));
            }
        }
        let kinds: Vec<BorderType> = find_contours::<i32>(&img).iter().map(|c| c.border_type).collect();
        assert_eq!(kinds, vec![BorderType::Outer, BorderType::Hole]);

        let mut shapes = extract_geometry(&img, 100.0, 2).unwrap();
        shapes.sort_by(|a, b| a.area.total_cmp(&b.area));
        // The hole border runs through the ring's inner pixels, x 29..=50,
        // cutting the diagonal corners.
        assert_eq!(shapes[0].width, 22.0);
        assert!(shapes[0].area > 430.0 && shapes[0].area <= 21.0 * 21.0, "area {}", shapes[0].area);
        assert_eq!(shapes[1].width, 40.0);
        assert!((shapes[1].area - 39.0 * 39.0).abs() < 1e-9);
        for s in &shapes {
            assert!((s.centroid.x - 39.5).abs() < 1e-9);
            assert!((s.centroid.y - 39.5).abs() < 1e-9);
        }
    }
}
