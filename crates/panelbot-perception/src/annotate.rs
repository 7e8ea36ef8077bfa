//! Debug drawing of a detection.
//!
//! Every candidate gets its bounding box, a circle around its anchor and a
//! cross on its centroid, colored from red (score 0) to green (score 1).
//! The chosen candidate is drawn with a thicker outline.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_cross_mut, draw_hollow_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::pipeline::{Candidate, Detection};

const CHOSEN_THICKNESS: i32 = 3;

fn score_color(score: f64) -> Rgb<u8> {
    let s = score.clamp(0.0, 1.0);
    Rgb([(255.0 * (1.0 - s)).round() as u8, (255.0 * s).round() as u8, 0])
}

/// Axis-aligned box of `width` x `length` pixels centred on the centroid.
fn bounding_box(c: &Candidate) -> Rect {
    let w = c.width.round().max(1.0);
    let h = c.length.round().max(1.0);
    Rect::at(
        (c.centroid.x - w / 2.0).round() as i32,
        (c.centroid.y - h / 2.0).round() as i32,
    )
    .of_size(w as u32, h as u32)
}

/// Draw `detection` over a copy of `frame`.
pub fn annotate(frame: &RgbImage, detection: &Detection) -> RgbImage {
    let mut canvas = frame.clone();
    for (i, c) in detection.candidates.iter().enumerate() {
        let color = score_color(c.score);
        let centre = (c.anchor.x.round() as i32, c.anchor.y.round() as i32);
        let radius = c.radius.round().max(1.0) as i32;
        draw_hollow_rect_mut(&mut canvas, bounding_box(c), color);
        let rings = if i == detection.chosen { CHOSEN_THICKNESS } else { 1 };
        for k in 0..rings {
            draw_hollow_circle_mut(&mut canvas, centre, radius + k, color);
        }
        draw_cross_mut(
            &mut canvas,
            color,
            c.centroid.x.round() as i32,
            c.centroid.y.round() as i32,
        );
    }
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ObjectEstimate;
    use panelbot_types::{ObjectClass, Pixel, Vec3};

    fn candidate(id: usize, x: f64, score: f64) -> Candidate {
        Candidate {
            id,
            centroid: Pixel::new(x, 30.0),
            anchor: Pixel::new(x, 20.0),
            radius: 5.0,
            length: 10.0,
            width: 10.0,
            area: 78.0,
            diameter: 10.0,
            score,
        }
    }

    #[test]
    fn colors_follow_scores() {
        assert_eq!(score_color(0.0), Rgb([255, 0, 0]));
        assert_eq!(score_color(1.0), Rgb([0, 255, 0]));
        assert_eq!(score_color(7.0), Rgb([0, 255, 0]));
    }

    fn detection() -> Detection {
        Detection {
            class: ObjectClass::Wrench,
            estimate: ObjectEstimate {
                offset: Vec3::new(1.0, 0.0, 0.0),
                pixel: Pixel::new(40.0, 20.0),
                confidence: 1.0,
            },
            candidates: vec![candidate(0, 15.0, 0.0), candidate(1, 40.0, 1.0)],
            chosen: 1,
        }
    }

    #[test]
    fn candidates_are_drawn_without_touching_input() {
        let frame = RgbImage::new(60, 50);
        let out = annotate(&frame, &detection());
        assert_eq!(*out.get_pixel(20, 20), Rgb([255, 0, 0]));
        assert_eq!(*out.get_pixel(45, 20), Rgb([0, 255, 0]));
        // Thick ring on the chosen candidate.
        assert_eq!(*out.get_pixel(47, 20), Rgb([0, 255, 0]));
        assert_eq!(*out.get_pixel(40, 30), Rgb([0, 255, 0]));
        assert_eq!(*frame.get_pixel(45, 20), Rgb([0, 0, 0]));
    }

    #[test]
    fn bounding_boxes_take_the_score_color() {
        let frame = RgbImage::new(60, 50);
        let out = annotate(&frame, &detection());
        // Candidate 0 spans x 10..=19, y 25..=34.
        assert_eq!(bounding_box(&candidate(0, 15.0, 0.0)), Rect::at(10, 25).of_size(10, 10));
        assert_eq!(*out.get_pixel(10, 30), Rgb([255, 0, 0]));
        assert_eq!(*out.get_pixel(12, 34), Rgb([255, 0, 0]));
        assert_eq!(*out.get_pixel(9, 30), Rgb([0, 0, 0]));
        // Candidate 1 spans x 35..=44.
        assert_eq!(*out.get_pixel(44, 32), Rgb([0, 255, 0]));
        assert_eq!(*out.get_pixel(42, 32), Rgb([0, 0, 0]));
    }
}
