use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_ellipse_mut, draw_polygon_mut};
use imageproc::point::Point;

use crate::bbox::Anchor;
use crate::detection::Detections;

/// Renders one processed frame.
pub trait Annotator {
    fn annotate(&self, frame: &RgbImage, ball: &Detections, others: &Detections) -> RgbImage;
}

/// Ground ellipses under people and a marker above the ball.
///
/// Track ids are not rendered as `#id` text labels; the crate ships no font.
/// Callers that need labels can wrap this annotator and draw text from
/// `Detection::track_id` themselves.
#[derive(Debug, Clone)]
pub struct EllipseAnnotator {
    /// Team A, team B, referees
    pub palette: [Rgb<u8>; 3],
    pub ball_color: Rgb<u8>,
    pub thickness: u32,
    pub triangle_base: f32,
    pub triangle_height: f32,
}

impl Default for EllipseAnnotator {
    fn default() -> Self {
        Self {
            palette: [Rgb([0x00, 0xBF, 0xFF]), Rgb([0xFF, 0x14, 0x93]), Rgb([0xFF, 0xD7, 0x00])],
            ball_color: Rgb([0, 0, 0]),
            thickness: 2,
            triangle_base: 25.0,
            triangle_height: 21.0,
        }
    }
}

impl EllipseAnnotator {
    fn draw_ellipse(&self, canvas: &mut RgbImage, dets: &Detections) {
        for det in dets.iter() {
            let color = match det.role().palette_index() {
                Some(idx) => self.palette[idx],
                None => continue,
            };

            let foot = det.anchor(Anchor::BottomCenter);
            let rx = (det.bbox.width() / 2.0).round() as i32;
            let ry = (det.bbox.width() * 0.175).round() as i32;
            let center = (foot.x.round() as i32, foot.y.round() as i32);

            for t in 0..self.thickness as i32 {
                if rx - t > 0 && ry - t > 0 {
                    draw_hollow_ellipse_mut(canvas, center, rx - t, ry - t, color);
                }
            }
        }
    }

    fn draw_ball(&self, canvas: &mut RgbImage, ball: &Detections) {
        for det in ball.iter() {
            let tip_x = det.anchor(Anchor::Center).x;
            let tip_y = det.bbox.top();
            let half = self.triangle_base / 2.0;

            let poly = [
                Point::new(tip_x.round() as i32, tip_y.round() as i32),
                Point::new((tip_x - half).round() as i32, (tip_y - self.triangle_height).round() as i32),
                Point::new((tip_x + half).round() as i32, (tip_y - self.triangle_height).round() as i32),
            ];

            if poly[0] != poly[1] && poly[1] != poly[2] {
                draw_polygon_mut(canvas, &poly, self.ball_color);
            }
        }
    }
}

impl Annotator for EllipseAnnotator {
    fn annotate(&self, frame: &RgbImage, ball: &Detections, others: &Detections) -> RgbImage {
        let mut canvas = frame.clone();

        self.draw_ellipse(&mut canvas, others);
        self.draw_ball(&mut canvas, ball);

        canvas
    }
}
