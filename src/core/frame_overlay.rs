// Frame overlay - draws labeled keypoints onto a frame copy for visual inspection

use crate::models::capture::RawFrame;
use crate::models::pose::{HandObservation, HAND_CONNECTIONS};
use image::{Rgb, RgbImage};
use std::path::Path;

const MARKER_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const BONE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const MARKER_RADIUS: i64 = 2;

/// An RGB copy of a frame that hand annotations are drawn onto
pub struct FrameOverlay {
    image: RgbImage,
}

impl FrameOverlay {
    /// Create an overlay from a decoded frame, `None` if the buffer is inconsistent
    pub fn from_frame(frame: &RawFrame) -> Option<Self> {
        frame.to_rgb_image().map(|image| Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Draw a square marker centered on a pixel position
    pub fn mark(&mut self, cx: i64, cy: i64) {
        for dy in -MARKER_RADIUS..=MARKER_RADIUS {
            for dx in -MARKER_RADIUS..=MARKER_RADIUS {
                self.put(cx + dx, cy + dy, MARKER_COLOR);
            }
        }
    }

    /// Draw the skeleton bones between keypoints present in `observation`
    pub fn draw_connections(&mut self, observation: &HandObservation) {
        let (w, h) = (self.width(), self.height());
        for (a, b) in HAND_CONNECTIONS {
            let (Some(a), Some(b)) = (
                observation.keypoint(a.label()),
                observation.keypoint(b.label()),
            ) else {
                continue;
            };
            let pa = to_pixel(a.position, w, h);
            let pb = to_pixel(b.position, w, h);
            self.line(pa, pb);
        }
    }

    /// Write the annotated frame as PNG
    pub fn save_png(&self, path: &Path) -> image::ImageResult<()> {
        self.image.save_with_format(path, image::ImageFormat::Png)
    }

    fn put(&mut self, x: i64, y: i64, color: Rgb<u8>) {
        if x >= 0 && y >= 0 && (x as u32) < self.image.width() && (y as u32) < self.image.height() {
            self.image.put_pixel(x as u32, y as u32, color);
        }
    }

    // Bresenham
    fn line(&mut self, (x0, y0): (i64, i64), (x1, y1): (i64, i64)) {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let (mut x, mut y, mut err) = (x0, y0, dx + dy);

        loop {
            self.put(x, y, BONE_COLOR);
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }
}

/// Convert normalized coordinates to a pixel position on a `width` x `height` frame
pub fn to_pixel(position: [f32; 3], width: u32, height: u32) -> (i64, i64) {
    (
        (position[0] * width as f32) as i64,
        (position[1] * height as f32) as i64,
    )
}

/// File name used for the overlay of the frame at `ordinal`
pub fn overlay_file_name(ordinal: u64) -> String {
    format!("{:06}.png", ordinal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::pose::{KeypointLabel, LabeledKeypoint};

    fn blank_frame(width: u32, height: u32) -> RawFrame {
        RawFrame::rgb(0, width, height, vec![0; (width * height * 3) as usize])
    }

    #[test]
    fn test_to_pixel_truncates() {
        assert_eq!(to_pixel([0.5, 0.25, 0.0], 100, 40), (50, 10));
        assert_eq!(to_pixel([0.999, 0.999, -1.0], 10, 10), (9, 9));
    }

    #[test]
    fn test_mark_clips_at_edges() {
        let mut overlay = FrameOverlay::from_frame(&blank_frame(8, 8)).unwrap();
        overlay.mark(0, 0);
        overlay.mark(-10, 50);
        assert_eq!(overlay.image().get_pixel(0, 0), &MARKER_COLOR);
        assert_eq!(overlay.image().get_pixel(2, 2), &MARKER_COLOR);
        assert_eq!(overlay.image().get_pixel(3, 3), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_connections_drawn_between_present_keypoints() {
        let mut overlay = FrameOverlay::from_frame(&blank_frame(20, 20)).unwrap();
        let obs = HandObservation::new(vec![
            LabeledKeypoint {
                label: KeypointLabel::from_index(0),
                position: [0.0, 0.5, 0.0],
            },
            LabeledKeypoint {
                label: KeypointLabel::from_index(1),
                position: [0.5, 0.5, 0.0],
            },
        ]);
        overlay.draw_connections(&obs);
        assert_eq!(overlay.image().get_pixel(5, 10), &BONE_COLOR);
        assert_eq!(overlay.image().get_pixel(15, 10), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_save_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(overlay_file_name(7));
        let overlay = FrameOverlay::from_frame(&blank_frame(4, 4)).unwrap();
        overlay.save_png(&path).unwrap();
        assert!(path.ends_with("000007.png"));
        assert!(path.exists());
    }
}
