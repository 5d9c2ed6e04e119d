// Landmark labeling - names detector keypoints a1..aN and keeps their normalized coordinates

use crate::core::frame_overlay::{to_pixel, FrameOverlay};
use crate::models::pose::{HandObservation, Keypoint3D, KeypointLabel, LabeledKeypoint};

/// Assigns stable labels to the keypoints of one detected hand
#[derive(Debug, Clone, Copy, Default)]
pub struct LandmarkLabeler;

impl LandmarkLabeler {
    pub fn new() -> Self {
        Self
    }

    /// Label the keypoints of one hand.
    ///
    /// The keypoint at detector position `i` becomes `a{i+1}`. Stored coordinates are
    /// the detector's normalized values, unmodified. The frame dimensions are only used
    /// to place markers when an `overlay` is supplied.
    pub fn label(
        &self,
        frame_width: u32,
        frame_height: u32,
        landmarks: &[Keypoint3D],
        overlay: Option<&mut FrameOverlay>,
    ) -> HandObservation {
        let keypoints: Vec<LabeledKeypoint> = landmarks
            .iter()
            .enumerate()
            .map(|(i, kp)| LabeledKeypoint {
                label: KeypointLabel::from_index(i),
                position: [kp.x, kp.y, kp.z],
            })
            .collect();

        if let Some(overlay) = overlay {
            for kp in &keypoints {
                let (cx, cy) = to_pixel(kp.position, frame_width, frame_height);
                overlay.mark(cx, cy);
            }
        }

        HandObservation::new(keypoints)
    }
}
