// Frame analysis - runs the detector on one frame and labels every hand it reports

use crate::core::frame_overlay::FrameOverlay;
use crate::core::landmark_labeler::LandmarkLabeler;
use crate::models::capture::RawFrame;
use crate::models::pose::{HandObservation, PoseResult};
use crate::platform::pose::HandLandmarkBridge;

pub struct FrameAnalyzer {
    detector: Box<dyn HandLandmarkBridge>,
    labeler: LandmarkLabeler,
}

impl FrameAnalyzer {
    pub fn new(detector: Box<dyn HandLandmarkBridge>) -> Self {
        Self {
            detector,
            labeler: LandmarkLabeler::new(),
        }
    }

    pub fn model_info(&self) -> String {
        self.detector.get_model_info()
    }

    /// Detect and label the hands in `frame`, in detector order.
    ///
    /// Returns an empty list when no hand is found. When an overlay is given,
    /// every hand's keypoints and skeleton are drawn onto it.
    pub fn analyze(
        &mut self,
        frame: &RawFrame,
        mut overlay: Option<&mut FrameOverlay>,
    ) -> PoseResult<Vec<HandObservation>> {
        let hands = self.detector.process_frame(frame)?;

        let observations = hands
            .iter()
            .map(|hand| {
                let observation = self.labeler.label(
                    frame.width,
                    frame.height,
                    &hand.landmarks,
                    overlay.as_deref_mut(),
                );
                if let Some(overlay) = overlay.as_deref_mut() {
                    overlay.draw_connections(&observation);
                }
                observation
            })
            .collect();

        Ok(observations)
    }
}
