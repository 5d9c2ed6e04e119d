// Hand selection - picks at most one hand per frame out of the detector's output

use crate::models::pose::HandObservation;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Rule used to keep a single hand when the detector reports several
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandSelectionPolicy {
    /// Keep the first hand in detector order
    #[default]
    FirstReturned,
    /// Keep the hand whose keypoints cover the largest normalized area
    LargestBoundingBox,
    /// Keep the hand whose centroid is nearest the previously kept hand
    ClosestToPrevious,
}

impl fmt::Display for HandSelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandSelectionPolicy::FirstReturned => "first_returned",
            HandSelectionPolicy::LargestBoundingBox => "largest_bounding_box",
            HandSelectionPolicy::ClosestToPrevious => "closest_to_previous",
        };
        f.write_str(name)
    }
}

impl FromStr for HandSelectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first_returned" | "first" => Ok(HandSelectionPolicy::FirstReturned),
            "largest_bounding_box" | "largest" => Ok(HandSelectionPolicy::LargestBoundingBox),
            "closest_to_previous" | "closest" => Ok(HandSelectionPolicy::ClosestToPrevious),
            other => Err(format!("unknown hand selection policy: {}", other)),
        }
    }
}

/// Stateful selector for the frames of one video.
///
/// `ClosestToPrevious` remembers the centroid of the last kept hand; a new
/// selector is created per video so state never leaks between videos.
#[derive(Debug, Clone)]
pub struct HandSelector {
    policy: HandSelectionPolicy,
    previous: Option<[f32; 2]>,
}

impl HandSelector {
    pub fn new(policy: HandSelectionPolicy) -> Self {
        Self {
            policy,
            previous: None,
        }
    }

    pub fn policy(&self) -> HandSelectionPolicy {
        self.policy
    }

    /// Keep one hand out of `hands`, `None` when the list is empty
    pub fn select(&mut self, hands: Vec<HandObservation>) -> Option<HandObservation> {
        let chosen = match self.policy {
            HandSelectionPolicy::FirstReturned => hands.into_iter().next(),
            HandSelectionPolicy::LargestBoundingBox => {
                pick_max(hands, |hand| hand.bounds().map(area).unwrap_or(0.0))
            }
            HandSelectionPolicy::ClosestToPrevious => match self.previous {
                // No history yet
                None => hands.into_iter().next(),
                Some(prev) => pick_max(hands, |hand| {
                    hand.centroid()
                        .map(|c| -distance_sq(c, prev))
                        .unwrap_or(f32::NEG_INFINITY)
                }),
            },
        };

        if let Some(centroid) = chosen.as_ref().and_then(HandObservation::centroid) {
            self.previous = Some(centroid);
        }
        chosen
    }
}

// Ties keep the earliest hand
fn pick_max<F>(hands: Vec<HandObservation>, score: F) -> Option<HandObservation>
where
    F: Fn(&HandObservation) -> f32,
{
    let mut best: Option<(f32, HandObservation)> = None;
    for hand in hands {
        let s = score(&hand);
        match &best {
            Some((best_score, _)) if s <= *best_score => {}
            _ => best = Some((s, hand)),
        }
    }
    best.map(|(_, hand)| hand)
}

fn area((x0, y0, x1, y1): (f32, f32, f32, f32)) -> f32 {
    (x1 - x0) * (y1 - y0)
}

fn distance_sq(a: [f32; 2], b: [f32; 2]) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    dx * dx + dy * dy
}
