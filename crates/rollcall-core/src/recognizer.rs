//! Recognizer adapter — turns raw engine observations into typed detections.

use crate::engine::FaceObservation;
use crate::gallery::Gallery;
use crate::types::{DetectedIdentity, Detection, GalleryMatch, Matcher, ENCODING_DIM};

/// Matches engine observations against the gallery.
pub struct Recognizer<M> {
    matcher: M,
}

impl<M: Matcher> Recognizer<M> {
    pub fn new(matcher: M) -> Self {
        Self { matcher }
    }

    /// Classify each observation. Faces that pass no gallery threshold are
    /// reported as unmatched detections, not discarded.
    pub fn detect(&self, observations: &[FaceObservation], gallery: &Gallery) -> Vec<Detection> {
        observations
            .iter()
            .map(|obs| self.classify(obs, gallery))
            .collect()
    }

    fn classify(&self, obs: &FaceObservation, gallery: &Gallery) -> Detection {
        if obs.encoding.values.len() != ENCODING_DIM {
            tracing::warn!(
                got = obs.encoding.values.len(),
                "engine returned encoding of unexpected dimensionality"
            );
            return unmatched(obs);
        }

        match self.matcher.compare(&obs.encoding, gallery.members()) {
            GalleryMatch {
                matched: true,
                distance,
                student_id: Some(student_id),
                name: Some(name),
            } => Detection {
                bounding_box: obs.bounding_box.clone(),
                identity: Some(DetectedIdentity { student_id, name }),
                confidence: (1.0 - distance).clamp(0.0, 1.0),
            },
            _ => unmatched(obs),
        }
    }
}

fn unmatched(obs: &FaceObservation) -> Detection {
    Detection {
        bounding_box: obs.bounding_box.clone(),
        identity: None,
        confidence: 0.0,
    }
}
