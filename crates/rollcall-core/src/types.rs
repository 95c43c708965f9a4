use serde::{Deserialize, Serialize};

use crate::gallery::GalleryMember;

/// Expected dimensionality of a face encoding.
pub const ENCODING_DIM: usize = 128;

/// Bounding box for a face located in a frame, in pixel coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Face encoding vector (128-dimensional).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Encoding {
    pub values: Vec<f32>,
}

impl Encoding {
    /// Compute Euclidean distance to another encoding. Lower = more similar.
    pub fn euclidean_distance(&self, other: &Encoding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// A known student recognized in a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedIdentity {
    pub student_id: String,
    pub name: String,
}

/// One face found in a frame, matched against the gallery or not.
///
/// Unmatched faces are kept rather than discarded; downstream layers may
/// want their counts even though they never produce attendance writes.
#[derive(Debug, Clone)]
pub struct Detection {
    pub bounding_box: BoundingBox,
    /// `None` when no gallery member passed both match gates.
    pub identity: Option<DetectedIdentity>,
    /// `1 - distance` for matched faces, clamped to [0, 1]. 0.0 when unmatched.
    pub confidence: f32,
}

impl Detection {
    pub fn is_matched(&self) -> bool {
        self.identity.is_some()
    }
}

/// Result of matching a probe encoding against the gallery.
#[derive(Debug, Clone)]
pub struct GalleryMatch {
    pub matched: bool,
    /// Euclidean distance of the best candidate. `f32::INFINITY` for an
    /// empty gallery.
    pub distance: f32,
    pub student_id: Option<String>,
    pub name: Option<String>,
}

/// Strategy for comparing a probe encoding against the gallery.
pub trait Matcher {
    fn compare(&self, probe: &Encoding, gallery: &[GalleryMember]) -> GalleryMatch;
}

/// Euclidean-distance matcher with a dual acceptance gate.
///
/// The best candidate is the member at minimum distance; it is accepted only
/// if `distance <= match_tolerance` AND `distance < distance_threshold`.
/// The two gates mirror the upstream library's boolean match flag and its
/// raw distance, which can disagree at the margin — the stricter combination
/// must hold.
pub struct EuclideanMatcher {
    pub match_tolerance: f32,
    pub distance_threshold: f32,
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self {
            match_tolerance: 0.6,
            distance_threshold: 0.6,
        }
    }
}

impl Matcher for EuclideanMatcher {
    fn compare(&self, probe: &Encoding, gallery: &[GalleryMember]) -> GalleryMatch {
        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, member) in gallery.iter().enumerate() {
            let dist = probe.euclidean_distance(&member.encoding);
            if dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx)
                if best_dist <= self.match_tolerance && best_dist < self.distance_threshold =>
            {
                GalleryMatch {
                    matched: true,
                    distance: best_dist,
                    student_id: Some(gallery[idx].student_id.clone()),
                    name: Some(gallery[idx].name.clone()),
                }
            }
            _ => GalleryMatch {
                matched: false,
                distance: best_dist,
                student_id: None,
                name: None,
            },
        }
    }
}
