//! rollcall-core — recognition-side domain for the attendance system.
//!
//! Holds the known-face gallery with its validating loader, the distance
//! matcher, the recognizer adapter, and the boundary to the external
//! face-localization/encoding engine.

pub mod engine;
pub mod gallery;
pub mod recognizer;
pub mod types;

pub use engine::{EngineError, FaceEngine, FaceObservation, SidecarEngine};
pub use gallery::{Gallery, GalleryError, GalleryLoad, GalleryMember, GalleryRow};
pub use recognizer::Recognizer;
pub use types::{
    BoundingBox, DetectedIdentity, Detection, Encoding, EuclideanMatcher, GalleryMatch, Matcher,
    ENCODING_DIM,
};
