//! rollcall-hw — frame acquisition for the attendance daemon.
//!
//! A [`FrameSource`] drives a priority-ordered list of capture backends,
//! confirming each open with one real frame before committing to it.

pub mod camera;
pub mod frame;

pub use camera::{CameraError, CaptureBackend, CaptureHandle, FrameSource, V4l2Backend};
pub use frame::Frame;
