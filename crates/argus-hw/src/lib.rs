//! argus-hw — Hardware abstraction for camera capture.
//!
//! Provides V4L2-based camera access producing RGB frames, plus the
//! [`VideoSource`] seam the feed loop consumes so orchestration can be
//! tested without a device.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, CameraStream, PixelFormat};
pub use frame::{crop_region, downsample, Frame, VideoSource};
