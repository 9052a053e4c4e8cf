//! rollcall-hw: frame capture for the recognition loop.
//!
//! Provides V4L2 camera access (feature `v4l`) and a still-image source,
//! both yielding RGB frames through [`FrameSource`].

#[cfg(feature = "v4l")]
pub mod camera;
pub mod frame;
pub mod source;

#[cfg(feature = "v4l")]
pub use camera::{Camera, DeviceInfo, PixelFormat};
pub use frame::{ChannelOrder, Frame, FrameError};
pub use source::{CameraError, FrameSource, StillSource};
