//! Frame input, tensor conversion and video output.

pub mod convert;
pub mod ffmpeg;
pub mod frames;
pub mod sink;

pub use convert::{image_to_tensor, tensor_to_image};
pub use frames::{read_frames, FrameOptions};
pub use sink::Mp4Sink;
