//! Frame capture and the periodic submission loop

pub mod frame;
pub mod scheduler;

pub use frame::{CaptureFrame, CompressedFrame, DirectoryFrameSource, FrameSource};
pub use scheduler::{CaptureScheduler, TickOutcome};
