//! Receive-side buffering - the shared byte ring and line/frame extraction.
//!
//! The reader task is the only writer into [`RingBuffer`]; the command engine
//! is the only reader, always through [`FrameReader`].

mod frame_reader;
mod ring;

pub use frame_reader::{FrameReader, DEFAULT_MAX_LINE_LEN, DEFAULT_POLL_INTERVAL};
pub use ring::{RingBuffer, DEFAULT_CAPACITY};
