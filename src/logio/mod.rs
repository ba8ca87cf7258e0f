//! On-disk recording and playback of camera frames.

mod reader;
mod writer;

pub use reader::{playback, Pacing};
pub use writer::LogWriter;
