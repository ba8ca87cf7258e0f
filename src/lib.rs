//! Fuses a depth camera's color and depth streams into a live colored point
//! cloud.
//!
//! The depth node delivers a 320x240 grid of vertices, each with a UV
//! coordinate into the 640x480 color image. [`fusion::FusionStage`] keeps the
//! latest color frame and, for every depth frame, writes one colored point per
//! grid slot before handing the cloud to a [`render::RenderSurface`].

pub mod cli;
pub mod dispatch;
pub mod error;
pub mod fusion;
pub mod logio;
pub mod mapping;
pub mod render;
pub mod session;
pub mod transport;
pub mod types;

pub use dispatch::{DeviceEvent, Dispatcher, StopReason};
pub use error::{DeviceError, Error, Result};
pub use fusion::{fuse_depth_frame, FrameSink, FusionConfig, FusionStage, FusionStats, OutOfRangePolicy};
pub use mapping::{uv_to_linear_index, DepthClass, DepthRange};
pub use render::RenderSurface;
pub use session::{NodeControl, Session};
pub use types::*;
