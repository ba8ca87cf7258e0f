//! Per-frame compositing of depth samples with the latest color image.
//!
//! Color and depth arrive on separate clocks. No timestamp matching is done:
//! each depth frame is colored with whatever color frame is buffered when it
//! arrives, so the color may lag by one camera cycle.

use tracing::{debug, trace};

use crate::error::Result;
use crate::mapping::{color_index, DepthRange};
use crate::render::RenderSurface;
use crate::types::{ColorFrame, DepthFrame, PointCloud, RawColorFrame, Rgb8};

/// Receiver of the two frame-ready events.
///
/// Implementations are driven by a single dispatcher and are never called
/// concurrently or reentrantly.
pub trait FrameSink {
    fn on_color_frame(&mut self, frame: &RawColorFrame) -> Result<()>;
    fn on_depth_frame(&mut self, frame: &DepthFrame) -> Result<()>;
}

/// What happens to the position of a slot whose depth is out of range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutOfRangePolicy {
    /// Move the point to the origin along with painting it black.
    #[default]
    ZeroPosition,
    /// Keep the slot's position from the last frame that had a valid depth
    /// there; only the color is cleared.
    RetainPosition,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FusionStats {
    /// Samples inside the depth range.
    pub valid: usize,
    /// Samples painted black.
    pub out_of_range: usize,
    /// Valid samples whose UV fell outside the color image; their color was
    /// left untouched.
    pub unmapped: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FusionConfig {
    pub range: DepthRange,
    pub out_of_range: OutOfRangePolicy,
}

/// Composites `depth` against `color` into `cloud`, slot by slot.
pub fn fuse_depth_frame(
    color: &ColorFrame,
    depth: &DepthFrame,
    cloud: &mut PointCloud,
    config: &FusionConfig,
) -> FusionStats {
    let mut stats = FusionStats::default();

    for (point, (vertex, uv)) in cloud.points_mut().iter_mut().zip(depth.samples()) {
        if !config.range.contains(vertex.z) {
            point.color = Rgb8::BLACK;
            if config.out_of_range == OutOfRangePolicy::ZeroPosition {
                point.position = nalgebra::Point3::origin();
            }
            stats.out_of_range += 1;
            continue;
        }

        match color_index(uv).and_then(|idx| color.pixel(idx)) {
            Some(px) => point.color = px,
            None => stats.unmapped += 1,
        }
        point.position = vertex.to_point();
        stats.valid += 1;
    }

    stats
}

/// Owns the color buffer and the point cloud and feeds the render surface.
pub struct FusionStage<R> {
    color: ColorFrame,
    cloud: PointCloud,
    config: FusionConfig,
    surface: R,
    color_frames: u64,
    depth_frames: u64,
}

impl<R: RenderSurface> FusionStage<R> {
    pub fn new(surface: R, config: FusionConfig) -> Self {
        Self {
            color: ColorFrame::new(),
            cloud: PointCloud::new(),
            config,
            surface,
            color_frames: 0,
            depth_frames: 0,
        }
    }

    pub fn color(&self) -> &ColorFrame {
        &self.color
    }

    pub fn cloud(&self) -> &PointCloud {
        &self.cloud
    }

    pub fn surface(&self) -> &R {
        &self.surface
    }

    pub fn color_frames(&self) -> u64 {
        self.color_frames
    }

    pub fn depth_frames(&self) -> u64 {
        self.depth_frames
    }
}

impl<R: RenderSurface> FrameSink for FusionStage<R> {
    fn on_color_frame(&mut self, frame: &RawColorFrame) -> Result<()> {
        trace!(frame = self.color_frames, ts = frame.timestamp, "color frame");
        self.color.overwrite_from(frame)?;
        self.color_frames += 1;
        Ok(())
    }

    fn on_depth_frame(&mut self, frame: &DepthFrame) -> Result<()> {
        trace!(frame = self.depth_frames, ts = frame.timestamp, "depth frame");
        let stats = fuse_depth_frame(&self.color, frame, &mut self.cloud, &self.config);
        debug!(
            frame = self.depth_frames,
            valid = stats.valid,
            out_of_range = stats.out_of_range,
            unmapped = stats.unmapped,
            "fused depth frame"
        );
        self.depth_frames += 1;
        self.surface.show_cloud(&self.cloud)
    }
}
