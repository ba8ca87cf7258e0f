use rerun::{Color, Points3D, Position3D, RecordingStream};

use crate::error::{Error, Result};
use crate::types::PointCloud;

/// Something that can display a fused cloud. Every call replaces whatever
/// was shown before.
pub trait RenderSurface {
    fn show_cloud(&mut self, cloud: &PointCloud) -> Result<()>;
}

/// Streams clouds to a Rerun viewer.
pub struct RerunSurface {
    rec: RecordingStream,
    entity: String,
}

impl RerunSurface {
    pub const DEFAULT_ENTITY: &'static str = "depthsense/cloud";

    pub fn new(rec: RecordingStream) -> Self {
        Self {
            rec,
            entity: Self::DEFAULT_ENTITY.to_string(),
        }
    }

    /// Spawns a native viewer and connects to it.
    pub fn spawn(app_id: &str) -> anyhow::Result<Self> {
        let rec = rerun::RecordingStreamBuilder::new(app_id).spawn()?;
        Ok(Self::new(rec))
    }
}

impl RenderSurface for RerunSurface {
    fn show_cloud(&mut self, cloud: &PointCloud) -> Result<()> {
        let positions = cloud
            .iter()
            .map(|p| Position3D::new(p.position.x, p.position.y, p.position.z));
        let colors = cloud
            .iter()
            .map(|p| Color::from_rgb(p.color.r, p.color.g, p.color.b));
        let points = Points3D::new(positions).with_colors(colors);

        self.rec
            .log(self.entity.as_str(), &points)
            .map_err(|e| Error::Render(e.to_string()))
    }
}

/// Keeps the last cloud it was given. Used when running headless.
#[derive(Debug, Default)]
pub struct LatestCloud {
    pub last: Option<PointCloud>,
    pub frames_shown: u64,
}

impl RenderSurface for LatestCloud {
    fn show_cloud(&mut self, cloud: &PointCloud) -> Result<()> {
        match &mut self.last {
            Some(last) => last.clone_from(cloud),
            None => self.last = Some(cloud.clone()),
        }
        self.frames_shown += 1;
        Ok(())
    }
}

impl<R: RenderSurface + ?Sized> RenderSurface for Box<R> {
    fn show_cloud(&mut self, cloud: &PointCloud) -> Result<()> {
        (**self).show_cloud(cloud)
    }
}
