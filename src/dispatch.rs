use std::future::Future;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use crate::fusion::FrameSink;
use crate::logio::LogWriter;
use crate::session::{NodeControl, Session};
use crate::types::{DepthFrame, NodeInfo, RawColorFrame};

pub const FPS_PRINT_INTERVAL: Duration = Duration::from_secs(5);

/// Everything a frame source can report.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    DeviceAdded(String),
    DeviceRemoved(String),
    NodeAdded(NodeInfo),
    NodeRemoved(NodeInfo),
    Color(RawColorFrame),
    Depth(DepthFrame),
}

/// Why [`Dispatcher::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every sender was dropped.
    SourcesClosed,
    ShutdownRequested,
}

/// Counts events and reports the rate once per interval.
pub struct RateMeter {
    stream: &'static str,
    interval: Duration,
    count: u32,
    since: Instant,
}

impl RateMeter {
    pub fn new(stream: &'static str, interval: Duration) -> Self {
        Self {
            stream,
            interval,
            count: 0,
            since: Instant::now(),
        }
    }

    /// Returns the measured rate when an interval has elapsed.
    pub fn tick(&mut self) -> Option<f32> {
        self.count += 1;
        let elapsed = self.since.elapsed();
        if elapsed < self.interval {
            return None;
        }
        let fps = self.count as f32 / elapsed.as_secs_f32();
        info!(stream = self.stream, "{} FPS: {:.2}", self.stream, fps);
        self.count = 0;
        self.since = Instant::now();
        Some(fps)
    }
}

/// Single consumer of device events.
///
/// Owns the session and the frame sink and handles one event at a time, so
/// the color and depth callbacks can never overlap.
pub struct Dispatcher<C, S> {
    session: Session<C>,
    sink: S,
    recorder: Option<LogWriter>,
    color_rate: RateMeter,
    depth_rate: RateMeter,
}

impl<C: NodeControl, S: FrameSink> Dispatcher<C, S> {
    pub fn new(session: Session<C>, sink: S) -> Self {
        Self {
            session,
            sink,
            recorder: None,
            color_rate: RateMeter::new("color", FPS_PRINT_INTERVAL),
            depth_rate: RateMeter::new("depth", FPS_PRINT_INTERVAL),
        }
    }

    /// Records every frame handled from now on.
    pub fn with_recorder(mut self, recorder: LogWriter) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn session(&self) -> &Session<C> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session<C> {
        &mut self.session
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub async fn handle(&mut self, event: DeviceEvent) {
        if matches!(event, DeviceEvent::Color(_) | DeviceEvent::Depth(_)) {
            self.record(&event);
        }
        match event {
            DeviceEvent::DeviceAdded(device) => self.session.on_device_added(&device),
            DeviceEvent::DeviceRemoved(device) => self.session.on_device_removed(&device),
            DeviceEvent::NodeAdded(node) => self.session.on_node_added(&node).await,
            DeviceEvent::NodeRemoved(node) => self.session.on_node_removed(&node),
            DeviceEvent::Color(frame) => {
                match self.sink.on_color_frame(&frame) {
                    Ok(()) => {
                        self.color_rate.tick();
                    }
                    Err(e) => warn!(error = %e, "dropping color frame"),
                }
            }
            DeviceEvent::Depth(frame) => {
                match self.sink.on_depth_frame(&frame) {
                    Ok(()) => {
                        self.depth_rate.tick();
                    }
                    Err(e) => warn!(error = %e, "depth frame not displayed"),
                }
            }
        }
    }

    fn record(&mut self, event: &DeviceEvent) {
        let Some(writer) = self.recorder.as_mut() else {
            return;
        };
        if let Err(e) = writer.write(event) {
            warn!(error = %e, "failed to record frame, recording stopped");
            self.recorder = None;
        }
    }

    /// Handles events until every source has closed or `shutdown` resolves,
    /// then stops and releases the nodes.
    pub async fn run(
        &mut self,
        rx: &mut UnboundedReceiver<DeviceEvent>,
        shutdown: impl Future<Output = ()>,
    ) -> StopReason {
        tokio::pin!(shutdown);
        let reason = loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => {
                        info!("all frame sources closed");
                        break StopReason::SourcesClosed;
                    }
                },
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break StopReason::ShutdownRequested;
                }
            }
        };

        self.session.shutdown().await;
        if let Some(mut writer) = self.recorder.take() {
            if let Err(e) = writer.flush() {
                warn!(error = %e, "failed to flush recording");
            }
        }
        reason
    }
}
