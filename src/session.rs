//! Device and node bookkeeping.
//!
//! The session adopts the first color node and the first depth node of the
//! first device it sees, configures them through a [`NodeControl`]
//! implementation, and releases them on shutdown. Configuration failures are
//! logged and otherwise ignored; the affected stream simply stays off.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::DeviceError;
use crate::types::{NodeInfo, NodeKind};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum FrameFormat {
    /// 320x240
    Qvga,
    /// 640x480
    Vga,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum Compression {
    Yuy2,
    Mjpeg,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum PowerLineFrequency {
    Disabled,
    Hz50,
    Hz60,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum DepthMode {
    Close,
    Long,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct ColorNodeConfig {
    pub frame_format: FrameFormat,
    pub compression: Compression,
    pub power_line_frequency: PowerLineFrequency,
    pub framerate: u32,
}

impl Default for ColorNodeConfig {
    fn default() -> Self {
        Self {
            frame_format: FrameFormat::Vga,
            compression: Compression::Mjpeg,
            power_line_frequency: PowerLineFrequency::Hz50,
            framerate: 25,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct DepthNodeConfig {
    pub frame_format: FrameFormat,
    pub framerate: u32,
    pub mode: DepthMode,
    pub saturation: bool,
}

impl Default for DepthNodeConfig {
    fn default() -> Self {
        Self {
            frame_format: FrameFormat::Qvga,
            framerate: 25,
            mode: DepthMode::Close,
            saturation: true,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum NodeConfig {
    Color(ColorNodeConfig),
    Depth(DepthNodeConfig),
}

/// Which per-node outputs to turn on.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Encode, Decode)]
pub struct StreamEnables {
    pub color_map: bool,
    pub vertices: bool,
    pub uv_map: bool,
}

impl StreamEnables {
    pub fn for_kind(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Color => Self {
                color_map: true,
                ..Default::default()
            },
            NodeKind::Depth => Self {
                vertices: true,
                uv_map: true,
                ..Default::default()
            },
        }
    }
}

/// Control surface of the device manager.
#[allow(async_fn_in_trait)]
pub trait NodeControl {
    async fn set_enables(&mut self, node: &NodeInfo, enables: StreamEnables) -> Result<(), DeviceError>;
    async fn request_control(&mut self, node: &NodeInfo) -> Result<(), DeviceError>;
    async fn set_configuration(&mut self, node: &NodeInfo, config: &NodeConfig) -> Result<(), DeviceError>;
    async fn register_node(&mut self, node: &NodeInfo) -> Result<(), DeviceError>;
    async fn unregister_node(&mut self, node: &NodeInfo) -> Result<(), DeviceError>;
    async fn start_nodes(&mut self) -> Result<(), DeviceError>;
    async fn stop_nodes(&mut self) -> Result<(), DeviceError>;
}

/// Control used when frames come from a recording: there is nothing to
/// configure, so every request succeeds.
#[derive(Debug, Default)]
pub struct Detached;

impl NodeControl for Detached {
    async fn set_enables(&mut self, _: &NodeInfo, _: StreamEnables) -> Result<(), DeviceError> {
        Ok(())
    }
    async fn request_control(&mut self, _: &NodeInfo) -> Result<(), DeviceError> {
        Ok(())
    }
    async fn set_configuration(&mut self, _: &NodeInfo, _: &NodeConfig) -> Result<(), DeviceError> {
        Ok(())
    }
    async fn register_node(&mut self, _: &NodeInfo) -> Result<(), DeviceError> {
        Ok(())
    }
    async fn unregister_node(&mut self, _: &NodeInfo) -> Result<(), DeviceError> {
        Ok(())
    }
    async fn start_nodes(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }
    async fn stop_nodes(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }
}

/// Explicit replacement for the process-wide device state: the active device,
/// the adopted nodes and the configuration to apply to them.
pub struct Session<C> {
    control: C,
    device: Option<String>,
    color_node: Option<NodeInfo>,
    depth_node: Option<NodeInfo>,
    color_config: ColorNodeConfig,
    depth_config: DepthNodeConfig,
}

impl<C: NodeControl> Session<C> {
    pub fn new(control: C) -> Self {
        Self::with_configs(control, ColorNodeConfig::default(), DepthNodeConfig::default())
    }

    pub fn with_configs(control: C, color_config: ColorNodeConfig, depth_config: DepthNodeConfig) -> Self {
        Self {
            control,
            device: None,
            color_node: None,
            depth_node: None,
            color_config,
            depth_config,
        }
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    pub fn device_found(&self) -> bool {
        self.device.is_some()
    }

    pub fn color_node(&self) -> Option<&NodeInfo> {
        self.color_node.as_ref()
    }

    pub fn depth_node(&self) -> Option<&NodeInfo> {
        self.depth_node.as_ref()
    }

    /// Starts tracking `device` unless another one is already tracked.
    pub fn on_device_added(&mut self, device: &str) {
        if self.device.is_none() {
            info!(device, "device connected");
            self.device = Some(device.to_string());
        } else {
            debug!(device, "ignoring additional device");
        }
    }

    pub fn on_device_removed(&mut self, device: &str) {
        if self.device.as_deref() == Some(device) {
            self.device = None;
        }
        info!(device, "device disconnected");
    }

    /// Configures `node` if it belongs to the tracked device and no node of
    /// its kind has been adopted yet.
    pub async fn on_node_added(&mut self, node: &NodeInfo) {
        if self.device.as_deref() != Some(node.device.as_str()) {
            debug!(%node, "node from untracked device");
            return;
        }
        match node.kind {
            NodeKind::Depth => self.configure_depth_node(node).await,
            NodeKind::Color => self.configure_color_node(node).await,
        }
    }

    pub fn on_node_removed(&mut self, node: &NodeInfo) {
        let slot = match node.kind {
            NodeKind::Depth => &mut self.depth_node,
            NodeKind::Color => &mut self.color_node,
        };
        if slot.as_ref() == Some(node) {
            *slot = None;
            info!(kind = %node.kind, "{} node disconnected", node.kind);
        }
    }

    pub async fn configure_color_node(&mut self, node: &NodeInfo) {
        if node.kind != NodeKind::Color || self.color_node.is_some() {
            return;
        }
        self.color_node = Some(node.clone());
        let config = NodeConfig::Color(self.color_config);
        self.configure(node, &config).await;
    }

    pub async fn configure_depth_node(&mut self, node: &NodeInfo) {
        if node.kind != NodeKind::Depth || self.depth_node.is_some() {
            return;
        }
        self.depth_node = Some(node.clone());
        let config = NodeConfig::Depth(self.depth_config);
        self.configure(node, &config).await;
    }

    async fn configure(&mut self, node: &NodeInfo, config: &NodeConfig) {
        let applied = async {
            self.control.set_enables(node, StreamEnables::for_kind(node.kind)).await?;
            self.control.request_control(node).await?;
            self.control.set_configuration(node, config).await
        }
        .await;

        match applied {
            Ok(()) => info!(%node, "{} node connected", node.kind),
            Err(e) => warn!(%node, error = %e, "{} node configuration failed", node.kind),
        }

        if let Err(e) = self.control.register_node(node).await {
            warn!(%node, error = %e, "failed to register node");
        }
    }

    pub async fn start(&mut self) {
        if let Err(e) = self.control.start_nodes().await {
            warn!(error = %e, "failed to start nodes");
        }
    }

    /// Stops streaming, then releases whichever nodes are still held.
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.control.stop_nodes().await {
            warn!(error = %e, "failed to stop nodes");
        }
        for node in [self.depth_node.take(), self.color_node.take()].into_iter().flatten() {
            if let Err(e) = self.control.unregister_node(&node).await {
                warn!(%node, error = %e, "failed to unregister node");
            }
        }
    }
}
