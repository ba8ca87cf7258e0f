//! zenoh-backed device adapter.
//!
//! Frames arrive on `{prefix}/color` and `{prefix}/depth`. Every stream node
//! holds a liveliness token on `{prefix}/nodes/{device}/{kind}`, and node
//! control goes through `{prefix}/control/...`: puts for fire-and-forget
//! requests, queries where the device has to acknowledge.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use bincode::Encode;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zenoh::sample::SampleKind;

use crate::dispatch::DeviceEvent;
use crate::error::{DeviceError, Result};
use crate::session::{NodeConfig, NodeControl, StreamEnables};
use crate::types::{ColorFrameWire, DepthFrameWire, NodeInfo, NodeKind};

pub const DEFAULT_PREFIX: &str = "camera";
const QUERY_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix: String = prefix.into();
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn color(&self) -> String {
        format!("{}/color", self.prefix)
    }

    pub fn depth(&self) -> String {
        format!("{}/depth", self.prefix)
    }

    pub fn nodes(&self) -> String {
        format!("{}/nodes/**", self.prefix)
    }

    pub fn node(&self, node: &NodeInfo) -> String {
        format!("{}/nodes/{}/{}", self.prefix, node.device, node.kind)
    }

    pub fn node_control(&self, node: &NodeInfo, op: &str) -> String {
        format!("{}/control/{}/{}/{}", self.prefix, node.device, node.kind, op)
    }

    pub fn device_control(&self, device: &str, op: &str) -> String {
        format!("{}/control/{}/{}", self.prefix, device, op)
    }

    /// Inverse of [`KeySpace::node`].
    pub fn parse_node(&self, key: &str) -> Option<NodeInfo> {
        let rest = key.strip_prefix(&self.prefix)?.strip_prefix("/nodes/")?;
        let (device, kind) = rest.split_once('/')?;
        if device.is_empty() {
            return None;
        }
        Some(NodeInfo::new(device, NodeKind::parse(kind)?))
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

/// Turns node liveliness changes into device and node events.
///
/// A device is reported when its first node shows up and reported gone once
/// its last node disappears.
#[derive(Debug, Default)]
pub struct NodeTracker {
    devices: BTreeMap<String, BTreeSet<NodeKind>>,
}

impl NodeTracker {
    pub fn node_alive(&mut self, node: NodeInfo) -> Vec<DeviceEvent> {
        let mut events = Vec::new();
        let kinds = match self.devices.entry(node.device.clone()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                events.push(DeviceEvent::DeviceAdded(node.device.clone()));
                e.insert(BTreeSet::new())
            }
        };
        if kinds.insert(node.kind) {
            events.push(DeviceEvent::NodeAdded(node));
        }
        events
    }

    pub fn node_gone(&mut self, node: NodeInfo) -> Vec<DeviceEvent> {
        let Some(kinds) = self.devices.get_mut(&node.device) else {
            return Vec::new();
        };
        if !kinds.remove(&node.kind) {
            return Vec::new();
        }
        let device_empty = kinds.is_empty();
        let device = node.device.clone();
        let mut events = vec![DeviceEvent::NodeRemoved(node)];
        if device_empty {
            self.devices.remove(&device);
            events.push(DeviceEvent::DeviceRemoved(device));
        }
        events
    }
}

enum QueryFailure {
    NoReply,
    Rejected(String),
    Transport(String),
}

fn encode_body<T: Encode>(value: &T) -> std::result::Result<Vec<u8>, DeviceError> {
    bincode::encode_to_vec(value, bincode::config::standard()).map_err(|e| DeviceError::Transport(e.to_string()))
}

pub struct ZenohDevice {
    session: zenoh::Session,
    keys: KeySpace,
    registered: BTreeSet<String>,
}

impl ZenohDevice {
    pub async fn open(config: zenoh::Config, keys: KeySpace) -> Result<Self> {
        let session = zenoh::open(config).await?;
        info!(prefix = %keys.prefix, "zenoh session opened");
        Ok(Self {
            session,
            keys,
            registered: BTreeSet::new(),
        })
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    /// Lists the nodes that are already online.
    pub async fn discover(&self) -> Result<Vec<NodeInfo>> {
        let replies = self
            .session
            .liveliness()
            .get(self.keys.nodes())
            .timeout(QUERY_TIMEOUT)
            .await?;

        let mut nodes = Vec::new();
        while let Ok(reply) = replies.recv_async().await {
            match reply.result() {
                Ok(sample) => match self.keys.parse_node(sample.key_expr().as_str()) {
                    Some(node) => nodes.push(node),
                    None => debug!(key = %sample.key_expr(), "ignoring unrecognised node token"),
                },
                Err(e) => debug!(error = ?e, "liveliness query error"),
            }
        }
        info!("found {} nodes", nodes.len());
        Ok(nodes)
    }

    /// Forwards frames and node changes into `tx` from background tasks.
    pub async fn spawn_feeds(&self, tx: UnboundedSender<DeviceEvent>, mut tracker: NodeTracker) -> Result<Vec<JoinHandle<()>>> {
        let color_subscriber = self.session.declare_subscriber(self.keys.color()).await?;
        let depth_subscriber = self.session.declare_subscriber(self.keys.depth()).await?;
        let node_subscriber = self.session.liveliness().declare_subscriber(self.keys.nodes()).await?;

        let color_tx = tx.clone();
        let color_task = tokio::spawn(async move {
            info!("color subscriber started");
            while let Ok(sample) = color_subscriber.recv_async().await {
                let payload = sample.payload().to_bytes();
                match ColorFrameWire::decode_and_decompress(&payload).and_then(ColorFrameWire::into_raw_frame) {
                    Ok(frame) => {
                        if color_tx.send(DeviceEvent::Color(frame)).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "undecodable color frame"),
                }
            }
            info!("color subscriber stopped");
        });

        let depth_tx = tx.clone();
        let depth_task = tokio::spawn(async move {
            info!("depth subscriber started");
            while let Ok(sample) = depth_subscriber.recv_async().await {
                let payload = sample.payload().to_bytes();
                match DepthFrameWire::decode_and_decompress(&payload).and_then(DepthFrameWire::into_depth_frame) {
                    Ok(frame) => {
                        if depth_tx.send(DeviceEvent::Depth(frame)).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "undecodable depth frame"),
                }
            }
            info!("depth subscriber stopped");
        });

        let keys = self.keys.clone();
        let node_task = tokio::spawn(async move {
            while let Ok(sample) = node_subscriber.recv_async().await {
                let Some(node) = keys.parse_node(sample.key_expr().as_str()) else {
                    debug!(key = %sample.key_expr(), "ignoring unrecognised node token");
                    continue;
                };
                let events = match sample.kind() {
                    SampleKind::Put => tracker.node_alive(node),
                    SampleKind::Delete => tracker.node_gone(node),
                };
                for event in events {
                    if tx.send(event).is_err() {
                        return;
                    }
                }
            }
        });

        Ok(vec![color_task, depth_task, node_task])
    }

    async fn put(&self, key: String, body: Vec<u8>) -> std::result::Result<(), DeviceError> {
        debug!(%key, "control put");
        self.session
            .put(key, body)
            .await
            .map_err(|e| DeviceError::Transport(e.to_string()))
    }

    /// Sends a request the device has to acknowledge.
    async fn query(&self, key: String, body: Vec<u8>) -> std::result::Result<(), QueryFailure> {
        debug!(%key, "control query");
        let replies = self
            .session
            .get(key)
            .payload(body)
            .timeout(QUERY_TIMEOUT)
            .await
            .map_err(|e| QueryFailure::Transport(e.to_string()))?;

        match replies.recv_async().await {
            Ok(reply) => match reply.result() {
                Ok(_) => Ok(()),
                Err(err) => Err(QueryFailure::Rejected(
                    String::from_utf8_lossy(&err.payload().to_bytes()).into_owned(),
                )),
            },
            Err(_) => Err(QueryFailure::NoReply),
        }
    }
}

impl NodeControl for ZenohDevice {
    async fn set_enables(&mut self, node: &NodeInfo, enables: StreamEnables) -> std::result::Result<(), DeviceError> {
        let body = encode_body(&enables)?;
        self.put(self.keys.node_control(node, "enable"), body).await
    }

    async fn request_control(&mut self, node: &NodeInfo) -> std::result::Result<(), DeviceError> {
        let kind = node.kind.to_string();
        match self.query(self.keys.node_control(node, "acquire"), Vec::new()).await {
            Ok(()) => Ok(()),
            Err(QueryFailure::NoReply) => Err(DeviceError::NodeUnavailable(kind)),
            Err(QueryFailure::Rejected(reason)) => {
                debug!(%node, %reason, "control refused");
                Err(DeviceError::ControlRefused(kind))
            }
            Err(QueryFailure::Transport(e)) => Err(DeviceError::Transport(e)),
        }
    }

    async fn set_configuration(&mut self, node: &NodeInfo, config: &NodeConfig) -> std::result::Result<(), DeviceError> {
        let body = encode_body(config)?;
        let kind = node.kind.to_string();
        match self.query(self.keys.node_control(node, "config"), body).await {
            Ok(()) => Ok(()),
            Err(QueryFailure::NoReply) => Err(DeviceError::NodeUnavailable(kind)),
            Err(QueryFailure::Rejected(reason)) => Err(DeviceError::InvalidConfiguration(kind, reason)),
            Err(QueryFailure::Transport(e)) => Err(DeviceError::Transport(e)),
        }
    }

    async fn register_node(&mut self, node: &NodeInfo) -> std::result::Result<(), DeviceError> {
        self.put(self.keys.node_control(node, "register"), Vec::new()).await?;
        self.registered.insert(node.device.clone());
        Ok(())
    }

    async fn unregister_node(&mut self, node: &NodeInfo) -> std::result::Result<(), DeviceError> {
        self.put(self.keys.node_control(node, "release"), Vec::new()).await
    }

    async fn start_nodes(&mut self) -> std::result::Result<(), DeviceError> {
        for device in &self.registered {
            self.put(self.keys.device_control(device, "start"), Vec::new()).await?;
        }
        Ok(())
    }

    async fn stop_nodes(&mut self) -> std::result::Result<(), DeviceError> {
        for device in &self.registered {
            self.put(self.keys.device_control(device, "stop"), Vec::new()).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_keys_round_trip() {
        let keys = KeySpace::new("camera/");
        let node = NodeInfo::new("ds325-0", NodeKind::Depth);
        assert_eq!(keys.node(&node), "camera/nodes/ds325-0/depth");
        assert_eq!(keys.parse_node(&keys.node(&node)), Some(node));
    }

    #[test]
    fn foreign_keys_are_not_nodes() {
        let keys = KeySpace::default();
        assert_eq!(keys.parse_node("camera/nodes/ds325/audio"), None);
        assert_eq!(keys.parse_node("camera/nodes//depth"), None);
        assert_eq!(keys.parse_node("camera/nodes/ds325/depth/extra"), None);
        assert_eq!(keys.parse_node("other/nodes/ds325/depth"), None);
        assert_eq!(keys.parse_node("camera/color"), None);
    }

    #[test]
    fn control_keys() {
        let keys = KeySpace::default();
        let node = NodeInfo::new("ds325", NodeKind::Color);
        assert_eq!(keys.node_control(&node, "acquire"), "camera/control/ds325/color/acquire");
        assert_eq!(keys.device_control("ds325", "start"), "camera/control/ds325/start");
        assert_eq!(keys.color(), "camera/color");
        assert_eq!(keys.depth(), "camera/depth");
    }

    #[test]
    fn first_node_announces_device() {
        let mut tracker = NodeTracker::default();
        let depth = NodeInfo::new("ds325", NodeKind::Depth);
        let events = tracker.node_alive(depth.clone());
        assert!(matches!(&events[..], [DeviceEvent::DeviceAdded(d), DeviceEvent::NodeAdded(n)] if d == "ds325" && n == &depth));

        let color = NodeInfo::new("ds325", NodeKind::Color);
        let events = tracker.node_alive(color.clone());
        assert!(matches!(&events[..], [DeviceEvent::NodeAdded(n)] if n == &color));

        assert!(tracker.node_alive(color).is_empty());
    }

    #[test]
    fn last_node_gone_removes_device() {
        let mut tracker = NodeTracker::default();
        let depth = NodeInfo::new("ds325", NodeKind::Depth);
        let color = NodeInfo::new("ds325", NodeKind::Color);
        tracker.node_alive(depth.clone());
        tracker.node_alive(color.clone());

        let events = tracker.node_gone(depth.clone());
        assert!(matches!(&events[..], [DeviceEvent::NodeRemoved(n)] if n == &depth));
        assert!(tracker.node_gone(depth).is_empty());

        let events = tracker.node_gone(color.clone());
        assert!(matches!(&events[..], [DeviceEvent::NodeRemoved(n), DeviceEvent::DeviceRemoved(d)] if n == &color && d == "ds325"));
    }
}
