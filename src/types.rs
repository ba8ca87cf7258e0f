use std::fmt;
use std::ops::Index;

use bincode::{Decode, Encode};
use bytemuck::{Pod, Zeroable};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use snap::raw::{Decoder, Encoder};

use crate::error::{Error, Result};

pub const COLOR_WIDTH: usize = 640;
pub const COLOR_HEIGHT: usize = 480;
/// 640x480
pub const COLOR_PIXEL_COUNT: usize = COLOR_WIDTH * COLOR_HEIGHT;

pub const DEPTH_WIDTH: usize = 320;
pub const DEPTH_HEIGHT: usize = 240;
/// 320x240
pub const DEPTH_PIXEL_COUNT: usize = DEPTH_WIDTH * DEPTH_HEIGHT;

const ZSTD_LEVEL: i32 = 3;

/// Byte order of the three channels in a packed color buffer.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum ChannelOrder {
    Rgb,
    /// Native order of the camera's color node.
    Bgr,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Rgb8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb8 {
    pub const BLACK: Rgb8 = Rgb8::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Bgr8 {
    pub b: u8,
    pub g: u8,
    pub r: u8,
}

impl From<Bgr8> for Rgb8 {
    fn from(px: Bgr8) -> Self {
        Rgb8::new(px.r, px.g, px.b)
    }
}

/// A color image as it arrives from a feed, before channel normalization.
#[derive(Debug, Clone)]
pub struct RawColorFrame {
    pub width: usize,
    pub height: usize,
    pub timestamp: f64,
    pub order: ChannelOrder,
    pub data: Vec<u8>,
}

/// The most recent color image, always 640x480 and always R,G,B.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorFrame {
    pixels: Vec<Rgb8>,
}

impl ColorFrame {
    /// An all-black frame, used until the first color frame arrives.
    pub fn new() -> Self {
        Self {
            pixels: vec![Rgb8::BLACK; COLOR_PIXEL_COUNT],
        }
    }

    pub fn pixels(&self) -> &[Rgb8] {
        &self.pixels
    }

    pub fn pixel(&self, index: usize) -> Option<Rgb8> {
        self.pixels.get(index).copied()
    }

    /// Overwrites the whole buffer with `raw`, converting to R,G,B.
    ///
    /// The frame must be exactly 640x480 with three bytes per pixel; anything
    /// else is rejected and the buffer keeps its previous content.
    pub fn overwrite_from(&mut self, raw: &RawColorFrame) -> Result<()> {
        if raw.width != COLOR_WIDTH || raw.height != COLOR_HEIGHT {
            return Err(Error::FrameSize {
                what: "color frame pixels",
                expected: COLOR_PIXEL_COUNT,
                actual: raw.width * raw.height,
            });
        }
        if raw.data.len() != 3 * COLOR_PIXEL_COUNT {
            return Err(Error::FrameSize {
                what: "color frame bytes",
                expected: 3 * COLOR_PIXEL_COUNT,
                actual: raw.data.len(),
            });
        }

        match raw.order {
            ChannelOrder::Rgb => {
                self.pixels
                    .copy_from_slice(bytemuck::cast_slice::<u8, Rgb8>(&raw.data));
            }
            ChannelOrder::Bgr => {
                let src = bytemuck::cast_slice::<u8, Bgr8>(&raw.data);
                for (dst, px) in self.pixels.iter_mut().zip(src) {
                    *dst = Rgb8::from(*px);
                }
            }
        }
        Ok(())
    }
}

impl Default for ColorFrame {
    fn default() -> Self {
        Self::new()
    }
}

/// Camera-space vertex as reported by the depth node.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct Vertex {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl Vertex {
    pub const fn new(x: i16, y: i16, z: i16) -> Self {
        Self { x, y, z }
    }

    pub fn to_point(self) -> Point3<f32> {
        Point3::new(self.x as f32, self.y as f32, self.z as f32)
    }
}

/// Normalized coordinate into the VGA color image.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Encode, Decode)]
pub struct Uv {
    pub u: f32,
    pub v: f32,
}

impl Uv {
    pub const fn new(u: f32, v: f32) -> Self {
        Self { u, v }
    }
}

/// One QVGA depth frame: a vertex and a UV coordinate per grid slot.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthFrame {
    pub timestamp: f64,
    vertices: Vec<Vertex>,
    uv_map: Vec<Uv>,
}

impl DepthFrame {
    pub fn new(timestamp: f64, vertices: Vec<Vertex>, uv_map: Vec<Uv>) -> Result<Self> {
        if vertices.len() != DEPTH_PIXEL_COUNT {
            return Err(Error::FrameSize {
                what: "depth vertices",
                expected: DEPTH_PIXEL_COUNT,
                actual: vertices.len(),
            });
        }
        if uv_map.len() != DEPTH_PIXEL_COUNT {
            return Err(Error::FrameSize {
                what: "depth uv map",
                expected: DEPTH_PIXEL_COUNT,
                actual: uv_map.len(),
            });
        }
        Ok(Self {
            timestamp,
            vertices,
            uv_map,
        })
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn uv_map(&self) -> &[Uv] {
        &self.uv_map
    }

    /// Iterates `(vertex, uv)` pairs in grid order.
    pub fn samples(&self) -> impl Iterator<Item = (Vertex, Uv)> + '_ {
        self.vertices.iter().copied().zip(self.uv_map.iter().copied())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositedPoint {
    pub position: Point3<f32>,
    pub color: Rgb8,
}

impl Default for CompositedPoint {
    fn default() -> Self {
        Self {
            position: Point3::origin(),
            color: Rgb8::BLACK,
        }
    }
}

/// Fixed-size cloud with one slot per depth pixel.
///
/// Slots are overwritten in place on every depth frame; the length never
/// changes after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    points: Vec<CompositedPoint>,
}

impl PointCloud {
    pub fn new() -> Self {
        Self {
            points: vec![CompositedPoint::default(); DEPTH_PIXEL_COUNT],
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[CompositedPoint] {
        &self.points
    }

    pub(crate) fn points_mut(&mut self) -> &mut [CompositedPoint] {
        &mut self.points
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CompositedPoint> {
        self.points.iter()
    }
}

impl Default for PointCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<usize> for PointCloud {
    type Output = CompositedPoint;

    fn index(&self, index: usize) -> &Self::Output {
        &self.points[index]
    }
}

impl<'a> IntoIterator for &'a PointCloud {
    type Item = &'a CompositedPoint;
    type IntoIter = std::slice::Iter<'a, CompositedPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode)]
pub enum NodeKind {
    Color,
    Depth,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Color => "color",
            NodeKind::Depth => "depth",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "color" => Some(NodeKind::Color),
            "depth" => Some(NodeKind::Depth),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stream node on a particular device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeInfo {
    pub device: String,
    pub kind: NodeKind,
}

impl NodeInfo {
    pub fn new(device: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            device: device.into(),
            kind,
        }
    }
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device, self.kind)
    }
}

/// Payload encoding of a color frame on the wire.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum ColorEncoding {
    Bgr8,
    Rgb8,
    /// MJPEG stream, one JPEG image per frame.
    Jpeg,
}

#[derive(Serialize, Deserialize, Debug, Clone, Encode, Decode)]
pub struct ColorFrameWire {
    pub width: u32,
    pub height: u32,
    pub timestamp: f64,
    pub encoding: ColorEncoding,
    pub data: Vec<u8>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Encode, Decode)]
pub struct DepthFrameWire {
    pub width: u32,
    pub height: u32,
    pub timestamp: f64,
    pub vertices: Vec<Vertex>,
    pub uv_map: Vec<Uv>,
}

impl ColorFrameWire {
    pub fn from_raw(frame: &RawColorFrame) -> Self {
        Self {
            width: frame.width as u32,
            height: frame.height as u32,
            timestamp: frame.timestamp,
            encoding: match frame.order {
                ChannelOrder::Rgb => ColorEncoding::Rgb8,
                ChannelOrder::Bgr => ColorEncoding::Bgr8,
            },
            data: frame.data.clone(),
        }
    }

    pub fn encode_and_compress(&self) -> Result<Vec<u8>> {
        let encoded = bincode::encode_to_vec(self, bincode::config::standard())?;
        let mut encoder = Encoder::new();
        Ok(encoder.compress_vec(&encoded)?)
    }

    pub fn decode_and_decompress(encoded: &[u8]) -> Result<Self> {
        let mut decoder = Decoder::new();
        let decompressed = decoder.decompress_vec(encoded)?;
        let (decoded, _) = bincode::decode_from_slice(&decompressed, bincode::config::standard())?;
        Ok(decoded)
    }

    /// Unpacks the payload, decompressing JPEG frames to RGB.
    pub fn into_raw_frame(self) -> Result<RawColorFrame> {
        let (order, data, width, height) = match self.encoding {
            ColorEncoding::Bgr8 => (ChannelOrder::Bgr, self.data, self.width as usize, self.height as usize),
            ColorEncoding::Rgb8 => (ChannelOrder::Rgb, self.data, self.width as usize, self.height as usize),
            ColorEncoding::Jpeg => {
                let img = turbojpeg::decompress_image::<turbojpeg::image::Rgb<u8>>(&self.data)?;
                let (w, h) = img.dimensions();
                (ChannelOrder::Rgb, img.into_raw(), w as usize, h as usize)
            }
        };
        Ok(RawColorFrame {
            width,
            height,
            timestamp: self.timestamp,
            order,
            data,
        })
    }
}

impl DepthFrameWire {
    pub fn from_frame(frame: &DepthFrame) -> Self {
        Self {
            width: DEPTH_WIDTH as u32,
            height: DEPTH_HEIGHT as u32,
            timestamp: frame.timestamp,
            vertices: frame.vertices.clone(),
            uv_map: frame.uv_map.clone(),
        }
    }

    pub fn encode_and_compress(&self) -> Result<Vec<u8>> {
        let encoded = bincode::encode_to_vec(self, bincode::config::standard())?;
        zstd::encode_all(&encoded[..], ZSTD_LEVEL).map_err(|e| Error::Compression(e.to_string()))
    }

    pub fn decode_and_decompress(encoded: &[u8]) -> Result<Self> {
        let decompressed = zstd::decode_all(encoded).map_err(|e| Error::Compression(e.to_string()))?;
        let (decoded, _) = bincode::decode_from_slice(&decompressed, bincode::config::standard())?;
        Ok(decoded)
    }

    pub fn into_depth_frame(self) -> Result<DepthFrame> {
        if self.width as usize != DEPTH_WIDTH || self.height as usize != DEPTH_HEIGHT {
            return Err(Error::FrameSize {
                what: "depth grid",
                expected: DEPTH_PIXEL_COUNT,
                actual: self.width as usize * self.height as usize,
            });
        }
        DepthFrame::new(self.timestamp, self.vertices, self.uv_map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bgr_frame(fill: [u8; 3]) -> RawColorFrame {
        RawColorFrame {
            width: COLOR_WIDTH,
            height: COLOR_HEIGHT,
            timestamp: 1.5,
            order: ChannelOrder::Bgr,
            data: fill.repeat(COLOR_PIXEL_COUNT),
        }
    }

    #[test]
    fn bgr_frames_are_normalized_to_rgb() {
        let mut frame = ColorFrame::new();
        frame.overwrite_from(&bgr_frame([30, 20, 10])).unwrap();
        assert_eq!(frame.pixel(0), Some(Rgb8::new(10, 20, 30)));
        assert_eq!(frame.pixel(COLOR_PIXEL_COUNT - 1), Some(Rgb8::new(10, 20, 30)));
        assert_eq!(frame.pixel(COLOR_PIXEL_COUNT), None);
    }

    #[test]
    fn rgb_frames_are_copied_as_is() {
        let mut raw = bgr_frame([1, 2, 3]);
        raw.order = ChannelOrder::Rgb;
        let mut frame = ColorFrame::new();
        frame.overwrite_from(&raw).unwrap();
        assert!(frame.pixels().iter().all(|px| *px == Rgb8::new(1, 2, 3)));
    }

    #[test]
    fn short_color_frame_leaves_buffer_untouched() {
        let mut frame = ColorFrame::new();
        frame.overwrite_from(&bgr_frame([9, 9, 9])).unwrap();

        let mut short = bgr_frame([1, 1, 1]);
        short.data.truncate(100);
        let err = frame.overwrite_from(&short).unwrap_err();
        assert!(matches!(err, Error::FrameSize { actual: 100, .. }));
        assert_eq!(frame.pixel(0), Some(Rgb8::new(9, 9, 9)));
    }

    #[test]
    fn color_frame_with_wrong_resolution_is_rejected() {
        let raw = RawColorFrame {
            width: 320,
            height: 240,
            timestamp: 0.0,
            order: ChannelOrder::Rgb,
            data: vec![0; 320 * 240 * 3],
        };
        assert!(ColorFrame::new().overwrite_from(&raw).is_err());
    }

    #[test]
    fn depth_frame_requires_full_grid() {
        let err = DepthFrame::new(0.0, vec![Vertex::default(); 10], vec![Uv::default(); DEPTH_PIXEL_COUNT])
            .unwrap_err();
        assert!(matches!(err, Error::FrameSize { what: "depth vertices", actual: 10, .. }));

        let err = DepthFrame::new(0.0, vec![Vertex::default(); DEPTH_PIXEL_COUNT], Vec::new()).unwrap_err();
        assert!(matches!(err, Error::FrameSize { what: "depth uv map", actual: 0, .. }));
    }

    #[test]
    fn point_cloud_has_one_slot_per_depth_pixel() {
        let cloud = PointCloud::new();
        assert_eq!(cloud.len(), 76_800);
        assert_eq!(cloud[0], CompositedPoint::default());
    }

    #[test]
    fn color_wire_keeps_native_channel_order() {
        let raw = bgr_frame([30, 20, 10]);
        let bytes = ColorFrameWire::from_raw(&raw).encode_and_compress().unwrap();
        let back = ColorFrameWire::decode_and_decompress(&bytes)
            .unwrap()
            .into_raw_frame()
            .unwrap();
        assert_eq!(back.order, ChannelOrder::Bgr);
        assert_eq!(back.timestamp, 1.5);
        assert_eq!(back.data, raw.data);
    }

    #[test]
    fn jpeg_color_frames_decode_to_rgb() {
        let img = turbojpeg::image::RgbImage::from_pixel(
            COLOR_WIDTH as u32,
            COLOR_HEIGHT as u32,
            turbojpeg::image::Rgb([200, 100, 50]),
        );
        let jpeg = turbojpeg::compress_image(&img, 95, turbojpeg::Subsamp::None).unwrap();
        let wire = ColorFrameWire {
            width: COLOR_WIDTH as u32,
            height: COLOR_HEIGHT as u32,
            timestamp: 3.0,
            encoding: ColorEncoding::Jpeg,
            data: jpeg.to_vec(),
        };
        let bytes = wire.encode_and_compress().unwrap();
        let raw = ColorFrameWire::decode_and_decompress(&bytes)
            .unwrap()
            .into_raw_frame()
            .unwrap();
        assert_eq!(raw.order, ChannelOrder::Rgb);
        assert_eq!((raw.width, raw.height), (COLOR_WIDTH, COLOR_HEIGHT));
        assert_eq!(raw.data.len(), 3 * COLOR_PIXEL_COUNT);
        assert_eq!(raw.timestamp, 3.0);

        let mut frame = ColorFrame::new();
        frame.overwrite_from(&raw).unwrap();
        let px = frame.pixel(COLOR_PIXEL_COUNT / 2).unwrap();
        // lossy, but the channels must not come out swapped
        assert!(px.r.abs_diff(200) <= 4, "{px:?}");
        assert!(px.g.abs_diff(100) <= 4, "{px:?}");
        assert!(px.b.abs_diff(50) <= 4, "{px:?}");
    }

    #[test]
    fn corrupt_jpeg_is_a_jpeg_error() {
        let wire = ColorFrameWire {
            width: COLOR_WIDTH as u32,
            height: COLOR_HEIGHT as u32,
            timestamp: 0.0,
            encoding: ColorEncoding::Jpeg,
            data: b"definitely not a jpeg".to_vec(),
        };
        assert!(matches!(wire.into_raw_frame(), Err(Error::Jpeg(_))));
    }

    #[test]
    fn corrupt_wire_payloads_are_errors() {
        assert!(ColorFrameWire::decode_and_decompress(b"not snappy").is_err());
        assert!(DepthFrameWire::decode_and_decompress(b"not zstd").is_err());
    }

    #[test]
    fn depth_wire_with_wrong_grid_is_rejected() {
        let wire = DepthFrameWire {
            width: 640,
            height: 480,
            timestamp: 0.0,
            vertices: Vec::new(),
            uv_map: Vec::new(),
        };
        assert!(matches!(wire.into_depth_frame(), Err(Error::FrameSize { what: "depth grid", .. })));
    }

    #[test]
    fn node_kind_parses_its_own_name() {
        for kind in [NodeKind::Color, NodeKind::Depth] {
            assert_eq!(NodeKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(NodeKind::parse("audio"), None);
    }
}
