use std::{fs::File, io::Write, path::Path};

use byteorder::{LittleEndian, WriteBytesExt};

use crate::dispatch::DeviceEvent;
use crate::error::Result;
use crate::types::{ColorFrameWire, DepthFrameWire};

pub(crate) const KIND_DEPTH: u8 = 0;
pub(crate) const KIND_COLOR: u8 = 1;

/// Appends color and depth frames to a log file.
///
/// Each record is `kind: u8`, `timestamp: f64`, `len: u32` (little endian)
/// followed by the compressed wire encoding of the frame.
pub struct LogWriter(std::io::BufWriter<File>);

impl LogWriter {
    pub fn new(path: &Path) -> std::io::Result<Self> {
        Ok(Self(std::io::BufWriter::new(File::create(path)?)))
    }

    /// Writes frame events; device and node events are not recorded.
    pub fn write(&mut self, event: &DeviceEvent) -> Result<()> {
        let (kind, ts, payload) = match event {
            DeviceEvent::Depth(d) => (KIND_DEPTH, d.timestamp, DepthFrameWire::from_frame(d).encode_and_compress()?),
            DeviceEvent::Color(c) => (KIND_COLOR, c.timestamp, ColorFrameWire::from_raw(c).encode_and_compress()?),
            _ => return Ok(()),
        };
        self.0.write_u8(kind)?;
        self.0.write_f64::<LittleEndian>(ts)?;
        self.0.write_u32::<LittleEndian>(payload.len() as u32)?;
        self.0.write_all(&payload)?;
        Ok(())
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.0.flush()
    }
}
