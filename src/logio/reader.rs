use std::{
    fs::File,
    io::{ErrorKind, Read},
    path::Path,
};

use byteorder::{LittleEndian, ReadBytesExt};
use tokio::{sync::mpsc::UnboundedSender, time::sleep};
use tracing::{info, warn};

use super::writer::{KIND_COLOR, KIND_DEPTH};
use crate::dispatch::DeviceEvent;
use crate::error::{Error, Result};
use crate::types::{ColorFrameWire, DepthFrameWire};

/// Largest payload a record may claim. Real frames are a few MiB at most.
pub(crate) const MAX_RECORD_LEN: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Sleep for the recorded gap between consecutive frames.
    Recorded,
    Unpaced,
}

fn decode(kind: u8, buf: &[u8]) -> Result<DeviceEvent> {
    match kind {
        KIND_DEPTH => Ok(DeviceEvent::Depth(
            DepthFrameWire::decode_and_decompress(buf)?.into_depth_frame()?,
        )),
        KIND_COLOR => Ok(DeviceEvent::Color(
            ColorFrameWire::decode_and_decompress(buf)?.into_raw_frame()?,
        )),
        other => Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unknown record kind {other}"),
        ))),
    }
}

/// Replays a recorded log into `tx`. Returns the number of frames sent.
///
/// Records that fail to decode are skipped. Playback stops early when the
/// receiving side goes away.
pub async fn playback(path: &Path, tx: UnboundedSender<DeviceEvent>, pacing: Pacing) -> Result<usize> {
    let mut f = std::io::BufReader::new(File::open(path)?);
    let mut last_ts = None;
    let mut sent = 0;

    loop {
        let kind = match f.read_u8() {
            Ok(k) => k,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };
        let ts = f.read_f64::<LittleEndian>()?;
        let len = f.read_u32::<LittleEndian>()? as usize;
        if len > MAX_RECORD_LEN {
            warn!(kind, ts, len, "skipping oversized record");
            f.seek_relative(len as i64)?;
            continue;
        }
        let mut buf = vec![0u8; len];
        f.read_exact(&mut buf)?;

        if pacing == Pacing::Recorded {
            if let Some(prev) = last_ts {
                let dt: f64 = ts - prev;
                if dt > 0.0 {
                    sleep(tokio::time::Duration::from_secs_f64(dt)).await;
                }
            }
        }
        last_ts = Some(ts);

        let event = match decode(kind, &buf) {
            Ok(event) => event,
            Err(e) => {
                warn!(kind, ts, error = %e, "skipping unreadable record");
                continue;
            }
        };
        if tx.send(event).is_err() {
            break;
        }
        sent += 1;
    }

    info!(frames = sent, path = %path.display(), "playback finished");
    Ok(sent)
}
