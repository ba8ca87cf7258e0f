use clap::Parser;
use std::path::PathBuf;

use crate::fusion::OutOfRangePolicy;
use crate::transport::DEFAULT_PREFIX;

#[derive(Parser, Debug)]
#[command(author, version, about = "Live colored point cloud from a structured-light depth camera")]
pub struct Args {
    /// Record an on-disk log while running live
    #[arg(long, conflicts_with = "play_log")]
    pub start_log: Option<PathBuf>,

    /// Play back a previously recorded log instead of connecting to the camera
    #[arg(long)]
    pub play_log: Option<PathBuf>,

    /// Key expression prefix the camera publishes under
    #[arg(long, default_value = DEFAULT_PREFIX)]
    pub key_prefix: String,

    /// zenoh configuration file
    #[arg(long)]
    pub zenoh_config: Option<PathBuf>,

    /// Keep the last good position of out-of-range pixels instead of moving them to the origin
    #[arg(long)]
    pub retain_position: bool,

    /// Fuse frames without opening a viewer
    #[arg(long)]
    pub headless: bool,
}

impl Args {
    pub fn mode(&self) -> RunMode {
        match (&self.start_log, &self.play_log) {
            (_, Some(p)) => RunMode::Playback(p.clone()),
            (Some(p), None) => RunMode::LiveWithLog(p.clone()),
            (None, None) => RunMode::LiveNoLog,
        }
    }

    pub fn out_of_range_policy(&self) -> OutOfRangePolicy {
        if self.retain_position {
            OutOfRangePolicy::RetainPosition
        } else {
            OutOfRangePolicy::ZeroPosition
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunMode {
    LiveNoLog,
    LiveWithLog(PathBuf),
    Playback(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_live_without_log() {
        let args = Args::try_parse_from(["depthsense-viewer"]).unwrap();
        assert_eq!(args.mode(), RunMode::LiveNoLog);
        assert_eq!(args.key_prefix, "camera");
        assert_eq!(args.out_of_range_policy(), OutOfRangePolicy::ZeroPosition);
    }

    #[test]
    fn log_flags_select_mode() {
        let args = Args::try_parse_from(["depthsense-viewer", "--start-log", "out.log"]).unwrap();
        assert_eq!(args.mode(), RunMode::LiveWithLog("out.log".into()));

        let args = Args::try_parse_from(["depthsense-viewer", "--play-log", "in.log", "--retain-position"]).unwrap();
        assert_eq!(args.mode(), RunMode::Playback("in.log".into()));
        assert_eq!(args.out_of_range_policy(), OutOfRangePolicy::RetainPosition);
    }

    #[test]
    fn start_and_play_are_mutually_exclusive() {
        assert!(Args::try_parse_from(["depthsense-viewer", "--start-log", "a", "--play-log", "b"]).is_err());
    }
}
