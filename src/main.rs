use std::future::Future;
use std::path::Path;

use anyhow::{anyhow, Context};
use clap::Parser;
use tracing::info;

use depthsense_fusion::cli::{Args, RunMode};
use depthsense_fusion::logio::{playback, LogWriter, Pacing};
use depthsense_fusion::render::{LatestCloud, RenderSurface, RerunSurface};
use depthsense_fusion::session::{Detached, Session};
use depthsense_fusion::transport::{KeySpace, NodeTracker, ZenohDevice};
use depthsense_fusion::{Dispatcher, FusionConfig, FusionStage, StopReason};

type Stage = FusionStage<Box<dyn RenderSurface>>;

fn ctrl_c() -> impl Future<Output = ()> {
    async {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn live(args: &Args, stage: Stage, recorder: Option<LogWriter>) -> anyhow::Result<()> {
    let zenoh_config = match &args.zenoh_config {
        Some(path) => zenoh::Config::from_file(path).map_err(|e| anyhow!("invalid zenoh config {}: {e}", path.display()))?,
        None => zenoh::Config::default(),
    };
    let device = ZenohDevice::open(zenoh_config, KeySpace::new(args.key_prefix.as_str())).await?;

    // nodes that were online before we subscribed get configured up front
    let mut tracker = NodeTracker::default();
    let initial: Vec<_> = device
        .discover()
        .await?
        .into_iter()
        .flat_map(|node| tracker.node_alive(node))
        .collect();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let feeds = device.spawn_feeds(tx, tracker).await?;

    let mut dispatcher = Dispatcher::new(Session::new(device), stage);
    if let Some(recorder) = recorder {
        dispatcher = dispatcher.with_recorder(recorder);
    }
    for event in initial {
        dispatcher.handle(event).await;
    }
    dispatcher.session_mut().start().await;

    dispatcher.run(&mut rx, ctrl_c()).await;
    for feed in feeds {
        feed.abort();
    }
    Ok(())
}

async fn play(path: &Path, stage: Stage) -> anyhow::Result<()> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let log = path.to_path_buf();
    let player = tokio::spawn(async move { playback(&log, tx, Pacing::Recorded).await });

    let mut dispatcher = Dispatcher::new(Session::new(Detached), stage);
    match dispatcher.run(&mut rx, ctrl_c()).await {
        StopReason::SourcesClosed => {
            let frames = player.await?.with_context(|| format!("failed to play {}", path.display()))?;
            info!(frames, "playback complete");
        }
        StopReason::ShutdownRequested => player.abort(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG controls the filter, e.g. RUST_LOG=depthsense_fusion=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let args = Args::parse();

    let config = FusionConfig {
        out_of_range: args.out_of_range_policy(),
        ..Default::default()
    };
    let surface: Box<dyn RenderSurface> = if args.headless {
        Box::new(LatestCloud::default())
    } else {
        Box::new(RerunSurface::spawn("depthsense")?)
    };
    let stage = FusionStage::new(surface, config);

    match args.mode() {
        RunMode::Playback(path) => play(&path, stage).await,
        RunMode::LiveNoLog => live(&args, stage, None).await,
        RunMode::LiveWithLog(path) => {
            let recorder = LogWriter::new(&path).with_context(|| format!("failed to create {}", path.display()))?;
            live(&args, stage, Some(recorder)).await
        }
    }
}
