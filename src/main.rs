use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ai_stream_client::config::{resolve_config, ConfigOverrides};
use ai_stream_client::events::EventBus;
use ai_stream_client::stream::MediaSendLoop;
use ai_stream_client::video::{
    AnnexBDecoder, EncoderAdapter, EncoderConfig, FfmpegEncoder, SolidColorSource,
};
use ai_stream_client::webrtc::{
    HttpSignalingClient, InboundFrameSink, PipelineDescriptor, RtcPeer, RtpPacketSender, Session,
};

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// ai-stream-client command line arguments
#[derive(Parser, Debug)]
#[command(name = "ai-stream-client")]
#[command(version, about = "Stream H.264 video to a remote AI pipeline over WebRTC", long_about = None)]
struct CliArgs {
    /// JSON configuration file
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Signaling offer URL (overrides config)
    #[arg(short = 's', long, value_name = "URL")]
    signaling_url: Option<String>,

    /// STUN server URL (overrides config)
    #[arg(long, value_name = "URL")]
    stun: Option<String>,

    /// Frame width (overrides config)
    #[arg(long, value_name = "PIXELS")]
    width: Option<u32>,

    /// Frame height (overrides config)
    #[arg(long, value_name = "PIXELS")]
    height: Option<u32>,

    /// Frame rate (overrides config)
    #[arg(long, value_name = "FPS")]
    fps: Option<u32>,

    /// Pipeline descriptor JSON sent with the offer (overrides config)
    #[arg(short = 'p', long, value_name = "FILE")]
    prompt: Option<PathBuf>,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_level, args.verbose);

    tracing::info!("Starting ai-stream-client v{}", env!("CARGO_PKG_VERSION"));

    let overrides = ConfigOverrides {
        signaling_url: args.signaling_url,
        stun_server: args.stun,
        width: args.width,
        height: args.height,
        fps: args.fps,
        prompt_path: args.prompt,
    };
    let config = resolve_config(args.config.as_deref(), &overrides).await?;

    let prompt = match &config.prompt_path {
        Some(path) => PipelineDescriptor::from_file(path).await?,
        None => PipelineDescriptor::default_passthrough(),
    };

    // Encoder must be usable before anything is negotiated
    FfmpegEncoder::probe(&config.video.ffmpeg_path).await?;

    let events = Arc::new(EventBus::new());
    spawn_event_logger(&events);

    let peer = Arc::new(RtcPeer::new(&config.webrtc, &config.track).await?);
    let signaling = Arc::new(HttpSignalingClient::new(&config.signaling)?);
    let session = Session::new(peer.clone(), signaling, prompt, events.clone());

    let inbound = InboundFrameSink::new(Box::new(AnnexBDecoder::new()));
    peer.attach(&session, inbound.clone());

    let resolution = config.video.resolution();
    let encoder_config = EncoderConfig::h264(
        resolution,
        config.video.bitrate_kbps,
        config.video.fps,
        config.video.gop_size,
    );
    let encoder = EncoderAdapter::new(
        Box::new(FfmpegEncoder::new(
            encoder_config,
            config.video.ffmpeg_path.clone(),
        )),
        config.video.min_unit_size,
    );
    let sink = Arc::new(RtpPacketSender::new(peer.local_track(), &config.track));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let send_loop = MediaSendLoop::new(
        session.clone(),
        Box::new(SolidColorSource::green(resolution)),
        encoder,
        sink,
        config.video.max_packet_size,
        config.video.frame_interval(),
    );
    let loop_handle = tokio::spawn(send_loop.run(shutdown_tx.subscribe()));

    tracing::info!(
        "Negotiating session {} with {}",
        session.session_id(),
        config.signaling.url
    );
    if let Err(e) = session.start().await {
        tracing::error!("Failed to start session: {}", e);
    }

    let mut state_rx = session.state_watch();
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown signal received");
        }
        _ = state_rx.wait_for(|state| state.is_terminal()) => {
            tracing::warn!("Session ended: {}", session.connection_state());
        }
    }

    let _ = shutdown_tx.send(());
    if let Err(e) = session.close().await {
        tracing::warn!("Failed to close session: {}", e);
    }

    let stats = loop_handle.await?;
    let inbound_stats = inbound.stats();
    tracing::info!(
        "Sent {} packets ({} bytes), {} units dropped, {} encode failures; received {} frames",
        stats.packets_sent,
        stats.bytes_sent,
        stats.units_dropped,
        stats.encode_failures,
        inbound_stats.frames
    );

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Log every session event
fn spawn_event_logger(events: &Arc<EventBus>) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => tracing::info!(event = event.event_name(), "{}", json),
                    Err(_) => tracing::info!(event = event.event_name(), "{:?}", event),
                },
                Err(RecvError::Lagged(n)) => tracing::warn!("Event logger lagged by {} events", n),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Initialize logging with tracing
fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "ai_stream_client=error,webrtc=error",
        LogLevel::Warn => "ai_stream_client=warn,webrtc=warn",
        LogLevel::Info => "ai_stream_client=info,webrtc=warn",
        LogLevel::Verbose => "ai_stream_client=debug,webrtc=warn",
        LogLevel::Debug => "ai_stream_client=debug,webrtc=info",
        LogLevel::Trace => "ai_stream_client=trace,webrtc=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}
