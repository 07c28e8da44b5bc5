//! Play an audio file through the playback core.
//!
//! Run with:
//! ```bash
//! # Render offline as fast as possible and report progress
//! cargo run -p core-playback --example play_file -- song.flac
//!
//! # Play through the default output device, looping 30s..45s
//! cargo run -p core-playback --example play_file --features device-cpal -- song.wav 30 45
//! ```

use bridge_traits::time::LogLevel;
use core_playback::{Player, PlayerNode, SchedulingConfig, Track};
use core_runtime::config::RuntimeConfig;
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Loop iterations rendered offline before the demo stops.
#[cfg(not(feature = "device-cpal"))]
const MAX_OFFLINE_LOOPS: usize = 3;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    let Some(path) = args.get(1) else {
        eprintln!("usage: play_file <file> [start_seconds] [loop_end_seconds]");
        return Ok(());
    };
    let start: f64 = args.get(2).map(|s| s.parse()).transpose()?.unwrap_or(0.0);
    let end: Option<f64> = args.get(3).map(|s| s.parse()).transpose()?;

    let runtime = RuntimeConfig::builder()
        .logging(
            LoggingConfig::default()
                .with_format(LogFormat::Compact)
                .with_level(LogLevel::Debug)
                .with_thread_info(true),
        )
        .build()?;
    init_logging(runtime.logging.clone())?;

    let config = SchedulingConfig::low_latency();
    let node = Arc::new(PlayerNode::new(&config)?);
    let player = Player::with_runtime(node.clone(), &config, &runtime)?;

    let title = Path::new(path)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let track = Arc::new(Track::prepare("demo", title, path, &config)?);
    info!(
        duration = track.duration(),
        native = track.is_natively_supported(),
        "Prepared track"
    );

    player.play(Arc::clone(&track), start, end);

    #[cfg(feature = "device-cpal")]
    {
        let _device = core_playback::CpalDevice::open(Arc::clone(&node))?;
        loop {
            if player.wait_for_events(Duration::from_millis(500)).is_some() {
                break;
            }
            info!(position = player.seek_position(), "Playing");
        }
    }

    #[cfg(not(feature = "device-cpal"))]
    {
        let mut events = player
            .event_bus()
            .map(|bus| bus.subscribe())
            .ok_or("player has no event bus")?;
        let channels = node.format().channels as usize;
        let mut out = vec![0.0f32; 4096 * channels];
        let mut loops = 0;

        loop {
            node.render(&mut out);
            if player.wait_for_events(Duration::from_millis(1)).is_some() {
                break;
            }
            while let Ok(event) = events.try_recv() {
                if matches!(
                    event,
                    core_runtime::events::CoreEvent::Playback(
                        core_runtime::events::PlaybackEvent::LoopRestarted { .. }
                    )
                ) {
                    loops += 1;
                }
            }
            if loops >= MAX_OFFLINE_LOOPS {
                player.stop();
                break;
            }
        }
    }

    info!("Done");
    Ok(())
}
