//! quadmap - headless projection-mapping renderer
//!
//! Loads media onto quad surfaces (from a preset and/or the command line),
//! composes the canvas at the configured rate and hands every frame to the
//! output sink until interrupted or a frame limit is reached.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use quadmap::config::Config;
use quadmap::media::FileMediaLoader;
use quadmap::output::FrameSink;
use quadmap::Engine;

/// Interval between frame-rate reports
const STATS_INTERVAL: Duration = Duration::from_secs(10);

/// quadmap - map images, loops and cameras onto quadrilateral surfaces
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Media files, frame directories or /dev/video* devices to add
    media: Vec<PathBuf>,

    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Preset to load before adding media
    #[arg(short, long)]
    preset: Option<PathBuf>,

    /// Stop after this many frames
    #[arg(short, long)]
    frames: Option<u64>,

    /// Write composed frames as PNG files into this directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Only write every Nth frame
    #[arg(long)]
    every: Option<u64>,

    /// Save the final state to this preset on exit
    #[arg(short, long)]
    save_preset: Option<PathBuf>,

    /// Canvas width
    #[arg(long)]
    width: Option<u32>,

    /// Canvas height
    #[arg(long)]
    height: Option<u32>,

    /// Scale media into the quad bounds instead of perspective warping
    #[arg(long)]
    no_live_warp: bool,

    /// Hide quad outlines and corner handles
    #[arg(long)]
    no_mesh: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(width) = self.width {
            config.canvas.width = width;
        }
        if let Some(height) = self.height {
            config.canvas.height = height;
        }
        if self.no_live_warp {
            config.render.live_warp = false;
        }
        if self.no_mesh {
            config.render.show_mesh = false;
        }
        if let Some(dir) = &self.output_dir {
            config.output.directory = Some(dir.clone());
        }
        if let Some(every) = self.every {
            config.output.every = every;
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact();

    if std::env::var_os("RUST_LOG").is_some() {
        builder.with_env_filter(EnvFilter::from_default_env()).init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    info!("quadmap v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_or_create(&args.config)?;
    args.apply_overrides(&mut config);

    info!(
        "Canvas: {}x{} @ {}fps (live warp: {}, mesh: {})",
        config.canvas.width,
        config.canvas.height,
        config.canvas.fps,
        config.render.live_warp,
        config.render.show_mesh
    );

    let loader = FileMediaLoader::new(config.camera.clone());
    let mut engine = Engine::new(&config, Box::new(loader));

    if let Some(preset) = &args.preset {
        engine
            .load_preset(preset)
            .with_context(|| format!("Failed to load preset {:?}", preset))?;
    }

    let report = engine.add_media(&args.media);
    for (path, err) in &report.failures {
        warn!("Skipping {:?}: {}", path, err);
    }

    let mut sink = FrameSink::new(&config.output);
    run(&mut engine, &mut sink, config.canvas.tick_interval(), args.frames).await;

    info!(
        "Rendered {} frame(s), wrote {}, dropped {}",
        sink.frame_count(),
        sink.written_count(),
        sink.dropped_count()
    );

    if let Some(path) = &args.save_preset {
        engine
            .save_preset(path)
            .with_context(|| format!("Failed to save preset {:?}", path))?;
    }

    Ok(())
}

/// Tick the engine until ctrl-c or the frame limit
async fn run(engine: &mut Engine, sink: &mut FrameSink, period: Duration, limit: Option<u64>) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut ticks: u64 = 0;
    let mut window_frames: u64 = 0;
    let mut window_start = Instant::now();

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Interrupted, shutting down");
                break;
            }
            _ = interval.tick() => {
                let frame = engine.tick();
                sink.present(frame);
                ticks += 1;
                window_frames += 1;

                let elapsed = window_start.elapsed();
                if elapsed >= STATS_INTERVAL {
                    let stats = engine.last_tick_stats();
                    info!(
                        "{:.1} fps | {} drawn, {} waiting, {} degenerate | {} dropped",
                        window_frames as f64 / elapsed.as_secs_f64(),
                        stats.drawn,
                        stats.not_ready,
                        stats.degenerate,
                        sink.dropped_count()
                    );
                    window_frames = 0;
                    window_start = Instant::now();
                }

                if limit.is_some_and(|n| ticks >= n) {
                    info!("Reached frame limit ({})", ticks);
                    break;
                }
            }
        }
    }
}
