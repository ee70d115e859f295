use framestream::cli::Args;
use framestream::config::{SETTINGS_FILE, Settings};
use framestream::core::event_bus::{BoxedEvent, downcast_event};
use framestream::core::frame_events::SectionPageFailedEvent;
use framestream::core::{CacheManager, EventBus, FrameFetcher, FrameLoaderWorker, TransportConfig, UrlFetcher};
use framestream::manifest::ItemManifest;
use framestream::paths::{self, PathConfig};
use framestream::view::{FrameChangedEvent, PlaybackStateChanged, VideoView};

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const CANVAS_SIZE: (u32, u32) = (1280, 720);
const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(30);
const STATS_INTERVAL: Duration = Duration::from_secs(1);
const UPDATE_INTERVAL: Duration = Duration::from_millis(4);

fn init_logger(args: &Args, path_config: &PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .as_ref()
            .cloned()
            .unwrap_or_else(|| paths::data_file("framestream.log", path_config));
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .filter_module("ureq", log::LevelFilter::Warn)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Respects RUST_LOG if set
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .filter_module("ureq", log::LevelFilter::Warn)
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn handle_event(event: &BoxedEvent) {
    if let Some(e) = downcast_event::<FrameChangedEvent>(event) {
        debug!("Frame changed: {} ({})", e.origin, e.zero_based);
    } else if let Some(e) = downcast_event::<PlaybackStateChanged>(event) {
        info!("Playback: {} -> {}", e.from.name(), e.to.name());
    } else if let Some(e) = downcast_event::<SectionPageFailedEvent>(event) {
        warn!("Section page {} unavailable (frame {}): {}", e.offset, e.index, e.reason);
    }
}

fn log_stats(worker: &FrameLoaderWorker, view: &VideoView) {
    let stats = worker.stats();
    let (usage, limit) = worker.mem();
    info!(
        "Frame {:?} [{}] | cache: {} frames ({} HQ), hit rate {:.1}%, {} evicted | mem {:.1}/{:.1} MB",
        view.current_frame_index(),
        view.state().name(),
        stats.entries,
        stats.hq_entries,
        stats.hit_rate * 100.0,
        stats.evictions,
        usage as f64 / 1024.0 / 1024.0,
        limit as f64 / 1024.0 / 1024.0,
    );
}

fn main() -> Result<()> {
    let args = Args::parse();

    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = paths::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }
    init_logger(&args, &path_config)?;

    info!("framestream v{} starting...", env!("CARGO_PKG_VERSION"));
    debug!("Command-line args: {:?}", args);

    let settings_path = paths::config_file(SETTINGS_FILE, &path_config);
    info!("Config path: {}", settings_path.display());
    let mut settings = Settings::load(&settings_path)?;
    if let Some(concurrency) = args.concurrency {
        settings.loader.concurrency = concurrency;
    }

    let mut item = ItemManifest::load(&args.manifest)?.into_item();
    if args.fps.is_some() {
        item.fps = args.fps;
    }

    let manager = Arc::new(CacheManager::new(
        settings.loader.mem_fraction(),
        settings.loader.reserve_gb,
    ));
    let fetcher: Arc<dyn FrameFetcher> = Arc::new(UrlFetcher::new(settings.loader.fetch_timeout()));
    let bus = EventBus::polled();
    let worker = Arc::new(FrameLoaderWorker::spawn(
        TransportConfig::from(&settings.loader),
        manager,
        fetcher,
        bus.clone(),
    )?);

    let mut view = VideoView::new(
        Arc::clone(&worker),
        settings.playback.default_fps,
        CANVAS_SIZE.0,
        CANVAS_SIZE.1,
    );
    view.set_item(item, args.group.clone())?;
    if !view.settle(FIRST_FRAME_TIMEOUT) {
        warn!("First frame did not arrive within {:?}", FIRST_FRAME_TIMEOUT);
    }
    if let Some(frame) = args.start_frame {
        view.jump_to_frame(frame, true);
        view.settle(FIRST_FRAME_TIMEOUT);
    }
    if args.autoplay {
        view.play_video(Instant::now());
    }

    let run_for = args.run_duration();
    let started = Instant::now();
    let mut last_stats = started;
    while started.elapsed() < run_for {
        let now = Instant::now();
        view.update(now);
        view.render();
        for event in bus.poll() {
            handle_event(&event);
        }
        if now.duration_since(last_stats) >= STATS_INTERVAL {
            log_stats(&worker, &view);
            last_stats = now;
        }
        thread::sleep(UPDATE_INTERVAL);
    }

    view.stop_video();
    view.update(Instant::now());
    log_stats(&worker, &view);
    info!("Rendered {} passes", view.canvas().paint_count());

    view.cleanup();
    Ok(())
}
