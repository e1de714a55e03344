//! sblive - live camera view with an instant replay of the last point
//!
//! This binary:
//! 1. Loads configuration (file, env, CLI)
//! 2. Launches the helper process and waits for its first line
//! 3. Runs the capture/cache/replay tick loop on its own thread
//! 4. Shows the window until it is closed or Ctrl-C is pressed
//! 5. Stops the loop, then releases the camera, cache and replay file

use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sblive::{
    gui, render, HelperProcess, SbliveConfig, StartGate, StreamController, TickScheduler,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(name = "sblive", version, about = "Live camera view with instant replay")]
struct Args {
    /// Directory for exported snapshots
    #[arg(short, long, default_value = "./", value_name = "DIR")]
    output: PathBuf,

    /// JSON config file (overrides SBLIVE_CONFIG)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::StartupUi::from_args(&args.ui, is_tty, !stdout_is_tty);

    log::info!("SpikeBall Live {}", env!("CARGO_PKG_VERSION"));
    log::info!("'Toggle Replay' switches between the live feed and the replay of the current point");
    log::info!("'New Point' starts a fresh replay; press Ctrl-C or close the window to quit");

    let config = {
        let _step = ui.step("Load configuration");
        SbliveConfig::load(args.config.as_deref())?.with_output_dir(args.output)
    };
    log::info!(
        "camera={} cache={} ({}, {} fps) tick={}ms output={}",
        config.camera.device_path(),
        config.cache.path.display(),
        config.cache.codec.as_str(),
        config.cache.fps,
        config.tick_interval.as_millis(),
        config.output_dir.display()
    );

    let (helper, gate) = {
        let mut step = ui.step("Launch helper");
        if config.helper.enabled {
            let (helper, gate) = HelperProcess::launch(&config.helper.command);
            if helper.is_none() {
                step.warn("helper did not start; continuing without it");
            }
            (helper, gate)
        } else {
            step.warn("disabled");
            (None, StartGate::open())
        }
    };

    let (sink, panel) = render::channel();
    let scheduler = {
        let _step = ui.step("Start stream loop");
        log::info!("Initializing stream...");
        let controller = StreamController::from_config(&config);
        TickScheduler::new(config.tick_interval).spawn(controller, sink, gate)?
    };

    let quit = Arc::new(AtomicBool::new(false));
    let quit_signal = quit.clone();
    ctrlc::set_handler(move || {
        quit_signal.store(true, Ordering::SeqCst);
    })
    .expect("error setting Ctrl-C handler");

    let window = gui::run(
        &config.window_title,
        (config.camera.width, config.camera.height),
        panel,
        scheduler.commands(),
        quit.clone(),
    );
    quit.store(true, Ordering::SeqCst);
    if let Err(err) = &window {
        log::error!("{:#}", err);
    }

    log::info!("Terminating...");
    match scheduler.stop() {
        Ok(exit) => {
            let stats = exit.stats;
            log::info!(
                "ticks={} rendered={} dropped={} cached={} resets={} replay_loops={}",
                stats.ticks,
                stats.frames_rendered,
                stats.frames_dropped,
                stats.frames_cached,
                stats.cache_resets,
                stats.replay_loops
            );
            for err in exit.report.errors {
                log::warn!("shutdown: {}", err);
            }
        }
        Err(err) => log::warn!("stream loop: {:#}", err),
    }
    if let Some(helper) = helper {
        helper.stop();
    }
    log::info!("View most recent cache in {}", config.cache.path.display());

    window
}
