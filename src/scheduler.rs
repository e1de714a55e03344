//! Fixed-delay tick thread.
//!
//! The scheduler owns the `StreamController` on a dedicated thread. It waits
//! for the start gate, then repeatedly drains pending commands, runs one tick
//! and sleeps for the tick interval. Shutdown is cooperative: the flag is
//! observed at the top of the next iteration, the thread hands the controller
//! back, and only then are the camera, cache and replay handles released.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::controller::{ControllerStats, ShutdownReport, StreamController};
use crate::helper::{StartGate, StartSignal};
use crate::render::RenderSink;
use crate::DEFAULT_TICK_MS;

/// User actions forwarded from the window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    ToggleReplay,
    NewPoint,
}

/// Cloneable handle for sending commands to the tick thread.
#[derive(Clone, Debug)]
pub struct CommandSender {
    tx: Sender<Command>,
}

impl CommandSender {
    /// Queue `command` for the next tick. Returns false once the loop is gone.
    pub fn send(&self, command: Command) -> bool {
        self.tx.send(command).is_ok()
    }

    pub fn toggle_replay(&self) -> bool {
        self.send(Command::ToggleReplay)
    }

    pub fn new_point(&self) -> bool {
        self.send(Command::NewPoint)
    }
}

pub struct TickScheduler {
    interval: Duration,
}

impl Default for TickScheduler {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_TICK_MS))
    }
}

impl TickScheduler {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn spawn(
        self,
        controller: StreamController,
        render: RenderSink,
        gate: StartGate,
    ) -> Result<SchedulerHandle> {
        let (tx, rx) = mpsc::channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let interval = self.interval;
        let join = std::thread::Builder::new()
            .name("sblive-tick".to_string())
            .spawn(move || run_loop(controller, render, gate, rx, shutdown_thread, interval))?;

        Ok(SchedulerHandle {
            commands: CommandSender { tx },
            shutdown,
            join: Some(join),
        })
    }
}

/// Final state of a stopped tick loop.
#[derive(Debug)]
pub struct SchedulerExit {
    pub report: ShutdownReport,
    pub stats: ControllerStats,
}

pub struct SchedulerHandle {
    commands: CommandSender,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<(StreamController, RenderSink)>>,
}

impl SchedulerHandle {
    pub fn commands(&self) -> CommandSender {
        self.commands.clone()
    }

    /// Raise the shutdown flag without waiting.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Stop the loop, wait for its last tick, then release every handle.
    pub fn stop(mut self) -> Result<SchedulerExit> {
        self.request_shutdown();
        let join = self
            .join
            .take()
            .ok_or_else(|| anyhow!("tick thread already joined"))?;
        let (mut controller, mut render) = join
            .join()
            .map_err(|_| anyhow!("tick thread panicked"))?;
        let report = controller.shutdown();
        render.report(&controller.status());
        Ok(SchedulerExit {
            report,
            stats: controller.stats(),
        })
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.request_shutdown();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn run_loop(
    mut controller: StreamController,
    mut render: RenderSink,
    gate: StartGate,
    commands: Receiver<Command>,
    shutdown: Arc<AtomicBool>,
    interval: Duration,
) -> (StreamController, RenderSink) {
    render.report(&controller.status());
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return (controller, render);
        }
        match gate.wait(interval) {
            Some(StartSignal::Ready(_)) => break,
            Some(StartSignal::Failed(fault)) => {
                controller.record_fault(fault);
                break;
            }
            None => continue,
        }
    }
    log::info!("tick loop started ({} ms interval)", interval.as_millis());

    while !shutdown.load(Ordering::SeqCst) {
        while let Ok(command) = commands.try_recv() {
            match command {
                Command::ToggleReplay => {
                    controller.toggle();
                }
                Command::NewPoint => controller.new_point(),
            }
        }
        controller.tick(&mut render);
        std::thread::sleep(interval);
    }
    log::debug!("tick loop stopped");
    (controller, render)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheCodec, CacheSettings, CacheWriter};
    use crate::controller::StreamPhase;
    use crate::ingest::{camera::CameraConfig, replay::ReplayConfig};
    use crate::ingest::{CameraSource, ReplaySource, SourceSet};
    use crate::render::{self, DisplayPanel};
    use crate::{ErrorKind, StreamError, StreamMode};
    use std::time::Instant;

    fn stub_controller(dir: &std::path::Path) -> StreamController {
        let cache_path = dir.join("cache").join("replay.mov");
        let camera = CameraSource::new(CameraConfig {
            device: "stub://scheduler".to_string(),
            width: 16,
            height: 9,
            ..CameraConfig::default()
        });
        let replay = ReplaySource::new(ReplayConfig {
            path: cache_path.clone(),
        });
        let cache = CacheWriter::new(CacheSettings {
            path: cache_path,
            codec: CacheCodec::Raw,
            fps: 10,
            width: 16,
            height: 9,
        });
        StreamController::new(SourceSet::new(Box::new(camera), Box::new(replay)), cache)
    }

    fn wait_until(panel: &mut DisplayPanel, mut done: impl FnMut(&DisplayPanel) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            panel.poll();
            if done(panel) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn loop_renders_and_applies_commands() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (sink, mut panel) = render::channel();
        let handle = TickScheduler::new(Duration::from_millis(2)).spawn(
            stub_controller(dir.path()),
            sink,
            StartGate::open(),
        )?;

        assert!(wait_until(&mut panel, |p| p.current().is_some()));
        assert!(handle.commands().toggle_replay());
        assert!(wait_until(&mut panel, |p| p.status().mode == StreamMode::Replay));

        let exit = handle.stop()?;
        assert!(exit.stats.frames_cached > 0);
        assert!(exit.report.replay_released);
        assert!(!exit.report.camera_released);
        panel.poll();
        assert_eq!(panel.status().phase, StreamPhase::Stopped);
        Ok(())
    }

    #[test]
    fn no_tick_runs_before_the_gate_opens() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (sink, mut panel) = render::channel();
        let (_signal, gate) = StartGate::channel();
        let handle = TickScheduler::new(Duration::from_millis(2)).spawn(
            stub_controller(dir.path()),
            sink,
            gate,
        )?;

        std::thread::sleep(Duration::from_millis(50));
        panel.poll();
        assert!(panel.current().is_none());
        assert_eq!(panel.status().phase, StreamPhase::Starting);

        let exit = handle.stop()?;
        assert_eq!(exit.stats.ticks, 0);
        assert!(!exit.report.camera_released);
        assert!(!exit.report.cache_released);
        Ok(())
    }

    #[test]
    fn helper_failure_is_shown_and_loop_still_starts() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (sink, mut panel) = render::channel();
        let gate = StartGate::signalled(StartSignal::Failed(StreamError::helper_process(
            "helper exited before producing output",
        )));
        let handle = TickScheduler::new(Duration::from_millis(2)).spawn(
            stub_controller(dir.path()),
            sink,
            gate,
        )?;

        assert!(wait_until(&mut panel, |p| p.current().is_some()));
        assert!(panel.status().fault(ErrorKind::HelperProcess).is_some());
        handle.stop()?;
        Ok(())
    }
}
