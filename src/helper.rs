//! Helper process and the startup gate.
//!
//! One helper process is launched at startup with stdout and stderr merged.
//! The first line it prints is logged and opens the `StartGate`, which allows
//! the first tick to run. Everything it prints afterwards is drained at debug
//! level so the helper never stalls on a full pipe.
//!
//! A helper that cannot be launched, or that exits before printing anything,
//! opens the gate with a `HelperProcess` fault instead.

use anyhow::Result;
use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use crate::StreamError;

/// Default helper command line.
pub const DEFAULT_HELPER_COMMAND: [&str; 2] = ["python3", "sblive/server.py"];

/// What opened the gate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StartSignal {
    /// The helper's first line of output.
    Ready(String),
    Failed(StreamError),
}

/// One-shot gate between the helper monitor and the tick loop.
pub struct StartGate {
    rx: Receiver<StartSignal>,
}

impl StartGate {
    pub fn channel() -> (Sender<StartSignal>, StartGate) {
        let (tx, rx) = mpsc::channel();
        (tx, StartGate { rx })
    }

    /// A gate that is already open, for runs without a helper.
    pub fn open() -> StartGate {
        Self::signalled(StartSignal::Ready(String::new()))
    }

    pub fn signalled(signal: StartSignal) -> StartGate {
        let (tx, gate) = Self::channel();
        let _ = tx.send(signal);
        gate
    }

    /// Wait up to `timeout` for the gate to open.
    pub fn wait(&self, timeout: Duration) -> Option<StartSignal> {
        match self.rx.recv_timeout(timeout) {
            Ok(signal) => Some(signal),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(StartSignal::Failed(
                StreamError::helper_process("helper monitor ended without a signal"),
            )),
        }
    }
}

/// Running helper process.
pub struct HelperHandle {
    child: Child,
}

impl HelperHandle {
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Kill the helper if it is still running and reap it. Best effort.
    pub fn stop(mut self) {
        if self.is_running() {
            if let Err(err) = self.child.kill() {
                log::warn!("helper: kill failed: {}", err);
            }
        }
        match self.child.wait() {
            Ok(status) => log::debug!("helper exited with {}", status),
            Err(err) => log::warn!("helper: wait failed: {}", err),
        }
    }
}

pub struct HelperProcess;

impl HelperProcess {
    /// Launch `command` and start monitoring its output.
    pub fn spawn(command: &[String]) -> Result<(HelperHandle, StartGate)> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| StreamError::helper_process("helper command is empty"))?;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                StreamError::helper_process(format!("launch '{}': {}", command.join(" "), err))
            })?;

        let (line_tx, line_rx) = mpsc::channel();
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, line_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, line_tx);
        }

        let (signal_tx, gate) = StartGate::channel();
        std::thread::spawn(move || monitor(line_rx, signal_tx));

        log::info!("helper: launched '{}' (pid {})", command.join(" "), child.id());
        Ok((HelperHandle { child }, gate))
    }

    /// Like `spawn`, but a launch failure becomes a failed gate.
    pub fn launch(command: &[String]) -> (Option<HelperHandle>, StartGate) {
        match Self::spawn(command) {
            Ok((handle, gate)) => (Some(handle), gate),
            Err(err) => {
                let fault = StreamError::classify(&err, crate::ErrorKind::HelperProcess);
                (None, StartGate::signalled(StartSignal::Failed(fault)))
            }
        }
    }
}

fn forward_lines(stream: impl Read + Send + 'static, tx: Sender<String>) {
    std::thread::spawn(move || {
        let reader = BufReader::new(stream);
        for line in reader.lines().map_while(|line| line.ok()) {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
}

fn monitor(lines: Receiver<String>, signal: Sender<StartSignal>) {
    match lines.recv() {
        Ok(line) => {
            log::info!("{}", line);
            let _ = signal.send(StartSignal::Ready(line));
        }
        Err(_) => {
            let _ = signal.send(StartSignal::Failed(StreamError::helper_process(
                "helper exited before producing output",
            )));
            return;
        }
    }
    for line in lines {
        log::debug!("helper: {}", line);
    }
}
