//! Display hand-off.
//!
//! `RenderSink` lives on the tick thread. It converts frames to RGBA and pushes
//! them into a small bounded channel without ever waiting: when the window has
//! not caught up, the newest frame is dropped and counted instead.
//!
//! `DisplayPanel` lives on the UI thread and owns the last displayed image
//! until the next one replaces it.

use anyhow::Result;
use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TrySendError};

use crate::controller::StreamStatus;
use crate::frame::{DisplayImage, Frame};

/// Images queued between the tick thread and the window.
pub const DISPLAY_QUEUE_DEPTH: usize = 2;

/// Create a connected sink/panel pair.
pub fn channel() -> (RenderSink, DisplayPanel) {
    let (frame_tx, frame_rx) = mpsc::sync_channel(DISPLAY_QUEUE_DEPTH);
    let (status_tx, status_rx) = mpsc::channel();
    (
        RenderSink {
            frames: frame_tx,
            status: status_tx,
            last_status: None,
            presented: 0,
            dropped: 0,
        },
        DisplayPanel {
            frames: frame_rx,
            status: status_rx,
            current: None,
            current_status: StreamStatus::default(),
        },
    )
}

pub struct RenderSink {
    frames: SyncSender<DisplayImage>,
    status: Sender<StreamStatus>,
    last_status: Option<StreamStatus>,
    presented: u64,
    dropped: u64,
}

impl RenderSink {
    /// Convert `frame` and queue it for display. Returns whether it was queued.
    pub fn present(&mut self, frame: &Frame) -> Result<bool> {
        let image = frame.to_display()?;
        match self.frames.try_send(image) {
            Ok(()) => {
                self.presented += 1;
                Ok(true)
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped += 1;
                Ok(false)
            }
        }
    }

    /// Publish `status` if it differs from the last one published.
    pub fn report(&mut self, status: &StreamStatus) {
        if self.last_status.as_ref() == Some(status) {
            return;
        }
        let _ = self.status.send(status.clone());
        self.last_status = Some(status.clone());
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

pub struct DisplayPanel {
    frames: Receiver<DisplayImage>,
    status: Receiver<StreamStatus>,
    current: Option<DisplayImage>,
    current_status: StreamStatus,
}

impl DisplayPanel {
    /// Take everything queued so far. Returns whether the image changed.
    pub fn poll(&mut self) -> bool {
        while let Ok(status) = self.status.try_recv() {
            self.current_status = status;
        }
        let mut changed = false;
        while let Ok(image) = self.frames.try_recv() {
            self.current = Some(image);
            changed = true;
        }
        changed
    }

    pub fn current(&self) -> Option<&DisplayImage> {
        self.current.as_ref()
    }

    pub fn status(&self) -> &StreamStatus {
        &self.current_status
    }
}
