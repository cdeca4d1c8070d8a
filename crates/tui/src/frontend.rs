use std::sync::mpsc;
use std::time::{Duration, Instant};

use image::{imageops, RgbImage};

use cimwatch_core::acquisition::FrontEnd;
use cimwatch_core::types::{Frame, LoopStatistics, StatusKind, StatusLine, StopReason};

/// Longest preview edge in pixels. Two pixel rows fit in one terminal row.
const PREVIEW_EDGE: u32 = 240;
const PREVIEW_PERIOD: Duration = Duration::from_millis(100);

/// Loop-side half of the TUI: forwards previews and status lines to the UI thread.
pub struct TuiFrontEnd {
    preview_tx: mpsc::SyncSender<RgbImage>,
    status_tx: mpsc::Sender<StatusLine>,
    last_preview: Option<Instant>,
}

/// UI-side receivers matching a [`TuiFrontEnd`].
pub struct FrontEndChannels {
    pub preview_rx: mpsc::Receiver<RgbImage>,
    pub status_rx: mpsc::Receiver<StatusLine>,
}

impl TuiFrontEnd {
    pub fn new() -> (Self, FrontEndChannels) {
        let (preview_tx, preview_rx) = mpsc::sync_channel(1);
        let (status_tx, status_rx) = mpsc::channel();
        (
            Self { preview_tx, status_tx, last_preview: None },
            FrontEndChannels { preview_rx, status_rx },
        )
    }
}

impl FrontEnd for TuiFrontEnd {
    fn on_frame(&mut self, frame: &Frame) {
        if self.last_preview.is_some_and(|t| t.elapsed() < PREVIEW_PERIOD) {
            return;
        }
        self.last_preview = Some(Instant::now());
        let (w, h) = frame.image.dimensions();
        let scale = (PREVIEW_EDGE as f64 / w.max(h) as f64).min(1.0);
        let tw = ((w as f64 * scale) as u32).max(1);
        let th = ((h as f64 * scale) as u32).max(1);
        // A full slot means the UI has not caught up; drop this one
        let _ = self.preview_tx.try_send(imageops::thumbnail(&frame.image, tw, th));
    }

    fn on_status(&mut self, status: &StatusLine) {
        self.status_tx.send(status.clone()).ok();
    }

    fn on_stopped(&mut self, reason: &StopReason, stats: &LoopStatistics) {
        let kind = match reason {
            StopReason::CaptureFailed(_) => StatusKind::Error,
            _ => StatusKind::Info,
        };
        self.status_tx
            .send(StatusLine::new(kind, format!("idle, {} ({:.1} fps average)", reason, stats.fps())))
            .ok();
    }
}
