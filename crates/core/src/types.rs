use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use image::RgbImage;

use crate::error::CaptureError;

/// Window identifier as reported by the window enumerator
pub type WindowId = u64;

/// Screen-coordinate rectangle (left, top, width, height)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Region {
    pub l: i32,
    pub t: i32,
    pub w: u32,
    pub h: u32,
}

impl Region {
    pub fn new(l: i32, t: i32, w: u32, h: u32) -> Self {
        Self { l, t, w, h }
    }

    pub fn right(&self) -> i32 {
        self.l + self.w as i32
    }

    pub fn bottom(&self) -> i32 {
        self.t + self.h as i32
    }

    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.l && x < self.right() && y >= self.t && y < self.bottom()
    }
}

/// One enumerated display. `index` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayInfo {
    pub index: usize,
    pub width: u32,
    pub height: u32,
}

/// One enumerated top-level window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub id: WindowId,
    pub title: String,
    pub rect: Region,
}

/// What the frame source should sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureTarget {
    /// 1-based display index
    Display(usize),
    /// Window tracked by title; `rect` is only the geometry seen at selection time
    Window {
        id: WindowId,
        title: String,
        rect: Region,
    },
}

impl fmt::Display for CaptureTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureTarget::Display(i) => write!(f, "display {}", i),
            CaptureTarget::Window { title, .. } => write!(f, "window \"{}\"", title),
        }
    }
}

/// Area handed to the screen grabber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrabArea {
    Display(usize),
    Region(Region),
}

/// Byte order of a 4-channel raw capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    Bgra,
    Rgba,
}

/// Raw screenshot pixel data, 4 bytes per pixel plus optional row padding
#[derive(Debug)]
pub struct RawCapture {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: u32,
    pub layout: PixelLayout,
}

/// One captured image, normalized to packed RGB.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub captured_at: DateTime<Local>,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self { image, captured_at: Local::now() }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Pixel bounds of a candidate inside its frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Bounds {
    pub fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }

    pub fn aspect(&self) -> f64 {
        self.w as f64 / self.h.max(1) as f64
    }
}

/// A proposed region of interest cropped from a frame
#[derive(Debug, Clone)]
pub struct Candidate {
    pub image: RgbImage,
    pub bounds: Bounds,
    pub area: u64,
}

/// Result of one decoder invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeOutcome {
    pub success: bool,
    pub new_artifacts: BTreeSet<String>,
    pub message: String,
}

impl DecodeOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            new_artifacts: BTreeSet::new(),
            message: message.into(),
        }
    }
}

/// Per-session counters
#[derive(Debug, Clone, Copy)]
pub struct LoopStatistics {
    pub frames_processed: u64,
    pub dispatches_attempted: u64,
    pub dispatches_succeeded: u64,
    pub artifacts_found: u64,
    pub started_at: Instant,
}

impl Default for LoopStatistics {
    fn default() -> Self {
        Self {
            frames_processed: 0,
            dispatches_attempted: 0,
            dispatches_succeeded: 0,
            artifacts_found: 0,
            started_at: Instant::now(),
        }
    }
}

impl LoopStatistics {
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn fps(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.frames_processed as f64 / secs
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Stopping,
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Operator,
    TimeLimit,
    CaptureFailed(CaptureError),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Operator => write!(f, "stopped by operator"),
            StopReason::TimeLimit => write!(f, "time limit reached"),
            StopReason::CaptureFailed(e) => write!(f, "capture failed: {}", e),
        }
    }
}

/// Severity of a status line as shown by front ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Decoded,
    DecodeFailed,
    Error,
}

/// Timestamped, human-readable status report
#[derive(Debug, Clone)]
pub struct StatusLine {
    pub at: DateTime<Local>,
    pub kind: StatusKind,
    pub message: String,
}

impl StatusLine {
    pub fn new(kind: StatusKind, message: impl Into<String>) -> Self {
        Self { at: Local::now(), kind, message: message.into() }
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.at.format("%H:%M:%S"), self.message)
    }
}

/// Parameters of one monitoring session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub target: CaptureTarget,
    /// Minimum time between two decoder invocations
    pub interval: Duration,
    pub max_duration: Option<Duration>,
    /// Target sampling rate in frames per second
    pub frame_rate: f64,
}

impl SessionConfig {
    pub fn new(target: CaptureTarget) -> Self {
        Self {
            target,
            interval: Duration::from_millis(500),
            max_duration: None,
            frame_rate: 30.0,
        }
    }

    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate.max(1.0))
    }
}

/// Command from a front end to the acquisition thread
#[derive(Debug)]
pub enum Command {
    Start(SessionConfig),
    Stop,
    SetOutputDir(PathBuf),
    Quit,
}
