use std::path::PathBuf;

/// Errors raised while acquiring a frame. Any of these ends the running session.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("display {index} is out of range ({count} display(s) available)")]
    InvalidTarget { index: usize, count: usize },
    #[error("window \"{0}\" is no longer available")]
    TargetLost(String),
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),
}

/// Errors around the external decoder process.
#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
    #[error("decoder executable not found: {}", .0.display())]
    ProcessNotFound(PathBuf),
    #[error("decoder is not executable: {}", .0.display())]
    ProcessNotExecutable(PathBuf),
    /// Non-zero exit; carries the decoder's stderr verbatim.
    #[error("{0}")]
    DecodeFailed(String),
    #[error("failed to write scratch image: {0}")]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Startup configuration problems. The session never starts.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no capture source selected")]
    NoCaptureSource,
    #[error("window title \"{title}\" matches {count} windows")]
    AmbiguousWindowTitle { title: String, count: usize },
    #[error("no window matches \"{0}\"")]
    WindowNotFound(String),
    #[error("window capture unavailable: {0}")]
    WindowCaptureUnavailable(String),
    #[error("image not found: {}", .0.display())]
    ImageNotFound(PathBuf),
    #[error("cannot read image {}: {reason}", .path.display())]
    ImageUnreadable { path: PathBuf, reason: String },
    #[error("invalid {what}: {value} (expected 0 to {max} seconds)")]
    InvalidSeconds { what: String, value: String, max: u64 },
}

/// Lifecycle violations on the acquisition loop.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("a session is already running")]
    AlreadyRunning,
    #[error("cannot change the output directory while a session is running")]
    Busy,
    #[error("cannot use output directory {}: {reason}", .path.display())]
    OutputDir { path: PathBuf, reason: String },
    #[error("acquisition thread has exited")]
    Disconnected,
}
