//! Frame acquisition on top of the platform capabilities.
//!
//! Every acquisition returns a packed RGB [`Frame`] whatever the native
//! layout of the capture backend was. Window targets are re-resolved by
//! title on each call since windows move, resize and close.

use std::path::Path;

use image::RgbImage;

use crate::error::{CaptureError, ConfigError};
use crate::platform::Platform;
use crate::types::*;

pub struct FrameSource {
    platform: Platform,
}

impl FrameSource {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    pub fn displays(&self) -> Result<Vec<DisplayInfo>, CaptureError> {
        self.platform.screen.displays()
    }

    /// Titled windows, or why window capture is unavailable.
    pub fn windows(&self) -> Result<Vec<WindowInfo>, ConfigError> {
        self.platform.windows.list()
    }

    /// Validate a display index at startup.
    pub fn display_target(&self, index: usize) -> Result<CaptureTarget, CaptureError> {
        let count = self.displays()?.len();
        if index == 0 || index > count {
            return Err(CaptureError::InvalidTarget { index, count });
        }
        Ok(CaptureTarget::Display(index))
    }

    /// Resolve a window title to a target at startup.
    pub fn window_target(&self, title: &str) -> Result<CaptureTarget, ConfigError> {
        match self.platform.windows.find_by_title(title)? {
            Some(w) => Ok(CaptureTarget::Window { id: w.id, title: title.to_string(), rect: w.rect }),
            None => Err(ConfigError::WindowNotFound(title.to_string())),
        }
    }

    /// Capture one frame of `target`.
    pub fn acquire(&self, target: &CaptureTarget) -> Result<Frame, CaptureError> {
        let area = match target {
            CaptureTarget::Display(index) => {
                let count = self.displays()?.len();
                if *index == 0 || *index > count {
                    return Err(CaptureError::InvalidTarget { index: *index, count });
                }
                GrabArea::Display(*index)
            }
            CaptureTarget::Window { title, .. } => GrabArea::Region(self.locate_window(title)?),
        };
        let raw = self.platform.screen.grab(area)?;
        Ok(Frame::new(normalize(&raw)))
    }

    /// Current geometry of the single window matching `title`.
    fn locate_window(&self, title: &str) -> Result<Region, CaptureError> {
        let window = match self.platform.windows.find_by_title(title) {
            Ok(Some(w)) => w,
            Ok(None) | Err(ConfigError::AmbiguousWindowTitle { .. }) => {
                return Err(CaptureError::TargetLost(title.to_string()))
            }
            Err(e) => return Err(CaptureError::DeviceUnavailable(e.to_string())),
        };
        if window.rect.is_empty() {
            return Err(CaptureError::TargetLost(title.to_string()));
        }
        Ok(window.rect)
    }

    /// Load an image file as a frame (used for single-image decoding).
    pub fn load_image(path: &Path) -> Result<Frame, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::ImageNotFound(path.to_path_buf()));
        }
        let img = image::open(path).map_err(|e| ConfigError::ImageUnreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Frame::new(img.to_rgb8()))
    }
}

/// Drop the alpha/padding channel and reorder to RGB.
pub fn normalize(raw: &RawCapture) -> RgbImage {
    let mut out = Vec::with_capacity(raw.width as usize * raw.height as usize * 3);
    for y in 0..raw.height as usize {
        let row = &raw.data[y * raw.bytes_per_row as usize..];
        for px in row[..raw.width as usize * 4].chunks_exact(4) {
            match raw.layout {
                PixelLayout::Bgra => out.extend_from_slice(&[px[2], px[1], px[0]]),
                PixelLayout::Rgba => out.extend_from_slice(&px[..3]),
            }
        }
    }
    // Buffer length is width * height * 3 by construction
    RgbImage::from_raw(raw.width, raw.height, out).unwrap_or_default()
}
