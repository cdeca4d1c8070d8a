use std::sync::{Arc, Mutex};

use crate::error::CaptureError;
use crate::logger;
use crate::types::*;
use super::{Platform, ScreenGrabber, WindowCapability, WindowEnumerator};

/// Synthetic platform: fixed displays showing a dark desktop with a
/// color-grid square in the middle, plus a configurable window list.
pub struct StubPlatform {
    pub displays: Vec<(u32, u32)>,
    pub windows: Arc<Mutex<Vec<WindowInfo>>>,
    pub window_support: bool,
}

impl Default for StubPlatform {
    fn default() -> Self {
        Self {
            displays: vec![(1280, 720), (640, 480)],
            windows: Arc::new(Mutex::new(vec![
                WindowInfo { id: 10001, title: "Stub Viewer".into(), rect: Region::new(400, 120, 480, 480) },
                WindowInfo { id: 10002, title: "Stub Terminal".into(), rect: Region::new(40, 40, 300, 200) },
            ])),
            window_support: true,
        }
    }
}

impl StubPlatform {
    pub fn into_platform(self) -> Platform {
        let windows = if self.window_support {
            WindowCapability::Available(Box::new(StubWindows { windows: self.windows }))
        } else {
            WindowCapability::Unsupported("stub platform without window support".into())
        };
        Platform {
            screen: Box::new(StubScreen { displays: self.displays }),
            windows,
        }
    }
}

struct StubScreen {
    displays: Vec<(u32, u32)>,
}

impl ScreenGrabber for StubScreen {
    fn displays(&self) -> Result<Vec<DisplayInfo>, CaptureError> {
        Ok(self
            .displays
            .iter()
            .enumerate()
            .map(|(i, &(width, height))| DisplayInfo { index: i + 1, width, height })
            .collect())
    }

    fn grab(&self, area: GrabArea) -> Result<RawCapture, CaptureError> {
        match area {
            GrabArea::Display(index) => {
                let &(w, h) = index
                    .checked_sub(1)
                    .and_then(|i| self.displays.get(i))
                    .ok_or(CaptureError::InvalidTarget { index, count: self.displays.len() })?;
                Ok(render_desktop(Region::new(0, 0, w, h), w, h))
            }
            GrabArea::Region(r) => {
                // Regions are resolved against the first display
                let &(w, h) = self
                    .displays
                    .first()
                    .ok_or_else(|| CaptureError::DeviceUnavailable("no displays".into()))?;
                let l = r.l.clamp(0, w as i32);
                let t = r.t.clamp(0, h as i32);
                let clipped = Region::new(
                    l,
                    t,
                    (r.right().min(w as i32) - l).max(0) as u32,
                    (r.bottom().min(h as i32) - t).max(0) as u32,
                );
                if clipped.is_empty() {
                    logger::warn_p("stub", &format!("grab({:?}) is off screen", r));
                    return Err(CaptureError::DeviceUnavailable(format!("region {:?} is off screen", r)));
                }
                Ok(render_desktop(clipped, w, h))
            }
        }
    }
}

struct StubWindows {
    windows: Arc<Mutex<Vec<WindowInfo>>>,
}

impl WindowEnumerator for StubWindows {
    fn windows(&self) -> Vec<WindowInfo> {
        self.windows.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

/// Render the part `view` of a `desk_w` x `desk_h` desktop as BGRA.
fn render_desktop(view: Region, desk_w: u32, desk_h: u32) -> RawCapture {
    let side = (desk_w.min(desk_h) / 2).max(1);
    let code = Region::new(((desk_w - side) / 2) as i32, ((desk_h - side) / 2) as i32, side, side);
    let cell = (side / 24).max(2) as i32;

    let bytes_per_row = view.w * 4;
    let mut data = vec![0u8; (bytes_per_row * view.h) as usize];
    for row in 0..view.h {
        for col in 0..view.w {
            let x = view.l + col as i32;
            let y = view.t + row as i32;
            let (r, g, b) = if code.contains_point(x, y) {
                grid_color((x - code.l) / cell, (y - code.t) / cell)
            } else {
                (32, 34, 40)
            };
            let i = (row * bytes_per_row + col * 4) as usize;
            data[i] = b;
            data[i + 1] = g;
            data[i + 2] = r;
            data[i + 3] = 255;
        }
    }
    RawCapture { data, width: view.w, height: view.h, bytes_per_row, layout: PixelLayout::Bgra }
}

/// Deterministic pseudo-random 8-color palette cell.
fn grid_color(cx: i32, cy: i32) -> (u8, u8, u8) {
    const PALETTE: [(u8, u8, u8); 8] = [
        (0, 255, 255), (255, 255, 0), (255, 0, 255), (0, 255, 0),
        (0, 0, 255), (255, 0, 0), (255, 255, 255), (0, 0, 0),
    ];
    let h = (cx as u32).wrapping_mul(73_856_093) ^ (cy as u32).wrapping_mul(19_349_663);
    PALETTE[(h >> 7) as usize % PALETTE.len()]
}
