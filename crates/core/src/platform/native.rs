use xcap::{Monitor, Window};

use crate::error::CaptureError;
use crate::logger;
use crate::types::*;
use super::{Platform, ScreenGrabber, WindowCapability, WindowEnumerator};

/// Build the xcap-backed platform. Window enumeration is probed once here;
/// if it fails, window capture is reported as unsupported.
pub fn create() -> Platform {
    let windows = match Window::all() {
        Ok(_) => WindowCapability::Available(Box::new(XcapWindows)),
        Err(e) => {
            logger::warn_p("xcap", &format!("window enumeration unavailable: {}", e));
            WindowCapability::Unsupported(e.to_string())
        }
    };
    Platform { screen: Box::new(XcapScreen), windows }
}

struct XcapScreen;

fn monitors() -> Result<Vec<Monitor>, CaptureError> {
    Monitor::all().map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))
}

impl ScreenGrabber for XcapScreen {
    fn displays(&self) -> Result<Vec<DisplayInfo>, CaptureError> {
        Ok(monitors()?
            .iter()
            .enumerate()
            .map(|(i, m)| DisplayInfo { index: i + 1, width: m.width(), height: m.height() })
            .collect())
    }

    fn grab(&self, area: GrabArea) -> Result<RawCapture, CaptureError> {
        let all = monitors()?;
        match area {
            GrabArea::Display(index) => {
                let count = all.len();
                let monitor = index
                    .checked_sub(1)
                    .and_then(|i| all.get(i))
                    .ok_or(CaptureError::InvalidTarget { index, count })?;
                let image = monitor
                    .capture_image()
                    .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;
                let (width, height) = (image.width(), image.height());
                Ok(RawCapture {
                    data: image.into_raw(),
                    width,
                    height,
                    bytes_per_row: width * 4,
                    layout: PixelLayout::Rgba,
                })
            }
            GrabArea::Region(region) => {
                // Grab the monitor holding the region's center, then crop
                let cx = region.l + region.w as i32 / 2;
                let cy = region.t + region.h as i32 / 2;
                let monitor = all
                    .iter()
                    .find(|m| Region::new(m.x(), m.y(), m.width(), m.height()).contains_point(cx, cy))
                    .or_else(|| all.first())
                    .ok_or_else(|| CaptureError::DeviceUnavailable("no monitors".into()))?;
                let image = monitor
                    .capture_image()
                    .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;
                let (mw, mh) = (image.width(), image.height());
                let local = to_image_pixels(
                    region,
                    Region::new(monitor.x(), monitor.y(), monitor.width(), monitor.height()),
                    (mw, mh),
                );
                crop_rgba(&image.into_raw(), mw, mh, (0, 0), local)
            }
        }
    }
}

/// Map `region` from logical screen points into the pixel space of a capture of
/// `monitor`. On scaled displays the capture is larger than the logical size.
fn to_image_pixels(region: Region, monitor: Region, image: (u32, u32)) -> Region {
    let sx = image.0 as f64 / monitor.w.max(1) as f64;
    let sy = image.1 as f64 / monitor.h.max(1) as f64;
    let l = ((region.l - monitor.l) as f64 * sx).round() as i32;
    let t = ((region.t - monitor.t) as f64 * sy).round() as i32;
    let r = ((region.right() - monitor.l) as f64 * sx).round() as i32;
    let b = ((region.bottom() - monitor.t) as f64 * sy).round() as i32;
    Region::new(l, t, (r - l).max(0) as u32, (b - t).max(0) as u32)
}

/// Cut `region` (screen coordinates) out of a monitor image located at `origin`.
fn crop_rgba(
    data: &[u8],
    mw: u32,
    mh: u32,
    origin: (i32, i32),
    region: Region,
) -> Result<RawCapture, CaptureError> {
    let l = (region.l - origin.0).clamp(0, mw as i32) as u32;
    let t = (region.t - origin.1).clamp(0, mh as i32) as u32;
    let r = (region.right() - origin.0).clamp(0, mw as i32) as u32;
    let b = (region.bottom() - origin.1).clamp(0, mh as i32) as u32;
    if r <= l || b <= t {
        return Err(CaptureError::DeviceUnavailable(format!("region {:?} is off screen", region)));
    }

    let (w, h) = (r - l, b - t);
    let src_stride = mw as usize * 4;
    let mut out = Vec::with_capacity(w as usize * h as usize * 4);
    for y in t..b {
        let start = y as usize * src_stride + l as usize * 4;
        out.extend_from_slice(&data[start..start + w as usize * 4]);
    }
    Ok(RawCapture { data: out, width: w, height: h, bytes_per_row: w * 4, layout: PixelLayout::Rgba })
}

struct XcapWindows;

impl WindowEnumerator for XcapWindows {
    fn windows(&self) -> Vec<WindowInfo> {
        let all = match Window::all() {
            Ok(w) => w,
            Err(e) => {
                logger::warn_p("xcap", &format!("failed to list windows: {}", e));
                return Vec::new();
            }
        };
        all.iter()
            .filter(|w| !w.title().is_empty() && !w.is_minimized())
            .map(|w| WindowInfo {
                id: w.id() as WindowId,
                title: w.title().to_string(),
                rect: Region::new(w.x(), w.y(), w.width(), w.height()),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_translates_screen_coordinates() {
        // 4x2 monitor at (100, 50); pixel value encodes its x coordinate
        let mut data = Vec::new();
        for _y in 0..2 {
            for x in 0..4u8 {
                data.extend_from_slice(&[x, 0, 0, 255]);
            }
        }
        let cap = crop_rgba(&data, 4, 2, (100, 50), Region::new(101, 50, 2, 2)).unwrap();
        assert_eq!((cap.width, cap.height), (2, 2));
        assert_eq!(cap.data[0], 1);
        assert_eq!(cap.data[4], 2);
    }

    #[test]
    fn region_scales_onto_retina_capture() {
        let monitor = Region::new(0, 0, 1440, 900);
        let px = to_image_pixels(Region::new(400, 120, 480, 480), monitor, (2880, 1800));
        assert_eq!(px, Region::new(800, 240, 960, 960));
    }

    #[test]
    fn region_on_secondary_scaled_monitor() {
        let monitor = Region::new(1440, -100, 800, 600);
        let px = to_image_pixels(Region::new(1540, 0, 200, 100), monitor, (1600, 1200));
        assert_eq!(px, Region::new(200, 200, 400, 200));
    }

    #[test]
    fn crop_of_2x_capture_takes_the_scaled_area() {
        // 2x2 logical monitor captured at 4x4; pixel value encodes its x coordinate
        let mut data = Vec::new();
        for _y in 0..4 {
            for x in 0..4u8 {
                data.extend_from_slice(&[x, 0, 0, 255]);
            }
        }
        let local = to_image_pixels(Region::new(1, 1, 1, 1), Region::new(0, 0, 2, 2), (4, 4));
        let cap = crop_rgba(&data, 4, 4, (0, 0), local).unwrap();
        assert_eq!((cap.width, cap.height), (2, 2));
        assert_eq!(cap.data[0], 2);
        assert_eq!(cap.data[4], 3);
    }

    #[test]
    fn crop_outside_monitor_fails() {
        let data = vec![0u8; 4 * 4 * 4];
        assert!(crop_rgba(&data, 4, 4, (0, 0), Region::new(10, 10, 5, 5)).is_err());
    }
}
