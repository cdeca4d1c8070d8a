pub mod stub;

#[cfg(feature = "xcap")]
pub mod native;

use regex::RegexBuilder;

use crate::error::{CaptureError, ConfigError};
use crate::logger;
use crate::types::*;

/// Screen capture primitives (display enumeration and raw grabs).
pub trait ScreenGrabber: Send {
    fn displays(&self) -> Result<Vec<DisplayInfo>, CaptureError>;
    fn grab(&self, area: GrabArea) -> Result<RawCapture, CaptureError>;
}

/// Top-level window enumeration.
pub trait WindowEnumerator: Send {
    fn windows(&self) -> Vec<WindowInfo>;
}

/// Window support, decided once when the platform is created.
pub enum WindowCapability {
    Available(Box<dyn WindowEnumerator>),
    Unsupported(String),
}

impl WindowCapability {
    pub fn is_available(&self) -> bool {
        matches!(self, WindowCapability::Available(_))
    }

    /// All titled windows, or the reason window capture is unavailable.
    pub fn list(&self) -> Result<Vec<WindowInfo>, ConfigError> {
        match self {
            WindowCapability::Available(e) => Ok(e.windows()),
            WindowCapability::Unsupported(reason) => {
                Err(ConfigError::WindowCaptureUnavailable(reason.clone()))
            }
        }
    }

    /// Zero or one window whose title matches `title`.
    pub fn find_by_title(&self, title: &str) -> Result<Option<WindowInfo>, ConfigError> {
        let windows = self.list()?;
        select_window(windows, title)
    }
}

/// Case-insensitive substring match. When several titles match, a single
/// exact (case-insensitive) match still wins.
pub fn select_window(windows: Vec<WindowInfo>, title: &str) -> Result<Option<WindowInfo>, ConfigError> {
    let re = RegexBuilder::new(&regex::escape(title))
        .case_insensitive(true)
        .build()
        .map_err(|_| ConfigError::WindowNotFound(title.to_string()))?;

    let mut matches: Vec<WindowInfo> = windows
        .into_iter()
        .filter(|w| !w.title.is_empty() && re.is_match(&w.title))
        .collect();

    if matches.len() > 1 {
        let exact: Vec<usize> = matches
            .iter()
            .enumerate()
            .filter(|(_, w)| w.title.eq_ignore_ascii_case(title))
            .map(|(i, _)| i)
            .collect();
        if exact.len() == 1 {
            return Ok(Some(matches.swap_remove(exact[0])));
        }
        return Err(ConfigError::AmbiguousWindowTitle {
            title: title.to_string(),
            count: matches.len(),
        });
    }
    Ok(matches.pop())
}

/// Capture capabilities available on this host.
pub struct Platform {
    pub screen: Box<dyn ScreenGrabber>,
    pub windows: WindowCapability,
}

/// Create the platform appropriate for the current build.
pub fn create_platform(force_stub: bool) -> Platform {
    if force_stub {
        logger::register_prefix("stub", logger::COLOR_GRAY);
        return stub::StubPlatform::default().into_platform();
    }
    #[cfg(feature = "xcap")]
    {
        logger::register_prefix("xcap", logger::COLOR_GRAY);
        return native::create();
    }
    #[cfg(not(feature = "xcap"))]
    {
        logger::register_prefix("stub", logger::COLOR_GRAY);
        logger::warn("built without screen capture support, using the stub platform");
        return stub::StubPlatform::default().into_platform();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn win(id: WindowId, title: &str) -> WindowInfo {
        WindowInfo { id, title: title.into(), rect: Region::new(0, 0, 100, 100) }
    }

    #[test]
    fn substring_match_is_case_insensitive() {
        let found = select_window(vec![win(1, "Mozilla Firefox"), win(2, "Terminal")], "firefox").unwrap();
        assert_eq!(found.map(|w| w.id), Some(1));
    }

    #[test]
    fn no_match_is_none() {
        assert!(select_window(vec![win(1, "Terminal")], "Chrome").unwrap().is_none());
    }

    #[test]
    fn exact_title_breaks_ties() {
        let found = select_window(vec![win(1, "Viewer"), win(2, "Viewer - settings")], "viewer").unwrap();
        assert_eq!(found.map(|w| w.id), Some(1));
    }

    #[test]
    fn several_partial_matches_are_ambiguous() {
        let err = select_window(vec![win(1, "Chrome - a"), win(2, "Chrome - b")], "chrome").unwrap_err();
        assert_eq!(err, ConfigError::AmbiguousWindowTitle { title: "chrome".into(), count: 2 });
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let found = select_window(vec![win(1, "a+b (1)"), win(2, "aab 1")], "a+b (1)").unwrap();
        assert_eq!(found.map(|w| w.id), Some(1));
    }

    #[test]
    fn unsupported_capability_reports_reason() {
        let cap = WindowCapability::Unsupported("no window backend".into());
        assert!(!cap.is_available());
        assert_eq!(
            cap.find_by_title("x").unwrap_err(),
            ConfigError::WindowCaptureUnavailable("no window backend".into())
        );
    }
}
