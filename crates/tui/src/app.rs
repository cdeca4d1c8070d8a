use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use image::RgbImage;

use cimwatch_core::acquisition::{LoopHandle, LoopSnapshot};
use cimwatch_core::logger;
use cimwatch_core::settings::Settings;
use cimwatch_core::source::FrameSource;
use cimwatch_core::types::{CaptureTarget, LoopState, SessionConfig, StatusLine};

use crate::confirm::ConfirmDialog;
use crate::frontend::FrontEndChannels;

const MAX_LOG_LINES: usize = 2000;

/// One selectable capture source.
pub struct SourceEntry {
    pub label: String,
    pub target: CaptureTarget,
}

pub struct App {
    pub handle: LoopHandle,
    source: FrameSource,
    pub sources: Vec<SourceEntry>,
    /// Why no windows are listed, if window capture is unavailable
    pub window_note: Option<String>,
    pub selected: usize,
    pub snapshot: LoopSnapshot,
    pub preview: Option<RgbImage>,
    pub last_status: Option<StatusLine>,
    pub log_visible: bool,
    pub log_messages: Vec<String>,
    pub log_scroll: usize, // scroll offset from bottom (0 = latest)
    pub confirm: Option<ConfirmDialog>,
    pub should_quit: bool,
    log_rx: mpsc::Receiver<String>,
    channels: FrontEndChannels,
    settings: Settings,
    settings_path: PathBuf,
    home_output_dir: PathBuf,
    max_duration: Option<Duration>,
}

impl App {
    pub fn new(
        handle: LoopHandle,
        source: FrameSource,
        channels: FrontEndChannels,
        log_rx: mpsc::Receiver<String>,
        settings: Settings,
        settings_path: PathBuf,
        max_duration: Option<Duration>,
    ) -> Self {
        let snapshot = handle.snapshot();
        let mut app = Self {
            handle,
            source,
            sources: Vec::new(),
            window_note: None,
            selected: 0,
            home_output_dir: snapshot.output_dir.clone(),
            snapshot,
            preview: None,
            last_status: None,
            log_visible: true,
            log_messages: Vec::new(),
            log_scroll: 0,
            confirm: None,
            should_quit: false,
            log_rx,
            channels,
            settings,
            settings_path,
            max_duration,
        };
        app.rescan();
        if let Some(title) = app.settings.last_window_title.clone() {
            if let Some(i) = app.sources.iter().position(|s| {
                matches!(&s.target, CaptureTarget::Window { title: t, .. } if *t == title)
            }) {
                app.selected = i;
            }
        }
        app
    }

    /// Pull everything the acquisition thread produced since the last frame.
    pub fn tick(&mut self) {
        while let Ok(msg) = self.log_rx.try_recv() {
            self.log_messages.push(msg);
        }
        if self.log_messages.len() > MAX_LOG_LINES {
            let excess = self.log_messages.len() - MAX_LOG_LINES;
            self.log_messages.drain(..excess);
        }
        while let Ok(img) = self.channels.preview_rx.try_recv() {
            self.preview = Some(img);
        }
        while let Ok(status) = self.channels.status_rx.try_recv() {
            self.last_status = Some(status);
        }
        self.snapshot = self.handle.snapshot();
    }

    pub fn state(&self) -> LoopState {
        self.snapshot.state
    }

    pub fn output_dir(&self) -> &Path {
        &self.snapshot.output_dir
    }

    /// Re-enumerate displays and windows, keeping the selection in range.
    pub fn rescan(&mut self) {
        self.sources.clear();
        match self.source.displays() {
            Ok(displays) => self.sources.extend(displays.into_iter().map(|d| SourceEntry {
                label: format!("display {} ({}x{})", d.index, d.width, d.height),
                target: CaptureTarget::Display(d.index),
            })),
            Err(e) => logger::error(&format!("cannot list displays: {}", e)),
        }
        match self.source.windows() {
            Ok(windows) => {
                self.window_note = None;
                self.sources.extend(windows.into_iter().map(|w| SourceEntry {
                    label: format!("window \"{}\" ({}x{})", w.title, w.rect.w, w.rect.h),
                    target: CaptureTarget::Window { id: w.id, title: w.title, rect: w.rect },
                }));
            }
            Err(e) => self.window_note = Some(e.to_string()),
        }
        if self.selected >= self.sources.len() {
            self.selected = self.sources.len().saturating_sub(1);
        }
        logger::info(&format!("{} capture source(s) found", self.sources.len()));
    }

    pub fn move_up(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
        }
    }

    pub fn move_down(&mut self) {
        if self.selected + 1 < self.sources.len() {
            self.selected += 1;
        }
    }

    pub fn start_stop(&mut self) {
        match self.state() {
            LoopState::Running => self.handle.request_stop(),
            LoopState::Stopping => {}
            LoopState::Idle => {
                let Some(entry) = self.sources.get(self.selected) else {
                    logger::warn("no capture source selected");
                    return;
                };
                let interval = match self.settings.decode_interval() {
                    Ok(d) => d,
                    Err(e) => {
                        logger::error(&e.to_string());
                        return;
                    }
                };
                let mut config = SessionConfig::new(entry.target.clone());
                config.interval = interval;
                config.frame_rate = self.settings.frame_rate;
                config.max_duration = self.max_duration;

                if let CaptureTarget::Window { title, .. } = &entry.target {
                    self.settings.last_window_title = Some(title.clone());
                    self.settings.save(&self.settings_path);
                }
                if let Err(e) = self.handle.start(config) {
                    logger::error(&e.to_string());
                }
            }
        }
    }

    /// Switch between the configured output directory and a fresh temporary one.
    pub fn cycle_output_dir(&mut self) {
        if self.state() != LoopState::Idle {
            logger::warn("stop monitoring before changing the output directory");
            return;
        }
        let next = if self.output_dir() == self.home_output_dir {
            match tempfile::Builder::new().prefix("cimbar_decode_").tempdir() {
                Ok(dir) => dir.keep(),
                Err(e) => {
                    logger::error(&format!("cannot create a temporary directory: {}", e));
                    return;
                }
            }
        } else {
            self.home_output_dir.clone()
        };
        if let Err(e) = self.handle.set_output_dir(next.clone()) {
            logger::error(&e.to_string());
            return;
        }
        self.settings.output_dir = Some(next);
        self.settings.save(&self.settings_path);
    }

    pub fn scroll_log_up(&mut self, n: usize) {
        self.log_scroll = self.log_scroll.saturating_add(n);
    }

    pub fn scroll_log_down(&mut self, n: usize) {
        self.log_scroll = self.log_scroll.saturating_sub(n);
    }

    pub fn toggle_log(&mut self) {
        self.log_visible = !self.log_visible;
    }

    /// Quit right away when idle, otherwise ask first.
    pub fn quit(&mut self) {
        if self.state() == LoopState::Idle {
            self.should_quit = true;
        } else {
            self.confirm = Some(ConfirmDialog::new("Stop monitoring and quit?"));
        }
    }

    pub fn confirm_toggle(&mut self) {
        if let Some(c) = self.confirm.as_mut() {
            c.toggle();
        }
    }

    pub fn confirm_answer(&mut self, yes: bool) {
        if self.confirm.take().is_some() && yes {
            self.handle.request_stop();
            self.should_quit = true;
        }
    }

    pub fn confirm_accept(&mut self) {
        let yes = self.confirm.as_ref().is_some_and(|c| c.selected);
        self.confirm_answer(yes);
    }
}
