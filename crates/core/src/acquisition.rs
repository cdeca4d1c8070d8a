//! The capture, locate, dispatch loop.
//!
//! [`AcquisitionLoop`] owns one frame source, one detector and one
//! dispatcher and reports everything through a [`FrontEnd`]. It can be
//! driven cycle by cycle, blocking on the caller's thread
//! ([`AcquisitionLoop::run_blocking`]) or on a background thread controlled
//! through a [`LoopHandle`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::dispatch::Dispatcher;
use crate::error::SessionError;
use crate::logger;
use crate::roi::RoiDetector;
use crate::source::FrameSource;
use crate::types::*;

const IDLE_PERIOD: Duration = Duration::from_millis(100);

/// Receiver of loop events. Called on the loop's thread.
pub trait FrontEnd: Send {
    fn on_frame(&mut self, frame: &Frame);
    fn on_status(&mut self, status: &StatusLine);
    fn on_stopped(&mut self, reason: &StopReason, stats: &LoopStatistics);
    /// Called after every cycle.
    fn on_stats(&mut self, _stats: &LoopStatistics) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Continue,
    /// The session ended during this cycle
    Stopped,
    /// No session was running
    Idle,
}

pub struct AcquisitionLoop<F: FrontEnd> {
    source: FrameSource,
    detector: RoiDetector,
    dispatcher: Dispatcher,
    front: F,
    state: LoopState,
    session: Option<SessionConfig>,
    stats: LoopStatistics,
    last_stop: Option<StopReason>,
}

impl<F: FrontEnd> AcquisitionLoop<F> {
    pub fn new(source: FrameSource, detector: RoiDetector, dispatcher: Dispatcher, front: F) -> Self {
        logger::register_prefix("session", logger::COLOR_GREEN);
        Self {
            source,
            detector,
            dispatcher,
            front,
            state: LoopState::Idle,
            session: None,
            stats: LoopStatistics::default(),
            last_stop: None,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stats(&self) -> &LoopStatistics {
        &self.stats
    }

    pub fn last_stop(&self) -> Option<&StopReason> {
        self.last_stop.as_ref()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Sampling period of the current session.
    pub fn frame_period(&self) -> Duration {
        self.session.as_ref().map_or(IDLE_PERIOD, SessionConfig::frame_period)
    }

    /// Begin a session. Statistics start from zero.
    pub fn start(&mut self, config: SessionConfig) -> Result<(), SessionError> {
        if self.state != LoopState::Idle {
            return Err(SessionError::AlreadyRunning);
        }
        let msg = format!(
            "monitoring {}, output {}",
            config.target,
            self.dispatcher.output_dir().display()
        );
        self.stats = LoopStatistics::default();
        self.session = Some(config);
        self.last_stop = None;
        self.state = LoopState::Running;
        self.report(StatusKind::Info, msg);
        Ok(())
    }

    /// One capture and, when due, one detect + dispatch.
    pub fn cycle(&mut self) -> CycleOutcome {
        if self.state != LoopState::Running {
            return CycleOutcome::Idle;
        }
        let Some(session) = self.session.as_ref() else {
            return CycleOutcome::Idle;
        };
        let interval = session.interval;

        if let Some(limit) = session.max_duration {
            if self.stats.elapsed() >= limit {
                self.stop(StopReason::TimeLimit);
                return CycleOutcome::Stopped;
            }
        }

        let acquired = self.source.acquire(&session.target);
        let frame = match acquired {
            Ok(frame) => frame,
            Err(e) => {
                self.stop(StopReason::CaptureFailed(e));
                return CycleOutcome::Stopped;
            }
        };
        self.stats.frames_processed += 1;
        self.front.on_frame(&frame);

        if self.dispatcher.is_due(interval) {
            if let Some(candidate) = self.detector.detect_best(&frame) {
                self.stats.dispatches_attempted += 1;
                let outcome = self.dispatcher.dispatch(&candidate.image);
                if outcome.success {
                    self.stats.dispatches_succeeded += 1;
                    self.stats.artifacts_found += outcome.new_artifacts.len() as u64;
                    self.report(StatusKind::Decoded, outcome.message);
                } else {
                    let b = candidate.bounds;
                    self.report(
                        StatusKind::DecodeFailed,
                        format!("decode failed at {}x{}+{}+{}: {}", b.w, b.h, b.x, b.y, outcome.message.trim_end()),
                    );
                }
            }
        }

        self.front.on_stats(&self.stats);
        CycleOutcome::Continue
    }

    /// End the session. No-op while Idle.
    pub fn stop(&mut self, reason: StopReason) {
        if self.state == LoopState::Idle {
            return;
        }
        self.state = LoopState::Stopping;
        let kind = match reason {
            StopReason::CaptureFailed(_) => StatusKind::Error,
            _ => StatusKind::Info,
        };
        self.report(
            kind,
            format!(
                "session ended ({}): {} frames, {}/{} decodes, {} file(s)",
                reason,
                self.stats.frames_processed,
                self.stats.dispatches_succeeded,
                self.stats.dispatches_attempted,
                self.stats.artifacts_found
            ),
        );
        self.session = None;
        self.state = LoopState::Idle;
        self.front.on_stopped(&reason, &self.stats);
        self.last_stop = Some(reason);
    }

    /// Point the dispatcher at another directory. Only allowed while Idle.
    pub fn set_output_dir(&mut self, dir: &Path) -> Result<(), SessionError> {
        if self.state != LoopState::Idle {
            return Err(SessionError::Busy);
        }
        self.dispatcher.set_output_dir(dir).map_err(|e| SessionError::OutputDir {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;
        self.report(StatusKind::Info, format!("output directory: {}", dir.display()));
        Ok(())
    }

    /// Cycle on the current thread until the session ends or `stop` is raised.
    pub fn run_blocking(&mut self, stop: &AtomicBool) -> Option<StopReason> {
        while self.state == LoopState::Running {
            if stop.load(Ordering::SeqCst) {
                self.stop(StopReason::Operator);
                break;
            }
            let began = Instant::now();
            if self.cycle() != CycleOutcome::Continue {
                break;
            }
            let remaining = self.frame_period().saturating_sub(began.elapsed());
            if !remaining.is_zero() {
                thread::sleep(remaining);
            }
        }
        self.last_stop.clone()
    }

    fn report(&mut self, kind: StatusKind, msg: impl Into<String>) {
        let status = StatusLine::new(kind, msg);
        logger::status("session", &status);
        self.front.on_status(&status);
    }

    /// Apply one command. Returns false on Quit.
    fn apply(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Start(config) => {
                if let Err(e) = self.start(config) {
                    self.report(StatusKind::Error, e.to_string());
                }
            }
            Command::Stop => self.stop(StopReason::Operator),
            Command::SetOutputDir(dir) => {
                if let Err(e) = self.set_output_dir(&dir) {
                    self.report(StatusKind::Error, e.to_string());
                }
            }
            Command::Quit => {
                self.stop(StopReason::Operator);
                return false;
            }
        }
        true
    }
}

/// What other threads can see of a spawned loop.
#[derive(Debug, Clone)]
pub struct LoopSnapshot {
    pub state: LoopState,
    pub stats: LoopStatistics,
    pub output_dir: PathBuf,
    pub last_stop: Option<StopReason>,
}

pub struct LoopShared {
    snapshot: Mutex<LoopSnapshot>,
    changed: Condvar,
}

impl LoopShared {
    fn publish<F: FrontEnd>(&self, lp: &AcquisitionLoop<F>) {
        let Ok(mut snap) = self.snapshot.lock() else { return };
        // A requested stop stays visible until the loop has processed it
        snap.state = if snap.state == LoopState::Stopping && lp.state() == LoopState::Running {
            LoopState::Stopping
        } else {
            lp.state()
        };
        snap.stats = *lp.stats();
        snap.output_dir = lp.dispatcher().output_dir().to_path_buf();
        snap.last_stop = lp.last_stop().cloned();
        self.changed.notify_all();
    }
}

/// Controls a loop running on its own thread.
pub struct LoopHandle {
    tx: mpsc::Sender<Command>,
    shared: Arc<LoopShared>,
    thread: Option<JoinHandle<()>>,
}

/// Move `lp` onto a background thread named `acquisition`.
pub fn spawn<F: FrontEnd + 'static>(lp: AcquisitionLoop<F>) -> std::io::Result<LoopHandle> {
    let shared = Arc::new(LoopShared {
        snapshot: Mutex::new(LoopSnapshot {
            state: lp.state(),
            stats: *lp.stats(),
            output_dir: lp.dispatcher().output_dir().to_path_buf(),
            last_stop: None,
        }),
        changed: Condvar::new(),
    });
    let (tx, rx) = mpsc::channel();
    let thread_shared = shared.clone();
    let thread = thread::Builder::new()
        .name("acquisition".into())
        .spawn(move || drive(lp, rx, thread_shared))?;
    Ok(LoopHandle { tx, shared, thread: Some(thread) })
}

fn drive<F: FrontEnd>(mut lp: AcquisitionLoop<F>, rx: mpsc::Receiver<Command>, shared: Arc<LoopShared>) {
    let mut next_cycle = Instant::now();
    loop {
        let cmd = if lp.state() == LoopState::Running {
            match rx.recv_timeout(next_cycle.saturating_duration_since(Instant::now())) {
                Ok(cmd) => Some(cmd),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => Some(Command::Quit),
            }
        } else {
            Some(rx.recv().unwrap_or(Command::Quit))
        };

        match cmd {
            Some(cmd) => {
                if !lp.apply(cmd) {
                    shared.publish(&lp);
                    logger::info_p("session", "acquisition thread exiting");
                    return;
                }
            }
            None => {
                next_cycle = Instant::now() + lp.frame_period();
                lp.cycle();
            }
        }
        shared.publish(&lp);
    }
}

impl LoopHandle {
    pub fn snapshot(&self) -> LoopSnapshot {
        match self.shared.snapshot.lock() {
            Ok(s) => s.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn start(&self, config: SessionConfig) -> Result<(), SessionError> {
        if self.snapshot().state != LoopState::Idle {
            return Err(SessionError::AlreadyRunning);
        }
        self.send(Command::Start(config))
    }

    /// Ask the loop to stop without waiting for it.
    pub fn request_stop(&self) {
        if let Ok(mut snap) = self.shared.snapshot.lock() {
            if snap.state == LoopState::Running {
                snap.state = LoopState::Stopping;
            }
        }
        if self.send(Command::Stop).is_err() {
            logger::warn_p("session", "stop requested but the acquisition thread is gone");
        }
    }

    /// Stop and wait until the loop is Idle. No capture happens afterwards.
    pub fn stop(&self) {
        self.request_stop();
        let Ok(mut snap) = self.shared.snapshot.lock() else { return };
        while snap.state != LoopState::Idle {
            if self.thread.as_ref().map_or(true, JoinHandle::is_finished) {
                return;
            }
            snap = match self.shared.changed.wait_timeout(snap, IDLE_PERIOD) {
                Ok((s, _)) => s,
                Err(_) => return,
            };
        }
    }

    pub fn set_output_dir(&self, dir: PathBuf) -> Result<(), SessionError> {
        if self.snapshot().state != LoopState::Idle {
            return Err(SessionError::Busy);
        }
        self.send(Command::SetOutputDir(dir))
    }

    /// Stop any session and join the thread.
    pub fn shutdown(mut self) {
        self.quit();
    }

    fn quit(&mut self) {
        let Some(thread) = self.thread.take() else { return };
        self.send(Command::Quit).ok();
        if thread.join().is_err() {
            logger::error_p("session", "acquisition thread panicked");
        }
    }

    fn send(&self, cmd: Command) -> Result<(), SessionError> {
        self.tx.send(cmd).map_err(|_| SessionError::Disconnected)
    }
}

impl Drop for LoopHandle {
    fn drop(&mut self) {
        self.quit();
    }
}
