use std::io::{self, Write};
use std::path::PathBuf;

use cimwatch_core::acquisition::FrontEnd;
use cimwatch_core::types::{Frame, LoopStatistics, StatusKind, StatusLine, StopReason};

/// Frames between two progress line refreshes.
const STATS_EVERY: u64 = 30;

/// Line-oriented front end for the monitor and window modes.
pub struct ConsoleFrontEnd<W: Write + Send = io::Stdout> {
    out: W,
    verbose: bool,
    output_dir: PathBuf,
    announced_size: bool,
    progress_open: bool,
}

impl ConsoleFrontEnd {
    pub fn new(verbose: bool, output_dir: PathBuf) -> Self {
        Self::with_writer(io::stdout(), verbose, output_dir)
    }
}

impl<W: Write + Send> ConsoleFrontEnd<W> {
    pub fn with_writer(out: W, verbose: bool, output_dir: PathBuf) -> Self {
        Self { out, verbose, output_dir, announced_size: false, progress_open: false }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Terminate a pending `\r` progress line before printing anything else.
    fn close_progress(&mut self) {
        if self.progress_open {
            writeln!(self.out).ok();
            self.progress_open = false;
        }
    }
}

impl<W: Write + Send> FrontEnd for ConsoleFrontEnd<W> {
    fn on_frame(&mut self, frame: &Frame) {
        if !self.announced_size {
            self.announced_size = true;
            writeln!(self.out, "capture area: {}x{}", frame.width(), frame.height()).ok();
        }
    }

    fn on_status(&mut self, status: &StatusLine) {
        let mark = match status.kind {
            StatusKind::Decoded => "✓",
            StatusKind::Error => "✗",
            StatusKind::DecodeFailed if self.verbose => "✗",
            StatusKind::Info if self.verbose => "·",
            _ => return,
        };
        self.close_progress();
        writeln!(self.out, "[{}] {} {}", status.at.format("%H:%M:%S"), mark, status.message.trim_end()).ok();
    }

    fn on_stats(&mut self, stats: &LoopStatistics) {
        if stats.frames_processed == 0 || stats.frames_processed % STATS_EVERY != 0 {
            return;
        }
        write!(
            self.out,
            "\rframes: {}, decodes: {}, fps: {:.1}",
            stats.frames_processed,
            stats.dispatches_attempted,
            stats.fps()
        )
        .ok();
        self.out.flush().ok();
        self.progress_open = true;
    }

    fn on_stopped(&mut self, reason: &StopReason, stats: &LoopStatistics) {
        self.close_progress();
        let secs = stats.elapsed().as_secs_f64();
        let summary = format!(
            "\n{}\n\nsummary:\n  duration: {:.1}s\n  frames processed: {}\n  decodes: {} ({} succeeded)\n  new files: {}\n  average fps: {:.1}\n\ndecoded files are in {}",
            reason,
            secs,
            stats.frames_processed,
            stats.dispatches_attempted,
            stats.dispatches_succeeded,
            stats.artifacts_found,
            stats.fps(),
            self.output_dir.display()
        );
        writeln!(self.out, "{}", summary).ok();
        self.out.flush().ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn console(verbose: bool) -> ConsoleFrontEnd<Vec<u8>> {
        ConsoleFrontEnd::with_writer(Vec::new(), verbose, PathBuf::from("/tmp/out"))
    }

    fn text(c: ConsoleFrontEnd<Vec<u8>>) -> String {
        String::from_utf8(c.into_inner()).unwrap()
    }

    #[test]
    fn failures_are_quiet_unless_verbose() {
        let mut quiet = console(false);
        quiet.on_status(&StatusLine::new(StatusKind::DecodeFailed, "no code"));
        quiet.on_status(&StatusLine::new(StatusKind::Decoded, "decoded, new file(s): a.bin"));
        let out = text(quiet);
        assert!(!out.contains("no code"));
        assert!(out.contains("✓ decoded, new file(s): a.bin"));

        let mut loud = console(true);
        loud.on_status(&StatusLine::new(StatusKind::DecodeFailed, "no code\n"));
        assert!(text(loud).trim_end().ends_with("✗ no code"));
    }

    #[test]
    fn progress_line_every_thirty_frames() {
        let mut c = console(false);
        let mut stats = LoopStatistics::default();
        for n in 1..=60 {
            stats.frames_processed = n;
            c.on_stats(&stats);
        }
        let out = text(c);
        assert_eq!(out.matches('\r').count(), 2);
        assert!(out.contains("frames: 60"));
    }

    #[test]
    fn status_after_progress_starts_on_a_new_line() {
        let mut c = console(false);
        let stats = LoopStatistics { frames_processed: 30, ..LoopStatistics::default() };
        c.on_stats(&stats);
        c.on_status(&StatusLine::new(StatusKind::Decoded, "decoded"));
        let out = text(c);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].ends_with("✓ decoded"));
    }

    #[test]
    fn summary_names_reason_and_output_dir() {
        let mut c = console(false);
        c.on_frame(&Frame::new(RgbImage::new(64, 48)));
        c.on_stopped(&StopReason::TimeLimit, &LoopStatistics::default());
        let out = text(c);
        assert!(out.starts_with("capture area: 64x48"));
        assert!(out.contains("time limit reached"));
        assert!(out.contains("decoded files are in /tmp/out"));
    }
}
