//! External decoder invocation with incremental artifact reporting.
//!
//! The decoder may need many frames of a multi-frame transmission before it
//! writes a file, so a successful run with no new artifact is still a
//! success. The set of artifacts already seen belongs to the dispatcher and
//! only grows, until the output directory is changed.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use image::{ImageFormat, RgbImage};

use crate::error::DispatchError;
use crate::logger;
use crate::types::DecodeOutcome;

pub struct Dispatcher {
    decoder: PathBuf,
    output_dir: PathBuf,
    known_artifacts: BTreeSet<String>,
    last_dispatch: Option<Instant>,
}

impl Dispatcher {
    /// Check the decoder once and prepare the output directory.
    pub fn new(decoder: &Path, output_dir: &Path) -> Result<Self, DispatchError> {
        let decoder = check_decoder(decoder)?;
        fs::create_dir_all(output_dir)?;
        logger::register_prefix("dispatch", logger::COLOR_BLUE);
        Ok(Self {
            decoder,
            output_dir: output_dir.to_path_buf(),
            known_artifacts: list_artifacts(output_dir),
            last_dispatch: None,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn known_artifacts(&self) -> &BTreeSet<String> {
        &self.known_artifacts
    }

    pub fn last_dispatch(&self) -> Option<Instant> {
        self.last_dispatch
    }

    /// Whether more than `interval` has passed since the last dispatch.
    pub fn is_due(&self, interval: Duration) -> bool {
        self.last_dispatch.map_or(true, |t| t.elapsed() > interval)
    }

    /// Re-point the dispatcher. The artifact set restarts from the new directory's contents.
    pub fn set_output_dir(&mut self, dir: &Path) -> Result<(), DispatchError> {
        fs::create_dir_all(dir)?;
        self.output_dir = dir.to_path_buf();
        self.known_artifacts = list_artifacts(dir);
        logger::info_p("dispatch", &format!("output directory set to {}", dir.display()));
        Ok(())
    }

    /// Decode an in-memory image through a scratch PNG that is always removed.
    pub fn dispatch(&mut self, image: &RgbImage) -> DecodeOutcome {
        self.last_dispatch = Some(Instant::now());
        let result = self.run_scratch(image);
        self.classify(result)
    }

    /// Decode an existing image file as is.
    pub fn dispatch_file(&mut self, path: &Path) -> DecodeOutcome {
        self.last_dispatch = Some(Instant::now());
        let result = self.invoke(path);
        self.classify(result)
    }

    fn run_scratch(&self, image: &RgbImage) -> Result<(), DispatchError> {
        let mut scratch = tempfile::Builder::new()
            .prefix("cimbar_roi_")
            .suffix(".png")
            .tempfile()?;
        // Early returns drop `scratch`, which deletes the file
        image.write_to(scratch.as_file_mut(), ImageFormat::Png)?;
        let result = self.invoke(scratch.path());
        if let Err(e) = scratch.close() {
            logger::warn_p("dispatch", &format!("failed to remove scratch image: {}", e));
        }
        result
    }

    fn invoke(&self, input: &Path) -> Result<(), DispatchError> {
        let output = Command::new(&self.decoder)
            .arg(input)
            .arg("-o")
            .arg(&self.output_dir)
            .arg("--no-deskew")
            .output()?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if stderr.trim().is_empty() {
            return Err(DispatchError::DecodeFailed(format!("decoder exited with {}", output.status)));
        }
        Err(DispatchError::DecodeFailed(stderr))
    }

    fn classify(&mut self, result: Result<(), DispatchError>) -> DecodeOutcome {
        match result {
            Ok(()) => {
                let new_artifacts = self.refresh_artifacts();
                let message = if new_artifacts.is_empty() {
                    "decoded, awaiting more data".to_string()
                } else {
                    let names: Vec<&str> = new_artifacts.iter().map(String::as_str).collect();
                    format!("decoded, new file(s): {}", names.join(", "))
                };
                DecodeOutcome { success: true, new_artifacts, message }
            }
            Err(DispatchError::DecodeFailed(msg)) => DecodeOutcome::failed(msg),
            Err(e) => DecodeOutcome::failed(format!("decoder error: {}", e)),
        }
    }

    /// Diff the output directory against the known set, then merge it in.
    fn refresh_artifacts(&mut self) -> BTreeSet<String> {
        let current = list_artifacts(&self.output_dir);
        let new: BTreeSet<String> = current.difference(&self.known_artifacts).cloned().collect();
        self.known_artifacts.extend(current);
        new
    }
}

/// Resolve and validate the decoder executable.
pub fn check_decoder(path: &Path) -> Result<PathBuf, DispatchError> {
    let exe = if cfg!(windows) && path.extension().is_none() {
        path.with_extension("exe")
    } else {
        path.to_path_buf()
    };

    let meta = fs::metadata(&exe).map_err(|_| DispatchError::ProcessNotFound(exe.clone()))?;
    if !meta.is_file() {
        return Err(DispatchError::ProcessNotExecutable(exe));
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o111 == 0 {
            return Err(DispatchError::ProcessNotExecutable(exe));
        }
    }
    Ok(exe)
}

fn list_artifacts(dir: &Path) -> BTreeSet<String> {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(e) => {
            logger::warn_p("dispatch", &format!("cannot list {}: {}", dir.display(), e));
            BTreeSet::new()
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::Rgb;
    use tempfile::TempDir;

    /// Write an executable shell script acting as the decoder.
    #[cfg(unix)]
    pub(crate) fn fake_decoder(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-cimbar");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Decoder that writes one file per invocation into `-o DIR`, named by a counter.
    #[cfg(unix)]
    pub(crate) const EMIT_ONE: &str = r#"out="$3"; n=$(( $(ls "$out" | wc -l) )); echo data > "$out/part_$n.bin""#;

    fn image() -> RgbImage {
        RgbImage::from_pixel(32, 32, Rgb([10, 200, 30]))
    }

    #[test]
    fn missing_decoder_is_process_not_found() {
        let out = TempDir::new().unwrap();
        let err = Dispatcher::new(Path::new("/nonexistent/cimbar"), out.path()).err().unwrap();
        assert!(matches!(err, DispatchError::ProcessNotFound(_)));
    }

    #[cfg(unix)]
    #[test]
    fn directory_is_not_executable() {
        let dir = TempDir::new().unwrap();
        let err = check_decoder(dir.path()).unwrap_err();
        assert!(matches!(err, DispatchError::ProcessNotExecutable(_)));
    }

    #[cfg(unix)]
    #[test]
    fn file_without_exec_bit_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cimbar");
        fs::write(&path, "").unwrap();
        assert!(matches!(check_decoder(&path), Err(DispatchError::ProcessNotExecutable(_))));
    }

    #[cfg(unix)]
    #[test]
    fn single_frame_code_yields_one_artifact() {
        let bin = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let mut d = Dispatcher::new(&fake_decoder(bin.path(), EMIT_ONE), out.path()).unwrap();

        let outcome = d.dispatch(&image());
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.new_artifacts.len(), 1);
        assert!(outcome.new_artifacts.contains("part_0.bin"));
        assert!(d.last_dispatch().is_some());
    }

    #[cfg(unix)]
    #[test]
    fn repeated_dispatch_without_output_is_empty() {
        let bin = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        fs::write(out.path().join("old.bin"), "x").unwrap();
        let mut d = Dispatcher::new(&fake_decoder(bin.path(), "exit 0"), out.path()).unwrap();

        let first = d.dispatch(&image());
        let second = d.dispatch(&image());
        assert!(first.success && second.success);
        assert!(first.new_artifacts.is_empty(), "pre-existing files are not new");
        assert!(second.new_artifacts.is_empty());
        assert_eq!(second.message, "decoded, awaiting more data");
    }

    #[cfg(unix)]
    #[test]
    fn known_artifacts_only_grow() {
        let bin = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let mut d = Dispatcher::new(&fake_decoder(bin.path(), EMIT_ONE), out.path()).unwrap();

        let mut previous = d.known_artifacts().clone();
        for i in 0..3 {
            d.dispatch(&image());
            assert!(d.known_artifacts().is_superset(&previous));
            previous = d.known_artifacts().clone();
            if i == 1 {
                // Files removed behind the dispatcher's back stay known
                fs::remove_file(out.path().join("part_0.bin")).unwrap();
            }
        }
        assert!(previous.contains("part_0.bin"));
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_surfaces_stderr() {
        let bin = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let mut d = Dispatcher::new(&fake_decoder(bin.path(), "echo 'bad frame' >&2; exit 3"), out.path()).unwrap();

        let outcome = d.dispatch(&image());
        assert!(!outcome.success);
        assert!(outcome.new_artifacts.is_empty());
        assert_eq!(outcome.message.trim_end(), "bad frame");
    }

    #[cfg(unix)]
    #[test]
    fn decoder_receives_fixed_arguments_and_scratch_is_removed() {
        let bin = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let log = bin.path().join("args.txt");
        let body = format!(r#"echo "$@" > {}; test -s "$1""#, log.display());
        let mut d = Dispatcher::new(&fake_decoder(bin.path(), &body), out.path()).unwrap();

        assert!(d.dispatch(&image()).success);
        let args = fs::read_to_string(&log).unwrap();
        let parts: Vec<&str> = args.split_whitespace().collect();
        assert_eq!(parts.len(), 4);
        assert!(parts[0].ends_with(".png"));
        assert_eq!(parts[1], "-o");
        assert_eq!(Path::new(parts[2]), out.path());
        assert_eq!(parts[3], "--no-deskew");
        assert!(!Path::new(parts[0]).exists(), "scratch image must be deleted");
    }

    #[cfg(unix)]
    #[test]
    fn changing_output_dir_resets_known_set() {
        let bin = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        fs::write(other.path().join("a.bin"), "x").unwrap();
        let mut d = Dispatcher::new(&fake_decoder(bin.path(), EMIT_ONE), out.path()).unwrap();
        d.dispatch(&image());
        assert!(d.known_artifacts().contains("part_0.bin"));

        d.set_output_dir(other.path()).unwrap();
        let names: Vec<&str> = d.known_artifacts().iter().map(String::as_str).collect();
        assert_eq!(names, ["a.bin"]);
    }

    #[cfg(unix)]
    #[test]
    fn interval_gates_dispatch() {
        let bin = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let mut d = Dispatcher::new(&fake_decoder(bin.path(), "exit 0"), out.path()).unwrap();
        assert!(d.is_due(Duration::from_secs(60)));
        d.dispatch(&image());
        assert!(!d.is_due(Duration::from_secs(60)));
        assert!(d.is_due(Duration::ZERO));
    }
}
