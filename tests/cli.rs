use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn cimwatch(cwd: &Path) -> Command {
    let mut cmd = Command::cargo_bin("cimwatch").unwrap();
    cmd.current_dir(cwd);
    cmd
}

#[cfg(unix)]
fn fake_decoder(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join("fake-cimbar");
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[test]
fn a_mode_is_required() {
    let tmp = TempDir::new().unwrap();
    cimwatch(tmp.path()).assert().failure();
}

#[test]
fn modes_are_exclusive() {
    let tmp = TempDir::new().unwrap();
    cimwatch(tmp.path())
        .args(["--monitor", "1", "--list-displays"])
        .assert()
        .failure();
}

#[test]
fn missing_decoder_exits_with_one() {
    let tmp = TempDir::new().unwrap();
    cimwatch(tmp.path())
        .args(["--monitor", "1", "--stub", "--decoder-path", "/nonexistent/cimbar"])
        .arg("--output")
        .arg(tmp.path().join("out"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("decoder executable not found"));
}

#[test]
fn list_displays_on_stub_platform() {
    let tmp = TempDir::new().unwrap();
    cimwatch(tmp.path())
        .args(["--list-displays", "--stub"])
        .assert()
        .success()
        .stdout(predicate::str::contains("display 1 (1280x720)"))
        .stdout(predicate::str::contains("display 2 (640x480)"));
}

#[test]
fn list_windows_on_stub_platform() {
    let tmp = TempDir::new().unwrap();
    cimwatch(tmp.path())
        .args(["--list-windows", "--stub"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Stub Viewer"));
}

#[cfg(unix)]
#[test]
fn display_out_of_range_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let decoder = fake_decoder(tmp.path(), "exit 0");
    cimwatch(tmp.path())
        .args(["--monitor", "9", "--stub"])
        .arg("--cimbar")
        .arg(&decoder)
        .arg("--output")
        .arg(tmp.path().join("out"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("out of range"));
}

#[cfg(unix)]
#[test]
fn unknown_window_lists_alternatives() {
    let tmp = TempDir::new().unwrap();
    let decoder = fake_decoder(tmp.path(), "exit 0");
    cimwatch(tmp.path())
        .args(["--window", "Chrome", "--stub", "-c"])
        .arg(&decoder)
        .arg("-o")
        .arg(tmp.path().join("out"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no window matches \"Chrome\""))
        .stdout(predicate::str::contains("Stub Terminal"));
}

#[cfg(unix)]
#[test]
fn missing_image_exits_with_one() {
    let tmp = TempDir::new().unwrap();
    let decoder = fake_decoder(tmp.path(), "exit 0");
    cimwatch(tmp.path())
        .args(["--image", "/nonexistent/code.png", "-c"])
        .arg(&decoder)
        .arg("-o")
        .arg(tmp.path().join("out"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("image not found"));
}

#[cfg(unix)]
#[test]
fn image_with_code_region_is_decoded() {
    let tmp = TempDir::new().unwrap();
    let decoder = fake_decoder(tmp.path(), r#"echo data > "$3/payload.bin""#);
    let mut img = image::RgbImage::new(400, 400);
    for y in 100..300 {
        for x in 100..300 {
            img.put_pixel(x, y, image::Rgb([240, 240, 240]));
        }
    }
    let path = tmp.path().join("code.png");
    img.save(&path).unwrap();
    let out = tmp.path().join("out");

    cimwatch(tmp.path())
        .arg("--image")
        .arg(&path)
        .arg("-c")
        .arg(&decoder)
        .arg("-o")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("code region"))
        .stdout(predicate::str::contains("✓ decoded, new file(s): payload.bin"));
    assert!(out.join("payload.bin").is_file());
}

#[cfg(unix)]
#[test]
fn monitoring_ends_at_time_limit() {
    let tmp = TempDir::new().unwrap();
    let decoder = fake_decoder(tmp.path(), "exit 0");
    cimwatch(tmp.path())
        .args(["--monitor", "2", "--stub", "--time", "0.3", "-c"])
        .arg(&decoder)
        .arg("-o")
        .arg(tmp.path().join("out"))
        .assert()
        .success()
        .stdout(predicate::str::contains("capture area: 640x480"))
        .stdout(predicate::str::contains("time limit reached"));
    assert!(tmp.path().join("logs/cimwatch.log").is_file());
}

#[cfg(unix)]
#[test]
fn infinite_time_limit_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let decoder = fake_decoder(tmp.path(), "exit 0");
    cimwatch(tmp.path())
        .args(["--monitor", "2", "--stub", "--time", "inf", "-c"])
        .arg(&decoder)
        .arg("-o")
        .arg(tmp.path().join("out"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid time limit"));
}

#[cfg(unix)]
#[test]
fn huge_decode_interval_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let decoder = fake_decoder(tmp.path(), "exit 0");
    cimwatch(tmp.path())
        .args(["--monitor", "2", "--stub", "--time", "0.2", "--rate", "1e30", "-c"])
        .arg(&decoder)
        .arg("-o")
        .arg(tmp.path().join("out"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid decode interval"));
}
