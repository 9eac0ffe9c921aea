use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn circdeploy_bin() -> String {
    env!("CARGO_BIN_EXE_circdeploy").to_string()
}

fn setup_test_dir() -> (TempDir, TempDir) {
    let source = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();

    // Looks enough like a board for the banner
    fs::write(
        dest.path().join("boot_out.txt"),
        "Adafruit CircuitPython 8.2.6 on 2023-09-12; Raspberry Pi Pico with rp2040\nBoard ID:raspberry_pi_pico\n",
    )
    .unwrap();

    (source, dest)
}

/// Runs against an explicit destination and a config file that does not exist,
/// so neither device detection nor the user's config can leak in.
fn deploy(source: &Path, dest: &Path, extra: &[&str]) -> Output {
    deploy_with_config(source, dest, &dest.join("no-such-config.toml"), extra)
}

fn deploy_with_config(source: &Path, dest: &Path, config: &Path, extra: &[&str]) -> Output {
    Command::new(circdeploy_bin())
        .args([
            "--src",
            source.to_str().unwrap(),
            "--dest",
            dest.to_str().unwrap(),
            "--config",
            config.to_str().unwrap(),
        ])
        .args(extra)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .env_remove("CIRCDEPLOY_CONFIG")
        .output()
        .unwrap()
}

#[test]
fn test_basic_deploy() {
    let (source, dest) = setup_test_dir();

    fs::write(source.path().join("code.py"), "print('hello')").unwrap();
    fs::write(source.path().join("compiled.pyc"), [0x42u8, 0x0d, 0x0d, 0x0a]).unwrap();

    let output = deploy(source.path(), dest.path(), &[]);

    assert!(output.status.success());
    assert_eq!(
        fs::read_to_string(dest.path().join("code.py")).unwrap(),
        "print('hello')"
    );
    assert!(dest.path().join("compiled.pyc").exists());
    // non-Python device files are never touched
    assert!(dest.path().join("boot_out.txt").exists());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("./code.py"));
    assert!(stdout.contains("running CircuitPython 8.2.6"));
}

#[test]
fn test_overwrites_changed_file() {
    let (source, dest) = setup_test_dir();

    fs::write(source.path().join("code.py"), "new").unwrap();
    fs::write(dest.path().join("code.py"), "old").unwrap();

    let output = deploy(source.path(), dest.path(), &[]);

    assert!(output.status.success());
    assert_eq!(fs::read_to_string(dest.path().join("code.py")).unwrap(), "new");
}

#[test]
fn test_only_python_files_copied() {
    let (source, dest) = setup_test_dir();

    fs::write(source.path().join("code.py"), "").unwrap();
    fs::write(source.path().join("notes.txt"), "").unwrap();
    fs::write(source.path().join("settings.toml"), "").unwrap();
    fs::create_dir(source.path().join(".venv")).unwrap();
    fs::write(source.path().join(".venv/site.py"), "").unwrap();

    let output = deploy(source.path(), dest.path(), &[]);

    assert!(output.status.success());
    assert!(dest.path().join("code.py").exists());
    assert!(!dest.path().join("notes.txt").exists());
    assert!(!dest.path().join("settings.toml").exists());
    assert!(!dest.path().join(".venv").exists());
}

#[test]
fn test_dry_run() {
    let (source, dest) = setup_test_dir();

    fs::write(source.path().join("code.py"), "content").unwrap();
    fs::write(dest.path().join("stale.py"), "").unwrap();

    let output = deploy(source.path(), dest.path(), &["--dry-run"]);

    assert!(output.status.success());
    assert!(!dest.path().join("code.py").exists());
    assert!(dest.path().join("stale.py").exists());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Dry-run"));
    assert!(stdout.contains("Would copy"));
    assert!(stdout.contains("./code.py"));
    assert!(stdout.contains("Would delete"));
    assert!(stdout.contains("./stale.py"));
}

#[test]
fn test_delete_stale_files() {
    let (source, dest) = setup_test_dir();

    fs::write(source.path().join("code.py"), "").unwrap();
    fs::write(dest.path().join("code.py"), "").unwrap();
    fs::write(dest.path().join("old.py"), "").unwrap();
    fs::create_dir(dest.path().join("sensors")).unwrap();
    fs::write(dest.path().join("sensors/bme280.py"), "").unwrap();

    let output = deploy(source.path(), dest.path(), &[]);

    assert!(output.status.success());
    assert!(dest.path().join("code.py").exists());
    assert!(!dest.path().join("old.py").exists());
    assert!(!dest.path().join("sensors/bme280.py").exists());
    // emptied directory is pruned
    assert!(!dest.path().join("sensors").exists());
}

#[test]
fn test_no_delete_keeps_stale_files() {
    let (source, dest) = setup_test_dir();

    fs::write(source.path().join("code.py"), "").unwrap();
    fs::write(dest.path().join("old.py"), "").unwrap();

    let output = deploy(source.path(), dest.path(), &["--no-delete"]);

    assert!(output.status.success());
    assert!(dest.path().join("code.py").exists());
    assert!(dest.path().join("old.py").exists());
}

#[test]
fn test_lib_directory_protected() {
    let (source, dest) = setup_test_dir();

    fs::create_dir(source.path().join("lib")).unwrap();
    fs::write(source.path().join("code.py"), "").unwrap();
    fs::write(source.path().join("lib/helper.py"), "").unwrap();

    fs::create_dir(dest.path().join("lib")).unwrap();
    fs::write(dest.path().join("lib/neopixel.py"), "driver").unwrap();
    fs::write(dest.path().join("lib/adafruit_ticks.mpy"), "").unwrap();

    let output = deploy(source.path(), dest.path(), &[]);

    assert!(output.status.success());
    assert_eq!(
        fs::read_to_string(dest.path().join("lib/neopixel.py")).unwrap(),
        "driver"
    );
    assert!(dest.path().join("lib/adafruit_ticks.mpy").exists());
    assert!(!dest.path().join("lib/helper.py").exists());
}

#[test]
fn test_gitignore_respected() {
    let (source, dest) = setup_test_dir();

    fs::create_dir(source.path().join("build")).unwrap();
    fs::write(source.path().join(".gitignore"), "secrets.py\nbuild/\n").unwrap();
    fs::write(source.path().join("code.py"), "").unwrap();
    fs::write(source.path().join("secrets.py"), "WIFI_PASSWORD = 'x'").unwrap();
    fs::write(source.path().join("build/out.py"), "").unwrap();

    let output = deploy(source.path(), dest.path(), &[]);

    assert!(output.status.success());
    assert!(dest.path().join("code.py").exists());
    assert!(!dest.path().join("secrets.py").exists());
    assert!(!dest.path().join("build").exists());
    assert!(!dest.path().join(".gitignore").exists());
}

#[test]
fn test_nested_gitignore_negation() {
    let (source, dest) = setup_test_dir();

    fs::create_dir(source.path().join("fonts")).unwrap();
    fs::write(source.path().join(".gitignore"), "*.pyc\n").unwrap();
    fs::write(source.path().join("fonts/.gitignore"), "!glyphs.pyc\n").unwrap();
    fs::write(source.path().join("cache.pyc"), "").unwrap();
    fs::write(source.path().join("fonts/glyphs.pyc"), "").unwrap();

    let output = deploy(source.path(), dest.path(), &[]);

    assert!(output.status.success());
    assert!(!dest.path().join("cache.pyc").exists());
    assert!(dest.path().join("fonts/glyphs.pyc").exists());
}

#[test]
fn test_no_gitignore_copies_everything() {
    let (source, dest) = setup_test_dir();

    fs::write(source.path().join(".gitignore"), "secrets.py\n").unwrap();
    fs::write(source.path().join("secrets.py"), "").unwrap();

    let output = deploy(source.path(), dest.path(), &["--no-gitignore"]);

    assert!(output.status.success());
    assert!(dest.path().join("secrets.py").exists());
}

#[test]
fn test_nested_directories() {
    let (source, dest) = setup_test_dir();

    fs::create_dir_all(source.path().join("app/drivers/i2c")).unwrap();
    fs::write(source.path().join("app/drivers/i2c/sensor.py"), "nested").unwrap();
    fs::write(source.path().join("app/__init__.py"), "").unwrap();

    let output = deploy(source.path(), dest.path(), &[]);

    assert!(output.status.success());
    assert_eq!(
        fs::read_to_string(dest.path().join("app/drivers/i2c/sensor.py")).unwrap(),
        "nested"
    );
    assert!(dest.path().join("app/__init__.py").exists());
}

#[test]
fn test_json_output() {
    let (source, dest) = setup_test_dir();

    fs::write(source.path().join("code.py"), "abc").unwrap();
    fs::write(dest.path().join("old.py"), "").unwrap();

    let output = deploy(source.path(), dest.path(), &["--json"]);

    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let events: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(events.first().unwrap()["type"], "start");
    assert!(events
        .iter()
        .any(|e| e["type"] == "copy" && e["path"] == "code.py"));
    assert!(events
        .iter()
        .any(|e| e["type"] == "delete" && e["path"] == "old.py"));

    let summary = events.last().unwrap();
    assert_eq!(summary["type"], "summary");
    assert_eq!(summary["files_copied"], 1);
    assert_eq!(summary["files_deleted"], 1);
    assert_eq!(summary["bytes_copied"], 3);
}

#[test]
fn test_quiet_mode() {
    let (source, dest) = setup_test_dir();

    fs::write(source.path().join("code.py"), "").unwrap();

    let output = deploy(source.path(), dest.path(), &["--quiet"]);

    assert!(output.status.success());
    assert!(dest.path().join("code.py").exists());
    assert!(output.stdout.is_empty());
}

#[test]
fn test_config_file_defaults() {
    let (source, dest) = setup_test_dir();
    let config_dir = TempDir::new().unwrap();
    let config = config_dir.path().join("config.toml");
    fs::write(&config, "delete = false\n").unwrap();

    fs::write(source.path().join("code.py"), "").unwrap();
    fs::write(dest.path().join("old.py"), "").unwrap();

    let output = Command::new(circdeploy_bin())
        .args([
            "--src",
            source.path().to_str().unwrap(),
            "--dest",
            dest.path().to_str().unwrap(),
        ])
        .env("CIRCDEPLOY_CONFIG", &config)
        .env("NO_COLOR", "1")
        .output()
        .unwrap();

    assert!(output.status.success());
    assert!(dest.path().join("old.py").exists());

    // flags beat the config file
    let output = deploy_with_config(source.path(), dest.path(), &config, &["--delete"]);
    assert!(output.status.success());
    assert!(!dest.path().join("old.py").exists());
}

#[test]
fn test_no_dry_run_beats_config_file() {
    let (source, dest) = setup_test_dir();
    let config_dir = TempDir::new().unwrap();
    let config = config_dir.path().join("config.toml");
    fs::write(&config, "dry_run = true
").unwrap();

    fs::write(source.path().join("code.py"), "").unwrap();

    let output = deploy_with_config(source.path(), dest.path(), &config, &[]);
    assert!(output.status.success());
    assert!(!dest.path().join("code.py").exists());

    let output = deploy_with_config(source.path(), dest.path(), &config, &["--no-dry-run"]);
    assert!(output.status.success());
    assert!(dest.path().join("code.py").exists());
}

#[test]
fn test_missing_source() {
    let (_source, dest) = setup_test_dir();
    let missing = dest.path().join("does-not-exist");

    let output = deploy(&missing, dest.path(), &[]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("does-not-exist"));
}

#[test]
fn test_missing_destination_touches_nothing() {
    let (source, dest) = setup_test_dir();
    fs::write(source.path().join("code.py"), "").unwrap();
    let missing = dest.path().join("not-mounted");

    let output = deploy(source.path(), &missing, &[]);

    assert!(!output.status.success());
    assert!(!missing.exists());
}

#[test]
fn test_overlapping_roots_rejected() {
    let (source, _dest) = setup_test_dir();
    fs::write(source.path().join("code.py"), "").unwrap();

    let output = deploy(source.path(), source.path(), &[]);

    assert!(!output.status.success());
    assert!(source.path().join("code.py").exists());
}

#[test]
fn test_help() {
    let output = Command::new(circdeploy_bin())
        .arg("--help")
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage"));
    assert!(stdout.contains("--no-delete"));
}
