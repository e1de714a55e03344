use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use sblive::{CacheCodec, SbliveConfig};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SBLIVE_CONFIG",
        "SBLIVE_CAMERA_DEVICE",
        "SBLIVE_CACHE_PATH",
        "SBLIVE_CACHE_CODEC",
        "SBLIVE_HELPER_CMD",
        "SBLIVE_TICK_MS",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "camera": {
                "device": "2",
                "width": 640,
                "height": 480,
                "buffer_frames": 3,
                "read_timeout_ms": 50
            },
            "cache": {
                "path": "booth/replay.mov",
                "codec": "raw",
                "fps": 15,
                "width": 640,
                "height": 480
            },
            "helper": {
                "enabled": true,
                "command": ["python3", "booth/server.py"]
            },
            "tick_interval_ms": 40,
            "reopen_backoff_ms": 250,
            "window_title": "Court 3"
        }"#,
    );

    std::env::set_var("SBLIVE_CONFIG", file.path());
    std::env::set_var("SBLIVE_CAMERA_DEVICE", "stub://court3");
    std::env::set_var("SBLIVE_HELPER_CMD", "python3 booth/server.py --quiet");
    std::env::set_var("SBLIVE_TICK_MS", "20");

    let cfg = SbliveConfig::load(None).expect("load config");

    assert_eq!(cfg.camera.device, "stub://court3");
    assert_eq!((cfg.camera.width, cfg.camera.height), (640, 480));
    assert_eq!(cfg.camera.buffer_frames, 3);
    assert_eq!(cfg.camera.read_timeout, Duration::from_millis(50));
    assert_eq!(cfg.cache.path, PathBuf::from("booth/replay.mov"));
    assert_eq!(cfg.cache.codec, CacheCodec::Raw);
    assert_eq!(cfg.cache.fps, 15);
    assert_eq!(
        cfg.helper.command,
        vec!["python3", "booth/server.py", "--quiet"]
    );
    assert_eq!(cfg.tick_interval, Duration::from_millis(20));
    assert_eq!(cfg.reopen_backoff, Duration::from_millis(250));
    assert_eq!(cfg.window_title, "Court 3");

    clear_env();
}

#[test]
fn explicit_path_wins_over_env_path() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let env_file = write_config(r#"{"window_title": "from env"}"#);
    let cli_file = write_config(r#"{"window_title": "from cli"}"#);
    std::env::set_var("SBLIVE_CONFIG", env_file.path());

    let cfg = SbliveConfig::load(Some(cli_file.path())).expect("load config");
    assert_eq!(cfg.window_title, "from cli");

    clear_env();
}

#[test]
fn defaults_without_any_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = SbliveConfig::load(None).expect("load config");
    assert_eq!(cfg.camera.device, "0");
    assert_eq!(cfg.cache.path, PathBuf::from(sblive::DEFAULT_CACHE_PATH));
    assert_eq!(cfg.tick_interval, Duration::from_millis(sblive::DEFAULT_TICK_MS));
    assert!(cfg.helper.enabled);
    assert_eq!(cfg.output_dir, PathBuf::from("./"));

    let cfg = cfg.with_output_dir("snapshots");
    assert_eq!(cfg.output_dir, PathBuf::from("snapshots"));
}

#[test]
fn rejects_bad_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SBLIVE_TICK_MS", "fast");
    assert!(SbliveConfig::load(None).is_err());
    clear_env();

    std::env::set_var("SBLIVE_TICK_MS", "0");
    assert!(SbliveConfig::load(None).is_err());
    clear_env();

    std::env::set_var("SBLIVE_CACHE_CODEC", "h264");
    assert!(SbliveConfig::load(None).is_err());
    clear_env();
}

#[test]
fn rejects_missing_or_malformed_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let missing = std::env::temp_dir().join("sblive-config-that-does-not-exist.json");
    let err = SbliveConfig::load(Some(&missing)).unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));

    let file = write_config("{ not json");
    let err = SbliveConfig::load(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("invalid config file"));
}
