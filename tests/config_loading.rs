use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use dwell_watch::config::{VideoSource, WatchConfig};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "DWELL_CONFIG",
        "DWELL_VIDEO_SOURCE",
        "DWELL_LOG_PATH",
        "DWELL_SNAPSHOT_DIR",
        "DWELL_SMTP_RELAY",
        "DWELL_FORGOTTEN_TIME",
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
            "min_area": 5000,
            "forgotten_time": 30,
            "video_source": 0,
            "target_objects": ["backpack", "suitcase", "handbag"],
            "email_notify": "guard@example.org",
            "telegram_token": "123:abc",
            "telegram_chat_id": "-1001",
            "match_radius": 8,
            "idle_eviction_secs": 600,
            "detector": { "script_path": "script.json" }
        }"#,
    );

    std::env::set_var("DWELL_CONFIG", file.path());
    std::env::set_var("DWELL_VIDEO_SOURCE", "stub://lobby?frames=10");
    std::env::set_var("DWELL_FORGOTTEN_TIME", "45");
    std::env::set_var("DWELL_SMTP_RELAY", "mail.local:2525");
    std::env::set_var("DWELL_SNAPSHOT_DIR", "/var/lib/dwell/snapshots");

    let cfg = WatchConfig::load().expect("load config");

    assert_eq!(cfg.min_area, 5000);
    assert_eq!(cfg.forgotten_time, Duration::from_secs(45));
    assert_eq!(
        cfg.video_source,
        VideoSource::Path("stub://lobby?frames=10".into())
    );
    assert_eq!(cfg.target_objects, vec!["backpack", "suitcase", "handbag"]);
    let email = cfg.email.expect("email enabled");
    assert_eq!(email.address, "guard@example.org");
    assert_eq!(email.relay, "mail.local:2525");
    let telegram = cfg.telegram.expect("telegram enabled");
    assert_eq!(telegram.chat_id, "-1001");
    assert_eq!(cfg.match_radius, Some(8));
    assert_eq!(cfg.idle_eviction, Some(Duration::from_secs(600)));
    assert_eq!(cfg.log_path, PathBuf::from("detections.log"));
    assert_eq!(cfg.snapshot_dir, PathBuf::from("/var/lib/dwell/snapshots"));
    assert_eq!(cfg.detector.script_path, Some(PathBuf::from("script.json")));
    assert!(cfg.background_dispatch);

    clear_env();
}

#[test]
fn missing_core_field_is_fatal() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(r#"{ "min_area": 500, "video_source": 0 }"#);
    let err = WatchConfig::load_from(file.path()).expect_err("forgotten_time missing");
    assert!(err.to_string().contains("forgotten_time"));
}

#[test]
fn partial_telegram_settings_disable_only_telegram() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "min_area": 0,
            "forgotten_time": 10,
            "video_source": "clip.mp4",
            "target_objects": ["backpack"],
            "email_notify": "guard@example.org",
            "telegram_token": "123:abc"
        }"#,
    );
    let cfg = WatchConfig::load_from(file.path()).expect("load config");
    assert!(cfg.telegram.is_none());
    assert!(cfg.email.is_some());
    assert_eq!(cfg.video_source, VideoSource::Path("clip.mp4".into()));
}

#[test]
fn invalid_env_override_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(r#"{ "min_area": 1, "forgotten_time": 10, "video_source": 0 }"#);
    std::env::set_var("DWELL_FORGOTTEN_TIME", "soon");
    assert!(WatchConfig::load_from(file.path()).is_err());
    clear_env();
}

#[test]
fn blank_env_overrides_are_ignored() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(r#"{ "min_area": 1, "forgotten_time": 10, "video_source": 0 }"#);
    std::env::set_var("DWELL_FORGOTTEN_TIME", "  ");
    std::env::set_var("DWELL_LOG_PATH", "");
    let cfg = WatchConfig::load_from(file.path()).expect("load config");
    assert_eq!(cfg.forgotten_time, Duration::from_secs(10));
    assert_eq!(cfg.log_path, PathBuf::from("detections.log"));
    clear_env();
}

#[test]
fn out_of_range_threshold_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{ "min_area": 1, "forgotten_time": 10, "video_source": 0, "confidence_threshold": 1.5 }"#,
    );
    let err = WatchConfig::load_from(file.path()).expect_err("threshold");
    assert!(err.to_string().contains("confidence_threshold"));
}
