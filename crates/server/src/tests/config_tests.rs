use super::{load_settings_from, normalize_database_url, prepare_database_url, with_port, Settings};

use std::{fs, time::Duration};

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
}

#[test]
fn keeps_memory_and_explicit_urls() {
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
    assert_eq!(
        normalize_database_url("sqlite://./data/x.db"),
        "sqlite://./data/x.db"
    );
    assert_eq!(
        normalize_database_url("sqlite:data\\x.db"),
        "sqlite://data/x.db"
    );
}

#[test]
fn empty_database_url_falls_back_to_default() {
    assert_eq!(
        normalize_database_url("   "),
        Settings::default().database_url
    );
}

#[test]
fn creates_parent_dir_for_sqlite_url() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("data").join("test.db");

    prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare db url");
    assert!(temp_root.path().join("data").exists());
}

#[tokio::test]
async fn prepared_database_url_creates_openable_sqlite_file() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("server.db");

    let prepared = prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare");
    let storage = storage::Storage::new(&prepared).await.expect("open sqlite");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should be created: {}",
        db_path.display()
    );
}

#[test]
fn missing_config_file_yields_defaults() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let settings = load_settings_from(&temp_root.path().join("absent.toml")).expect("settings");
    assert_eq!(settings.capture_timeout_secs, 30);
    assert!(settings.seed_filters);
    assert_eq!(settings.capture_timeout(), Some(Duration::from_secs(30)));
}

#[test]
fn config_file_overrides_defaults_and_accepts_legacy_bind_key() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let path = temp_root.path().join("server.toml");
    fs::write(
        &path,
        r#"
bind_addr = "0.0.0.0:4000"
media_dir = "/var/photozone/uploads"
capture_timeout_secs = 0
cors_origins = ["http://kiosk.local"]
"#,
    )
    .expect("write config");

    let settings = load_settings_from(&path).expect("settings");
    assert_eq!(settings.server_bind, "0.0.0.0:4000");
    assert_eq!(settings.media_dir.to_string_lossy(), "/var/photozone/uploads");
    assert_eq!(settings.capture_timeout(), None);
    assert_eq!(settings.cors_origins, vec!["http://kiosk.local".to_string()]);
    assert_eq!(settings.log_filter, "info");
}

#[test]
fn port_override_keeps_bind_host() {
    assert_eq!(with_port("127.0.0.1:3002", "8080"), "127.0.0.1:8080");
    assert_eq!(with_port("localhost", "8080"), "0.0.0.0:8080");
}
