//! Integration tests for configuration management
//!
//! These tests verify that configuration files are created, loaded,
//! and edited correctly, and that their values reach a sync session.

use std::thread;
use tempfile::TempDir;

use shelfsync::{Config, Credential, PullOptions, SyncClient, SyncServer};

#[test]
fn test_config_creation_and_loading() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("shelfsync").join("config.toml");

    let config = Config::init(Some(&path)).unwrap();
    let loaded = Config::load(Some(&path)).unwrap();

    assert_eq!(config.port, loaded.port);
    assert_eq!(config.exclude_patterns, loaded.exclude_patterns);
}

#[test]
fn test_config_edits_survive_save() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");

    let mut config = Config::init(Some(&path)).unwrap();
    config.port = 4321;
    config.strict = true;
    config.exclude_paths.push("drafts".to_string());
    config.save().unwrap();

    let reloaded = Config::load(Some(&path)).unwrap();
    assert_eq!(reloaded.port, 4321);
    assert!(reloaded.strict);
    assert_eq!(reloaded.exclude_paths, vec!["drafts".to_string()]);
}

#[test]
fn test_config_serialization() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    Config::init(Some(&path)).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();

    // Should be valid TOML
    assert!(content.contains("port"));
    assert!(content.contains("exclude_patterns"));
    let _parsed: toml::Value = toml::from_str(&content).unwrap();
}

#[test]
fn test_config_invalid_toml_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "port = \"not a number\"").unwrap();

    assert!(Config::load(Some(&path)).is_err());
}

#[test]
fn test_config_exclusions_drive_a_pull() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    let mut config = Config::init(Some(&path)).unwrap();
    config.exclude_paths.push("drafts".to_string());
    config.save().unwrap();
    let config = Config::load(Some(&path)).unwrap();

    let server_dir = temp_dir.path().join("server");
    std::fs::create_dir_all(server_dir.join("drafts")).unwrap();
    std::fs::write(server_dir.join("drafts/wip.md"), "draft").unwrap();
    std::fs::write(server_dir.join(".DS_Store"), "junk").unwrap();
    std::fs::write(server_dir.join("book.md"), "final").unwrap();

    let server = SyncServer::bind("127.0.0.1:0", Credential::with_iterations("pw", 32)).unwrap();
    let addr = server.local_addr().unwrap();
    let root = server_dir.clone();
    let serving = thread::spawn(move || server.start(&root));

    let options = PullOptions {
        exclude_paths: config.exclude_paths,
        exclude_patterns: config.exclude_patterns,
        strict: config.strict,
    };
    let client_dir = temp_dir.path().join("client");
    let report = SyncClient::new(Credential::with_iterations("pw", 32))
        .start(&client_dir, addr, &options)
        .unwrap();
    serving.join().unwrap().unwrap();

    assert_eq!(report.received, vec!["book.md".to_string()]);
    assert_eq!(report.excluded, 2);
    assert!(!client_dir.join("drafts").exists());
}
