//! Integration tests for ConfigManager layering and validation

use camino::Utf8PathBuf;
use gazeview::ConfigManager;
use gazeview::models::AppConfig;
use std::collections::HashMap;
use std::fs;
use tempfile::TempDir;

fn manager_with_env(vars: &[(&str, &str)]) -> (ConfigManager, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    let env: HashMap<String, String> = vars
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    let manager = ConfigManager::new(&dir).unwrap().with_environment(env);
    (manager, temp_dir)
}

#[test]
fn test_config_dir_created() {
    let temp_dir = TempDir::new().unwrap();
    let dir = Utf8PathBuf::try_from(temp_dir.path().join("nested").join("data")).unwrap();

    let manager = ConfigManager::new(&dir).unwrap();

    assert!(dir.exists());
    assert_eq!(manager.config_path(), dir.join("gazeview.yaml"));
}

#[test]
fn test_file_overrides_defaults() {
    let (manager, _temp_dir) = manager_with_env(&[]);
    fs::write(
        manager.config_path(),
        "camera:\n  index: 2\n  fps: 15\nlogging:\n  debug: true\n",
    )
    .unwrap();

    let config = manager.load().unwrap();

    assert_eq!(config.camera.index, 2);
    assert_eq!(config.camera.fps, 15);
    assert_eq!(config.camera.width, 640);
    assert!(config.logging.debug);
    assert_eq!(config.view, AppConfig::default().view);
}

#[test]
fn test_environment_overrides_file() {
    let (manager, _temp_dir) = manager_with_env(&[
        ("GAZEVIEW_CAMERA__INDEX", "5"),
        ("GAZEVIEW_DEMO__RUN_SECONDS", "1"),
        ("UNRELATED_CAMERA__INDEX", "9"),
    ]);
    fs::write(manager.config_path(), "camera:\n  index: 2\n").unwrap();

    let config = manager.load().unwrap();

    assert_eq!(config.camera.index, 5);
    assert_eq!(config.demo.run_seconds, 1);
}

#[test]
fn test_custom_env_prefix() {
    let (manager, _temp_dir) = manager_with_env(&[("VIEWER_VIEW__WIDTH", "800")]);
    let manager = manager.with_env_prefix("VIEWER");

    let config = manager.load().unwrap();

    assert_eq!(config.view.width, 800);
}

#[test]
fn test_invalid_values_rejected() {
    let (manager, _temp_dir) = manager_with_env(&[]);
    fs::write(manager.config_path(), "camera:\n  fps: 0\n").unwrap();

    let err = manager.load().unwrap_err();

    assert!(format!("{err:#}").contains("camera.fps must be greater than zero"));
}

#[test]
fn test_malformed_yaml_rejected() {
    let (manager, _temp_dir) = manager_with_env(&[]);
    fs::write(manager.config_path(), "camera: [not, a, map\n").unwrap();

    assert!(manager.load().is_err());
}

#[test]
fn test_saved_defaults_round_trip_through_file() {
    let (manager, _temp_dir) = manager_with_env(&[]);

    assert!(manager.ensure_default_config().unwrap());
    let contents = fs::read_to_string(manager.config_path()).unwrap();
    assert!(contents.contains("error_backoff_ms"));

    assert_eq!(manager.load().unwrap(), AppConfig::default());
}
