use devbot::core::config::{BusCapacities, Config};
use devbot::core::diagnostics::BusCapacity;
use tempfile::TempDir;

#[test]
fn test_config_default() {
    let config = Config::default();
    assert!(config.install_crash_handler);
    assert!(config.crash_history_path.is_none());
    assert_eq!(config.buses.engine, BusCapacity::new(100, 1000));
    assert_eq!(config.log_monitor.command, "logcat");
    assert_eq!(config.thresholds.memory_threshold_mb, 300);
}

#[test]
fn test_config_load_does_not_fail() {
    // Picks up a real user config when one exists, which is fine
    let _config = Config::load();
}

#[test]
fn test_config_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");

    let config = Config {
        install_crash_handler: false,
        crash_history_path: Some(temp_dir.path().join("crashes.json")),
        buses: BusCapacities {
            crash: BusCapacity::new(1, 2),
            ..BusCapacities::default()
        },
        ..Config::default()
    };
    config.save_to(&path).unwrap();

    let loaded = Config::load_from(&path).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(
        loaded.crash_history_file(),
        Some(temp_dir.path().join("crashes.json"))
    );
}

#[test]
fn test_unknown_fields_are_ignored() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    std::fs::write(&path, r#"{"install_crash_handler": false, "legacy": 1}"#).unwrap();

    let config = Config::load_from(&path).unwrap();
    assert!(!config.install_crash_handler);
}
