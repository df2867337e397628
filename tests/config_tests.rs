//! Configuration loading tests

use std::io::Write;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serial_test::serial;
use tempfile::{Builder, NamedTempFile};

use vsphere_inventory_cache::config::{Config, ConfigError, LogFormat};
use vsphere_inventory_cache::inventory::NodeKind;

fn config_file(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_yaml_overlay_keeps_unmentioned_defaults() {
    let file = config_file(
        ".yaml",
        r#"
vsphere:
  server: vc-lab
  url: https://vcenter.lab.example.com
cache:
  ttl:
    templates: 2h
"#,
    );

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.vsphere.server, "vc-lab");
    assert_eq!(config.cache.ttl.for_kind(NodeKind::Template), Duration::from_secs(7200));
    assert_eq!(config.vsphere.template_pattern, "template");
    assert_eq!(config.scheduler.max_concurrency, 2);
    assert_eq!(config.loader.sync_wait, Duration::from_secs(3));
}

#[test]
fn test_json_config() {
    let file = config_file(
        ".json",
        r#"{"logging": {"level": "debug", "format": "json"}, "api": {"bind_address": "0.0.0.0:9000"}}"#,
    );

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.api.bind_address, "0.0.0.0:9000");
}

#[test]
fn test_parse_error_names_the_file() {
    let file = config_file(".toml", "[cache\nttl =");
    let err = Config::from_file(file.path()).unwrap_err();
    match err {
        ConfigError::Parse { path, .. } => assert_eq!(path, file.path()),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
#[serial]
fn test_validation_runs_on_load() {
    let file = config_file(".toml", "[scheduler]\nmax_concurrency = 0\n");
    let err = Config::load(Some(file.path())).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "scheduler.max_concurrency"));
}

#[test]
#[serial]
fn test_environment_overrides_files() {
    let file = config_file(".toml", "[vsphere]\nserver = \"from-file\"\n");
    std::env::set_var("VSPHERE_CACHE_SERVER", "from-env");
    std::env::set_var("VSPHERE_CACHE_MAX_CONCURRENCY", "6");

    let loaded = Config::load(Some(file.path()));

    std::env::remove_var("VSPHERE_CACHE_SERVER");
    std::env::remove_var("VSPHERE_CACHE_MAX_CONCURRENCY");

    let config = loaded.unwrap();
    assert_eq!(config.vsphere.server, "from-env");
    assert_eq!(config.scheduler.max_concurrency, 6);
}

#[test]
fn test_server_name_must_be_a_single_segment() {
    let mut config = Config::default();
    config.vsphere.server = "vc01/prod".to_string();
    assert!(config.validate().is_err());
}
