use super::*;
use std::time::{SystemTime, UNIX_EPOCH};

fn unique_temp_path(file_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    std::env::temp_dir().join(format!("install-guard-{nanos}-{file_name}"))
}

#[test]
fn missing_config_uses_defaults() {
    let path = unique_temp_path("missing-config.toml");
    let config =
        InstallGuardConfig::load_with_paths(Some(path), None).expect("default config");

    assert!(config.cache.enabled);
    assert_eq!(config.cache.ttl_minutes, DEFAULT_CACHE_TTL_MINUTES);
    assert!(config.deprecated.is_empty());
}

#[test]
fn parses_cache_and_deprecated_tables() {
    let path = unique_temp_path("config.toml");
    let raw = r#"
[cache]
enabled = false
ttl_minutes = 15

[deprecated]
"old-lib" = "use new-lib instead"
"@acme/legacy" = "moved to @acme/core"
"#;
    fs::write(&path, raw).expect("write config");

    let config =
        InstallGuardConfig::load_with_paths(Some(path.clone()), None).expect("parsed config");
    let _ = fs::remove_file(path);

    assert!(!config.cache.enabled);
    assert_eq!(config.cache.ttl_minutes, 15);
    assert_eq!(
        config.deprecated.get("old-lib").map(String::as_str),
        Some("use new-lib instead")
    );
    assert_eq!(
        config.deprecated.get("@acme/legacy").map(String::as_str),
        Some("moved to @acme/core")
    );
}

#[test]
fn zero_ttl_falls_back_to_default() {
    let path = unique_temp_path("zero-ttl.toml");
    fs::write(&path, "[cache]\nttl_minutes = 0\n").expect("write config");

    let config =
        InstallGuardConfig::load_with_paths(Some(path.clone()), None).expect("parsed config");
    let _ = fs::remove_file(path);

    assert_eq!(config.cache.ttl_minutes, DEFAULT_CACHE_TTL_MINUTES);
}

#[test]
fn project_config_overrides_global_values() {
    let global = unique_temp_path("global.toml");
    let project = unique_temp_path("project.toml");
    fs::write(
        &global,
        r#"
[cache]
ttl_minutes = 90

[deprecated]
"old-lib" = "global message"
"shared-lib" = "global only"
"#,
    )
    .expect("write global config");
    fs::write(
        &project,
        r#"
[cache]
enabled = false

[deprecated]
"old-lib" = "project message"
"#,
    )
    .expect("write project config");

    let config = InstallGuardConfig::load_with_paths(Some(global.clone()), Some(project.clone()))
        .expect("merged config");
    let _ = fs::remove_file(global);
    let _ = fs::remove_file(project);

    assert!(!config.cache.enabled);
    assert_eq!(config.cache.ttl_minutes, 90);
    assert_eq!(
        config.deprecated.get("old-lib").map(String::as_str),
        Some("project message")
    );
    assert_eq!(
        config.deprecated.get("shared-lib").map(String::as_str),
        Some("global only")
    );
}

#[test]
fn invalid_toml_is_an_error() {
    let path = unique_temp_path("invalid.toml");
    fs::write(&path, "[cache\nttl_minutes = 5").expect("write config");

    let err = InstallGuardConfig::load_with_paths(Some(path.clone()), None)
        .expect_err("invalid toml should fail");
    let _ = fs::remove_file(path);

    assert!(err.to_string().contains("failed to parse config file"));
}

#[test]
fn blank_deprecated_names_are_ignored() {
    let mut config = InstallGuardConfig::default();
    let overlay: ConfigOverlay =
        toml::from_str("[deprecated]\n\"  \" = \"nothing\"\n").expect("overlay");
    config.apply_overlay(overlay);
    assert!(config.deprecated.is_empty());
}
