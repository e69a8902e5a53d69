use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use favsync_core::SyncConfig;

#[test]
fn defaults_are_sensible() {
    let config = SyncConfig::default();
    assert_eq!(config.api_base_url, "http://localhost:5000/api");
    assert_eq!(config.storage_key, "favorites");
    assert_eq!(config.auth_token, None);
    assert_eq!(config.request_timeout(), Duration::from_secs(10));
    assert_eq!(config.mutation_timeout(), Duration::from_secs(15));
}

#[test]
fn env_overrides_replace_file_values() {
    let vars: HashMap<&str, &str> = [
        ("FAVSYNC_API_URL", "https://shop.example/api"),
        ("FAVSYNC_TOKEN", "abc"),
        ("FAVSYNC_STORAGE_DIR", "/tmp/favs"),
        ("FAVSYNC_MUTATION_TIMEOUT_SECS", "3"),
        ("FAVSYNC_REQUEST_TIMEOUT_SECS", "zero"),
    ]
    .into_iter()
    .collect();

    let mut config = SyncConfig::default();
    config.apply_env(|key| vars.get(key).map(|v| v.to_string()));

    assert_eq!(config.api_base_url, "https://shop.example/api");
    assert_eq!(config.auth_token.as_deref(), Some("abc"));
    assert_eq!(config.resolved_storage_dir(), PathBuf::from("/tmp/favs"));
    assert_eq!(config.mutation_timeout(), Duration::from_secs(3));
    assert_eq!(config.request_timeout(), Duration::from_secs(10), "invalid value ignored");
}

#[test]
fn blank_token_clears_credentials() {
    let mut config = SyncConfig {
        auth_token: Some("old".into()),
        ..SyncConfig::default()
    };
    config.apply_env(|key| (key == "FAVSYNC_TOKEN").then(|| "  ".to_string()));
    assert_eq!(config.auth_token, None);
}

#[test]
fn partial_file_keeps_defaults_for_missing_fields() {
    let mut path = std::env::temp_dir();
    path.push(format!(
        "favsync_config_{}.json",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    std::fs::write(&path, r#"{ "api_base_url": "http://api.test", "storage_key": "favs_u1" }"#).unwrap();

    let config = SyncConfig::from_file(&path);
    assert_eq!(config.api_base_url, "http://api.test");
    assert_eq!(config.storage_key, "favs_u1");
    assert_eq!(config.mutation_timeout_seconds, 15);

    config.save_to(&path).unwrap();
    assert_eq!(SyncConfig::from_file(&path), config);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn malformed_file_yields_defaults() {
    let mut path = std::env::temp_dir();
    path.push(format!(
        "favsync_bad_config_{}.json",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    std::fs::write(&path, "not json").unwrap();

    assert_eq!(SyncConfig::from_file(&path), SyncConfig::default());

    let _ = std::fs::remove_file(&path);
}
