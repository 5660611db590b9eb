use std::collections::HashMap;

use super::*;

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn defaults_apply_without_file_or_env() {
    let settings = load_settings_from(None, env_from(&[])).expect("settings");
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.voting_config(), VotingConfig::default());
}

#[test]
fn file_values_override_defaults() {
    let raw = r#"
database_url = "sqlite://./votes.db"
auth_mode = "name_only"
session_id_style = "uuid"
max_image_bytes = 1024
"#;
    let settings = load_settings_from(Some(raw), env_from(&[])).expect("settings");
    assert_eq!(settings.database_url, "sqlite://./votes.db");
    assert_eq!(settings.auth_mode, AuthMode::NameOnly);
    assert_eq!(settings.session_id_style, SessionIdStyle::Uuid);
    assert_eq!(settings.max_image_bytes, 1024);
    assert_eq!(settings.log_filter, "info");
}

#[test]
fn environment_overrides_file() {
    let raw = "database_url = \"sqlite://./file.db\"\nauth_mode = \"name_only\"\n";
    let settings = load_settings_from(
        Some(raw),
        env_from(&[
            ("DATABASE_URL", "sqlite://./generic.db"),
            ("PICVOTE_DATABASE_URL", "sqlite://./env.db"),
            ("PICVOTE_AUTH_MODE", "Credentialed"),
            ("PICVOTE_SESSION_ID_STYLE", "short-code"),
            ("PICVOTE_MAX_CONNECTIONS", "2"),
            ("PICVOTE_LOG", "voting=debug"),
        ]),
    )
    .expect("settings");

    assert_eq!(settings.database_url, "sqlite://./env.db");
    assert_eq!(settings.auth_mode, AuthMode::Credentialed);
    assert_eq!(settings.session_id_style, SessionIdStyle::ShortCode);
    assert_eq!(settings.max_connections, 2);
    assert_eq!(settings.log_filter, "voting=debug");
}

#[test]
fn unknown_keys_and_bad_values_are_rejected() {
    assert!(load_settings_from(Some("bind_addr = \"0.0.0.0:80\""), env_from(&[])).is_err());
    assert!(load_settings_from(None, env_from(&[("PICVOTE_AUTH_MODE", "open")])).is_err());
    assert!(load_settings_from(None, env_from(&[("PICVOTE_MAX_IMAGE_BYTES", "lots")])).is_err());
    assert!(load_settings_from(None, env_from(&[("PICVOTE_MAX_CONNECTIONS", "0")])).is_err());
}

#[test]
fn missing_explicit_config_file_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("absent.toml");
    assert!(load_settings(Some(missing.as_path())).is_err());
}

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
    assert_eq!(normalize_database_url("sqlite:votes.db"), "sqlite://votes.db");
    assert_eq!(normalize_database_url("  "), Settings::default().database_url);
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
}

#[test]
fn windows_paths_keep_a_single_sqlite_colon() {
    assert_eq!(
        normalize_database_url("C:\\Users\\alice\\votes.db"),
        "sqlite:C:/Users/alice/votes.db"
    );
    assert_eq!(
        normalize_database_url("sqlite://C:/Users/alice/votes.db"),
        "sqlite:C:/Users/alice/votes.db"
    );
}

#[test]
fn normalizing_does_not_touch_the_filesystem() {
    let dir = tempfile::tempdir().expect("tempdir");
    let nested = dir.path().join("nested");

    normalize_database_url(nested.join("picvote.db").to_string_lossy().as_ref());
    assert!(!nested.exists());
}

#[tokio::test]
async fn normalized_plain_path_opens_in_a_new_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("nested").join("picvote.db");

    let database_url = normalize_database_url(db_path.to_string_lossy().as_ref());
    let storage = storage::Storage::new(&database_url).await.expect("open sqlite");
    drop(storage);
    assert!(db_path.exists(), "missing {}", db_path.display());
}
