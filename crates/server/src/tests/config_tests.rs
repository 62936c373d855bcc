use super::{normalize_database_url, resolve_settings, validate_admin_settings, Settings};

use std::collections::HashMap;

fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
}

#[test]
fn keeps_memory_and_full_urls() {
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
    assert_eq!(
        normalize_database_url("sqlite:///var/lib/shop.db"),
        "sqlite:///var/lib/shop.db"
    );
}

#[test]
fn empty_database_url_uses_default() {
    assert_eq!(
        normalize_database_url("   "),
        Settings::default().database_url
    );
}

#[test]
fn defaults_apply_without_sources() {
    let settings = resolve_settings(&HashMap::new(), &HashMap::new());
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.cache_max_age_seconds, 86_400);
}

#[test]
fn environment_overrides_file() {
    let file = map(&[
        ("bind_addr", "0.0.0.0:9000"),
        ("hero_title", "From file"),
        ("cache_max_age_seconds", "60"),
    ]);
    let env = map(&[
        ("SERVER_BIND", "0.0.0.0:7000"),
        ("APP__BIND_ADDR", "0.0.0.0:7001"),
        ("APP__CACHE_MAX_AGE_SECONDS", "120"),
    ]);

    let settings = resolve_settings(&file, &env);
    assert_eq!(settings.server_bind, "0.0.0.0:7001");
    assert_eq!(settings.hero_title, "From file");
    assert_eq!(settings.cache_max_age_seconds, 120);
}

#[test]
fn unparsable_numbers_keep_defaults() {
    let env = map(&[("APP__SESSION_TTL_SECONDS", "soon")]);
    let settings = resolve_settings(&HashMap::new(), &env);
    assert_eq!(
        settings.session_ttl_seconds,
        Settings::default().session_ttl_seconds
    );
}

#[test]
fn admin_stays_disabled_without_hash() {
    let settings = Settings::default();
    assert!(settings.session_secret.is_empty());
    assert!(!validate_admin_settings(&settings).expect("valid"));
}

#[test]
fn admin_hash_requires_a_session_secret() {
    let env = map(&[(
        "APP__ADMIN_PASSWORD_HASH",
        "$2b$10$abcdefghijklmnopqrstuuJ0iS1n4u7W9o4h0x4i8sLw0m0r0q0e2",
    )]);
    let settings = resolve_settings(&HashMap::new(), &env);
    assert!(validate_admin_settings(&settings).is_err());

    let env = map(&[
        (
            "APP__ADMIN_PASSWORD_HASH",
            "$2b$10$abcdefghijklmnopqrstuuJ0iS1n4u7W9o4h0x4i8sLw0m0r0q0e2",
        ),
        ("APP__SESSION_SECRET", "long-random-secret"),
    ]);
    let settings = resolve_settings(&HashMap::new(), &env);
    assert!(validate_admin_settings(&settings).expect("valid"));
}

#[test]
fn legacy_hash_format_is_refused() {
    let env = map(&[
        ("APP__ADMIN_PASSWORD_HASH", "sha256$salt$abcd"),
        ("APP__SESSION_SECRET", "long-random-secret"),
    ]);
    let settings = resolve_settings(&HashMap::new(), &env);
    assert!(validate_admin_settings(&settings).is_err());
}

#[test]
fn snapshot_ttl_is_configurable() {
    assert_eq!(Settings::default().page_cache_ttl_seconds, 60);
    let file = map(&[("page_cache_ttl_seconds", "5")]);
    let settings = resolve_settings(&file, &HashMap::new());
    assert_eq!(settings.page_cache_ttl_seconds, 5);
}
