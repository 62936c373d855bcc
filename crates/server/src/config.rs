use std::{collections::HashMap, fs};

use anyhow::{bail, Result};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub admin_password_hash: String,
    pub session_secret: String,
    pub session_ttl_seconds: i64,
    pub cache_max_age_seconds: u64,
    pub page_cache_ttl_seconds: u64,
    pub default_buy_url: String,
    pub hero_title: String,
    pub hero_subtitle: String,
    pub max_body_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8080".into(),
            database_url: "sqlite://./data/storefront.db".into(),
            admin_password_hash: String::new(),
            session_secret: String::new(),
            session_ttl_seconds: 12 * 3600,
            cache_max_age_seconds: 86_400,
            page_cache_ttl_seconds: 60,
            default_buy_url: String::new(),
            hero_title: "Turn your skills into digital income".into(),
            hero_subtitle: "Premium digital products for maximum results".into(),
            max_body_bytes: 64 * 1024,
        }
    }
}

pub fn load_settings() -> Settings {
    let file_cfg = fs::read_to_string("server.toml")
        .ok()
        .and_then(|raw| toml::from_str::<HashMap<String, String>>(&raw).ok())
        .unwrap_or_default();
    let env: HashMap<String, String> = std::env::vars().collect();
    resolve_settings(&file_cfg, &env)
}

/// Defaults, then `server.toml`, then environment; later sources win.
pub fn resolve_settings(
    file_cfg: &HashMap<String, String>,
    env: &HashMap<String, String>,
) -> Settings {
    let mut settings = Settings::default();
    let lookup = |file_key: &str, env_keys: &[&str]| -> Option<String> {
        env_keys
            .iter()
            .rev()
            .find_map(|key| env.get(*key))
            .or_else(|| file_cfg.get(file_key))
            .cloned()
    };

    if let Some(v) = lookup("bind_addr", &["SERVER_BIND", "APP__BIND_ADDR"]) {
        settings.server_bind = v;
    }
    if let Some(v) = lookup("database_url", &["DATABASE_URL", "APP__DATABASE_URL"]) {
        settings.database_url = v;
    }
    if let Some(v) = lookup("admin_password_hash", &["APP__ADMIN_PASSWORD_HASH"]) {
        settings.admin_password_hash = v;
    }
    if let Some(v) = lookup("session_secret", &["APP__SESSION_SECRET"]) {
        settings.session_secret = v;
    }
    if let Some(v) = lookup("session_ttl_seconds", &["APP__SESSION_TTL_SECONDS"]) {
        if let Ok(parsed) = v.parse::<i64>() {
            settings.session_ttl_seconds = parsed;
        }
    }
    if let Some(v) = lookup("cache_max_age_seconds", &["APP__CACHE_MAX_AGE_SECONDS"]) {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.cache_max_age_seconds = parsed;
        }
    }
    if let Some(v) = lookup("page_cache_ttl_seconds", &["APP__PAGE_CACHE_TTL_SECONDS"]) {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.page_cache_ttl_seconds = parsed;
        }
    }
    if let Some(v) = lookup("default_buy_url", &["APP__DEFAULT_BUY_URL"]) {
        settings.default_buy_url = v;
    }
    if let Some(v) = lookup("hero_title", &["APP__HERO_TITLE"]) {
        settings.hero_title = v;
    }
    if let Some(v) = lookup("hero_subtitle", &["APP__HERO_SUBTITLE"]) {
        settings.hero_subtitle = v;
    }
    if let Some(v) = lookup("max_body_bytes", &["APP__MAX_BODY_BYTES"]) {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.max_body_bytes = parsed;
        }
    }

    settings
}

/// Admin access stays off without a password hash. With one, a signing
/// secret is mandatory and the hash must be bcrypt.
pub fn validate_admin_settings(settings: &Settings) -> Result<bool> {
    let hash = settings.admin_password_hash.trim();
    if hash.is_empty() {
        return Ok(false);
    }
    if !hash.starts_with("$2") {
        bail!("APP__ADMIN_PASSWORD_HASH is not a bcrypt hash; generate one with `tools hash-password`");
    }
    if settings.session_secret.trim().is_empty() {
        bail!("APP__SESSION_SECRET must be set when admin login is enabled");
    }
    Ok(true)
}

pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
