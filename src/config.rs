//! Purpose: Shared defaults for the server bind, store path, and client base URL.
//! Exports: `default_bind`, `default_store_path`, `default_base_url`.
//! Role: Keep CLI and test semantics aligned from one source.
//! Invariants: Environment overrides win over built-in defaults; flags win over both.
//! Invariants: Built-in defaults stay loopback-local.

use std::net::SocketAddr;
use std::path::PathBuf;

pub const BIND_ENV: &str = "CARDFILE_BIND";
pub const STORE_ENV: &str = "CARDFILE_STORE";
pub const URL_ENV: &str = "CARDFILE_URL";
pub const CORS_ENV: &str = "CARDFILE_CORS_ORIGIN";

const FALLBACK_BIND: &str = "127.0.0.1:5000";
const FALLBACK_URL: &str = "http://127.0.0.1:5000";

pub fn default_bind() -> SocketAddr {
    std::env::var(BIND_ENV)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or_else(|| FALLBACK_BIND.parse().expect("fallback bind"))
}

pub fn default_store_path() -> PathBuf {
    if let Some(path) = std::env::var_os(STORE_ENV) {
        return PathBuf::from(path);
    }
    let home = std::env::var_os("HOME").unwrap_or_default();
    PathBuf::from(home).join(".cardfile").join("items.json")
}

pub fn default_base_url() -> String {
    std::env::var(URL_ENV).unwrap_or_else(|_| FALLBACK_URL.to_string())
}

pub fn default_cors_origins() -> Vec<String> {
    let Ok(raw) = std::env::var(CORS_ENV) else {
        return Vec::new();
    };
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{default_cors_origins, default_store_path};

    #[test]
    fn store_default_lives_under_home() {
        if std::env::var_os(super::STORE_ENV).is_none() {
            let path = default_store_path();
            assert!(path.to_string_lossy().contains(".cardfile"));
        }
    }

    #[test]
    fn cors_default_is_empty_without_env() {
        if std::env::var_os(super::CORS_ENV).is_none() {
            assert!(default_cors_origins().is_empty());
        }
    }
}
