//! Configuration module for the Silsilah sync engine.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Canonical remote document resource (GET + PUT)
    pub remote_url: String,
    /// Secondary save endpoint used when the PUT is rejected (POST)
    pub save_url: Option<String>,
    /// Path to the SQLite file backing the local durable cache
    pub cache_path: PathBuf,
    /// Name of the cache slot holding the document
    pub cache_slot: String,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Remote poll interval
    pub poll_interval: Duration,
    /// Quiet interval before a debounced upload fires
    pub debounce: Duration,
    /// Timeout applied to every remote request
    pub http_timeout: Duration,
    /// Poll the remote document periodically
    pub auto_reload: bool,
    /// Upload local edits automatically
    pub auto_upload: bool,
    /// Name of the single record in the built-in seed document
    pub seed_name: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let remote_url = env::var("SILSILAH_REMOTE_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8000/data/silsilah.json".to_string());

        let save_url = match env::var("SILSILAH_SAVE_URL") {
            Ok(url) if url.trim().is_empty() => None,
            Ok(url) => Some(url),
            Err(_) => Some("http://127.0.0.1:8000/data/save.php".to_string()),
        };

        let cache_path = env::var("SILSILAH_CACHE_PATH")
            .unwrap_or_else(|_| "./data/cache.sqlite".to_string())
            .into();

        let cache_slot =
            env::var("SILSILAH_CACHE_SLOT").unwrap_or_else(|_| "silsilah_family".to_string());

        let bind_addr = env::var("SILSILAH_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .expect("Invalid SILSILAH_BIND_ADDR format");

        let log_level = env::var("SILSILAH_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let poll_interval = parse_millis_or("SILSILAH_POLL_INTERVAL_MS", 15_000);
        let debounce = parse_millis_or("SILSILAH_DEBOUNCE_MS", 800);
        let http_timeout = parse_millis_or("SILSILAH_HTTP_TIMEOUT_MS", 10_000);
        let auto_reload = parse_or("SILSILAH_AUTO_RELOAD", true);
        let auto_upload = parse_or("SILSILAH_AUTO_UPLOAD", true);

        let seed_name =
            env::var("SILSILAH_SEED_NAME").unwrap_or_else(|_| "Puang Guru Nasing".to_string());

        Self {
            remote_url,
            save_url,
            cache_path,
            cache_slot,
            bind_addr,
            log_level,
            poll_interval,
            debounce,
            http_timeout,
            auto_reload,
            auto_upload,
            seed_name,
        }
    }
}

/// Parse an optional variable, warning and falling back on malformed values.
fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Ignoring malformed {}={:?}, using default", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

/// Parse a positive millisecond duration; zero falls back like a malformed value.
fn parse_millis_or(key: &str, default: u64) -> Duration {
    match parse_or(key, default) {
        0 => {
            tracing::warn!("Ignoring zero {}, using default of {}ms", key, default);
            Duration::from_millis(default)
        }
        millis => Duration::from_millis(millis),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use std::sync::Mutex;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    const KEYS: &[&str] = &[
        "SILSILAH_REMOTE_URL",
        "SILSILAH_SAVE_URL",
        "SILSILAH_CACHE_PATH",
        "SILSILAH_CACHE_SLOT",
        "SILSILAH_BIND_ADDR",
        "SILSILAH_LOG_LEVEL",
        "SILSILAH_POLL_INTERVAL_MS",
        "SILSILAH_DEBOUNCE_MS",
        "SILSILAH_HTTP_TIMEOUT_MS",
        "SILSILAH_AUTO_RELOAD",
        "SILSILAH_AUTO_UPLOAD",
        "SILSILAH_SEED_NAME",
    ];

    fn clear_env() {
        for key in KEYS {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_default_config() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();

        let config = Config::from_env();

        assert_eq!(config.remote_url, "http://127.0.0.1:8000/data/silsilah.json");
        assert_eq!(
            config.save_url.as_deref(),
            Some("http://127.0.0.1:8000/data/save.php")
        );
        assert_eq!(config.cache_path, PathBuf::from("./data/cache.sqlite"));
        assert_eq!(config.cache_slot, "silsilah_family");
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.poll_interval, Duration::from_secs(15));
        assert_eq!(config.debounce, Duration::from_millis(800));
        assert!(config.auto_reload);
        assert!(config.auto_upload);
        assert_eq!(config.seed_name, "Puang Guru Nasing");
    }

    #[test]
    fn test_empty_save_url_disables_fallback() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("SILSILAH_SAVE_URL", "  ");

        let config = Config::from_env();
        assert!(config.save_url.is_none());

        clear_env();
    }

    #[test]
    fn test_malformed_numbers_fall_back() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("SILSILAH_POLL_INTERVAL_MS", "soon");
        env::set_var("SILSILAH_DEBOUNCE_MS", "250");
        env::set_var("SILSILAH_AUTO_UPLOAD", "false");

        let config = Config::from_env();
        assert_eq!(config.poll_interval, Duration::from_secs(15));
        assert_eq!(config.debounce, Duration::from_millis(250));
        assert!(!config.auto_upload);

        clear_env();
    }

    #[test]
    fn test_zero_durations_fall_back() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("SILSILAH_POLL_INTERVAL_MS", "0");
        env::set_var("SILSILAH_DEBOUNCE_MS", "0");
        env::set_var("SILSILAH_HTTP_TIMEOUT_MS", " 0 ");

        let config = Config::from_env();
        assert_eq!(config.poll_interval, Duration::from_secs(15));
        assert_eq!(config.debounce, Duration::from_millis(800));
        assert_eq!(config.http_timeout, Duration::from_secs(10));

        clear_env();
    }
}
