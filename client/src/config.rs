use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// How often the poller asks whether a sign-in ticket has been redeemed
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

pub const DEFAULT_APP_URL: &str = "http://localhost:8080";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the Votecaster backend, without a trailing slash
    pub app_url: String,
    /// Where the session entries are persisted
    pub session_file: PathBuf,
    pub poll_interval: Duration,
}

impl ClientConfig {
    /// Read the configuration from `APP_URL`, `VOTECASTER_SESSION_FILE` and
    /// `POLL_INTERVAL_MS`, falling back to defaults for anything unset
    pub fn from_env() -> Self {
        let app_url = env::var("APP_URL").unwrap_or_else(|_| DEFAULT_APP_URL.to_string());

        let session_file = env::var("VOTECASTER_SESSION_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_session_file());

        let poll_interval = env::var("POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_POLL_INTERVAL);

        Self::new(app_url, session_file, poll_interval)
    }

    pub fn new(app_url: impl Into<String>, session_file: PathBuf, poll_interval: Duration) -> Self {
        Self {
            app_url: normalize_url(&app_url.into()),
            session_file,
            poll_interval,
        }
    }
}

/// `<data dir>/votecaster/session.json`, or the working directory when the
/// platform has no data directory
pub fn default_session_file() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("votecaster"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("session.json")
}

fn normalize_url(url: &str) -> String {
    // Make sure the URL doesn't have a trailing slash for consistency
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_strips_trailing_slashes() {
        let config = ClientConfig::new(
            "https://farcaster.vote/api//",
            PathBuf::from("session.json"),
            DEFAULT_POLL_INTERVAL,
        );

        assert_eq!(config.app_url, "https://farcaster.vote/api");
    }

    #[test]
    fn test_from_env_overrides() {
        env::set_var("APP_URL", "http://127.0.0.1:9999/");
        env::set_var("VOTECASTER_SESSION_FILE", "/tmp/votecaster-test/session.json");
        env::set_var("POLL_INTERVAL_MS", "250");

        let config = ClientConfig::from_env();

        assert_eq!(config.app_url, "http://127.0.0.1:9999");
        assert_eq!(
            config.session_file,
            PathBuf::from("/tmp/votecaster-test/session.json")
        );
        assert_eq!(config.poll_interval, Duration::from_millis(250));

        // Clean up
        env::remove_var("APP_URL");
        env::remove_var("VOTECASTER_SESSION_FILE");
        env::remove_var("POLL_INTERVAL_MS");
    }

    #[test]
    fn test_default_session_file_name() {
        assert!(default_session_file().ends_with("session.json"));
    }
}
