//! Engine configuration.
//!
//! Everything timing-related lives in [`EngineTimings`] so the humanized
//! delays can be swapped for a compressed table in debug mode (and in
//! tests) without touching the control flow that awaits them.

use std::ops::Range;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct EngineTimings {
    /// Humanized idle after the signup page settles.
    pub idle_ms: Range<u64>,
    /// Per-character typing delay.
    pub type_delay_ms: Range<u64>,
    /// Window to wait for the server response after submit.
    pub submit_wait_ms: Range<u64>,
    /// Backoff between attempts.
    pub retry_backoff_ms: Range<u64>,
    /// Wait after following the verification link.
    pub post_verify_wait_ms: u64,
    pub email_poll_attempts: u32,
    pub email_poll_delay_ms: u64,
}

impl EngineTimings {
    /// Realistic multi-second pacing used against live providers.
    pub fn realistic() -> Self {
        Self {
            idle_ms: 2_500..6_000,
            type_delay_ms: 45..160,
            submit_wait_ms: 3_000..5_500,
            retry_backoff_ms: 5_000..13_000,
            post_verify_wait_ms: 2_000,
            email_poll_attempts: 10,
            email_poll_delay_ms: 3_000,
        }
    }

    /// Compressed pacing for debug mode and tests.
    pub fn compressed() -> Self {
        Self {
            idle_ms: 1..3,
            type_delay_ms: 0..1,
            submit_wait_ms: 1..3,
            retry_backoff_ms: 1..3,
            post_verify_wait_ms: 1,
            email_poll_attempts: 3,
            email_poll_delay_ms: 1,
        }
    }
}

impl Default for EngineTimings {
    fn default() -> Self {
        Self::realistic()
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum concurrently live browser sessions.
    pub pool_size: usize,
    /// Attempts per task.
    pub max_retries: u32,
    pub headless: bool,
    /// Initial debug-log verbosity.
    pub debug_default: bool,
    /// Root for per-task session dirs, persisted cookies and artifacts.
    pub session_root: PathBuf,
    pub mailbox_base_url: String,
    pub mailbox_token: Option<String>,
    pub captcha_api_key: Option<String>,
    pub captcha_base_url: String,
    /// REST surface of the backing account store; a local JSONL gateway is
    /// used when unset.
    pub accounts_base_url: Option<String>,
    pub timings: EngineTimings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_size: 2,
            max_retries: 3,
            headless: true,
            debug_default: false,
            session_root: PathBuf::from(".regflow"),
            mailbox_base_url: "https://api.mail.tm".to_string(),
            mailbox_token: None,
            captcha_api_key: None,
            captcha_base_url: "https://2captcha.com".to_string(),
            accounts_base_url: None,
            timings: EngineTimings::realistic(),
        }
    }
}

impl EngineConfig {
    /// Build a config from `REGFLOW_*` environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(path) = std::env::var("REGFLOW_SESSION_DIR") {
            config.session_root = PathBuf::from(path);
        }
        if let Some(size) = env_parse("REGFLOW_POOL_SIZE") {
            config.pool_size = size;
        }
        if let Some(retries) = env_parse("REGFLOW_MAX_RETRIES") {
            config.max_retries = retries;
        }
        if let Ok(value) = std::env::var("REGFLOW_HEADLESS") {
            config.headless = value != "0" && value.to_lowercase() != "false";
        }
        if let Ok(value) = std::env::var("REGFLOW_DEBUG") {
            config.debug_default = value == "1" || value.to_lowercase() == "true";
        }
        if let Ok(url) = std::env::var("REGFLOW_MAILBOX_URL") {
            config.mailbox_base_url = url;
        }
        config.mailbox_token = std::env::var("REGFLOW_MAILBOX_TOKEN").ok();
        config.captcha_api_key = std::env::var("REGFLOW_CAPTCHA_KEY").ok();
        if let Ok(url) = std::env::var("REGFLOW_CAPTCHA_URL") {
            config.captcha_base_url = url;
        }
        config.accounts_base_url = std::env::var("REGFLOW_ACCOUNTS_URL").ok();
        config
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_behaviour() {
        let config = EngineConfig::default();
        assert_eq!(config.pool_size, 2);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.timings.retry_backoff_ms, 5_000..13_000);
        assert_eq!(config.timings.email_poll_attempts, 10);
        assert_eq!(config.timings.email_poll_delay_ms, 3_000);
    }
}
