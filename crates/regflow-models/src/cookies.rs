use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

/// One browser cookie as exported from a live context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// Unix seconds; -1 marks a session cookie, matching the Playwright
    /// export format.
    #[serde(default = "session_expiry")]
    pub expires: f64,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub same_site: SameSite,
}

fn session_expiry() -> f64 {
    -1.0
}

/// Cookie snapshot persisted per task id, letting a later attempt inherit
/// partial progress from an earlier one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCookies {
    pub task_id: String,
    pub saved_at: DateTime<Utc>,
    pub cookies: Vec<CookieRecord>,
}

impl SessionCookies {
    pub fn new(task_id: impl Into<String>, cookies: Vec<CookieRecord>) -> Self {
        Self {
            task_id: task_id.into(),
            saved_at: Utc::now(),
            cookies,
        }
    }
}
