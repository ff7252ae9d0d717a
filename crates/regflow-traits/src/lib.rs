//! Trait seams for the RegFlow engine.
//!
//! The engine consumes four collaborators: an external mailbox, an optional
//! CAPTCHA solving service, the account persistence store, and the per-task
//! cookie store. They are defined here as object-safe async traits so
//! `regflow-core` can be wired against real clients in production and
//! scripted mocks in tests.

mod error;

pub use error::{EngineError, Result};

use async_trait::async_trait;
use regflow_models::{CaptchaChallenge, CaptchaSolution, CookieRecord, SessionCookies};
use serde::{Deserialize, Serialize};

// ── EmailService ─────────────────────────────────────────────────────

/// One message as exposed by the external mailbox API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailMessage {
    pub id: String,
    pub from_address: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub html_content: Option<String>,
    #[serde(default)]
    pub text_content: Option<String>,
}

impl MailMessage {
    /// Body text to scan for verification links, preferring HTML.
    pub fn body(&self) -> &str {
        self.html_content
            .as_deref()
            .or(self.text_content.as_deref())
            .unwrap_or("")
    }
}

/// External mailbox consumed by the verification poller.
#[async_trait]
pub trait EmailService: Send + Sync {
    async fn list_messages(&self, address: &str) -> Result<Vec<MailMessage>>;
    async fn get_message(&self, id: &str) -> Result<Option<MailMessage>>;
}

// ── CaptchaSolvingService ────────────────────────────────────────────

/// External CAPTCHA solving service. Optional; when none is configured the
/// resolver reports `EngineError::CaptchaUnavailable` and the attempt fails
/// cleanly instead of looping.
#[async_trait]
pub trait CaptchaSolvingService: Send + Sync {
    async fn solve(&self, challenge: &CaptchaChallenge) -> Result<CaptchaSolution>;
}

// ── AccountGateway ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: String,
    pub email: String,
    pub verified: bool,
}

/// Opaque external account store. Called exactly once per task, at the end
/// of the verification phase, with `verified` reflecting the outcome.
#[async_trait]
pub trait AccountGateway: Send + Sync {
    async fn save_account(&self, account: NewAccount) -> Result<AccountRecord>;
    async fn save_cookies(&self, account_id: &str, cookies: &[CookieRecord]) -> Result<()>;
}

// ── SessionStore ─────────────────────────────────────────────────────

/// Cookie persistence keyed by task id. Absence of a saved session is not
/// an error; every attempt starts with a best-effort load.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, task_id: &str) -> Result<Option<SessionCookies>>;
    async fn save(&self, task_id: &str, cookies: &[CookieRecord]) -> Result<()>;
}
