//! Fingerprinted browser session runtime for RegFlow.
//!
//! One attempt of a signup task owns exactly one browser process, one
//! isolated context and one page, bundled behind the [`BrowserSession`]
//! trait. The production implementation drives Chromium through Playwright
//! in a Node driver process (see [`playwright`]); tests script the trait
//! directly. Each session is opened with a fresh [`Fingerprint`] and the
//! stealth init script applied before any page script runs.

pub mod fingerprint;
pub mod playwright;
pub mod stealth;

pub use fingerprint::FingerprintGenerator;
pub use playwright::{PlaywrightRuntime, RuntimeProbe, probe_runtime};

use async_trait::async_trait;
use regflow_models::{CookieRecord, Fingerprint};
use regflow_traits::Result;
use serde_json::Value;
use std::ops::Range;
use std::path::PathBuf;

/// Everything needed to open one isolated session.
#[derive(Debug, Clone)]
pub struct OpenSessionRequest {
    pub task_id: String,
    pub fingerprint: Fingerprint,
    /// Cookies restored from a previous attempt, if any.
    pub cookies: Vec<CookieRecord>,
    pub headless: bool,
    /// Directory for screenshots and driver artifacts.
    pub artifacts_dir: PathBuf,
}

/// Launches isolated browser sessions.
#[async_trait]
pub trait BrowserRuntime: Send + Sync {
    async fn open(&self, request: OpenSessionRequest) -> Result<Box<dyn BrowserSession>>;
}

/// One live browser process + context + page.
///
/// `close` must be reachable from every exit path of an attempt; callers are
/// expected to invoke it on success, failure and error alike. The production
/// implementation additionally kills the driver process when the session is
/// dropped, so an escaped error cannot leak a browser.
#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<()>;
    async fn current_url(&mut self) -> Result<String>;
    /// Full visible text of the page body.
    async fn page_text(&mut self) -> Result<String>;
    /// Click the field, then type character by character with a randomized
    /// per-character delay drawn from `delay_ms`.
    async fn fill_human(&mut self, selector: &str, text: &str, delay_ms: Range<u64>)
    -> Result<()>;
    async fn click(&mut self, selector: &str) -> Result<()>;
    async fn evaluate(&mut self, expression: &str) -> Result<Value>;
    /// Visible text of every element matching any of the selectors.
    async fn collect_texts(&mut self, selectors: &[&str]) -> Result<Vec<String>>;
    /// Idle like a human for roughly `duration_ms`: small scrolls and mouse
    /// movement, no page mutation.
    async fn humanize(&mut self, duration_ms: u64) -> Result<()>;
    async fn screenshot(&mut self) -> Result<Vec<u8>>;
    async fn cookies(&mut self) -> Result<Vec<CookieRecord>>;
    async fn close(&mut self) -> Result<()>;
}
