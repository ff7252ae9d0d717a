//! Scripted collaborator implementations.
//!
//! Used by this crate's unit and integration tests to exercise the engine
//! without a real browser, mailbox, solving service or account store. Kept
//! in the library so downstream crates can drive the engine offline too.

use crate::captcha::placeholder_token;
use async_trait::async_trait;
use parking_lot::Mutex;
use regflow_browser::{BrowserRuntime, BrowserSession, OpenSessionRequest};
use regflow_models::{CaptchaChallenge, CaptchaSolution, CookieRecord, SessionCookies};
use regflow_traits::{
    AccountGateway, AccountRecord, CaptchaSolvingService, EmailService, MailMessage, NewAccount,
    Result, SessionStore,
};
use serde_json::Value;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

// ── scripted browser ─────────────────────────────────────────────────

/// One page the scripted session can be on.
#[derive(Debug, Clone)]
pub struct PageState {
    pub url: String,
    pub body: String,
    pub html: String,
    pub alerts: Vec<String>,
}

impl PageState {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        let body = body.into();
        Self {
            url: url.into(),
            html: format!("<html><body>{body}</body></html>"),
            body,
            alerts: Vec::new(),
        }
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = html.into();
        self
    }

    pub fn with_alerts(mut self, alerts: &[&str]) -> Self {
        self.alerts = alerts.iter().map(|s| s.to_string()).collect();
        self
    }
}

#[derive(Debug, Default)]
struct SessionInner {
    current: Option<PageState>,
    queue: VecDeque<PageState>,
    visited: Vec<String>,
    clicked: Vec<String>,
    typed: Vec<(String, String)>,
    evaluated: Vec<String>,
    cookie_jar: Vec<CookieRecord>,
    closed: bool,
}

/// Browser session that walks a scripted sequence of page states: each
/// navigation or click advances to the next state in the queue.
#[derive(Clone)]
pub struct ScriptedSession {
    inner: Arc<Mutex<SessionInner>>,
}

impl ScriptedSession {
    pub fn new(states: Vec<PageState>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionInner {
                queue: states.into(),
                cookie_jar: vec![CookieRecord {
                    name: "session".to_string(),
                    value: "scripted".to_string(),
                    domain: ".cursor.sh".to_string(),
                    path: "/".to_string(),
                    expires: -1.0,
                    http_only: true,
                    secure: true,
                    same_site: Default::default(),
                }],
                ..Default::default()
            })),
        }
    }

    /// Shared handle for inspecting the session after the engine consumed it.
    pub fn handle(&self) -> ScriptedSession {
        self.clone()
    }

    pub fn visited(&self) -> Vec<String> {
        self.inner.lock().visited.clone()
    }

    pub fn clicked(&self) -> Vec<String> {
        self.inner.lock().clicked.clone()
    }

    pub fn typed(&self) -> Vec<(String, String)> {
        self.inner.lock().typed.clone()
    }

    pub fn evaluated(&self) -> Vec<String> {
        self.inner.lock().evaluated.clone()
    }

    pub fn closed(&self) -> bool {
        self.inner.lock().closed
    }

    fn advance(inner: &mut SessionInner) {
        if let Some(next) = inner.queue.pop_front() {
            inner.current = Some(next);
        }
    }

    fn current(inner: &SessionInner) -> PageState {
        inner
            .current
            .clone()
            .unwrap_or_else(|| PageState::new("about:blank", ""))
    }
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.visited.push(url.to_string());
        Self::advance(&mut inner);
        if inner.current.is_none() {
            inner.current = Some(PageState::new(url, ""));
        }
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String> {
        Ok(Self::current(&self.inner.lock()).url)
    }

    async fn page_text(&mut self) -> Result<String> {
        Ok(Self::current(&self.inner.lock()).body)
    }

    async fn fill_human(
        &mut self,
        selector: &str,
        text: &str,
        _delay_ms: Range<u64>,
    ) -> Result<()> {
        self.inner
            .lock()
            .typed
            .push((selector.to_string(), text.to_string()));
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.clicked.push(selector.to_string());
        Self::advance(&mut inner);
        Ok(())
    }

    async fn evaluate(&mut self, expression: &str) -> Result<Value> {
        let mut inner = self.inner.lock();
        inner.evaluated.push(expression.to_string());
        if expression.contains("outerHTML") {
            Ok(Value::String(Self::current(&inner).html))
        } else {
            Ok(Value::Bool(true))
        }
    }

    async fn collect_texts(&mut self, _selectors: &[&str]) -> Result<Vec<String>> {
        Ok(Self::current(&self.inner.lock()).alerts)
    }

    async fn humanize(&mut self, _duration_ms: u64) -> Result<()> {
        Ok(())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>> {
        Ok(vec![0x89, 0x50, 0x4e, 0x47])
    }

    async fn cookies(&mut self) -> Result<Vec<CookieRecord>> {
        Ok(self.inner.lock().cookie_jar.clone())
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.lock().closed = true;
        Ok(())
    }
}

/// Runtime that opens a fresh [`ScriptedSession`] per attempt from one
/// template, keeping a handle to every session it handed out.
pub struct ScriptedRuntime {
    template: Vec<PageState>,
    handles: Mutex<Vec<ScriptedSession>>,
    opens: AtomicUsize,
}

impl ScriptedRuntime {
    pub fn new(template: Vec<PageState>) -> Self {
        Self {
            template,
            handles: Mutex::new(Vec::new()),
            opens: AtomicUsize::new(0),
        }
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn sessions(&self) -> Vec<ScriptedSession> {
        self.handles.lock().clone()
    }
}

#[async_trait]
impl BrowserRuntime for ScriptedRuntime {
    async fn open(&self, _request: OpenSessionRequest) -> Result<Box<dyn BrowserSession>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let session = ScriptedSession::new(self.template.clone());
        self.handles.lock().push(session.handle());
        Ok(Box::new(session))
    }
}

// ── scripted collaborators ───────────────────────────────────────────

#[derive(Default)]
pub struct ScriptedMailbox {
    messages: Mutex<Vec<MailMessage>>,
}

impl ScriptedMailbox {
    pub fn push(&self, message: MailMessage) {
        self.messages.lock().push(message);
    }
}

#[async_trait]
impl EmailService for ScriptedMailbox {
    async fn list_messages(&self, _address: &str) -> Result<Vec<MailMessage>> {
        Ok(self.messages.lock().clone())
    }

    async fn get_message(&self, id: &str) -> Result<Option<MailMessage>> {
        Ok(self.messages.lock().iter().find(|m| m.id == id).cloned())
    }
}

pub struct StubSolver {
    token: String,
    calls: AtomicUsize,
}

impl StubSolver {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Solver handing out an arbitrary token, for dry runs.
    pub fn random() -> Self {
        Self::new(placeholder_token())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptchaSolvingService for StubSolver {
    async fn solve(&self, _challenge: &CaptchaChallenge) -> Result<CaptchaSolution> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(CaptchaSolution {
            token: self.token.clone(),
        })
    }
}

#[derive(Default)]
pub struct RecordingGateway {
    accounts: Mutex<Vec<NewAccount>>,
    cookie_saves: Mutex<Vec<(String, Vec<CookieRecord>)>>,
}

impl RecordingGateway {
    pub fn accounts(&self) -> Vec<NewAccount> {
        self.accounts.lock().clone()
    }

    pub fn cookie_saves(&self) -> Vec<(String, Vec<CookieRecord>)> {
        self.cookie_saves.lock().clone()
    }
}

#[async_trait]
impl AccountGateway for RecordingGateway {
    async fn save_account(&self, account: NewAccount) -> Result<AccountRecord> {
        let mut accounts = self.accounts.lock();
        accounts.push(account.clone());
        Ok(AccountRecord {
            id: format!("acct-{}", accounts.len()),
            email: account.email,
            verified: account.verified,
        })
    }

    async fn save_cookies(&self, account_id: &str, cookies: &[CookieRecord]) -> Result<()> {
        self.cookie_saves
            .lock()
            .push((account_id.to_string(), cookies.to_vec()));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, SessionCookies>>,
}

impl MemorySessionStore {
    pub fn saved(&self, task_id: &str) -> Option<SessionCookies> {
        self.sessions.lock().get(task_id).cloned()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, task_id: &str) -> Result<Option<SessionCookies>> {
        Ok(self.sessions.lock().get(task_id).cloned())
    }

    async fn save(&self, task_id: &str, cookies: &[CookieRecord]) -> Result<()> {
        self.sessions.lock().insert(
            task_id.to_string(),
            SessionCookies::new(task_id, cookies.to_vec()),
        );
        Ok(())
    }
}
