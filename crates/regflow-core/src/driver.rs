//! Provider signup flow for one attempt.
//!
//! The driver owns the page choreography: navigate, humanized idle, typed
//! form input, submit, then classification of the resulting page. The
//! classification itself is a pure function over a [`PageSnapshot`] so the
//! precedence order (CAPTCHA > soft error > redirect > unrecognized) can be
//! tested without any browser.

use crate::captcha::CaptchaResolver;
use crate::config::EngineTimings;
use crate::store::TaskStore;
use crate::verify::EmailVerificationPoller;
use anyhow::{Context, Result};
use rand::Rng;
use regflow_browser::BrowserSession;
use regflow_models::{ProviderProfile, StepStatus};
use regflow_traits::{EngineError, SessionStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// What the page looked like after an action settled.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub url: String,
    pub body: String,
}

/// Classified result of a signup submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A CAPTCHA interstitial is blocking the flow.
    Captcha,
    /// Provider-reported soft errors, one reason per matched marker.
    SoftError(Vec<String>),
    /// Left the signup path while staying on the provider's domain.
    Redirected,
    /// Still on the signup page with nothing recognizable.
    Unrecognized,
}

/// Ordered classification of a post-submit page.
pub fn classify(snapshot: &PageSnapshot, profile: &ProviderProfile) -> Outcome {
    let body = snapshot.body.to_lowercase();

    if profile.captcha_markers.iter().any(|m| body.contains(m)) {
        return Outcome::Captcha;
    }

    let matched: Vec<String> = profile
        .soft_error_markers
        .iter()
        .filter(|marker| body.contains(*marker))
        .map(|marker| marker.to_string())
        .collect();
    if !matched.is_empty() {
        return Outcome::SoftError(matched);
    }

    if snapshot.url.contains(profile.domain) && !snapshot.url.contains(profile.signup_path) {
        return Outcome::Redirected;
    }

    Outcome::Unrecognized
}

pub struct SignupDriver {
    store: Arc<TaskStore>,
    session_store: Arc<dyn SessionStore>,
    captcha: CaptchaResolver,
    poller: EmailVerificationPoller,
}

impl SignupDriver {
    pub fn new(
        store: Arc<TaskStore>,
        session_store: Arc<dyn SessionStore>,
        captcha: CaptchaResolver,
        poller: EmailVerificationPoller,
    ) -> Self {
        Self {
            store,
            session_store,
            captcha,
            poller,
        }
    }

    /// Drive one attempt over an already-open session. Returns whether the
    /// attempt ended with a verified account. The caller owns session
    /// teardown.
    pub async fn attempt(
        &self,
        session: &mut dyn BrowserSession,
        task_id: &str,
        timings: &EngineTimings,
    ) -> Result<bool> {
        let task = self
            .store
            .get(task_id)
            .context("task disappeared from store")?;
        let profile = task.provider.profile();

        // Load + humanized idle.
        self.store
            .set_step_status(task_id, "load", StepStatus::Running);
        self.store
            .append_log(task_id, format!("Opening {}", profile.signup_url));
        session
            .navigate(profile.signup_url)
            .await
            .context("navigating to signup page")?;
        session
            .humanize(sample(&timings.idle_ms))
            .await
            .context("humanized idle")?;
        self.store
            .set_step_status(task_id, "load", StepStatus::Completed);
        self.capture(session, task_id, "after-load").await;

        // Form fill, character by character.
        self.store
            .set_step_status(task_id, "form", StepStatus::Running);
        self.store
            .append_debug_log(task_id, format!("typing email into {}", profile.email_selector));
        session
            .fill_human(profile.email_selector, &task.email, timings.type_delay_ms.clone())
            .await
            .context("filling email field")?;
        session
            .fill_human(
                profile.password_selector,
                &task.password,
                timings.type_delay_ms.clone(),
            )
            .await
            .context("filling password field")?;
        self.store
            .set_step_status(task_id, "form", StepStatus::Completed);

        // Submit and wait out the response window.
        self.store
            .set_step_status(task_id, "submit", StepStatus::Running);
        self.store.append_log(task_id, "Submitting registration");
        session
            .click(profile.submit_selector)
            .await
            .context("clicking submit")?;
        tokio::time::sleep(Duration::from_millis(sample(&timings.submit_wait_ms))).await;
        self.capture(session, task_id, "after-submit").await;

        let mut snapshot = self.snapshot(session).await?;
        let mut outcome = classify(&snapshot, profile);

        // Inline CAPTCHA recovery: one resolution + one resubmission, then
        // the reclassified outcome stands.
        if outcome == Outcome::Captcha {
            self.store.append_log(task_id, "CAPTCHA challenge detected");
            match self.captcha.solve_and_inject(session, &snapshot.url).await {
                Ok(()) => {
                    self.store
                        .append_log(task_id, "CAPTCHA solved, resubmitting");
                    session
                        .click(profile.submit_selector)
                        .await
                        .context("resubmitting after captcha")?;
                    tokio::time::sleep(Duration::from_millis(sample(&timings.submit_wait_ms)))
                        .await;
                    snapshot = self.snapshot(session).await?;
                    outcome = classify(&snapshot, profile);
                    if outcome == Outcome::Captcha {
                        self.store
                            .push_error(task_id, "CAPTCHA still present after solving");
                    }
                }
                Err(EngineError::CaptchaUnavailable) => {
                    // Configuration gap, not a provider error; logged as such.
                    self.store.append_log(
                        task_id,
                        "No CAPTCHA solver configured; cannot continue this attempt",
                    );
                    self.store
                        .push_error(task_id, "captcha unsolvable: no solver configured");
                }
                Err(e) => {
                    warn!(task_id = %task_id, error = %e, "CAPTCHA resolution failed");
                    self.store
                        .push_error(task_id, format!("captcha resolution failed: {e}"));
                }
            }
        }

        match outcome {
            Outcome::Redirected => {
                self.store
                    .set_step_status(task_id, "submit", StepStatus::Completed);
                self.store
                    .set_step_status(task_id, "redirect", StepStatus::Completed);
                self.store
                    .append_log(task_id, format!("Signup accepted, landed on {}", snapshot.url));
                info!(task_id = %task_id, url = %snapshot.url, "Signup submission accepted");

                // First cookie checkpoint, right after a successful submission.
                match session.cookies().await {
                    Ok(cookies) => {
                        if let Err(e) = self.session_store.save(task_id, &cookies).await {
                            warn!(task_id = %task_id, error = %e, "Cookie persistence failed");
                        }
                    }
                    Err(e) => warn!(task_id = %task_id, error = %e, "Cookie export failed"),
                }

                self.poller.verify(session, task_id).await
            }
            Outcome::SoftError(reasons) => {
                for reason in &reasons {
                    self.store.push_error(task_id, reason.clone());
                    self.store
                        .append_log(task_id, format!("Provider rejected signup: {reason}"));
                }
                self.store
                    .set_step_status(task_id, "submit", StepStatus::Failed);
                Ok(false)
            }
            Outcome::Captcha => {
                self.store
                    .set_step_status(task_id, "submit", StepStatus::Failed);
                Ok(false)
            }
            Outcome::Unrecognized => {
                let scraped = session
                    .collect_texts(profile.error_selectors)
                    .await
                    .unwrap_or_default();
                if scraped.is_empty() {
                    self.store
                        .push_error(task_id, "submission did not leave the signup page");
                } else {
                    for message in scraped {
                        self.store.push_error(task_id, message);
                    }
                }
                self.store
                    .set_step_status(task_id, "submit", StepStatus::Failed);
                Ok(false)
            }
        }
    }

    async fn snapshot(&self, session: &mut dyn BrowserSession) -> Result<PageSnapshot> {
        Ok(PageSnapshot {
            url: session.current_url().await.context("reading page url")?,
            body: session.page_text().await.context("reading page text")?,
        })
    }

    /// Best-effort diagnostic screenshot.
    async fn capture(&self, session: &mut dyn BrowserSession, task_id: &str, label: &str) {
        match session.screenshot().await {
            Ok(data) => self.store.push_screenshot(task_id, label, data),
            Err(e) => self
                .store
                .append_debug_log(task_id, format!("screenshot {label} failed: {e}")),
        }
    }
}

fn sample(range: &std::ops::Range<u64>) -> u64 {
    if range.is_empty() {
        range.start
    } else {
        rand::thread_rng().gen_range(range.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regflow_models::Provider;

    fn snap(url: &str, body: &str) -> PageSnapshot {
        PageSnapshot {
            url: url.to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn captcha_wins_over_everything() {
        let profile = Provider::Cursor.profile();
        let snapshot = snap(
            "https://cursor.sh/dashboard",
            "Please solve the CAPTCHA. Also: email already taken.",
        );
        assert_eq!(classify(&snapshot, profile), Outcome::Captcha);
    }

    #[test]
    fn soft_errors_collect_every_matched_marker() {
        let profile = Provider::Cursor.profile();
        let snapshot = snap(
            "https://authenticator.cursor.sh/sign-up",
            "That email has already been taken. Please try again later.",
        );
        match classify(&snapshot, profile) {
            Outcome::SoftError(reasons) => {
                assert!(reasons.contains(&"already been taken".to_string()));
                assert!(reasons.contains(&"try again".to_string()));
            }
            other => panic!("expected soft error, got {other:?}"),
        }
    }

    #[test]
    fn on_domain_redirect_off_signup_path_is_success() {
        let profile = Provider::Cursor.profile();
        let snapshot = snap("https://cursor.sh/settings", "Welcome!");
        assert_eq!(classify(&snapshot, profile), Outcome::Redirected);
    }

    #[test]
    fn staying_on_signup_page_is_unrecognized() {
        let profile = Provider::Cursor.profile();
        let snapshot = snap(
            "https://authenticator.cursor.sh/sign-up",
            "Create your account",
        );
        assert_eq!(classify(&snapshot, profile), Outcome::Unrecognized);
    }

    #[test]
    fn off_domain_redirect_is_not_success() {
        let profile = Provider::Cursor.profile();
        let snapshot = snap("https://evil.example.com/", "done");
        assert_eq!(classify(&snapshot, profile), Outcome::Unrecognized);
    }
}
