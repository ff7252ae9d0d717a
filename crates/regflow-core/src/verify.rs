//! Email verification, the asynchronous second phase of a signup.
//!
//! Polls the external mailbox for a message from the provider, extracts the
//! verification link, and visits it in the same session that performed the
//! signup. Whatever happens, the phase ends by persisting the session's
//! cookies and reporting the account to the persistence gateway with the
//! verified flag reflecting the outcome.

use crate::config::EngineTimings;
use crate::store::TaskStore;
use anyhow::{Context, Result};
use regex::Regex;
use regflow_browser::BrowserSession;
use regflow_models::{CookieRecord, StepStatus};
use regflow_traits::{AccountGateway, EmailService, NewAccount, SessionStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct EmailVerificationPoller {
    store: Arc<TaskStore>,
    email: Arc<dyn EmailService>,
    gateway: Arc<dyn AccountGateway>,
    session_store: Arc<dyn SessionStore>,
    timings: EngineTimings,
}

impl EmailVerificationPoller {
    pub fn new(
        store: Arc<TaskStore>,
        email: Arc<dyn EmailService>,
        gateway: Arc<dyn AccountGateway>,
        session_store: Arc<dyn SessionStore>,
        timings: EngineTimings,
    ) -> Self {
        Self {
            store,
            email,
            gateway,
            session_store,
            timings,
        }
    }

    /// Complete the verification phase. Always ends with the persistence
    /// gateway invoked exactly once, whether or not a link arrived.
    pub async fn verify(&self, session: &mut dyn BrowserSession, task_id: &str) -> Result<bool> {
        let task = self
            .store
            .get(task_id)
            .context("task disappeared from store")?;
        let profile = task.provider.profile();
        let link_pattern = Regex::new(profile.verification_link_pattern)
            .context("compiling verification link pattern")?;

        self.store
            .append_log(task_id, "Waiting for the verification email");

        let mut verified = false;
        for poll in 1..=self.timings.email_poll_attempts {
            match self.find_link(&task.email, profile.verification_sender, &link_pattern).await {
                Ok(Some(link)) => {
                    self.store
                        .set_step_status(task_id, "email_verify", StepStatus::Running);
                    self.store
                        .append_log(task_id, "Verification email received, following link");
                    info!(task_id = %task_id, poll, "Verification link found");

                    session
                        .navigate(&link)
                        .await
                        .context("opening verification link")?;
                    tokio::time::sleep(Duration::from_millis(self.timings.post_verify_wait_ms))
                        .await;

                    self.store
                        .set_step_status(task_id, "email_verify", StepStatus::Completed);
                    self.store.append_log(task_id, "Email address verified");
                    verified = true;
                    break;
                }
                Ok(None) => {
                    self.store.append_debug_log(
                        task_id,
                        format!(
                            "mailbox poll {poll}/{} found nothing",
                            self.timings.email_poll_attempts
                        ),
                    );
                }
                Err(e) => {
                    // Transient mailbox trouble is not fatal to the poll loop.
                    warn!(task_id = %task_id, poll, error = %e, "Mailbox poll failed");
                    self.store
                        .append_debug_log(task_id, format!("mailbox poll {poll} failed: {e}"));
                }
            }
            if poll < self.timings.email_poll_attempts {
                tokio::time::sleep(Duration::from_millis(self.timings.email_poll_delay_ms)).await;
            }
        }

        if !verified {
            self.store
                .set_step_status(task_id, "email_verify", StepStatus::Failed);
            self.store.append_log(
                task_id,
                "No verification email arrived within the polling budget",
            );
        }

        // Final cookie checkpoint, superseding the post-submit one.
        let cookies = match session.cookies().await {
            Ok(cookies) => {
                if let Err(e) = self.session_store.save(task_id, &cookies).await {
                    warn!(task_id = %task_id, error = %e, "Cookie persistence failed");
                }
                cookies
            }
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Cookie export failed");
                Vec::new()
            }
        };

        self.persist_account(task_id, &task.email, &task.password, verified, &cookies)
            .await;
        Ok(verified)
    }

    async fn find_link(
        &self,
        address: &str,
        sender_marker: &str,
        pattern: &Regex,
    ) -> regflow_traits::Result<Option<String>> {
        let messages = self.email.list_messages(address).await?;
        for message in messages {
            if !message
                .from_address
                .to_lowercase()
                .contains(sender_marker)
            {
                continue;
            }
            // List payloads usually carry a truncated preview; prefer the
            // full message body when the mailbox can produce it.
            let body = match self.email.get_message(&message.id).await? {
                Some(details) if !details.body().is_empty() => details.body().to_string(),
                _ => message.body().to_string(),
            };

            if let Some(found) = pattern.find(&body) {
                return Ok(Some(found.as_str().to_string()));
            }
        }
        Ok(None)
    }

    /// Report the outcome to the external account store. Gateway trouble is
    /// logged but never fails the task at this point.
    async fn persist_account(
        &self,
        task_id: &str,
        email: &str,
        password: &str,
        verified: bool,
        cookies: &[CookieRecord],
    ) {
        let account = NewAccount {
            email: email.to_string(),
            password: password.to_string(),
            verified,
        };
        match self.gateway.save_account(account).await {
            Ok(record) => {
                if !cookies.is_empty() {
                    if let Err(e) = self.gateway.save_cookies(&record.id, cookies).await {
                        warn!(task_id = %task_id, error = %e, "Saving cookies to gateway failed");
                    }
                }
                self.store.append_log(
                    task_id,
                    format!("Account stored (verified: {verified})"),
                );
            }
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Account gateway failed");
                self.store
                    .append_log(task_id, format!("Could not store account: {e}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{
        MemorySessionStore, PageState, RecordingGateway, ScriptedMailbox, ScriptedSession,
    };
    use regflow_models::Provider;
    use regflow_traits::MailMessage;

    fn poller(
        store: Arc<TaskStore>,
        mailbox: Arc<ScriptedMailbox>,
        gateway: Arc<RecordingGateway>,
    ) -> EmailVerificationPoller {
        EmailVerificationPoller::new(
            store,
            mailbox,
            gateway,
            Arc::new(MemorySessionStore::default()),
            EngineTimings::compressed(),
        )
    }

    fn task(store: &TaskStore) -> String {
        let id = store.create_task(
            Provider::Cursor,
            "user@example.com".to_string(),
            "pw".to_string(),
        );
        store.start(&id);
        id
    }

    #[test]
    fn link_pattern_compiles_and_stops_at_the_closing_quote() {
        let profile = Provider::Cursor.profile();
        let pattern = Regex::new(profile.verification_link_pattern).unwrap();
        let body =
            "Open <a href=\"https://authenticator.cursor.sh/email-verification?code=abc123&x=1\">this</a>";
        assert_eq!(
            pattern.find(body).unwrap().as_str(),
            "https://authenticator.cursor.sh/email-verification?code=abc123&x=1"
        );
    }

    #[tokio::test]
    async fn empty_mailbox_fails_verification_but_persists_account() {
        let store = Arc::new(TaskStore::new(false));
        let mailbox = Arc::new(ScriptedMailbox::default());
        let gateway = Arc::new(RecordingGateway::default());
        let poller = poller(store.clone(), mailbox, gateway.clone());
        let id = task(&store);
        let mut session = ScriptedSession::new(vec![PageState::new("https://cursor.sh/", "hi")]);

        let verified = poller.verify(&mut session, &id).await.unwrap();

        assert!(!verified);
        let saved = gateway.accounts();
        assert_eq!(saved.len(), 1);
        assert!(!saved[0].verified);
        let task = store.get(&id).unwrap();
        assert!(
            task.steps
                .iter()
                .any(|s| s.id == "email_verify" && s.status == StepStatus::Failed)
        );
    }

    #[tokio::test]
    async fn matching_message_verifies_and_persists() {
        let store = Arc::new(TaskStore::new(false));
        let mailbox = Arc::new(ScriptedMailbox::default());
        mailbox.push(MailMessage {
            id: "m1".to_string(),
            from_address: "no-reply@cursor.sh".to_string(),
            subject: "Verify your email".to_string(),
            html_content: Some(
                "Click <a href=\"https://authenticator.cursor.sh/email-verification?code=abc123\">here</a>"
                    .to_string(),
            ),
            text_content: None,
        });
        let gateway = Arc::new(RecordingGateway::default());
        let poller = poller(store.clone(), mailbox, gateway.clone());
        let id = task(&store);
        let mut session = ScriptedSession::new(vec![PageState::new("https://cursor.sh/", "hi")]);

        let verified = poller.verify(&mut session, &id).await.unwrap();

        assert!(verified);
        assert!(
            session
                .visited()
                .iter()
                .any(|u| u.starts_with("https://authenticator.cursor.sh/email-verification"))
        );
        assert!(gateway.accounts()[0].verified);
    }

    #[tokio::test]
    async fn messages_from_other_senders_are_ignored() {
        let store = Arc::new(TaskStore::new(false));
        let mailbox = Arc::new(ScriptedMailbox::default());
        mailbox.push(MailMessage {
            id: "m1".to_string(),
            from_address: "spam@example.org".to_string(),
            subject: "hello".to_string(),
            html_content: Some(
                "https://authenticator.cursor.sh/email-verification?code=evil".to_string(),
            ),
            text_content: None,
        });
        let gateway = Arc::new(RecordingGateway::default());
        let poller = poller(store.clone(), mailbox, gateway.clone());
        let id = task(&store);
        let mut session = ScriptedSession::new(vec![PageState::new("https://cursor.sh/", "hi")]);

        let verified = poller.verify(&mut session, &id).await.unwrap();
        assert!(!verified);
    }
}
