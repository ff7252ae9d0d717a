//! End-to-end engine scenarios over scripted collaborators.
//!
//! Each scenario wires a full [`AutomationService`] against a scripted
//! browser runtime, mailbox, solver and gateway, submits one task and
//! asserts on the terminal task state plus the collaborator traffic.

use regflow_core::testkit::{
    MemorySessionStore, PageState, RecordingGateway, ScriptedMailbox, ScriptedRuntime, StubSolver,
};
use regflow_core::{AutomationService, EngineConfig, EngineDeps, EngineTimings};
use regflow_models::{Provider, StepStatus, TaskStatus};
use regflow_traits::{CaptchaSolvingService, MailMessage};
use std::sync::Arc;
use std::time::Duration;

const SIGNUP_URL: &str = "https://authenticator.cursor.sh/sign-up";
const VERIFY_LINK: &str = "https://authenticator.cursor.sh/email-verification?code=abc123";

fn test_config() -> EngineConfig {
    EngineConfig {
        timings: EngineTimings::compressed(),
        ..EngineConfig::default()
    }
}

fn signup_form() -> PageState {
    PageState::new(SIGNUP_URL, "Create your account")
}

fn dashboard() -> PageState {
    PageState::new("https://cursor.sh/dashboard", "Welcome")
}

fn verify_landing() -> PageState {
    PageState::new("https://cursor.sh/email-verified", "All set")
}

fn verification_mail() -> MailMessage {
    MailMessage {
        id: "m1".to_string(),
        from_address: "no-reply@cursor.sh".to_string(),
        subject: "Verify your email".to_string(),
        html_content: Some(format!("Click <a href=\"{VERIFY_LINK}\">here</a>")),
        text_content: None,
    }
}

struct Harness {
    service: Arc<AutomationService>,
    runtime: Arc<ScriptedRuntime>,
    gateway: Arc<RecordingGateway>,
}

fn harness(
    pages: Vec<PageState>,
    mailbox: Arc<ScriptedMailbox>,
    solver: Option<Arc<dyn CaptchaSolvingService>>,
) -> Harness {
    let runtime = Arc::new(ScriptedRuntime::new(pages));
    let gateway = Arc::new(RecordingGateway::default());
    let service = AutomationService::new(
        test_config(),
        EngineDeps {
            runtime: runtime.clone(),
            email: mailbox,
            captcha: solver,
            gateway: gateway.clone(),
            session_store: Arc::new(MemorySessionStore::default()),
        },
    );
    Harness {
        service,
        runtime,
        gateway,
    }
}

async fn wait_terminal(service: &AutomationService, task_id: &str) -> TaskStatus {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(task) = service.get_task(task_id) {
            if task.status.is_terminal() {
                return task.status;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task never reached a terminal state"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn clean_signup_completes_and_stores_a_verified_account() {
    let mailbox = Arc::new(ScriptedMailbox::default());
    mailbox.push(verification_mail());
    let h = harness(
        vec![signup_form(), dashboard(), verify_landing()],
        mailbox,
        None,
    );

    let id = h
        .service
        .create_task(Provider::Cursor, "alice@example.com".to_string(), None);
    let status = wait_terminal(&h.service, &id).await;

    assert_eq!(status, TaskStatus::Completed);
    let task = h.service.get_task(&id).unwrap();
    assert!(
        task.steps
            .iter()
            .all(|s| s.status == StepStatus::Completed),
        "steps: {:?}",
        task.steps
    );
    assert!(task.completed_at.is_some());

    let accounts = h.gateway.accounts();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].email, "alice@example.com");
    assert!(accounts[0].verified);
    assert_eq!(h.gateway.cookie_saves().len(), 1);
    assert_eq!(h.runtime.open_count(), 1);

    // The session must be torn down even on the success path.
    assert!(h.runtime.sessions()[0].closed());
}

#[tokio::test]
async fn soft_error_exhausts_retries_and_fails() {
    let taken = PageState::new(
        SIGNUP_URL,
        "This email has already been taken. Try again with a different address.",
    );
    let h = harness(
        vec![signup_form(), taken],
        Arc::new(ScriptedMailbox::default()),
        None,
    );

    let id = h
        .service
        .create_task(Provider::Cursor, "bob@example.com".to_string(), None);
    let status = wait_terminal(&h.service, &id).await;

    assert_eq!(status, TaskStatus::Failed);
    // One fresh session per attempt.
    assert_eq!(h.runtime.open_count(), 3);

    let task = h.service.get_task(&id).unwrap();
    let retries = task
        .logs
        .iter()
        .filter(|l| l.starts_with("Retrying:"))
        .count();
    assert_eq!(retries, 2);
    assert!(
        task.error_messages
            .iter()
            .any(|e| e.contains("already been taken"))
    );
    assert!(h.gateway.accounts().is_empty());
}

#[tokio::test]
async fn captcha_is_solved_inline_and_the_flow_continues() {
    let captcha_page = PageState::new(SIGNUP_URL, "Please verify you are human").with_html(
        r#"<html><body><div class="g-recaptcha" data-sitekey="6LdXaBcDeFgHiJkLmNoP"></div></body></html>"#,
    );
    let mailbox = Arc::new(ScriptedMailbox::default());
    mailbox.push(verification_mail());
    let solver = Arc::new(StubSolver::new("solved-token"));
    let h = harness(
        vec![signup_form(), captcha_page, dashboard(), verify_landing()],
        mailbox,
        Some(solver.clone()),
    );

    let id = h
        .service
        .create_task(Provider::Cursor, "carol@example.com".to_string(), None);
    let status = wait_terminal(&h.service, &id).await;

    assert_eq!(status, TaskStatus::Completed);
    assert_eq!(h.runtime.open_count(), 1);
    assert_eq!(solver.calls(), 1);

    // Submit is clicked once before and once after the CAPTCHA resolution.
    let session = &h.runtime.sessions()[0];
    let submits = session
        .clicked()
        .iter()
        .filter(|s| s.contains("submit"))
        .count();
    assert_eq!(submits, 2);

    let accounts = h.gateway.accounts();
    assert_eq!(accounts.len(), 1);
    assert!(accounts[0].verified);
}

#[tokio::test]
async fn unconfigured_solver_fails_the_attempt_with_a_config_error() {
    let captcha_page = PageState::new(SIGNUP_URL, "Please verify you are human");
    let h = harness(
        vec![signup_form(), captcha_page],
        Arc::new(ScriptedMailbox::default()),
        None,
    );

    let id = h
        .service
        .create_task(Provider::Cursor, "dave@example.com".to_string(), None);
    let status = wait_terminal(&h.service, &id).await;

    assert_eq!(status, TaskStatus::Failed);
    let task = h.service.get_task(&id).unwrap();
    assert!(
        task.error_messages
            .iter()
            .any(|e| e.contains("no solver configured"))
    );
}
