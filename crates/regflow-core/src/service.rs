//! Engine facade.
//!
//! [`AutomationService`] is what embedders hold: it owns the task store, the
//! worker pool and the retry controller, accepts new signup tasks and hands
//! out read access and event subscriptions. Collaborators arrive through
//! [`EngineDeps`] so the whole engine can run against scripted
//! implementations offline.

use crate::captcha::CaptchaResolver;
use crate::config::{EngineConfig, EngineTimings};
use crate::driver::SignupDriver;
use crate::pool::WorkerPool;
use crate::retry::{AttemptRunner, RetryController};
use crate::store::TaskStore;
use crate::verify::EmailVerificationPoller;
use async_trait::async_trait;
use rand::Rng;
use regflow_browser::{BrowserRuntime, FingerprintGenerator, OpenSessionRequest};
use regflow_models::{AutomationTask, Provider, TaskEvent};
use regflow_traits::{AccountGateway, CaptchaSolvingService, EmailService, SessionStore};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, warn};

/// Collaborators the engine is wired against.
pub struct EngineDeps {
    pub runtime: Arc<dyn BrowserRuntime>,
    pub email: Arc<dyn EmailService>,
    pub captcha: Option<Arc<dyn CaptchaSolvingService>>,
    pub gateway: Arc<dyn AccountGateway>,
    pub session_store: Arc<dyn SessionStore>,
}

/// [`AttemptRunner`] for real signups: fresh fingerprint, restored cookies,
/// one browser session whose teardown is guaranteed on every exit path.
struct SignupAttemptRunner {
    store: Arc<TaskStore>,
    deps: EngineDeps,
    config: EngineConfig,
    fingerprints: FingerprintGenerator,
}

impl SignupAttemptRunner {
    fn timings(&self) -> EngineTimings {
        if self.store.debug_enabled() {
            EngineTimings::compressed()
        } else {
            self.config.timings.clone()
        }
    }
}

#[async_trait]
impl AttemptRunner for SignupAttemptRunner {
    async fn run_attempt(&self, task_id: &str, attempt: u32) -> anyhow::Result<bool> {
        let timings = self.timings();
        let fingerprint = self.fingerprints.generate();
        self.store.append_debug_log(
            task_id,
            format!(
                "attempt {attempt}: fingerprint {} / {}x{}",
                fingerprint.user_agent, fingerprint.viewport.width, fingerprint.viewport.height
            ),
        );

        // Best-effort cookie restore from an earlier attempt.
        let cookies = match self.deps.session_store.load(task_id).await {
            Ok(Some(saved)) => {
                self.store.append_debug_log(
                    task_id,
                    format!("restoring {} cookies from a previous attempt", saved.cookies.len()),
                );
                saved.cookies
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Session restore failed");
                Vec::new()
            }
        };

        let mut session = self
            .deps
            .runtime
            .open(OpenSessionRequest {
                task_id: task_id.to_string(),
                fingerprint,
                cookies,
                headless: self.config.headless,
                artifacts_dir: self
                    .config
                    .session_root
                    .join(task_id)
                    .join(format!("attempt-{attempt}")),
            })
            .await?;

        let poller = EmailVerificationPoller::new(
            self.store.clone(),
            self.deps.email.clone(),
            self.deps.gateway.clone(),
            self.deps.session_store.clone(),
            timings.clone(),
        );
        let driver = SignupDriver::new(
            self.store.clone(),
            self.deps.session_store.clone(),
            CaptchaResolver::new(self.deps.captcha.clone()),
            poller,
        );

        let result = driver.attempt(session.as_mut(), task_id, &timings).await;
        if let Err(e) = session.close().await {
            warn!(task_id = %task_id, error = %e, "Session teardown failed");
        }
        result
    }
}

pub struct AutomationService {
    store: Arc<TaskStore>,
    pool: Arc<WorkerPool>,
    controller: Arc<RetryController>,
}

impl AutomationService {
    pub fn new(config: EngineConfig, deps: EngineDeps) -> Arc<Self> {
        let store = Arc::new(TaskStore::new(config.debug_default));
        let pool = Arc::new(WorkerPool::new(config.pool_size));
        let backoff = config.timings.retry_backoff_ms.clone();
        let max_retries = config.max_retries;
        let runner = Arc::new(SignupAttemptRunner {
            store: store.clone(),
            deps,
            config,
            fingerprints: FingerprintGenerator::new(),
        });
        let controller = Arc::new(RetryController::new(
            store.clone(),
            pool.clone(),
            runner,
            max_retries,
            backoff,
        ));
        Arc::new(Self {
            store,
            pool,
            controller,
        })
    }

    /// Wire the engine against its production collaborators: the Playwright
    /// runtime, the mail.tm mailbox, an optional 2captcha solver, and either
    /// the REST account store or the local JSONL fallback.
    pub fn with_defaults(config: EngineConfig) -> Arc<Self> {
        let captcha: Option<Arc<dyn CaptchaSolvingService>> =
            config.captcha_api_key.as_ref().map(|key| {
                Arc::new(crate::clients::TwoCaptchaClient::new(
                    config.captcha_base_url.clone(),
                    key.clone(),
                )) as Arc<dyn CaptchaSolvingService>
            });
        let gateway: Arc<dyn AccountGateway> = match &config.accounts_base_url {
            Some(url) => Arc::new(crate::clients::RestAccountGateway::new(url.clone())),
            None => Arc::new(crate::clients::JsonlAccountGateway::new(
                config.session_root.clone(),
            )),
        };
        let deps = EngineDeps {
            runtime: Arc::new(regflow_browser::PlaywrightRuntime::new()),
            email: Arc::new(crate::clients::MailTmClient::new(
                config.mailbox_base_url.clone(),
                config.mailbox_token.clone(),
            )),
            captcha,
            gateway,
            session_store: Arc::new(crate::clients::FsSessionStore::new(
                config.session_root.clone(),
            )),
        };
        Self::new(config, deps)
    }

    /// Accept a signup task and start driving it in the background. Returns
    /// the task id immediately; progress flows through [`Self::subscribe`].
    pub fn create_task(
        self: &Arc<Self>,
        provider: Provider,
        email: String,
        password: Option<String>,
    ) -> String {
        let password = password.unwrap_or_else(|| derive_password(&email));
        let task_id = self.store.create_task(provider, email, password);

        let service = self.clone();
        let id = task_id.clone();
        tokio::spawn(async move {
            let controller = service.controller.clone();
            let run_id = id.clone();
            let run = tokio::spawn(async move { controller.run(&run_id).await });
            // The controller contains attempt errors itself; this only fires
            // if the orchestration future panicked.
            if let Err(e) = run.await {
                error!(task_id = %id, error = %e, "Orchestrator crashed");
                service.store.push_error(&id, "orchestrator crashed");
                service.store.fail(&id);
            }
        });
        task_id
    }

    pub fn get_task(&self, id: &str) -> Option<AutomationTask> {
        self.store.get(id)
    }

    pub fn list_tasks(&self) -> Vec<AutomationTask> {
        self.store.list()
    }

    pub fn subscribe(&self, id: &str) -> Option<broadcast::Receiver<TaskEvent>> {
        self.store.subscribe(id)
    }

    pub fn set_debug_mode(&self, enabled: bool) {
        self.store.set_debug(enabled);
    }

    pub fn debug_mode(&self) -> bool {
        self.store.debug_enabled()
    }

    /// Attempts currently holding a browser slot.
    pub fn active_sessions(&self) -> usize {
        self.pool.active_count()
    }
}

/// Password for tasks submitted without one: derived from the mailbox local
/// part plus enough extra classes to pass common strength checks.
fn derive_password(email: &str) -> String {
    let local = email.split('@').next().unwrap_or("").trim();
    let base = if local.is_empty() { "user" } else { local };
    let digits: u8 = rand::thread_rng().gen_range(10..100);
    format!("{base}!Rf{digits}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_passwords_carry_extra_classes() {
        let password = derive_password("alice@example.com");
        assert!(password.starts_with("alice!Rf"));
        assert!(password.len() >= 10);
        assert!(password.chars().any(|c| c.is_ascii_digit()));
    }

    #[test]
    fn empty_local_part_falls_back() {
        let password = derive_password("@example.com");
        assert!(password.starts_with("user!Rf"));
    }
}
