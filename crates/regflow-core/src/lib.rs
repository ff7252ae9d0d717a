//! RegFlow signup orchestration engine.
//!
//! Accepts account-signup tasks, drives each through a fingerprinted
//! browser session with retries, inline CAPTCHA resolution and email
//! verification, and reports finished accounts to a persistence gateway.
//! [`AutomationService`] is the entry point; everything underneath it is
//! wired through the trait seams in `regflow-traits` so the whole engine
//! runs offline against scripted collaborators.

pub mod captcha;
pub mod clients;
pub mod config;
pub mod driver;
pub mod pool;
pub mod retry;
pub mod service;
pub mod store;
pub mod testkit;
pub mod verify;

pub use captcha::CaptchaResolver;
pub use config::{EngineConfig, EngineTimings};
pub use driver::{Outcome, PageSnapshot, SignupDriver, classify};
pub use pool::WorkerPool;
pub use retry::{AttemptRunner, RetryController};
pub use service::{AutomationService, EngineDeps};
pub use store::TaskStore;
pub use verify::EmailVerificationPoller;
