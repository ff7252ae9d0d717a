//! Shared data model for the RegFlow automation engine.
//!
//! Everything here is plain serde-friendly state: the task record with its
//! step ladder and log buffers, the per-session browser fingerprint, cookie
//! records, provider profiles, and the event type broadcast on every task
//! mutation. Behaviour lives in `regflow-core`; the only logic in this crate
//! is the small set of task mutators that keep status transitions legal.

mod captcha;
mod cookies;
mod event;
mod fingerprint;
mod provider;
mod task;

pub use captcha::{CaptchaChallenge, CaptchaSolution};
pub use cookies::{CookieRecord, SameSite, SessionCookies};
pub use event::TaskEvent;
pub use fingerprint::{Fingerprint, Geolocation, Viewport};
pub use provider::{Provider, ProviderProfile, StepDef};
pub use task::{AutomationStep, AutomationTask, Screenshot, StepStatus, TaskStatus};
