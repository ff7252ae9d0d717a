//! Production collaborator clients.
//!
//! Thin reqwest-backed implementations of the trait seams in
//! `regflow-traits`, plus the filesystem-backed session store and the local
//! JSONL account gateway used when no remote store is configured.

mod gateway;
mod mailtm;
mod session_store;
mod twocaptcha;

pub use gateway::{JsonlAccountGateway, RestAccountGateway};
pub use mailtm::MailTmClient;
pub use session_store::FsSessionStore;
pub use twocaptcha::TwoCaptchaClient;
