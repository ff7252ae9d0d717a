//! Account persistence gateways.
//!
//! Two implementations of [`AccountGateway`]: a REST client for a backing
//! account store, and a local JSONL file used when no remote store is
//! configured so created accounts are never silently lost.

use async_trait::async_trait;
use parking_lot::Mutex;
use regflow_models::CookieRecord;
use regflow_traits::{AccountGateway, AccountRecord, EngineError, NewAccount, Result};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

// ── REST ─────────────────────────────────────────────────────────────

pub struct RestAccountGateway {
    base_url: String,
    client: reqwest::Client,
}

impl RestAccountGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(20))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl AccountGateway for RestAccountGateway {
    async fn save_account(&self, account: NewAccount) -> Result<AccountRecord> {
        let record = self
            .client
            .post(format!("{}/api/accounts", self.base_url))
            .json(&account)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(record)
    }

    async fn save_cookies(&self, account_id: &str, cookies: &[CookieRecord]) -> Result<()> {
        self.client
            .post(format!("{}/api/accounts/{account_id}/cookies", self.base_url))
            .json(&cookies)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

// ── local JSONL ──────────────────────────────────────────────────────

#[derive(Serialize)]
struct AccountLine<'a> {
    id: &'a str,
    email: &'a str,
    password: &'a str,
    verified: bool,
}

#[derive(Serialize)]
struct CookieLine<'a> {
    account_id: &'a str,
    cookies: &'a [CookieRecord],
}

/// Appends one JSON object per line under the session root. The mutex keeps
/// concurrent task completions from interleaving writes.
pub struct JsonlAccountGateway {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlAccountGateway {
    pub fn new(session_root: impl Into<PathBuf>) -> Self {
        Self {
            path: session_root.into().join("accounts.jsonl"),
            lock: Mutex::new(()),
        }
    }

    fn append(&self, line: String) -> Result<()> {
        let _guard = self.lock.lock();
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

#[async_trait]
impl AccountGateway for JsonlAccountGateway {
    async fn save_account(&self, account: NewAccount) -> Result<AccountRecord> {
        let id = Uuid::new_v4().to_string();
        let line = serde_json::to_string(&AccountLine {
            id: &id,
            email: &account.email,
            password: &account.password,
            verified: account.verified,
        })?;
        self.append(line)?;
        Ok(AccountRecord {
            id,
            email: account.email,
            verified: account.verified,
        })
    }

    async fn save_cookies(&self, account_id: &str, cookies: &[CookieRecord]) -> Result<()> {
        if account_id.is_empty() {
            return Err(EngineError::Configuration(
                "cookie save without an account id".to_string(),
            ));
        }
        let line = serde_json::to_string(&CookieLine {
            account_id,
            cookies,
        })?;
        self.append(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn jsonl_gateway_appends_accounts_and_cookies() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = JsonlAccountGateway::new(dir.path());

        let record = gateway
            .save_account(NewAccount {
                email: "user@example.com".to_string(),
                password: "pw".to_string(),
                verified: true,
            })
            .await
            .unwrap();
        gateway
            .save_cookies(
                &record.id,
                &[CookieRecord {
                    name: "session".to_string(),
                    value: "v".to_string(),
                    domain: ".cursor.sh".to_string(),
                    path: "/".to_string(),
                    expires: -1.0,
                    http_only: true,
                    secure: true,
                    same_site: Default::default(),
                }],
            )
            .await
            .unwrap();

        let content = std::fs::read_to_string(dir.path().join("accounts.jsonl")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("user@example.com"));
        assert!(lines[1].contains(&record.id));
    }
}
