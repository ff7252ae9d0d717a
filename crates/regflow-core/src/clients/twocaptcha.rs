//! 2captcha-compatible solving service client.
//!
//! Classic in.php/res.php protocol: submit the site key and page URL, then
//! poll for the solved token. Everything abnormal maps to
//! `EngineError::Captcha` so the resolver treats it as "could not solve".

use async_trait::async_trait;
use regflow_models::{CaptchaChallenge, CaptchaSolution};
use regflow_traits::{CaptchaSolvingService, EngineError, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const NOT_READY: &str = "CAPCHA_NOT_READY";

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: u8,
    request: String,
}

pub struct TwoCaptchaClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    poll_interval: Duration,
    max_polls: u32,
}

impl TwoCaptchaClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            poll_interval: Duration::from_secs(5),
            max_polls: 24,
        }
    }

    async fn submit(&self, challenge: &CaptchaChallenge) -> Result<String> {
        let response: ApiResponse = self
            .client
            .get(format!("{}/in.php", self.base_url))
            .query(&[
                ("key", self.api_key.as_str()),
                ("method", "userrecaptcha"),
                ("googlekey", challenge.site_key.as_str()),
                ("pageurl", challenge.page_url.as_str()),
                ("json", "1"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.status != 1 {
            return Err(EngineError::Captcha(response.request));
        }
        Ok(response.request)
    }

    async fn poll(&self, submission_id: &str) -> Result<Option<String>> {
        let response: ApiResponse = self
            .client
            .get(format!("{}/res.php", self.base_url))
            .query(&[
                ("key", self.api_key.as_str()),
                ("action", "get"),
                ("id", submission_id),
                ("json", "1"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.status == 1 {
            return Ok(Some(response.request));
        }
        if response.request == NOT_READY {
            return Ok(None);
        }
        Err(EngineError::Captcha(response.request))
    }
}

#[async_trait]
impl CaptchaSolvingService for TwoCaptchaClient {
    async fn solve(&self, challenge: &CaptchaChallenge) -> Result<CaptchaSolution> {
        let submission_id = self.submit(challenge).await?;
        debug!(submission_id = %submission_id, "CAPTCHA submitted to solving service");

        for _ in 0..self.max_polls {
            tokio::time::sleep(self.poll_interval).await;
            if let Some(token) = self.poll(&submission_id).await? {
                return Ok(CaptchaSolution { token });
            }
        }
        Err(EngineError::Captcha(format!(
            "no solution after {} polls",
            self.max_polls
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_response_parses_both_outcomes() {
        let ok: ApiResponse = serde_json::from_str(r#"{"status":1,"request":"token"}"#).unwrap();
        assert_eq!(ok.status, 1);
        let pending: ApiResponse =
            serde_json::from_str(r#"{"status":0,"request":"CAPCHA_NOT_READY"}"#).unwrap();
        assert_eq!(pending.request, NOT_READY);
    }
}
