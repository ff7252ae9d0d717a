//! mail.tm-compatible mailbox client.

use async_trait::async_trait;
use regflow_traits::{EmailService, MailMessage, Result};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct FromField {
    #[serde(default)]
    address: String,
}

#[derive(Debug, Deserialize)]
struct ListedMessage {
    id: String,
    #[serde(default, alias = "fromAddress")]
    from: Option<FromField>,
    #[serde(default)]
    subject: String,
    /// Truncated body preview.
    #[serde(default)]
    intro: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(rename = "hydra:member", alias = "messages", default)]
    members: Vec<ListedMessage>,
}

#[derive(Debug, Deserialize)]
struct MessageDetails {
    id: String,
    #[serde(default)]
    from: Option<FromField>,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    html: Option<Vec<String>>,
}

pub struct MailTmClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl MailTmClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(20))
                .build()
                .unwrap_or_default(),
        }
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl EmailService for MailTmClient {
    async fn list_messages(&self, address: &str) -> Result<Vec<MailMessage>> {
        let response = self
            .authorized(self.client.get(format!("{}/messages", self.base_url)))
            .query(&[("address", address)])
            .send()
            .await?
            .error_for_status()?;

        let listed: ListResponse = response.json().await?;
        Ok(listed
            .members
            .into_iter()
            .map(|m| MailMessage {
                id: m.id,
                from_address: m.from.map(|f| f.address).unwrap_or_default(),
                subject: m.subject,
                html_content: None,
                text_content: m.intro,
            })
            .collect())
    }

    async fn get_message(&self, id: &str) -> Result<Option<MailMessage>> {
        let response = self
            .authorized(self.client.get(format!("{}/messages/{id}", self.base_url)))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let details: MessageDetails = response.error_for_status()?.json().await?;
        Ok(Some(MailMessage {
            id: details.id,
            from_address: details.from.map(|f| f.address).unwrap_or_default(),
            subject: details.subject,
            html_content: details.html.map(|parts| parts.join("\n")),
            text_content: details.text,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_response_parses_hydra_members() {
        let payload = r#"{"hydra:member":[{"id":"m1","from":{"address":"no-reply@cursor.sh"},"subject":"Verify","intro":"Click the link"}]}"#;
        let parsed: ListResponse = serde_json::from_str(payload).unwrap();
        assert_eq!(parsed.members.len(), 1);
        assert_eq!(
            parsed.members[0].from.as_ref().unwrap().address,
            "no-reply@cursor.sh"
        );
    }

    #[test]
    fn details_join_html_parts() {
        let payload = r#"{"id":"m1","from":{"address":"a@b.c"},"subject":"s","html":["<p>one</p>","<p>two</p>"]}"#;
        let parsed: MessageDetails = serde_json::from_str(payload).unwrap();
        assert_eq!(parsed.html.unwrap().len(), 2);
    }
}
