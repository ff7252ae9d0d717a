use serde::{Deserialize, Serialize};

/// Challenge extracted from a page. Ephemeral; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaptchaChallenge {
    pub site_key: String,
    pub page_url: String,
}

/// Opaque solved token returned by an external solving service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaptchaSolution {
    pub token: String,
}
