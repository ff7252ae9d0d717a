use serde::{Deserialize, Serialize};

/// Supported signup targets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Cursor,
}

impl Provider {
    pub fn profile(&self) -> &'static ProviderProfile {
        match self {
            Provider::Cursor => &CURSOR,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StepDef {
    pub id: &'static str,
    pub label: &'static str,
}

/// Everything provider-specific the engine needs, carried as data so adding
/// a provider means adding a profile, not new control flow.
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    pub name: &'static str,
    /// Signup form entry point.
    pub signup_url: &'static str,
    /// Registrable domain; a post-submit redirect must stay on it to count.
    pub domain: &'static str,
    /// URL path fragment identifying the signup flow itself.
    pub signup_path: &'static str,
    pub email_selector: &'static str,
    pub password_selector: &'static str,
    pub submit_selector: &'static str,
    /// Visible alert/error containers scraped when a submission goes
    /// nowhere recognizable.
    pub error_selectors: &'static [&'static str],
    /// Page-text markers for provider-reported soft errors, matched
    /// case-insensitively.
    pub soft_error_markers: &'static [&'static str],
    /// Page-text markers indicating a CAPTCHA interstitial.
    pub captcha_markers: &'static [&'static str],
    /// Substring expected in the verification mail's sender address.
    pub verification_sender: &'static str,
    /// Regex matching the verification link inside the mail body.
    pub verification_link_pattern: &'static str,
    pub steps: &'static [StepDef],
}

static CURSOR: ProviderProfile = ProviderProfile {
    name: "cursor",
    signup_url: "https://authenticator.cursor.sh/sign-up",
    domain: "cursor.sh",
    signup_path: "/sign-up",
    email_selector: "input[name=\"email\"]",
    password_selector: "input[name=\"password\"]",
    submit_selector: "button[type=\"submit\"]",
    error_selectors: &["[role=\"alert\"]", ".error-message", ".text-error"],
    soft_error_markers: &[
        "too many requests",
        "rate limit",
        "already been taken",
        "already taken",
        "already registered",
        "invalid email",
        "enter a valid email",
        "password is too short",
        "password must be",
        "try again",
    ],
    captcha_markers: &["captcha", "verify you are human", "cf-turnstile"],
    verification_sender: "cursor",
    verification_link_pattern: r#"https://authenticator\.cursor\.sh/email-verification[^\s"'<>]+"#,
    steps: &[
        StepDef { id: "load", label: "Open signup page" },
        StepDef { id: "form", label: "Fill registration form" },
        StepDef { id: "submit", label: "Submit registration" },
        StepDef { id: "redirect", label: "Leave signup flow" },
        StepDef { id: "email_verify", label: "Verify email address" },
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_profile_is_consistent() {
        let profile = Provider::Cursor.profile();
        assert!(profile.signup_url.contains(profile.domain));
        assert!(profile.signup_url.contains(profile.signup_path));
        assert_eq!(profile.steps.len(), 5);
        // The link pattern must compile downstream; sanity-check its shape here.
        assert!(profile.verification_link_pattern.starts_with("https"));
    }
}
