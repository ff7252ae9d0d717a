//! CAPTCHA extraction, delegation and token injection.
//!
//! The resolver never loops: one site-key scan, one call to the configured
//! solving service, one injection. Missing configuration, a missing site
//! key, or a failed external call all surface as
//! [`EngineError::CaptchaUnavailable`]-class failures the attempt treats as
//! "could not solve".

use rand::Rng;
use regex::Regex;
use regflow_browser::BrowserSession;
use regflow_models::CaptchaChallenge;
use regflow_traits::{CaptchaSolvingService, EngineError, Result};
use std::sync::Arc;
use tracing::{debug, info};

pub struct CaptchaResolver {
    service: Option<Arc<dyn CaptchaSolvingService>>,
    attribute_pattern: Regex,
    inline_pattern: Regex,
}

impl CaptchaResolver {
    pub fn new(service: Option<Arc<dyn CaptchaSolvingService>>) -> Self {
        Self {
            service,
            // data-sitekey="..." on widget containers.
            attribute_pattern: Regex::new(r#"data-sitekey\s*=\s*["']([0-9A-Za-z_-]{10,})["']"#)
                .expect("static regex"),
            // sitekey: '...' in inline bootstrap scripts.
            inline_pattern: Regex::new(r#"site[_-]?key["']?\s*[:=]\s*["']([0-9A-Za-z_-]{10,})["']"#)
                .expect("static regex"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.service.is_some()
    }

    /// Extract the challenge, solve it externally and inject the token.
    pub async fn solve_and_inject(
        &self,
        session: &mut dyn BrowserSession,
        page_url: &str,
    ) -> Result<()> {
        let Some(service) = &self.service else {
            return Err(EngineError::CaptchaUnavailable);
        };

        let site_key = self
            .extract_site_key(session)
            .await?
            .ok_or(EngineError::CaptchaUnavailable)?;
        debug!(site_key = %site_key, "CAPTCHA site key extracted");

        let challenge = CaptchaChallenge {
            site_key,
            page_url: page_url.to_string(),
        };
        let solution = service.solve(&challenge).await?;
        info!("CAPTCHA token received from solving service");

        self.inject(session, &solution.token).await
    }

    async fn extract_site_key(&self, session: &mut dyn BrowserSession) -> Result<Option<String>> {
        let html = session
            .evaluate("document.documentElement.outerHTML")
            .await?;
        let html = html.as_str().unwrap_or_default().to_string();

        let key = self
            .attribute_pattern
            .captures(&html)
            .or_else(|| self.inline_pattern.captures(&html))
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().to_string());
        Ok(key)
    }

    /// Write the token into the response field and fire any completion
    /// callback the page registered. Best effort: the expression swallows
    /// missing hooks instead of throwing.
    async fn inject(&self, session: &mut dyn BrowserSession, token: &str) -> Result<()> {
        let token_literal = serde_json::to_string(token)?;
        let expression = format!(
            "(() => {{\n\
               const token = {token_literal};\n\
               for (const name of ['g-recaptcha-response', 'h-captcha-response', 'cf-turnstile-response']) {{\n\
                 for (const field of document.querySelectorAll(`[name=\"${{name}}\"]`)) {{\n\
                   field.value = token;\n\
                   field.dispatchEvent(new Event('change', {{ bubbles: true }}));\n\
                 }}\n\
               }}\n\
               try {{\n\
                 const hooks = window.___grecaptcha_cfg && window.___grecaptcha_cfg.clients;\n\
                 if (window.captchaCallback) window.captchaCallback(token);\n\
                 if (hooks) {{\n\
                   for (const client of Object.values(hooks)) {{\n\
                     const callback = findCallback(client);\n\
                     if (callback) callback(token);\n\
                   }}\n\
                 }}\n\
                 function findCallback(node, depth = 0) {{\n\
                   if (!node || depth > 3) return null;\n\
                   if (typeof node.callback === 'function') return node.callback;\n\
                   if (typeof node !== 'object') return null;\n\
                   for (const value of Object.values(node)) {{\n\
                     const found = findCallback(value, depth + 1);\n\
                     if (found) return found;\n\
                   }}\n\
                   return null;\n\
                 }}\n\
               }} catch (_) {{}}\n\
               return true;\n\
             }})()"
        );
        session.evaluate(&expression).await?;
        Ok(())
    }
}

/// Deterministic-looking token used by the stub solver in dry runs.
pub fn placeholder_token() -> String {
    let mut rng = rand::thread_rng();
    (0..40)
        .map(|_| {
            const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
            CHARSET[rng.gen_range(0..CHARSET.len())] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{PageState, ScriptedSession, StubSolver};

    fn captcha_page() -> PageState {
        PageState::new(
            "https://authenticator.cursor.sh/sign-up",
            "verify you are human",
        )
        .with_html(
            r#"<div class="g-recaptcha" data-sitekey="6LdXaBcDeFgHiJkLmNoP"></div>"#,
        )
    }

    #[tokio::test]
    async fn unconfigured_resolver_reports_unavailable() {
        let resolver = CaptchaResolver::new(None);
        let mut session = ScriptedSession::new(vec![captcha_page()]);

        let result = resolver
            .solve_and_inject(&mut session, "https://x.test/")
            .await;
        assert!(matches!(result, Err(EngineError::CaptchaUnavailable)));
    }

    #[tokio::test]
    async fn missing_site_key_reports_unavailable() {
        let resolver = CaptchaResolver::new(Some(Arc::new(StubSolver::new("tok"))));
        let page = PageState::new("https://x.test/", "captcha").with_html("<html></html>");
        let mut session = ScriptedSession::new(vec![page]);
        session.navigate("https://x.test/").await.unwrap();

        let result = resolver.solve_and_inject(&mut session, "https://x.test/").await;
        assert!(matches!(result, Err(EngineError::CaptchaUnavailable)));
    }

    #[tokio::test]
    async fn extracts_key_solves_and_injects() {
        let solver = Arc::new(StubSolver::new("tok-xyz"));
        let resolver = CaptchaResolver::new(Some(solver.clone()));
        let mut session = ScriptedSession::new(vec![captcha_page()]);
        // The driver reaches the resolver with the challenge page already
        // current; mirror that here.
        session
            .navigate("https://authenticator.cursor.sh/sign-up")
            .await
            .unwrap();

        resolver
            .solve_and_inject(&mut session, "https://authenticator.cursor.sh/sign-up")
            .await
            .unwrap();

        assert_eq!(solver.calls(), 1);
        // The injection expression ran and carried the token.
        assert!(session.evaluated().iter().any(|e| e.contains("tok-xyz")));
    }

    #[test]
    fn inline_site_key_pattern_matches_script_bootstrap() {
        let resolver = CaptchaResolver::new(None);
        let html = r#"<script>grecaptcha.render('c', { sitekey: '6LdXaBcDeFgHiJkLmNoP' });</script>"#;
        let captures = resolver.inline_pattern.captures(html).unwrap();
        assert_eq!(&captures[1], "6LdXaBcDeFgHiJkLmNoP");
    }
}
