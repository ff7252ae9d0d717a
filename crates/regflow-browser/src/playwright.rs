//! Playwright-over-Node session driver.
//!
//! A session spawns one Node process running a generated driver script. The
//! script launches Chromium, builds one isolated context from the session's
//! fingerprint, installs the stealth init script, imports any persisted
//! cookies, and then serves line-delimited JSON commands on stdin. Replies
//! come back on stdout behind [`RESULT_MARKER`], which keeps them separable
//! from stray console output. The child is spawned with `kill_on_drop`, so
//! even an attempt that unwinds without calling `close` cannot leak a
//! browser process.

use crate::stealth::build_stealth_script;
use crate::{BrowserRuntime, BrowserSession, OpenSessionRequest};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use regflow_models::CookieRecord;
use regflow_traits::{EngineError, Result};
use serde::Serialize;
use serde_json::{Value, json};
use std::ops::Range;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

const RESULT_MARKER: &str = "__REGFLOW_DRIVER_RESULT__=";
const READY_MARKER: &str = "__REGFLOW_DRIVER_READY__";
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(60);
const COMMAND_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum DriverCommand<'a> {
    Navigate { url: &'a str },
    CurrentUrl,
    PageText,
    TypeText {
        selector: &'a str,
        text: &'a str,
        delay_min_ms: u64,
        delay_max_ms: u64,
    },
    Click { selector: &'a str },
    Evaluate { expression: &'a str },
    CollectTexts { selectors: &'a [&'a str] },
    Humanize { duration_ms: u64 },
    Screenshot,
    Cookies,
    Close,
}

/// Browser runtime prerequisites, reported for observability.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeProbe {
    pub node_available: bool,
    pub node_version: Option<String>,
    pub playwright_package_available: bool,
    pub ready: bool,
    pub notes: Vec<String>,
}

/// Check that Node and the Playwright package are usable.
pub async fn probe_runtime() -> RuntimeProbe {
    let mut probe = RuntimeProbe {
        node_available: false,
        node_version: None,
        playwright_package_available: false,
        ready: false,
        notes: Vec::new(),
    };

    if let Ok(output) = capture("node", &["--version"], Duration::from_secs(10)).await {
        if output.0 == 0 {
            probe.node_available = true;
            probe.node_version = Some(output.1.trim().to_string());
        }
    }

    if probe.node_available {
        let check = capture(
            "node",
            &[
                "--input-type=module",
                "-e",
                "import('playwright').then(() => process.exit(0)).catch(() => process.exit(1));",
            ],
            Duration::from_secs(15),
        )
        .await;
        probe.playwright_package_available = check.map(|o| o.0 == 0).unwrap_or(false);
    }

    probe.ready = probe.node_available && probe.playwright_package_available;
    if !probe.node_available {
        probe
            .notes
            .push("Node.js not found. Install Node.js 20+ to enable the browser runtime.".into());
    }
    if probe.node_available && !probe.playwright_package_available {
        probe
            .notes
            .push("Playwright npm package not found. Run: npm i -D playwright".into());
    }
    probe
}

async fn capture(program: &str, args: &[&str], limit: Duration) -> Result<(i32, String)> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match timeout(limit, command.output()).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(EngineError::Browser(format!(
                "{program} probe timed out after {}s",
                limit.as_secs()
            )));
        }
    };
    Ok((
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stdout).to_string(),
    ))
}

/// Launches fingerprinted Chromium sessions via Node + Playwright.
pub struct PlaywrightRuntime {
    node_binary: String,
}

impl PlaywrightRuntime {
    pub fn new() -> Self {
        Self {
            node_binary: std::env::var("REGFLOW_NODE_BIN").unwrap_or_else(|_| "node".to_string()),
        }
    }
}

impl Default for PlaywrightRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserRuntime for PlaywrightRuntime {
    async fn open(&self, request: OpenSessionRequest) -> Result<Box<dyn BrowserSession>> {
        std::fs::create_dir_all(&request.artifacts_dir)?;
        let script_path = request.artifacts_dir.join("driver.mjs");
        std::fs::write(&script_path, build_driver_script(&request)?)?;

        let mut child = Command::new(&self.node_binary)
            .arg(&script_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Browser("driver stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Browser("driver stdout unavailable".into()))?;

        let mut session = NodeSession {
            task_id: request.task_id.clone(),
            child,
            stdin,
            reader: BufReader::new(stdout),
            closed: false,
        };
        session.wait_ready().await?;
        debug!(task_id = %request.task_id, "Browser session ready");
        Ok(Box::new(session))
    }
}

struct NodeSession {
    task_id: String,
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    closed: bool,
}

impl NodeSession {
    async fn wait_ready(&mut self) -> Result<()> {
        let mut line = String::new();
        let deadline = tokio::time::Instant::now() + LAUNCH_TIMEOUT;
        loop {
            line.clear();
            let read = timeout_at(deadline, self.reader.read_line(&mut line)).await??;
            if read == 0 {
                return Err(EngineError::Browser("driver exited before ready".into()));
            }
            let trimmed = line.trim();
            if trimmed == READY_MARKER {
                return Ok(());
            }
            if let Some(rest) = trimmed.strip_prefix(RESULT_MARKER) {
                // Launch failures are reported as one result line then exit.
                let payload: Value = serde_json::from_str(rest)?;
                let message = payload["error"].as_str().unwrap_or("browser launch failed");
                return Err(EngineError::Browser(message.to_string()));
            }
            debug!(task_id = %self.task_id, line = trimmed, "driver output");
        }
    }

    async fn send(&mut self, command: DriverCommand<'_>) -> Result<Value> {
        if self.closed {
            return Err(EngineError::Browser("session already closed".into()));
        }

        let mut encoded = serde_json::to_string(&command)?;
        encoded.push('\n');
        self.stdin.write_all(encoded.as_bytes()).await?;
        self.stdin.flush().await?;

        let deadline = tokio::time::Instant::now() + COMMAND_TIMEOUT;
        let mut line = String::new();
        loop {
            line.clear();
            let read = timeout_at(deadline, self.reader.read_line(&mut line)).await??;
            if read == 0 {
                self.closed = true;
                return Err(EngineError::Browser("driver process exited".into()));
            }
            let trimmed = line.trim();
            let Some(rest) = trimmed.strip_prefix(RESULT_MARKER) else {
                debug!(task_id = %self.task_id, line = trimmed, "driver output");
                continue;
            };
            let payload: Value = serde_json::from_str(rest)?;
            return if payload["ok"].as_bool().unwrap_or(false) {
                Ok(payload["value"].clone())
            } else {
                let message = payload["error"].as_str().unwrap_or("driver command failed");
                Err(EngineError::Browser(message.to_string()))
            };
        }
    }
}

async fn timeout_at<T>(
    deadline: tokio::time::Instant,
    future: impl std::future::Future<Output = T>,
) -> Result<T> {
    tokio::time::timeout_at(deadline, future)
        .await
        .map_err(|_| EngineError::Browser("driver command timed out".into()))
}

#[async_trait]
impl BrowserSession for NodeSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.send(DriverCommand::Navigate { url }).await.map(|_| ())
    }

    async fn current_url(&mut self) -> Result<String> {
        let value = self.send(DriverCommand::CurrentUrl).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn page_text(&mut self) -> Result<String> {
        let value = self.send(DriverCommand::PageText).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn fill_human(
        &mut self,
        selector: &str,
        text: &str,
        delay_ms: Range<u64>,
    ) -> Result<()> {
        self.send(DriverCommand::TypeText {
            selector,
            text,
            delay_min_ms: delay_ms.start,
            delay_max_ms: delay_ms.end.max(delay_ms.start + 1),
        })
        .await
        .map(|_| ())
    }

    async fn click(&mut self, selector: &str) -> Result<()> {
        self.send(DriverCommand::Click { selector }).await.map(|_| ())
    }

    async fn evaluate(&mut self, expression: &str) -> Result<Value> {
        self.send(DriverCommand::Evaluate { expression }).await
    }

    async fn collect_texts(&mut self, selectors: &[&str]) -> Result<Vec<String>> {
        let value = self.send(DriverCommand::CollectTexts { selectors }).await?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    async fn humanize(&mut self, duration_ms: u64) -> Result<()> {
        self.send(DriverCommand::Humanize { duration_ms })
            .await
            .map(|_| ())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>> {
        let value = self.send(DriverCommand::Screenshot).await?;
        let encoded = value.as_str().unwrap_or_default();
        BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| EngineError::Browser(format!("bad screenshot payload: {e}")))
    }

    async fn cookies(&mut self) -> Result<Vec<CookieRecord>> {
        let value = self.send(DriverCommand::Cookies).await?;
        serde_json::from_value(value).map_err(EngineError::Json)
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        // Best effort: the driver closes context and browser, then exits.
        if let Err(e) = self.send(DriverCommand::Close).await {
            warn!(task_id = %self.task_id, error = %e, "driver close failed, killing process");
        }
        self.closed = true;
        let _ = self.child.kill().await;
        Ok(())
    }
}

/// Assemble the Node driver script for one session.
fn build_driver_script(request: &OpenSessionRequest) -> Result<String> {
    let fingerprint = &request.fingerprint;
    let stealth = serde_json::to_string(&build_stealth_script(fingerprint))?;
    let cookies = serde_json::to_string(&playwright_cookies(&request.cookies))?;
    let context_options = json!({
        "userAgent": fingerprint.user_agent,
        "viewport": { "width": fingerprint.viewport.width, "height": fingerprint.viewport.height },
        "deviceScaleFactor": fingerprint.device_scale_factor,
        "hasTouch": fingerprint.has_touch,
        "locale": fingerprint.locale,
        "timezoneId": fingerprint.timezone,
        "geolocation": {
            "latitude": fingerprint.geolocation.latitude,
            "longitude": fingerprint.geolocation.longitude,
            "accuracy": fingerprint.geolocation.accuracy,
        },
        "permissions": ["geolocation"],
    })
    .to_string();
    let headless = request.headless;

    let mut script = String::new();
    script.push_str("import readline from 'node:readline';\n\n");
    script.push_str("const RESULT_MARKER = '__REGFLOW_DRIVER_RESULT__=';\n");
    script.push_str("const reply = (value) => process.stdout.write(`${RESULT_MARKER}${JSON.stringify({ ok: true, value })}\\n`);\n");
    script.push_str("const fail = (error) => process.stdout.write(`${RESULT_MARKER}${JSON.stringify({ ok: false, error: String(error && error.message || error) })}\\n`);\n");
    script.push_str("const sleep = (ms) => new Promise((resolve) => setTimeout(resolve, ms));\n");
    script.push_str("const between = (min, max) => min + Math.random() * (max - min);\n\n");

    script.push_str("let chromium;\n");
    script.push_str("try {\n");
    script.push_str("  ({ chromium } = await import('playwright'));\n");
    script.push_str("} catch (error) {\n");
    script.push_str("  fail(error);\n");
    script.push_str("  process.exit(1);\n");
    script.push_str("}\n\n");

    script.push_str(&format!("const contextOptions = {context_options};\n"));
    script.push_str(&format!("const stealth = {stealth};\n"));
    script.push_str(&format!("const savedCookies = {cookies};\n"));
    script.push_str("let browser;\n");
    script.push_str("let context;\n");
    script.push_str("let page;\n");
    script.push_str("try {\n");
    script.push_str(&format!(
        "  browser = await chromium.launch({{ headless: {headless}, args: ['--disable-blink-features=AutomationControlled'] }});\n"
    ));
    script.push_str("  context = await browser.newContext(contextOptions);\n");
    script.push_str("  await context.addInitScript(stealth);\n");
    script.push_str("  if (savedCookies.length > 0) {\n");
    script.push_str("    await context.addCookies(savedCookies).catch(() => {});\n");
    script.push_str("  }\n");
    script.push_str("  page = await context.newPage();\n");
    script.push_str("} catch (error) {\n");
    script.push_str("  fail(error);\n");
    script.push_str("  process.exit(1);\n");
    script.push_str("}\n\n");
    script.push_str("process.stdout.write('__REGFLOW_DRIVER_READY__\\n');\n\n");

    script.push_str("async function execute(command) {\n");
    script.push_str("  switch (command.cmd) {\n");
    script.push_str("    case 'navigate': {\n");
    script.push_str("      await page.goto(command.url, { waitUntil: 'networkidle' }).catch(async () => {\n");
    script.push_str("        await page.goto(command.url, { waitUntil: 'load' });\n");
    script.push_str("      });\n");
    script.push_str("      return null;\n");
    script.push_str("    }\n");
    script.push_str("    case 'current_url':\n");
    script.push_str("      return page.url();\n");
    script.push_str("    case 'page_text':\n");
    script.push_str("      return await page.evaluate(() => document.body ? document.body.innerText : '');\n");
    script.push_str("    case 'type_text': {\n");
    script.push_str("      const locator = page.locator(command.selector).first();\n");
    script.push_str("      await locator.waitFor({ state: 'visible', timeout: 15000 });\n");
    script.push_str("      await locator.click();\n");
    script.push_str("      for (const ch of command.text) {\n");
    script.push_str("        await page.keyboard.type(ch);\n");
    script.push_str("        await sleep(between(command.delay_min_ms, command.delay_max_ms));\n");
    script.push_str("      }\n");
    script.push_str("      return null;\n");
    script.push_str("    }\n");
    script.push_str("    case 'click': {\n");
    script.push_str("      const locator = page.locator(command.selector).first();\n");
    script.push_str("      await locator.waitFor({ state: 'visible', timeout: 15000 });\n");
    script.push_str("      await locator.click();\n");
    script.push_str("      return null;\n");
    script.push_str("    }\n");
    script.push_str("    case 'evaluate':\n");
    script.push_str("      return await page.evaluate(command.expression);\n");
    script.push_str("    case 'collect_texts': {\n");
    script.push_str("      const texts = [];\n");
    script.push_str("      for (const selector of command.selectors) {\n");
    script.push_str("        const values = await page.locator(selector).allInnerTexts().catch(() => []);\n");
    script.push_str("        for (const value of values) {\n");
    script.push_str("          const trimmed = value.trim();\n");
    script.push_str("          if (trimmed) texts.push(trimmed);\n");
    script.push_str("        }\n");
    script.push_str("      }\n");
    script.push_str("      return texts;\n");
    script.push_str("    }\n");
    script.push_str("    case 'humanize': {\n");
    script.push_str("      const until = Date.now() + command.duration_ms;\n");
    script.push_str("      while (Date.now() < until) {\n");
    script.push_str("        const viewport = page.viewportSize() || { width: 1280, height: 720 };\n");
    script.push_str("        await page.mouse.move(between(0, viewport.width), between(0, viewport.height), { steps: 8 });\n");
    script.push_str("        await page.mouse.wheel(0, between(-120, 240));\n");
    script.push_str("        await sleep(between(180, 600));\n");
    script.push_str("      }\n");
    script.push_str("      return null;\n");
    script.push_str("    }\n");
    script.push_str("    case 'screenshot': {\n");
    script.push_str("      const buffer = await page.screenshot({ fullPage: false });\n");
    script.push_str("      return buffer.toString('base64');\n");
    script.push_str("    }\n");
    script.push_str("    case 'cookies': {\n");
    script.push_str("      const cookies = await context.cookies();\n");
    script.push_str("      return cookies.map((c) => ({\n");
    script.push_str("        name: c.name, value: c.value, domain: c.domain, path: c.path,\n");
    script.push_str("        expires: c.expires, http_only: c.httpOnly, secure: c.secure,\n");
    script.push_str("        same_site: (c.sameSite || 'Lax').toLowerCase(),\n");
    script.push_str("      }));\n");
    script.push_str("    }\n");
    script.push_str("    case 'close': {\n");
    script.push_str("      await context.close().catch(() => {});\n");
    script.push_str("      await browser.close().catch(() => {});\n");
    script.push_str("      setImmediate(() => process.exit(0));\n");
    script.push_str("      return null;\n");
    script.push_str("    }\n");
    script.push_str("    default:\n");
    script.push_str("      throw new Error(`Unsupported command: ${command.cmd}`);\n");
    script.push_str("  }\n");
    script.push_str("}\n\n");

    script.push_str("const rl = readline.createInterface({ input: process.stdin });\n");
    script.push_str("for await (const line of rl) {\n");
    script.push_str("  if (!line.trim()) continue;\n");
    script.push_str("  try {\n");
    script.push_str("    const command = JSON.parse(line);\n");
    script.push_str("    reply(await execute(command));\n");
    script.push_str("  } catch (error) {\n");
    script.push_str("    fail(error);\n");
    script.push_str("  }\n");
    script.push_str("}\n");
    script.push_str("await context.close().catch(() => {});\n");
    script.push_str("await browser.close().catch(() => {});\n");

    Ok(script)
}

/// Map our cookie records to Playwright's `addCookies` shape.
fn playwright_cookies(cookies: &[CookieRecord]) -> Vec<Value> {
    cookies
        .iter()
        .map(|c| {
            json!({
                "name": c.name,
                "value": c.value,
                "domain": c.domain,
                "path": c.path,
                "expires": c.expires,
                "httpOnly": c.http_only,
                "secure": c.secure,
                "sameSite": match c.same_site {
                    regflow_models::SameSite::Strict => "Strict",
                    regflow_models::SameSite::Lax => "Lax",
                    regflow_models::SameSite::None => "None",
                },
            })
        })
        .collect()
}
