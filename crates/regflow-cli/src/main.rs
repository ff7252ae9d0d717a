mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use regflow_core::{AutomationService, EngineConfig};
use regflow_models::{AutomationTask, Provider, TaskEvent, TaskStatus};
use std::process::ExitCode;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("regflow=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Probe => probe().await,
        Commands::Run {
            provider,
            email,
            password,
            headed,
            debug,
        } => run(&provider, email, password, headed, debug).await,
    }
}

fn parse_provider(name: &str) -> Result<Provider> {
    match name {
        "cursor" => Ok(Provider::Cursor),
        other => anyhow::bail!("unknown provider: {other}"),
    }
}

async fn probe() -> Result<ExitCode> {
    let probe = regflow_browser::probe_runtime().await;
    println!("node available:       {}", probe.node_available);
    if let Some(version) = &probe.node_version {
        println!("node version:         {version}");
    }
    println!("playwright available: {}", probe.playwright_package_available);
    for note in &probe.notes {
        println!("note: {note}");
    }
    if probe.ready {
        println!("runtime ready");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("runtime NOT ready");
        Ok(ExitCode::FAILURE)
    }
}

async fn run(
    provider: &str,
    email: String,
    password: Option<String>,
    headed: bool,
    debug: bool,
) -> Result<ExitCode> {
    let provider = parse_provider(provider)?;
    let mut config = EngineConfig::from_env();
    if headed {
        config.headless = false;
    }
    if debug {
        config.debug_default = true;
    }

    let service = AutomationService::with_defaults(config);
    let task_id = service.create_task(provider, email, password);
    println!("task {task_id}");

    let task = watch(&service, &task_id).await?;
    for error in &task.error_messages {
        eprintln!("error: {error}");
    }
    match task.status {
        TaskStatus::Completed => {
            println!("account created: {}", task.email);
            Ok(ExitCode::SUCCESS)
        }
        _ => {
            println!("signup failed for {}", task.email);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Stream a task's events until it reaches a terminal state, then return the
/// final record.
async fn watch(service: &AutomationService, task_id: &str) -> Result<AutomationTask> {
    let mut events = service
        .subscribe(task_id)
        .ok_or_else(|| anyhow::anyhow!("task vanished before it could be watched"))?;

    // Events emitted between task creation and this subscription are gone;
    // without this check a task that already finished would leave the recv
    // loop waiting forever, since the broadcast sender is never dropped.
    let finished = service
        .get_task(task_id)
        .map(|t| t.status.is_terminal())
        .unwrap_or(false);

    while !finished {
        match events.recv().await {
            Ok(event) => {
                print_event(&event);
                if let TaskEvent::Status { status } = event {
                    if status.is_terminal() {
                        break;
                    }
                }
            }
            // Dropped events do not matter for the final report.
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }

    service
        .get_task(task_id)
        .ok_or_else(|| anyhow::anyhow!("task vanished from the store"))
}

fn print_event(event: &TaskEvent) {
    match event {
        TaskEvent::Status { status } => println!("status: {status:?}"),
        TaskEvent::Step { step_id, status } => println!("step {step_id}: {status:?}"),
        TaskEvent::Log { line } => println!("{line}"),
        TaskEvent::DebugLog { line } => println!("  [debug] {line}"),
        TaskEvent::Error { message } => println!("error: {message}"),
        TaskEvent::Screenshot { label } => println!("screenshot captured: {label}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regflow_core::testkit::{
        MemorySessionStore, PageState, RecordingGateway, ScriptedMailbox, ScriptedRuntime,
    };
    use regflow_core::{EngineDeps, EngineTimings};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn unknown_provider_is_rejected() {
        assert!(parse_provider("cursor").is_ok());
        assert!(parse_provider("definitely-not-a-provider").is_err());
    }

    #[tokio::test]
    async fn watch_returns_for_a_task_that_finished_before_subscribing() {
        let config = EngineConfig {
            timings: EngineTimings::compressed(),
            ..EngineConfig::default()
        };
        // A single scripted page: the submission goes nowhere, the task fails
        // quickly after its retries.
        let service = AutomationService::new(
            config,
            EngineDeps {
                runtime: Arc::new(ScriptedRuntime::new(vec![PageState::new(
                    "https://authenticator.cursor.sh/sign-up",
                    "Create your account",
                )])),
                email: Arc::new(ScriptedMailbox::default()),
                captcha: None,
                gateway: Arc::new(RecordingGateway::default()),
                session_store: Arc::new(MemorySessionStore::default()),
            },
        );
        let id = service.create_task(Provider::Cursor, "late@example.com".to_string(), None);

        // Let the task finish before anyone watches it.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while !service
            .get_task(&id)
            .map(|t| t.status.is_terminal())
            .unwrap_or(false)
        {
            assert!(tokio::time::Instant::now() < deadline, "task never finished");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let task = tokio::time::timeout(Duration::from_secs(5), watch(&service, &id))
            .await
            .expect("watching a finished task must not hang")
            .unwrap();
        assert!(task.status.is_terminal());
    }
}
