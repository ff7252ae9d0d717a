use crate::provider::Provider;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One entry of a task's fixed step ladder. The set of steps is defined by
/// the provider profile at creation time; only `status` mutates afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationStep {
    pub id: String,
    pub label: String,
    pub status: StepStatus,
}

/// Diagnostic page capture. Serialized as base64 for API consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Screenshot {
    pub label: String,
    pub captured_at: DateTime<Utc>,
    #[serde(with = "b64")]
    pub data: Vec<u8>,
}

/// One requested account-creation job, tracked through up to N attempts to a
/// terminal outcome.
///
/// Fields are public for serialization, but every mutation must go through
/// the methods below (and, one level up, through the `TaskStore`) so that the
/// status machine stays monotone: `pending -> running -> completed|failed`,
/// with no transition out of a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationTask {
    pub id: String,
    pub provider: Provider,
    pub email: String,
    pub password: String,
    pub status: TaskStatus,
    pub steps: Vec<AutomationStep>,
    pub logs: Vec<String>,
    pub debug_logs: Vec<String>,
    pub screenshots: Vec<Screenshot>,
    pub error_messages: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Number of leading `debug_logs` lines preserved across retries.
    /// Captured when the task enters `running`.
    #[serde(skip)]
    debug_preserved: usize,
}

impl AutomationTask {
    pub fn new(provider: Provider, email: String, password: String) -> Self {
        let steps = provider
            .profile()
            .steps
            .iter()
            .map(|def| AutomationStep {
                id: def.id.to_string(),
                label: def.label.to_string(),
                status: StepStatus::Pending,
            })
            .collect();

        Self {
            id: Uuid::new_v4().to_string(),
            provider,
            email,
            password,
            status: TaskStatus::Pending,
            steps,
            logs: Vec::new(),
            debug_logs: Vec::new(),
            screenshots: Vec::new(),
            error_messages: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
            debug_preserved: 0,
        }
    }

    /// Enter `running`. Only valid from `pending`; later calls are no-ops so
    /// the multi-attempt loop can call it unconditionally. Returns whether
    /// the status actually changed.
    pub fn start(&mut self) -> bool {
        if self.status != TaskStatus::Pending {
            return false;
        }
        self.status = TaskStatus::Running;
        self.debug_preserved = self.debug_logs.len();
        true
    }

    /// Enter the terminal `completed` state. Returns false once terminal.
    pub fn complete(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
        true
    }

    /// Enter the terminal `failed` state. Returns false once terminal.
    pub fn fail(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = TaskStatus::Failed;
        self.completed_at = Some(Utc::now());
        true
    }

    /// Set the status of one step by id. Returns false for unknown ids and
    /// for tasks already in a terminal state.
    pub fn set_step_status(&mut self, step_id: &str, status: StepStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        match self.steps.iter_mut().find(|s| s.id == step_id) {
            Some(step) => {
                step.status = status;
                true
            }
            None => false,
        }
    }

    pub fn append_log(&mut self, line: impl Into<String>) {
        self.logs.push(line.into());
    }

    pub fn append_debug_log(&mut self, line: impl Into<String>) {
        self.debug_logs.push(line.into());
    }

    pub fn push_error(&mut self, message: impl Into<String>) {
        self.error_messages.push(message.into());
    }

    pub fn push_screenshot(&mut self, label: impl Into<String>, data: Vec<u8>) {
        self.screenshots.push(Screenshot {
            label: label.into(),
            captured_at: Utc::now(),
            data,
        });
    }

    /// Reset per-attempt state for a retry. Step statuses go back to
    /// `pending`, the current attempt's errors and screenshots are dropped,
    /// and `debug_logs` is trimmed to the preserved bootstrap prefix. Logs
    /// are append-only and survive.
    pub fn reset_for_retry(&mut self) {
        for step in &mut self.steps {
            step.status = StepStatus::Pending;
        }
        self.error_messages.clear();
        self.screenshots.clear();
        self.debug_logs.truncate(self.debug_preserved);
    }
}

mod b64 {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> AutomationTask {
        AutomationTask::new(
            Provider::Cursor,
            "user@example.com".to_string(),
            "hunter2!".to_string(),
        )
    }

    #[test]
    fn steps_come_from_provider_profile() {
        let task = task();
        let ids: Vec<&str> = task.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["load", "form", "submit", "redirect", "email_verify"]);
        assert!(task.steps.iter().all(|s| s.status == StepStatus::Pending));
    }

    #[test]
    fn status_is_monotone_and_completed_at_set_once() {
        let mut task = task();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.completed_at.is_none());

        task.start();
        assert_eq!(task.status, TaskStatus::Running);

        task.complete();
        let first = task.completed_at.expect("terminal sets completed_at");

        // Terminal state is sticky in both directions.
        task.fail();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.completed_at, Some(first));
        task.complete();
        assert_eq!(task.completed_at, Some(first));
    }

    #[test]
    fn step_mutation_rejected_after_terminal() {
        let mut task = task();
        task.start();
        assert!(task.set_step_status("load", StepStatus::Completed));
        task.fail();
        assert!(!task.set_step_status("form", StepStatus::Running));
    }

    #[test]
    fn retry_reset_preserves_cardinality_and_debug_prefix() {
        let mut task = task();
        task.append_debug_log("bootstrap: profile loaded");
        task.start();
        task.append_debug_log("attempt chatter");
        task.push_error("rate limited");
        task.push_screenshot("after-submit", vec![1, 2, 3]);
        task.set_step_status("submit", StepStatus::Failed);
        let step_count = task.steps.len();

        task.reset_for_retry();

        assert_eq!(task.steps.len(), step_count);
        assert!(task.steps.iter().all(|s| s.status == StepStatus::Pending));
        assert!(task.error_messages.is_empty());
        assert!(task.screenshots.is_empty());
        assert_eq!(task.debug_logs, ["bootstrap: profile loaded"]);
    }

    #[test]
    fn screenshot_roundtrips_as_base64() {
        let shot = Screenshot {
            label: "after-load".to_string(),
            captured_at: Utc::now(),
            data: vec![0x89, 0x50, 0x4e, 0x47],
        };
        let json = serde_json::to_value(&shot).unwrap();
        assert_eq!(json["data"], "iVBORw==");
        let back: Screenshot = serde_json::from_value(json).unwrap();
        assert_eq!(back.data, shot.data);
    }
}
