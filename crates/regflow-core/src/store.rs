//! Task state machine and event bus.
//!
//! The store is the sole writer of task state. Every mutation goes through
//! a method here, which takes the per-entry DashMap lock, applies the change
//! through the model's guarded mutators, and broadcasts a [`TaskEvent`] to
//! that task's subscribers. Different tasks mutate fully in parallel; one
//! task's mutations are serialized by its entry lock.
//!
//! The store is an injectable service, not a process-wide global: each
//! engine (and each test) constructs its own instance.

use dashmap::DashMap;
use regflow_models::{AutomationTask, Provider, StepStatus, TaskEvent, TaskStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tracing::info;

const EVENT_BUFFER: usize = 256;

pub struct TaskStore {
    tasks: DashMap<String, AutomationTask>,
    channels: DashMap<String, broadcast::Sender<TaskEvent>>,
    debug: AtomicBool,
}

impl TaskStore {
    pub fn new(debug_default: bool) -> Self {
        Self {
            tasks: DashMap::new(),
            channels: DashMap::new(),
            debug: AtomicBool::new(debug_default),
        }
    }

    /// Create a task in `pending` with its provider-defined step ladder.
    pub fn create_task(&self, provider: Provider, email: String, password: String) -> String {
        let task = AutomationTask::new(provider, email, password);
        let id = task.id.clone();
        let (sender, _) = broadcast::channel(EVENT_BUFFER);
        self.channels.insert(id.clone(), sender);
        self.tasks.insert(id.clone(), task);
        info!(task_id = %id, provider = ?provider, "Task created");
        id
    }

    pub fn get(&self, id: &str) -> Option<AutomationTask> {
        self.tasks.get(id).map(|entry| entry.clone())
    }

    /// All tasks, newest first.
    pub fn list(&self) -> Vec<AutomationTask> {
        let mut tasks: Vec<AutomationTask> =
            self.tasks.iter().map(|entry| entry.clone()).collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks
    }

    /// Subscribe to mutation events for one task. Lagging receivers drop old
    /// events rather than blocking mutators.
    pub fn subscribe(&self, id: &str) -> Option<broadcast::Receiver<TaskEvent>> {
        self.channels.get(id).map(|sender| sender.subscribe())
    }

    pub fn set_debug(&self, enabled: bool) {
        self.debug.store(enabled, Ordering::Relaxed);
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    // ── mutators ─────────────────────────────────────────────────────

    pub fn start(&self, id: &str) {
        self.mutate(id, TaskEvent::Status { status: TaskStatus::Running }, |task| {
            task.start()
        });
    }

    pub fn complete(&self, id: &str) {
        self.mutate(id, TaskEvent::Status { status: TaskStatus::Completed }, |task| {
            task.complete()
        });
    }

    pub fn fail(&self, id: &str) {
        self.mutate(id, TaskEvent::Status { status: TaskStatus::Failed }, |task| {
            task.fail()
        });
    }

    pub fn set_step_status(&self, id: &str, step_id: &str, status: StepStatus) {
        let event = TaskEvent::Step {
            step_id: step_id.to_string(),
            status,
        };
        self.mutate(id, event, |task| task.set_step_status(step_id, status));
    }

    pub fn append_log(&self, id: &str, line: impl Into<String>) {
        let line = line.into();
        info!(task_id = %id, "{line}");
        self.mutate(id, TaskEvent::Log { line: line.clone() }, |task| {
            task.append_log(line.clone());
            true
        });
    }

    /// Appended only while debug mode is enabled.
    pub fn append_debug_log(&self, id: &str, line: impl Into<String>) {
        if !self.debug_enabled() {
            return;
        }
        let line = line.into();
        self.mutate(id, TaskEvent::DebugLog { line: line.clone() }, |task| {
            task.append_debug_log(line.clone());
            true
        });
    }

    pub fn push_error(&self, id: &str, message: impl Into<String>) {
        let message = message.into();
        self.mutate(id, TaskEvent::Error { message: message.clone() }, |task| {
            task.push_error(message.clone());
            true
        });
    }

    pub fn push_screenshot(&self, id: &str, label: impl Into<String>, data: Vec<u8>) {
        let label = label.into();
        self.mutate(id, TaskEvent::Screenshot { label: label.clone() }, |task| {
            task.push_screenshot(label.clone(), data);
            true
        });
    }

    /// Reset per-attempt state ahead of a retry: failed steps back to
    /// pending, errors and screenshots cleared, debug logs trimmed to the
    /// bootstrap prefix.
    pub fn reset_for_retry(&self, id: &str) {
        let Some(mut entry) = self.tasks.get_mut(id) else {
            return;
        };
        entry.reset_for_retry();
        drop(entry);
        self.emit(
            id,
            TaskEvent::Status {
                status: TaskStatus::Running,
            },
        );
    }

    /// Apply one mutation under the entry lock. The event goes out only when
    /// the model reports an actual change, so subscribers never observe a
    /// state the task was not in (e.g. a `failed` status event for a task
    /// that already completed).
    fn mutate(&self, id: &str, event: TaskEvent, apply: impl FnOnce(&mut AutomationTask) -> bool) {
        let Some(mut entry) = self.tasks.get_mut(id) else {
            return;
        };
        let changed = apply(&mut entry);
        drop(entry);
        if changed {
            self.emit(id, event);
        }
    }

    fn emit(&self, id: &str, event: TaskEvent) {
        if let Some(sender) = self.channels.get(id) {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regflow_models::Provider;

    fn store() -> TaskStore {
        TaskStore::new(false)
    }

    fn new_task(store: &TaskStore) -> String {
        store.create_task(
            Provider::Cursor,
            "user@example.com".to_string(),
            "pw".to_string(),
        )
    }

    #[test]
    fn list_is_newest_first() {
        let store = store();
        let first = new_task(&store);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = new_task(&store);

        let listed = store.list();
        assert_eq!(listed[0].id, second);
        assert_eq!(listed[1].id, first);
    }

    #[test]
    fn terminal_status_is_sticky() {
        let store = store();
        let id = new_task(&store);
        store.start(&id);
        store.complete(&id);
        store.fail(&id);

        let task = store.get(&id).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn debug_logs_respect_debug_flag() {
        let store = store();
        let id = new_task(&store);
        store.append_debug_log(&id, "dropped");
        store.set_debug(true);
        store.append_debug_log(&id, "kept");

        assert_eq!(store.get(&id).unwrap().debug_logs, ["kept"]);
    }

    #[tokio::test]
    async fn subscribers_see_mutation_events() {
        let store = store();
        let id = new_task(&store);
        let mut events = store.subscribe(&id).unwrap();

        store.start(&id);
        store.set_step_status(&id, "load", StepStatus::Running);
        store.append_log(&id, "opening signup page");

        assert_eq!(
            events.recv().await.unwrap(),
            TaskEvent::Status {
                status: TaskStatus::Running
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            TaskEvent::Step {
                step_id: "load".to_string(),
                status: StepStatus::Running
            }
        );
        assert!(matches!(events.recv().await.unwrap(), TaskEvent::Log { .. }));
    }

    #[tokio::test]
    async fn rejected_mutations_emit_no_event() {
        let store = store();
        let id = new_task(&store);
        store.start(&id);
        store.complete(&id);

        let mut events = store.subscribe(&id).unwrap();
        store.fail(&id);
        store.set_step_status(&id, "form", StepStatus::Running);
        store.append_log(&id, "epilogue");

        // Both rejected mutations are silent; the first observable event is
        // the log line, not a Failed status the task never had.
        match events.recv().await.unwrap() {
            TaskEvent::Log { line } => assert_eq!(line, "epilogue"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(store.get(&id).unwrap().status, TaskStatus::Completed);
    }

    #[test]
    fn retry_reset_keeps_step_cardinality() {
        let store = store();
        let id = new_task(&store);
        store.start(&id);
        store.set_step_status(&id, "submit", StepStatus::Failed);
        store.push_error(&id, "rate limited");
        let before = store.get(&id).unwrap().steps.len();

        store.reset_for_retry(&id);

        let task = store.get(&id).unwrap();
        assert_eq!(task.steps.len(), before);
        assert!(task.steps.iter().all(|s| s.status == StepStatus::Pending));
        assert!(task.error_messages.is_empty());
    }
}
