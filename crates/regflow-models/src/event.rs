use crate::task::{StepStatus, TaskStatus};
use serde::{Deserialize, Serialize};

/// Event broadcast to subscribers on every task mutation.
///
/// Screenshot payloads are not carried on the event bus; subscribers fetch
/// them from the task record if they need the bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    Status { status: TaskStatus },
    Step { step_id: String, status: StepStatus },
    Log { line: String },
    DebugLog { line: String },
    Error { message: String },
    Screenshot { label: String },
}
