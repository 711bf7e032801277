use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{NewTask, TaskPatch};

/// Prefix of task ids minted locally for tasks created while offline.
pub const LOCAL_ID_PREFIX: &str = "local-";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    CreateTask,
    UpdateTask,
    DeleteTask,
    CompleteTask,
    ReopenTask,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::CreateTask => "create_task",
            ChangeKind::UpdateTask => "update_task",
            ChangeKind::DeleteTask => "delete_task",
            ChangeKind::CompleteTask => "complete_task",
            ChangeKind::ReopenTask => "reopen_task",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mutation waiting to be applied to the remote service.
///
/// Serialized as `{"type": "complete_task", "payload": {"task_id": "42"}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Mutation {
    CreateTask {
        task: NewTask,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        local_id: Option<String>,
    },
    UpdateTask {
        task_id: String,
        patch: TaskPatch,
    },
    DeleteTask {
        task_id: String,
    },
    CompleteTask {
        task_id: String,
    },
    ReopenTask {
        task_id: String,
    },
}

impl Mutation {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Mutation::CreateTask { .. } => ChangeKind::CreateTask,
            Mutation::UpdateTask { .. } => ChangeKind::UpdateTask,
            Mutation::DeleteTask { .. } => ChangeKind::DeleteTask,
            Mutation::CompleteTask { .. } => ChangeKind::CompleteTask,
            Mutation::ReopenTask { .. } => ChangeKind::ReopenTask,
        }
    }

    /// The task this mutation targets. Creates target nothing yet.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Mutation::CreateTask { .. } => None,
            Mutation::UpdateTask { task_id, .. }
            | Mutation::DeleteTask { task_id }
            | Mutation::CompleteTask { task_id }
            | Mutation::ReopenTask { task_id } => Some(task_id.as_str()),
        }
    }

    /// Replaces every reference to `from` with `to`, including parent links
    /// of queued creates. Returns whether anything changed.
    pub fn rewrite_task_id(&mut self, from: &str, to: &str) -> bool {
        match self {
            Mutation::CreateTask { task, .. } => {
                if task.parent_id.as_deref() == Some(from) {
                    task.parent_id = Some(to.to_string());
                    true
                } else {
                    false
                }
            }
            Mutation::UpdateTask { task_id, .. }
            | Mutation::DeleteTask { task_id }
            | Mutation::CompleteTask { task_id }
            | Mutation::ReopenTask { task_id } => {
                if task_id.as_str() == from {
                    *task_id = to.to_string();
                    true
                } else {
                    false
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingChange {
    pub id: Uuid,

    pub mutation: Mutation,

    pub timestamp: DateTime<Utc>,
}

impl PendingChange {
    pub fn new(mutation: Mutation, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            mutation,
            timestamp,
        }
    }

    pub fn kind(&self) -> ChangeKind {
        self.mutation.kind()
    }
}

pub fn new_local_id() -> String {
    format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4())
}

pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}
