use serde::{Deserialize, Serialize};

/// Priority as the remote service encodes it: 1 is normal, 4 is urgent.
pub const DEFAULT_PRIORITY: u8 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Due {
    #[serde(default)]
    pub string: String,

    pub date: String,

    #[serde(default)]
    pub is_recurring: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,

    pub content: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub project_id: Option<String>,

    #[serde(default)]
    pub section_id: Option<String>,

    #[serde(default)]
    pub parent_id: Option<String>,

    #[serde(default)]
    pub labels: Vec<String>,

    #[serde(default = "default_priority")]
    pub priority: u8,

    #[serde(default)]
    pub due: Option<Due>,

    #[serde(default)]
    pub is_completed: bool,

    #[serde(default)]
    pub order: i64,

    #[serde(default)]
    pub created_at: Option<String>,
}

impl Task {
    /// Builds the locally visible copy of a task that has not reached the
    /// server yet.
    pub fn provisional(local_id: String, new: &NewTask) -> Self {
        Self {
            id: local_id,
            content: new.content.clone(),
            description: new.description.clone().unwrap_or_default(),
            project_id: new.project_id.clone(),
            section_id: new.section_id.clone(),
            parent_id: new.parent_id.clone(),
            labels: new.labels.clone(),
            priority: new.priority.unwrap_or(DEFAULT_PRIORITY),
            due: new.due_string.as_ref().map(|text| Due {
                string: text.clone(),
                date: String::new(),
                is_recurring: false,
                datetime: None,
                timezone: None,
            }),
            is_completed: false,
            order: 0,
            created_at: None,
        }
    }

    pub fn apply_patch(&mut self, patch: &TaskPatch) {
        if let Some(content) = &patch.content {
            self.content = content.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(labels) = &patch.labels {
            self.labels = labels.clone();
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(due) = &patch.due_string {
            self.due = Some(Due {
                string: due.clone(),
                date: String::new(),
                is_recurring: false,
                datetime: None,
                timezone: None,
            });
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub color: Option<String>,

    #[serde(default)]
    pub parent_id: Option<String>,

    #[serde(default)]
    pub order: i64,

    #[serde(default)]
    pub is_favorite: bool,

    #[serde(default)]
    pub is_inbox_project: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Label {
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub color: Option<String>,

    #[serde(default)]
    pub order: i64,

    #[serde(default)]
    pub is_favorite: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Section {
    pub id: String,

    pub project_id: String,

    pub name: String,

    #[serde(default)]
    pub order: i64,
}

/// Body of a create-task request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct NewTask {
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_string: Option<String>,
}

impl NewTask {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }
}

/// Field delta of an update-task request. Absent fields are left untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_string: Option<String>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

fn default_priority() -> u8 {
    DEFAULT_PRIORITY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_tolerates_unknown_and_missing_fields() {
        let raw = r#"{
            "id": "2995104339",
            "content": "Buy milk",
            "project_id": "2203306141",
            "url": "https://example.invalid/task/2995104339",
            "comment_count": 0
        }"#;
        let task: Task = serde_json::from_str(raw).expect("parse task");
        assert_eq!(task.id, "2995104339");
        assert_eq!(task.priority, DEFAULT_PRIORITY);
        assert!(task.labels.is_empty());
        assert!(task.due.is_none());
    }

    #[test]
    fn patch_only_serializes_present_fields() {
        let patch = TaskPatch {
            content: Some("Buy oat milk".to_string()),
            ..TaskPatch::default()
        };
        let json = serde_json::to_value(&patch).expect("serialize patch");
        assert_eq!(json, serde_json::json!({"content": "Buy oat milk"}));
        assert!(TaskPatch::default().is_empty());
    }

    #[test]
    fn apply_patch_touches_only_given_fields() {
        let mut task = Task::provisional("local-1".to_string(), &NewTask::new("Draft"));
        task.apply_patch(&TaskPatch {
            priority: Some(4),
            due_string: Some("tomorrow".to_string()),
            ..TaskPatch::default()
        });
        assert_eq!(task.content, "Draft");
        assert_eq!(task.priority, 4);
        assert_eq!(task.due.map(|d| d.string), Some("tomorrow".to_string()));
    }
}
