//! Onboarding task checklist.
//!
//! The task list itself is static configuration; only the `finished` flags
//! change, merged in place from the backend's module-status report.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single step of an onboarding task.
#[derive(Debug, Clone, PartialEq)]
pub struct SubTask {
    pub id: u32,
    /// Localized name key
    pub name: String,
    pub finished: bool,
    /// Dashboard route that lets the user complete this step
    pub redirect_url: String,
}

/// An onboarding task with its subtasks.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: u32,
    /// Localized title key
    pub title: String,
    pub finished: bool,
    pub subtasks: Vec<SubTask>,
}

/// Completion state of one subtask as reported by the backend.
/// Subtask ids arrive as strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubTaskCompletion {
    pub id: String,
    pub finished: bool,
}

/// Completion state of one task as reported by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskCompletion {
    pub finished: bool,
    /// Whether the backend served this report from its own cache
    #[serde(default)]
    pub cached: bool,
    #[serde(default)]
    pub subtasks: Vec<SubTaskCompletion>,
}

/// Backend module-status report, keyed `task_{id}`.
pub type TaskCompletionMap = HashMap<String, TaskCompletion>;

fn subtask(id: u32, name: &str, redirect_url: &str) -> SubTask {
    SubTask {
        id,
        name: name.to_string(),
        finished: false,
        redirect_url: redirect_url.to_string(),
    }
}

/// The static onboarding checklist shown on the dashboard.
pub fn default_tasks() -> Vec<Task> {
    vec![
        Task {
            id: 1,
            title: "TASK_SUPPORT_SETUP_TITLE".to_string(),
            finished: false,
            subtasks: vec![
                subtask(1, "TASK_SUPPORT_FORUM", "/dashboard/support/setup"),
                subtask(2, "TASK_SUPPORT_THEMES", "/dashboard/support/themes"),
                subtask(3, "TASK_SUPPORT_SNIPPETS", "/dashboard/support/snippets"),
            ],
        },
        Task {
            id: 2,
            title: "TASK_SECURITY_SETUP_TITLE".to_string(),
            finished: false,
            subtasks: vec![
                subtask(1, "TASK_SECURITY_LOGS", "/dashboard/security/logs"),
                subtask(2, "TASK_SECURITY_SHIELD", "/dashboard/security/shield"),
            ],
        },
        Task {
            id: 3,
            title: "TASK_EVENTS_SETUP_TITLE".to_string(),
            finished: false,
            subtasks: vec![
                subtask(1, "TASK_EVENTS_GIVEAWAY", "/dashboard/events/design"),
                subtask(2, "TASK_EVENTS_ROLES", "/dashboard/events/roles"),
            ],
        },
    ]
}

/// Merge a backend completion report into the task list.
///
/// Flags are copied, never toggled, so applying the same report twice yields
/// the same result as applying it once. Tasks or subtasks the report does not
/// mention keep their current flags.
pub fn merge_completion(tasks: &mut [Task], report: &TaskCompletionMap) {
    for task in tasks.iter_mut() {
        let status = match report.get(&format!("task_{}", task.id)) {
            Some(status) => status,
            None => continue,
        };
        task.finished = status.finished;
        for sub in task.subtasks.iter_mut() {
            if let Some(matching) = status
                .subtasks
                .iter()
                .find(|s| s.id == sub.id.to_string())
            {
                sub.finished = matching.finished;
            }
        }
    }
}

/// Number of finished tasks plus finished subtasks.
pub fn completed_count(tasks: &[Task]) -> usize {
    tasks.iter().filter(|t| t.finished).count()
        + tasks
            .iter()
            .flat_map(|t| &t.subtasks)
            .filter(|s| s.finished)
            .count()
}

/// Total number of tasks plus subtasks.
pub fn total_count(tasks: &[Task]) -> usize {
    tasks.len() + tasks.iter().map(|t| t.subtasks.len()).sum::<usize>()
}

/// A task counts as in progress once any of its subtasks is finished.
pub fn in_progress(subtasks: &[SubTask]) -> bool {
    subtasks.iter().any(|s| s.finished)
}
