//! Agenda parsing: checklist text into a task summary

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Tag marking the overarching goal line
pub const GOAL_TAG: &str = "@overall_goal";

const PENDING_MARKER: &str = "- [ ]";
const COMPLETED_MARKERS: [&str; 2] = ["- [x]", "- [X]"];
const IN_PROGRESS_MARKER: &str = "- [-]";

static RESULT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\((?:result|结果)\s*[:：]\s*(.+?)\)").unwrap());

static REASON_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\((?:reason|原因)\s*[:：]\s*(.+?)\)").unwrap());

/// Checklist state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

/// One checklist entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgendaTask {
    pub id: String,
    pub description: String,
    pub status: TaskStatus,
    /// Result of a completed task, or reason for an in-progress one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

/// Tasks grouped by bucket
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TasksByStatus {
    pub goals: Vec<AgendaTask>,
    pub pending: Vec<AgendaTask>,
    pub in_progress: Vec<AgendaTask>,
    pub completed: Vec<AgendaTask>,
}

/// Counts and buckets derived from an agenda document.
///
/// The goal task is reported in `goals` only and never counted in the other
/// buckets or the completion rate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgendaSummary {
    pub total_tasks: usize,
    pub pending_count: usize,
    pub completed_count: usize,
    pub in_progress_count: usize,
    pub goals_count: usize,
    /// Percentage of counted tasks that are completed; 0 when there are none
    pub completion_rate: f64,
    pub tasks_by_status: TasksByStatus,
}

impl AgendaSummary {
    /// The goal task, if the document declared one
    pub fn goal(&self) -> Option<&AgendaTask> {
        self.tasks_by_status.goals.first()
    }

    /// Whether the document contained no tasks at all
    pub fn is_empty(&self) -> bool {
        self.total_tasks == 0 && self.goals_count == 0
    }
}

/// Split `(label: value)` off a task line, returning the bare description and value
fn split_annotation(pattern: &Regex, text: &str) -> (String, Option<String>) {
    let value = pattern.captures(text).map(|caps| caps[1].trim().to_string());
    let description = pattern.replace(text, "").trim().to_string();
    (description, value)
}

/// Parse a checklist document.
///
/// Lines that are not `- [ ]`, `- [x]` or `- [-]` items are ignored. A line
/// tagged [`GOAL_TAG`] becomes the goal task with the status of its marker; if
/// several lines carry the tag, the last one wins.
pub fn parse_agenda(text: &str) -> AgendaSummary {
    let mut pending: Vec<String> = Vec::new();
    let mut completed: Vec<(String, Option<String>)> = Vec::new();
    let mut in_progress: Vec<(String, Option<String>)> = Vec::new();
    let mut goal: Option<AgendaTask> = None;

    for line in text.lines() {
        let line = line.trim();
        if !line.starts_with('-') {
            continue;
        }

        let (status, description, result) = if let Some(rest) = line.strip_prefix(PENDING_MARKER)
        {
            (TaskStatus::Pending, rest.trim().to_string(), None)
        } else if let Some(rest) = COMPLETED_MARKERS
            .iter()
            .find_map(|marker| line.strip_prefix(marker))
        {
            let (description, result) = split_annotation(&RESULT_PATTERN, rest);
            (TaskStatus::Completed, description, result)
        } else if let Some(rest) = line.strip_prefix(IN_PROGRESS_MARKER) {
            let (description, reason) = split_annotation(&REASON_PATTERN, rest);
            (TaskStatus::InProgress, description, reason)
        } else {
            continue;
        };

        if description.contains(GOAL_TAG) {
            if let Some(previous) = &goal {
                tracing::warn!(
                    "Agenda declares more than one goal; replacing '{}' with the later one",
                    previous.description
                );
            }
            let result = result.or_else(|| match status {
                TaskStatus::Completed => Some("goal achieved".to_string()),
                TaskStatus::InProgress => Some("goal in progress".to_string()),
                TaskStatus::Pending => None,
            });
            goal = Some(AgendaTask {
                id: "overall_goal".to_string(),
                description: description.replace(GOAL_TAG, "").trim().to_string(),
                status,
                result,
            });
            continue;
        }

        match status {
            TaskStatus::Pending => pending.push(description),
            TaskStatus::Completed => completed.push((description, result)),
            TaskStatus::InProgress => in_progress.push((description, result)),
        }
    }

    let total_tasks = pending.len() + completed.len() + in_progress.len();
    let completion_rate = if total_tasks > 0 {
        completed.len() as f64 / total_tasks as f64 * 100.0
    } else {
        0.0
    };

    let tasks_by_status = TasksByStatus {
        goals: goal.into_iter().collect(),
        pending: pending
            .into_iter()
            .enumerate()
            .map(|(i, description)| AgendaTask {
                id: format!("pending_{}", i),
                description,
                status: TaskStatus::Pending,
                result: None,
            })
            .collect(),
        in_progress: in_progress
            .into_iter()
            .enumerate()
            .map(|(i, (description, result))| AgendaTask {
                id: format!("in_progress_{}", i),
                description,
                status: TaskStatus::InProgress,
                result,
            })
            .collect(),
        completed: completed
            .into_iter()
            .enumerate()
            .map(|(i, (description, result))| AgendaTask {
                id: format!("completed_{}", i),
                description,
                status: TaskStatus::Completed,
                result,
            })
            .collect(),
    };

    AgendaSummary {
        total_tasks,
        pending_count: tasks_by_status.pending.len(),
        completed_count: tasks_by_status.completed.len(),
        in_progress_count: tasks_by_status.in_progress.len(),
        goals_count: tasks_by_status.goals.len(),
        completion_rate,
        tasks_by_status,
    }
}
