//! Retention sweep: find stale remote items by title prefix and delete them.
//!
//! A candidate is deleted only when its title starts with the task's search
//! string, both `created` and `modified` are older than `olderthandays`, it is
//! not delete protected, and a dry-run delete says the portal would allow it.
//! Per-item failures are logged and the sweep continues.

use chrono::{Days, NaiveDateTime};
use serde::Serialize;

use portalsync_core::{schedule, RetentionTask};

use crate::platform::{ContentPlatform, RemoteItem, SearchQuery};
use crate::runlog::RunLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskSkip {
    NoSearchString,
    NoSchedule,
    NotDue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum TaskStatus {
    /// The search succeeded; the task's sync date advances.
    Swept,
    /// The search itself failed; nothing was touched.
    Failed { message: String },
    Skipped { reason: TaskSkip },
}

/// Everything that happened to one retention task during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskReport {
    pub task: String,
    #[serde(flatten)]
    pub status: TaskStatus,
    /// Ids of deleted items.
    pub deleted: Vec<String>,
    pub kept: usize,
    /// Candidates whose delete (or dry run) raised an error.
    pub errors: usize,
}

impl TaskReport {
    fn new(task: &RetentionTask, status: TaskStatus) -> Self {
        Self {
            task: task.label().to_string(),
            status,
            deleted: Vec::new(),
            kept: 0,
            errors: 0,
        }
    }

    pub fn is_swept(&self) -> bool {
        self.status == TaskStatus::Swept
    }

    /// A failed search or any per-item delete error.
    pub fn has_failures(&self) -> bool {
        matches!(self.status, TaskStatus::Failed { .. }) || self.errors > 0
    }
}

/// Run one retention task if it is due. Does not touch the task's sync state.
pub fn sweep(
    task: &RetentionTask,
    platform: &dyn ContentPlatform,
    now: NaiveDateTime,
    log: &mut RunLog,
) -> TaskReport {
    let label = task.label().to_string();

    let Some(search) = task.search_string.as_deref().filter(|s| !s.is_empty()) else {
        log.skip(format!("Skipped task {label} - no search string configured"));
        return TaskReport::new(task, TaskStatus::Skipped { reason: TaskSkip::NoSearchString });
    };
    let Some(state) = task.sync.as_ref() else {
        log.skip(format!("Skipped task {label} - no sync schedule configured"));
        return TaskReport::new(task, TaskStatus::Skipped { reason: TaskSkip::NoSchedule });
    };
    if let Some(problem) = state.unreadable() {
        log.info(format!("Ignored sync block of task {label} ({problem}); running now"));
    }
    if !schedule::is_state_due(Some(state), now.date()) {
        log.skip(format!(
            "Skipped task {label} - not due ({}, last run {})",
            state.frequency_label(),
            state.last
        ));
        return TaskReport::new(task, TaskStatus::Skipped { reason: TaskSkip::NotDue });
    }

    log.info(format!("Running task {label}"));
    let query = SearchQuery::retention(search, task.owner.as_deref(), task.content_type.as_deref());
    let found = match platform.search(&query) {
        Ok(found) => found,
        Err(err) => {
            log.fail(format!("Failed to search for items matching {search}: {err}"));
            return TaskReport::new(
                task,
                TaskStatus::Failed {
                    message: err.to_string(),
                },
            );
        }
    };
    log.info(format!("Found {} items matching {query}", found.len()));

    let cutoff = now.checked_sub_days(Days::new(u64::from(task.older_than_days)));
    let mut report = TaskReport::new(task, TaskStatus::Swept);
    for item in &found {
        if !item.title.starts_with(search) {
            log.skip(format!("Skipped {} - title does not start with {search}", item.title));
            continue;
        }
        if !is_expired(item, cutoff) {
            log.info(format!(
                "Kept {} ({}) - changed within the last {} days",
                item.title, item.id, task.older_than_days
            ));
            report.kept += 1;
            continue;
        }
        if item.protected {
            log.info(format!("Kept {} ({}) - delete protected", item.title, item.id));
            report.kept += 1;
            continue;
        }
        delete_candidate(item, platform, log, &mut report);
    }
    log.pass(format!(
        "Completed task {label}: {} deleted, {} kept",
        report.deleted.len(),
        report.kept
    ));
    report
}

/// Both timestamps strictly older than `cutoff`. An unrepresentable cutoff
/// (absurd `olderthandays`) expires nothing.
fn is_expired(item: &RemoteItem, cutoff: Option<NaiveDateTime>) -> bool {
    match cutoff {
        Some(cutoff) => item.created < cutoff && item.modified < cutoff,
        None => false,
    }
}

fn delete_candidate(
    item: &RemoteItem,
    platform: &dyn ContentPlatform,
    log: &mut RunLog,
    report: &mut TaskReport,
) {
    let check = match platform.delete(item, true) {
        Ok(check) => check,
        Err(err) => {
            log.fail(format!("Failed to check whether {} can be deleted: {err}", item.title));
            report.errors += 1;
            return;
        }
    };
    if !check.can_delete {
        let reason = check.message.unwrap_or_else(|| "portal refused".to_string());
        log.info(format!("Kept {} ({}) - cannot be deleted: {reason}", item.title, item.id));
        report.kept += 1;
        return;
    }
    match platform.delete(item, false) {
        Ok(_) => {
            log.pass(format!("Deleted {} ({})", item.title, item.id));
            report.deleted.push(item.id.clone());
        }
        Err(err) => {
            log.fail(format!("Failed to delete {} ({}): {err}", item.title, item.id));
            report.errors += 1;
        }
    }
}
