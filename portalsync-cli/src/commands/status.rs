//! `portalsync status`: what would run today. Read-only.

use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use portalsync_core::{schedule, settings, Settings, SyncState};

use super::ConfigArg;

/// Arguments for `portalsync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<ExitCode> {
        let path = &self.config.config;
        let settings = settings::load_at(path).with_context(|| {
            format!(
                "failed to load {}; run `portalsync init` first",
                path.display()
            )
        })?;

        let report = build_report(&settings, Local::now().date_naive());
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
            );
        } else {
            print_table(&settings, report);
        }
        Ok(ExitCode::SUCCESS)
    }
}

#[derive(Debug, Serialize)]
struct StatusReport {
    today: NaiveDate,
    services: Vec<EntryStatus>,
    tasks: Vec<EntryStatus>,
}

#[derive(Debug, Serialize)]
struct EntryStatus {
    name: String,
    /// Service type, or the search string for tasks.
    kind: String,
    process: bool,
    frequency: Option<String>,
    last_sync: Option<NaiveDate>,
    due: bool,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "type")]
    kind: String,
    #[tabled(rename = "frequency")]
    frequency: String,
    #[tabled(rename = "last sync")]
    last_sync: String,
    #[tabled(rename = "status")]
    status: String,
}

fn build_report(settings: &Settings, today: NaiveDate) -> StatusReport {
    let services = settings
        .services
        .iter()
        .map(|item| {
            let sync = item.sync_state();
            EntryStatus {
                name: item.name.to_string(),
                kind: item.kind.to_string(),
                process: item.process,
                frequency: Some(sync.frequency_label()),
                last_sync: Some(sync.last),
                due: item.process && schedule::is_state_due(Some(&sync), today),
            }
        })
        .collect();

    let tasks = settings
        .tasks()
        .iter()
        .map(|task| EntryStatus {
            name: task.label().to_string(),
            kind: task.search_string.clone().unwrap_or_default(),
            process: task.search_string.is_some() && task.sync.is_some(),
            frequency: task.sync.as_ref().map(SyncState::frequency_label),
            last_sync: task.sync.as_ref().map(|s| s.last),
            due: task.search_string.is_some()
                && task
                    .sync
                    .as_ref()
                    .is_some_and(|s| schedule::is_state_due(Some(s), today)),
        })
        .collect();

    StatusReport {
        today,
        services,
        tasks,
    }
}

fn print_table(settings: &Settings, report: StatusReport) {
    let due = report
        .services
        .iter()
        .chain(report.tasks.iter())
        .filter(|e| e.due)
        .count();
    println!(
        "portalsync v{} | {} | {} services | {} tasks | {} due",
        env!("CARGO_PKG_VERSION"),
        settings.portal,
        report.services.len(),
        report.tasks.len(),
        due,
    );

    if report.services.is_empty() && report.tasks.is_empty() {
        println!("No services or tasks configured.");
        return;
    }

    let rows: Vec<StatusTableRow> = report
        .services
        .into_iter()
        .chain(report.tasks.into_iter().map(|mut task| {
            task.name = format!("task: {}", task.name);
            task
        }))
        .map(|entry| StatusTableRow {
            status: status_label(&entry),
            name: entry.name,
            kind: entry.kind,
            frequency: entry.frequency.unwrap_or_else(|| "-".to_string()),
            last_sync: entry
                .last_sync
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn status_label(entry: &EntryStatus) -> String {
    if !entry.process {
        "OFF".bright_black().to_string()
    } else if entry.due {
        "DUE".yellow().bold().to_string()
    } else {
        "CURRENT".green().to_string()
    }
}
