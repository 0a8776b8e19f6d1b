//! `portalsync run`: one full publish and retention run.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use portalsync_core::SettingsPaths;
use portalsync_engine::retention::TaskSkip;
use portalsync_engine::stage::SkipReason;
use portalsync_engine::{run_at, ItemStatus, RunReport, TaskStatus};
use portalsync_portal::PortalConnector;
use portalsync_toolkit::ToolkitBuilder;

use super::ConfigArg;

/// Exit code of `--strict` when any item or task failed.
const STRICT_FAILURE: u8 = 2;

/// Arguments for `portalsync run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Run log to append to (default: services.log beside the settings file).
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Directory for staged packages (default: staging/ beside the settings file).
    #[arg(long, value_name = "DIR")]
    pub staging: Option<PathBuf>,

    /// Exit with status 2 if any service or task failed.
    #[arg(long)]
    pub strict: bool,
}

impl RunArgs {
    pub fn run(self) -> Result<ExitCode> {
        let mut paths = SettingsPaths::beside(self.config.config.clone());
        if let Some(log) = self.log_file {
            paths.log = log;
        }
        if let Some(staging) = self.staging {
            paths.staging = staging;
        }

        let connector: PortalConnector = PortalConnector::default();
        let mut builder = ToolkitBuilder::default();
        let now = Local::now().naive_local();

        let report = run_at(&paths, &connector, &mut builder, now)
            .with_context(|| format!("run halted (see {} for details)", paths.log.display()))?;

        print_report(&report);
        if self.strict && report.failures() > 0 {
            return Ok(ExitCode::from(STRICT_FAILURE));
        }
        Ok(ExitCode::SUCCESS)
    }
}

#[derive(Tabled)]
struct ReportRow {
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "result")]
    result: String,
    #[tabled(rename = "detail")]
    detail: String,
}

fn print_report(report: &RunReport) {
    let skipped = report
        .items
        .iter()
        .filter(|i| matches!(i.status, ItemStatus::Skipped { .. }))
        .count();
    println!(
        "portalsync v{} | {} published | {} skipped | {} failed",
        env!("CARGO_PKG_VERSION"),
        report.published(),
        skipped,
        report.failures(),
    );

    let mut rows: Vec<ReportRow> = report
        .items
        .iter()
        .map(|item| {
            let (result, detail) = match &item.status {
                ItemStatus::Published => ("PUBLISHED".green().to_string(), String::new()),
                ItemStatus::Failed { stage } => {
                    let detail = item
                        .outcome(*stage)
                        .and_then(|o| o.detail.clone())
                        .unwrap_or_default();
                    (
                        "FAILED".red().bold().to_string(),
                        format!("{stage}: {detail}"),
                    )
                }
                ItemStatus::Skipped { reason } => (
                    "SKIPPED".bright_black().to_string(),
                    match reason {
                        SkipReason::NotFlagged => "not flagged for processing".to_string(),
                        SkipReason::NotDue => "not due".to_string(),
                    },
                ),
            };
            ReportRow {
                name: item.item.to_string(),
                result,
                detail,
            }
        })
        .collect();

    rows.extend(report.tasks.iter().map(|task| {
        let (result, detail) = match &task.status {
            TaskStatus::Swept if task.errors > 0 => (
                "SWEPT".yellow().to_string(),
                format!(
                    "{} deleted, {} kept, {} errors",
                    task.deleted.len(),
                    task.kept,
                    task.errors
                ),
            ),
            TaskStatus::Swept => (
                "SWEPT".green().to_string(),
                format!("{} deleted, {} kept", task.deleted.len(), task.kept),
            ),
            TaskStatus::Failed { message } => ("FAILED".red().bold().to_string(), message.clone()),
            TaskStatus::Skipped { reason } => (
                "SKIPPED".bright_black().to_string(),
                match reason {
                    TaskSkip::NoSearchString => "no search string configured",
                    TaskSkip::NoSchedule => "no sync schedule configured",
                    TaskSkip::NotDue => "not due",
                }
                .to_string(),
            ),
        };
        ReportRow {
            name: format!("task: {}", task.task),
            result,
            detail,
        }
    }));

    if rows.is_empty() {
        println!("No services or tasks configured.");
        return;
    }
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
