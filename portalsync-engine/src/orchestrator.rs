//! Run orchestrator: the top-level loop of one `portalsync run`.
//!
//! ## `run_at`, step by step
//!
//! 1. Open the run log (fatal if it cannot be opened).
//! 2. Load `settings.config` (fatal if missing or malformed).
//! 3. Ensure the staging directory exists (fatal if it cannot be created).
//! 4. Decode the stored password, obfuscating it on first run.
//! 5. Connect to the portal (fatal; nothing is saved).
//! 6. Publish every flagged, due item in order; then sweep every task.
//! 7. Save the settings document once.
//!
//! Item and task failures never stop the loop; they only keep that entry's
//! sync date where it was.

use std::path::Path;

use chrono::NaiveDateTime;
use serde::Serialize;

use portalsync_core::{schedule, settings, ConfigError, Settings, SettingsPaths, SyncState};

use crate::builder::ArtifactBuilder;
use crate::error::EngineError;
use crate::pipeline::{publish_item, PipelineContext};
use crate::platform::{ContentPlatform, PlatformConnector};
use crate::retention::{self, TaskReport};
use crate::retry::RetryPolicy;
use crate::runlog::RunLog;
use crate::stage::{ItemReport, SkipReason};

/// Outcome of a whole run, in configured order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub items: Vec<ItemReport>,
    pub tasks: Vec<TaskReport>,
}

impl RunReport {
    pub fn published(&self) -> usize {
        self.items.iter().filter(|i| i.is_published()).count()
    }

    /// Failed items plus tasks with a failed search or delete error.
    pub fn failures(&self) -> usize {
        self.items.iter().filter(|i| i.is_failed()).count()
            + self.tasks.iter().filter(|t| t.has_failures()).count()
    }

    pub fn item(&self, name: &str) -> Option<&ItemReport> {
        self.items.iter().find(|i| i.item.0 == name)
    }
}

/// One full run against the files in `paths`.
pub fn run_at(
    paths: &SettingsPaths,
    connector: &dyn PlatformConnector,
    builder: &mut dyn ArtifactBuilder,
    now: NaiveDateTime,
) -> Result<RunReport, EngineError> {
    let mut log = RunLog::open(&paths.log)?;

    let mut settings = match settings::load_at(&paths.config) {
        Ok(settings) => settings,
        Err(err @ ConfigError::ConfigNotFound { .. }) => {
            log.fail("No configuration file exists. Halting.");
            return Err(err.into());
        }
        Err(err) => {
            log.fail(format!("Failed to load configuration: {err}"));
            return Err(err.into());
        }
    };
    log.pass("Loaded configuration");
    log.info(format!("{} services to update", settings.services.len()));
    log.info(format!("Staging {}", paths.staging.display()));

    ensure_staging(&paths.staging, &mut log)?;

    let credentials = match settings.unlock_credentials() {
        Ok(credentials) => credentials,
        Err(err) => {
            log.fail(format!("Failed to decode stored credentials: {err}"));
            return Err(err.into());
        }
    };
    let platform = match connector.connect(&credentials) {
        Ok(platform) => {
            log.pass("Connected to Portal");
            platform
        }
        Err(err) => {
            log.fail(format!("Failed to Connect to Portal: {err}"));
            return Err(EngineError::Session(err));
        }
    };

    builder.configure(&settings);
    let report = run_settings(
        &mut settings,
        platform.as_ref(),
        &*builder,
        &paths.staging,
        now,
        &mut log,
    );

    if let Err(err) = settings::save_at(&paths.config, &settings) {
        log.fail(format!("Failed to save configuration: {err}"));
        return Err(err.into());
    }
    log.info("DONE");
    Ok(report)
}

/// Process every item and task of an already loaded document, in order.
///
/// Sync dates of successful entries are advanced in `settings`; saving is
/// left to the caller.
pub fn run_settings(
    settings: &mut Settings,
    platform: &dyn ContentPlatform,
    builder: &dyn ArtifactBuilder,
    staging: &Path,
    now: NaiveDateTime,
    log: &mut RunLog,
) -> RunReport {
    let today = now.date();
    let owner = settings.username.clone();
    let ctx = PipelineContext {
        staging,
        now,
        retry: RetryPolicy::from_settings(settings),
        settle: settings.settle_wait(),
        owner: &owner,
    };
    let mut report = RunReport::default();

    for item in settings.services.iter_mut() {
        if !item.process {
            log.skip(format!("Skipped {} - not flagged for processing", item.name));
            report
                .items
                .push(ItemReport::skipped(item.name.clone(), SkipReason::NotFlagged));
            continue;
        }
        if let Some(problem) = item.sync.as_ref().and_then(SyncState::unreadable) {
            log.info(format!(
                "Ignored sync block of {} ({problem}); running now",
                item.name
            ));
        }
        let state = item.sync_state();
        if !schedule::is_state_due(Some(&state), today) {
            log.skip(format!(
                "Skipped {} - not due ({}, last synced {})",
                item.name,
                state.frequency_label(),
                state.last
            ));
            report
                .items
                .push(ItemReport::skipped(item.name.clone(), SkipReason::NotDue));
            continue;
        }

        let outcome = publish_item(item, platform, builder, &ctx, log);
        if outcome.is_published() {
            item.mark_synced(today);
        }
        report.items.push(outcome);
    }
    log.info("Completed processing services");

    if let Some(tasks) = settings.tasks.as_mut() {
        for task in tasks.iter_mut() {
            let outcome = retention::sweep(task, platform, now, log);
            if outcome.is_swept() {
                task.mark_synced(today);
            }
            report.tasks.push(outcome);
        }
    }
    report
}

fn ensure_staging(staging: &Path, log: &mut RunLog) -> Result<(), EngineError> {
    if staging.is_dir() {
        return Ok(());
    }
    match std::fs::create_dir_all(staging) {
        Ok(()) => {
            log.info("Created a staging folder");
            Ok(())
        }
        Err(source) => {
            log.fail("Failed to create a staging folder");
            Err(EngineError::Staging {
                path: staging.to_path_buf(),
                source,
            })
        }
    }
}
