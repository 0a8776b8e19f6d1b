//! Stage executor.
//!
//! A pipeline is a straight line of named stages. Each stage runs one
//! collaborator call, logs PASS or FAIL, and records a [`StageOutcome`].
//! A failed *required* stage yields [`Halted`], which the pipeline propagates
//! with `?` to stop that item. A failed *optional* stage is logged and the
//! item continues. Nothing escapes as an error past the item.

use std::fmt;

use serde::Serialize;

use portalsync_core::ItemName;

use crate::error::PipelineError;
use crate::runlog::RunLog;

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Every step an item can go through, across both branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    LoadProject,
    ResolveMap,
    CreateDraft,
    StageService,
    FindServiceDefinition,
    OverwritePublish,
    UpdateSharing,
    ResolveTarget,
    ClearSelection,
    ResolveAoi,
    ResolveSelector,
    SelectArea,
    CreatePackage,
    PublishPackage,
    ReplaceService,
    CleanupPackage,
}

impl Stage {
    /// Log text for a successful run of this stage on `item`.
    pub fn passed(self, item: &str) -> String {
        match self {
            Stage::LoadProject => format!("Loaded project file for {item}"),
            Stage::ResolveMap => format!("Retrieved map for {item}"),
            Stage::CreateDraft => format!("Created Draft Service Definition for {item}"),
            Stage::StageService => format!("Staged Service {item}"),
            Stage::FindServiceDefinition => {
                format!("Found existing Service Definition for {item}")
            }
            Stage::OverwritePublish => {
                format!("Successfully overwrote existing Feature Service Definition for {item}")
            }
            Stage::UpdateSharing => format!("Updated sharing on {item}"),
            Stage::ResolveTarget => format!("Resolved replacement target for {item}"),
            Stage::ClearSelection => format!("Cleared map selection for {item}"),
            Stage::ResolveAoi => format!("Resolved area of interest layer for {item}"),
            Stage::ResolveSelector => format!("Resolved selector layer for {item}"),
            Stage::SelectArea => format!("Selected area of interest for {item}"),
            Stage::CreatePackage => format!("Created tile package for {item}"),
            Stage::PublishPackage => format!("Published tile package for {item}"),
            Stage::ReplaceService => format!("Replaced service content for {item}"),
            Stage::CleanupPackage => format!("Removed staged package for {item}"),
        }
    }

    /// Log text for a failed run of this stage on `item`.
    pub fn failed(self, item: &str) -> String {
        match self {
            Stage::LoadProject => format!("Failed to load project file for {item}"),
            Stage::ResolveMap => format!("Failed to retrieve map for {item}"),
            Stage::CreateDraft => {
                format!("Failed to create Draft Service Definition for {item}")
            }
            Stage::StageService => format!("Failed to Stage Service {item}"),
            Stage::FindServiceDefinition => {
                format!("Failed to find a single existing Service Definition for {item}")
            }
            Stage::OverwritePublish => {
                format!("Failed to overwrite existing Feature Service Definition for {item}")
            }
            Stage::UpdateSharing => format!("Failed to update sharing on {item}"),
            Stage::ResolveTarget => format!("Failed to resolve replacement target for {item}"),
            Stage::ClearSelection => format!("Failed to clear map selection for {item}"),
            Stage::ResolveAoi => {
                format!("Failed to resolve area of interest layer for {item}")
            }
            Stage::ResolveSelector => {
                format!("Failed to resolve selector layer for {item}, skipping it")
            }
            Stage::SelectArea => format!("Failed to select area of interest for {item}"),
            Stage::CreatePackage => format!("Failed to create tile package for {item}"),
            Stage::PublishPackage => format!("Failed to publish tile package for {item}"),
            Stage::ReplaceService => format!("Failed to replace service content for {item}"),
            Stage::CleanupPackage => format!("Failed to remove staged package for {item}"),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::LoadProject => "load project",
            Stage::ResolveMap => "resolve map",
            Stage::CreateDraft => "create draft",
            Stage::StageService => "stage service",
            Stage::FindServiceDefinition => "find service definition",
            Stage::OverwritePublish => "overwrite and publish",
            Stage::UpdateSharing => "update sharing",
            Stage::ResolveTarget => "resolve target",
            Stage::ClearSelection => "clear selection",
            Stage::ResolveAoi => "resolve area of interest",
            Stage::ResolveSelector => "resolve selector",
            Stage::SelectArea => "select area",
            Stage::CreatePackage => "create package",
            Stage::PublishPackage => "publish package",
            Stage::ReplaceService => "replace service",
            Stage::CleanupPackage => "clean up package",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StageStatus {
    Pass,
    Fail,
    Skip,
}

/// Result of one stage, kept for the run report only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageOutcome {
    pub stage: Stage,
    pub status: StageStatus,
    /// Error text for failures, reason for skips.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// `true` for a failure the item carried on past.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub recovered: bool,
}

/// A required stage failed; no further stages run for the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Halted {
    pub stage: Stage,
}

/// Why an item was not run at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    NotFlagged,
    NotDue,
}

/// Final disposition of an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ItemStatus {
    Published,
    Failed { stage: Stage },
    Skipped { reason: SkipReason },
}

/// Everything that happened to one item during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReport {
    pub item: ItemName,
    #[serde(flatten)]
    pub status: ItemStatus,
    pub outcomes: Vec<StageOutcome>,
}

impl ItemReport {
    pub fn skipped(item: ItemName, reason: SkipReason) -> Self {
        Self {
            item,
            status: ItemStatus::Skipped { reason },
            outcomes: Vec::new(),
        }
    }

    pub fn is_published(&self) -> bool {
        self.status == ItemStatus::Published
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, ItemStatus::Failed { .. })
    }

    /// Outcome recorded for `stage`, if it ran. Repeated stages return the first.
    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.outcomes.iter().find(|o| o.stage == stage)
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Runs the stages of one item against the run log.
pub struct StageRunner<'a> {
    log: &'a mut RunLog,
    item: ItemName,
    outcomes: Vec<StageOutcome>,
}

impl<'a> StageRunner<'a> {
    pub fn new(log: &'a mut RunLog, item: ItemName) -> Self {
        Self {
            log,
            item,
            outcomes: Vec::new(),
        }
    }

    /// Run a stage whose failure ends the item.
    pub fn required<T, E, F>(&mut self, stage: Stage, op: F) -> Result<T, Halted>
    where
        E: Into<PipelineError>,
        F: FnOnce(&mut RunLog) -> Result<T, E>,
    {
        match op(&mut *self.log) {
            Ok(value) => {
                self.pass(stage);
                Ok(value)
            }
            Err(err) => {
                self.fail(stage, err.into(), false);
                Err(Halted { stage })
            }
        }
    }

    /// Run a stage whose failure is logged and then ignored.
    pub fn optional<T, E, F>(&mut self, stage: Stage, op: F) -> Option<T>
    where
        E: Into<PipelineError>,
        F: FnOnce(&mut RunLog) -> Result<T, E>,
    {
        match op(&mut *self.log) {
            Ok(value) => {
                self.pass(stage);
                Some(value)
            }
            Err(err) => {
                self.fail(stage, err.into(), true);
                None
            }
        }
    }

    /// Informational line that is not a stage.
    pub fn note(&mut self, message: impl Into<String>) {
        self.log.info(message);
    }

    /// Close the item and build its report.
    pub fn finish(self, result: Result<(), Halted>) -> ItemReport {
        let status = match result {
            Ok(()) => {
                self.log
                    .pass(format!("Successfully processed service {}", self.item));
                ItemStatus::Published
            }
            Err(Halted { stage }) => ItemStatus::Failed { stage },
        };
        ItemReport {
            item: self.item,
            status,
            outcomes: self.outcomes,
        }
    }

    fn pass(&mut self, stage: Stage) {
        self.log.pass(stage.passed(&self.item.0));
        self.outcomes.push(StageOutcome {
            stage,
            status: StageStatus::Pass,
            detail: None,
            recovered: false,
        });
    }

    fn fail(&mut self, stage: Stage, err: PipelineError, recovered: bool) {
        self.log
            .fail(format!("{}: {err}", stage.failed(&self.item.0)));
        for line in err.messages() {
            self.log.info(line.clone());
        }
        self.outcomes.push(StageOutcome {
            stage,
            status: StageStatus::Fail,
            detail: Some(err.to_string()),
            recovered,
        });
    }
}
