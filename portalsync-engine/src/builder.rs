//! Artifact builder capability.
//!
//! The engine never renders or packages maps itself. Everything that touches
//! a project file goes through [`ArtifactBuilder`]; `portalsync-toolkit`
//! provides the real implementation and tests provide fakes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use portalsync_core::{ServiceItem, Settings, TileFormat, TileJob};

use crate::error::BuildError;

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// An opened source project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectHandle {
    pub path: PathBuf,
}

/// A layer resolved by name inside a map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerHandle {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// Replace the current selection.
    New,
    /// Union with the current selection.
    Add,
}

/// One select-by-location: features of `target` intersecting `selector`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionStep {
    pub target: String,
    pub selector: String,
    pub mode: SelectionMode,
}

/// Selection changes applied to a map before packaging, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionPlan {
    /// Start from an empty selection.
    pub clear: bool,
    pub steps: Vec<SelectionStep>,
}

impl SelectionPlan {
    pub fn clear(&mut self) {
        self.clear = true;
        self.steps.clear();
    }

    pub fn push(&mut self, step: SelectionStep) {
        if step.mode == SelectionMode::New {
            self.steps.clear();
        }
        self.steps.push(step);
    }
}

/// A map resolved inside a project, with its pending selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapHandle {
    pub project: PathBuf,
    pub name: String,
    #[serde(default)]
    pub selection: SelectionPlan,
}

impl MapHandle {
    pub fn new(project: &ProjectHandle, name: impl Into<String>) -> Self {
        Self {
            project: project.path.clone(),
            name: name.into(),
            selection: SelectionPlan::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Parameters of a draft service definition for a feature item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DraftRequest {
    pub service_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    /// Drafts are always built to overwrite an existing service.
    pub overwrite_existing: bool,
}

impl DraftRequest {
    pub fn for_item(item: &ServiceItem) -> Self {
        Self {
            service_name: item.name.to_string(),
            folder: item.portal_folder.clone(),
            summary: item.summary.clone(),
            tags: item.tags.clone(),
            overwrite_existing: true,
        }
    }
}

/// Parameters of a tile or vector tile package.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TilePackageRequest {
    pub format: TileFormat,
    pub tiling: TileJob,
    pub output: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
}

// ---------------------------------------------------------------------------
// Capability
// ---------------------------------------------------------------------------

/// Turns source projects into stageable artifacts.
///
/// Selection calls only record intent on the [`MapHandle`] by default; an
/// implementation replays the plan when it builds the package.
pub trait ArtifactBuilder {
    /// Pick up run-wide configuration before the first item. No-op by default.
    fn configure(&mut self, _settings: &Settings) {}

    fn open_project(&self, path: &Path) -> Result<ProjectHandle, BuildError>;

    fn find_map(&self, project: &ProjectHandle, name: &str) -> Result<MapHandle, BuildError>;

    /// Write a draft service definition for `map` to `output`.
    fn export_draft(
        &self,
        map: &MapHandle,
        request: &DraftRequest,
        output: &Path,
    ) -> Result<(), BuildError>;

    /// Stage the draft at `draft` into a deployable package at `output`.
    fn stage_service(&self, draft: &Path, output: &Path) -> Result<(), BuildError>;

    fn find_layer(&self, map: &MapHandle, name: &str) -> Result<LayerHandle, BuildError>;

    fn clear_selection(&self, map: &mut MapHandle) -> Result<(), BuildError> {
        map.selection.clear();
        Ok(())
    }

    fn select_by_location(
        &self,
        map: &mut MapHandle,
        target: &LayerHandle,
        selector: &LayerHandle,
        mode: SelectionMode,
    ) -> Result<(), BuildError> {
        map.selection.push(SelectionStep {
            target: target.name.clone(),
            selector: selector.name.clone(),
            mode,
        });
        Ok(())
    }

    /// Write the package described by `request` for `map`.
    fn create_tile_package(
        &self,
        map: &MapHandle,
        request: &TilePackageRequest,
    ) -> Result<(), BuildError>;
}
