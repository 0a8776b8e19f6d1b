//! Artifact pipeline: one service item from source project to published service.
//!
//! ## Feature branch
//!
//! load project → resolve map → draft `<staging>/<name>.sddraft` → stage
//! `<staging>/<name>.sd` → find exactly one existing service definition →
//! overwrite and publish (retried) → update sharing (recoverable).
//!
//! ## Tile branches
//!
//! load project → resolve map → resolve target `itemid` → clear selection →
//! (raster only) select the AOI by each selector → package
//! `<name>_<YYYYMMDD_HHMMSS>.<ext>` → publish as new item → settle wait →
//! replace service → remove local package (recoverable).

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDateTime;

use portalsync_core::{ServiceItem, TileFormat};

use crate::builder::{ArtifactBuilder, DraftRequest, MapHandle, SelectionMode, TilePackageRequest};
use crate::error::PipelineError;
use crate::platform::{ContentPlatform, PackageItem, RemoteItem, SearchQuery};
use crate::retry::{with_retry, RetryPolicy};
use crate::runlog::RunLog;
use crate::stage::{Halted, ItemReport, Stage, StageRunner};

/// Run-wide inputs shared by every item.
#[derive(Debug, Clone)]
pub struct PipelineContext<'a> {
    pub staging: &'a Path,
    /// Local time the run started; stamps package names.
    pub now: NaiveDateTime,
    pub retry: RetryPolicy,
    /// Wait between publishing a tile package and replacing the service.
    pub settle: Duration,
    /// Portal user that owns the overwritten service definitions.
    pub owner: &'a str,
}

impl PipelineContext<'_> {
    pub fn draft_path(&self, item: &ServiceItem) -> PathBuf {
        self.staging.join(format!("{}.sddraft", item.name))
    }

    pub fn service_definition_path(&self, item: &ServiceItem) -> PathBuf {
        self.staging.join(format!("{}.sd", item.name))
    }

    /// Versioned package title, `<name>_<YYYYMMDD_HHMMSS>`.
    pub fn package_title(&self, item: &ServiceItem) -> String {
        format!("{}_{}", item.name, self.now.format("%Y%m%d_%H%M%S"))
    }
}

/// Publish one item. Never fails: the outcome is in the report.
pub fn publish_item(
    item: &ServiceItem,
    platform: &dyn ContentPlatform,
    builder: &dyn ArtifactBuilder,
    ctx: &PipelineContext<'_>,
    log: &mut RunLog,
) -> ItemReport {
    log.info(format!("Processing service {}", item.name));
    let mut runner = StageRunner::new(log, item.name.clone());
    let result = run_stages(item, platform, builder, ctx, &mut runner);
    runner.finish(result)
}

fn run_stages(
    item: &ServiceItem,
    platform: &dyn ContentPlatform,
    builder: &dyn ArtifactBuilder,
    ctx: &PipelineContext<'_>,
    runner: &mut StageRunner<'_>,
) -> Result<(), Halted> {
    let project = runner.required(Stage::LoadProject, |_| builder.open_project(&item.project))?;
    let map = runner.required(Stage::ResolveMap, |_| builder.find_map(&project, &item.map))?;

    match item.kind.tile_format() {
        None => publish_feature(item, map, platform, builder, ctx, runner),
        Some(format) => replace_tiles(item, map, format, platform, builder, ctx, runner),
    }
}

// ---------------------------------------------------------------------------
// Feature branch
// ---------------------------------------------------------------------------

fn publish_feature(
    item: &ServiceItem,
    map: MapHandle,
    platform: &dyn ContentPlatform,
    builder: &dyn ArtifactBuilder,
    ctx: &PipelineContext<'_>,
    runner: &mut StageRunner<'_>,
) -> Result<(), Halted> {
    let name = item.name.to_string();
    let draft = ctx.draft_path(item);
    let package = ctx.service_definition_path(item);
    let request = DraftRequest::for_item(item);

    runner.required(Stage::CreateDraft, |_| {
        builder.export_draft(&map, &request, &draft)
    })?;
    runner.required(Stage::StageService, |_| builder.stage_service(&draft, &package))?;

    let target = runner.required(Stage::FindServiceDefinition, |log| {
        log.info("Searching for existing Service Definition");
        let found = platform.search(&SearchQuery::service_definition(&name, ctx.owner))?;
        log.info(format!("Found {} matching Service Definitions", found.len()));
        single_match(&name, found)
    })?;

    let published = runner.required(Stage::OverwritePublish, |log| {
        log.info(format!(
            "Attempting to overwrite existing Feature Service Definition for {name} ({})",
            target.id
        ));
        let label = format!("Overwrite of {name}");
        with_retry(&ctx.retry, log, &label, |_| platform.overwrite(&target, &package))
    })?;

    runner.optional(Stage::UpdateSharing, |log| {
        log.info(format!("Updating sharing on {name} ({})", published.id));
        platform.share(&published, &item.sharing)
    });
    Ok(())
}

/// The feature branch only overwrites: zero or several matches is a failure.
fn single_match(name: &str, mut found: Vec<RemoteItem>) -> Result<RemoteItem, PipelineError> {
    match found.len() {
        1 => Ok(found.remove(0)),
        0 => Err(PipelineError::NoServiceDefinition {
            name: name.to_string(),
        }),
        count => Err(PipelineError::AmbiguousServiceDefinition {
            name: name.to_string(),
            count,
        }),
    }
}

// ---------------------------------------------------------------------------
// Tile branches
// ---------------------------------------------------------------------------

fn replace_tiles(
    item: &ServiceItem,
    mut map: MapHandle,
    format: TileFormat,
    platform: &dyn ContentPlatform,
    builder: &dyn ArtifactBuilder,
    ctx: &PipelineContext<'_>,
    runner: &mut StageRunner<'_>,
) -> Result<(), Halted> {
    let tiling = item.tiling.clone().unwrap_or_default();

    let target_id = runner.required(Stage::ResolveTarget, |_| {
        item.item_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| PipelineError::MissingItemId {
                name: item.name.to_string(),
            })
    })?;

    if tiling.clear_selection {
        runner.required(Stage::ClearSelection, |_| builder.clear_selection(&mut map))?;
    }

    // Only raster caches are bounded by an area of interest.
    if format == TileFormat::Raster {
        if let Some(aoi_name) = tiling.aoi.as_deref() {
            let aoi = runner.required(Stage::ResolveAoi, |_| builder.find_layer(&map, aoi_name))?;
            let mut mode = SelectionMode::New;
            for selector_name in &tiling.selectors {
                let Some(selector) = runner.optional(Stage::ResolveSelector, |_| {
                    builder.find_layer(&map, selector_name)
                }) else {
                    continue;
                };
                runner.required(Stage::SelectArea, |_| {
                    builder.select_by_location(&mut map, &aoi, &selector, mode)
                })?;
                mode = SelectionMode::Add;
            }
        }
    }

    let title = ctx.package_title(item);
    let output = ctx.staging.join(format!("{title}.{}", format.extension()));
    let request = TilePackageRequest {
        format,
        tiling,
        output: output.clone(),
        summary: item.summary.clone(),
        tags: item.tags.clone(),
    };
    runner.required(Stage::CreatePackage, |_| builder.create_tile_package(&map, &request))?;

    let package = PackageItem {
        title,
        folder: item.portal_folder.clone(),
        summary: item.summary.clone(),
        tags: item.tags.clone(),
        format,
    };
    let published = runner.required(Stage::PublishPackage, |_| {
        platform.publish_package(&output, &package)
    })?;

    if !ctx.settle.is_zero() {
        runner.note(format!(
            "Waiting {}s for {} to finish processing",
            ctx.settle.as_secs(),
            published.id
        ));
        std::thread::sleep(ctx.settle);
    }

    runner.required(Stage::ReplaceService, |_| {
        platform.replace_service(&target_id, &published.id)
    })?;

    runner.optional(Stage::CleanupPackage, |_| {
        std::fs::remove_file(&output).map_err(|source| PipelineError::Cleanup {
            path: output.clone(),
            source,
        })
    });
    Ok(())
}
