//! [`ArtifactBuilder`] backed by the packaging helper.

use std::path::Path;

use serde_json::json;

use portalsync_core::Settings;
use portalsync_engine::builder::{DraftRequest, TilePackageRequest};
use portalsync_engine::{ArtifactBuilder, BuildError, LayerHandle, MapHandle, ProjectHandle};

use crate::helper::{Helper, ToolkitError};

/// Runs each builder operation as a helper call.
#[derive(Debug, Default)]
pub struct ToolkitBuilder {
    helper: Option<Helper>,
    /// Why no helper is available, reported on every call.
    unavailable: Option<String>,
}

impl ToolkitBuilder {
    pub fn new(argv: &[String]) -> Self {
        let mut builder = Self::default();
        builder.set_argv(argv);
        builder
    }

    pub fn helper(&self) -> Option<&Helper> {
        self.helper.as_ref()
    }

    fn set_argv(&mut self, argv: &[String]) {
        match Helper::resolve(argv) {
            Ok(helper) => {
                tracing::debug!("packaging helper: {}", helper.program().display());
                self.helper = Some(helper);
                self.unavailable = None;
            }
            Err(err) => {
                tracing::warn!("{err}");
                self.helper = None;
                self.unavailable = Some(err.to_string());
            }
        }
    }

    fn helper_or_unavailable(&self) -> Result<&Helper, BuildError> {
        self.helper.as_ref().ok_or_else(|| {
            BuildError::Unavailable(
                self.unavailable
                    .clone()
                    .unwrap_or_else(|| ToolkitError::NotConfigured.to_string()),
            )
        })
    }

    /// Call `operation`; a `missing` reply becomes [`BuildError::NotFound`].
    fn call(
        &self,
        operation: &'static str,
        request: serde_json::Value,
        kind: &'static str,
        name: &str,
    ) -> Result<(), BuildError> {
        let reply = self.helper_or_unavailable()?.call(operation, &request)?;
        for message in &reply.messages {
            tracing::debug!("toolkit {operation}: {message}");
        }
        if reply.missing {
            return Err(BuildError::NotFound {
                kind,
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

impl ArtifactBuilder for ToolkitBuilder {
    fn configure(&mut self, settings: &Settings) {
        match &settings.toolkit {
            Some(argv) => self.set_argv(argv),
            None if self.helper.is_none() => {
                self.unavailable = Some(ToolkitError::NotConfigured.to_string());
            }
            None => {}
        }
    }

    fn open_project(&self, path: &Path) -> Result<ProjectHandle, BuildError> {
        self.helper_or_unavailable()?;
        let name = path.display().to_string();
        if !path.is_file() {
            return Err(BuildError::NotFound {
                kind: "project",
                name,
            });
        }
        self.call("open-project", json!({ "project": path }), "project", &name)?;
        Ok(ProjectHandle {
            path: path.to_path_buf(),
        })
    }

    fn find_map(&self, project: &ProjectHandle, name: &str) -> Result<MapHandle, BuildError> {
        self.call(
            "find-map",
            json!({ "project": project.path, "map": name }),
            "map",
            name,
        )?;
        Ok(MapHandle::new(project, name))
    }

    fn export_draft(
        &self,
        map: &MapHandle,
        request: &DraftRequest,
        output: &Path,
    ) -> Result<(), BuildError> {
        self.call(
            "export-draft",
            json!({ "map": map, "draft": request, "output": output }),
            "map",
            &map.name,
        )
    }

    fn stage_service(&self, draft: &Path, output: &Path) -> Result<(), BuildError> {
        self.call(
            "stage-service",
            json!({ "draft": draft, "output": output }),
            "draft",
            &draft.display().to_string(),
        )
    }

    fn find_layer(&self, map: &MapHandle, name: &str) -> Result<LayerHandle, BuildError> {
        self.call(
            "find-layer",
            json!({ "project": map.project, "map": map.name, "layer": name }),
            "layer",
            name,
        )?;
        Ok(LayerHandle {
            name: name.to_string(),
        })
    }

    fn create_tile_package(
        &self,
        map: &MapHandle,
        request: &TilePackageRequest,
    ) -> Result<(), BuildError> {
        self.call(
            "create-tile-package",
            json!({ "map": map, "package": request }),
            "map",
            &map.name,
        )
    }
}
