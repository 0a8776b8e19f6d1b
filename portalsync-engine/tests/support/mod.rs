//! In-memory collaborators shared by the engine integration tests.
#![allow(dead_code)]

use std::cell::{RefCell, RefMut};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use tempfile::TempDir;

use portalsync_core::{settings, Credentials, Settings, SettingsPaths, Sharing};
use portalsync_engine::builder::{DraftRequest, TilePackageRequest};
use portalsync_engine::platform::SERVICE_DEFINITION;
use portalsync_engine::{
    ArtifactBuilder, BuildError, ContentPlatform, DeleteCheck, LayerHandle, MapHandle,
    PackageItem, PlatformConnector, PlatformError, ProjectHandle, RemoteItem, SearchQuery,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn at(y: i32, m: u32, d: u32, hh: u32, mm: u32, ss: u32) -> NaiveDateTime {
    date(y, m, d).and_hms_opt(hh, mm, ss).expect("valid time")
}

/// The instant every test run happens at.
pub fn now() -> NaiveDateTime {
    at(2026, 10, 18, 9, 30, 0)
}

/// A remote item with explicit timestamps.
pub fn remote_aged(id: &str, title: &str, created: NaiveDateTime, modified: NaiveDateTime) -> RemoteItem {
    RemoteItem {
        id: id.to_string(),
        title: title.to_string(),
        owner: "publisher".to_string(),
        item_type: "Vector Tile Package".to_string(),
        created,
        modified,
        protected: false,
        url: None,
    }
}

/// A remote item created and modified long ago.
pub fn remote(id: &str, title: &str) -> RemoteItem {
    let old = at(2020, 1, 1, 0, 0, 0);
    remote_aged(id, title, old, old)
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct PlatformState {
    // behaviour
    pub service_definitions: Vec<RemoteItem>,
    pub retention_results: Vec<RemoteItem>,
    pub fail_search: bool,
    /// Overwrite attempts that fail before one succeeds.
    pub overwrite_failures: u32,
    pub fail_share: bool,
    pub fail_publish: bool,
    pub fail_replace: bool,
    pub refuse_delete: HashSet<String>,
    pub fail_delete: HashSet<String>,
    pub fail_connect: bool,

    // observations
    pub connected_as: Option<Credentials>,
    pub queries: Vec<String>,
    pub overwrite_attempts: u32,
    pub overwritten: Vec<(String, PathBuf)>,
    pub shared: Vec<(String, Sharing)>,
    pub published: Vec<(PathBuf, PackageItem)>,
    pub replaced: Vec<(String, String)>,
    pub dry_runs: Vec<String>,
    pub deleted: Vec<String>,
}

/// Scriptable portal. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct FakePlatform {
    inner: Rc<RefCell<PlatformState>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RefMut<'_, PlatformState> {
        self.inner.borrow_mut()
    }
}

fn transport(operation: &'static str) -> PlatformError {
    PlatformError::Transport {
        operation,
        message: "connection reset".to_string(),
    }
}

impl ContentPlatform for FakePlatform {
    fn search(&self, query: &SearchQuery) -> Result<Vec<RemoteItem>, PlatformError> {
        let mut state = self.state();
        state.queries.push(query.to_query_string());
        if state.fail_search {
            return Err(transport("search"));
        }
        if query.item_type.as_deref() == Some(SERVICE_DEFINITION) {
            Ok(state.service_definitions.clone())
        } else {
            Ok(state.retention_results.clone())
        }
    }

    fn overwrite(&self, item: &RemoteItem, package: &Path) -> Result<RemoteItem, PlatformError> {
        let mut state = self.state();
        state.overwrite_attempts += 1;
        if state.overwrite_attempts <= state.overwrite_failures {
            return Err(PlatformError::Api {
                operation: "publish",
                code: 500,
                message: "Job failed".to_string(),
                details: vec!["service is locked".to_string()],
            });
        }
        state.overwritten.push((item.id.clone(), package.to_path_buf()));
        let mut service = remote(&format!("{}-service", item.id), &item.title);
        service.item_type = "Feature Service".to_string();
        Ok(service)
    }

    fn share(&self, item: &RemoteItem, sharing: &Sharing) -> Result<(), PlatformError> {
        let mut state = self.state();
        if state.fail_share {
            return Err(transport("share"));
        }
        state.shared.push((item.id.clone(), sharing.clone()));
        Ok(())
    }

    fn publish_package(
        &self,
        path: &Path,
        package: &PackageItem,
    ) -> Result<RemoteItem, PlatformError> {
        let mut state = self.state();
        if state.fail_publish {
            return Err(transport("publish"));
        }
        state.published.push((path.to_path_buf(), package.clone()));
        let id = format!("published{}", state.published.len());
        Ok(remote(&id, &package.title))
    }

    fn replace_service(&self, existing_id: &str, replacement_id: &str) -> Result<(), PlatformError> {
        let mut state = self.state();
        if state.fail_replace {
            return Err(transport("replaceService"));
        }
        state
            .replaced
            .push((existing_id.to_string(), replacement_id.to_string()));
        Ok(())
    }

    fn delete(&self, item: &RemoteItem, dry_run: bool) -> Result<DeleteCheck, PlatformError> {
        let mut state = self.state();
        if dry_run {
            state.dry_runs.push(item.id.clone());
            let can_delete = !state.refuse_delete.contains(&item.id);
            return Ok(DeleteCheck {
                can_delete,
                message: (!can_delete).then(|| "item has dependents".to_string()),
            });
        }
        if state.fail_delete.contains(&item.id) {
            return Err(transport("delete"));
        }
        state.deleted.push(item.id.clone());
        Ok(DeleteCheck {
            can_delete: true,
            message: None,
        })
    }
}

impl PlatformConnector for FakePlatform {
    fn connect(&self, credentials: &Credentials) -> Result<Box<dyn ContentPlatform>, PlatformError> {
        let mut state = self.state();
        state.connected_as = Some(credentials.clone());
        if state.fail_connect {
            return Err(PlatformError::Api {
                operation: "generateToken",
                code: 400,
                message: "Unable to generate token.".to_string(),
                details: vec!["Invalid username or password.".to_string()],
            });
        }
        Ok(Box::new(self.clone()))
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct BuilderState {
    // behaviour
    /// Operation names that fail, e.g. `"export-draft"`.
    pub fail: HashSet<&'static str>,
    pub missing_layers: HashSet<String>,

    // observations
    pub calls: Vec<String>,
    pub configured_with: Option<Vec<String>>,
    pub packages: Vec<(MapHandle, PathBuf)>,
}

/// Scriptable packaging helper. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct FakeBuilder {
    inner: Rc<RefCell<BuilderState>>,
}

impl FakeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RefMut<'_, BuilderState> {
        self.inner.borrow_mut()
    }

    fn enter(&self, operation: &'static str) -> Result<(), BuildError> {
        let mut state = self.state();
        state.calls.push(operation.to_string());
        if state.fail.contains(operation) {
            return Err(BuildError::Failed {
                operation: operation.to_string(),
                message: "tool reported an error".to_string(),
                messages: vec![
                    "ERROR 001272: Analyzer errors were encountered".to_string(),
                    format!("Failed to execute ({operation})."),
                ],
            });
        }
        Ok(())
    }
}

impl ArtifactBuilder for FakeBuilder {
    fn configure(&mut self, settings: &Settings) {
        self.state().configured_with = settings.toolkit.clone();
    }

    fn open_project(&self, path: &Path) -> Result<ProjectHandle, BuildError> {
        self.enter("open-project")?;
        Ok(ProjectHandle {
            path: path.to_path_buf(),
        })
    }

    fn find_map(&self, project: &ProjectHandle, name: &str) -> Result<MapHandle, BuildError> {
        self.enter("find-map")?;
        Ok(MapHandle::new(project, name))
    }

    fn export_draft(
        &self,
        _map: &MapHandle,
        _request: &DraftRequest,
        output: &Path,
    ) -> Result<(), BuildError> {
        self.enter("export-draft")?;
        self.state().calls.push(format!("draft:{}", output.display()));
        Ok(())
    }

    fn stage_service(&self, _draft: &Path, output: &Path) -> Result<(), BuildError> {
        self.enter("stage-service")?;
        self.state().calls.push(format!("sd:{}", output.display()));
        Ok(())
    }

    fn find_layer(&self, _map: &MapHandle, name: &str) -> Result<LayerHandle, BuildError> {
        self.enter("find-layer")?;
        if self.state().missing_layers.contains(name) {
            return Err(BuildError::NotFound {
                kind: "layer",
                name: name.to_string(),
            });
        }
        Ok(LayerHandle {
            name: name.to_string(),
        })
    }

    fn create_tile_package(
        &self,
        map: &MapHandle,
        request: &TilePackageRequest,
    ) -> Result<(), BuildError> {
        self.enter("create-tile-package")?;
        std::fs::write(&request.output, b"package").map_err(|e| BuildError::Failed {
            operation: "create-tile-package".to_string(),
            message: e.to_string(),
            messages: Vec::new(),
        })?;
        self.state()
            .packages
            .push((map.clone(), request.output.clone()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Settings fixtures
// ---------------------------------------------------------------------------

/// A feature item that is due (no sync block).
pub fn feature_item(name: &str) -> Value {
    serde_json::json!({
        "name": name,
        "type": "FEATURE",
        "process": true,
        "project": format!("C:/gis/{name}.aprx"),
        "map": name,
        "portalfolder": "Services",
        "sharing": { "org": true, "public": false, "groups": ["g1"] }
    })
}

/// A settings document with zero waits so tests never sleep.
pub fn settings_doc(services: Vec<Value>, tasks: Option<Vec<Value>>) -> Value {
    let mut doc = serde_json::json!({
        "portal": "https://gis.example.org/portal",
        "username": "publisher",
        "password": "hunter2",
        "encrypted": false,
        "retrylimit": 3,
        "retrydelay": 0,
        "settleseconds": 0,
        "services": services
    });
    if let Some(tasks) = tasks {
        doc["tasks"] = Value::Array(tasks);
    }
    doc
}

pub fn parse_settings(doc: Value) -> Settings {
    serde_json::from_value(doc).expect("settings fixture")
}

/// Write `doc` as `settings.config` in a fresh directory.
pub fn write_settings(doc: &Value) -> (TempDir, SettingsPaths) {
    let dir = TempDir::new().expect("tempdir");
    let paths = SettingsPaths::beside(dir.path().join(settings::DEFAULT_CONFIG_FILE));
    let text = serde_json::to_string_pretty(doc).expect("serialize fixture");
    std::fs::write(&paths.config, text).expect("write settings");
    (dir, paths)
}

pub fn read_settings(paths: &SettingsPaths) -> Settings {
    settings::load_at(&paths.config).expect("reload settings")
}
