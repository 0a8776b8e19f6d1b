//! The `settings.config` document: load once, save once.
//!
//! # File layout
//!
//! ```text
//! <dir>/
//!   settings.config   (JSON, mode 0600, holds the obfuscated password)
//!   services.log      (run log, appended)
//!   staging/          (drafts and packages built during a run)
//! ```
//!
//! # Write flow
//!
//! serialize with sorted keys and 4-space indent → `.config.tmp` sibling →
//! `chmod 0600` → `rename`. The document is rewritten as a whole, never patched.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::{self, OBFUSCATION_KEY};
use crate::error::{io_err, CodecError, ConfigError};
use crate::types::{Credentials, RetentionTask, ServiceItem};

pub const DEFAULT_CONFIG_FILE: &str = "settings.config";
pub const DEFAULT_LOG_FILE: &str = "services.log";
pub const DEFAULT_STAGING_DIR: &str = "staging";

fn default_retry_limit() -> i64 {
    1
}

fn default_retry_delay() -> u64 {
    5
}

fn default_settle_seconds() -> u64 {
    10
}

// ---------------------------------------------------------------------------
// 1. Document
// ---------------------------------------------------------------------------

/// Root of the settings document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Portal endpoint, e.g. `https://gis.example.org/portal`.
    pub portal: String,
    pub username: String,
    /// Plaintext until the first run, obfuscated afterwards (see `encrypted`).
    pub password: String,
    #[serde(default)]
    pub encrypted: bool,
    /// Raw configured value; use [`Settings::effective_retry_limit`].
    #[serde(rename = "retrylimit", default = "default_retry_limit")]
    pub retry_limit: i64,
    /// Fixed backoff between publish attempts, in seconds.
    #[serde(rename = "retrydelay", default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    /// Wait between publishing a tile package and replacing the service.
    #[serde(rename = "settleseconds", default = "default_settle_seconds")]
    pub settle_secs: u64,
    /// Argv of the packaging helper, e.g. `["propy", "toolkit.py"]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolkit: Option<Vec<String>>,
    #[serde(default)]
    pub services: Vec<ServiceItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Vec<RetentionTask>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Settings {
    /// Retry limit coerced to at least one attempt.
    pub fn effective_retry_limit(&self) -> u32 {
        u32::try_from(self.retry_limit.max(1)).unwrap_or(u32::MAX)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn settle_wait(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    /// Retention tasks in configured order; empty when none are configured.
    pub fn tasks(&self) -> &[RetentionTask] {
        self.tasks.as_deref().unwrap_or(&[])
    }

    /// Decode the stored password for use during this run.
    ///
    /// On the first run (`encrypted == false`) the stored plaintext is
    /// replaced by its obfuscated form and the flag is set, so the next save
    /// never writes the secret in the clear.
    pub fn unlock_credentials(&mut self) -> Result<Credentials, CodecError> {
        let password = if self.encrypted {
            codec::decode(OBFUSCATION_KEY, &self.password)?
        } else {
            let plain = self.password.clone();
            self.password = codec::encode(OBFUSCATION_KEY, &plain)?;
            self.encrypted = true;
            plain
        };
        Ok(Credentials {
            portal: self.portal.clone(),
            username: self.username.clone(),
            password,
        })
    }

    /// Starter document written by `portalsync init`.
    pub fn template() -> Result<Self, ConfigError> {
        let raw = serde_json::json!({
            "portal": "https://gis.example.org/portal",
            "username": "publisher",
            "password": "change-me",
            "encrypted": false,
            "retrylimit": 3,
            "toolkit": ["propy", "portalsync_toolkit.py"],
            "services": [
                {
                    "name": "Parcels",
                    "type": "FEATURE",
                    "process": true,
                    "project": "C:/gis/projects/parcels.aprx",
                    "map": "Parcels",
                    "portalfolder": "Cadastre",
                    "sharing": { "org": true, "public": false, "groups": [] },
                    "sync": { "frequency": "daily", "last": "1999-01-01" }
                },
                {
                    "name": "Basemap",
                    "type": "REPLACE_VECTOR_TILE",
                    "process": false,
                    "project": "C:/gis/projects/basemap.aprx",
                    "map": "Basemap",
                    "portalfolder": "Basemaps",
                    "itemid": "00000000000000000000000000000000",
                    "summary": "Vector basemap",
                    "tags": "basemap,vector",
                    "tiling": { "clearselection": true },
                    "sync": { "frequency": "weekly", "last": "1999-01-01" }
                }
            ],
            "tasks": [
                {
                    "searchstring": "Basemap_",
                    "olderthandays": 7,
                    "owner": "publisher",
                    "contenttype": "Vector Tile Package",
                    "summary": "Remove superseded basemap packages",
                    "sync": { "frequency": "weekly", "last": "1999-01-01" }
                }
            ]
        });
        Ok(serde_json::from_value(raw)?)
    }
}

// ---------------------------------------------------------------------------
// 2. Paths
// ---------------------------------------------------------------------------

/// Files a run touches, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsPaths {
    pub config: PathBuf,
    pub log: PathBuf,
    pub staging: PathBuf,
}

impl SettingsPaths {
    /// Log file and staging directory as siblings of `config`.
    pub fn beside(config: impl Into<PathBuf>) -> Self {
        let config = config.into();
        let dir = config
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self {
            log: dir.join(DEFAULT_LOG_FILE),
            staging: dir.join(DEFAULT_STAGING_DIR),
            config,
        }
    }
}

// ---------------------------------------------------------------------------
// 3. Load
// ---------------------------------------------------------------------------

/// Load the settings document at `path`.
///
/// Returns `ConfigError::ConfigNotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed JSON.
pub fn load_at(path: &Path) -> Result<Settings, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::ConfigNotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

// ---------------------------------------------------------------------------
// 4. Save (atomic)
// ---------------------------------------------------------------------------

/// Serialize with sorted keys and 4-space indentation, newline-terminated.
pub fn render(settings: &Settings) -> Result<Vec<u8>, ConfigError> {
    let value = sorted(serde_json::to_value(settings)?);
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    buf.push(b'\n');
    Ok(buf)
}

/// Atomically write the settings document to `path`.
pub fn save_at(path: &Path, settings: &Settings) -> Result<(), ConfigError> {
    let bytes = render(settings)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    std::fs::write(&tmp_path, bytes).map_err(|e| io_err(&tmp_path, e))?;
    set_file_permissions(&tmp_path)?;
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(io_err(path, e));
    }
    Ok(())
}

/// Write the template document, refusing to clobber an existing file unless `force`.
pub fn init_at(path: &Path, force: bool) -> Result<Settings, ConfigError> {
    if path.exists() && !force {
        return load_at(path);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let settings = Settings::template()?;
    save_at(path, &settings)?;
    Ok(settings)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Rebuild objects in key order so output is stable regardless of map backing.
fn sorted(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k, sorted(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        other => other,
    }
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
