//! Domain types for the portalsync settings document.
//!
//! All path fields use `PathBuf`. Field names on disk follow the flat lowercase
//! keys of `settings.config` (`portalfolder`, `itemid`, `olderthandays`, ...);
//! Rust names are snake_case with explicit `#[serde(rename)]`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name for a service item; unique within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemName(pub String);

impl fmt::Display for ItemName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ItemName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ItemName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// The kind of content a service item publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceType {
    /// Hosted feature layer, overwritten in place from a service definition.
    Feature,
    /// Raster tile cache, replaced from a freshly published tile package.
    ReplaceTile,
    /// Vector tile cache, replaced from a freshly published vector tile package.
    ReplaceVectorTile,
}

impl ServiceType {
    /// Package format for the tile branches; `None` for feature services.
    pub fn tile_format(self) -> Option<TileFormat> {
        match self {
            ServiceType::Feature => None,
            ServiceType::ReplaceTile => Some(TileFormat::Raster),
            ServiceType::ReplaceVectorTile => Some(TileFormat::Vector),
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceType::Feature => write!(f, "FEATURE"),
            ServiceType::ReplaceTile => write!(f, "REPLACE_TILE"),
            ServiceType::ReplaceVectorTile => write!(f, "REPLACE_VECTOR_TILE"),
        }
    }
}

/// Tile package flavour produced for the replace branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileFormat {
    Raster,
    Vector,
}

impl TileFormat {
    /// File extension of the generated package.
    pub fn extension(self) -> &'static str {
        match self {
            TileFormat::Raster => "tpkx",
            TileFormat::Vector => "vtpk",
        }
    }

    /// Portal item type of the uploaded package.
    pub fn item_type(self) -> &'static str {
        match self {
            TileFormat::Raster => "Tile Package",
            TileFormat::Vector => "Vector Tile Package",
        }
    }
}

impl fmt::Display for TileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileFormat::Raster => write!(f, "raster"),
            TileFormat::Vector => write!(f, "vector"),
        }
    }
}

/// How often an item or task is re-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    /// Run once, then never again.
    #[default]
    Never,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Never => write!(f, "never"),
            Frequency::Daily => write!(f, "daily"),
            Frequency::Weekly => write!(f, "weekly"),
            Frequency::Monthly => write!(f, "monthly"),
            Frequency::Yearly => write!(f, "yearly"),
        }
    }
}

// ---------------------------------------------------------------------------
// Sync state
// ---------------------------------------------------------------------------

/// `last` value assumed when a sync block is missing or unreadable.
pub fn first_run_sentinel() -> NaiveDate {
    NaiveDate::from_ymd_opt(1999, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// A `frequency` entry that did not name a known frequency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawFrequency {
    Missing,
    /// Kept as written so a save puts it back unchanged.
    Invalid(Value),
}

/// Schedule bookkeeping shared by service items and retention tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncState {
    pub frequency: Frequency,
    pub last: NaiveDate,
    /// Set when the block on disk had no readable `frequency`. Such a state is
    /// due on every run until the entry is fixed by hand.
    pub raw_frequency: Option<RawFrequency>,
    /// `last` was absent or unreadable and fell back to the sentinel.
    pub last_unreadable: bool,
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new(Frequency::Never, first_run_sentinel())
    }
}

impl SyncState {
    pub fn new(frequency: Frequency, last: NaiveDate) -> Self {
        Self {
            frequency,
            last,
            raw_frequency: None,
            last_unreadable: false,
        }
    }

    /// Record a successful run on `today`, keeping the configured frequency.
    pub fn mark_synced(&mut self, today: NaiveDate) {
        self.last = today;
        self.last_unreadable = false;
    }

    /// Build a sync state from an arbitrary JSON value.
    ///
    /// Never fails: a non-object or a missing or unknown frequency yields a
    /// state that is always due, an unreadable `last` becomes the sentinel.
    pub fn from_value(value: &Value) -> Self {
        let Value::Object(map) = value else {
            return Self {
                raw_frequency: Some(RawFrequency::Missing),
                last_unreadable: true,
                ..Self::default()
            };
        };
        let (frequency, raw_frequency) = match map.get("frequency") {
            None => (Frequency::Never, Some(RawFrequency::Missing)),
            Some(raw) => match serde_json::from_value::<Frequency>(raw.clone()) {
                Ok(frequency) => (frequency, None),
                Err(_) => (Frequency::Never, Some(RawFrequency::Invalid(raw.clone()))),
            },
        };
        let last = map
            .get("last")
            .and_then(Value::as_str)
            .and_then(parse_sync_date);
        Self {
            frequency,
            last: last.unwrap_or_else(first_run_sentinel),
            raw_frequency,
            last_unreadable: last.is_none(),
        }
    }

    /// What could not be read from the block on disk, if anything.
    pub fn unreadable(&self) -> Option<String> {
        let mut parts = Vec::new();
        match &self.raw_frequency {
            Some(RawFrequency::Missing) => parts.push("no frequency".to_string()),
            Some(RawFrequency::Invalid(raw)) => parts.push(format!("unknown frequency {raw}")),
            None => {}
        }
        if self.last_unreadable {
            parts.push("no readable last date".to_string());
        }
        (!parts.is_empty()).then(|| parts.join(", "))
    }

    /// Frequency as shown to people: the raw entry when it was not understood.
    pub fn frequency_label(&self) -> String {
        match &self.raw_frequency {
            None => self.frequency.to_string(),
            Some(RawFrequency::Missing) => "unset".to_string(),
            Some(RawFrequency::Invalid(Value::String(raw))) => format!("{raw}?"),
            Some(RawFrequency::Invalid(raw)) => format!("{raw}?"),
        }
    }
}

impl Serialize for SyncState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        match &self.raw_frequency {
            None => map.serialize_entry("frequency", &self.frequency)?,
            Some(RawFrequency::Invalid(raw)) => map.serialize_entry("frequency", raw)?,
            Some(RawFrequency::Missing) => {}
        }
        map.serialize_entry("last", &self.last)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for SyncState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(|value| Self::from_value(&value))
    }
}

/// Parse `YYYY-MM-DD`, tolerating a trailing time component.
pub fn parse_sync_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| raw.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()))
}

fn lenient_sync<'de, D>(deserializer: D) -> Result<Option<SyncState>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().map(SyncState::from_value))
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// Visibility applied to a published feature service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Sharing {
    #[serde(default)]
    pub org: bool,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub groups: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// Map-generation parameters for tile and vector tile jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileJob {
    /// Area-of-interest layer whose selected features bound the package.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aoi: Option<String>,
    /// Layers the AOI is selected against, in order.
    #[serde(default)]
    pub selectors: Vec<String>,
    #[serde(rename = "clearselection", default = "default_true")]
    pub clear_selection: bool,
    #[serde(rename = "minscale", default, skip_serializing_if = "Option::is_none")]
    pub min_scale: Option<f64>,
    #[serde(rename = "maxscale", default, skip_serializing_if = "Option::is_none")]
    pub max_scale: Option<f64>,
}

impl Default for TileJob {
    fn default() -> Self {
        Self {
            aoi: None,
            selectors: Vec::new(),
            clear_selection: true,
            min_scale: None,
            max_scale: None,
        }
    }
}

/// One publishable unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceItem {
    pub name: ItemName,
    #[serde(rename = "type")]
    pub kind: ServiceType,
    #[serde(default)]
    pub process: bool,
    /// Source project file on disk.
    pub project: PathBuf,
    /// Map name inside the project.
    pub map: String,
    #[serde(rename = "portalfolder", default, skip_serializing_if = "Option::is_none")]
    pub portal_folder: Option<String>,
    #[serde(default)]
    pub sharing: Sharing,
    #[serde(
        default,
        deserialize_with = "lenient_sync",
        skip_serializing_if = "Option::is_none"
    )]
    pub sync: Option<SyncState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Comma-separated tags, passed through to the portal as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    /// Existing portal item replaced by the tile branches.
    #[serde(rename = "itemid", default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiling: Option<TileJob>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ServiceItem {
    /// Effective sync state; a missing block means "never synced".
    pub fn sync_state(&self) -> SyncState {
        self.sync.clone().unwrap_or_default()
    }

    pub fn mark_synced(&mut self, today: NaiveDate) {
        let mut state = self.sync_state();
        state.mark_synced(today);
        self.sync = Some(state);
    }
}

fn default_older_than_days() -> u32 {
    7
}

/// A scheduled query-and-delete sweep over remote content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionTask {
    #[serde(rename = "searchstring", default, skip_serializing_if = "Option::is_none")]
    pub search_string: Option<String>,
    #[serde(rename = "olderthandays", default = "default_older_than_days")]
    pub older_than_days: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(rename = "contenttype", default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(rename = "portalfolder", default, skip_serializing_if = "Option::is_none")]
    pub portal_folder: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_sync",
        skip_serializing_if = "Option::is_none"
    )]
    pub sync: Option<SyncState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl RetentionTask {
    /// Human-readable label for log lines.
    pub fn label(&self) -> &str {
        self.summary
            .as_deref()
            .or(self.search_string.as_deref())
            .unwrap_or("unnamed task")
    }

    /// Record a successful sweep. Tasks without a sync block are never run,
    /// so there is nothing to update for them.
    pub fn mark_synced(&mut self, today: NaiveDate) {
        if let Some(state) = self.sync.as_mut() {
            state.mark_synced(today);
        }
    }
}

/// Plaintext portal credentials, held in memory for the duration of a run.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub portal: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("portal", &self.portal)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
