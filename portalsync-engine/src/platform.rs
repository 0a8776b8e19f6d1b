//! Remote content platform capability.
//!
//! [`PlatformConnector`] turns credentials into a session; the session is a
//! [`ContentPlatform`]. `portalsync-portal` implements both over HTTP.

use std::fmt;
use std::path::Path;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use portalsync_core::{Credentials, Sharing, TileFormat};

use crate::error::PlatformError;

/// Item type of the packages the feature branch overwrites.
pub const SERVICE_DEFINITION: &str = "Service Definition";

/// A content item as returned by search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteItem {
    pub id: String,
    pub title: String,
    pub owner: String,
    pub item_type: String,
    pub created: NaiveDateTime,
    pub modified: NaiveDateTime,
    /// Delete protection flag set on the item.
    pub protected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Structured search: a free-text query plus an optional item type filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub text: String,
    pub item_type: Option<String>,
}

impl SearchQuery {
    /// Service definitions named `name` owned by `owner`.
    pub fn service_definition(name: &str, owner: &str) -> Self {
        Self {
            text: format!("{name} AND owner:{owner}"),
            item_type: Some(SERVICE_DEFINITION.to_string()),
        }
    }

    /// Retention candidates: a title search narrowed by whichever of
    /// `owner` and `content_type` are set.
    pub fn retention(search: &str, owner: Option<&str>, content_type: Option<&str>) -> Self {
        let title = format!("title:\"{search}\"");
        let text = match (owner, content_type) {
            (Some(owner), Some(kind)) => format!("{title} AND owner:{owner} AND type:\"{kind}\""),
            (Some(owner), None) => format!("{title} AND owner:{owner}"),
            (None, Some(kind)) => format!("{title} AND type:\"{kind}\""),
            (None, None) => title,
        };
        Self {
            text,
            item_type: None,
        }
    }

    /// The query as a single portal search string.
    pub fn to_query_string(&self) -> String {
        match &self.item_type {
            Some(kind) => format!("{} AND type:\"{kind}\"", self.text),
            None => self.text.clone(),
        }
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query_string())
    }
}

/// Metadata of a newly uploaded tile package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageItem {
    pub title: String,
    pub folder: Option<String>,
    pub summary: Option<String>,
    pub tags: Option<String>,
    pub format: TileFormat,
}

/// Answer of a delete call. For a dry run, whether the real delete would succeed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeleteCheck {
    pub can_delete: bool,
    pub message: Option<String>,
}

/// Operations the engine needs from the portal.
pub trait ContentPlatform {
    /// All items matching `query`; implementations page until exhausted.
    fn search(&self, query: &SearchQuery) -> Result<Vec<RemoteItem>, PlatformError>;

    /// Upload `package` over `item` and republish the service in place.
    /// Returns the published service item.
    fn overwrite(&self, item: &RemoteItem, package: &Path) -> Result<RemoteItem, PlatformError>;

    /// Set org, public and group visibility of a published item.
    fn share(&self, item: &RemoteItem, sharing: &Sharing) -> Result<(), PlatformError>;

    /// Add the package at `path` as a new item and publish it.
    fn publish_package(
        &self,
        path: &Path,
        package: &PackageItem,
    ) -> Result<RemoteItem, PlatformError>;

    /// Swap the data behind `existing_id` for that of `replacement_id`.
    /// Metadata of the existing service is kept.
    fn replace_service(&self, existing_id: &str, replacement_id: &str)
        -> Result<(), PlatformError>;

    fn delete(&self, item: &RemoteItem, dry_run: bool) -> Result<DeleteCheck, PlatformError>;
}

/// Establishes a session with the portal.
pub trait PlatformConnector {
    fn connect(&self, credentials: &Credentials)
        -> Result<Box<dyn ContentPlatform>, PlatformError>;
}
