//! Response shapes of the portal REST API.

use chrono::{Local, NaiveDateTime, TimeZone};
use serde::Deserialize;
use serde_json::Value;

use portalsync_engine::{PlatformError, RemoteItem};

/// Reject `{"error": {...}}` envelopes and `"success": false` answers.
pub(crate) fn check(operation: &'static str, body: Value) -> Result<Value, PlatformError> {
    if let Some(error) = body.get("error") {
        return Err(api_error(operation, error));
    }
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(PlatformError::Response {
            operation,
            message: "portal reported success: false".to_string(),
        });
    }
    Ok(body)
}

fn api_error(operation: &'static str, error: &Value) -> PlatformError {
    PlatformError::Api {
        operation,
        code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
        message: error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string(),
        details: error
            .get("details")
            .and_then(Value::as_array)
            .map(|details| {
                details
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
    }
}

/// Decode a typed payload out of an already checked body.
pub(crate) fn decode<T: for<'de> Deserialize<'de>>(
    operation: &'static str,
    body: Value,
) -> Result<T, PlatformError> {
    serde_json::from_value(body).map_err(|e| PlatformError::Response {
        operation,
        message: e.to_string(),
    })
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenReply {
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchPage {
    #[serde(default)]
    pub results: Vec<ItemWire>,
    /// `-1` when there are no more pages.
    #[serde(default = "no_next_page")]
    pub next_start: i64,
}

fn no_next_page() -> i64 {
    -1
}

#[derive(Debug, Deserialize)]
pub(crate) struct ItemWire {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub owner: String,
    #[serde(rename = "type", default)]
    pub item_type: String,
    /// Epoch milliseconds.
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub modified: i64,
    #[serde(default)]
    pub protected: bool,
    #[serde(default)]
    pub url: Option<String>,
}

impl ItemWire {
    pub fn into_item(self, operation: &'static str) -> Result<RemoteItem, PlatformError> {
        let timestamp = |ms: i64| {
            from_epoch_millis(ms).ok_or_else(|| PlatformError::Response {
                operation,
                message: format!("item {} has an invalid timestamp {ms}", self.id),
            })
        };
        Ok(RemoteItem {
            created: timestamp(self.created)?,
            modified: timestamp(self.modified)?,
            id: self.id.clone(),
            title: self.title.clone(),
            owner: self.owner.clone(),
            item_type: self.item_type.clone(),
            protected: self.protected,
            url: self.url.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PublishReply {
    #[serde(default)]
    pub services: Vec<PublishedService>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PublishedService {
    #[serde(default)]
    pub service_item_id: Option<String>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl PublishReply {
    /// Item id of the first published service, or its embedded error.
    pub fn service_item_id(self, operation: &'static str) -> Result<String, PlatformError> {
        let Some(service) = self.services.into_iter().next() else {
            return Err(PlatformError::Response {
                operation,
                message: "no services in publish reply".to_string(),
            });
        };
        if let Some(error) = service.error {
            return Err(api_error(operation, &error));
        }
        service.service_item_id.ok_or_else(|| PlatformError::Response {
            operation,
            message: "publish reply has no serviceItemId".to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddItemReply {
    pub id: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct UserContent {
    #[serde(default)]
    pub folders: Vec<Folder>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Folder {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ShareReply {
    #[serde(default)]
    pub not_shared_with: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeleteReply {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub can_delete: Option<bool>,
    #[serde(default)]
    pub details: Option<Value>,
}

impl DeleteReply {
    pub fn can_delete(&self) -> bool {
        self.can_delete.or(self.success).unwrap_or(false)
    }

    pub fn message(&self) -> Option<String> {
        self.details
            .as_ref()
            .and_then(|d| d.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// Portal timestamps are epoch milliseconds; the engine works in local time.
pub fn from_epoch_millis(ms: i64) -> Option<NaiveDateTime> {
    Local
        .timestamp_millis_opt(ms)
        .earliest()
        .map(|dt| dt.naive_local())
}
