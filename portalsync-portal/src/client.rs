//! Portal session: the [`ContentPlatform`] operations as sharing REST calls.

use std::path::Path;

use serde_json::Value;

use portalsync_core::{Credentials, Sharing, TileFormat};
use portalsync_engine::{
    ContentPlatform, DeleteCheck, PackageItem, PlatformConnector, PlatformError, RemoteItem,
    SearchQuery,
};

use crate::transport::{Form, Multipart, Transport, UreqTransport};
use crate::wire::{self, AddItemReply, DeleteReply, ItemWire, PublishReply, SearchPage};

/// Results requested per search page.
pub const PAGE_SIZE: u32 = 100;

/// Token lifetime requested from `generateToken`, in minutes.
const TOKEN_MINUTES: u32 = 120;

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

/// Creates [`PortalSession`]s over a cloneable transport.
#[derive(Clone, Default)]
pub struct PortalConnector<T = UreqTransport> {
    transport: T,
}

impl<T: Transport + Clone + 'static> PortalConnector<T> {
    pub fn with_transport(transport: T) -> Self {
        Self { transport }
    }

    /// Generate a token and open a session.
    pub fn open(&self, credentials: &Credentials) -> Result<PortalSession<T>, PlatformError> {
        let base = credentials.portal.trim_end_matches('/').to_string();
        let url = format!("{base}/sharing/rest/generateToken");
        let form: Form = vec![
            ("username", credentials.username.clone()),
            ("password", credentials.password.clone()),
            ("client", "referer".to_string()),
            ("referer", base.clone()),
            ("expiration", TOKEN_MINUTES.to_string()),
            ("f", "json".to_string()),
        ];
        let raw = self.transport.post_form("generateToken", &url, &form)?;
        let body = wire::check("generateToken", raw)?;
        let reply: wire::TokenReply = wire::decode("generateToken", body)?;
        tracing::info!("signed in to {base} as {}", credentials.username);
        Ok(PortalSession {
            transport: self.transport.clone(),
            base,
            username: credentials.username.clone(),
            token: reply.token,
        })
    }
}

impl<T: Transport + Clone + 'static> PlatformConnector for PortalConnector<T> {
    fn connect(
        &self,
        credentials: &Credentials,
    ) -> Result<Box<dyn ContentPlatform>, PlatformError> {
        Ok(Box::new(self.open(credentials)?))
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// An authenticated portal session.
pub struct PortalSession<T = UreqTransport> {
    transport: T,
    base: String,
    username: String,
    token: String,
}

impl<T: Transport> PortalSession<T> {
    fn rest(&self, path: &str) -> String {
        format!("{}/sharing/rest/{path}", self.base)
    }

    fn user_content(&self, owner: &str, path: &str) -> String {
        self.rest(&format!("content/users/{owner}/{path}"))
    }

    /// `f=json` and the token, followed by `extra`.
    fn form(&self, extra: Form) -> Form {
        let mut form: Form = vec![("f", "json".to_string()), ("token", self.token.clone())];
        form.extend(extra);
        form
    }

    fn get(&self, operation: &'static str, url: &str, query: Form) -> Result<Value, PlatformError> {
        let raw = self.transport.get(operation, url, &self.form(query))?;
        wire::check(operation, raw)
    }

    fn post(&self, operation: &'static str, url: &str, form: Form) -> Result<Value, PlatformError> {
        let raw = self.transport.post_form(operation, url, &self.form(form))?;
        wire::check(operation, raw)
    }

    fn upload(
        &self,
        operation: &'static str,
        url: &str,
        fields: Form,
        path: &Path,
    ) -> Result<Value, PlatformError> {
        let body = self
            .form(fields)
            .iter()
            .fold(Multipart::new(), |body, (k, v)| body.text(k, v))
            .file("file", path)
            .map_err(|source| PlatformError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        wire::check(operation, self.transport.post_multipart(operation, url, &body)?)
    }

    fn item(&self, id: &str) -> Result<RemoteItem, PlatformError> {
        let body = self.get("item", &self.rest(&format!("content/items/{id}")), Vec::new())?;
        wire::decode::<ItemWire>("item", body)?.into_item("item")
    }

    /// Id of the signed-in user's folder titled `title`, if it exists.
    fn folder_id(&self, title: &str) -> Result<Option<String>, PlatformError> {
        let url = self.rest(&format!("content/users/{}", self.username));
        let body = self.get("userContent", &url, Vec::new())?;
        let content: wire::UserContent = wire::decode("userContent", body)?;
        Ok(content
            .folders
            .into_iter()
            .find(|f| f.title == title)
            .map(|f| f.id))
    }

    /// Publish an uploaded item; returns the id of the service item.
    fn publish(&self, item_id: &str, file_type: &str, extra: Form) -> Result<String, PlatformError> {
        let mut form: Form = vec![
            ("itemID", item_id.to_string()),
            ("filetype", file_type.to_string()),
        ];
        form.extend(extra);
        let body = self.post("publish", &self.user_content(&self.username, "publish"), form)?;
        wire::decode::<PublishReply>("publish", body)?.service_item_id("publish")
    }
}

/// `filetype` of the publish call for each package format.
pub fn publish_file_type(format: TileFormat) -> &'static str {
    match format {
        TileFormat::Raster => "compactTilePackage",
        TileFormat::Vector => "vectorTilePackage",
    }
}

impl<T: Transport> ContentPlatform for PortalSession<T> {
    fn search(&self, query: &SearchQuery) -> Result<Vec<RemoteItem>, PlatformError> {
        let q = query.to_query_string();
        let url = self.rest("search");
        let mut items = Vec::new();
        let mut start: i64 = 1;
        loop {
            let body = self.get(
                "search",
                &url,
                vec![
                    ("q", q.clone()),
                    ("num", PAGE_SIZE.to_string()),
                    ("start", start.to_string()),
                ],
            )?;
            let page: SearchPage = wire::decode("search", body)?;
            for item in page.results {
                items.push(item.into_item("search")?);
            }
            // A next start that does not move forward would loop forever.
            if page.next_start <= start {
                break;
            }
            start = page.next_start;
        }
        tracing::debug!("search '{q}' returned {} items", items.len());
        Ok(items)
    }

    fn overwrite(&self, item: &RemoteItem, package: &Path) -> Result<RemoteItem, PlatformError> {
        let url = self.user_content(&item.owner, &format!("items/{}/update", item.id));
        self.upload("update", &url, Vec::new(), package)?;
        let service_id = self.publish(
            &item.id,
            "serviceDefinition",
            vec![("overwrite", "true".to_string())],
        )?;
        tracing::debug!("republished {} as service item {service_id}", item.id);
        self.item(&service_id)
    }

    fn share(&self, item: &RemoteItem, sharing: &Sharing) -> Result<(), PlatformError> {
        let url = self.user_content(&item.owner, &format!("items/{}/share", item.id));
        let body = self.post(
            "share",
            &url,
            vec![
                ("everyone", sharing.public.to_string()),
                ("org", sharing.org.to_string()),
                ("groups", sharing.groups.join(",")),
            ],
        )?;
        let reply: wire::ShareReply = wire::decode("share", body)?;
        if reply.not_shared_with.is_empty() {
            Ok(())
        } else {
            Err(PlatformError::Response {
                operation: "share",
                message: format!("not shared with {}", reply.not_shared_with.join(", ")),
            })
        }
    }

    fn publish_package(
        &self,
        path: &Path,
        package: &PackageItem,
    ) -> Result<RemoteItem, PlatformError> {
        let folder = match package.folder.as_deref() {
            Some(title) => {
                let id = self.folder_id(title)?;
                if id.is_none() {
                    tracing::warn!("portal folder '{title}' not found, adding to root");
                }
                id
            }
            None => None,
        };
        let add_path = match &folder {
            Some(id) => format!("{id}/addItem"),
            None => "addItem".to_string(),
        };
        let body = self.upload(
            "addItem",
            &self.user_content(&self.username, &add_path),
            vec![
                ("title", package.title.clone()),
                ("type", package.format.item_type().to_string()),
                ("tags", package.tags.clone().unwrap_or_default()),
                ("snippet", package.summary.clone().unwrap_or_default()),
            ],
            path,
        )?;
        let added: AddItemReply = wire::decode("addItem", body)?;

        let publish_parameters = serde_json::json!({ "name": package.title }).to_string();
        let service_id = self.publish(
            &added.id,
            publish_file_type(package.format),
            vec![("publishParameters", publish_parameters)],
        )?;
        self.item(&service_id)
    }

    fn replace_service(
        &self,
        existing_id: &str,
        replacement_id: &str,
    ) -> Result<(), PlatformError> {
        self.post(
            "replaceService",
            &self.user_content(&self.username, "replaceService"),
            vec![
                ("toReplaceItemId", existing_id.to_string()),
                ("replacingItemId", replacement_id.to_string()),
                ("replaceMetadata", "false".to_string()),
            ],
        )?;
        Ok(())
    }

    fn delete(&self, item: &RemoteItem, dry_run: bool) -> Result<DeleteCheck, PlatformError> {
        let url = self.user_content(&item.owner, &format!("items/{}/delete", item.id));
        let raw = self
            .transport
            .post_form("delete", &url, &self.form(vec![("dryRun", dry_run.to_string())]))?;
        // A dry run that says "no" comes back as success: false; that is an answer.
        let reply: DeleteReply = if dry_run && raw.get("error").is_none() {
            wire::decode("delete", raw)?
        } else {
            wire::decode("delete", wire::check("delete", raw)?)?
        };
        Ok(DeleteCheck {
            can_delete: reply.can_delete(),
            message: reply.message(),
        })
    }
}
