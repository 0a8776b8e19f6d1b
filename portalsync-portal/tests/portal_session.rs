use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use serde_json::{json, Value};
use tempfile::TempDir;

use portalsync_core::{Credentials, Sharing, TileFormat};
use portalsync_engine::{
    ContentPlatform, PackageItem, PlatformConnector, PlatformError, RemoteItem, SearchQuery,
};
use portalsync_portal::{Form, Multipart, PortalConnector, PortalSession, Transport};

// ---------------------------------------------------------------------------
// Scripted transport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct Request {
    method: &'static str,
    operation: &'static str,
    url: String,
    fields: Vec<(String, String)>,
}

impl Request {
    fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Default)]
struct Script {
    replies: VecDeque<Value>,
    requests: Vec<Request>,
}

#[derive(Clone, Default)]
struct ScriptedTransport {
    inner: Rc<RefCell<Script>>,
}

impl ScriptedTransport {
    fn reply(&self, body: Value) -> &Self {
        self.inner.borrow_mut().replies.push_back(body);
        self
    }

    fn requests(&self) -> Vec<Request> {
        self.inner.borrow().requests.clone()
    }

    fn answer(
        &self,
        method: &'static str,
        operation: &'static str,
        url: &str,
        fields: Vec<(String, String)>,
    ) -> Result<Value, PlatformError> {
        let mut script = self.inner.borrow_mut();
        script.requests.push(Request {
            method,
            operation,
            url: url.to_string(),
            fields,
        });
        script.replies.pop_front().ok_or(PlatformError::Transport {
            operation,
            message: "no scripted reply".to_string(),
        })
    }
}

fn owned(form: &Form) -> Vec<(String, String)> {
    form.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

impl Transport for ScriptedTransport {
    fn get(
        &self,
        operation: &'static str,
        url: &str,
        query: &Form,
    ) -> Result<Value, PlatformError> {
        self.answer("GET", operation, url, owned(query))
    }

    fn post_form(
        &self,
        operation: &'static str,
        url: &str,
        form: &Form,
    ) -> Result<Value, PlatformError> {
        self.answer("POST", operation, url, owned(form))
    }

    fn post_multipart(
        &self,
        operation: &'static str,
        url: &str,
        body: &Multipart,
    ) -> Result<Value, PlatformError> {
        self.answer("MULTIPART", operation, url, body.fields().to_vec())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const PORTAL: &str = "https://gis.example.org/portal";

fn credentials() -> Credentials {
    Credentials {
        portal: format!("{PORTAL}/"),
        username: "publisher".to_string(),
        password: "hunter2".to_string(),
    }
}

fn session(transport: &ScriptedTransport) -> PortalSession<ScriptedTransport> {
    transport.reply(json!({ "token": "tok", "expires": 0 }));
    PortalConnector::with_transport(transport.clone())
        .open(&credentials())
        .expect("session")
}

fn wire_item(id: &str, title: &str) -> Value {
    json!({
        "id": id, "title": title, "owner": "publisher", "type": "Service Definition",
        "created": 1_700_000_000_000_i64, "modified": 1_700_000_000_000_i64
    })
}

fn sd_item() -> RemoteItem {
    RemoteItem {
        id: "sd1".to_string(),
        title: "Parcels".to_string(),
        owner: "owner2".to_string(),
        item_type: "Service Definition".to_string(),
        created: portalsync_portal::wire::from_epoch_millis(0).expect("epoch"),
        modified: portalsync_portal::wire::from_epoch_millis(0).expect("epoch"),
        protected: false,
        url: None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn token_request_carries_credentials() {
    let transport = ScriptedTransport::default();
    let _session = session(&transport);

    let requests = transport.requests();
    assert_eq!(requests[0].url, format!("{PORTAL}/sharing/rest/generateToken"));
    assert_eq!(requests[0].field("username"), Some("publisher"));
    assert_eq!(requests[0].field("password"), Some("hunter2"));
    assert_eq!(requests[0].field("referer"), Some(PORTAL));
}

#[test]
fn rejected_sign_in_is_an_api_error() {
    let transport = ScriptedTransport::default();
    transport.reply(json!({ "error": { "code": 400, "message": "Unable to generate token.",
                                       "details": ["Invalid username or password."] } }));

    let err = PortalConnector::with_transport(transport)
        .connect(&credentials())
        .err()
        .expect("sign-in must fail");

    match err {
        PlatformError::Api { code, details, .. } => {
            assert_eq!(code, 400);
            assert_eq!(details, vec!["Invalid username or password.".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn search_follows_next_start_until_exhausted() {
    let transport = ScriptedTransport::default();
    let session = session(&transport);
    transport
        .reply(json!({ "results": [wire_item("a", "A"), wire_item("b", "B")], "nextStart": 101 }))
        .reply(json!({ "results": [wire_item("c", "C")], "nextStart": -1 }));

    let items = session
        .search(&SearchQuery::service_definition("Parcels", "publisher"))
        .expect("search");

    assert_eq!(
        items.iter().map(|i| i.id.as_str()).collect::<Vec<_>>(),
        vec!["a", "b", "c"]
    );
    let searches: Vec<Request> = transport
        .requests()
        .into_iter()
        .filter(|r| r.operation == "search")
        .collect();
    assert_eq!(searches.len(), 2);
    assert_eq!(searches[0].field("start"), Some("1"));
    assert_eq!(searches[1].field("start"), Some("101"));
    assert_eq!(searches[0].field("num"), Some("100"));
    assert_eq!(searches[0].field("token"), Some("tok"));
    assert_eq!(
        searches[0].field("q"),
        Some("Parcels AND owner:publisher AND type:\"Service Definition\"")
    );
}

#[test]
fn overwrite_uploads_republishes_and_returns_the_service() {
    let dir = TempDir::new().expect("tempdir");
    let package = dir.path().join("Parcels.sd");
    std::fs::write(&package, b"sd").expect("write package");

    let transport = ScriptedTransport::default();
    let session = session(&transport);
    transport
        .reply(json!({ "success": true, "id": "sd1" }))
        .reply(json!({ "services": [{ "serviceItemId": "fs1", "jobId": "j1" }] }))
        .reply(wire_item("fs1", "Parcels"));

    let service = session.overwrite(&sd_item(), &package).expect("overwrite");
    assert_eq!(service.id, "fs1");

    let requests = transport.requests();
    assert_eq!(requests[1].method, "MULTIPART");
    assert_eq!(
        requests[1].url,
        format!("{PORTAL}/sharing/rest/content/users/owner2/items/sd1/update")
    );
    assert_eq!(requests[2].operation, "publish");
    assert_eq!(requests[2].field("itemID"), Some("sd1"));
    assert_eq!(requests[2].field("filetype"), Some("serviceDefinition"));
    assert_eq!(requests[2].field("overwrite"), Some("true"));
    assert_eq!(
        requests[3].url,
        format!("{PORTAL}/sharing/rest/content/items/fs1")
    );
}

#[test]
fn overwrite_of_missing_package_is_io_error() {
    let transport = ScriptedTransport::default();
    let session = session(&transport);

    let err = session
        .overwrite(&sd_item(), std::path::Path::new("/nonexistent/Parcels.sd"))
        .expect_err("missing file");
    assert!(matches!(err, PlatformError::Io { .. }));
    assert_eq!(transport.requests().len(), 1, "nothing sent after sign-in");
}

#[test]
fn publish_package_adds_into_folder_and_returns_service_item() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("Basemap_20261018_093000.vtpk");
    std::fs::write(&path, b"vtpk").expect("write package");

    let transport = ScriptedTransport::default();
    let session = session(&transport);
    transport
        .reply(json!({ "folders": [{ "id": "f42", "title": "Basemaps" }] }))
        .reply(json!({ "success": true, "id": "pkg1", "folder": "f42" }))
        .reply(json!({ "services": [{ "serviceItemId": "svc1" }] }))
        .reply(wire_item("svc1", "Basemap_20261018_093000"));

    let published = session
        .publish_package(
            &path,
            &PackageItem {
                title: "Basemap_20261018_093000".to_string(),
                folder: Some("Basemaps".to_string()),
                summary: Some("City basemap".to_string()),
                tags: Some("basemap".to_string()),
                format: TileFormat::Vector,
            },
        )
        .expect("publish package");

    assert_eq!(published.id, "svc1");
    let requests = transport.requests();
    assert_eq!(
        requests[2].url,
        format!("{PORTAL}/sharing/rest/content/users/publisher/f42/addItem")
    );
    assert_eq!(requests[2].field("type"), Some("Vector Tile Package"));
    assert_eq!(requests[2].field("snippet"), Some("City basemap"));
    assert_eq!(requests[3].field("itemID"), Some("pkg1"));
    assert_eq!(requests[3].field("filetype"), Some("vectorTilePackage"));
    assert_eq!(
        requests[4].url,
        format!("{PORTAL}/sharing/rest/content/items/svc1")
    );
}

#[test]
fn replace_service_keeps_metadata() {
    let transport = ScriptedTransport::default();
    let session = session(&transport);
    transport.reply(json!({ "success": true }));

    session.replace_service("target", "svc1").expect("replace");

    let request = &transport.requests()[1];
    assert_eq!(request.field("toReplaceItemId"), Some("target"));
    assert_eq!(request.field("replacingItemId"), Some("svc1"));
    assert_eq!(request.field("replaceMetadata"), Some("false"));
}

#[test]
fn partial_share_is_reported() {
    let transport = ScriptedTransport::default();
    let session = session(&transport);
    transport.reply(json!({ "itemId": "sd1", "notSharedWith": ["g2"] }));

    let sharing = Sharing {
        org: true,
        public: false,
        groups: vec!["g1".to_string(), "g2".to_string()],
    };
    let err = session.share(&sd_item(), &sharing).expect_err("partial share");

    assert!(err.to_string().contains("not shared with g2"));
    let request = &transport.requests()[1];
    assert_eq!(request.field("groups"), Some("g1,g2"));
    assert_eq!(request.field("org"), Some("true"));
    assert_eq!(request.field("everyone"), Some("false"));
}

#[test]
fn dry_run_refusal_is_an_answer_not_an_error() {
    let transport = ScriptedTransport::default();
    let session = session(&transport);
    transport.reply(json!({
        "itemId": "sd1", "success": false, "canDelete": false,
        "details": { "message": "Item has dependent services." }
    }));

    let check = session.delete(&sd_item(), true).expect("dry run");

    assert!(!check.can_delete);
    assert_eq!(check.message.as_deref(), Some("Item has dependent services."));
    assert_eq!(transport.requests()[1].field("dryRun"), Some("true"));
}

#[test]
fn failed_real_delete_is_an_error() {
    let transport = ScriptedTransport::default();
    let session = session(&transport);
    transport.reply(json!({ "error": { "code": 500, "message": "Unable to delete item." } }));

    let err = session.delete(&sd_item(), false).expect_err("delete fails");
    assert!(matches!(err, PlatformError::Api { code: 500, .. }));
}
