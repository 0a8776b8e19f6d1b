//! HTTP transport for the portal REST API.
//!
//! [`Transport`] is the seam between request building and the network so the
//! session logic can be tested against scripted responses. [`UreqTransport`]
//! is the blocking implementation used by the binary.

use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;

use portalsync_engine::PlatformError;

use crate::wire;

/// Form fields in request order. Values are sent as-is; encoding is the
/// transport's job.
pub type Form = Vec<(&'static str, String)>;

/// Blocking JSON-over-HTTP calls against the portal.
pub trait Transport {
    fn get(&self, operation: &'static str, url: &str, query: &Form)
        -> Result<Value, PlatformError>;

    fn post_form(
        &self,
        operation: &'static str,
        url: &str,
        form: &Form,
    ) -> Result<Value, PlatformError>;

    fn post_multipart(
        &self,
        operation: &'static str,
        url: &str,
        body: &Multipart,
    ) -> Result<Value, PlatformError>;
}

// ---------------------------------------------------------------------------
// Multipart
// ---------------------------------------------------------------------------

/// A `multipart/form-data` body whose file part is streamed from disk.
///
/// Text parts and part headers are buffered; the file itself is only opened
/// when the body is read, so package size does not bound memory.
#[derive(Debug, Clone)]
pub struct Multipart {
    boundary: String,
    fields: Vec<(String, String)>,
    head: Vec<u8>,
    file: Option<FilePart>,
}

#[derive(Debug, Clone)]
struct FilePart {
    path: PathBuf,
    len: u64,
}

impl Multipart {
    pub fn new() -> Self {
        Self::with_boundary(format!("portalsync-{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            fields: Vec::new(),
            head: Vec::new(),
            file: None,
        }
    }

    /// Add a text part. Text parts must come before the file part.
    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.open_part(name, None);
        self.head.extend_from_slice(value.as_bytes());
        self.head.extend_from_slice(b"\r\n");
        self.fields.push((name.to_string(), value.to_string()));
        self
    }

    /// Attach the file at `path` as the last part. Fails when the file
    /// cannot be inspected.
    pub fn file(mut self, name: &str, path: &Path) -> io::Result<Self> {
        let len = std::fs::metadata(path)?.len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "package".to_string());
        self.open_part(name, Some(&file_name));
        self.file = Some(FilePart {
            path: path.to_path_buf(),
            len,
        });
        Ok(self)
    }

    /// Text fields added so far, in order.
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Path of the attached file, if any.
    pub fn file_path(&self) -> Option<&Path> {
        self.file.as_ref().map(|f| f.path.as_path())
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Exact byte length of the body produced by [`Multipart::reader`].
    pub fn content_length(&self) -> u64 {
        let file = self.file.as_ref().map_or(0, |f| f.len + 2);
        self.head.len() as u64 + file + self.trailer().len() as u64
    }

    /// The complete body: buffered parts, then the file, then the closing boundary.
    pub fn reader(&self) -> io::Result<impl Read + Send + 'static> {
        let file: Box<dyn Read + Send> = match &self.file {
            Some(part) => Box::new(File::open(&part.path)?.take(part.len).chain(&b"\r\n"[..])),
            None => Box::new(io::empty()),
        };
        Ok(Cursor::new(self.head.clone())
            .chain(file)
            .chain(Cursor::new(self.trailer())))
    }

    fn trailer(&self) -> Vec<u8> {
        format!("--{}--\r\n", self.boundary).into_bytes()
    }

    fn open_part(&mut self, name: &str, file_name: Option<&str>) {
        let disposition = match file_name {
            Some(file_name) => format!(
                "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                 Content-Type: application/octet-stream\r\n"
            ),
            None => format!("Content-Disposition: form-data; name=\"{name}\"\r\n"),
        };
        self.head
            .extend_from_slice(format!("--{}\r\n{disposition}\r\n", self.boundary).as_bytes());
    }
}

impl Default for Multipart {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// ureq
// ---------------------------------------------------------------------------

/// Blocking transport on a shared `ureq` agent.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(300))
    }

    /// Uploads of large packages need a generous read timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(30))
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn get(
        &self,
        operation: &'static str,
        url: &str,
        query: &Form,
    ) -> Result<Value, PlatformError> {
        tracing::debug!("GET {url} ({operation})");
        let mut request = self.agent.get(url);
        for (key, value) in query {
            request = request.query(key, value);
        }
        read_json(operation, request.call())
    }

    fn post_form(
        &self,
        operation: &'static str,
        url: &str,
        form: &Form,
    ) -> Result<Value, PlatformError> {
        tracing::debug!("POST {url} ({operation})");
        let pairs: Vec<(&str, &str)> = form.iter().map(|(k, v)| (*k, v.as_str())).collect();
        read_json(operation, self.agent.post(url).send_form(&pairs))
    }

    fn post_multipart(
        &self,
        operation: &'static str,
        url: &str,
        body: &Multipart,
    ) -> Result<Value, PlatformError> {
        tracing::debug!(
            "POST {url} ({operation}, multipart, {} bytes)",
            body.content_length()
        );
        let reader = body.reader().map_err(|source| PlatformError::Io {
            path: body.file_path().map(Path::to_path_buf).unwrap_or_default(),
            source,
        })?;
        let response = self
            .agent
            .post(url)
            .set("Content-Type", &body.content_type())
            .set("Content-Length", &body.content_length().to_string())
            .send(reader);
        read_json(operation, response)
    }
}

fn read_json(
    operation: &'static str,
    response: Result<ureq::Response, ureq::Error>,
) -> Result<Value, PlatformError> {
    match response {
        Ok(response) => response
            .into_json::<Value>()
            .map_err(|e| PlatformError::Response {
                operation,
                message: format!("body is not JSON: {e}"),
            }),
        Err(ureq::Error::Status(code, response)) => {
            // Error bodies usually carry the portal's own envelope.
            match response.into_json::<Value>() {
                Ok(body) if body.get("error").is_some() => wire::check(operation, body),
                _ => Err(PlatformError::Transport {
                    operation,
                    message: format!("HTTP {code}"),
                }),
            }
        }
        Err(err) => Err(PlatformError::Transport {
            operation,
            message: err.to_string(),
        }),
    }
}
