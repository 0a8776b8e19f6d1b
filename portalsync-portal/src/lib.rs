//! # portalsync-portal
//!
//! Blocking client for a portal's sharing REST API, implementing the engine's
//! [`PlatformConnector`](portalsync_engine::PlatformConnector) and
//! [`ContentPlatform`](portalsync_engine::ContentPlatform).

pub mod client;
pub mod transport;
pub mod wire;

pub use client::{PortalConnector, PortalSession};
pub use transport::{Form, Multipart, Transport, UreqTransport};
