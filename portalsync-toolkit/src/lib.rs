//! Packaging toolkit: the production [`ArtifactBuilder`](portalsync_engine::ArtifactBuilder).
//!
//! Project files can only be read by the GIS desktop's own runtime, so this
//! crate shells out to a helper program for every operation. See [`helper`]
//! for the protocol.

pub mod builder;
pub mod helper;

pub use builder::ToolkitBuilder;
pub use helper::{Helper, Reply, ToolkitError};
