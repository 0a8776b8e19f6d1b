//! # portalsync-engine
//!
//! Publish orchestration: stage executor, artifact pipeline, bounded retry,
//! retention sweeps and the run loop that ties them to `settings.config`.
//!
//! Call [`run_at`] for a complete run from disk, or [`run_settings`] to
//! process an in-memory document against already-connected collaborators.

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod platform;
pub mod retention;
pub mod retry;
pub mod runlog;
pub mod stage;

pub use builder::{ArtifactBuilder, LayerHandle, MapHandle, ProjectHandle, SelectionMode};
pub use error::{BuildError, EngineError, PipelineError, PlatformError};
pub use orchestrator::{run_at, run_settings, RunReport};
pub use platform::{
    ContentPlatform, DeleteCheck, PackageItem, PlatformConnector, RemoteItem, SearchQuery,
};
pub use retention::{TaskReport, TaskStatus};
pub use runlog::{RunLog, Severity};
pub use stage::{ItemReport, ItemStatus, Stage, StageOutcome, StageStatus};
