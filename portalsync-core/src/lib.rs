//! portalsync core library: settings document, value model, scheduling.
//!
//! - [`types`]: newtypes and domain structs
//! - [`settings`]: load / save / init of `settings.config`
//! - [`codec`]: at-rest password obfuscation
//! - [`schedule`]: due / not-due decisions
//! - [`error`]: [`ConfigError`], [`CodecError`]

pub mod codec;
pub mod error;
pub mod schedule;
pub mod settings;
pub mod types;

pub use error::{CodecError, ConfigError};
pub use settings::{Settings, SettingsPaths};
pub use types::{
    Credentials, Frequency, ItemName, RetentionTask, ServiceItem, ServiceType, Sharing,
    RawFrequency, SyncState, TileFormat, TileJob,
};
