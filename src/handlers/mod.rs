//! Backup handlers and their discovery protocol
//!
//! ## Key Components
//!
//! - [`BackupHandler`] - Trait every handler kind implements
//! - [`Shutdown`] - Optional capability for handlers holding resources
//! - [`HandlerKind`] - Static descriptor holding a kind's two discovery functions
//! - [`discover`] - Driver that turns host configuration into handlers
//! - [`WledBackupHandler`] - Device-state backups over HTTP
//! - [`GenericDownloadHandler`] - URL-to-file downloads from a JSON file
//!
//! ## Example
//!
//! ```rust,ignore
//! use backup_octopus::handlers::{builtin_kinds, discover, DiscoveryContext};
//!
//! let ctx = DiscoveryContext { host: &host, http: &http };
//! let report = discover(&builtin_kinds(), &ctx);
//! for handler in report.handlers {
//!     manager.register_handler(handler)?;
//! }
//! ```

pub mod generic;
mod registry;
mod traits;
pub(crate) mod types;
pub mod wled;

pub use generic::{ConfigLoadError, GenericDownloadHandler};
pub use registry::{
    CreateHandlersFn, DiscoveryContext, DiscoveryError, DiscoveryReport, DiscoverySummary,
    FindEntriesFn, HandlerKind, builtin_kinds, discover,
};
pub use traits::{BackupHandler, HandlerError, Shutdown};
pub use types::{
    ConnectionInfo, DeviceIdentity, DiscoveredEntry, DownloadItem, DownloadState,
    sanitize_component,
};
pub use wled::WledBackupHandler;
