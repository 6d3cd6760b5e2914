use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use thiserror::Error;
use tracing::{debug, error, info};

use super::traits::BackupHandler;
use super::types::DiscoveredEntry;
use crate::host::HostContext;
use crate::http::HttpClient;

/// Everything a kind may read while discovering handlers
#[derive(Debug, Clone, Copy)]
pub struct DiscoveryContext<'a> {
    pub host: &'a HostContext,
    pub http: &'a HttpClient,
}

pub type FindEntriesFn = fn(&HostContext) -> Vec<DiscoveredEntry>;
pub type CreateHandlersFn = fn(&DiscoveryContext<'_>, &DiscoveredEntry) -> Vec<Box<dyn BackupHandler>>;

/// Static descriptor of one handler kind
#[derive(Clone, Copy)]
pub struct HandlerKind {
    pub name: &'static str,
    pub find_entries: FindEntriesFn,
    pub create_handlers_from_entry: CreateHandlersFn,
}

impl std::fmt::Debug for HandlerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerKind").field("name", &self.name).finish()
    }
}

/// Kinds shipped with the crate, in discovery order
pub fn builtin_kinds() -> Vec<HandlerKind> {
    vec![super::wled::KIND, super::generic::KIND]
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("handler kind '{kind}' failed to enumerate entries: {reason}")]
    FindEntries { kind: String, reason: String },
    #[error("handler kind '{kind}' failed to convert entry '{entry}': {reason}")]
    CreateHandlers {
        kind: String,
        entry: String,
        reason: String,
    },
}

/// Outcome of a discovery pass without the handlers themselves
#[derive(Debug, Default)]
pub struct DiscoverySummary {
    /// Handlers produced per kind
    pub per_kind: BTreeMap<String, usize>,
    pub errors: Vec<DiscoveryError>,
}

impl DiscoverySummary {
    pub fn total_handlers(&self) -> usize {
        self.per_kind.values().sum()
    }
}

pub struct DiscoveryReport {
    pub handlers: Vec<Box<dyn BackupHandler>>,
    pub summary: DiscoverySummary,
}

/// Run every kind's discovery protocol
///
/// Each `find_entries` and each `create_handlers_from_entry` call is isolated:
/// a panicking kind or entry is recorded and the rest still run.
pub fn discover(kinds: &[HandlerKind], ctx: &DiscoveryContext<'_>) -> DiscoveryReport {
    let mut handlers: Vec<Box<dyn BackupHandler>> = Vec::new();
    let mut summary = DiscoverySummary::default();

    for kind in kinds {
        let entries = match catch_unwind(AssertUnwindSafe(|| (kind.find_entries)(ctx.host))) {
            Ok(entries) => entries,
            Err(payload) => {
                let err = DiscoveryError::FindEntries {
                    kind: kind.name.to_string(),
                    reason: panic_message(payload.as_ref()),
                };
                error!(kind = kind.name, error = %err, "Handler discovery failed");
                summary.errors.push(err);
                summary.per_kind.insert(kind.name.to_string(), 0);
                continue;
            }
        };

        debug!(kind = kind.name, entries = entries.len(), "Entries found");

        let mut produced = 0;
        for entry in &entries {
            match catch_unwind(AssertUnwindSafe(|| {
                (kind.create_handlers_from_entry)(ctx, entry)
            })) {
                Ok(created) => {
                    produced += created.len();
                    handlers.extend(created);
                }
                Err(payload) => {
                    let err = DiscoveryError::CreateHandlers {
                        kind: kind.name.to_string(),
                        entry: entry.label().to_string(),
                        reason: panic_message(payload.as_ref()),
                    };
                    error!(kind = kind.name, entry_id = entry.label(), error = %err, "Handler creation failed");
                    summary.errors.push(err);
                }
            }
        }

        info!(kind = kind.name, handlers = produced, "Discovered handlers");
        summary.per_kind.insert(kind.name.to_string(), produced);
    }

    DiscoveryReport { handlers, summary }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
