// SPDX-License-Identifier: AGPL-3.0
// Pin Sync Central - Configuration, errors and results

use crate::queue::CommandKind;
use crate::transport::TransportError;
use pinsync_core::{AccessDenied, AccessDescriptor, AppError, DeviceAccessControl, DeviceIdentity, ManifestKind, SyncSettings};
use std::path::PathBuf;
use std::time::Duration;

/// Everything the coordinator needs at construction
#[derive(Debug, Clone)]
pub struct CentralConfig {
    pub identity: DeviceIdentity,
    pub access: Option<AccessDescriptor>,
    pub local_data_dir: PathBuf,
    pub discovery_window: Duration,
    pub keep_alive: bool,
}

impl CentralConfig {
    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self {
            identity: settings.identity(),
            access: settings.nas_access.clone(),
            local_data_dir: settings.local_data_dir.clone(),
            discovery_window: Duration::from_millis(settings.discovery_window_ms),
            keep_alive: settings.keep_alive,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CentralError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("No active session")]
    NoSession,

    #[error("Could not start a session: {0}")]
    SessionStartFailed(String),

    #[error("No NAS access configured")]
    NotConfigured,

    #[error("Access denied: {0}")]
    AccessDenied(#[from] AccessDenied),

    #[error("Remote files missing: {}", missing.join(", "))]
    Incomplete { missing: Vec<String> },

    #[error("Local file error: {0}")]
    LocalIo(String),

    #[error("Coordinator has shut down")]
    Shutdown,

    #[error(transparent)]
    App(#[from] AppError),
}

impl From<std::io::Error> for CentralError {
    fn from(err: std::io::Error) -> Self {
        CentralError::LocalIo(err.to_string())
    }
}

/// Outcome of a bulk transfer command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub kind: ManifestKind,
    /// Files removed from the destination before copying
    pub deleted: Vec<String>,
    /// Files copied, in the order they were written
    pub transferred: Vec<String>,
    /// Files skipped after a failure (best-effort manifests only)
    pub failed: Vec<String>,
}

impl TransferReport {
    pub(crate) fn new(kind: ManifestKind) -> Self {
        Self {
            kind,
            deleted: Vec::new(),
            transferred: Vec::new(),
            failed: Vec::new(),
        }
    }
}

/// Notifications for the orchestrator, in the order they happened
#[derive(Debug, Clone, PartialEq)]
pub enum CentralEvent {
    CommandCompleted {
        id: u64,
        kind: CommandKind,
        success: bool,
    },
    /// A session-requiring command found no session; restarting it
    Reestablishing,
    SessionStarted(DeviceAccessControl),
    SessionEnded,
    AccessChanged(DeviceAccessControl),
}
