// SPDX-License-Identifier: AGPL-3.0
// Pin Sync Central - Serialized coordinator for a shared NAS or cloud folder
//
// This crate provides:
// - The RemoteFileTransport port and a mounted-folder implementation
// - Central, a single worker that runs every remote command in FIFO order
// - Session handling with transparent re-establishment and keep-alive
// - The lock file protocol and lastUpdated reconciliation
// - Bulk transfers of the database files and pictures
// - PinSync, which drives one full sync pass
//
// Domain types without I/O live in pinsync-core.

pub mod central;
pub mod local_folder;
pub mod local_store;
pub mod lock;
pub mod orchestrator;
pub mod queue;
pub mod reconcile;
pub mod session;
pub mod transfer;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;

// Re-export commonly used items
pub use central::{Central, Pending};
pub use local_folder::{FolderMount, FolderTransport};
pub use local_store::LocalStore;
pub use orchestrator::{PinSync, SyncReport};
pub use queue::{Command, CommandKind};
pub use session::{SessionController, SessionState};
pub use transfer::BulkTransferEngine;
pub use transport::{DeviceRef, FileRef, RemoteFileTransport, ShareRef, TransportError};
pub use types::{CentralConfig, CentralError, CentralEvent, TransferReport};
