// SPDX-License-Identifier: AGPL-3.0
// Pin Sync Core - Shared logic for the sync coordinator and its callers
//
// This crate provides:
// - SyncSettings, AccessDescriptor and AppError types
// - SettingsStore for persistent settings
// - SyncHistory for tracking past sync passes
// - The lock file convention and DeviceAccessControl
// - lastUpdated markers and timestamp reconciliation
// - Transfer manifests for the database and picture files
//
// Everything here is transport-free; the coordinator lives in pinsync-central.

pub mod access;
pub mod history;
pub mod manifest;
pub mod marker;
pub mod settings;
pub mod types;

// Re-export commonly used items
pub use access::{decide_lock_read, DeviceAccessControl, LockFileContents, LockReadDecision};
pub use history::{SyncDirection, SyncHistory, SyncOutcome, SyncRecord};
pub use manifest::{ManifestKind, TransferManifest};
pub use marker::{compare_markers, plan_sync, CompareOutcome, LastUpdatedMarker, MarkerComparison, SyncPlan};
pub use settings::SettingsStore;
pub use types::{AccessDenied, AccessDescriptor, AppError, DeviceIdentity, SyncSettings};
