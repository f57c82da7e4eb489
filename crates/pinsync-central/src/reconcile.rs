// SPDX-License-Identifier: AGPL-3.0
// Pin Sync Central - Timestamp reconciliation against the remote store

use crate::local_store::LocalStore;
use crate::transport::{RemoteFileTransport, TransportError};
use crate::types::CentralError;
use pinsync_core::manifest::{database_files, remote_path, LAST_UPDATED};
use pinsync_core::{compare_markers, CompareOutcome};

/// Read the remote marker and compare it with the local one
pub async fn compare<T>(
    transport: &T,
    root: &str,
    local: &LocalStore,
) -> Result<CompareOutcome, TransportError>
where
    T: RemoteFileTransport + ?Sized,
{
    let remote = match transport.read_file(&remote_path(root, LAST_UPDATED)).await {
        Ok(bytes) => Some(bytes),
        Err(e) if e.is_session_lost() => return Err(e),
        Err(e) => {
            tracing::info!("Remote lastUpdated not readable: {}", e);
            None
        }
    };
    let local_marker = local.read_marker().await;

    let outcome = compare_markers(local_marker.as_deref(), remote.as_deref());
    tracing::info!(
        "lastUpdated comparison: {:?}, remote writer {:?}",
        outcome.comparison,
        outcome.remote_writer
    );
    Ok(outcome)
}

/// Check that every database file exists on the remote store before a pull
pub async fn verify_remote_database<T>(transport: &T, root: &str) -> Result<(), CentralError>
where
    T: RemoteFileTransport + ?Sized,
{
    let listing = transport.list_directory(root).await?;
    let missing: Vec<String> = database_files()
        .into_iter()
        .filter(|name| !listing.iter().any(|entry| !entry.is_dir && &entry.name == name))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        tracing::warn!("Remote database incomplete, missing {:?}", missing);
        Err(CentralError::Incomplete { missing })
    }
}
