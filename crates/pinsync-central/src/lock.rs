// SPDX-License-Identifier: AGPL-3.0
// Pin Sync Central - Lock file protocol
//
// Acquisition runs right after a session starts: read the lock file, claim
// it when nobody holds it, otherwise record who does.

use crate::transport::{RemoteFileTransport, TransportError};
use pinsync_core::manifest::{remote_path, LOCK_FILE};
use pinsync_core::{decide_lock_read, DeviceAccessControl, DeviceIdentity, LockFileContents, LockReadDecision};

/// Read or claim the lock. Only a dropped session is reported as an error;
/// every other outcome is expressed in the returned access state.
pub async fn acquire<T>(
    transport: &T,
    root: &str,
    me: &DeviceIdentity,
) -> Result<DeviceAccessControl, TransportError>
where
    T: RemoteFileTransport + ?Sized,
{
    let lock_path = remote_path(root, LOCK_FILE);

    let read = match transport.read_file(&lock_path).await {
        Ok(bytes) => Some(bytes),
        Err(e) if e.is_session_lost() => return Err(e),
        Err(e) => {
            tracing::debug!("Lock file not readable ({}), treating as absent", e);
            None
        }
    };

    match decide_lock_read(read.as_deref(), me) {
        LockReadDecision::Claim => claim(transport, &lock_path, me).await,
        LockReadDecision::Observed(access) => {
            tracing::info!(
                "Lock held by {} (mine: {})",
                access.owner_name(),
                access.by_me()
            );
            Ok(access)
        }
        LockReadDecision::Malformed(text) => {
            tracing::error!("Lock file content malformed: {:?}", text);
            Ok(DeviceAccessControl::reset())
        }
    }
}

async fn claim<T>(
    transport: &T,
    lock_path: &str,
    me: &DeviceIdentity,
) -> Result<DeviceAccessControl, TransportError>
where
    T: RemoteFileTransport + ?Sized,
{
    let contents = LockFileContents::for_device(me).render();
    match transport.write_file(lock_path, contents.as_bytes()).await {
        Ok(()) => {
            tracing::info!("Lock claimed by {}", me);
            Ok(DeviceAccessControl::held_by_me(me))
        }
        Err(e) if e.is_session_lost() => Err(e),
        Err(e) => {
            tracing::error!("Failed to write lock file: {}", e);
            Ok(DeviceAccessControl::reset())
        }
    }
}

/// Delete the lock file. A lock file that is already gone is not an error.
pub async fn release<T>(transport: &T, root: &str) -> Result<(), TransportError>
where
    T: RemoteFileTransport + ?Sized,
{
    match transport.delete_file(&remote_path(root, LOCK_FILE)).await {
        Ok(()) => {
            tracing::info!("Lock released");
            Ok(())
        }
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e),
    }
}
