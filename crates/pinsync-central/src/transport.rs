// SPDX-License-Identifier: AGPL-3.0
// Pin Sync Central - Remote file transport port
//
// The coordinator never talks SMB or CloudKit directly. It drives one of
// these, one operation at a time. Paths are relative to the open share and
// use `/` separators.

use async_trait::async_trait;
use pinsync_core::AccessDescriptor;

/// A device found on the network or named by an access descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceRef {
    pub name: String,
    pub host: String,
    pub group: String,
}

impl From<&AccessDescriptor> for DeviceRef {
    fn from(access: &AccessDescriptor) -> Self {
        Self {
            name: access.netbios_name.clone(),
            host: access.host.clone(),
            group: access.group.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareRef {
    pub name: String,
}

impl ShareRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Entry returned by a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Not connected")]
    NotConnected,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Errors meaning the session dropped underneath us
    pub fn is_session_lost(&self) -> bool {
        matches!(self, Self::NotConnected | Self::Timeout)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Primitive operations against a NAS share or cloud container.
///
/// Implementations may assume a single operation in flight.
#[async_trait]
pub trait RemoteFileTransport: Send + Sync + 'static {
    /// Report devices as they are found until the future is dropped or the
    /// transport has nothing more to report.
    async fn discover(&self, found: async_channel::Sender<DeviceRef>) -> Result<(), TransportError>;

    async fn connect(&self, device: &DeviceRef, user: &str, password: &str) -> Result<(), TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;

    async fn list_shares(&self) -> Result<Vec<ShareRef>, TransportError>;

    async fn open_share(&self, share: &ShareRef) -> Result<(), TransportError>;

    async fn close_share(&self, share: &ShareRef) -> Result<(), TransportError>;

    async fn list_directory(&self, path: &str) -> Result<Vec<FileRef>, TransportError>;

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, TransportError>;

    async fn write_file(&self, path: &str, bytes: &[u8]) -> Result<(), TransportError>;

    async fn delete_file(&self, path: &str) -> Result<(), TransportError>;

    async fn create_directory(&self, path: &str) -> Result<(), TransportError>;
}
