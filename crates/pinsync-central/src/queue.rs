// SPDX-License-Identifier: AGPL-3.0
// Pin Sync Central - Request queue
//
// Commands run strictly one after another in submission order. The head of
// the queue is the request currently executing; it is popped only once its
// reply has been sent, or kept in place while a dropped session is restored.

use crate::transport::{DeviceRef, FileRef, ShareRef};
use crate::types::{CentralError, TransferReport};
use pinsync_core::{CompareOutcome, DeviceAccessControl};
use std::collections::VecDeque;

/// Reply channel carried by every command
pub type Reply<T> = async_channel::Sender<Result<T, CentralError>>;

/// Commands that can be sent to the coordinator
#[derive(Debug)]
pub enum Command {
    DiscoverDevices {
        reply: Reply<Vec<DeviceRef>>,
    },
    Connect {
        device: DeviceRef,
        user_name: String,
        password: String,
        reply: Reply<()>,
    },
    ListShares {
        reply: Reply<Vec<ShareRef>>,
    },
    OpenShare {
        share: ShareRef,
        reply: Reply<()>,
    },
    CloseShare {
        share: ShareRef,
        reply: Reply<()>,
    },
    ListDirectory {
        path: String,
        reply: Reply<Vec<FileRef>>,
    },
    CreateDirectory {
        path: String,
        reply: Reply<()>,
    },
    Disconnect {
        reply: Reply<()>,
    },
    StartSession {
        reply: Reply<DeviceAccessControl>,
    },
    EndSession {
        reply: Reply<()>,
    },
    AcquireLock {
        reply: Reply<DeviceAccessControl>,
    },
    ReleaseLock {
        reply: Reply<()>,
    },
    CompareLastUpdated {
        reply: Reply<CompareOutcome>,
    },
    VerifyRemoteDatabase {
        reply: Reply<()>,
    },
    CopyDatabaseToRemote {
        reply: Reply<TransferReport>,
    },
    CopyDatabaseFromRemote {
        reply: Reply<TransferReport>,
    },
    FetchImageNames {
        reply: Reply<Vec<String>>,
    },
    CopyAllImagesToRemote {
        reply: Reply<TransferReport>,
    },
    CopyAllImagesFromRemote {
        reply: Reply<TransferReport>,
    },
    ReadImage {
        name: String,
        reply: Reply<Vec<u8>>,
    },
    WriteImage {
        name: String,
        bytes: Vec<u8>,
        reply: Reply<()>,
    },
    DeleteImage {
        name: String,
        reply: Reply<()>,
    },
}

/// Payload-free tag for a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    DiscoverDevices,
    Connect,
    ListShares,
    OpenShare,
    CloseShare,
    ListDirectory,
    CreateDirectory,
    Disconnect,
    StartSession,
    EndSession,
    AcquireLock,
    ReleaseLock,
    CompareLastUpdated,
    VerifyRemoteDatabase,
    CopyDatabaseToRemote,
    CopyDatabaseFromRemote,
    FetchImageNames,
    CopyAllImagesToRemote,
    CopyAllImagesFromRemote,
    ReadImage,
    WriteImage,
    DeleteImage,
}

impl CommandKind {
    /// Session commands need a connected, opened, lock-checked session.
    /// Everything else is a connection or access command.
    pub fn requires_session(&self) -> bool {
        !matches!(
            self,
            Self::DiscoverDevices
                | Self::Connect
                | Self::ListShares
                | Self::OpenShare
                | Self::CloseShare
                | Self::ListDirectory
                | Self::CreateDirectory
                | Self::Disconnect
                | Self::StartSession
                | Self::EndSession
        )
    }

    /// Commands that write to the shared store and need the lock
    pub fn mutates_remote(&self) -> bool {
        matches!(
            self,
            Self::CopyDatabaseToRemote
                | Self::CopyAllImagesToRemote
                | Self::WriteImage
                | Self::DeleteImage
        )
    }
}

/// Send a terminal reply. A caller that stopped waiting is not an error.
pub(crate) fn respond<T>(reply: &Reply<T>, result: Result<T, CentralError>) -> bool {
    let success = result.is_ok();
    if reply.try_send(result).is_err() {
        tracing::debug!("Reply dropped, caller no longer waiting");
    }
    success
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::DiscoverDevices { .. } => CommandKind::DiscoverDevices,
            Self::Connect { .. } => CommandKind::Connect,
            Self::ListShares { .. } => CommandKind::ListShares,
            Self::OpenShare { .. } => CommandKind::OpenShare,
            Self::CloseShare { .. } => CommandKind::CloseShare,
            Self::ListDirectory { .. } => CommandKind::ListDirectory,
            Self::CreateDirectory { .. } => CommandKind::CreateDirectory,
            Self::Disconnect { .. } => CommandKind::Disconnect,
            Self::StartSession { .. } => CommandKind::StartSession,
            Self::EndSession { .. } => CommandKind::EndSession,
            Self::AcquireLock { .. } => CommandKind::AcquireLock,
            Self::ReleaseLock { .. } => CommandKind::ReleaseLock,
            Self::CompareLastUpdated { .. } => CommandKind::CompareLastUpdated,
            Self::VerifyRemoteDatabase { .. } => CommandKind::VerifyRemoteDatabase,
            Self::CopyDatabaseToRemote { .. } => CommandKind::CopyDatabaseToRemote,
            Self::CopyDatabaseFromRemote { .. } => CommandKind::CopyDatabaseFromRemote,
            Self::FetchImageNames { .. } => CommandKind::FetchImageNames,
            Self::CopyAllImagesToRemote { .. } => CommandKind::CopyAllImagesToRemote,
            Self::CopyAllImagesFromRemote { .. } => CommandKind::CopyAllImagesFromRemote,
            Self::ReadImage { .. } => CommandKind::ReadImage,
            Self::WriteImage { .. } => CommandKind::WriteImage,
            Self::DeleteImage { .. } => CommandKind::DeleteImage,
        }
    }

    /// Complete the command with an error, whatever its payload type
    pub(crate) fn fail(&self, err: CentralError) -> bool {
        match self {
            Self::DiscoverDevices { reply } => respond(reply, Err(err)),
            Self::Connect { reply, .. } => respond(reply, Err(err)),
            Self::ListShares { reply } => respond(reply, Err(err)),
            Self::OpenShare { reply, .. } => respond(reply, Err(err)),
            Self::CloseShare { reply, .. } => respond(reply, Err(err)),
            Self::ListDirectory { reply, .. } => respond(reply, Err(err)),
            Self::CreateDirectory { reply, .. } => respond(reply, Err(err)),
            Self::Disconnect { reply } => respond(reply, Err(err)),
            Self::StartSession { reply } => respond(reply, Err(err)),
            Self::EndSession { reply } => respond(reply, Err(err)),
            Self::AcquireLock { reply } => respond(reply, Err(err)),
            Self::ReleaseLock { reply } => respond(reply, Err(err)),
            Self::CompareLastUpdated { reply } => respond(reply, Err(err)),
            Self::VerifyRemoteDatabase { reply } => respond(reply, Err(err)),
            Self::CopyDatabaseToRemote { reply } => respond(reply, Err(err)),
            Self::CopyDatabaseFromRemote { reply } => respond(reply, Err(err)),
            Self::FetchImageNames { reply } => respond(reply, Err(err)),
            Self::CopyAllImagesToRemote { reply } => respond(reply, Err(err)),
            Self::CopyAllImagesFromRemote { reply } => respond(reply, Err(err)),
            Self::ReadImage { reply, .. } => respond(reply, Err(err)),
            Self::WriteImage { reply, .. } => respond(reply, Err(err)),
            Self::DeleteImage { reply, .. } => respond(reply, Err(err)),
        }
    }
}

/// A command waiting its turn
#[derive(Debug)]
pub struct QueuedRequest {
    pub id: u64,
    pub command: Command,
}

/// FIFO of pending requests; the head is the one executing
#[derive(Debug, Default)]
pub struct RequestQueue {
    requests: VecDeque<QueuedRequest>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a request. Returns true when the queue was idle before.
    pub fn enqueue(&mut self, request: QueuedRequest) -> bool {
        let was_idle = self.requests.is_empty();
        self.requests.push_back(request);
        was_idle
    }

    /// The request currently executing
    pub fn current(&self) -> Option<&QueuedRequest> {
        self.requests.front()
    }

    /// Finish the head request. With `pop == false` the head stays in place
    /// to be dispatched again. Returns the next request to dispatch.
    pub fn advance(&mut self, pop: bool) -> Option<&QueuedRequest> {
        if pop && self.requests.pop_front().is_none() {
            tracing::error!(sbh = true, "Advanced an empty request queue");
        }
        self.requests.front()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: u64) -> (QueuedRequest, async_channel::Receiver<Result<(), CentralError>>) {
        let (reply, rx) = async_channel::bounded(1);
        (
            QueuedRequest {
                id,
                command: Command::Disconnect { reply },
            },
            rx,
        )
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = RequestQueue::new();
        let (first, _rx1) = request(1);
        let (second, _rx2) = request(2);

        assert!(queue.enqueue(first));
        assert!(!queue.enqueue(second));
        assert_eq!(queue.current().map(|r| r.id), Some(1));
        assert_eq!(queue.advance(true).map(|r| r.id), Some(2));
        assert!(queue.advance(true).is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_advance_without_pop_keeps_head() {
        let mut queue = RequestQueue::new();
        let (first, _rx) = request(7);
        queue.enqueue(first);

        assert_eq!(queue.advance(false).map(|r| r.id), Some(7));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_underrun_is_not_fatal() {
        let mut queue = RequestQueue::new();
        assert!(queue.advance(true).is_none());
        assert!(queue.current().is_none());
    }

    #[test]
    fn test_fail_sends_exactly_one_reply() {
        let (req, rx) = request(1);
        assert!(!req.command.fail(CentralError::NoSession));
        assert!(matches!(rx.try_recv(), Ok(Err(CentralError::NoSession))));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_command_classification() {
        assert!(!CommandKind::StartSession.requires_session());
        assert!(!CommandKind::EndSession.requires_session());
        assert!(CommandKind::CompareLastUpdated.requires_session());
        assert!(CommandKind::CopyDatabaseToRemote.mutates_remote());
        assert!(!CommandKind::CopyDatabaseFromRemote.mutates_remote());
    }
}
