// SPDX-License-Identifier: AGPL-3.0
// Pin Sync Central - Coordinator
//
// Bridges callers with a single worker task that owns the transport. Every
// request goes through one FIFO, so the transport never sees two operations
// at once, and every request gets exactly one reply.

use crate::local_store::LocalStore;
use crate::lock;
use crate::queue::{respond, Command, CommandKind, QueuedRequest, Reply, RequestQueue};
use crate::reconcile;
use crate::session::{EndDisposition, SessionController, StartDisposition};
use crate::transfer::BulkTransferEngine;
use crate::transport::{DeviceRef, FileRef, RemoteFileTransport, ShareRef};
use crate::types::{CentralConfig, CentralError, CentralEvent, TransferReport};
use async_channel::{Receiver, Sender};
use pinsync_core::manifest::{remote_path, IMAGES_DIR};
use pinsync_core::{AccessDenied, AccessDescriptor, CompareOutcome, DeviceAccessControl};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Capacity of the event channel; events beyond it are dropped, never waited on
const EVENT_CAPACITY: usize = 256;

/// Reply to a queued command
#[derive(Debug)]
pub struct Pending<T> {
    id: u64,
    rx: Receiver<Result<T, CentralError>>,
}

impl<T> Pending<T> {
    /// Queue position identifier, matching `CentralEvent::CommandCompleted`
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the command to finish
    pub async fn wait(self) -> Result<T, CentralError> {
        self.rx.recv().await.unwrap_or(Err(CentralError::Shutdown))
    }
}

/// Handle to the coordinator. Cheap to share behind an `Arc`.
pub struct Central {
    command_tx: Sender<QueuedRequest>,
    event_rx: Receiver<CentralEvent>,
    access_rx: watch::Receiver<DeviceAccessControl>,
    resigning: Arc<AtomicBool>,
    next_id: AtomicU64,
    worker: JoinHandle<()>,
}

impl Central {
    /// Start the worker on the current tokio runtime
    pub fn spawn<T: RemoteFileTransport>(config: CentralConfig, transport: Arc<T>) -> Self {
        let (command_tx, command_rx) = async_channel::unbounded::<QueuedRequest>();
        let (event_tx, event_rx) = async_channel::bounded::<CentralEvent>(EVENT_CAPACITY);
        let (access_tx, access_rx) = watch::channel(DeviceAccessControl::reset());
        let resigning = Arc::new(AtomicBool::new(false));

        let worker = Worker {
            queue: RequestQueue::new(),
            inbox: command_rx,
            executor: Executor {
                local: LocalStore::new(&config.local_data_dir),
                config,
                transport,
                session: SessionController::new(),
                access: access_tx,
                events: event_tx,
                resigning: resigning.clone(),
            },
        };
        let worker = tokio::spawn(worker.run());

        Self {
            command_tx,
            event_rx,
            access_rx,
            resigning,
            next_id: AtomicU64::new(1),
            worker,
        }
    }

    /// Append a command to the queue. Returns its id.
    pub fn enqueue(&self, command: Command) -> Result<u64, CentralError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let kind = command.kind();
        self.command_tx
            .try_send(QueuedRequest { id, command })
            .map_err(|_| CentralError::Shutdown)?;
        tracing::debug!("Enqueued {:?} as #{}", kind, id);
        Ok(id)
    }

    fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Pending<T> {
        let (reply, rx) = async_channel::bounded(1);
        // A failed enqueue drops the reply sender, so `wait` reports Shutdown
        let id = self.enqueue(build(reply)).unwrap_or(0);
        Pending { id, rx }
    }

    pub fn discover_devices(&self) -> Pending<Vec<DeviceRef>> {
        self.request(|reply| Command::DiscoverDevices { reply })
    }

    pub fn connect(&self, device: DeviceRef, user_name: &str, password: &str) -> Pending<()> {
        let user_name = user_name.to_string();
        let password = password.to_string();
        self.request(|reply| Command::Connect {
            device,
            user_name,
            password,
            reply,
        })
    }

    pub fn list_shares(&self) -> Pending<Vec<ShareRef>> {
        self.request(|reply| Command::ListShares { reply })
    }

    pub fn open_share(&self, share: ShareRef) -> Pending<()> {
        self.request(|reply| Command::OpenShare { share, reply })
    }

    pub fn close_share(&self, share: ShareRef) -> Pending<()> {
        self.request(|reply| Command::CloseShare { share, reply })
    }

    pub fn list_directory(&self, path: &str) -> Pending<Vec<FileRef>> {
        let path = path.to_string();
        self.request(|reply| Command::ListDirectory { path, reply })
    }

    pub fn create_directory(&self, path: &str) -> Pending<()> {
        let path = path.to_string();
        self.request(|reply| Command::CreateDirectory { path, reply })
    }

    pub fn disconnect(&self) -> Pending<()> {
        self.request(|reply| Command::Disconnect { reply })
    }

    pub fn start_session(&self) -> Pending<DeviceAccessControl> {
        self.request(|reply| Command::StartSession { reply })
    }

    pub fn end_session(&self) -> Pending<()> {
        self.request(|reply| Command::EndSession { reply })
    }

    pub fn acquire_lock(&self) -> Pending<DeviceAccessControl> {
        self.request(|reply| Command::AcquireLock { reply })
    }

    pub fn release_lock(&self) -> Pending<()> {
        self.request(|reply| Command::ReleaseLock { reply })
    }

    pub fn compare_last_updated(&self) -> Pending<CompareOutcome> {
        self.request(|reply| Command::CompareLastUpdated { reply })
    }

    pub fn verify_remote_database(&self) -> Pending<()> {
        self.request(|reply| Command::VerifyRemoteDatabase { reply })
    }

    pub fn copy_database_to_remote(&self) -> Pending<TransferReport> {
        self.request(|reply| Command::CopyDatabaseToRemote { reply })
    }

    pub fn copy_database_from_remote(&self) -> Pending<TransferReport> {
        self.request(|reply| Command::CopyDatabaseFromRemote { reply })
    }

    pub fn fetch_image_names(&self) -> Pending<Vec<String>> {
        self.request(|reply| Command::FetchImageNames { reply })
    }

    pub fn copy_all_images_to_remote(&self) -> Pending<TransferReport> {
        self.request(|reply| Command::CopyAllImagesToRemote { reply })
    }

    pub fn copy_all_images_from_remote(&self) -> Pending<TransferReport> {
        self.request(|reply| Command::CopyAllImagesFromRemote { reply })
    }

    pub fn read_image(&self, name: &str) -> Pending<Vec<u8>> {
        let name = name.to_string();
        self.request(|reply| Command::ReadImage { name, reply })
    }

    pub fn write_image(&self, name: &str, bytes: Vec<u8>) -> Pending<()> {
        let name = name.to_string();
        self.request(|reply| Command::WriteImage { name, bytes, reply })
    }

    pub fn delete_image(&self, name: &str) -> Pending<()> {
        let name = name.to_string();
        self.request(|reply| Command::DeleteImage { name, reply })
    }

    /// Set while the app is going to the background; stops keep-alive
    pub fn set_resigning(&self, resigning: bool) {
        self.resigning.store(resigning, Ordering::SeqCst);
    }

    /// Current believed lock state
    pub fn access_control(&self) -> DeviceAccessControl {
        self.access_rx.borrow().clone()
    }

    /// Watch the lock state as it changes
    pub fn subscribe_access(&self) -> watch::Receiver<DeviceAccessControl> {
        self.access_rx.clone()
    }

    /// Gate for callers about to change pins or images on the shared store
    pub fn check_can_update(&self) -> Result<(), AccessDenied> {
        self.access_rx.borrow().check_can_update()
    }

    /// Get event receiver for subscribing to coordinator events
    pub fn event_receiver(&self) -> Receiver<CentralEvent> {
        self.event_rx.clone()
    }

    /// Stop accepting commands and wait for queued ones to finish
    pub async fn shutdown(self) {
        self.command_tx.close();
        if let Err(e) = self.worker.await {
            tracing::error!("Coordinator worker ended abnormally: {}", e);
        }
    }
}

struct Worker<T: RemoteFileTransport> {
    queue: RequestQueue,
    inbox: Receiver<QueuedRequest>,
    executor: Executor<T>,
}

impl<T: RemoteFileTransport> Worker<T> {
    async fn run(mut self) {
        loop {
            if self.queue.is_empty() {
                // Idle until the next command arrives
                match self.inbox.recv().await {
                    Ok(request) => {
                        self.queue.enqueue(request);
                    }
                    Err(_) => break,
                }
            }
            while let Ok(request) = self.inbox.try_recv() {
                self.queue.enqueue(request);
            }
            self.process_head().await;
        }
        tracing::debug!("Coordinator worker stopped");
    }

    async fn process_head(&mut self) {
        let Some(request) = self.queue.current() else {
            tracing::error!(sbh = true, "Request queue empty when a request was expected");
            return;
        };
        let kind = request.command.kind();

        if self.executor.session.needs_reestablish(kind) {
            self.executor.session.begin_reestablish();
            self.executor.emit(CentralEvent::Reestablishing);
            let started = self.executor.start_session().await;

            match self.executor.session.did_start_session(started.is_ok()) {
                StartDisposition::Replay => {
                    if let Ok(access) = started {
                        self.executor.emit(CentralEvent::SessionStarted(access));
                    }
                    // Head stays in place and is dispatched on the next turn
                    self.queue.advance(false);
                    return;
                }
                StartDisposition::FailBlocked => {
                    let err = match started {
                        Err(e) => CentralError::SessionStartFailed(e.to_string()),
                        Ok(_) => CentralError::NoSession,
                    };
                    let success = request.command.fail(err);
                    self.executor.completed(request.id, kind, success);
                    self.queue.advance(true);
                    return;
                }
                StartDisposition::Report => {
                    tracing::error!(sbh = true, "Unexpected start disposition while re-establishing");
                }
            }
        }

        tracing::debug!("Dispatching {:?} (#{})", kind, request.id);
        let success = self.executor.execute(&request.command).await;
        self.executor.completed(request.id, kind, success);
        self.queue.advance(true);
    }
}

struct Executor<T: RemoteFileTransport> {
    config: CentralConfig,
    transport: Arc<T>,
    local: LocalStore,
    session: SessionController,
    access: watch::Sender<DeviceAccessControl>,
    events: Sender<CentralEvent>,
    resigning: Arc<AtomicBool>,
}

impl<T: RemoteFileTransport> Executor<T> {
    fn emit(&self, event: CentralEvent) {
        if self.events.try_send(event).is_err() {
            tracing::debug!("Event dropped, no room in event channel");
        }
    }

    fn completed(&self, id: u64, kind: CommandKind, success: bool) {
        self.emit(CentralEvent::CommandCompleted { id, kind, success });
    }

    fn publish_access(&self, access: DeviceAccessControl) {
        self.access.send_replace(access.clone());
        self.emit(CentralEvent::AccessChanged(access));
    }

    fn access_snapshot(&self) -> DeviceAccessControl {
        self.access.borrow().clone()
    }

    fn access_descriptor(&self) -> Result<&AccessDescriptor, CentralError> {
        self.config.access.as_ref().ok_or(CentralError::NotConfigured)
    }

    fn root(&self) -> String {
        self.config
            .access
            .as_ref()
            .map(|access| access.root_path().to_string())
            .unwrap_or_default()
    }

    /// Note dropped sessions on the way out of a transport call
    fn observe<R>(&mut self, result: Result<R, CentralError>) -> Result<R, CentralError> {
        if let Err(CentralError::Transport(e)) = &result {
            if e.is_session_lost() {
                self.session.lost();
                self.emit(CentralEvent::SessionEnded);
            }
        }
        result
    }

    /// Run one command and send its reply. Returns whether it succeeded.
    async fn execute(&mut self, command: &Command) -> bool {
        let kind = command.kind();
        if kind.mutates_remote() {
            if let Err(denied) = self.access_snapshot().check_lock_owner() {
                tracing::warn!("{:?} refused: {}", kind, denied);
                return command.fail(denied.into());
            }
        }

        let transport = self.transport.clone();
        match command {
            Command::DiscoverDevices { reply } => {
                let result = self.discover_devices().await;
                respond(reply, result)
            }
            Command::Connect {
                device,
                user_name,
                password,
                reply,
            } => {
                let result = transport
                    .connect(device, user_name, password)
                    .await
                    .map_err(CentralError::from);
                respond(reply, result)
            }
            Command::ListShares { reply } => {
                let result = transport.list_shares().await.map_err(CentralError::from);
                respond(reply, result)
            }
            Command::OpenShare { share, reply } => {
                let result = transport.open_share(share).await.map_err(CentralError::from);
                respond(reply, result)
            }
            Command::CloseShare { share, reply } => {
                let result = transport.close_share(share).await.map_err(CentralError::from);
                respond(reply, result)
            }
            Command::ListDirectory { path, reply } => {
                let result = transport.list_directory(path).await.map_err(CentralError::from);
                respond(reply, result)
            }
            Command::CreateDirectory { path, reply } => {
                let result = transport
                    .create_directory(path)
                    .await
                    .map_err(CentralError::from);
                respond(reply, result)
            }
            Command::Disconnect { reply } => {
                let result = transport.disconnect().await.map_err(CentralError::from);
                self.session.lost();
                respond(reply, result)
            }
            Command::StartSession { reply } => {
                let result = self.start_session().await;
                self.session.did_start_session(result.is_ok());
                if let Ok(access) = &result {
                    self.emit(CentralEvent::SessionStarted(access.clone()));
                }
                respond(reply, result)
            }
            Command::EndSession { reply } => {
                let result = self.end_session(false).await;
                respond(reply, result)
            }
            Command::AcquireLock { reply } => {
                let result = self.acquire_lock().await;
                let result = self.observe(result);
                respond(reply, result)
            }
            Command::ReleaseLock { reply } => {
                let result = self.end_session(true).await;
                respond(reply, result)
            }
            Command::CompareLastUpdated { reply } => {
                let root = self.root();
                let result = reconcile::compare(transport.as_ref(), &root, &self.local)
                    .await
                    .map_err(CentralError::from);
                let result = self.observe(result);
                respond(reply, result)
            }
            Command::VerifyRemoteDatabase { reply } => {
                let root = self.root();
                let result = reconcile::verify_remote_database(transport.as_ref(), &root).await;
                let result = self.observe(result);
                respond(reply, result)
            }
            Command::CopyDatabaseToRemote { reply } => {
                let result = self.bulk(kind).await;
                respond(reply, result)
            }
            Command::CopyDatabaseFromRemote { reply } => {
                let result = self.bulk(kind).await;
                respond(reply, result)
            }
            Command::FetchImageNames { reply } => {
                let root = self.root();
                let result = BulkTransferEngine::new(transport.as_ref(), &self.local, &root)
                    .remote_image_names()
                    .await
                    .map_err(CentralError::from);
                let result = self.observe(result);
                respond(reply, result)
            }
            Command::CopyAllImagesToRemote { reply } => {
                let result = self.bulk(kind).await;
                respond(reply, result)
            }
            Command::CopyAllImagesFromRemote { reply } => {
                let result = self.bulk(kind).await;
                respond(reply, result)
            }
            Command::ReadImage { name, reply } => {
                let path = remote_path(&remote_path(&self.root(), IMAGES_DIR), name);
                let result = transport.read_file(&path).await.map_err(CentralError::from);
                let result = self.observe(result);
                respond(reply, result)
            }
            Command::WriteImage { name, bytes, reply } => {
                let path = remote_path(&remote_path(&self.root(), IMAGES_DIR), name);
                let result = transport
                    .write_file(&path, bytes)
                    .await
                    .map_err(CentralError::from);
                let result = self.observe(result);
                respond(reply, result)
            }
            Command::DeleteImage { name, reply } => {
                let path = remote_path(&remote_path(&self.root(), IMAGES_DIR), name);
                let result = match transport.delete_file(&path).await {
                    Err(e) if e.is_not_found() => Ok(()),
                    other => other.map_err(CentralError::from),
                };
                let result = self.observe(result);
                respond(reply, result)
            }
        }
    }

    async fn discover_devices(&self) -> Result<Vec<DeviceRef>, CentralError> {
        let (found_tx, found_rx) = async_channel::unbounded();
        let window = self.config.discovery_window;

        match tokio::time::timeout(window, self.transport.discover(found_tx)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!("Device discovery failed: {}", e);
                return Err(e.into());
            }
            Err(_) => tracing::debug!("Discovery window of {:?} elapsed", window),
        }

        let mut devices: Vec<DeviceRef> = Vec::new();
        while let Ok(device) = found_rx.try_recv() {
            if !devices.contains(&device) {
                devices.push(device);
            }
        }
        tracing::info!("Discovered {} devices", devices.len());
        Ok(devices)
    }

    /// Connect, open the share, then run lock acquisition
    async fn start_session(&mut self) -> Result<DeviceAccessControl, CentralError> {
        let access = self.access_descriptor()?.clone();
        let device = DeviceRef::from(&access);
        let share = ShareRef::new(&access.share);

        if let Err(e) = self
            .transport
            .connect(&device, &access.user_name, &access.password)
            .await
        {
            tracing::error!("Failed to connect to {}: {}", access.host, e);
            self.publish_access(DeviceAccessControl::unreachable());
            return Err(e.into());
        }

        if let Err(e) = self.transport.open_share(&share).await {
            tracing::error!("Failed to open share {}: {}", share.name, e);
            if let Err(e) = self.transport.disconnect().await {
                tracing::warn!("Disconnect after failed open: {}", e);
            }
            self.publish_access(DeviceAccessControl::unreachable());
            return Err(e.into());
        }

        tracing::info!("Session started on {}/{}", access.host, share.name);
        self.acquire_lock().await
    }

    async fn acquire_lock(&mut self) -> Result<DeviceAccessControl, CentralError> {
        self.publish_access(DeviceAccessControl::reset());
        let root = self.root();
        let acquired = lock::acquire(self.transport.as_ref(), &root, &self.config.identity).await?;
        self.publish_access(acquired.clone());
        Ok(acquired)
    }

    /// Release the lock (required when `must_own`, otherwise only if held),
    /// close the share and disconnect. Applies the keep-alive policy.
    async fn end_session(&mut self, must_own: bool) -> Result<(), CentralError> {
        let access = self.access_snapshot();
        if must_own {
            access.check_lock_owner()?;
        }

        self.session.begin_end();
        let root = self.root();
        if access.by_me() {
            // Ending proceeds whatever the unlock result
            if let Err(e) = lock::release(self.transport.as_ref(), &root).await {
                tracing::error!("Failed to delete lock file: {}", e);
            }
        }

        if let Ok(descriptor) = self.access_descriptor() {
            let share = ShareRef::new(&descriptor.share);
            if let Err(e) = self.transport.close_share(&share).await {
                tracing::warn!("Failed to close share {}: {}", share.name, e);
            }
        }
        if let Err(e) = self.transport.disconnect().await {
            tracing::warn!("Failed to disconnect: {}", e);
        }
        self.publish_access(DeviceAccessControl::reset());
        self.emit(CentralEvent::SessionEnded);
        tracing::info!("Session ended");

        let resigning = self.resigning.load(Ordering::SeqCst);
        if self.session.did_end_session(self.config.keep_alive, resigning) == EndDisposition::Restart {
            tracing::info!("Keep-alive: restarting session");
            let restarted = self.start_session().await;
            self.session.did_start_session(restarted.is_ok());
            match restarted {
                Ok(access) => self.emit(CentralEvent::SessionStarted(access)),
                Err(e) => tracing::warn!("Keep-alive restart failed: {}", e),
            }
        }
        Ok(())
    }

    /// Bulk transfers run with `updating` set when this device owns the lock
    async fn bulk(&mut self, kind: CommandKind) -> Result<TransferReport, CentralError> {
        let mut access = self.access_snapshot();
        let owned = access.set_updating(true).is_ok();
        if owned {
            self.publish_access(access.clone());
        }

        let root = self.root();
        let transport = self.transport.clone();
        let engine = BulkTransferEngine::new(transport.as_ref(), &self.local, &root);
        let result = match kind {
            CommandKind::CopyDatabaseToRemote => engine.database_to_remote().await,
            CommandKind::CopyDatabaseFromRemote => engine.database_from_remote().await,
            CommandKind::CopyAllImagesToRemote => engine.images_to_remote().await,
            CommandKind::CopyAllImagesFromRemote => engine.images_from_remote().await,
            other => {
                tracing::error!(sbh = true, "{:?} is not a bulk transfer", other);
                Err(CentralError::NoSession)
            }
        };

        if owned {
            let mut access = self.access_snapshot();
            if access.set_updating(false).is_ok() {
                self.publish_access(access);
            }
        }
        self.observe(result)
    }
}
