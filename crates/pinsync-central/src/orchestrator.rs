// SPDX-License-Identifier: AGPL-3.0
// Pin Sync Central - Sync orchestration
//
// One sync pass: start a session, compare lastUpdated markers, move the
// database and pictures in whichever direction is newer, end the session
// and record the pass in history.

use crate::central::Central;
use crate::types::{CentralError, TransferReport};
use pinsync_core::{
    plan_sync, AccessDenied, CompareOutcome, DeviceAccessControl, DeviceIdentity, SyncDirection,
    SyncHistory, SyncOutcome, SyncPlan, SyncRecord,
};
use std::sync::Arc;

/// Result of one sync pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub direction: SyncDirection,
    pub outcome: SyncOutcome,
    pub database: Option<TransferReport>,
    pub images: Option<TransferReport>,
    pub detail: Option<String>,
}

impl SyncReport {
    fn new(direction: SyncDirection, outcome: SyncOutcome) -> Self {
        Self {
            direction,
            outcome,
            database: None,
            images: None,
            detail: None,
        }
    }

    fn failed(direction: SyncDirection, err: &CentralError) -> Self {
        let mut report = Self::new(direction, SyncOutcome::Failed);
        report.detail = Some(err.to_string());
        report
    }

    fn denied(denied: &AccessDenied) -> Self {
        let mut report = Self::new(SyncDirection::None, SyncOutcome::Denied);
        report.detail = Some(denied.to_string());
        report
    }
}

pub struct PinSync {
    central: Arc<Central>,
    history: Arc<SyncHistory>,
    identity: DeviceIdentity,
}

impl PinSync {
    pub fn new(central: Arc<Central>, history: Arc<SyncHistory>, identity: DeviceIdentity) -> Self {
        Self {
            central,
            history,
            identity,
        }
    }

    pub fn central(&self) -> &Central {
        &self.central
    }

    pub fn history(&self) -> &SyncHistory {
        &self.history
    }

    /// Run one full sync pass. Failures end up in the report, never as a
    /// dangling session.
    pub async fn synchronize(&self) -> SyncReport {
        tracing::info!("Sync pass started on {}", self.identity);

        let report = match self.central.start_session().wait().await {
            Ok(access) => {
                let report = self.run(&access).await;
                if let Err(e) = self.central.end_session().wait().await {
                    tracing::warn!("Failed to end session after sync: {}", e);
                }
                report
            }
            Err(e) => {
                tracing::error!("Sync pass could not start a session: {}", e);
                SyncReport::failed(SyncDirection::None, &e)
            }
        };

        let record = SyncRecord::new(report.direction, report.outcome, report.detail.clone());
        if let Err(e) = self.history.add(record) {
            tracing::error!("Failed to record sync pass: {}", e);
        }
        tracing::info!(
            "Sync pass finished: {:?} ({:?})",
            report.outcome,
            report.direction
        );
        report
    }

    async fn run(&self, access: &DeviceAccessControl) -> SyncReport {
        if access.updating() {
            return SyncReport::denied(&AccessDenied::Updating);
        }

        let outcome = match self.central.compare_last_updated().wait().await {
            Ok(outcome) => outcome,
            Err(e) => return SyncReport::failed(SyncDirection::None, &e),
        };

        match plan_sync(&outcome, access) {
            SyncPlan::Push => self.push().await,
            SyncPlan::VerifyThenPull => self.verify_then_pull(&outcome, access).await,
            SyncPlan::Nothing => {
                if !outcome.remote_marker_present && outcome.local_marker_present && access.by_me() {
                    tracing::warn!("Remote lastUpdated missing, uploading full copy");
                    return self.push().await;
                }
                SyncReport::new(SyncDirection::None, SyncOutcome::AlreadyInSync)
            }
            SyncPlan::Blocked(denied) => {
                tracing::info!("Device has newer data but cannot upload: {}", denied);
                SyncReport::denied(&denied)
            }
        }
    }

    async fn verify_then_pull(&self, outcome: &CompareOutcome, access: &DeviceAccessControl) -> SyncReport {
        match self.central.verify_remote_database().wait().await {
            Ok(()) => self.pull().await,
            Err(CentralError::Incomplete { missing }) if access.by_me() => {
                let last_writer = outcome.remote_writer.as_deref() == Some(self.identity.name.as_str());
                tracing::warn!(
                    "Remote database missing {:?} (last written by this device: {}), uploading full copy",
                    missing,
                    last_writer
                );
                self.push().await
            }
            Err(e) => SyncReport::failed(SyncDirection::RemoteToDevice, &e),
        }
    }

    async fn push(&self) -> SyncReport {
        let direction = SyncDirection::DeviceToRemote;
        let database = match self.central.copy_database_to_remote().wait().await {
            Ok(report) => report,
            Err(e) => return SyncReport::failed(direction, &e),
        };
        let images = match self.central.copy_all_images_to_remote().wait().await {
            Ok(report) => report,
            Err(e) => {
                let mut report = SyncReport::failed(direction, &e);
                report.database = Some(database);
                return report;
            }
        };
        finished(direction, database, images)
    }

    async fn pull(&self) -> SyncReport {
        let direction = SyncDirection::RemoteToDevice;
        let database = match self.central.copy_database_from_remote().wait().await {
            Ok(report) => report,
            Err(e) => return SyncReport::failed(direction, &e),
        };
        let images = match self.central.copy_all_images_from_remote().wait().await {
            Ok(report) => report,
            Err(e) => {
                let mut report = SyncReport::failed(direction, &e);
                report.database = Some(database);
                return report;
            }
        };
        finished(direction, database, images)
    }

    /// Upload one picture after a local edit
    pub async fn upload_image(&self, name: &str, bytes: Vec<u8>) -> Result<(), CentralError> {
        self.central.check_can_update()?;
        self.central.write_image(name, bytes).wait().await
    }

    /// App is leaving the foreground: drop the session and the lock for good
    pub async fn enter_background(&self) -> Result<(), CentralError> {
        self.central.set_resigning(true);
        self.central.end_session().wait().await
    }

    pub async fn enter_foreground(&self) -> Result<DeviceAccessControl, CentralError> {
        self.central.set_resigning(false);
        self.central.start_session().wait().await
    }
}

fn finished(direction: SyncDirection, database: TransferReport, images: TransferReport) -> SyncReport {
    let mut report = SyncReport::new(direction, SyncOutcome::Completed);
    if !images.failed.is_empty() {
        report.detail = Some(format!("Pictures skipped: {}", images.failed.join(", ")));
    }
    report.database = Some(database);
    report.images = Some(images);
    report
}
