// SPDX-License-Identifier: AGPL-3.0
// Pin Sync Core - lastUpdated marker and timestamp reconciliation
//
// Marker format: `yyyy-MM-dd HH:mm:ss`, optionally followed by `,deviceName`.

use crate::access::DeviceAccessControl;
use chrono::{Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// chrono rendering of `yyyy-MM-dd HH:mm:ss`
pub const MARKER_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Contents of a `lastUpdated` marker file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastUpdatedMarker {
    pub timestamp: NaiveDateTime,
    pub device_name: Option<String>,
}

impl LastUpdatedMarker {
    /// Marker for a write made now by `device_name`
    pub fn now(device_name: &str) -> Self {
        let now = Local::now().naive_local();
        // The file format has whole-second precision
        let timestamp = now.with_nanosecond(0).unwrap_or(now);

        Self {
            timestamp,
            device_name: Some(device_name.to_string()),
        }
    }

    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let text = String::from_utf8_lossy(bytes);
        let mut fields = text.trim().splitn(2, ',');
        let timestamp =
            NaiveDateTime::parse_from_str(fields.next()?.trim(), MARKER_DATE_FORMAT).ok()?;
        let device_name = fields
            .next()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        Some(Self {
            timestamp,
            device_name,
        })
    }

    pub fn render(&self) -> String {
        let stamp = self.timestamp.format(MARKER_DATE_FORMAT);
        match &self.device_name {
            Some(name) => format!("{},{}", stamp, name),
            None => stamp.to_string(),
        }
    }
}

/// Which side holds the newer data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkerComparison {
    DeviceIsNewer,
    Equal,
    RemoteIsNewer,
}

/// Result of comparing the local and remote markers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompareOutcome {
    pub comparison: MarkerComparison,
    /// Device that last wrote the remote marker, when it says so
    pub remote_writer: Option<String>,
    /// Whether the remote marker could be read at all
    pub remote_marker_present: bool,
    /// Whether this device has a parseable marker of its own
    pub local_marker_present: bool,
}

/// Compare the local marker with the remote one.
///
/// An unreadable remote marker reports `Equal` so nothing gets overwritten.
/// A marker that cannot be parsed on either side reports `RemoteIsNewer`:
/// a device that never synced has no usable local marker.
pub fn compare_markers(local: Option<&[u8]>, remote: Option<&[u8]>) -> CompareOutcome {
    let local_marker = local.and_then(LastUpdatedMarker::parse);
    let local_marker_present = local_marker.is_some();

    let Some(remote) = remote else {
        tracing::info!("Remote lastUpdated unreadable, treating stores as equal");
        return CompareOutcome {
            comparison: MarkerComparison::Equal,
            remote_writer: None,
            remote_marker_present: false,
            local_marker_present,
        };
    };

    let remote_marker = LastUpdatedMarker::parse(remote);
    let remote_writer = remote_marker.as_ref().and_then(|m| m.device_name.clone());

    let comparison = match (local_marker, remote_marker) {
        (Some(local), Some(remote)) => {
            if remote.timestamp < local.timestamp {
                MarkerComparison::DeviceIsNewer
            } else if local.timestamp < remote.timestamp {
                MarkerComparison::RemoteIsNewer
            } else {
                MarkerComparison::Equal
            }
        }
        _ => {
            tracing::warn!("lastUpdated marker unparseable, defaulting to remote is newer");
            MarkerComparison::RemoteIsNewer
        }
    };

    CompareOutcome {
        comparison,
        remote_writer,
        remote_marker_present: true,
        local_marker_present,
    }
}

/// What the orchestrator should do next after a comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncPlan {
    /// Copy device data to the remote store
    Push,
    /// Verify the remote files, then copy them to the device
    VerifyThenPull,
    /// Both sides agree; tear the session down
    Nothing,
    /// This device has newer data but may not write it
    Blocked(crate::types::AccessDenied),
}

/// Directional policy applied to a comparison
pub fn plan_sync(outcome: &CompareOutcome, access: &DeviceAccessControl) -> SyncPlan {
    match outcome.comparison {
        MarkerComparison::DeviceIsNewer => match access.check_lock_owner() {
            Ok(()) => SyncPlan::Push,
            Err(denied) => SyncPlan::Blocked(denied),
        },
        MarkerComparison::RemoteIsNewer => SyncPlan::VerifyThenPull,
        MarkerComparison::Equal => SyncPlan::Nothing,
    }
}
