// SPDX-License-Identifier: AGPL-3.0
// Pin Sync Core - Lock file convention and device access control
//
// The shared store carries a lock file naming the device that may write to
// it. Nothing enforces this on the remote side; every device honours it.

use crate::types::{lock_field, AccessDenied, DeviceIdentity};
use serde::{Deserialize, Serialize};

/// Owner name reported while the lock state is not known
pub const UNKNOWN_OWNER: &str = "Unknown";

/// Contents of the remote lock file: `ownerName,ownerUuid`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockFileContents {
    pub owner_name: String,
    pub owner_uuid: String,
}

/// Result of parsing raw lock file bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLockFile {
    Owner(LockFileContents),
    Empty,
    Malformed(String),
}

impl LockFileContents {
    pub fn for_device(identity: &DeviceIdentity) -> Self {
        Self {
            owner_name: lock_field(&identity.name),
            owner_uuid: lock_field(&identity.uuid),
        }
    }

    /// Wire form written to the lock file
    pub fn render(&self) -> String {
        format!("{},{}", self.owner_name, self.owner_uuid)
    }

    pub fn parse(bytes: &[u8]) -> ParsedLockFile {
        let text = String::from_utf8_lossy(bytes);
        let text = text.trim();
        if text.is_empty() {
            return ParsedLockFile::Empty;
        }

        let fields: Vec<&str> = text.split(',').collect();
        match fields.as_slice() {
            [name, uuid] => ParsedLockFile::Owner(Self {
                owner_name: name.to_string(),
                owner_uuid: uuid.to_string(),
            }),
            _ => ParsedLockFile::Malformed(text.to_string()),
        }
    }

    pub fn is_owned_by(&self, identity: &DeviceIdentity) -> bool {
        self.owner_name == lock_field(&identity.name) && self.owner_uuid == lock_field(&identity.uuid)
    }
}

/// What to do after reading the lock file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockReadDecision {
    /// Nobody holds the lock: write ours
    Claim,
    /// Someone (possibly us) holds it
    Observed(DeviceAccessControl),
    /// Unreadable content: leave the state reset
    Malformed(String),
}

/// Decide how to proceed from a lock file read. `None` means the read failed.
pub fn decide_lock_read(read: Option<&[u8]>, me: &DeviceIdentity) -> LockReadDecision {
    let Some(bytes) = read else {
        return LockReadDecision::Claim;
    };

    match LockFileContents::parse(bytes) {
        ParsedLockFile::Owner(contents) => {
            LockReadDecision::Observed(DeviceAccessControl::from_lock_file(&contents, me))
        }
        // An empty file is what a failed earlier write leaves behind
        ParsedLockFile::Empty => LockReadDecision::Claim,
        ParsedLockFile::Malformed(text) => LockReadDecision::Malformed(text),
    }
}

/// Believed state of the remote lock, as seen from this device.
///
/// `updating` can only be set while the lock is held by this device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAccessControl {
    locked: bool,
    by_me: bool,
    owner_name: String,
    updating: bool,
}

impl Default for DeviceAccessControl {
    fn default() -> Self {
        Self::reset()
    }
}

impl DeviceAccessControl {
    /// Unknown state used at the start of every lock acquisition
    pub fn reset() -> Self {
        Self {
            locked: false,
            by_me: false,
            owner_name: UNKNOWN_OWNER.to_string(),
            updating: false,
        }
    }

    /// Full overwrite of every field
    pub fn init_with(owner_name: impl Into<String>, locked: bool, by_me: bool, updating: bool) -> Self {
        let by_me = by_me && locked;
        if updating && !by_me {
            tracing::warn!("Ignoring updating flag for a lock not held by this device");
        }
        Self {
            locked,
            by_me,
            owner_name: owner_name.into(),
            updating: updating && by_me,
        }
    }

    /// Conservative stance when the remote store cannot be reached
    pub fn unreachable() -> Self {
        Self::init_with(UNKNOWN_OWNER, true, false, false)
    }

    /// State after this device wrote the lock file
    pub fn held_by_me(identity: &DeviceIdentity) -> Self {
        Self::init_with(lock_field(&identity.name), true, true, false)
    }

    pub fn from_lock_file(contents: &LockFileContents, me: &DeviceIdentity) -> Self {
        Self::init_with(&contents.owner_name, true, contents.is_owned_by(me), false)
    }

    pub fn locked(&self) -> bool {
        self.locked
    }

    pub fn by_me(&self) -> bool {
        self.by_me
    }

    pub fn owner_name(&self) -> &str {
        &self.owner_name
    }

    pub fn updating(&self) -> bool {
        self.updating
    }

    /// Mark a sync in progress. Only the lock owner may do this.
    pub fn set_updating(&mut self, updating: bool) -> Result<(), AccessDenied> {
        if updating && !self.by_me {
            return Err(self.denial());
        }
        self.updating = updating;
        Ok(())
    }

    /// Gate used before starting a sync: refuse when another device holds
    /// the lock or a sync is already running.
    pub fn check_can_update(&self) -> Result<(), AccessDenied> {
        if self.locked && !self.by_me {
            return Err(AccessDenied::LockedBy {
                owner: self.owner_name.clone(),
            });
        }
        if self.updating {
            return Err(AccessDenied::Updating);
        }
        Ok(())
    }

    /// Gate used before any command that writes to the shared store
    pub fn check_lock_owner(&self) -> Result<(), AccessDenied> {
        if self.by_me {
            Ok(())
        } else {
            Err(self.denial())
        }
    }

    fn denial(&self) -> AccessDenied {
        if self.locked {
            AccessDenied::LockedBy {
                owner: self.owner_name.clone(),
            }
        } else {
            AccessDenied::NotLockOwner
        }
    }
}
