// SPDX-License-Identifier: AGPL-3.0
// Pin Sync Central - Session state machine
//
//   NoSession --start ok--> Active --end--> Ending --done--> NoSession
//   NoSession --session command--> Reestablishing --ok--> Active
//                                                --fail--> NoSession
//   any --transport reports session lost--> NoSession

use crate::queue::CommandKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NoSession,
    /// Restarting a session for a blocked request at the head of the queue
    Reestablishing,
    Active,
    Ending,
}

/// What the dispatcher does once a session start completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartDisposition {
    /// Dispatch the same head-of-queue request again
    Replay,
    /// Fail the blocked head-of-queue request
    FailBlocked,
    /// Report the result to the explicit StartSession caller
    Report,
}

/// What happens after a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndDisposition {
    /// Keep-alive: start a fresh session straight away
    Restart,
    Idle,
}

#[derive(Debug)]
pub struct SessionController {
    state: SessionState,
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionController {
    pub fn new() -> Self {
        Self {
            state: SessionState::NoSession,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Whether `kind` must wait for a session to be restored first
    pub fn needs_reestablish(&self, kind: CommandKind) -> bool {
        kind.requires_session() && !self.is_active()
    }

    pub fn begin_reestablish(&mut self) {
        tracing::info!("No session for a session command, re-establishing");
        self.state = SessionState::Reestablishing;
    }

    pub fn did_start_session(&mut self, success: bool) -> StartDisposition {
        let reestablishing = self.state == SessionState::Reestablishing;
        self.state = if success {
            SessionState::Active
        } else {
            SessionState::NoSession
        };

        match (reestablishing, success) {
            (true, true) => {
                tracing::info!("Session re-established, replaying request");
                StartDisposition::Replay
            }
            (true, false) => StartDisposition::FailBlocked,
            (false, _) => StartDisposition::Report,
        }
    }

    pub fn begin_end(&mut self) {
        self.state = SessionState::Ending;
    }

    /// `resigning` is set by the orchestrator when the app goes to the
    /// background; `keep_alive` comes from configuration.
    pub fn did_end_session(&mut self, keep_alive: bool, resigning: bool) -> EndDisposition {
        self.state = SessionState::NoSession;
        if keep_alive && !resigning {
            EndDisposition::Restart
        } else {
            EndDisposition::Idle
        }
    }

    /// The transport reported that the session dropped
    pub fn lost(&mut self) {
        if self.state != SessionState::NoSession {
            tracing::warn!("Session dropped by transport");
        }
        self.state = SessionState::NoSession;
    }
}
