//! Manual control token.
//!
//! At most one workstation holds the right to drive the crane by hand. The
//! token is refreshed by heartbeats and released on request, by an
//! administrator, or by the inactivity sweep.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};
use yardcrane_core::{HolderId, OperatorId};

use crate::collaborators::Authorizer;
use crate::config::TokenConfig;

/// The exclusive right to issue manual commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlToken {
    /// Workstation holding the token.
    pub holder: HolderId,
    /// Operator logged in at that workstation.
    pub user: OperatorId,
    /// When the token was granted.
    pub granted_at: DateTime<Utc>,
    /// Last request or heartbeat from the holder.
    pub last_activity: DateTime<Utc>,
}

/// Outcome of a control request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ControlResult {
    /// The caller holds the token.
    Granted,
    /// Someone else holds the token.
    AlreadyTaken {
        /// Current holder.
        holder: HolderId,
        /// Operator at the current holder.
        user: OperatorId,
    },
    /// The caller may not take control.
    NotAllowed,
}

/// Single-holder mutual exclusion for manual control.
pub struct TokenManager {
    timeout: Duration,
    authorizer: Arc<dyn Authorizer>,
    token: Mutex<Option<ControlToken>>,
}

impl TokenManager {
    /// Create a token manager.
    #[must_use]
    pub fn new(config: &TokenConfig, authorizer: Arc<dyn Authorizer>) -> Self {
        Self {
            timeout: i64::try_from(config.timeout_seconds)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or(Duration::MAX),
            authorizer,
            token: Mutex::new(None),
        }
    }

    /// Request the control token for `holder`.
    pub fn request_control(&self, holder: &HolderId, user: &OperatorId) -> ControlResult {
        self.request_control_at(holder, user, Utc::now())
    }

    /// Request the control token at a given time.
    pub fn request_control_at(
        &self,
        holder: &HolderId,
        user: &OperatorId,
        now: DateTime<Utc>,
    ) -> ControlResult {
        if !self.authorizer.is_permitted(holder) {
            warn!(holder = %holder, "Control request from unauthorized holder");
            return ControlResult::NotAllowed;
        }

        let mut token = self.token.lock();
        match token.as_mut() {
            None => {
                *token = Some(ControlToken {
                    holder: holder.clone(),
                    user: user.clone(),
                    granted_at: now,
                    last_activity: now,
                });
                info!(holder = %holder, user = %user, "Control token granted");
                ControlResult::Granted
            }
            Some(current) if current.holder == *holder => {
                current.last_activity = now;
                ControlResult::Granted
            }
            Some(current) => ControlResult::AlreadyTaken {
                holder: current.holder.clone(),
                user: current.user.clone(),
            },
        }
    }

    /// Release the token. Only the holder can release it.
    pub fn release(&self, holder: &HolderId) -> bool {
        let mut token = self.token.lock();
        if token.as_ref().is_some_and(|t| t.holder == *holder) {
            *token = None;
            info!(holder = %holder, "Control token released");
            true
        } else {
            false
        }
    }

    /// Release the token whoever holds it.
    pub fn force_release(&self) -> Option<ControlToken> {
        let released = self.token.lock().take();
        if let Some(token) = &released {
            warn!(holder = %token.holder, user = %token.user, "Control token force-released");
        }
        released
    }

    /// Refresh the holder's activity timestamp.
    pub fn heartbeat(&self, holder: &HolderId) -> bool {
        self.heartbeat_at(holder, Utc::now())
    }

    /// Refresh the holder's activity timestamp at a given time.
    pub fn heartbeat_at(&self, holder: &HolderId, now: DateTime<Utc>) -> bool {
        match self.token.lock().as_mut() {
            Some(token) if token.holder == *holder => {
                token.last_activity = now;
                true
            }
            _ => false,
        }
    }

    /// Current token, if any.
    #[must_use]
    pub fn current(&self) -> Option<ControlToken> {
        self.token.lock().clone()
    }

    /// Returns true if `holder` holds the token.
    #[must_use]
    pub fn is_holder(&self, holder: &HolderId) -> bool {
        self.token.lock().as_ref().is_some_and(|t| t.holder == *holder)
    }

    /// Release the token if it has been inactive for longer than the timeout.
    pub fn sweep(&self) -> bool {
        self.sweep_at(Utc::now())
    }

    /// Run the inactivity sweep as of `now`.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> bool {
        let mut token = self.token.lock();
        let expired = token
            .as_ref()
            .is_some_and(|t| now - t.last_activity > self.timeout);
        if expired {
            if let Some(t) = token.take() {
                info!(holder = %t.holder, user = %t.user, "Control token timed out");
            }
        } else {
            debug!("Control token sweep: nothing to release");
        }
        expired
    }
}
