//! Bookkeeping for every in-flight invocation.
//!
//! The registry owns a single map guarded by one mutex. Every mutation and the
//! `list` snapshot take that lock, and nothing awaits while holding it: the
//! termination protocol runs in the invocation's own task and `cancel` only
//! waits for it after the lock has been released.

use crate::lifecycle::Lifecycle;
use crate::request::InvocationRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, VecDeque},
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Slack on top of the grace period before `cancel` stops waiting.
const CANCEL_WAIT_OVERHEAD: Duration = Duration::from_secs(2);

/// How many cancelled ids are remembered so a repeated cancel still succeeds.
pub const CANCELLED_HISTORY: usize = 1024;

/// Registry entry for one in-flight invocation.
#[derive(Debug)]
struct ManagedInvocation {
    id: String,
    cwd: PathBuf,
    model: Option<String>,
    started_at: DateTime<Utc>,
    session_id: Option<String>,
    cancelled: bool,
    lifecycle: Lifecycle,
    cancel_token: CancellationToken,
}

impl ManagedInvocation {
    fn info(&self) -> InvocationInfo {
        let state = self.lifecycle.current();
        InvocationInfo {
            process_id: self.id.clone(),
            cwd: self.cwd.clone(),
            model: self.model.clone(),
            started_at: self.started_at,
            session_id: self.session_id.clone(),
            state: state.label().to_string(),
            pid: state.pid(),
        }
    }
}

/// Point-in-time view of a registry entry, as returned by `lookup` and `list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationInfo {
    pub process_id: String,
    pub cwd: PathBuf,
    pub model: Option<String>,
    pub started_at: DateTime<Utc>,
    pub session_id: Option<String>,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

/// What the starter of an invocation needs to drive it.
#[derive(Debug, Clone)]
pub struct Registration {
    pub id: String,
    pub lifecycle: Lifecycle,
    pub cancel_token: CancellationToken,
}

#[derive(Debug, Default)]
struct Entries {
    live: HashMap<String, ManagedInvocation>,
    /// Most recent cancellations, oldest first.
    cancelled: VecDeque<String>,
}

impl Entries {
    fn remember_cancelled(&mut self, id: &str) {
        if self.cancelled.iter().any(|c| c == id) {
            return;
        }
        if self.cancelled.len() >= CANCELLED_HISTORY {
            self.cancelled.pop_front();
        }
        self.cancelled.push_back(id.to_string());
    }
}

/// Shared, cloneable handle to the invocation map.
#[derive(Debug, Clone)]
pub struct ProcessRegistry {
    entries: Arc<Mutex<Entries>>,
    grace_period: Duration,
}

impl ProcessRegistry {
    /// `grace_period` bounds how long `cancel` waits for termination.
    pub fn new(grace_period: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(Entries::default())),
            grace_period,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        // A panic elsewhere must not wedge every later request.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an entry for `request` before any process exists.
    pub fn register(&self, request: &InvocationRequest) -> Registration {
        let registration = Registration {
            id: Uuid::new_v4().to_string(),
            lifecycle: Lifecycle::new(),
            cancel_token: CancellationToken::new(),
        };

        let entry = ManagedInvocation {
            id: registration.id.clone(),
            cwd: request.cwd.clone(),
            model: request.model.clone(),
            started_at: Utc::now(),
            session_id: request.session_id.clone(),
            cancelled: false,
            lifecycle: registration.lifecycle.clone(),
            cancel_token: registration.cancel_token.clone(),
        };

        let total = {
            let mut entries = self.lock();
            entries.live.insert(registration.id.clone(), entry);
            entries.live.len()
        };
        info!(process_id = %registration.id, total_active = total, "Invocation registered");
        registration
    }

    pub fn lookup(&self, id: &str) -> Option<InvocationInfo> {
        self.lock().live.get(id).map(ManagedInvocation::info)
    }

    /// Record the session id the agent reported. Returns false for unknown ids.
    pub fn update_session_id(&self, id: &str, session_id: &str) -> bool {
        let mut entries = self.lock();
        match entries.live.get_mut(id) {
            Some(entry) => {
                entry.session_id = Some(session_id.to_string());
                debug!(process_id = %id, session_id = %session_id, "Session id updated");
                true
            }
            None => false,
        }
    }

    /// Remove an entry. Removing an id that is already gone is a no-op.
    pub fn remove(&self, id: &str) -> bool {
        let (removed, remaining) = {
            let mut entries = self.lock();
            let removed = entries.live.remove(id).is_some();
            (removed, entries.live.len())
        };
        if removed {
            info!(process_id = %id, remaining, "Invocation cleaned up");
        }
        removed
    }

    /// Cancel an invocation and wait (bounded) for its process to be reaped.
    ///
    /// Returns false if `id` is unknown or already finished on its own. A second
    /// cancel of the same id returns true without signalling again.
    pub async fn cancel(&self, id: &str) -> bool {
        let (lifecycle, token) = {
            let mut entries = self.lock();
            let Some(entry) = entries.live.get_mut(id) else {
                let known = entries.cancelled.iter().any(|c| c == id);
                if known {
                    debug!(process_id = %id, "Invocation already cancelled");
                } else {
                    warn!(process_id = %id, "Invocation not found");
                }
                return known;
            };
            if entry.cancelled {
                debug!(process_id = %id, "Invocation already cancelled");
                return true;
            }
            entry.cancelled = true;
            let handles = (entry.lifecycle.clone(), entry.cancel_token.clone());
            entries.remember_cancelled(id);
            handles
        };

        info!(process_id = %id, "Cancelling invocation");
        token.cancel();

        let limit = self.grace_period + CANCEL_WAIT_OVERHEAD;
        if tokio::time::timeout(limit, lifecycle.wait_terminated())
            .await
            .is_err()
        {
            warn!(
                process_id = %id,
                waited_ms = limit.as_millis() as u64,
                "Invocation did not confirm termination in time"
            );
        }

        self.remove(id);
        true
    }

    /// Cancel everything that is currently registered. Used on shutdown.
    pub async fn cancel_all(&self) -> usize {
        let ids: Vec<String> = self.lock().live.keys().cloned().collect();
        let count = ids.len();
        futures::future::join_all(ids.iter().map(|id| self.cancel(id))).await;
        count
    }

    /// Consistent snapshot of all live entries.
    pub fn list(&self) -> Vec<InvocationInfo> {
        let mut infos: Vec<InvocationInfo> = self
            .lock()
            .live
            .values()
            .map(ManagedInvocation::info)
            .collect();
        infos.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        infos
    }

    pub fn len(&self) -> usize {
        self.lock().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
