//! Observable lifecycle of a single invocation.
//!
//! ```text
//! Starting ──► Running ──► Completing ──► Terminated
//!     │           │            │               ▲
//!     │           └──► Cancelling ◄────────────┤
//!     └────────────────────────────────────────┘ (launch failure)
//! ```
//!
//! State lives in a `tokio::sync::watch` channel so a canceller can wait for
//! `Terminated` without polling.

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    /// Registry entry exists, the OS process may not yet.
    Starting,
    /// Process alive, output being read.
    Running { pid: u32 },
    /// Output reached EOF, waiting for the exit status.
    Completing,
    /// Termination protocol in progress.
    Cancelling,
    /// Process reaped and resources released.
    Terminated,
}

impl InvocationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvocationState::Terminated)
    }

    pub fn label(&self) -> &'static str {
        match self {
            InvocationState::Starting => "starting",
            InvocationState::Running { .. } => "running",
            InvocationState::Completing => "completing",
            InvocationState::Cancelling => "cancelling",
            InvocationState::Terminated => "terminated",
        }
    }

    pub fn pid(&self) -> Option<u32> {
        match self {
            InvocationState::Running { pid } => Some(*pid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Lifecycle {
    sender: Arc<watch::Sender<InvocationState>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(InvocationState::Starting);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn current(&self) -> InvocationState {
        *self.sender.borrow()
    }

    /// Starting → Running
    pub fn mark_running(&self, pid: u32) -> Result<(), &'static str> {
        self.advance(
            |s| matches!(s, InvocationState::Starting),
            InvocationState::Running { pid },
            "Can only start running from Starting",
        )
    }

    /// Running → Completing
    pub fn mark_completing(&self) -> Result<(), &'static str> {
        self.advance(
            |s| matches!(s, InvocationState::Running { .. }),
            InvocationState::Completing,
            "Can only complete from Running",
        )
    }

    /// Any live state → Cancelling
    pub fn mark_cancelling(&self) -> Result<(), &'static str> {
        self.advance(
            |s| !s.is_terminal() && !matches!(s, InvocationState::Cancelling),
            InvocationState::Cancelling,
            "Already cancelling or terminated",
        )
    }

    /// Any state → Terminated. Returns false if it was already terminated.
    pub fn mark_terminated(&self) -> bool {
        self.advance(
            |s| !s.is_terminal(),
            InvocationState::Terminated,
            "Already terminated",
        )
        .is_ok()
    }

    /// Resolves once the invocation reaches `Terminated`.
    pub async fn wait_terminated(&self) {
        let mut rx = self.sender.subscribe();
        // Err only if the sender is gone, and we hold it.
        let _ = rx.wait_for(InvocationState::is_terminal).await;
    }

    fn advance(
        &self,
        allowed: impl Fn(&InvocationState) -> bool,
        next: InvocationState,
        err: &'static str,
    ) -> Result<(), &'static str> {
        let mut transitioned = false;
        self.sender.send_if_modified(|state| {
            if allowed(state) {
                *state = next;
                transitioned = true;
            }
            transitioned
        });
        if transitioned { Ok(()) } else { Err(err) }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn test_natural_completion_path() {
        let lc = Lifecycle::new();
        assert_eq!(lc.current(), InvocationState::Starting);

        lc.mark_running(42).unwrap();
        assert_eq!(lc.current().pid(), Some(42));

        lc.mark_completing().unwrap();
        assert!(lc.mark_terminated());
        assert!(lc.current().is_terminal());
    }

    #[test]
    fn test_cannot_complete_before_running() {
        let lc = Lifecycle::new();
        assert!(lc.mark_completing().is_err());
        assert_eq!(lc.current(), InvocationState::Starting);
    }

    #[test]
    fn test_cancelling_only_once() {
        let lc = Lifecycle::new();
        lc.mark_running(1).unwrap();
        assert!(lc.mark_cancelling().is_ok());
        assert!(lc.mark_cancelling().is_err());
        assert!(lc.mark_terminated());
        assert!(!lc.mark_terminated());
        assert!(lc.mark_cancelling().is_err());
    }

    #[test]
    fn test_completing_can_escalate_to_cancelling() {
        let lc = Lifecycle::new();
        lc.mark_running(1).unwrap();
        lc.mark_completing().unwrap();
        assert!(lc.mark_cancelling().is_ok());
    }

    #[tokio::test]
    async fn test_wait_terminated_wakes_on_transition() {
        let lc = Lifecycle::new();
        let lc_clone = lc.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            lc_clone.mark_running(7).unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            lc_clone.mark_terminated();
        });

        timeout(Duration::from_secs(1), lc.wait_terminated())
            .await
            .expect("should observe Terminated");
    }

    #[tokio::test]
    async fn test_wait_terminated_immediate() {
        let lc = Lifecycle::new();
        lc.mark_terminated();
        timeout(Duration::from_millis(100), lc.wait_terminated())
            .await
            .expect("already terminal");
    }
}
