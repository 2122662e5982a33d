//! Relay lifecycle state and the shared handle that guards finalization

use futures::task::AtomicWaker;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Why a relay ended in the `Errored` state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayFailure {
    /// Source error, provider error chunk, or rejected completion
    Stream(String),
    /// The consumer stopped reading; no error item is emitted for this
    Cancelled,
}

/// `Idle → Streaming → {Closed | Errored}`. `Closed` and `Errored` are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    Streaming,
    Closed,
    Errored(RelayFailure),
}

impl RelayState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RelayState::Closed | RelayState::Errored(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RelayState::Errored(RelayFailure::Cancelled))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelayState::Idle => "idle",
            RelayState::Streaming => "streaming",
            RelayState::Closed => "closed",
            RelayState::Errored(RelayFailure::Cancelled) => "cancelled",
            RelayState::Errored(RelayFailure::Stream(_)) => "errored",
        }
    }
}

pub(crate) struct Shared {
    state: watch::Sender<RelayState>,
    waker: AtomicWaker,
    upstream: Option<CancellationToken>,
}

impl Shared {
    pub(crate) fn new(upstream: Option<CancellationToken>) -> Arc<Self> {
        let (state, _) = watch::channel(RelayState::Idle);
        Arc::new(Self {
            state,
            waker: AtomicWaker::new(),
            upstream,
        })
    }

    pub(crate) fn state(&self) -> RelayState {
        self.state.borrow().clone()
    }

    pub(crate) fn is_terminal(&self) -> bool {
        self.state.borrow().is_terminal()
    }

    pub(crate) fn register(&self, waker: &std::task::Waker) {
        self.waker.register(waker);
    }

    /// `Idle → Streaming`; no-op in any other state.
    pub(crate) fn start(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == RelayState::Idle {
                *state = RelayState::Streaming;
                true
            } else {
                false
            }
        })
    }

    /// Move to a terminal state. Returns `false` (and changes nothing) when
    /// the relay was already finalized.
    pub(crate) fn finalize(&self, terminal: RelayState) -> bool {
        debug_assert!(terminal.is_terminal());
        self.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = terminal;
                true
            }
        })
    }

    /// Tell the provider to stop producing.
    pub(crate) fn release_upstream(&self) {
        if let Some(token) = &self.upstream {
            token.cancel();
        }
    }

    /// Consumer-initiated termination.
    pub(crate) fn cancel(&self) -> bool {
        if !self.finalize(RelayState::Errored(RelayFailure::Cancelled)) {
            return false;
        }
        debug!("Relay cancelled by consumer");
        self.release_upstream();
        self.waker.wake();
        true
    }
}

/// Cloneable view of a relay's lifecycle, usable from any task.
#[derive(Clone)]
pub struct RelayHandle {
    pub(crate) shared: Arc<Shared>,
}

impl RelayHandle {
    pub fn state(&self) -> RelayState {
        self.shared.state()
    }

    pub fn is_finalized(&self) -> bool {
        self.shared.is_terminal()
    }

    /// Wait until the relay reaches `Closed` or `Errored`.
    pub async fn wait_terminal(&self) -> RelayState {
        let mut rx = self.shared.state.subscribe();
        let state = match rx.wait_for(|s| s.is_terminal()).await {
            Ok(state) => state.clone(),
            // The sender lives in `shared`, which we hold; this cannot close
            Err(_) => self.shared.state(),
        };
        state
    }

    /// Stop the relay from the consumer side: no further items are yielded
    /// and the provider stream is released. Returns `false` if the relay had
    /// already finished.
    pub fn cancel(&self) -> bool {
        self.shared.cancel()
    }

    /// Close the output stream. Once the relay is `Closed` or `Errored` this
    /// is a no-op; before that it behaves like [`cancel`](Self::cancel).
    pub fn close(&self) -> bool {
        self.shared.cancel()
    }
}

impl std::fmt::Debug for RelayHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayHandle")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_only_from_idle() {
        let shared = Shared::new(None);
        assert!(shared.start());
        assert_eq!(shared.state(), RelayState::Streaming);
        assert!(!shared.start());
    }

    #[test]
    fn test_finalize_is_exactly_once() {
        let shared = Shared::new(None);
        shared.start();
        assert!(shared.finalize(RelayState::Closed));
        assert!(!shared.finalize(RelayState::Errored(RelayFailure::Stream("late".into()))));
        assert!(!shared.cancel());
        assert_eq!(shared.state(), RelayState::Closed);
        // No way back out of a terminal state
        assert!(!shared.start());
    }

    #[test]
    fn test_cancel_fires_upstream_token() {
        let token = CancellationToken::new();
        let handle = RelayHandle {
            shared: Shared::new(Some(token.clone())),
        };
        assert!(handle.cancel());
        assert!(token.is_cancelled());
        assert!(handle.state().is_cancelled());
        assert_eq!(handle.state().as_str(), "cancelled");
        // Second close is a no-op
        assert!(!handle.close());
    }

    #[tokio::test]
    async fn test_wait_terminal() {
        let handle = RelayHandle {
            shared: Shared::new(None),
        };
        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.wait_terminal().await })
        };
        handle.shared.start();
        handle.shared.finalize(RelayState::Closed);
        assert_eq!(waiter.await.unwrap(), RelayState::Closed);

        // Already terminal: resolves immediately
        assert_eq!(handle.wait_terminal().await, RelayState::Closed);
    }
}
