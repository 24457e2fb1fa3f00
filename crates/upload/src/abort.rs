//! Cancellation bookkeeping for the chunk requests of one session.
//!
//! Every in-flight request holds its own [`CancellationToken`]. Aborting
//! through the registry tags each token with an [`AbortReason`], so the
//! worker whose request came back aborted can tell a pause (requeue the
//! chunk) from a cancel (stop quietly) from an abort nobody asked for
//! (fail the file).

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

/// Why the registry aborted a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Upload paused; the chunk goes back into the queue.
    Pause,
    /// File removed by the user; nothing is reported.
    UserCancel,
    /// Another chunk of the same file failed.
    SessionFailed,
}

impl AbortReason {
    fn is_terminal(self) -> bool {
        !matches!(self, AbortReason::Pause)
    }
}

/// Handle to one registered in-flight request.
#[derive(Debug)]
pub struct InFlight {
    id: u64,
    token: CancellationToken,
}

impl InFlight {
    /// Token to hand to the transport.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

struct Entry {
    token: CancellationToken,
    reason: Option<AbortReason>,
}

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    in_flight: HashMap<u64, Entry>,
    /// Set while aborted; requests registered meanwhile start cancelled.
    halted: Option<AbortReason>,
}

/// Set of in-flight cancellation tokens owned by one upload session.
#[derive(Default)]
pub struct AbortRegistry {
    inner: Mutex<RegistryInner>,
}

impl AbortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a request about to be sent.
    ///
    /// If the registry is halted the returned token is already cancelled
    /// and tagged with the halt reason.
    pub fn register(&self) -> InFlight {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let id = inner.next_id;
        inner.next_id += 1;

        let token = CancellationToken::new();
        let reason = inner.halted;
        if reason.is_some() {
            token.cancel();
        }
        inner.in_flight.insert(
            id,
            Entry {
                token: token.clone(),
                reason,
            },
        );
        InFlight { id, token }
    }

    /// Unregisters a finished request and returns why it was aborted,
    /// if the registry aborted it.
    pub fn release(&self, ticket: InFlight) -> Option<AbortReason> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .in_flight
            .remove(&ticket.id)
            .and_then(|entry| entry.reason)
    }

    /// Aborts every in-flight request and halts new ones.
    ///
    /// A terminal reason (cancel, failure) overrides an earlier pause and
    /// is never downgraded back to a pause. Returns the number of requests
    /// that were in flight.
    pub fn abort_all(&self, reason: AbortReason) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let reason = match inner.halted {
            Some(current) if current.is_terminal() => current,
            _ => reason,
        };
        inner.halted = Some(reason);

        for entry in inner.in_flight.values_mut() {
            if entry.reason.is_none_or(|r| !r.is_terminal()) {
                entry.reason = Some(reason);
            }
            entry.token.cancel();
        }
        inner.in_flight.len()
    }

    /// Lifts a pause. Terminal halts stay in place.
    pub fn resume(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.halted == Some(AbortReason::Pause) {
            inner.halted = None;
        }
    }

    /// Current halt reason, if any.
    pub fn halted(&self) -> Option<AbortReason> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .halted
    }

    /// Number of registered requests.
    pub fn in_flight(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .in_flight
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untouched_request_has_no_reason() {
        let registry = AbortRegistry::new();
        let ticket = registry.register();
        assert!(!ticket.token().is_cancelled());
        assert_eq!(registry.in_flight(), 1);
        assert_eq!(registry.release(ticket), None);
        assert_eq!(registry.in_flight(), 0);
    }

    #[test]
    fn pause_aborts_in_flight_with_reason() {
        let registry = AbortRegistry::new();
        let a = registry.register();
        let b = registry.register();

        assert_eq!(registry.abort_all(AbortReason::Pause), 2);
        assert!(a.token().is_cancelled());
        assert!(b.token().is_cancelled());
        assert_eq!(registry.release(a), Some(AbortReason::Pause));
        assert_eq!(registry.release(b), Some(AbortReason::Pause));
    }

    #[test]
    fn register_while_paused_starts_cancelled() {
        let registry = AbortRegistry::new();
        registry.abort_all(AbortReason::Pause);

        let ticket = registry.register();
        assert!(ticket.token().is_cancelled());
        assert_eq!(registry.release(ticket), Some(AbortReason::Pause));

        registry.resume();
        let ticket = registry.register();
        assert!(!ticket.token().is_cancelled());
        assert_eq!(registry.release(ticket), None);
    }

    #[test]
    fn cancel_overrides_pause() {
        let registry = AbortRegistry::new();
        let ticket = registry.register();
        registry.abort_all(AbortReason::Pause);
        registry.abort_all(AbortReason::UserCancel);

        assert_eq!(registry.release(ticket), Some(AbortReason::UserCancel));
        assert_eq!(registry.halted(), Some(AbortReason::UserCancel));
    }

    #[test]
    fn pause_does_not_downgrade_cancel() {
        let registry = AbortRegistry::new();
        let ticket = registry.register();
        registry.abort_all(AbortReason::UserCancel);
        registry.abort_all(AbortReason::Pause);
        registry.resume();

        assert_eq!(registry.release(ticket), Some(AbortReason::UserCancel));
        assert_eq!(registry.halted(), Some(AbortReason::UserCancel));
        assert!(registry.register().token().is_cancelled());
    }
}
