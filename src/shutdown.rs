use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

/// What ended the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Deadline,
    Interrupt,
}

/// Triggering side of the run's cancellation signal.
///
/// Only the coordinator and the tasks it arms (deadline, interrupt listener) hold
/// one of these. Everything else gets a [`ShutdownSignal`], which can only observe.
#[derive(Clone)]
pub struct Shutdown {
    token: CancellationToken,
    reason: Arc<OnceLock<ShutdownReason>>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            reason: Arc::new(OnceLock::new()),
        }
    }

    /// Fires the signal. Returns true only for the call that actually fired it;
    /// later calls are no-ops and leave the recorded reason untouched.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let first = self.reason.set(reason).is_ok();
        self.token.cancel();
        first
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.get().copied()
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            token: self.token.clone(),
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of the cancellation signal.
#[derive(Clone)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the signal has fired.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn starts_active() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.signal().is_cancelled());
        assert_eq!(shutdown.reason(), None);
    }

    #[test]
    fn trigger_is_one_way_and_keeps_first_reason() {
        let shutdown = Shutdown::new();
        let signal = shutdown.signal();

        assert!(shutdown.trigger(ShutdownReason::Deadline));
        assert!(!shutdown.trigger(ShutdownReason::Interrupt));

        assert!(signal.is_cancelled());
        assert_eq!(shutdown.reason(), Some(ShutdownReason::Deadline));
    }

    #[test]
    fn concurrent_triggers_fire_exactly_once() {
        let shutdown = Shutdown::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let shutdown = shutdown.clone();
                let fired = Arc::clone(&fired);
                thread::spawn(move || {
                    let reason = if i % 2 == 0 {
                        ShutdownReason::Deadline
                    } else {
                        ShutdownReason::Interrupt
                    };
                    for _ in 0..100 {
                        if shutdown.trigger(reason) {
                            fired.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(shutdown.signal().is_cancelled());
        assert!(shutdown.reason().is_some());
    }

    #[tokio::test]
    async fn every_reader_wakes_on_trigger() {
        let shutdown = Shutdown::new();

        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let signal = shutdown.signal();
                tokio::spawn(async move { signal.cancelled().await })
            })
            .collect();

        shutdown.trigger(ShutdownReason::Interrupt);

        for waiter in waiters {
            waiter.await.unwrap();
        }
    }
}
