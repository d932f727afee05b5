use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Default)]
struct Shared {
    stopped: AtomicBool,
    reason: Mutex<Option<String>>,
}

/// A stop flag shared by every thread of a running machine.
///
/// Each run loop polls [`StopSignal::is_stopped`] before every
/// iteration.  A thread which hits an unrecoverable failure calls
/// [`StopSignal::fail`]; only the first failure is recorded, so the
/// reported reason is the one which triggered the shutdown.
///
/// ```
/// use base::StopSignal;
/// let stop = StopSignal::new();
/// let other = stop.clone();
/// assert!(other.fail("first".to_string()));
/// assert!(!stop.fail("second".to_string()));
/// assert!(stop.is_stopped());
/// assert_eq!(stop.reason().as_deref(), Some("first"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    shared: Arc<Shared>,
}

impl StopSignal {
    #[must_use]
    pub fn new() -> StopSignal {
        StopSignal::default()
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::Acquire)
    }

    /// Stops without recording a failure (normal completion).
    pub fn request_stop(&self) {
        self.shared.stopped.store(true, Ordering::Release);
    }

    /// Stops and records `reason`, unless the machine was already
    /// stopping.  Returns whether the reason was recorded.
    pub fn fail(&self, reason: String) -> bool {
        let mut guard = self
            .shared
            .reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.shared.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }
        *guard = Some(reason);
        true
    }

    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.shared
            .reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[test]
fn test_request_stop_records_nothing() {
    let stop = StopSignal::new();
    assert!(!stop.is_stopped());
    stop.request_stop();
    assert!(stop.is_stopped());
    assert!(!stop.fail("too late".to_string()));
    assert_eq!(stop.reason(), None);
}
