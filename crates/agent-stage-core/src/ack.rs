//! Delivery acknowledgment callback.

use std::fmt;

/// One-shot acknowledgment attached to an inbound event.
///
/// Consuming `fire` guarantees the callback runs at most once; dropping an
/// unfired `Ack` never calls it.
pub struct Ack {
    callback: Box<dyn FnOnce() + Send + 'static>,
}

impl Ack {
    pub fn new(callback: impl FnOnce() + Send + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }

    /// Invoke the callback.
    pub fn fire(self) {
        (self.callback)();
    }
}

impl fmt::Debug for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Ack")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_ack_fires_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let ack = Ack::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        ack.fire();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_ack_does_not_fire() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        drop(Ack::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
