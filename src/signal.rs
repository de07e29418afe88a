use std::sync::atomic::{AtomicBool, Ordering};

use event_listener::Event;


/// A flag that is set at most once and can be awaited.
///
/// Marks a connection as broken.
#[derive(Debug, Default)]
pub(crate) struct Signal {
    set: AtomicBool,
    event: Event,
}

impl Signal {
    /// Sets the flag and wakes every waiter. Returns `true` only for the
    /// call that actually set it.
    pub(crate) fn set(&self) -> bool {
        let first = !self.set.swap(true, Ordering::AcqRel);
        if first {
            self.event.notify(usize::MAX);
        }
        first
    }

    #[inline]
    pub(crate) fn is_set(&self) -> bool {
        self.set.load(Ordering::Acquire)
    }

    /// Waits until the flag is set.
    pub(crate) async fn wait(&self) {
        loop {
            if self.is_set() {
                return;
            }
            let listener = self.event.listen();
            // Set between the check and registering the listener
            if self.is_set() {
                return;
            }
            listener.await;
        }
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use super::*;

    #[tokio::test]
    async fn set_once() {
        let signal = Arc::new(Signal::default());
        assert!(!signal.is_set());

        let waiters: Vec<_> = (0..4).map(|_| {
            let s = signal.clone();
            tokio::spawn(async move { s.wait().await })
        }).collect();
        tokio::task::yield_now().await;

        assert!(signal.set());
        assert!(!signal.set());
        assert!(signal.is_set());
        for w in waiters {
            w.await.expect("waiter panicked");
        }
        // Already set: returns immediately
        signal.wait().await;
    }
}
