//! Epoch-based deferred reclamation
//!
//! Lookups on the pid graph run concurrently with teardown, so an unlinked
//! object cannot be released the moment it is removed: a reader that started
//! before the removal may still be traversing it. [`GraceDomain`] provides
//! the grace-period contract those structures depend on: readers pin the
//! domain for the duration of a lookup, retired garbage is only dropped once
//! every reader that could have observed it has unpinned.
//!
//! The scheme is a two-slot epoch counter. A reader pins into the slot of
//! the current epoch; the epoch can only advance while the previous slot is
//! empty. Garbage retired in epoch `e` is dropped once the epoch reaches
//! `e + 2`, at which point every reader pinned at or before `e` has provably
//! quiesced.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Condvar, Mutex, PoisonError};

/// Deferred-reclamation domain
///
/// One domain guards one family of structures; the pid registry owns one and
/// routes every deferred release through it.
#[derive(Default)]
pub struct GraceDomain {
    state: Mutex<State>,
    quiesced: Condvar,
}

#[derive(Default)]
struct State {
    epoch: u64,
    /// Active readers per epoch parity slot
    readers: [usize; 2],
    /// Retired garbage, oldest first, tagged with its retirement epoch
    retired: VecDeque<(u64, Box<dyn Any + Send>)>,
}

impl fmt::Debug for GraceDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("GraceDomain")
            .field("epoch", &state.epoch)
            .field("readers", &state.readers)
            .field("pending", &state.retired.len())
            .finish()
    }
}

impl GraceDomain {
    /// Create a new domain with no readers and nothing retired
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a read-side critical section
    ///
    /// While the returned pin is held, nothing retired after this call will
    /// be dropped. Pins never block other pins; hold one for the duration of
    /// a lookup, not longer.
    #[must_use]
    pub fn pin(&self) -> GracePin<'_> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let parity = (state.epoch & 1) as usize;
        state.readers[parity] += 1;
        GracePin {
            domain: self,
            parity,
        }
    }

    /// Hand an unlinked object to the domain for deferred release
    ///
    /// The object must already be unreachable from the shared structure; the
    /// domain only delays its drop until the current readers quiesce.
    pub fn retire<T: Send + 'static>(&self, garbage: T) {
        let dropped = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let epoch = state.epoch;
            state.retired.push_back((epoch, Box::new(garbage)));
            Self::advance_and_drain(&mut state)
        };
        // Dropping retired objects may take other locks; never do it while
        // holding the domain state lock.
        drop(dropped);
    }

    /// Block until a full grace period has elapsed
    ///
    /// Every reader pinned before this call has unpinned by the time it
    /// returns, and everything retired before this call has been dropped.
    pub fn synchronize(&self) {
        let dropped = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let target = state.epoch + 2;
            loop {
                while state.epoch < target {
                    let prev = ((state.epoch & 1) ^ 1) as usize;
                    if state.readers[prev] != 0 {
                        break;
                    }
                    state.epoch += 1;
                }
                if state.epoch >= target {
                    break;
                }
                state = self
                    .quiesced
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            Self::drain(&mut state)
        };
        tracing::trace!(released = dropped.len(), "grace period elapsed");
        drop(dropped);
    }

    /// Number of retired objects still awaiting their grace period
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retired
            .len()
    }

    fn unpin(&self, parity: usize) {
        let dropped = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            debug_assert!(state.readers[parity] > 0);
            state.readers[parity] = state.readers[parity].saturating_sub(1);
            let freed = if state.readers[parity] == 0 {
                Self::advance_and_drain(&mut state)
            } else {
                Vec::new()
            };
            self.quiesced.notify_all();
            freed
        };
        drop(dropped);
    }

    /// Advance the epoch as far as the oldest retired object needs, then
    /// drop everything whose grace period has elapsed.
    fn advance_and_drain(state: &mut State) -> Vec<Box<dyn Any + Send>> {
        loop {
            let oldest_needs_more = state
                .retired
                .front()
                .is_some_and(|(e, _)| e + 2 > state.epoch);
            if !oldest_needs_more {
                break;
            }
            let prev = ((state.epoch & 1) ^ 1) as usize;
            if state.readers[prev] != 0 {
                break;
            }
            state.epoch += 1;
        }
        Self::drain(state)
    }

    fn drain(state: &mut State) -> Vec<Box<dyn Any + Send>> {
        let mut out = Vec::new();
        while state
            .retired
            .front()
            .is_some_and(|(e, _)| e + 2 <= state.epoch)
        {
            if let Some((_, garbage)) = state.retired.pop_front() {
                out.push(garbage);
            }
        }
        out
    }
}

/// RAII token for a read-side critical section
///
/// Dropping the pin marks the reader as quiesced; the last reader of an
/// epoch slot unblocks waiting reclaimers.
#[must_use = "a grace pin protects readers only while it is held"]
pub struct GracePin<'a> {
    domain: &'a GraceDomain,
    parity: usize,
}

impl fmt::Debug for GracePin<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GracePin")
            .field("parity", &self.parity)
            .finish()
    }
}

impl Drop for GracePin<'_> {
    fn drop(&mut self) {
        self.domain.unpin(self.parity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Drop-flag helper: sets the bool when dropped.
    struct Tracked(Arc<AtomicBool>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn retire_without_readers_drops_promptly() {
        let domain = GraceDomain::new();
        let dropped = Arc::new(AtomicBool::new(false));
        domain.retire(Tracked(Arc::clone(&dropped)));
        domain.synchronize();
        assert!(dropped.load(Ordering::SeqCst));
        assert_eq!(domain.pending(), 0);
    }

    #[test]
    fn pinned_reader_holds_back_reclamation() {
        let domain = GraceDomain::new();
        let dropped = Arc::new(AtomicBool::new(false));

        let pin = domain.pin();
        domain.retire(Tracked(Arc::clone(&dropped)));
        assert!(!dropped.load(Ordering::SeqCst));
        assert_eq!(domain.pending(), 1);

        drop(pin);
        domain.synchronize();
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn late_reader_does_not_block_earlier_garbage() {
        let domain = GraceDomain::new();
        let dropped = Arc::new(AtomicBool::new(false));

        let early = domain.pin();
        domain.retire(Tracked(Arc::clone(&dropped)));
        let _late = domain.pin();
        drop(early);

        // The late pin began after the retirement; it could never have
        // observed the object and must not stall its release.
        assert!(dropped.load(Ordering::SeqCst));
        assert_eq!(domain.pending(), 0);
    }

    #[test]
    fn synchronize_waits_for_concurrent_reader() {
        let domain = Arc::new(GraceDomain::new());
        let dropped = Arc::new(AtomicBool::new(false));
        let (pinned_tx, pinned_rx) = std::sync::mpsc::channel();

        let reader = {
            let domain = Arc::clone(&domain);
            let dropped = Arc::clone(&dropped);
            std::thread::spawn(move || {
                let pin = domain.pin();
                pinned_tx.send(()).unwrap();
                std::thread::sleep(std::time::Duration::from_millis(50));
                assert!(!dropped.load(Ordering::SeqCst));
                drop(pin);
            })
        };

        // The retirement must happen after the reader has pinned.
        pinned_rx.recv().unwrap();
        domain.retire(Tracked(Arc::clone(&dropped)));
        domain.synchronize();
        assert!(dropped.load(Ordering::SeqCst));
        reader.join().unwrap();
    }
}
