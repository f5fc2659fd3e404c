//! One-shot waiters released by server acknowledgements.
//!
//! The server answers every successful command with a bare `ok` packet that
//! does not say which command it answers. [`AckRendezvous`] therefore matches
//! acknowledgements to waiters purely by arrival order: each `ok` releases the
//! single oldest waiter and leaves the rest pending.
//!
//! This only works while at most one acknowledgement-sensitive prompt is
//! outstanding at a time. The phase mapper never emits more than one barrier
//! task per phase change, and the presentation queue only registers a barrier
//! once it becomes the active task.

use std::collections::VecDeque;

use tracing::trace;

/// FIFO of waiters keyed by "the next acknowledgement".
#[derive(Debug)]
pub struct AckRendezvous<W> {
    waiters: VecDeque<W>,
}

impl<W> Default for AckRendezvous<W> {
    fn default() -> Self {
        Self {
            waiters: VecDeque::new(),
        }
    }
}

impl<W> AckRendezvous<W> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `waiter` to be released by the next unclaimed acknowledgement.
    pub fn on_next_ack(&mut self, waiter: W) {
        self.waiters.push_back(waiter);
        trace!(pending = self.waiters.len(), "ack waiter registered");
    }

    /// Consume one acknowledgement.
    ///
    /// Returns the oldest waiter, or `None` if nobody was waiting (the
    /// acknowledgement is simply dropped).
    pub fn fire_ack(&mut self) -> Option<W> {
        let released = self.waiters.pop_front();
        trace!(
            released = released.is_some(),
            pending = self.waiters.len(),
            "ack fired"
        );
        released
    }

    /// Drop every pending waiter without releasing any of them.
    pub fn discard_all(&mut self) {
        if !self.waiters.is_empty() {
            trace!(discarded = self.waiters.len(), "ack waiters discarded");
        }
        self.waiters.clear();
    }

    /// Number of waiters still pending.
    pub fn pending(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

impl<W: PartialEq> AckRendezvous<W> {
    /// Remove a specific waiter that no longer needs an acknowledgement.
    ///
    /// Returns `true` if the waiter was pending.
    pub fn withdraw(&mut self, waiter: &W) -> bool {
        match self.waiters.iter().position(|w| w == waiter) {
            Some(index) => {
                self.waiters.remove(index);
                true
            }
            None => false,
        }
    }
}

impl<F: FnOnce()> AckRendezvous<F> {
    /// Consume one acknowledgement and run the released callback.
    ///
    /// Returns `true` if a callback ran.
    pub fn fire_ack_and_call(&mut self) -> bool {
        match self.fire_ack() {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn one_ack_releases_only_the_oldest() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut rendezvous: AckRendezvous<Box<dyn FnOnce()>> = AckRendezvous::new();

        let first = Rc::clone(&calls);
        rendezvous.on_next_ack(Box::new(move || first.borrow_mut().push("first")));
        let second = Rc::clone(&calls);
        rendezvous.on_next_ack(Box::new(move || second.borrow_mut().push("second")));

        assert!(rendezvous.fire_ack_and_call());
        assert_eq!(*calls.borrow(), vec!["first"]);
        assert_eq!(rendezvous.pending(), 1);

        assert!(rendezvous.fire_ack_and_call());
        assert_eq!(*calls.borrow(), vec!["first", "second"]);
        assert!(rendezvous.is_empty());
    }

    #[test]
    fn ack_without_waiters_is_dropped() {
        let mut rendezvous: AckRendezvous<u32> = AckRendezvous::new();
        assert_eq!(rendezvous.fire_ack(), None);

        // A later waiter is not released by the earlier, unclaimed ack.
        rendezvous.on_next_ack(7);
        assert_eq!(rendezvous.pending(), 1);
        assert_eq!(rendezvous.fire_ack(), Some(7));
    }

    #[test]
    fn discarded_waiters_never_fire() {
        let fired = Rc::new(RefCell::new(false));
        let mut rendezvous: AckRendezvous<Box<dyn FnOnce()>> = AckRendezvous::new();
        let flag = Rc::clone(&fired);
        rendezvous.on_next_ack(Box::new(move || *flag.borrow_mut() = true));

        rendezvous.discard_all();
        assert!(!rendezvous.fire_ack_and_call());
        assert!(!*fired.borrow());
    }

    #[test]
    fn withdraw_removes_a_specific_waiter() {
        let mut rendezvous = AckRendezvous::new();
        rendezvous.on_next_ack(1);
        rendezvous.on_next_ack(2);
        rendezvous.on_next_ack(3);

        assert!(rendezvous.withdraw(&2));
        assert!(!rendezvous.withdraw(&2));
        assert_eq!(rendezvous.fire_ack(), Some(1));
        assert_eq!(rendezvous.fire_ack(), Some(3));
    }
}
