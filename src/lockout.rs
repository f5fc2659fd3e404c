//! Double-submit protection for player actions.
//!
//! After a player action is sent, further actions are refused for a fixed
//! window. The window always expires on its own, whatever the server does.

use std::time::Duration;

use tokio::time::Instant;

use crate::error::{ClientError, Result};

/// Default length of the lockout window.
pub const DEFAULT_SUBMIT_LOCKOUT: Duration = Duration::from_secs(4);

/// A self-expiring input lock.
#[derive(Debug, Clone)]
pub struct SubmitLockout {
    window: Duration,
    locked_until: Option<Instant>,
}

impl Default for SubmitLockout {
    fn default() -> Self {
        Self::new(DEFAULT_SUBMIT_LOCKOUT)
    }
}

impl SubmitLockout {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            locked_until: None,
        }
    }

    /// Take the lock for one submission.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InputLocked`] with the time left if a previous
    /// submission is still inside its window.
    pub fn try_acquire(&mut self, now: Instant) -> Result<()> {
        if let Some(remaining) = self.remaining(now) {
            return Err(ClientError::InputLocked { remaining });
        }
        self.locked_until = Some(now + self.window);
        Ok(())
    }

    /// Time left in the current window, if locked.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.locked_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }

    pub fn is_locked(&self, now: Instant) -> bool {
        self.remaining(now).is_some()
    }

    /// Drop the lock early, e.g. when the session resets.
    pub fn release(&mut self) {
        self.locked_until = None;
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

    #[test]
    fn second_submit_inside_window_is_refused() {
        let now = Instant::now();
        let mut lockout = SubmitLockout::new(Duration::from_secs(4));
        lockout.try_acquire(now).unwrap();

        let err = lockout
            .try_acquire(now + Duration::from_secs(1))
            .unwrap_err();
        match err {
            ClientError::InputLocked { remaining } => {
                assert_eq!(remaining, Duration::from_secs(3));
            }
            other => panic!("expected InputLocked, got {other:?}"),
        }
    }

    #[test]
    fn lock_expires_on_its_own() {
        let now = Instant::now();
        let mut lockout = SubmitLockout::new(Duration::from_secs(4));
        lockout.try_acquire(now).unwrap();
        assert!(lockout.is_locked(now + Duration::from_millis(3999)));
        assert!(!lockout.is_locked(now + Duration::from_secs(4)));
        lockout.try_acquire(now + Duration::from_secs(4)).unwrap();
    }

    #[test]
    fn release_unlocks_immediately() {
        let now = Instant::now();
        let mut lockout = SubmitLockout::default();
        lockout.try_acquire(now).unwrap();
        lockout.release();
        assert!(!lockout.is_locked(now));
    }
}
