//! Thread-marshaling indirection and the non-reentrant change guard.
//!
//! The binding list assumes a single logical owner thread (the UI thread of
//! the bound control). [`SynchronizeInvoke`] is the injectable seam through
//! which reactions are marshaled onto that thread; the default executor runs
//! them inline.
//!
//! [`ChangeGuard`] replaces the classic polled `changing` boolean: entering
//! is explicit and non-reentrant, the token releases on drop (so the guard is
//! restored on every exit path, including panics), and waiting is bounded and
//! surfaces a timeout error instead of hanging.

use std::cell::Cell;
use std::time::{Duration, Instant};

use thiserror::Error;

/// Marshals an action onto the thread owning the bound control.
pub trait SynchronizeInvoke {
    /// Runs `action` on the owner thread. Implementations must run it
    /// exactly once, synchronously with respect to event ordering.
    fn invoke(&self, action: &mut dyn FnMut());
}

/// Executor for the common case: caller already is the owner thread.
pub struct InlineInvoke;

impl SynchronizeInvoke for InlineInvoke {
    fn invoke(&self, action: &mut dyn FnMut()) {
        action();
    }
}

/// The guard is currently held by an in-flight structural change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("a structural change is already in progress")]
pub struct GuardHeld;

/// Non-reentrant mutual exclusion for structural rebuilds.
pub struct ChangeGuard {
    held: Cell<bool>,
}

impl ChangeGuard {
    pub fn new() -> Self {
        ChangeGuard {
            held: Cell::new(false),
        }
    }

    pub fn is_held(&self) -> bool {
        self.held.get()
    }

    /// Acquires the guard, failing immediately when it is already held.
    pub fn try_enter(&self) -> Result<GuardToken<'_>, GuardHeld> {
        if self.held.replace(true) {
            return Err(GuardHeld);
        }
        Ok(GuardToken { guard: self })
    }

    /// Waits until the guard is released, up to `timeout`.
    ///
    /// Only meaningful when another cooperatively scheduled party can
    /// release it; on the owner thread itself a held guard means reentrancy
    /// and the wait can never succeed.
    pub fn wait_idle(&self, timeout: Duration) -> Result<(), GuardHeld> {
        let deadline = Instant::now() + timeout;
        while self.held.get() {
            if Instant::now() >= deadline {
                return Err(GuardHeld);
            }
            std::thread::yield_now();
        }
        Ok(())
    }
}

impl Default for ChangeGuard {
    fn default() -> Self {
        ChangeGuard::new()
    }
}

/// RAII token releasing a [`ChangeGuard`] on drop.
pub struct GuardToken<'a> {
    guard: &'a ChangeGuard,
}

impl Drop for GuardToken<'_> {
    fn drop(&mut self) {
        self.guard.held.set(false);
    }
}

/// RAII flag setter restoring the previous value on drop.
pub(crate) struct FlagGuard<'a> {
    flag: &'a Cell<bool>,
    previous: bool,
}

impl<'a> FlagGuard<'a> {
    pub(crate) fn set(flag: &'a Cell<bool>) -> Self {
        let previous = flag.replace(true);
        FlagGuard { flag, previous }
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(self.previous);
    }
}
