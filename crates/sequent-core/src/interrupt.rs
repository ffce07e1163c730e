//! Cooperative thread interruption.
//!
//! Threads cannot be stopped from the outside, so interruption is a flag the
//! interrupted thread observes at its own pace:
//! - the worker checks it between tasks and while waiting for the next one
//! - blocking waits in this crate fail with [`ExecError::Interrupted`]
//! - running tasks may poll [`is_interrupted`] or use [`sleep`]
//!
//! The worker thread is bound to its token automatically. Any other thread
//! can opt in with [`bind_current`].

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crate::error::ExecError;
use crate::sync::{Signal, Waiter, deadline_after, lock};

thread_local! {
    static CURRENT: RefCell<Option<InterruptToken>> = const { RefCell::new(None) };
}

#[derive(Debug, Default)]
struct Inner {
    interrupted: AtomicBool,
    /// Signals of waits currently blocked on the owning thread.
    listeners: Mutex<Vec<Weak<Signal>>>,
}

/// Shared interrupt flag for one thread.
#[derive(Debug, Clone, Default)]
pub struct InterruptToken {
    inner: Arc<Inner>,
}

impl InterruptToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag and wake every wait blocked on the owning thread.
    ///
    /// The flag is never cleared.
    pub fn interrupt(&self) {
        if self.inner.interrupted.swap(true, Ordering::SeqCst) {
            return;
        }
        let listeners = std::mem::take(&mut *lock(&self.inner.listeners));
        for signal in listeners.iter().filter_map(Weak::upgrade) {
            signal.notify();
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupted.load(Ordering::SeqCst)
    }

    /// Register a signal to be woken on interrupt.
    ///
    /// Callers must re-check [`is_interrupted`](Self::is_interrupted) after
    /// subscribing: an interrupt that raced ahead of the subscription is only
    /// visible through the flag.
    pub(crate) fn subscribe(&self, signal: &Arc<Signal>) {
        let mut listeners = lock(&self.inner.listeners);
        listeners.retain(|weak| weak.strong_count() > 0);
        listeners.push(Arc::downgrade(signal));
    }
}

/// Bind `token` to the calling thread, replacing any previous binding.
pub fn bind_current(token: InterruptToken) {
    CURRENT.with(|current| *current.borrow_mut() = Some(token));
}

/// The token bound to the calling thread, if any.
pub fn current() -> Option<InterruptToken> {
    CURRENT.with(|current| current.borrow().clone())
}

/// Has the calling thread been interrupted?
///
/// Always `false` on threads without a bound token.
pub fn is_interrupted() -> bool {
    CURRENT.with(|current| {
        current
            .borrow()
            .as_ref()
            .is_some_and(InterruptToken::is_interrupted)
    })
}

/// Sleep for `duration`, returning early with [`ExecError::Interrupted`] if
/// the calling thread is interrupted.
pub fn sleep(duration: Duration) -> Result<(), ExecError> {
    if current().is_none() {
        std::thread::sleep(duration);
        return Ok(());
    }
    Waiter::new()
        .wait_for(deadline_after(duration), || None::<()>)
        .map(|_| ())
}
