//! Blocking wake-up primitives shared by futures, the queue and batch waits.
//!
//! # 実装詳細
//! - Mutex + Condvar による blocking wait（`InMemoryDeliveryQueue` と同じ形）
//! - 通知は sticky: wait の前に来た notify も取りこぼさない

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::ExecError;
use crate::interrupt::{self, InterruptToken};

/// Lock a mutex, recovering the guard if a previous holder panicked.
///
/// Critical sections in this crate never run user code, so the protected data
/// is consistent even when the lock is poisoned.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The instant `timeout` from now, or `None` (no deadline) when that is
/// beyond what [`Instant`] can represent.
pub(crate) fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

/// One-bit wake-up flag a single waiter blocks on.
#[derive(Debug, Default)]
pub(crate) struct Signal {
    notified: Mutex<bool>,
    condvar: Condvar,
}

impl Signal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn notify(&self) {
        *lock(&self.notified) = true;
        self.condvar.notify_all();
    }

    /// Block until notified or until `deadline` passes.
    ///
    /// Consumes the notification. Returns `false` on timeout.
    pub(crate) fn wait_until(&self, deadline: Option<Instant>) -> bool {
        let mut notified = lock(&self.notified);
        loop {
            if *notified {
                *notified = false;
                return true;
            }
            notified = match deadline {
                None => self
                    .condvar
                    .wait(notified)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    let (guard, _) = self
                        .condvar
                        .wait_timeout(notified, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    guard
                }
            };
        }
    }
}

/// A blocking wait on behalf of the current thread.
///
/// The waiter's signal is registered with the current thread's interrupt
/// token (if any) on creation, so interrupting the thread wakes the wait.
/// Sources the caller waits on must be subscribed to [`Waiter::signal`]
/// before calling [`Waiter::wait_for`].
pub(crate) struct Waiter {
    signal: Arc<Signal>,
    interrupt: Option<InterruptToken>,
}

impl Waiter {
    pub(crate) fn new() -> Self {
        let signal = Arc::new(Signal::new());
        let interrupt = interrupt::current();
        if let Some(token) = &interrupt {
            token.subscribe(&signal);
        }
        Self { signal, interrupt }
    }

    pub(crate) fn signal(&self) -> &Arc<Signal> {
        &self.signal
    }

    fn is_interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(InterruptToken::is_interrupted)
    }

    /// Re-run `poll` on every wake-up until it yields a value.
    ///
    /// Fails with [`ExecError::Interrupted`] if the thread is interrupted first.
    pub(crate) fn wait<R>(&self, mut poll: impl FnMut() -> Option<R>) -> Result<R, ExecError> {
        loop {
            if let Some(ready) = poll() {
                return Ok(ready);
            }
            if self.is_interrupted() {
                return Err(ExecError::Interrupted);
            }
            self.signal.wait_until(None);
        }
    }

    /// [`wait`](Self::wait) bounded by `deadline`.
    ///
    /// Returns `Ok(None)` once `deadline` passes without a value and
    /// `Err(ExecError::Interrupted)` if the thread is interrupted first.
    pub(crate) fn wait_for<R>(
        &self,
        deadline: Option<Instant>,
        mut poll: impl FnMut() -> Option<R>,
    ) -> Result<Option<R>, ExecError> {
        loop {
            if let Some(ready) = poll() {
                return Ok(Some(ready));
            }
            if self.is_interrupted() {
                return Err(ExecError::Interrupted);
            }
            if !self.signal.wait_until(deadline) {
                return Ok(poll());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    #[test]
    fn notify_before_wait_is_not_lost() {
        let signal = Signal::new();
        signal.notify();
        assert!(signal.wait_until(Some(Instant::now())));
    }

    #[test]
    fn wait_times_out_without_notify() {
        let signal = Signal::new();
        let start = Instant::now();
        let woke = signal.wait_until(Some(start + Duration::from_millis(30)));
        assert!(!woke);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn notify_from_other_thread_wakes_waiter() {
        let waiter = Waiter::new();
        let ready = Arc::new(AtomicBool::new(false));

        let notifier = {
            let signal = Arc::clone(waiter.signal());
            let ready = Arc::clone(&ready);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                ready.store(true, Ordering::SeqCst);
                signal.notify();
            })
        };

        let value = waiter
            .wait_for(None, || ready.load(Ordering::SeqCst).then_some(7))
            .unwrap();
        assert_eq!(value, Some(7));
        notifier.join().unwrap();
    }

    #[test]
    fn unrepresentable_deadline_means_no_deadline() {
        assert!(deadline_after(Duration::MAX).is_none());
        assert!(deadline_after(Duration::from_secs(1)).is_some());
    }

    #[test]
    fn wait_for_returns_none_after_deadline() {
        let waiter = Waiter::new();
        let deadline = Instant::now() + Duration::from_millis(10);
        let value: Option<()> = waiter.wait_for(Some(deadline), || None).unwrap();
        assert!(value.is_none());
    }
}
