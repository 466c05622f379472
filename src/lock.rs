//! Lock primitives used by the mutual-exclusion demo tasks.
//!
//! Both locks are built on `parking_lot`:
//!
//! - [`FairReentrantLock`]: reentrant, and every release hands the lock to the
//!   longest-waiting thread (FIFO)
//! - [`IntrinsicLock`]: a plain per-instance mutex with no fairness guarantee
//!
//! # Examples
//!
//! ```
//! use std::cell::Cell;
//! use prometheus_cadence::lock::FairReentrantLock;
//!
//! let lock = FairReentrantLock::new(Cell::new(0));
//! lock.with_lock(|count| {
//!     count.set(count.get() + 1);
//!     // The holder may re-acquire without deadlocking.
//!     lock.with_lock(|count| count.set(count.get() + 1));
//! });
//! assert_eq!(lock.with_lock(Cell::get), 2);
//! ```

use std::time::Duration;

use lock_api::ReentrantMutexGuard;
use parking_lot::{Mutex, ReentrantMutex};

/// Reentrant mutual exclusion with FIFO hand-off between threads.
///
/// Releases go through `unlock_fair`, so a waiting thread always gets the
/// lock before the releasing thread can barge back in.
#[derive(Debug, Default)]
pub struct FairReentrantLock<T> {
    inner: ReentrantMutex<T>,
}

impl<T> FairReentrantLock<T> {
    /// Create a lock guarding `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: ReentrantMutex::new(value),
        }
    }

    /// Run `f` while holding the lock, blocking until it is available.
    ///
    /// The lock is released fairly when `f` returns, and released (unfairly)
    /// if `f` panics.
    pub fn with_lock<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.inner.lock();
        let out = f(&guard);
        ReentrantMutexGuard::unlock_fair(guard);
        out
    }

    /// Like [`with_lock`](Self::with_lock) but gives up after `timeout`.
    pub fn try_with_lock_for<R>(&self, timeout: Duration, f: impl FnOnce(&T) -> R) -> Option<R> {
        let guard = self.inner.try_lock_for(timeout)?;
        let out = f(&guard);
        ReentrantMutexGuard::unlock_fair(guard);
        Some(out)
    }

    /// Consume the lock and return the guarded value.
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

/// Per-instance mutex without fairness guarantees.
#[derive(Debug, Default)]
pub struct IntrinsicLock<T> {
    inner: Mutex<T>,
}

impl<T> IntrinsicLock<T> {
    /// Create a lock guarding `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Run `f` with exclusive access, blocking until the lock is available.
    pub fn synchronized<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }

    /// Whether some thread currently holds the lock.
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    /// Consume the lock and return the guarded value.
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}
