use parking_lot::{Condvar, Mutex, MutexGuard};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Mutual-exclusion lock with a high-priority and a low-priority facet.
///
/// Both facets share one exclusive lock. The difference is in how they
/// contend for it:
/// - [`lock_high()`](Self::lock_high) registers itself as a pending high
///   acquisition and contends immediately.
/// - [`lock_low()`](Self::lock_low) first waits until no high acquisition is
///   pending, then contends.
///
/// This biases the lock toward the frequent, latency-sensitive accessor (the
/// render loop) without granting concurrent reads: two high accessors still
/// serialize against each other. A low holder that already owns the lock is
/// never preempted; an incoming high acquisition blocks until it releases.
///
/// The lock is not reentrant. Acquiring either facet twice on one thread
/// deadlocks.
///
/// # Example
/// ```
/// use gazeview::sync::PriorityLock;
///
/// let lock = PriorityLock::new(0u32);
/// {
///     let mut value = lock.lock_low();
///     *value += 1;
/// }
/// assert_eq!(*lock.lock_high(), 1);
/// ```
pub struct PriorityLock<T> {
    data: Mutex<T>,

    /// Guards the pending check of low waiters; never held across user code.
    gate: Mutex<()>,
    low_ready: Condvar,

    /// Number of high acquisitions that have started but not yet resolved.
    pending_high: AtomicUsize,
}

impl<T> PriorityLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            data: Mutex::new(value),
            gate: Mutex::new(()),
            low_ready: Condvar::new(),
            pending_high: AtomicUsize::new(0),
        }
    }

    /// Acquire the lock through the high-priority facet, blocking on contention.
    pub fn lock_high(&self) -> HighGuard<'_, T> {
        let _pending = PendingHigh::enter(self);
        let guard = self.data.lock();
        HighGuard { lock: self, guard }
    }

    /// Try to acquire the lock through the high-priority facet without blocking.
    ///
    /// The pending counter is raised for the duration of the attempt and
    /// lowered again whether or not the attempt succeeds.
    pub fn try_lock_high(&self) -> Option<HighGuard<'_, T>> {
        let _pending = PendingHigh::enter(self);
        self.data
            .try_lock()
            .map(|guard| HighGuard { lock: self, guard })
    }

    /// Acquire the lock through the low-priority facet.
    ///
    /// Suspends until no high acquisition is in flight, then contends for the
    /// lock. If a high acquisition registered while this thread was contending,
    /// the lock is handed back and the wait starts over.
    pub fn lock_low(&self) -> LowGuard<'_, T> {
        loop {
            {
                let mut gate = self.gate.lock();
                self.low_ready
                    .wait_while(&mut gate, |_| self.pending_high.load(Ordering::Acquire) > 0);
            }

            let guard = self.data.lock();
            if self.pending_high.load(Ordering::Acquire) == 0 {
                return LowGuard { lock: self, guard };
            }

            tracing::trace!("low acquisition yielded to a pending high acquisition");
            drop(guard);
        }
    }

    /// Try to acquire the lock through the low-priority facet without blocking.
    ///
    /// Fails if any high acquisition is pending or the lock is already held.
    pub fn try_lock_low(&self) -> Option<LowGuard<'_, T>> {
        if self.pending_high.load(Ordering::Acquire) > 0 {
            return None;
        }
        self.data
            .try_lock()
            .map(|guard| LowGuard { lock: self, guard })
    }

    /// Borrow the high-priority facet on its own.
    pub fn high(&self) -> HighFacet<'_, T> {
        HighFacet { lock: self }
    }

    /// Borrow the low-priority facet on its own.
    pub fn low(&self) -> LowFacet<'_, T> {
        LowFacet { lock: self }
    }

    /// Number of high acquisitions currently in flight.
    pub fn pending_high(&self) -> usize {
        self.pending_high.load(Ordering::Acquire)
    }

    /// Whether either facet currently holds the lock.
    pub fn is_locked(&self) -> bool {
        self.data.is_locked()
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    fn wake_low(&self) {
        let _gate = self.gate.lock();
        self.low_ready.notify_all();
    }
}

impl<T: Default> Default for PriorityLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for PriorityLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityLock")
            .field("locked", &self.is_locked())
            .field("pending_high", &self.pending_high())
            .finish_non_exhaustive()
    }
}

/// Marks one high acquisition as in flight until dropped.
struct PendingHigh<'a, T> {
    lock: &'a PriorityLock<T>,
}

impl<'a, T> PendingHigh<'a, T> {
    fn enter(lock: &'a PriorityLock<T>) -> Self {
        lock.pending_high.fetch_add(1, Ordering::AcqRel);
        Self { lock }
    }
}

impl<T> Drop for PendingHigh<'_, T> {
    fn drop(&mut self) {
        // Last one out lets the low waiters re-check.
        if self.lock.pending_high.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.lock.wake_low();
        }
    }
}

/// Exclusive access obtained through the high-priority facet.
///
/// Released when dropped or passed to [`release()`](Self::release).
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct HighGuard<'a, T> {
    lock: &'a PriorityLock<T>,
    guard: MutexGuard<'a, T>,
}

impl<T> HighGuard<'_, T> {
    pub fn release(self) {}
}

impl<T> Deref for HighGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for HighGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for HighGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.wake_low();
    }
}

/// Exclusive access obtained through the low-priority facet.
///
/// Released when dropped or passed to [`release()`](Self::release).
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LowGuard<'a, T> {
    lock: &'a PriorityLock<T>,
    guard: MutexGuard<'a, T>,
}

impl<T> LowGuard<'_, T> {
    pub fn release(self) {}
}

impl<T> Deref for LowGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for LowGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for LowGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.wake_low();
    }
}

impl<T: fmt::Debug> fmt::Debug for HighGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HighGuard").field(&*self.guard).finish()
    }
}

impl<T: fmt::Debug> fmt::Debug for LowGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LowGuard").field(&*self.guard).finish()
    }
}

/// The high-priority facet of a [`PriorityLock`], for code that must only
/// ever take the lock at high priority.
pub struct HighFacet<'a, T> {
    lock: &'a PriorityLock<T>,
}

impl<T> Clone for HighFacet<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for HighFacet<'_, T> {}

impl<'a, T> HighFacet<'a, T> {
    pub fn lock(&self) -> HighGuard<'a, T> {
        self.lock.lock_high()
    }

    pub fn try_lock(&self) -> Option<HighGuard<'a, T>> {
        self.lock.try_lock_high()
    }
}

/// The low-priority facet of a [`PriorityLock`].
pub struct LowFacet<'a, T> {
    lock: &'a PriorityLock<T>,
}

impl<T> Clone for LowFacet<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for LowFacet<'_, T> {}

impl<'a, T> LowFacet<'a, T> {
    pub fn lock(&self) -> LowGuard<'a, T> {
        self.lock.lock_low()
    }

    pub fn try_lock(&self) -> Option<LowGuard<'a, T>> {
        self.lock.try_lock_low()
    }
}
