/*!
 * Adaptive Mutex
 *
 * A mutual-exclusion lock over one packed state word that spins briefly,
 * then parks, and switches into a strict hand-off mode when a waiter has
 * been passed over for too long.
 *
 * # Normal mode
 *
 * Waiters queue FIFO, but a woken waiter does not own the lock: it competes
 * with threads that are already running, and those usually win because they
 * are on-CPU. A waiter that loses is re-queued at the *front* of the list.
 * This favours throughput: a thread can re-acquire a lock it just released
 * without a context switch.
 *
 * # Starvation mode
 *
 * Once a waiter has waited longer than [`STARVATION_THRESHOLD_NS`] it marks
 * the mutex starving. From then on unlock hands ownership straight to the
 * queue head (the lock bit is left clear for the receiver to set), newcomers
 * neither spin nor grab the lock, and queue order is strictly FIFO.
 *
 * The mode ends when the receiving waiter is the last one queued, or when it
 * has itself waited less than the threshold.
 */

mod guard;
mod state;

pub use guard::{MappedMutexGuard, Mutex, MutexGuard};
pub use state::MutexState;

use self::state::{LOCKED, STARVING, WAITER, WOKEN};
use crate::errors::{fatal, SyncError};
use crate::hints::{likely, unlikely};
use crate::sync::config::STARVATION_THRESHOLD_NS;
use crate::sync::runtime::{OsRuntime, Runtime};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::trace;

/// Raw adaptive mutual-exclusion lock
///
/// Zero state is "unlocked, normal mode, no waiters", so the lock can live
/// in a `static`. It is not owner-tagged: any thread may unlock a lock taken
/// by another, and unlocking an unlocked mutex aborts the process.
///
/// The type is intentionally neither `Clone` nor `Copy`; duplicating a mutex
/// that has waiters would duplicate its waiter bookkeeping.
///
/// # Examples
///
/// ```
/// use adaptive_sync::AdaptiveMutex;
///
/// static LOCK: AdaptiveMutex = AdaptiveMutex::new();
///
/// LOCK.lock();
/// assert!(LOCK.is_locked());
/// LOCK.unlock();
/// ```
pub struct AdaptiveMutex<R = OsRuntime> {
    state: AtomicU32,
    sema: AtomicU32,
    runtime: R,
}

impl AdaptiveMutex<OsRuntime> {
    /// Create an unlocked mutex backed by the OS runtime
    pub const fn new() -> Self {
        Self::with_runtime(OsRuntime::new())
    }
}

impl Default for AdaptiveMutex<OsRuntime> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> AdaptiveMutex<R> {
    /// Create an unlocked mutex using the given runtime collaborators
    pub const fn with_runtime(runtime: R) -> Self {
        Self {
            state: AtomicU32::new(0),
            sema: AtomicU32::new(0),
            runtime,
        }
    }

    #[inline(always)]
    fn load(&self) -> MutexState {
        MutexState::from_bits(self.state.load(Ordering::Relaxed))
    }

    /// Decoded copy of the current state word (diagnostics only)
    #[inline]
    pub fn snapshot(&self) -> MutexState {
        self.load()
    }

    /// Whether some thread currently holds the lock
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.load().is_locked()
    }

    /// Try to take the lock without spinning or parking
    ///
    /// Fails if the lock is held or in starvation mode; in the latter the
    /// lock belongs to the queue head even while the lock bit is clear.
    #[inline]
    pub fn try_lock(&self) -> bool {
        let old = self.load();
        if old.is_contended() {
            return false;
        }
        self.state
            .compare_exchange(
                old.bits(),
                old.with(LOCKED).bits(),
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .is_ok()
    }
}

impl<R: Runtime> AdaptiveMutex<R> {
    /// Acquire the lock, blocking the calling thread until it is available
    #[inline]
    pub fn lock(&self) {
        if likely(
            self.state
                .compare_exchange(0, LOCKED, Ordering::Acquire, Ordering::Relaxed)
                .is_ok(),
        ) {
            return;
        }
        self.lock_slow();
    }

    #[cold]
    fn lock_slow(&self) {
        let mut wait_start: Option<u64> = None;
        let mut starving = false;
        let mut awoke = false;
        let mut iter = 0u32;
        let mut old = self.load();

        loop {
            // Spin only while someone holds the lock in normal mode. In
            // starvation mode ownership goes to the queue head anyway.
            if old.is_spinnable() && self.runtime.can_spin(iter) {
                // Claim `woken` so unlock does not wake a parked waiter that
                // would only lose the race against us.
                if !awoke
                    && !old.is_woken()
                    && old.waiters() != 0
                    && self
                        .state
                        .compare_exchange(
                            old.bits(),
                            old.with(WOKEN).bits(),
                            Ordering::Relaxed,
                            Ordering::Relaxed,
                        )
                        .is_ok()
                {
                    awoke = true;
                }
                self.runtime.do_spin();
                iter += 1;
                old = self.load();
                continue;
            }

            let mut new = old;
            // Don't grab a starving mutex, new arrivals must queue.
            if !old.is_starving() {
                new = new.with(LOCKED);
            }
            if old.is_contended() {
                new = new.add_waiter();
            }
            // Only a held mutex may enter starvation mode: the next unlock
            // is what performs the hand-off.
            if starving && old.is_locked() {
                new = new.with(STARVING);
            }
            if awoke {
                if unlikely(!new.is_woken()) {
                    fatal(SyncError::InconsistentMutexState(
                        "woken flag cleared while claimed",
                    ));
                }
                new = new.without(WOKEN);
            }

            match self.state.compare_exchange(
                old.bits(),
                new.bits(),
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    if !old.is_contended() {
                        // Locked with CAS
                        return;
                    }
                    if new.is_starving() && !old.is_starving() {
                        trace!(waiters = new.waiters(), "mutex entering starvation mode");
                    }

                    // A waiter that already parked once goes back to the front.
                    let lifo = wait_start.is_some();
                    let start = *wait_start.get_or_insert_with(|| self.runtime.nanotime());
                    self.runtime.semacquire(&self.sema, lifo);
                    starving = starving
                        || self.runtime.nanotime().saturating_sub(start) > STARVATION_THRESHOLD_NS;

                    old = self.load();
                    if old.is_starving() {
                        // Handed off: the lock bit is ours to set and we are
                        // still counted as a waiter.
                        if unlikely(old.is_locked() || old.is_woken() || old.waiters() == 0) {
                            fatal(SyncError::InconsistentMutexState(
                                "hand-off to a locked, woken or empty mutex",
                            ));
                        }
                        let mut delta = LOCKED.wrapping_sub(WAITER);
                        if !starving || old.waiters() == 1 {
                            // Leave starvation mode while it is cheap to do
                            // so: two starving waiters alternating could
                            // otherwise keep the mutex there forever.
                            delta = delta.wrapping_sub(STARVING);
                            trace!(remaining = old.waiters() - 1, "mutex leaving starvation mode");
                        }
                        self.state.fetch_add(delta, Ordering::Acquire);
                        return;
                    }
                    awoke = true;
                    iter = 0;
                }
                Err(actual) => old = MutexState::from_bits(actual),
            }
        }
    }

    /// Release the lock
    ///
    /// Any thread may release a lock acquired by another. Releasing a mutex
    /// that is not locked aborts the process.
    #[inline]
    pub fn unlock(&self) {
        let new = self
            .state
            .fetch_sub(LOCKED, Ordering::Release)
            .wrapping_sub(LOCKED);
        if unlikely(new != 0) {
            self.unlock_slow(MutexState::from_bits(new));
        }
    }

    #[cold]
    fn unlock_slow(&self, new: MutexState) {
        if new.bits().wrapping_add(LOCKED) & LOCKED == 0 {
            fatal(SyncError::UnlockOfUnlocked);
        }

        if new.is_starving() {
            // Leave the lock bit clear; the head waiter sets it on wake-up.
            trace!(waiters = new.waiters(), "mutex direct hand-off");
            self.runtime.semrelease(&self.sema, true);
            return;
        }

        let mut old = new;
        loop {
            // Nothing to do if nobody waits, or someone already re-took the
            // lock, or a spinner has claimed the wake, or the mode flipped.
            if old.waiters() == 0 || old.bits() & (LOCKED | WOKEN | STARVING) != 0 {
                return;
            }
            let next = old.remove_waiter().with(WOKEN);
            match self.state.compare_exchange(
                old.bits(),
                next.bits(),
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    self.runtime.semrelease(&self.sema, false);
                    return;
                }
                Err(actual) => old = MutexState::from_bits(actual),
            }
        }
    }
}

impl<R> fmt::Debug for AdaptiveMutex<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptiveMutex")
            .field("state", &self.load())
            .finish_non_exhaustive()
    }
}
