/*!
 * Runtime Collaborators
 *
 * The mutex never talks to the OS directly. Spinning, timekeeping and
 * blocking go through [`Runtime`], so tests can swap in a deterministic
 * implementation and force exact interleavings.
 *
 * [`OsRuntime`] is the production implementation: CPU spin hints, a
 * monotonic clock anchored at first use, and the process-wide
 * [semaphore table](sema) built on `parking_lot_core`.
 */

mod sema;

use crate::sync::config::{ACTIVE_SPIN_CNT, MUTEX_SPIN_LIMIT};
use std::sync::atomic::AtomicU32;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

/// Services a blocking primitive needs from its environment
///
/// Implementations must be:
/// - **Thread-safe**: every method is called concurrently from all lockers
/// - **Address-keyed**: `semacquire`/`semrelease` on the same `&AtomicU32`
///   refer to the same semaphore, whose count is that atomic
pub trait Runtime: Send + Sync {
    /// Whether spin round `iter` (0-based) is worth attempting
    fn can_spin(&self, iter: u32) -> bool;

    /// Execute one bounded busy-wait round
    fn do_spin(&self);

    /// Monotonic time in nanoseconds
    fn nanotime(&self) -> u64;

    /// Block until `sema` is positive, then decrement it
    ///
    /// `lifo` queues the caller at the head of the wait list.
    fn semacquire(&self, sema: &AtomicU32, lifo: bool);

    /// Increment `sema` and wake one waiter
    ///
    /// `handoff` wakes the head waiter and hands it the count directly.
    fn semrelease(&self, sema: &AtomicU32, handoff: bool);
}

impl<R: Runtime + ?Sized> Runtime for &R {
    #[inline]
    fn can_spin(&self, iter: u32) -> bool {
        (**self).can_spin(iter)
    }

    #[inline]
    fn do_spin(&self) {
        (**self).do_spin()
    }

    #[inline]
    fn nanotime(&self) -> u64 {
        (**self).nanotime()
    }

    #[inline]
    fn semacquire(&self, sema: &AtomicU32, lifo: bool) {
        (**self).semacquire(sema, lifo)
    }

    #[inline]
    fn semrelease(&self, sema: &AtomicU32, handoff: bool) {
        (**self).semrelease(sema, handoff)
    }
}

impl<R: Runtime + ?Sized> Runtime for Arc<R> {
    #[inline]
    fn can_spin(&self, iter: u32) -> bool {
        (**self).can_spin(iter)
    }

    #[inline]
    fn do_spin(&self) {
        (**self).do_spin()
    }

    #[inline]
    fn nanotime(&self) -> u64 {
        (**self).nanotime()
    }

    #[inline]
    fn semacquire(&self, sema: &AtomicU32, lifo: bool) {
        (**self).semacquire(sema, lifo)
    }

    #[inline]
    fn semrelease(&self, sema: &AtomicU32, handoff: bool) {
        (**self).semrelease(sema, handoff)
    }
}

/// Default runtime backed by the host OS threads
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OsRuntime;

impl OsRuntime {
    pub const fn new() -> Self {
        Self
    }

    /// Logical CPUs available to this process, probed once
    pub fn parallelism() -> usize {
        static NCPU: OnceLock<usize> = OnceLock::new();
        *NCPU.get_or_init(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

fn epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

impl Runtime for OsRuntime {
    #[inline]
    fn can_spin(&self, iter: u32) -> bool {
        // Spinning on a single CPU only delays the holder
        iter < MUTEX_SPIN_LIMIT && Self::parallelism() > 1
    }

    #[inline]
    fn do_spin(&self) {
        for _ in 0..ACTIVE_SPIN_CNT {
            std::hint::spin_loop();
        }
    }

    #[inline]
    fn nanotime(&self) -> u64 {
        epoch().elapsed().as_nanos() as u64
    }

    fn semacquire(&self, sema: &AtomicU32, lifo: bool) {
        sema::table().acquire(sema, lifo)
    }

    fn semrelease(&self, sema: &AtomicU32, handoff: bool) {
        sema::table().release(sema, handoff)
    }
}
