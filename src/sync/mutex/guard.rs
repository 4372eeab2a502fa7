/*!
 * Data-Carrying Mutex
 *
 * `lock_api` wrappers around [`AdaptiveMutex`], for callers that want the
 * protected data and RAII guards rather than raw lock/unlock calls.
 */

use super::AdaptiveMutex;
use crate::sync::runtime::OsRuntime;
use lock_api::{GuardSend, RawMutex};

// Guards are `Send`: the lock is not tied to the thread that acquired it.
unsafe impl RawMutex for AdaptiveMutex<OsRuntime> {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self::new();

    type GuardMarker = GuardSend;

    #[inline]
    fn lock(&self) {
        Self::lock(self)
    }

    #[inline]
    fn try_lock(&self) -> bool {
        Self::try_lock(self)
    }

    #[inline]
    unsafe fn unlock(&self) {
        Self::unlock(self)
    }

    #[inline]
    fn is_locked(&self) -> bool {
        Self::is_locked(self)
    }
}

/// A mutual exclusion primitive protecting a `T`, backed by [`AdaptiveMutex`]
///
/// # Examples
///
/// ```
/// use adaptive_sync::Mutex;
/// use std::sync::Arc;
/// use std::thread;
///
/// let counter = Arc::new(Mutex::new(0u32));
/// let handles: Vec<_> = (0..4)
///     .map(|_| {
///         let counter = counter.clone();
///         thread::spawn(move || *counter.lock() += 1)
///     })
///     .collect();
/// for handle in handles {
///     handle.join().unwrap();
/// }
/// assert_eq!(*counter.lock(), 4);
/// ```
pub type Mutex<T> = lock_api::Mutex<AdaptiveMutex<OsRuntime>, T>;

/// RAII guard returned by [`Mutex::lock`](lock_api::Mutex::lock)
pub type MutexGuard<'a, T> = lock_api::MutexGuard<'a, AdaptiveMutex<OsRuntime>, T>;

/// Guard pointing at a sub-field of the protected data
pub type MappedMutexGuard<'a, T> = lock_api::MappedMutexGuard<'a, AdaptiveMutex<OsRuntime>, T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_unlocks_on_drop() {
        let m = Mutex::new(vec![1, 2, 3]);
        {
            let mut guard = m.lock();
            guard.push(4);
            assert!(m.is_locked());
            assert!(m.try_lock().is_none());
        }
        assert!(!m.is_locked());
        assert_eq!(*m.lock(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_mapped_guard() {
        let m = Mutex::new((0u32, String::from("a")));
        {
            let mut name: MappedMutexGuard<'_, String> =
                MutexGuard::map(m.lock(), |pair| &mut pair.1);
            name.push('b');
        }
        assert_eq!(m.lock().1, "ab");
    }

    #[test]
    fn test_guard_can_be_released_on_another_thread() {
        let m = Mutex::new(7u32);
        let guard = m.lock();
        std::thread::scope(|s| {
            s.spawn(move || drop(guard));
        });
        assert!(!m.is_locked());
    }
}
