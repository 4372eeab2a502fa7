/*!
 * Packed Mutex State
 *
 * ```text
 *  31                                   3   2          1       0
 * +--------------------------------------+----------+-------+--------+
 * |              waiters                 | starving | woken | locked |
 * +--------------------------------------+----------+-------+--------+
 * ```
 *
 * The four fields only mean something together: every transition is a
 * single CAS or add on the whole word.
 */

use std::fmt;

/// Lock is held
pub(crate) const LOCKED: u32 = 1 << 0;
/// A spinner or freshly woken waiter is racing for the lock; unlock must not wake another
pub(crate) const WOKEN: u32 = 1 << 1;
/// Ownership is handed directly to the queue head
pub(crate) const STARVING: u32 = 1 << 2;
/// Parked waiter count lives above the flag bits
pub(crate) const WAITER_SHIFT: u32 = 3;
/// One parked waiter
pub(crate) const WAITER: u32 = 1 << WAITER_SHIFT;

/// Decoded view of a mutex state word
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct MutexState(u32);

impl MutexState {
    #[inline(always)]
    pub(crate) const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw word
    #[inline(always)]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline(always)]
    pub const fn is_locked(self) -> bool {
        self.0 & LOCKED != 0
    }

    #[inline(always)]
    pub const fn is_woken(self) -> bool {
        self.0 & WOKEN != 0
    }

    #[inline(always)]
    pub const fn is_starving(self) -> bool {
        self.0 & STARVING != 0
    }

    /// Number of parked waiters
    #[inline(always)]
    pub const fn waiters(self) -> u32 {
        self.0 >> WAITER_SHIFT
    }

    /// Held and not starving: the only state worth spinning on
    #[inline(always)]
    pub(crate) const fn is_spinnable(self) -> bool {
        self.0 & (LOCKED | STARVING) == LOCKED
    }

    /// Held or starving: a newcomer has to queue
    #[inline(always)]
    pub(crate) const fn is_contended(self) -> bool {
        self.0 & (LOCKED | STARVING) != 0
    }

    #[inline(always)]
    pub(crate) const fn with(self, flag: u32) -> Self {
        Self(self.0 | flag)
    }

    #[inline(always)]
    pub(crate) const fn without(self, flag: u32) -> Self {
        Self(self.0 & !flag)
    }

    #[inline(always)]
    pub(crate) const fn add_waiter(self) -> Self {
        Self(self.0.wrapping_add(WAITER))
    }

    #[inline(always)]
    pub(crate) const fn remove_waiter(self) -> Self {
        Self(self.0.wrapping_sub(WAITER))
    }
}

impl fmt::Debug for MutexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutexState")
            .field("locked", &self.is_locked())
            .field("woken", &self.is_woken())
            .field("starving", &self.is_starving())
            .field("waiters", &self.waiters())
            .finish()
    }
}
