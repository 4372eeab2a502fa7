/*!
 * Synchronization Configuration
 *
 * Fixed tuning constants. None of these are runtime-configurable: the
 * fairness behaviour of the mutex (how long a waiter can be passed over
 * before starvation mode kicks in) is derived from them together.
 */

/// Spin rounds a contended locker may attempt before it queues
pub const MUTEX_SPIN_LIMIT: u32 = 4;

/// CPU pause hints executed per spin round
pub const ACTIVE_SPIN_CNT: u32 = 30;

/// Wait time after which a parked waiter switches the mutex to starvation mode
pub const STARVATION_THRESHOLD_NS: u64 = 1_000_000;

/// Number of slots in the process-wide semaphore table (prime, spreads addresses)
pub const SEMA_TABLE_SIZE: usize = 251;

