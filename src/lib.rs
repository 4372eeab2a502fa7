/*!
 * Adaptive Sync
 * Low-level synchronization primitives for library code
 *
 * - [`AdaptiveMutex`]: spin-then-park mutual exclusion with a starvation
 *   mode that hands ownership directly to the longest waiter
 * - [`AtomicValue`]: lock-free publication of an immutable value whose type
 *   is fixed by the first store
 */

pub mod errors;
pub(crate) mod hints;
pub mod monitoring;
pub mod sync;

// Re-exports
pub use errors::{fatal, SyncError, SyncResult};
pub use monitoring::{init_tracing, try_init_tracing};
pub use sync::{
    AdaptiveMutex, AtomicValue, MappedMutexGuard, Mutex, MutexGuard, MutexState, OsRuntime,
    Payload, Runtime, TagState, TypeTag, Value,
};
