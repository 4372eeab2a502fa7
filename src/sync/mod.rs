/*!
 * Synchronization Primitives
 *
 * Low-level building blocks for other library code:
 * - Adaptive mutex: spin, then park, with a starvation-avoiding hand-off mode
 * - Atomic value: lock-free, type-checked publication of an immutable value
 *
 * # Architecture
 *
 * Both primitives only touch their own atomics. Everything that needs the
 * OS (spin hints, the clock, blocking and waking threads) goes through the
 * [`Runtime`] trait, with [`OsRuntime`] as the default implementation.
 */

pub mod config;
mod mutex;
mod runtime;
mod value;

pub use mutex::{AdaptiveMutex, MappedMutexGuard, Mutex, MutexGuard, MutexState};
pub use runtime::{OsRuntime, Runtime};
pub use value::{AtomicValue, Payload, TagState, TypeTag, Value};
