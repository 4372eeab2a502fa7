/*!
 * Error Types
 * Fatal usage and consistency errors, with thiserror and miette diagnostics
 *
 * None of these are contention: a held lock, an exhausted spin budget or a
 * parked waiter are the normal path. Every variant here means an invariant
 * was broken by the caller or the state word was corrupted, so the public
 * operations route them through [`fatal`] instead of returning them.
 */

use miette::Diagnostic;
use thiserror::Error;

/// Result type for the checked value operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Unrecoverable synchronization errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum SyncError {
    #[error("sync: unlock of unlocked mutex")]
    #[diagnostic(
        code(mutex::unlock_of_unlocked),
        help("Every unlock must be paired with a preceding lock on the same mutex.")
    )]
    UnlockOfUnlocked,

    #[error("sync: inconsistent mutex state ({0})")]
    #[diagnostic(
        code(mutex::inconsistent_state),
        help("The mutex state word was corrupted, most likely by copying a mutex that was in use.")
    )]
    InconsistentMutexState(&'static str),

    #[error("sync: store of empty value into AtomicValue")]
    #[diagnostic(
        code(value::store_of_empty),
        help("Wrap the payload with Value::new before publishing it.")
    )]
    StoreOfEmptyValue,

    #[error("sync: store of inconsistently typed value into AtomicValue (holds {stored}, got {attempted})")]
    #[diagnostic(
        code(value::inconsistent_type),
        help("An AtomicValue only ever holds values of the type it was first published with.")
    )]
    InconsistentType {
        stored: &'static str,
        attempted: &'static str,
    },
}

impl SyncError {
    /// Diagnostic code as a plain string, for structured log fields
    pub fn code_str(&self) -> String {
        self.code().map(|c| c.to_string()).unwrap_or_default()
    }
}

/// Report a fatal error and terminate the process
///
/// Aborts rather than panics so the error cannot be caught by
/// `catch_unwind` or swallowed by a thread boundary.
#[cold]
#[inline(never)]
pub fn fatal(err: SyncError) -> ! {
    tracing::error!(code = %err.code_str(), error = %err, "fatal synchronization error");
    eprintln!("fatal error: {err}");
    std::process::abort()
}
