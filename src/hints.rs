/*!
 * Branch Hints
 * Stable-Rust branch weighting for the lock fast paths
 */

/// Never called on the hot path; calling it marks the enclosing branch cold
#[cold]
#[inline(always)]
fn cold_path() {}

/// Hint that `b` is usually true
///
/// # Example
/// ```ignore
/// if likely(cas_succeeded) {
///     return; // uncontended fast path
/// }
/// ```
#[inline(always)]
#[must_use]
pub fn likely(b: bool) -> bool {
    if !b {
        cold_path();
    }
    b
}

/// Hint that `b` is usually false
#[inline(always)]
#[must_use]
pub fn unlikely(b: bool) -> bool {
    if b {
        cold_path();
    }
    b
}
