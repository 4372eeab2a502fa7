/*!
 * Monitoring
 * Tracing setup for binaries and tests built on the primitives
 */

mod tracer;

pub use tracer::{init_tracing, try_init_tracing};
