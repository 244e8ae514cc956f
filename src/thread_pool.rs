//! Shared thread pool for parallel likelihood evaluation.
//!
//! Initial live-point evaluation and hyperparameter grid sweeps run on one
//! pool with an increased stack size.

#[cfg(feature = "parallel")]
use rayon::ThreadPool;

#[cfg(feature = "parallel")]
use std::sync::OnceLock;

#[cfg(feature = "parallel")]
static THREAD_POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();

/// Get or initialize the shared thread pool.
///
/// The pool uses an 8 MB stack per thread and one thread per logical CPU.
/// `None` if the pool could not be built.
#[cfg(feature = "parallel")]
fn get_thread_pool() -> Option<&'static ThreadPool> {
    THREAD_POOL
        .get_or_init(|| {
            rayon::ThreadPoolBuilder::new()
                .stack_size(8 * 1024 * 1024)
                .build()
                .map_err(|e| tracing::warn!(error = %e, "falling back to the global rayon pool"))
                .ok()
        })
        .as_ref()
}

/// Execute a parallel operation using the shared thread pool.
#[cfg(feature = "parallel")]
pub fn install<OP, R>(op: OP) -> R
where
    OP: FnOnce() -> R + Send,
    R: Send,
{
    match get_thread_pool() {
        Some(pool) => pool.install(op),
        None => op(),
    }
}

#[cfg(not(feature = "parallel"))]
pub fn install<OP, R>(op: OP) -> R
where
    OP: FnOnce() -> R,
{
    op()
}
