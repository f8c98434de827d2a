//! Thread-count-bounded parallel mapping.
//!
//! Wraps a dedicated rayon pool so callers can honour a user-supplied thread
//! count without touching the global pool. Results keep input order.

use rayon::prelude::*;

#[derive(Debug, thiserror::Error)]
#[error("Failed to build a pool of {threads} worker threads: {source}")]
pub struct PoolError {
    threads: usize,
    #[source]
    source: rayon::ThreadPoolBuildError,
}

/// Maps `f` over `items` on a pool of `threads` workers.
///
/// With `threads == 1` the map runs inline on the calling thread.
///
/// # Panics
///
/// Panics if `threads` is 0.
pub fn par_map_with_threads<T, R, F>(items: &[T], threads: usize, f: F) -> Result<Vec<R>, PoolError>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    assert!(threads > 0, "threads must be > 0");

    if threads == 1 {
        return Ok(items.iter().map(f).collect());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|source| PoolError { threads, source })?;

    Ok(pool.install(|| items.par_iter().map(&f).collect()))
}
