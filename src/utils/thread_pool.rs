use once_cell::sync::OnceCell;
use rayon::ThreadPoolBuilder;
use std::sync::Arc;

static THREAD_POOL: OnceCell<Arc<rayon::ThreadPool>> = OnceCell::new();

/// Initialize the global walk pool with the specified number of threads
///
/// # Errors
///
/// Returns an error if the pool cannot be built or was already initialized
pub fn init_thread_pool(num_threads: usize) -> anyhow::Result<()> {
    let pool = build_pool(num_threads)?;

    THREAD_POOL
        .set(Arc::new(pool))
        .map_err(|_| anyhow::anyhow!("Thread pool already initialized"))?;

    Ok(())
}

/// Get the global walk pool, initializing with default settings if needed
///
/// # Errors
///
/// Returns an error if the pool cannot be created
pub fn get_thread_pool() -> anyhow::Result<Arc<rayon::ThreadPool>> {
    THREAD_POOL
        .get_or_try_init(|| build_pool(default_threads()).map(Arc::new))
        .cloned()
}

/// Run a function in the walk pool
///
/// # Errors
///
/// Returns an error if the pool cannot be created
pub fn run_in_pool<F, R>(f: F) -> anyhow::Result<R>
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    let pool = get_thread_pool()?;
    Ok(pool.install(f))
}

/// Thread count used when nothing was configured
#[must_use]
pub fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
        .min(8)
}

fn build_pool(num_threads: usize) -> anyhow::Result<rayon::ThreadPool> {
    Ok(ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(|i| format!("backlist-walker-{i}"))
        .build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_in_pool() {
        let result = run_in_pool(|| rayon::current_thread_index().is_some()).unwrap();
        assert!(result);
    }

    #[test]
    fn test_default_threads_bounds() {
        let n = default_threads();
        assert!((1..=8).contains(&n));
    }
}
