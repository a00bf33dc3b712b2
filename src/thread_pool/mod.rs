use crate::Result;

/// A pool of worker threads running store requests.
///
/// The server hands the engine work of every request to `spawn`. Jobs are
/// short; connections themselves are read on their own threads.
pub trait ThreadPool {
    /// Creates a new thread pool with the given number of threads.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be created (e.g., zero threads).
    fn new(threads: u32) -> Result<Self>
    where
        Self: Sized;

    /// Spawns a job into the thread pool.
    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static;
}

mod rayon_pool;
mod shared_queue;

pub use self::rayon_pool::RayonThreadPool;
pub use self::shared_queue::SharedQueueThreadPool;
