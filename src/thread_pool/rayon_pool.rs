use super::ThreadPool;
use crate::{GeoError, Result};

/// A thread pool backed by the `rayon` library.
pub struct RayonThreadPool {
    pool: rayon::ThreadPool,
}

impl ThreadPool for RayonThreadPool {
    fn new(threads: u32) -> Result<Self> {
        if threads == 0 {
            return Err(GeoError::StringError(
                "Thread pool needs at least one thread".to_owned(),
            ));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads as usize)
            .thread_name(|id| format!("geostore-rayon-{id}"))
            .build()
            .map_err(|e| GeoError::StringError(e.to_string()))?;
        Ok(RayonThreadPool { pool })
    }

    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.spawn(job);
    }
}
