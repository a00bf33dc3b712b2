use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crossbeam::channel::{self, Receiver, Sender};
use log::{debug, error};

use super::ThreadPool;
use crate::{GeoError, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A thread pool using a shared job queue.
///
/// Workers pull jobs from a single MPMC channel. A job that panics (e.g. a
/// request hitting a poisoned lock) is caught and the worker keeps
/// serving. Dropping the pool closes the channel and the workers exit once
/// the queue drains.
pub struct SharedQueueThreadPool {
    tx: Sender<Job>,
}

impl ThreadPool for SharedQueueThreadPool {
    fn new(threads: u32) -> Result<Self> {
        if threads == 0 {
            return Err(GeoError::StringError(
                "Thread pool needs at least one thread".to_owned(),
            ));
        }
        let (tx, rx) = channel::unbounded::<Job>();
        for id in 0..threads {
            spawn_worker(id, rx.clone())?;
        }
        Ok(SharedQueueThreadPool { tx })
    }

    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.tx.send(Box::new(job)).is_err() {
            error!("Thread pool has no active workers, job dropped");
        }
    }
}

fn spawn_worker(id: u32, rx: Receiver<Job>) -> Result<()> {
    thread::Builder::new()
        .name(format!("geostore-worker-{id}"))
        .spawn(move || {
            for job in rx.iter() {
                if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    error!("Worker {id} job panicked, continuing");
                }
            }
            debug!("Worker {id}: queue closed, shutting down");
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn zero_threads_is_an_error() {
        assert!(SharedQueueThreadPool::new(0).is_err());
    }

    #[test]
    fn survives_panicking_jobs() {
        let pool = SharedQueueThreadPool::new(1).unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        pool.spawn(|| panic!("job failure"));
        for _ in 0..4 {
            let done = done.clone();
            pool.spawn(move || {
                done.fetch_add(1, Ordering::SeqCst);
            });
        }

        for _ in 0..100 {
            if done.load(Ordering::SeqCst) == 4 {
                return;
            }
            thread::sleep(Duration::from_millis(20));
        }
        panic!("jobs after a panic were not run");
    }
}
