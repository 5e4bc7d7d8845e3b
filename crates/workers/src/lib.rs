//! A fixed pool of worker threads draining a FIFO queue of jobs.
//!
//! Every worker owns a [`DefaultRng`] seeded from its own thread identity, and lends it to the
//! jobs it runs. Jobs never share a generator.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use realms_rng::DefaultRng;

mod batch;
use batch::Batch;

/// A unit of work submitted to a [`WorkerPool`].
pub type Job = Box<dyn FnOnce(&mut DefaultRng) + Send + 'static>;

/// The state shared between the pool and its worker threads.
struct Shared {
    /// The jobs that have been submitted but not yet taken by a worker.
    queue: Mutex<VecDeque<Job>>,
    /// Notified whenever a job is pushed to `queue`, and when the pool stops.
    condvar: Condvar,
    /// Whether the pool has been requested to stop.
    stop_requested: AtomicBool,
}

impl Shared {
    /// Returns whether the pool has been requested to stop.
    #[inline]
    fn should_stop(&self) -> bool {
        self.stop_requested.load(Relaxed)
    }

    /// Fetches the next job to execute.
    ///
    /// Blocks until a job is available. Returns `None` once the pool has been requested to stop,
    /// even if jobs remain in the queue.
    fn fetch_job(&self) -> Option<Job> {
        let mut lock = self.queue.lock();

        loop {
            if self.should_stop() {
                return None;
            }

            match lock.pop_front() {
                Some(job) => return Some(job),
                None => self.condvar.wait(&mut lock),
            }
        }
    }
}

/// Returns the number of worker threads to spawn for this machine.
///
/// One hardware thread is left to the main thread. On single-core machines, or when the
/// available parallelism is unknown, this is `0` and the pool runs every job on the caller.
pub fn available_workers() -> usize {
    std::thread::available_parallelism()
        .map_or(1, NonZeroUsize::get)
        .saturating_sub(1)
}

/// Manages a fixed set of worker threads.
pub struct WorkerPool {
    /// The state shared with the worker threads.
    shared: Arc<Shared>,
    /// The worker threads, joined when the pool is dropped.
    handles: Vec<JoinHandle<()>>,
    /// The generator used when the pool has no threads and runs jobs on the caller.
    serial_rng: Mutex<DefaultRng>,
}

impl WorkerPool {
    /// Creates a new [`WorkerPool`] with `count` worker threads.
    ///
    /// A `count` of zero creates a serial pool: jobs run on the submitting thread.
    pub fn new(count: usize) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            stop_requested: AtomicBool::new(false),
        });

        let mut handles = Vec::with_capacity(count);
        for index in 0..count {
            let shared = shared.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("realms-worker-{index}"))
                .spawn(move || worker_thread(shared));

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => realms_log::error!("failed to spawn worker thread #{index}: {err}"),
            }
        }

        realms_log::trace!("started a worker pool with {} threads", handles.len());

        Self {
            shared,
            handles,
            serial_rng: Mutex::new(realms_rng::thread_rng()),
        }
    }

    /// Creates a new [`WorkerPool`] sized with [`available_workers`].
    #[inline]
    pub fn with_available_parallelism() -> Self {
        Self::new(available_workers())
    }

    /// Returns the number of running worker threads.
    ///
    /// `0` means jobs run on the submitting thread.
    #[inline]
    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Returns the number of jobs waiting for a worker.
    #[inline]
    pub fn pending_jobs(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Submits a job to the pool.
    ///
    /// # Remarks
    ///
    /// On a serial pool, the job runs before this function returns. A job must not submit
    /// other jobs to the pool that runs it.
    pub fn submit(&self, job: impl FnOnce(&mut DefaultRng) + Send + 'static) {
        if self.handles.is_empty() {
            job(&mut self.serial_rng.lock());
            return;
        }

        self.shared.queue.lock().push_back(Box::new(job));
        self.shared.condvar.notify_one();
    }

    /// Runs every provided job on the pool and blocks until all of them are done.
    ///
    /// The outputs are returned in submission order, regardless of which job finished first.
    ///
    /// # Panics
    ///
    /// Panics if one of the jobs panicked.
    pub fn run_batch<F, O>(&self, jobs: impl IntoIterator<Item = F>) -> Vec<O>
    where
        F: FnOnce(&mut DefaultRng) -> O + Send + 'static,
        O: Send + 'static,
    {
        let jobs: Vec<F> = jobs.into_iter().collect();
        let batch = Arc::new(Batch::new(jobs.len()));

        for (index, job) in jobs.into_iter().enumerate() {
            let batch = batch.clone();
            self.submit(move |rng| {
                let slot = batch.slot(index);
                slot.fill(job(rng));
            });
        }

        batch.wait()
    }

    /// Stops the pool and joins all worker threads.
    ///
    /// Jobs that are currently running are finished. Jobs still queued are dropped without
    /// being run.
    #[inline]
    pub fn shutdown(self) {
        drop(self);
    }

    /// Requests the worker threads to stop.
    fn stop(&self) {
        // The flag is raised under the queue lock so that no worker can miss the wakeup between
        // its check and its wait.
        let lock = self.shared.queue.lock();
        self.shared.stop_requested.store(true, Relaxed);
        drop(lock);

        self.shared.condvar.notify_all();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();

        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                realms_log::error!("a worker thread panicked during shutdown");
            }
        }

        let dropped = self.shared.queue.lock().len();
        if dropped != 0 {
            realms_log::trace!("dropped {dropped} queued jobs on shutdown");
        }
    }
}

/// Runs a worker thread until the pool is requested to stop.
fn worker_thread(shared: Arc<Shared>) {
    let mut rng = realms_rng::thread_rng();

    while let Some(job) = shared.fetch_job() {
        if catch_unwind(AssertUnwindSafe(|| job(&mut rng))).is_err() {
            realms_log::error!("a job panicked on a worker thread");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Duration;

    use realms_rng::Rng;

    use super::*;

    #[test]
    fn batch_outputs_keep_submission_order() {
        for workers in [0, 1, 4] {
            let pool = WorkerPool::new(workers);
            let out = pool.run_batch((0..32u32).map(|i| move |_: &mut DefaultRng| i * 2));
            assert_eq!(out, (0..32u32).map(|i| i * 2).collect::<Vec<_>>());
        }
    }

    #[test]
    fn serial_pool_runs_on_the_caller() {
        let pool = WorkerPool::new(0);
        assert_eq!(pool.worker_count(), 0);

        let caller = std::thread::current().id();
        let out = pool.run_batch([move |_: &mut DefaultRng| std::thread::current().id() == caller]);
        assert_eq!(out, vec![true]);
    }

    #[test]
    fn workers_have_their_own_generators() {
        let pool = WorkerPool::new(2);
        let (tx, rx) = mpsc::channel();
        let barrier = Arc::new(std::sync::Barrier::new(2));

        // Both jobs are held until the two workers have each taken one.
        for _ in 0..2 {
            let tx = tx.clone();
            let barrier = barrier.clone();
            pool.submit(move |rng| {
                barrier.wait();
                let _ = tx.send((std::thread::current().id(), rng.next_u64()));
            });
        }

        let a = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let b = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_ne!(a.0, b.0);
        assert_ne!(a.1, b.1);
    }

    #[test]
    fn queued_jobs_are_dropped_on_shutdown() {
        let pool = WorkerPool::new(1);
        let ran = Arc::new(AtomicUsize::new(0));
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        // Keep the only worker busy.
        {
            let ran = ran.clone();
            pool.submit(move |_| {
                let _ = started_tx.send(());
                let _ = release_rx.recv();
                ran.fetch_add(1, Relaxed);
            });
        }
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        for _ in 0..8 {
            let ran = ran.clone();
            pool.submit(move |_| {
                ran.fetch_add(1, Relaxed);
            });
        }
        assert_eq!(pool.pending_jobs(), 8);

        // Release the running job once the stop flag is raised.
        let releaser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            let _ = release_tx.send(());
        });
        pool.shutdown();
        releaser.join().unwrap();

        assert_eq!(ran.load(Relaxed), 1);
    }

    #[test]
    fn panicking_job_does_not_kill_the_worker() {
        let pool = WorkerPool::new(1);
        pool.submit(|_| panic!("boom"));
        let out = pool.run_batch([|_: &mut DefaultRng| 5]);
        assert_eq!(out, vec![5]);
    }
}
