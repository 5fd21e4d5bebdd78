use super::supervisor::Supervisor;
use super::{JobQueue, JobWorker, PoolStats, ThreadPool, Worker};
use crate::common::{BoxedJob, Job};
use crate::config::PoolConfig;
use crate::error::Result;
use crate::logger::default_logger;
use slog::Logger;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// State shared between a pool and its worker threads.
pub(crate) struct PoolState<J> {
    pub queue: JobQueue<J>,
    pub logger: Logger,
    job_total: AtomicUsize,
    error_count: AtomicUsize,
}

impl<J> PoolState<J> {
    fn new(logger: Logger) -> Self {
        PoolState {
            queue: JobQueue::new(),
            logger,
            job_total: AtomicUsize::new(0),
            error_count: AtomicUsize::new(0),
        }
    }

    pub fn record_failure(&self) {
        self.error_count.fetch_add(1, Ordering::SeqCst);
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            job_total: self.job_total.load(Ordering::SeqCst),
            error_count: self.error_count.load(Ordering::SeqCst),
        }
    }
}

/// A fixed set of worker threads fed by one job queue.
///
/// ```
/// use failure::Fallible;
/// use workpool::thread_pool::{Pool, ThreadPool};
///
/// let pool = Pool::new(3).unwrap();
/// for _ in 0..10 {
///     pool.put(|| -> Fallible<()> { Ok(()) });
/// }
/// pool.join();
/// assert_eq!(pool.stats().job_total, 10);
/// ```
pub struct Pool<W: Worker = JobWorker> {
    state: Arc<PoolState<W::Job>>,
    supervisor: Supervisor<W>,
}

impl Pool {
    /// A pool of `size` plain workers logging to the terminal.
    pub fn new(size: usize) -> Result<Self> {
        Pool::with_config(PoolConfig::with_size(size), default_logger(), |_| JobWorker)
    }
}

impl<W: Worker> Pool<W> {
    /// A pool whose workers are built by `factory`, called with the worker index.
    pub fn with_factory<F>(size: usize, factory: F) -> Result<Self>
    where
        F: Fn(usize) -> W + Send + Sync + 'static,
    {
        Pool::with_config(PoolConfig::with_size(size), default_logger(), factory)
    }

    pub fn with_config<F>(config: PoolConfig, logger: Logger, factory: F) -> Result<Self>
    where
        F: Fn(usize) -> W + Send + Sync + 'static,
    {
        config.validate()?;
        let logger = logger.new(o!("pool" => config.name.clone()));
        let state = Arc::new(PoolState::new(logger));
        let supervisor =
            Supervisor::new(config.name, config.size, Box::new(factory), state.clone())?;
        info!(state.logger, "pool started"; "size" => config.size);
        Ok(Pool { state, supervisor })
    }

    /// Queues a job for whichever worker is free first. Never blocks.
    pub fn submit(&self, job: W::Job) {
        self.state.job_total.fetch_add(1, Ordering::SeqCst);
        self.state.queue.enqueue(job);
    }

    pub fn is_alive(&self, id: usize) -> bool {
        self.supervisor.is_alive(id)
    }

    pub fn size(&self) -> usize {
        self.supervisor.size()
    }

    /// Jobs queued or running that have not completed yet.
    pub fn pending(&self) -> usize {
        self.state.queue.unfinished()
    }
}

impl<W: Worker<Job = BoxedJob>> Pool<W> {
    pub fn put<J: Job>(&self, job: J) {
        self.submit(Box::new(job));
    }
}

impl<W: Worker> ThreadPool for Pool<W> {
    fn restart(&mut self) -> Result<&mut Self> {
        let revived = self.supervisor.revive()?;
        if revived > 0 {
            info!(self.state.logger, "pool restarted"; "revived" => revived);
        }
        Ok(self)
    }

    fn join(&self) {
        self.state.queue.join();
        let stats = self.stats();
        info!(self.state.logger, "{} job errors occurred", stats.error_count;
            "jobs" => stats.job_total,
            "health" => format!("{:.2}%", stats.health() * 100.0)
        );
    }

    fn stats(&self) -> PoolStats {
        self.state.stats()
    }

    fn alive_workers(&self) -> usize {
        self.supervisor.alive()
    }

    fn logger(&self) -> &Logger {
        &self.state.logger
    }
}

// destroy threads when pool is dead
impl<W: Worker> Drop for Pool<W> {
    fn drop(&mut self) {
        self.state.queue.terminate(self.supervisor.size());
    }
}
