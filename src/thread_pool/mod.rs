use crate::error::{Error, Result};
use slog::Logger;
use std::fmt::Display;

mod pool;
pub mod queue;
mod resource;
mod supervisor;
pub mod worker;

pub use pool::Pool;
pub use queue::JobQueue;
pub use resource::{ResourcePool, ResourceWorker, SharedResource};
pub use worker::{JobWorker, Worker};

pub enum Message<J> {
    Work(J),
    Terminate,
}

/// Operations every pool flavour shares.
pub trait ThreadPool {
    /// Respawns every worker whose thread has died.
    fn restart(&mut self) -> Result<&mut Self>;

    /// Blocks until every submitted job has been marked done.
    fn join(&self);

    fn stats(&self) -> PoolStats;

    fn alive_workers(&self) -> usize;

    fn logger(&self) -> &Logger;

    /// Runs `f` against the pool after reviving dead workers and drains the
    /// pool on every way out of `f`, unwinding included. An error returned by
    /// `f` is logged and handed back once the pool has drained.
    fn scope<T, E, F>(&mut self, f: F) -> std::result::Result<T, E>
    where
        Self: Sized,
        F: FnOnce(&Self) -> std::result::Result<T, E>,
        E: From<Error> + Display,
    {
        self.restart()?;
        let pool = &*self;
        let result = {
            let _drain = JoinOnExit(pool);
            f(pool)
        };
        if let Err(ref err) = result {
            error!(pool.logger(), "error inside pool scope"; "error" => %err);
        }
        result
    }
}

struct JoinOnExit<'a, P: ThreadPool>(&'a P);

impl<P: ThreadPool> Drop for JoinOnExit<'_, P> {
    fn drop(&mut self) {
        self.0.join();
    }
}

/// Running totals of a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Jobs ever submitted.
    pub job_total: usize,
    /// Jobs whose execution failed.
    pub error_count: usize,
}

impl PoolStats {
    /// `1.0` while nothing was submitted or nothing failed, otherwise the
    /// fraction of submitted jobs that failed.
    pub fn health(&self) -> f64 {
        if self.job_total == 0 || self.error_count == 0 {
            return 1.0;
        }
        self.error_count as f64 / self.job_total as f64
    }
}
