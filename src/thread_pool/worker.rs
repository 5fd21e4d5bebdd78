use super::pool::PoolState;
use crate::common::BoxedJob;
use crate::error::ErrorKind;
use failure::Fallible;
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Executes the jobs one worker thread pulls from the queue.
///
/// An `Err` from `execute` is a failed job: it is logged and counted and the
/// worker moves on. A panic escaping `execute` kills the worker thread until
/// the pool is restarted, so implementations should run untrusted code
/// through a panic guard the way [`JobWorker`] does.
pub trait Worker: Send + 'static {
    type Job: Send + 'static;

    fn execute(&mut self, job: Self::Job) -> Fallible<()>;
}

/// The default worker, runs boxed [`Job`](crate::common::Job)s.
#[derive(Debug, Default, Clone, Copy)]
pub struct JobWorker;

impl Worker for JobWorker {
    type Job = BoxedJob;

    fn execute(&mut self, job: BoxedJob) -> Fallible<()> {
        guarded(|| job.run())
    }
}

/// Runs `f`, turning a panic into a `JobPanicked` error.
pub fn guarded<F>(f: F) -> Fallible<()>
where
    F: FnOnce() -> Fallible<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(ErrorKind::JobPanicked(panic_message(&*payload)).into()),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

pub(crate) fn spawn<W: Worker>(
    name: String,
    id: usize,
    worker: W,
    state: Arc<PoolState<W::Job>>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new().name(name).spawn(move || work(id, worker, state))
}

// the worker loop, left only when the pool is dropped
fn work<W: Worker>(id: usize, mut worker: W, state: Arc<PoolState<W::Job>>) {
    let logger = state.logger.new(o!("worker" => id));
    debug!(logger, "worker started");

    while let Some(job) = state.queue.dequeue() {
        let _done = Completion {
            state: &state,
            logger: &logger,
        };
        if let Err(err) = worker.execute(job) {
            state.record_failure();
            let causes: Vec<String> = err.iter_chain().map(|c| c.to_string()).collect();
            error!(logger, "job raised error";
                "error" => causes.join(": "),
                "backtrace" => %err.backtrace()
            );
        }
    }

    debug!(logger, "worker stopped");
}

// marks the current job done even while the worker unwinds
struct Completion<'a, J> {
    state: &'a PoolState<J>,
    logger: &'a slog::Logger,
}

impl<J> Drop for Completion<'_, J> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.state.record_failure();
            crit!(self.logger, "worker died while running a job");
        }
        if let Err(err) = self.state.queue.mark_done() {
            error!(self.logger, "unable to mark job done"; "error" => %err);
        }
    }
}
