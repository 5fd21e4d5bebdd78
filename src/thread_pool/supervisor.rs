use super::pool::PoolState;
use super::worker::{self, panic_message, Worker};
use crate::error::Result;
use std::mem;
use std::sync::Arc;
use std::thread::JoinHandle;

pub(crate) type WorkerFactory<W> = Box<dyn Fn(usize) -> W + Send + Sync>;

struct WorkerHandle {
    id: usize,
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    fn is_alive(&self) -> bool {
        !self.thread.is_finished()
    }
}

/// It supervises workers
pub(crate) struct Supervisor<W: Worker> {
    name: String,
    workers: Vec<WorkerHandle>,
    factory: WorkerFactory<W>,
    state: Arc<PoolState<W::Job>>,
}

impl<W: Worker> Supervisor<W> {
    pub fn new(
        name: String,
        size: usize,
        factory: WorkerFactory<W>,
        state: Arc<PoolState<W::Job>>,
    ) -> Result<Self> {
        let mut supervisor = Supervisor {
            name,
            workers: Vec::with_capacity(size),
            factory,
            state,
        };
        for id in 0..size {
            match supervisor.spawn(id) {
                Ok(handle) => supervisor.workers.push(handle),
                Err(err) => {
                    // stop the threads that did start
                    supervisor.state.queue.terminate(supervisor.workers.len());
                    return Err(err);
                }
            }
        }
        Ok(supervisor)
    }

    fn spawn(&self, id: usize) -> Result<WorkerHandle> {
        let worker = (self.factory)(id);
        let name = format!("{}-{}", self.name, id);
        let thread = worker::spawn(name, id, worker, self.state.clone())?;
        Ok(WorkerHandle { id, thread })
    }

    /// Replaces every dead worker in place and returns how many were revived.
    pub fn revive(&mut self) -> Result<usize> {
        let mut revived = 0;
        for index in 0..self.workers.len() {
            if self.workers[index].is_alive() {
                continue;
            }
            let id = self.workers[index].id;
            let handle = self.spawn(id)?;
            let dead = mem::replace(&mut self.workers[index], handle);
            let reason = match dead.thread.join() {
                Ok(()) => "worker loop exited".to_string(),
                Err(payload) => panic_message(&*payload),
            };
            warn!(self.state.logger, "restarted dead worker"; "worker" => id, "reason" => reason);
            revived += 1;
        }
        Ok(revived)
    }

    pub fn is_alive(&self, id: usize) -> bool {
        self.workers.get(id).map_or(false, WorkerHandle::is_alive)
    }

    pub fn alive(&self) -> usize {
        self.workers.iter().filter(|w| w.is_alive()).count()
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }
}
