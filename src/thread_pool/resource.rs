use super::worker::{guarded, Worker};
use super::{Pool, PoolStats, ThreadPool};
use crate::common::{BoxedResourceJob, Resource, ResourceJob};
use crate::config::PoolConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::logger::default_logger;
use failure::Fallible;
use slog::Logger;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The slot holding one worker's resource.
///
/// Only the owning worker touches it while jobs run; the pool takes the
/// resource out to close it once the queue has drained and puts a fresh one
/// back on restart. Holders outside the crate can only query its status:
///
/// ```compile_fail
/// use workpool::thread_pool::SharedResource;
///
/// let slot = SharedResource::new(String::from("session"));
/// slot.lock();
/// ```
pub struct SharedResource<R> {
    slot: Arc<Mutex<Option<R>>>,
}

impl<R> SharedResource<R> {
    pub fn new(resource: R) -> Self {
        SharedResource {
            slot: Arc::new(Mutex::new(Some(resource))),
        }
    }

    /// Locks the slot. A worker that died while holding the lock leaves the
    /// resource to the next worker as it was.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Option<R>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().is_none()
    }
}

impl<R: Resource> SharedResource<R> {
    /// Closes the resource unless that already happened.
    pub(crate) fn close(&self) -> Option<Fallible<()>> {
        let resource = self.lock().take()?;
        Some(guarded(move || resource.close()))
    }

    // hands a closed slot a new resource, an open one keeps its own
    fn reopen<F>(&self, factory: F) -> Fallible<bool>
    where
        F: FnOnce() -> Fallible<R>,
    {
        let mut slot = self.lock();
        if slot.is_some() {
            return Ok(false);
        }
        *slot = Some(factory()?);
        Ok(true)
    }
}

impl<R> Clone for SharedResource<R> {
    fn clone(&self) -> Self {
        SharedResource {
            slot: self.slot.clone(),
        }
    }
}

/// Runs every job inside a transaction on the worker's own resource.
pub struct ResourceWorker<R> {
    resource: SharedResource<R>,
}

impl<R: Resource> From<SharedResource<R>> for ResourceWorker<R> {
    fn from(resource: SharedResource<R>) -> Self {
        ResourceWorker { resource }
    }
}

impl<R: Resource> Worker for ResourceWorker<R> {
    type Job = BoxedResourceJob<R>;

    fn execute(&mut self, job: BoxedResourceJob<R>) -> Fallible<()> {
        let mut slot = self.resource.lock();
        let resource = slot.as_mut().ok_or(ErrorKind::ResourceClosed)?;
        resource.reset()?;
        guarded(|| job.run(resource))?;
        resource.commit()
    }
}

/// A pool whose workers each own one resource built by a factory.
///
/// `join` closes every resource; `restart` (and so every `scope` entry)
/// builds new ones for the closed slots.
pub struct ResourcePool<R, W = ResourceWorker<R>>
where
    R: Resource,
    W: Worker<Job = BoxedResourceJob<R>>,
{
    pool: Pool<W>,
    resources: Vec<SharedResource<R>>,
    factory: Mutex<BoxedFactory<R>>,
}

type BoxedFactory<R> = Box<dyn FnMut() -> Fallible<R> + Send>;

impl<R: Resource> ResourcePool<R> {
    pub fn new<F>(size: usize, resource_factory: F) -> Result<Self>
    where
        F: FnMut() -> Fallible<R> + Send + 'static,
    {
        ResourcePool::with_config(
            PoolConfig::with_size(size),
            default_logger(),
            resource_factory,
            |_, resource| ResourceWorker::from(resource),
        )
    }
}

impl<R, W> ResourcePool<R, W>
where
    R: Resource,
    W: Worker<Job = BoxedResourceJob<R>>,
{
    pub fn with_config<F, G>(
        config: PoolConfig,
        logger: Logger,
        mut resource_factory: F,
        worker_factory: G,
    ) -> Result<Self>
    where
        F: FnMut() -> Fallible<R> + Send + 'static,
        G: Fn(usize, SharedResource<R>) -> W + Send + Sync + 'static,
    {
        config.validate()?;
        let mut resources = Vec::with_capacity(config.size);
        for _ in 0..config.size {
            match resource_factory() {
                Ok(resource) => resources.push(SharedResource::new(resource)),
                Err(err) => {
                    close_all(&logger, &resources);
                    return Err(Error::from(err.context(ErrorKind::ResourceFactory)));
                }
            }
        }

        let slots = resources.clone();
        let pool = Pool::with_config(config, logger.clone(), move |id| {
            worker_factory(id, slots[id].clone())
        });
        match pool {
            Ok(pool) => Ok(ResourcePool {
                pool,
                resources,
                factory: Mutex::new(Box::new(resource_factory)),
            }),
            Err(err) => {
                close_all(&logger, &resources);
                Err(err)
            }
        }
    }

    pub fn put<J: ResourceJob<R>>(&self, job: J) {
        self.pool.submit(Box::new(job));
    }

    /// Slots whose resource was closed by `join` and not rebuilt yet.
    pub fn closed_resources(&self) -> usize {
        self.resources.iter().filter(|r| r.is_closed()).count()
    }

    pub fn is_alive(&self, id: usize) -> bool {
        self.pool.is_alive(id)
    }

    pub fn size(&self) -> usize {
        self.pool.size()
    }

    pub fn pending(&self) -> usize {
        self.pool.pending()
    }
}

impl<R, W> ThreadPool for ResourcePool<R, W>
where
    R: Resource,
    W: Worker<Job = BoxedResourceJob<R>>,
{
    /// Rebuilds closed resources, then revives dead workers.
    fn restart(&mut self) -> Result<&mut Self> {
        let factory = self
            .factory
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for (id, resource) in self.resources.iter().enumerate() {
            let reopened = resource
                .reopen(|| factory())
                .map_err(|err| Error::from(err.context(ErrorKind::ResourceFactory)))?;
            if reopened {
                debug!(self.pool.logger(), "rebuilt worker resource"; "worker" => id);
            }
        }
        self.pool.restart()?;
        Ok(self)
    }

    /// Drains the queue, then closes every worker resource.
    fn join(&self) {
        self.pool.join();
        close_all(self.pool.logger(), &self.resources);
    }

    fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    fn alive_workers(&self) -> usize {
        self.pool.alive_workers()
    }

    fn logger(&self) -> &Logger {
        self.pool.logger()
    }
}

// best effort, one failing close does not stop the others
fn close_all<R: Resource>(logger: &Logger, resources: &[SharedResource<R>]) {
    for (id, resource) in resources.iter().enumerate() {
        if let Some(Err(err)) = resource.close() {
            error!(logger, "unable to close worker resource"; "worker" => id, "error" => %err);
        }
    }
}
