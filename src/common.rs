use failure::Fallible;

/// A unit of work executed by a plain worker.
///
/// Every `FnOnce() -> Fallible<()>` closure is a job. Types that carry their
/// own state can implement `run` directly:
///
/// ```
/// use failure::Fallible;
/// use workpool::common::Job;
///
/// struct Greet(String);
///
/// impl Job for Greet {
///     fn run(self: Box<Self>) -> Fallible<()> {
///         println!("hello {}", self.0);
///         Ok(())
///     }
/// }
/// ```
///
/// Returning `Err` or panicking marks the job as failed.
pub trait Job: Send + 'static {
    fn run(self: Box<Self>) -> Fallible<()>;
}

impl<F> Job for F
where
    F: FnOnce() -> Fallible<()> + Send + 'static,
{
    fn run(self: Box<Self>) -> Fallible<()> {
        (*self)()
    }
}

pub type BoxedJob = Box<dyn Job>;

/// A unit of work that borrows the resource of the worker running it.
///
/// Closures need an explicit `&mut R` argument type to be accepted, e.g.
/// `|conn: &mut Conn| -> Fallible<()> { ... }`. The resource must not be kept
/// past the end of `run`.
pub trait ResourceJob<R>: Send + 'static {
    fn run(self: Box<Self>, resource: &mut R) -> Fallible<()>;
}

impl<R, F> ResourceJob<R> for F
where
    F: FnOnce(&mut R) -> Fallible<()> + Send + 'static,
{
    fn run(self: Box<Self>, resource: &mut R) -> Fallible<()> {
        (*self)(resource)
    }
}

pub type BoxedResourceJob<R> = Box<dyn ResourceJob<R>>;

/// A long-lived handle bound to a single worker, such as a database session.
pub trait Resource: Send + 'static {
    /// Called before every job. Drops cached state and anything a failed job
    /// left uncommitted.
    fn reset(&mut self) -> Fallible<()>;

    /// Called after every job that succeeded.
    fn commit(&mut self) -> Fallible<()>;

    /// Called once when the owning pool drains.
    fn close(self) -> Fallible<()>
    where
        Self: Sized;
}
