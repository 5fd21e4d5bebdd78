//! A fixed-size pool of worker threads fed by one FIFO job queue.
//!
//! A failing job is logged and counted, it never takes a worker down. Pools
//! built with a resource factory give every worker its own long-lived
//! resource and wrap each job in a reset / commit cycle on it.

#[macro_use]
extern crate slog;

pub mod common;
pub mod config;
pub mod error;
pub mod logger;
pub mod thread_pool;

pub use common::{Job, Resource, ResourceJob};
pub use config::PoolConfig;
pub use error::{Error, ErrorKind, Result};
pub use thread_pool::{Pool, PoolStats, ResourcePool, ThreadPool};
