use failure::{bail, format_err, Fallible};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use workpool::logger::discard;
use workpool::common::BoxedResourceJob;
use workpool::thread_pool::{ResourcePool, ResourceWorker, ThreadPool, Worker};
use workpool::{ErrorKind, PoolConfig, Resource};

/// What the pool did to one session.
#[derive(Default)]
struct Ledger {
    opens: AtomicUsize,
    resets: AtomicUsize,
    commits: AtomicUsize,
    committed_rows: AtomicUsize,
    closes: AtomicUsize,
}

struct Session {
    ledger: Arc<Ledger>,
    pending_rows: usize,
    fail_close: bool,
    panic_on_reset: Arc<AtomicBool>,
}

impl Session {
    fn insert(&mut self) {
        self.pending_rows += 1;
    }
}

impl Resource for Session {
    fn reset(&mut self) -> Fallible<()> {
        if self.panic_on_reset.swap(false, Ordering::SeqCst) {
            panic!("session state corrupted");
        }
        self.ledger.resets.fetch_add(1, Ordering::SeqCst);
        // roll back whatever a failed job left behind
        self.pending_rows = 0;
        Ok(())
    }

    fn commit(&mut self) -> Fallible<()> {
        self.ledger.commits.fetch_add(1, Ordering::SeqCst);
        self.ledger
            .committed_rows
            .fetch_add(self.pending_rows, Ordering::SeqCst);
        self.pending_rows = 0;
        Ok(())
    }

    fn close(self) -> Fallible<()> {
        self.ledger.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            bail!("connection reset by peer");
        }
        Ok(())
    }
}

struct Fixture {
    ledgers: Vec<Arc<Ledger>>,
    panic_on_reset: Arc<AtomicBool>,
}

impl Fixture {
    fn new(size: usize) -> Self {
        Fixture {
            ledgers: (0..size).map(|_| Arc::new(Ledger::default())).collect(),
            panic_on_reset: Arc::new(AtomicBool::new(false)),
        }
    }

    fn pool(&self) -> ResourcePool<Session> {
        self.pool_failing_close(&[])
    }

    fn pool_failing_close(&self, failing: &[usize]) -> ResourcePool<Session> {
        let ledgers = self.ledgers.clone();
        let failing = failing.to_vec();
        let panic_on_reset = self.panic_on_reset.clone();
        let mut next = 0;
        // slots are rebuilt in index order, so slot i always gets ledger i
        let factory = move || -> Fallible<Session> {
            let id = next % ledgers.len();
            next += 1;
            ledgers[id].opens.fetch_add(1, Ordering::SeqCst);
            Ok(Session {
                ledger: ledgers[id].clone(),
                pending_rows: 0,
                fail_close: failing.contains(&id),
                panic_on_reset: panic_on_reset.clone(),
            })
        };
        let config = PoolConfig::with_size(self.ledgers.len()).name("db");
        ResourcePool::with_config(config, discard(), factory, |_, session| {
            ResourceWorker::from(session)
        })
        .unwrap()
    }

    fn total(&self, field: fn(&Ledger) -> &AtomicUsize) -> usize {
        self.ledgers
            .iter()
            .map(|l| field(l).load(Ordering::SeqCst))
            .sum()
    }
}

fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

#[test]
fn commits_once_per_successful_job() {
    let fixture = Fixture::new(3);
    let pool = fixture.pool();

    for _ in 0..30 {
        pool.put(|session: &mut Session| -> Fallible<()> {
            session.insert();
            Ok(())
        });
    }
    pool.join();

    assert_eq!(fixture.total(|l| &l.resets), 30);
    assert_eq!(fixture.total(|l| &l.commits), 30);
    assert_eq!(fixture.total(|l| &l.committed_rows), 30);
    assert_eq!(pool.stats().error_count, 0);
}

#[test]
fn failing_job_is_never_committed() {
    let fixture = Fixture::new(2);
    let pool = fixture.pool();

    for i in 0..12 {
        pool.put(move |session: &mut Session| -> Fallible<()> {
            session.insert();
            if i % 3 == 0 {
                return Err(format_err!("duplicate key"));
            }
            Ok(())
        });
    }
    pool.put(|session: &mut Session| -> Fallible<()> {
        session.insert();
        panic!("constraint violated")
    });
    pool.join();

    assert_eq!(pool.stats().job_total, 13);
    assert_eq!(pool.stats().error_count, 5);
    assert_eq!(fixture.total(|l| &l.resets), 13);
    assert_eq!(fixture.total(|l| &l.commits), 8);
    assert_eq!(fixture.total(|l| &l.committed_rows), 8);
}

#[test]
fn builds_one_resource_per_worker_and_closes_each_once() {
    let fixture = Fixture::new(4);
    let pool = fixture.pool();
    assert_eq!(fixture.total(|l| &l.opens), 4);
    assert_eq!(pool.size(), 4);

    pool.join();
    pool.join();

    assert!(fixture
        .ledgers
        .iter()
        .all(|l| l.closes.load(Ordering::SeqCst) == 1));
    assert_eq!(pool.closed_resources(), 4);
}

#[test]
fn close_failure_does_not_stop_other_closes() {
    let fixture = Fixture::new(3);
    let pool = fixture.pool_failing_close(&[0, 1]);

    pool.join();

    assert_eq!(fixture.total(|l| &l.closes), 3);
    assert_eq!(pool.closed_resources(), 3);
}

#[test]
fn jobs_after_close_fail_without_touching_the_resource() {
    let fixture = Fixture::new(1);
    let pool = fixture.pool();
    pool.join();

    pool.put(|session: &mut Session| -> Fallible<()> {
        session.insert();
        Ok(())
    });
    pool.join();

    assert_eq!(pool.stats().error_count, 1);
    assert_eq!(fixture.total(|l| &l.resets), 0);
}

#[test]
fn resource_factory_failure_closes_created_resources() {
    let closed = Arc::new(Ledger::default());
    let mut created = 0;
    let ledger = closed.clone();
    let factory = move || -> Fallible<Session> {
        if created == 2 {
            bail!("database unreachable");
        }
        created += 1;
        Ok(Session {
            ledger: ledger.clone(),
            pending_rows: 0,
            fail_close: false,
            panic_on_reset: Arc::new(AtomicBool::new(false)),
        })
    };

    let config = PoolConfig::with_size(3);
    let err = ResourcePool::with_config(config, discard(), factory, |_, session| {
        ResourceWorker::from(session)
    })
    .err()
    .unwrap();

    assert!(matches!(err.kind(), ErrorKind::ResourceFactory));
    assert_eq!(closed.closes.load(Ordering::SeqCst), 2);
}

#[test]
fn restarted_worker_keeps_its_resource() {
    let fixture = Fixture::new(1);
    let mut pool = fixture.pool();

    fixture.panic_on_reset.store(true, Ordering::SeqCst);
    pool.put(|session: &mut Session| -> Fallible<()> {
        session.insert();
        Ok(())
    });
    // joining here would close the session
    assert!(wait_for(|| pool.alive_workers() == 0));
    assert_eq!(pool.pending(), 0);
    assert_eq!(pool.stats().error_count, 1);
    assert_eq!(pool.closed_resources(), 0);

    pool.restart().unwrap();
    assert!(pool.is_alive(0));
    pool.put(|session: &mut Session| -> Fallible<()> {
        session.insert();
        Ok(())
    });
    pool.join();

    let ledger = &fixture.ledgers[0];
    assert_eq!(ledger.commits.load(Ordering::SeqCst), 1);
    assert_eq!(ledger.resets.load(Ordering::SeqCst), 1);
    assert_eq!(ledger.closes.load(Ordering::SeqCst), 1);
}

#[test]
fn scope_closes_resources_on_exit() {
    let fixture = Fixture::new(2);
    let mut pool = fixture.pool();

    pool.scope(|pool| -> Fallible<()> {
        for _ in 0..6 {
            pool.put(|session: &mut Session| -> Fallible<()> {
                session.insert();
                Ok(())
            });
        }
        Ok(())
    })
    .unwrap();

    assert_eq!(fixture.total(|l| &l.commits), 6);
    assert_eq!(fixture.total(|l| &l.closes), 2);
}

#[test]
fn consecutive_scopes_both_commit() {
    let fixture = Fixture::new(2);
    let mut pool = fixture.pool();

    for _ in 0..2 {
        pool.scope(|pool| -> Fallible<()> {
            for _ in 0..5 {
                pool.put(|session: &mut Session| -> Fallible<()> {
                    session.insert();
                    Ok(())
                });
            }
            Ok(())
        })
        .unwrap();
    }

    assert_eq!(pool.stats().job_total, 10);
    assert_eq!(pool.stats().error_count, 0);
    assert_eq!(fixture.total(|l| &l.committed_rows), 10);
    assert_eq!(fixture.total(|l| &l.closes), 4);
    assert!(fixture
        .ledgers
        .iter()
        .all(|l| l.opens.load(Ordering::SeqCst) == 2));
}

#[test]
fn restart_after_join_rebuilds_closed_resources() {
    let fixture = Fixture::new(3);
    let mut pool = fixture.pool();
    pool.join();
    assert_eq!(pool.closed_resources(), 3);

    pool.restart().unwrap();
    assert_eq!(pool.closed_resources(), 0);
    assert_eq!(fixture.total(|l| &l.opens), 6);

    pool.put(|session: &mut Session| -> Fallible<()> {
        session.insert();
        Ok(())
    });
    pool.join();
    assert_eq!(pool.stats().error_count, 0);
    assert_eq!(fixture.total(|l| &l.commits), 1);
}

#[test]
fn restart_leaves_open_resources_alone() {
    let fixture = Fixture::new(2);
    let mut pool = fixture.pool();
    pool.restart().unwrap();
    pool.restart().unwrap();
    assert_eq!(fixture.total(|l| &l.opens), 2);
    pool.join();
}

#[test]
fn restart_reports_resource_factory_failure() {
    let mut attempts = 0;
    let factory = move || -> Fallible<Session> {
        attempts += 1;
        if attempts > 1 {
            bail!("database unreachable");
        }
        Ok(Session {
            ledger: Arc::new(Ledger::default()),
            pending_rows: 0,
            fail_close: false,
            panic_on_reset: Arc::new(AtomicBool::new(false)),
        })
    };
    let config = PoolConfig::with_size(1);
    let mut pool = ResourcePool::with_config(config, discard(), factory, |_, session| {
        ResourceWorker::from(session)
    })
    .unwrap();
    pool.join();

    let err = pool.restart().err().unwrap();
    assert!(matches!(err.kind(), ErrorKind::ResourceFactory));
    assert_eq!(pool.closed_resources(), 1);
}

// wraps the stock worker, counting the jobs it sees
struct Counting {
    inner: ResourceWorker<Session>,
    seen: Arc<AtomicUsize>,
}

impl Worker for Counting {
    type Job = BoxedResourceJob<Session>;

    fn execute(&mut self, job: BoxedResourceJob<Session>) -> Fallible<()> {
        self.seen.fetch_add(1, Ordering::SeqCst);
        self.inner.execute(job)
    }
}

#[test]
fn custom_worker_wraps_the_resource_worker() {
    let ledger = Arc::new(Ledger::default());
    let seen = Arc::new(AtomicUsize::new(0));
    let factory = {
        let ledger = ledger.clone();
        move || -> Fallible<Session> {
            Ok(Session {
                ledger: ledger.clone(),
                pending_rows: 0,
                fail_close: false,
                panic_on_reset: Arc::new(AtomicBool::new(false)),
            })
        }
    };
    let counter = seen.clone();
    let config = PoolConfig::with_size(2);
    let pool = ResourcePool::with_config(config, discard(), factory, move |_, session| {
        Counting {
            inner: ResourceWorker::from(session),
            seen: counter.clone(),
        }
    })
    .unwrap();

    for _ in 0..8 {
        pool.put(|session: &mut Session| -> Fallible<()> {
            session.insert();
            Ok(())
        });
    }
    pool.join();

    assert_eq!(seen.load(Ordering::SeqCst), 8);
    assert_eq!(ledger.commits.load(Ordering::SeqCst), 8);
    assert_eq!(ledger.closes.load(Ordering::SeqCst), 2);
}
