// Contention harness - many workers, one key, one shared counter

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::time::{sleep, Instant};

use crate::prelude::*;
use crate::util::duration_ms;

/// What to run and how hard to contend
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub workers: usize,
    pub key: String,
    /// Simulated work inside the critical section
    pub hold: Duration,
    pub lock: LockOptions,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            key: DEFAULT_KEY.to_string(),
            hold: Duration::from_millis(DEFAULT_HOLD_MS),
            lock: LockOptions::default(),
        }
    }
}

/// How a single worker's run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerOutcome {
    Completed { release: ReleaseOutcome },
    /// The section ran but giving the lease back failed
    ReleaseFailed { message: String },
    TimedOut,
    StoreError { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerReport {
    pub worker: usize,
    pub outcome: WorkerOutcome,
}

/// One pass through the critical section, offsets measured from run start
#[derive(Debug, Clone, Serialize)]
pub struct SectionEvent {
    pub worker: usize,
    pub entered: Duration,
    pub exited: Duration,
    /// Counter value read on entry
    pub seen: u64,
    /// Counter value after this worker's increment
    pub after: u64,
}

impl SectionEvent {
    fn overlaps(&self, other: &SectionEvent) -> bool {
        self.entered < other.exited && other.entered < self.exited
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HarnessReport {
    pub workers: usize,
    pub counter: u64,
    pub outcomes: Vec<WorkerReport>,
    pub events: Vec<SectionEvent>,
}

impl HarnessReport {
    /// Workers whose critical section ran to the end
    pub fn completed(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                WorkerOutcome::Completed { .. } | WorkerOutcome::ReleaseFailed { .. }
            )
        })
    }

    pub fn release_failures(&self) -> usize {
        self.count(|o| matches!(o, WorkerOutcome::ReleaseFailed { .. }))
    }

    pub fn timed_out(&self) -> usize {
        self.count(|o| matches!(o, WorkerOutcome::TimedOut))
    }

    pub fn store_errors(&self) -> usize {
        self.count(|o| matches!(o, WorkerOutcome::StoreError { .. }))
    }

    /// Workers whose lease lapsed before they released it
    pub fn already_gone(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                WorkerOutcome::Completed {
                    release: ReleaseOutcome::AlreadyGone
                }
            )
        })
    }

    /// Largest number of workers inside the critical section at one instant.
    pub fn max_overlap(&self) -> usize {
        self.events
            .iter()
            .map(|event| {
                self.events
                    .iter()
                    .filter(|other| other.entered <= event.entered && event.entered < other.exited)
                    .count()
            })
            .max()
            .unwrap_or(0)
    }

    /// No two sections overlapped and each one, in entry order, saw the
    /// value its predecessor left behind.
    pub fn is_serialized(&self) -> bool {
        let no_overlap = self.events.iter().enumerate().all(|(i, a)| {
            self.events[i + 1..].iter().all(|b| !a.overlaps(b))
        });
        no_overlap && self.events.windows(2).all(|pair| pair[1].seen == pair[0].after)
    }

    /// Fail if the run shows the lock let two holders in.
    ///
    /// Overlap is tolerated only when some lease expired inside its section,
    /// since the ttl then no longer covers the work.
    pub fn verify(&self) -> Result<()> {
        let sections = self.events.len() as u64;
        if self.counter != sections || self.completed() != self.events.len() {
            bail!(
                "counter is {} after {sections} critical sections and {} completed workers",
                self.counter,
                self.completed()
            );
        }
        if !self.is_serialized() && self.already_gone() == 0 {
            bail!(
                "critical sections overlapped (max {} at once) with every lease still live",
                self.max_overlap()
            );
        }
        Ok(())
    }

    fn count(&self, pred: impl Fn(&WorkerOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|r| pred(&r.outcome)).count()
    }
}

/// Drives `workers` concurrent tasks through acquire, work, increment,
/// release on the same key.
///
/// Workers share nothing but the lock manager's store and the counter the
/// caller hands in.
#[derive(Debug, Clone)]
pub struct ContentionHarness {
    locks: LockManager,
    config: HarnessConfig,
}

impl ContentionHarness {
    pub fn new(locks: LockManager, config: HarnessConfig) -> Result<Self> {
        if config.workers == 0 {
            bail!("harness needs at least one worker");
        }
        config.lock.validate()?;
        Ok(Self { locks, config })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub async fn run(&self, counter: Arc<AtomicU64>) -> Result<HarnessReport> {
        let started = Instant::now();
        let events = Arc::new(Mutex::new(Vec::with_capacity(self.config.workers)));

        info!(
            workers = self.config.workers,
            key = %self.config.key,
            "launching concurrent workers"
        );

        let tasks = (1..=self.config.workers).map(|worker| {
            let locks = self.locks.clone();
            let config = self.config.clone();
            let counter = Arc::clone(&counter);
            let events = Arc::clone(&events);
            tokio::spawn(async move {
                let outcome = run_worker(worker, &locks, &config, &counter, &events, started).await;
                WorkerReport { worker, outcome }
            })
        });

        let mut outcomes = Vec::with_capacity(self.config.workers);
        for joined in join_all(tasks).await {
            outcomes.push(joined.context("worker task panicked")?);
        }

        let mut events = std::mem::take(&mut *events.lock());
        events.sort_by_key(|e| e.entered);

        let report = HarnessReport {
            workers: self.config.workers,
            counter: counter.load(Ordering::SeqCst),
            outcomes,
            events,
        };
        info!(
            counter = report.counter,
            completed = report.completed(),
            timed_out = report.timed_out(),
            store_errors = report.store_errors(),
            "contention run finished"
        );
        Ok(report)
    }
}

async fn run_worker(
    worker: usize,
    locks: &LockManager,
    config: &HarnessConfig,
    counter: &AtomicU64,
    events: &Mutex<Vec<SectionEvent>>,
    started: Instant,
) -> WorkerOutcome {
    debug!(worker, "attempting to enter critical section");

    let section = async {
        let entered = started.elapsed();
        let seen = counter.load(Ordering::SeqCst);
        info!(worker, counter = seen, "inside critical section");

        sleep(config.hold).await;
        let after = counter.fetch_add(1, Ordering::SeqCst) + 1;
        info!(worker, counter = after, "updated counter");

        events.lock().push(SectionEvent {
            worker,
            entered,
            exited: started.elapsed(),
            seen,
            after,
        });
    };

    match locks
        .run_exclusive_with(&config.key, config.lock, section)
        .await
    {
        Ok(((), Ok(release))) => WorkerOutcome::Completed { release },
        Ok(((), Err(err))) => {
            error!(worker, error = %err, "critical section finished but release failed");
            WorkerOutcome::ReleaseFailed {
                message: err.to_string(),
            }
        }
        Err(lease::Error::AcquisitionTimeout { waited, .. }) => {
            warn!(worker, waited_ms = duration_ms(waited), "worker skipped due to lock timeout");
            WorkerOutcome::TimedOut
        }
        Err(err) => {
            error!(worker, error = %err, "worker could not use the lease store");
            WorkerOutcome::StoreError {
                message: err.to_string(),
            }
        }
    }
}
