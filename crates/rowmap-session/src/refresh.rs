//! Strategies for refreshing every registered type.
//!
//! `EntityStore::refresh_all` builds one [`RefreshTask`] per registered type
//! and hands them to a [`RefreshStrategy`], which decides how they run. Tasks
//! are independent; no strategy promises an order across types.

use std::fmt;
use std::num::NonZeroUsize;

use rowmap_core::{Error, Result};

/// A full refresh of one record type.
pub struct RefreshTask<'a> {
    type_name: &'static str,
    table: String,
    run: Box<dyn FnOnce() -> Result<usize> + Send + 'a>,
}

impl<'a> RefreshTask<'a> {
    pub(crate) fn new(
        type_name: &'static str,
        table: String,
        run: impl FnOnce() -> Result<usize> + Send + 'a,
    ) -> Self {
        Self {
            type_name,
            table,
            run: Box::new(run),
        }
    }

    /// Record type this task refreshes.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Table this task reads.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Run the refresh on the current thread.
    pub fn run(self) -> RefreshOutcome {
        let result = (self.run)();
        RefreshOutcome {
            type_name: self.type_name,
            table: self.table,
            result,
        }
    }
}

impl fmt::Debug for RefreshTask<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshTask")
            .field("type_name", &self.type_name)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

/// Result of refreshing one type.
#[derive(Debug)]
pub struct RefreshOutcome {
    /// Record type.
    pub type_name: &'static str,
    /// Table read.
    pub table: String,
    /// Rows fetched, or the error that stopped this type.
    pub result: Result<usize>,
}

/// Outcomes of a `refresh_all` run.
#[derive(Debug, Default)]
pub struct RefreshReport {
    /// One outcome per registered type.
    pub outcomes: Vec<RefreshOutcome>,
}

impl RefreshReport {
    /// Types that refreshed successfully.
    pub fn succeeded(&self) -> impl Iterator<Item = &RefreshOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_ok())
    }

    /// Types whose refresh failed.
    pub fn failed(&self) -> impl Iterator<Item = &RefreshOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    /// Whether every type refreshed.
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }
}

/// Runs refresh tasks.
pub trait RefreshStrategy: Send + Sync {
    /// Run every task and return one outcome per task.
    fn execute<'a>(&self, tasks: Vec<RefreshTask<'a>>) -> Vec<RefreshOutcome>;
}

/// Run tasks one after another on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sequential;

impl RefreshStrategy for Sequential {
    fn execute<'a>(&self, tasks: Vec<RefreshTask<'a>>) -> Vec<RefreshOutcome> {
        tasks.into_iter().map(RefreshTask::run).collect()
    }
}

/// Run tasks on scoped OS threads, at most `max_threads` at a time.
#[derive(Debug, Clone, Copy)]
pub struct Threaded {
    max_threads: NonZeroUsize,
}

impl Threaded {
    /// Allow up to `max_threads` concurrent refreshes (at least one).
    pub fn new(max_threads: usize) -> Self {
        Self {
            max_threads: NonZeroUsize::new(max_threads).unwrap_or(NonZeroUsize::MIN),
        }
    }

    /// One thread per available CPU.
    pub fn per_cpu() -> Self {
        Self {
            max_threads: std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN),
        }
    }

    /// Concurrency limit.
    pub fn max_threads(&self) -> usize {
        self.max_threads.get()
    }
}

impl RefreshStrategy for Threaded {
    fn execute<'a>(&self, tasks: Vec<RefreshTask<'a>>) -> Vec<RefreshOutcome> {
        let mut outcomes = Vec::with_capacity(tasks.len());
        let mut pending = tasks.into_iter().peekable();
        while pending.peek().is_some() {
            let wave: Vec<RefreshTask<'a>> = pending.by_ref().take(self.max_threads.get()).collect();
            std::thread::scope(|scope| {
                let handles: Vec<_> = wave
                    .into_iter()
                    .map(|task| {
                        let type_name = task.type_name;
                        let table = task.table.clone();
                        (type_name, table, scope.spawn(move || task.run()))
                    })
                    .collect();
                for (type_name, table, handle) in handles {
                    let outcome = handle.join().unwrap_or_else(|_| RefreshOutcome {
                        type_name,
                        table,
                        result: Err(Error::consistency(format!(
                            "refresh of {} panicked",
                            type_name
                        ))),
                    });
                    outcomes.push(outcome);
                }
            });
        }
        outcomes
    }
}
