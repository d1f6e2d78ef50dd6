use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::backoff::WaitPolicy;
use crate::cycle::{AccountWatcher, CycleStats};
use crate::error::Result;

/// Retries of a failed cycle before falling back to the regular cadence.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub wait: WaitPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            wait: WaitPolicy::Exponential {
                base: Duration::from_secs(30),
                growth: 2.0,
                max: Some(Duration::from_secs(600)),
            },
        }
    }
}

/// When the next cycle runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextRun {
    /// Re-run the failed cycle. `attempt` counts from 1.
    Retry { attempt: u32, after: Duration },
    Regular { after: Duration },
}

impl NextRun {
    pub fn after(&self) -> Duration {
        match *self {
            NextRun::Retry { after, .. } | NextRun::Regular { after } => after,
        }
    }
}

/// Decide the next run from a cycle's outcome and the retries already spent on it.
pub fn plan_next(
    outcome: &Result<CycleStats>,
    retries_used: u32,
    retry: &RetryPolicy,
    cycle_delay: Duration,
) -> NextRun {
    match outcome {
        Err(e) if e.is_retryable() && retries_used < retry.max_retries => NextRun::Retry {
            attempt: retries_used + 1,
            after: retry.wait.delay(retries_used),
        },
        _ => NextRun::Regular { after: cycle_delay },
    }
}

/// Runs one account's cycles forever: a cycle, then a sleep, then the next.
pub struct CycleScheduler {
    watcher: AccountWatcher,
    retry: RetryPolicy,
    cycle_delay: Duration,
    retries_used: u32,
}

impl CycleScheduler {
    pub fn new(watcher: AccountWatcher, retry: RetryPolicy, cycle_delay: Duration) -> Self {
        Self {
            watcher,
            retry,
            cycle_delay,
            retries_used: 0,
        }
    }

    /// Run one cycle now and return when the next one is due.
    pub async fn run_now(&mut self) -> NextRun {
        let label = self.watcher.account().label.clone();
        let outcome = self.watcher.run_cycle().await;

        match &outcome {
            Ok(stats) => info!(account = %label, "Cycle complete. {stats}"),
            Err(e) => error!(account = %label, retries_used = self.retries_used, error = %e, "Cycle failed"),
        }

        let next = plan_next(&outcome, self.retries_used, &self.retry, self.cycle_delay);
        match next {
            NextRun::Retry { attempt, .. } => self.retries_used = attempt,
            NextRun::Regular { .. } => {
                if outcome.is_err() {
                    error!(
                        account = %label,
                        retries = self.retries_used,
                        "Retries exhausted, waiting for the next regular cycle"
                    );
                }
                self.retries_used = 0;
            }
        }
        next
    }

    pub async fn schedule_after(&self, after: Duration) {
        tokio::time::sleep(after).await;
    }

    /// Loop forever. A failed cycle never ends the loop.
    pub async fn run(mut self) {
        loop {
            let next = self.run_now().await;
            info!(
                account = %self.watcher.account().label,
                next = ?next,
                "Next cycle scheduled"
            );
            self.schedule_after(next.after()).await;
        }
    }
}

/// Why an account loop stopped. Loops are meant to run forever, so any exit
/// is reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    Returned { account: String },
    Panicked { account: String, message: String },
}

/// The running account loops. Each exit is reported as it happens, while the
/// remaining loops keep running.
#[derive(Default)]
pub struct AccountLoops {
    tasks: JoinSet<LoopExit>,
}

impl AccountLoops {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, scheduler: CycleScheduler) {
        let account = scheduler.watcher.account().label.clone();
        self.tasks.spawn(async move {
            match AssertUnwindSafe(scheduler.run()).catch_unwind().await {
                Ok(()) => LoopExit::Returned { account },
                Err(panic) => LoopExit::Panicked {
                    account,
                    message: panic_message(panic.as_ref()),
                },
            }
        });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for the next loop to stop. `None` once no loops are left.
    pub async fn next_exit(&mut self) -> Option<LoopExit> {
        loop {
            let exit = match self.tasks.join_next().await? {
                Ok(exit) => exit,
                Err(e) if e.is_cancelled() => continue,
                Err(e) => LoopExit::Panicked {
                    account: "unknown".to_string(),
                    message: e.to_string(),
                },
            };
            match &exit {
                LoopExit::Returned { account } => {
                    error!(account = %account, remaining = self.tasks.len(), "Account loop ended")
                }
                LoopExit::Panicked { account, message } => error!(
                    account = %account,
                    remaining = self.tasks.len(),
                    panic = %message,
                    "Account loop panicked"
                ),
            }
            return Some(exit);
        }
    }

    pub async fn shutdown(&mut self) {
        self.tasks.shutdown().await;
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
