use std::time::Duration;

use tracing::{debug, warn};

use crate::backoff::WaitPolicy;
use crate::error::{RelayError, Result};
use crate::source::JobSource;

/// Status tokens that mean the job is still running.
pub const IN_PROGRESS: &[&str] = &["processing", "in progress", "queued", "error(retrying)"];

pub const DONE: &str = "done";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Done,
    InProgress,
    Failed(String),
}

/// Classify a raw status token. Unknown tokens are failures.
pub fn classify(status: &str) -> JobStatus {
    let token = status.trim();
    if token.eq_ignore_ascii_case(DONE) {
        JobStatus::Done
    } else if IN_PROGRESS.iter().any(|t| token.eq_ignore_ascii_case(t)) {
        JobStatus::InProgress
    } else {
        JobStatus::Failed(status.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Poll budget. `None` polls until the job resolves.
    pub max_attempts: Option<u32>,
    /// Wait between polls, indexed by polls already made minus one.
    pub wait: WaitPolicy,
    /// Wait between submission and the first poll.
    pub initial_delay: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(5),
            wait: WaitPolicy::Fixed(Duration::from_secs(120)),
            initial_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Submitted,
    Polling { attempt: u32 },
    Done,
    Failed(String),
    Exhausted,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PollState::Done | PollState::Failed(_) | PollState::Exhausted)
    }
}

/// How a job resolved without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Done { polls: u32 },
    /// Budget spent while the job was still running. Not an error.
    Exhausted { polls: u32 },
}

/// Drives one submitted job through bounded polling.
pub struct JobPoller {
    policy: PollPolicy,
    state: PollState,
    polls: u32,
}

impl JobPoller {
    pub fn new(policy: PollPolicy) -> Self {
        Self {
            policy,
            state: PollState::Submitted,
            polls: 0,
        }
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// Apply one observed status. Terminal states absorb further input.
    pub fn observe(&mut self, status: &str) -> &PollState {
        if self.state.is_terminal() {
            return &self.state;
        }
        self.polls += 1;

        self.state = match classify(status) {
            JobStatus::Done => PollState::Done,
            JobStatus::Failed(s) => PollState::Failed(s),
            JobStatus::InProgress => match self.policy.max_attempts {
                Some(max) if self.polls >= max => PollState::Exhausted,
                _ => PollState::Polling {
                    attempt: self.polls,
                },
            },
        };
        &self.state
    }

    /// Wait before the next poll, or `None` once resolved.
    pub fn next_wait(&self) -> Option<Duration> {
        match self.state {
            PollState::Submitted => Some(self.policy.initial_delay),
            PollState::Polling { attempt } => Some(self.policy.wait.delay(attempt - 1)),
            _ => None,
        }
    }

    pub async fn run(mut self, source: &dyn JobSource, job_id: &str) -> Result<PollOutcome> {
        loop {
            if let Some(wait) = self.next_wait() {
                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                }
            }

            let status = source.status(job_id).await?;
            debug!(job_id, status = %status, poll = self.polls + 1, "Job status");

            match self.observe(&status).clone() {
                PollState::Done => return Ok(PollOutcome::Done { polls: self.polls }),
                PollState::Failed(s) => return Err(RelayError::JobFailed(s)),
                PollState::Exhausted => {
                    warn!(
                        job_id,
                        polls = self.polls,
                        "Job still in progress after poll budget, skipping this cycle"
                    );
                    return Ok(PollOutcome::Exhausted { polls: self.polls });
                }
                PollState::Submitted | PollState::Polling { .. } => continue,
            }
        }
    }
}
