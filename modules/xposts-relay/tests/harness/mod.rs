//! In-memory collaborators for relay tests: a scripted search API and a
//! notifier that records what it was asked to send. No network, no sleeps
//! beyond what the poll policy asks for.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use masa_client::PostRecord;
use xposts_relay::backoff::WaitPolicy;
use xposts_relay::notify::backend::NotifyBackend;
use xposts_relay::poller::PollPolicy;
use xposts_relay::seen_store::LogFormat;
use xposts_relay::{AccountDescriptor, AccountWatcher, JobSource, RelayError};

// ---------------------------------------------------------------------------
// MockSource
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockSource {
    submit_failure: Option<String>,
    status_failure: Option<String>,
    panic_on_submit: bool,
    statuses: Mutex<VecDeque<String>>,
    results: Mutex<Vec<PostRecord>>,
    pub submits: AtomicU32,
    pub status_calls: AtomicU32,
    pub result_calls: AtomicU32,
}

impl MockSource {
    /// A job that is done on the first poll and returns `posts`.
    pub fn done_with(posts: Vec<PostRecord>) -> Self {
        Self {
            results: Mutex::new(posts),
            ..Self::default()
        }
    }

    /// Script the status tokens returned by successive polls. Once the script
    /// runs out every poll answers "done".
    pub fn with_statuses(self, statuses: &[&str]) -> Self {
        *self.statuses.lock().unwrap() = statuses.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Every submission fails with a transport error.
    pub fn failing_submit(message: &str) -> Self {
        Self {
            submit_failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Every status check fails with a transport error.
    pub fn failing_status(message: &str) -> Self {
        Self {
            status_failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Every submission panics, taking its account loop down with it.
    pub fn panicking() -> Self {
        Self {
            panic_on_submit: true,
            ..Self::default()
        }
    }

    pub fn submits(&self) -> u32 {
        self.submits.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn result_calls(&self) -> u32 {
        self.result_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobSource for MockSource {
    async fn submit(&self, _query: &str, _max_results: u32) -> xposts_relay::Result<String> {
        let n = self.submits.fetch_add(1, Ordering::SeqCst) + 1;
        if self.panic_on_submit {
            panic!("search client bug");
        }
        match &self.submit_failure {
            Some(message) => Err(RelayError::Transport(message.clone())),
            None => Ok(format!("job-{n}")),
        }
    }

    async fn status(&self, _job_id: &str) -> xposts_relay::Result<String> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.status_failure {
            return Err(RelayError::Transport(message.clone()));
        }
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "done".to_string()))
    }

    async fn results(&self, _job_id: &str) -> xposts_relay::Result<Vec<PostRecord>> {
        self.result_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.results.lock().unwrap().clone())
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
    fail_matching: Option<String>,
}

impl RecordingNotifier {
    /// Fails any message containing `needle`; everything else is recorded.
    pub fn failing_on(needle: &str) -> Self {
        Self {
            fail_matching: Some(needle.to_string()),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotifyBackend for RecordingNotifier {
    async fn send(&self, text: &str) -> anyhow::Result<()> {
        if let Some(needle) = &self.fail_matching {
            if text.contains(needle.as_str()) {
                anyhow::bail!("channel unavailable");
            }
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn post(id: &str, author: &str, body: &str) -> PostRecord {
    PostRecord {
        id: id.to_string(),
        author: author.to_string(),
        body: body.to_string(),
        permalink: None,
    }
}

pub fn account(dir: &Path, handle: &str) -> AccountDescriptor {
    AccountDescriptor {
        label: handle.to_string(),
        handle: Some(handle.to_string()),
        query: format!("from:{handle}"),
        log_file: dir.join(format!("tweets-log-{}.json", handle.to_lowercase())),
        match_author: false,
    }
}

/// Polls without waiting.
pub fn quick_poll(budget: u32) -> PollPolicy {
    PollPolicy {
        max_attempts: Some(budget),
        wait: WaitPolicy::Fixed(Duration::ZERO),
        initial_delay: Duration::ZERO,
    }
}

pub fn watcher(
    account: AccountDescriptor,
    poll: PollPolicy,
    source: Arc<MockSource>,
    notifier: Arc<RecordingNotifier>,
) -> AccountWatcher {
    AccountWatcher::new(account, 10, poll, LogFormat::JsonArray, source, notifier)
}

/// Ids that appear in a list of sent notifications, in send order.
pub fn sent_ids(sent: &[String]) -> Vec<String> {
    sent.iter()
        .filter_map(|text| text.rsplit('/').next())
        .map(|tail| tail.trim_end_matches(')').to_string())
        .collect()
}
