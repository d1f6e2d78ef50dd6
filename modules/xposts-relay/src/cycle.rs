use std::fmt;
use std::sync::Arc;

use masa_client::PostRecord;
use tracing::{error, info};

use crate::config::AccountDescriptor;
use crate::error::Result;
use crate::filter::{self, PostFilter};
use crate::notify::backend::NotifyBackend;
use crate::poller::{JobPoller, PollOutcome, PollPolicy};
use crate::seen_store::{LogEntry, LogFormat, SeenStore};
use crate::source::JobSource;

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub job_id: Option<String>,
    pub polls: u32,
    pub exhausted: bool,
    pub fetched: usize,
    pub qualifying: usize,
    pub notified: usize,
    pub send_failures: usize,
}

impl fmt::Display for CycleStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exhausted {
            return write!(f, "polls={} exhausted, no results this cycle", self.polls);
        }
        write!(
            f,
            "polls={} fetched={} new={} notified={} send_failures={}",
            self.polls, self.fetched, self.qualifying, self.notified, self.send_failures
        )
    }
}

/// One watched account: its descriptor, seen store, and the collaborators a
/// cycle talks to.
pub struct AccountWatcher {
    account: AccountDescriptor,
    max_results: u32,
    poll: PollPolicy,
    filter: PostFilter,
    seen: SeenStore,
    source: Arc<dyn JobSource>,
    notifier: Arc<dyn NotifyBackend>,
}

impl AccountWatcher {
    pub fn new(
        account: AccountDescriptor,
        max_results: u32,
        poll: PollPolicy,
        log_format: LogFormat,
        source: Arc<dyn JobSource>,
        notifier: Arc<dyn NotifyBackend>,
    ) -> Self {
        let filter = PostFilter::new(account.handle.clone(), account.match_author);
        let seen = SeenStore::open(&account.log_file, log_format);
        Self {
            account,
            max_results,
            poll,
            filter,
            seen,
            source,
            notifier,
        }
    }

    pub fn account(&self) -> &AccountDescriptor {
        &self.account
    }

    pub fn seen(&self) -> &SeenStore {
        &self.seen
    }

    /// Submit, poll, fetch, and relay new posts.
    pub async fn run_cycle(&mut self) -> Result<CycleStats> {
        let label = self.account.label.clone();
        info!(account = %label, query = %self.account.query, "Cycle start");

        let mut stats = CycleStats::default();

        let job_id = self
            .source
            .submit(&self.account.query, self.max_results)
            .await?;
        stats.job_id = Some(job_id.clone());

        let poller = JobPoller::new(self.poll.clone());
        match poller.run(self.source.as_ref(), &job_id).await? {
            PollOutcome::Done { polls } => stats.polls = polls,
            PollOutcome::Exhausted { polls } => {
                stats.polls = polls;
                stats.exhausted = true;
                return Ok(stats);
            }
        }

        let posts = self.source.results(&job_id).await?;
        stats.fetched = posts.len();
        info!(account = %label, fetched = stats.fetched, "Fetched posts");

        self.relay(posts, &mut stats).await;
        Ok(stats)
    }

    /// Filter a batch and notify each qualifying post, oldest first.
    ///
    /// The id is marked seen before the send: a failed send is logged and the
    /// post is not retried, so a flaky chat API cannot cause repeat posts.
    async fn relay(&mut self, posts: Vec<PostRecord>, stats: &mut CycleStats) {
        let fresh = self.filter.select_new(posts, &self.seen);
        stats.qualifying = fresh.len();

        for post in fresh {
            self.seen.mark_seen(&post.id);

            let entry = LogEntry::new(&post.id, &post.body, Some(filter::permalink(&post)));
            if let Err(e) = self.seen.append(&entry) {
                error!(
                    account = %self.account.label,
                    post_id = %post.id,
                    error = %e,
                    "Failed to persist seen post"
                );
            }

            let fallback = self
                .account
                .handle
                .as_deref()
                .unwrap_or(&self.account.label);
            let text = filter::render_notification(&post, fallback);

            match self.notifier.send(&text).await {
                Ok(()) => {
                    stats.notified += 1;
                    info!(account = %self.account.label, post_id = %post.id, "Posted");
                }
                Err(e) => {
                    stats.send_failures += 1;
                    error!(
                        account = %self.account.label,
                        post_id = %post.id,
                        backend = self.notifier.name(),
                        error = %e,
                        "Failed to send notification"
                    );
                }
            }
        }
    }
}
