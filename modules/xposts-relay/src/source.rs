// JobSource: the three remote calls a cycle makes against the search API.
//
// Production wraps MasaClient; tests script statuses and results with an
// in-memory implementation, so the poller and cycle run without a network.

use async_trait::async_trait;
use masa_client::{normalize_posts, MasaClient, PostRecord, RequestShape, SearchInput};

use crate::error::Result;

#[async_trait]
pub trait JobSource: Send + Sync {
    /// Submit a search. Returns the job id.
    async fn submit(&self, query: &str, max_results: u32) -> Result<String>;

    /// Current raw status token of a job.
    async fn status(&self, job_id: &str) -> Result<String>;

    /// Normalized posts of a finished job, in API order (newest first).
    async fn results(&self, job_id: &str) -> Result<Vec<PostRecord>>;
}

pub struct MasaSource {
    client: MasaClient,
    shape: RequestShape,
}

impl MasaSource {
    pub fn new(client: MasaClient, shape: RequestShape) -> Self {
        Self { client, shape }
    }
}

#[async_trait]
impl JobSource for MasaSource {
    async fn submit(&self, query: &str, max_results: u32) -> Result<String> {
        let input = SearchInput::new(query, max_results).with_shape(self.shape.clone());
        Ok(self.client.submit(&input).await?)
    }

    async fn status(&self, job_id: &str) -> Result<String> {
        Ok(self.client.fetch_status(job_id).await?)
    }

    async fn results(&self, job_id: &str) -> Result<Vec<PostRecord>> {
        let raw = self.client.fetch_results(job_id).await?;
        let fetched = raw.len();
        let posts = normalize_posts(raw);
        if posts.len() < fetched {
            tracing::debug!(
                job_id,
                dropped = fetched - posts.len(),
                "Dropped results without a post id"
            );
        }
        Ok(posts)
    }
}
