pub mod error;
pub mod observer;
pub mod types;

pub use error::{MasaError, Result};
pub use observer::{RequestObserver, SilentObserver, TracingObserver};
pub use types::{
    decode_posts, normalize_posts, PostMetadata, PostRecord, RawPost, RequestShape, ResultsEnvelope,
    SearchInput, StatusResponse, SubmitResponse,
};

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::RequestBuilder;

pub const DEFAULT_BASE_URL: &str = "https://data.dev.masalabs.ai/api";

/// Live Twitter search endpoint. Status and results hang off it.
pub const DEFAULT_SEARCH_PATH: &str = "/v1/search/live/twitter";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct MasaClient {
    client: reqwest::Client,
    base_url: String,
    search_path: String,
    api_key: String,
    observer: Arc<dyn RequestObserver>,
}

impl MasaClient {
    /// Build a client. Every call is bounded by `request_timeout`; a hung call
    /// surfaces as `MasaError::Timeout`.
    pub fn new(base_url: &str, api_key: &str, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            search_path: DEFAULT_SEARCH_PATH.to_string(),
            api_key: api_key.to_string(),
            observer: Arc::new(SilentObserver),
        })
    }

    pub fn with_search_path(mut self, path: &str) -> Self {
        let path = path.trim_end_matches('/');
        self.search_path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn RequestObserver>) -> Self {
        self.observer = observer;
        self
    }

    fn search_url(&self) -> String {
        format!("{}{}", self.base_url, self.search_path)
    }

    /// Submit a live search. Returns the job id.
    pub async fn submit(&self, input: &SearchInput) -> Result<String> {
        let url = self.search_url();
        let body = serde_json::to_string(&input.body())?;

        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header(CONTENT_TYPE, "application/json")
            .body(body.clone());

        let text = self.execute("POST", &url, Some(&body), request).await?;
        let resp: SubmitResponse = self.decode("POST", &url, &text)?;

        if let Some(error) = resp.error.filter(|e| !e.is_empty()) {
            return Err(MasaError::Submission(error));
        }
        match resp.uuid.filter(|u| !u.is_empty()) {
            Some(uuid) => {
                tracing::info!(job_id = %uuid, query = %input.query, "Search submitted");
                Ok(uuid)
            }
            None => Err(MasaError::Submission("no uuid returned".to_string())),
        }
    }

    /// Fetch the raw status token of a job.
    pub async fn fetch_status(&self, job_id: &str) -> Result<String> {
        let url = format!("{}/status/{}", self.search_url(), job_id);
        let request = self.client.get(&url).bearer_auth(&self.api_key);

        let text = self.execute("GET", &url, None, request).await?;
        let resp: StatusResponse = self.decode("GET", &url, &text)?;
        tracing::debug!(job_id, status = %resp.status, "Job status");
        Ok(resp.status)
    }

    /// Fetch a finished job's posts as returned by the API, newest first.
    pub async fn fetch_results(&self, job_id: &str) -> Result<Vec<RawPost>> {
        let url = format!("{}/result/{}", self.search_url(), job_id);
        let request = self.client.get(&url).bearer_auth(&self.api_key);

        let text = self.execute("GET", &url, None, request).await?;
        let envelope: ResultsEnvelope = self.decode("GET", &url, &text)?;

        match envelope {
            ResultsEnvelope::Bare(values) => Ok(decode_posts(values)),
            ResultsEnvelope::Wrapped {
                error: Some(message),
                ..
            } if !message.is_empty() => Err(MasaError::Api {
                status: 200,
                message,
            }),
            ResultsEnvelope::Wrapped { data, .. } => Ok(decode_posts(data.unwrap_or_default())),
        }
    }

    async fn execute(
        &self,
        method: &str,
        url: &str,
        body: Option<&str>,
        request: RequestBuilder,
    ) -> Result<String> {
        self.observer.on_request(method, url, body);

        let resp = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                let err = MasaError::from(e);
                self.observer.on_error(method, url, &err);
                return Err(err);
            }
        };

        let status = resp.status();
        let text = match resp.text().await {
            Ok(text) => text,
            Err(e) => {
                let err = MasaError::from(e);
                self.observer.on_error(method, url, &err);
                return Err(err);
            }
        };
        self.observer
            .on_response(method, url, status.as_u16(), &text);

        if !status.is_success() {
            let err = MasaError::Api {
                status: status.as_u16(),
                message: text,
            };
            self.observer.on_error(method, url, &err);
            return Err(err);
        }

        Ok(text)
    }

    fn decode<T: serde::de::DeserializeOwned>(&self, method: &str, url: &str, text: &str) -> Result<T> {
        serde_json::from_str(text).map_err(|e| {
            let err = MasaError::from(e);
            self.observer.on_error(method, url, &err);
            err
        })
    }
}
