use tracing::{debug, error};

use crate::error::MasaError;

/// Longest body excerpt written to the log.
const MAX_LOGGED_BODY: usize = 2_000;

/// Hooks invoked around every HTTP call the client makes.
///
/// Installed once when the client is built; the client never logs request
/// or response bodies on its own.
pub trait RequestObserver: Send + Sync {
    fn on_request(&self, method: &str, url: &str, body: Option<&str>);

    fn on_response(&self, method: &str, url: &str, status: u16, body: &str);

    fn on_error(&self, method: &str, url: &str, error: &MasaError);
}

/// Observer that ignores everything.
pub struct SilentObserver;

impl RequestObserver for SilentObserver {
    fn on_request(&self, _method: &str, _url: &str, _body: Option<&str>) {}

    fn on_response(&self, _method: &str, _url: &str, _status: u16, _body: &str) {}

    fn on_error(&self, _method: &str, _url: &str, _error: &MasaError) {}
}

/// Logs requests and responses at DEBUG and failures at ERROR.
/// Headers are never logged, so the bearer token stays out of the output.
pub struct TracingObserver;

impl RequestObserver for TracingObserver {
    fn on_request(&self, method: &str, url: &str, body: Option<&str>) {
        debug!(method, url, body = body.map(excerpt).unwrap_or_default(), "Masa request");
    }

    fn on_response(&self, method: &str, url: &str, status: u16, body: &str) {
        debug!(method, url, status, body = excerpt(body), "Masa response");
    }

    fn on_error(&self, method: &str, url: &str, error: &MasaError) {
        error!(method, url, error = %error, "Masa request failed");
    }
}

fn excerpt(body: &str) -> &str {
    match body.char_indices().nth(MAX_LOGGED_BODY) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
