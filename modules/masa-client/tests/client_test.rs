//! MasaClient against a local mock server: request shapes, response shapes,
//! and how each failure maps onto `MasaError`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use masa_client::{MasaClient, MasaError, RequestObserver, RequestShape, SearchInput};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SEARCH: &str = "/v1/search/live/twitter";

fn client(server: &MockServer) -> MasaClient {
    MasaClient::new(&server.uri(), "test-key", Duration::from_secs(5)).unwrap()
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_sends_typed_body_with_bearer_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEARCH))
        .and(header("authorization", "Bearer test-key"))
        .and(body_json(json!({
            "type": "twitter-scraper",
            "arguments": { "type": "searchbyquery", "query": "from:acct", "max_results": 10 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "uuid": "job-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let job = client(&server)
        .submit(&SearchInput::new("from:acct", 10))
        .await
        .unwrap();

    assert_eq!(job, "job-1");
}

#[tokio::test]
async fn submit_flat_shape_on_custom_path() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/search"))
        .and(body_json(json!({ "query": "#near", "max_results": 5 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "uuid": "job-2" })))
        .mount(&server)
        .await;

    let input = SearchInput::new("#near", 5).with_shape(RequestShape::Flat);
    let job = client(&server)
        .with_search_path("v2/search/")
        .submit(&input)
        .await
        .unwrap();

    assert_eq!(job, "job-2");
}

#[tokio::test]
async fn submit_error_field_is_a_submission_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEARCH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "error": "rate limited" })),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .submit(&SearchInput::new("from:acct", 10))
        .await
        .unwrap_err();

    assert!(matches!(err, MasaError::Submission(ref m) if m == "rate limited"));
    assert!(!err.is_transport());
}

#[tokio::test]
async fn submit_without_uuid_is_a_submission_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEARCH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let err = client(&server)
        .submit(&SearchInput::new("from:acct", 10))
        .await
        .unwrap_err();

    assert!(matches!(err, MasaError::Submission(_)));
}

#[tokio::test]
async fn non_success_status_is_an_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEARCH))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let err = client(&server)
        .submit(&SearchInput::new("from:acct", 10))
        .await
        .unwrap_err();

    match err {
        MasaError::Api { status, message } => {
            assert_eq!(status, 502);
            assert_eq!(message, "bad gateway");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Status and results
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_status_returns_raw_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{SEARCH}/status/job-1")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "status": "error(retrying)" })),
        )
        .mount(&server)
        .await;

    let status = client(&server).fetch_status("job-1").await.unwrap();
    assert_eq!(status, "error(retrying)");
}

#[tokio::test]
async fn fetch_results_accepts_bare_array() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{SEARCH}/result/job-1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "ExternalID": "20", "Content": "newer" },
            { "ExternalID": "10", "Content": "older" }
        ])))
        .mount(&server)
        .await;

    let posts = client(&server).fetch_results("job-1").await.unwrap();
    let records = masa_client::normalize_posts(posts);

    let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["20", "10"]);
}

#[tokio::test]
async fn fetch_results_accepts_data_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{SEARCH}/result/job-1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": "1", "text": "hello", "username": "acct" }]
        })))
        .mount(&server)
        .await;

    let posts = client(&server).fetch_results("job-1").await.unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].content.as_deref(), Some("hello"));
}

#[tokio::test]
async fn one_odd_entry_does_not_lose_the_batch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{SEARCH}/result/job-1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "1", "text": "hello", "content": "hello" },
            null,
            { "id": "2", "text": "world" }
        ])))
        .mount(&server)
        .await;

    let posts = client(&server).fetch_results("job-1").await.unwrap();
    let records = masa_client::normalize_posts(posts);

    let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2"]);
}

#[tokio::test]
async fn fetch_results_null_data_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{SEARCH}/result/job-1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": null })))
        .mount(&server)
        .await;

    let posts = client(&server).fetch_results("job-1").await.unwrap();
    assert!(posts.is_empty());
}

#[tokio::test]
async fn garbage_body_is_a_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{SEARCH}/status/job-1")))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = client(&server).fetch_status("job-1").await.unwrap_err();
    assert!(matches!(err, MasaError::Parse(_)));
    assert!(err.is_transport());
}

#[tokio::test]
async fn hung_call_surfaces_as_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{SEARCH}/status/job-1")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "done" }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let client = MasaClient::new(&server.uri(), "test-key", Duration::from_millis(100)).unwrap();
    let err = client.fetch_status("job-1").await.unwrap_err();

    assert!(matches!(err, MasaError::Timeout(_)), "got {err:?}");
}

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl RequestObserver for Recorder {
    fn on_request(&self, method: &str, url: &str, _body: Option<&str>) {
        self.events.lock().unwrap().push(format!("req {method} {url}"));
    }

    fn on_response(&self, _method: &str, _url: &str, status: u16, _body: &str) {
        self.events.lock().unwrap().push(format!("res {status}"));
    }

    fn on_error(&self, _method: &str, _url: &str, error: &MasaError) {
        self.events.lock().unwrap().push(format!("err {error}"));
    }
}

#[tokio::test]
async fn observer_sees_every_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{SEARCH}/status/job-1")))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let recorder = Arc::new(Recorder::default());
    let client = client(&server).with_observer(recorder.clone());
    let _ = client.fetch_status("job-1").await;

    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(events.len(), 3);
    assert!(events[0].starts_with("req GET "));
    assert!(events[0].ends_with("/status/job-1"));
    assert_eq!(events[1], "res 500");
    assert!(events[2].starts_with("err API error (status 500)"));
}
