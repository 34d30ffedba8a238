use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{body::Body, extract::{Request, State}, response::Response as AxumResponse};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use httpflow::{
    Client, Cookie, CookieStore, Error, MemoryCookieJar, Options, RetryOptions, TransportErrorKind,
};

#[derive(Clone)]
struct MockResponse {
    status: StatusCode,
    headers: Vec<(&'static str, String)>,
    body: String,
}

impl MockResponse {
    fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }
}

#[derive(Clone, Debug)]
struct RecordedRequest {
    method: Method,
    path_and_query: String,
    headers: HeaderMap,
}

#[derive(Clone)]
struct MockState {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

async fn mock_handler(State(state): State<MockState>, request: Request) -> AxumResponse {
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());
    state
        .requests
        .lock()
        .expect("request log mutex must not be poisoned")
        .push(RecordedRequest {
            method: request.method().clone(),
            path_and_query,
            headers: request.headers().clone(),
        });

    let response = {
        let mut queue = state
            .responses
            .lock()
            .expect("response queue mutex must not be poisoned");
        queue
            .pop_front()
            .unwrap_or_else(|| MockResponse::new(StatusCode::INTERNAL_SERVER_ERROR))
    };

    let mut builder = AxumResponse::builder().status(response.status);
    for (name, value) in &response.headers {
        builder = builder.header(*name, value);
    }
    builder
        .body(Body::from(response.body))
        .expect("mock response must build")
}

struct TestServer {
    base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    task: tokio::task::JoinHandle<()>,
}

impl TestServer {
    fn hits(&self) -> usize {
        self.requests.lock().expect("request log").len()
    }

    fn request(&self, index: usize) -> RecordedRequest {
        self.requests.lock().expect("request log")[index].clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn spawn_server(responses: Vec<MockResponse>) -> TestServer {
    let state = MockState {
        responses: Arc::new(Mutex::new(responses.into())),
        requests: Arc::new(Mutex::new(Vec::new())),
    };

    let app = axum::Router::new()
        .fallback(mock_handler)
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind test listener");
    let address = listener.local_addr().expect("must have local addr");
    let task = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock server must run");
    });

    TestServer {
        base_url: format!("http://{address}"),
        requests: state.requests,
        task,
    }
}

fn fast_client(configure: impl FnOnce(&mut Options)) -> Client {
    let mut options = Options::new();
    options.timeout = Some(Duration::from_millis(250));
    configure(&mut options);
    Client::new(options).expect("client must build")
}

#[tokio::test]
async fn get_decodes_a_json_response() {
    let server = spawn_server(vec![MockResponse::new(StatusCode::OK)
        .header("content-type", "application/json")
        .body(r#"{"ok":true}"#)])
    .await;
    let client = fast_client(|_| {});

    let value: serde_json::Value = client
        .get(&format!("{}/status", server.base_url))
        .await
        .expect("request must succeed")
        .json()
        .await
        .expect("body must decode");

    assert_eq!(value, serde_json::json!({"ok": true}));
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn retries_a_retryable_status_until_success() {
    let server = spawn_server(vec![
        MockResponse::new(StatusCode::SERVICE_UNAVAILABLE).header("retry-after", "0"),
        MockResponse::new(StatusCode::SERVICE_UNAVAILABLE).header("retry-after", "0"),
        MockResponse::new(StatusCode::OK).body("recovered"),
    ])
    .await;
    let client = fast_client(|options| {
        options.retry_options = Some(RetryOptions::default().limit(2));
    });

    let body = client
        .get(&format!("{}/flaky", server.base_url))
        .await
        .expect("request must succeed after retries")
        .text()
        .await
        .expect("body must read");

    assert_eq!(body, "recovered");
    assert_eq!(server.hits(), 3, "initial attempt plus two retries");
}

#[tokio::test]
async fn retry_limit_is_exact_and_carries_the_last_response() {
    let server = spawn_server(vec![
        MockResponse::new(StatusCode::SERVICE_UNAVAILABLE).header("retry-after", "0"),
        MockResponse::new(StatusCode::SERVICE_UNAVAILABLE).header("retry-after", "0"),
    ])
    .await;
    let client = fast_client(|options| {
        options.retry_options = Some(RetryOptions::default().limit(1));
    });

    let err = client
        .get(&format!("{}/down", server.base_url))
        .await
        .expect_err("limit must be enforced");

    match err {
        Error::MaxRetriesExceeded { retries, response } => {
            assert_eq!(retries, 1);
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(server.hits(), 2, "never a retry past the limit");
}

#[tokio::test]
async fn follows_redirects_and_reports_the_final_url() {
    let server = spawn_server(vec![
        MockResponse::new(StatusCode::FOUND).header("location", "/hop?from=start"),
        MockResponse::new(StatusCode::OK).body("landed"),
    ])
    .await;
    let client = fast_client(|_| {});

    let response = client
        .get(&format!("{}/start", server.base_url))
        .await
        .expect("request must succeed");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.url().path(), "/hop");
    assert_eq!(server.request(1).path_and_query, "/hop?from=start");
}

#[tokio::test]
async fn see_other_turns_post_into_get_without_payload() {
    let server = spawn_server(vec![
        MockResponse::new(StatusCode::SEE_OTHER).header("location", "/created"),
        MockResponse::new(StatusCode::OK),
    ])
    .await;
    let client = fast_client(|options| {
        options.json = Some(serde_json::json!({"name": "thing"}));
    });

    client
        .post(&format!("{}/things", server.base_url))
        .await
        .expect("request must succeed");

    let first = server.request(0);
    assert_eq!(first.method, Method::POST);
    assert_eq!(
        first.headers.get("content-type").map(|v| v.to_str().unwrap()),
        Some("application/json")
    );

    let second = server.request(1);
    assert_eq!(second.method, Method::GET);
    assert!(second.headers.get("content-type").is_none());
    assert!(second.headers.get("content-length").is_none() || second
        .headers
        .get("content-length")
        .is_some_and(|v| v == "0"));
}

#[tokio::test]
async fn cookie_store_carries_cookies_across_redirects() {
    let server = spawn_server(vec![
        MockResponse::new(StatusCode::FOUND)
            .header("location", "/private")
            .header("set-cookie", "token=abc; Path=/"),
        MockResponse::new(StatusCode::OK),
    ])
    .await;
    let client = fast_client(|options| {
        options.cookie_store = Some(Arc::new(MemoryCookieJar::new()));
    });

    client
        .get(&format!("{}/login", server.base_url))
        .await
        .expect("request must succeed");

    let followup = server.request(1);
    let cookie = followup
        .headers
        .get("cookie")
        .map(|v| v.to_str().unwrap().to_owned())
        .unwrap_or_default();
    assert!(
        cookie.contains("token=abc"),
        "redirected request must carry the stored cookie, got {cookie:?}"
    );
}

#[tokio::test]
async fn stored_and_manual_cookies_share_one_cookie_header_line() {
    let server = spawn_server(vec![MockResponse::new(StatusCode::OK)]).await;
    let jar = Arc::new(MemoryCookieJar::new());
    let base: url::Url = server.base_url.parse().expect("valid url");
    jar.set_cookies(&base, vec![Cookie::new("stored", "s1")]);

    let client = fast_client(|options| {
        options.cookie_store = Some(jar.clone());
        options
            .headers
            .insert("cookie", HeaderValue::from_static("manual=m1"));
    });

    client
        .get(&format!("{}/", server.base_url))
        .await
        .expect("request must succeed");

    let recorded = server.request(0);
    let lines: Vec<_> = recorded.headers.get_all("cookie").iter().collect();
    assert_eq!(lines.len(), 1, "a request carries one cookie header line");
    let line = lines[0].to_str().expect("ascii cookie header");
    assert!(line.contains("manual=m1"), "manual cookie kept, got {line:?}");
    assert!(line.contains("stored=s1"), "stored cookie joined, got {line:?}");
}

#[tokio::test]
async fn prefix_url_resolves_relative_targets() {
    let server = spawn_server(vec![MockResponse::new(StatusCode::OK)]).await;
    let client = fast_client(|options| {
        options.prefix_url =
            Some(format!("{}/api/v1/", server.base_url).parse().expect("valid url"));
        options.search_params.set("page", "2");
    });

    client.get("items").await.expect("request must succeed");

    assert_eq!(server.request(0).path_and_query, "/api/v1/items?page=2");
}

#[tokio::test]
async fn connection_failure_is_a_classified_transport_error() {
    // Bind then drop a listener so the port is very likely unused.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind probe listener");
    let address = listener.local_addr().expect("must have local addr");
    drop(listener);

    let client = fast_client(|options| {
        options.retry = Some(false);
    });

    let err = client
        .get(&format!("http://{address}/"))
        .await
        .expect_err("nothing is listening");
    assert_eq!(err.transport_kind(), Some(TransportErrorKind::Connect));
}
