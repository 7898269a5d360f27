//! End-to-end tests against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then drives `NetworkService`
//! over real HTTP: once with the default reqwest transport and once with a
//! blocking ureq transport plugged in through the `Transport` trait.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use api_core::{
    ApiClient, ClientConfig, HttpMethod, HttpRequest, HttpResponse, NetworkService, Parameters,
    QueryParameters, RecordingTelemetry, ReqwestTransport, RequestOptions, StaticSessionStore,
    Transport, TransportError,
};
use async_trait::async_trait;
use mock_server::{User, VALID_TOKEN};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Echo {
    method: String,
    query: Option<String>,
    headers: BTreeMap<String, String>,
    body: String,
}

/// Start the mock server on its own runtime and return its address.
fn start_server() -> SocketAddr {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    addr
}

struct Client {
    service: Arc<NetworkService>,
    store: Arc<StaticSessionStore>,
    telemetry: Arc<RecordingTelemetry>,
}

fn client(addr: SocketAddr, token: &str) -> Client {
    let store = Arc::new(StaticSessionStore::with_token(token));
    let telemetry = Arc::new(RecordingTelemetry::new());
    let service = NetworkService::builder(ClientConfig::new(format!("http://{addr}")), store.clone())
        .telemetry(telemetry.clone())
        .build()
        .unwrap();
    Client {
        service: Arc::new(service),
        store,
        telemetry,
    }
}

#[tokio::test]
async fn user_scenario() {
    let addr = start_server();

    // Step 1: valid session, existing user.
    let c = client(addr, VALID_TOKEN);
    let user = c
        .service
        .fetch::<User>("/users/5", HttpMethod::Get, RequestOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user, User { id: 5, name: "Ada".to_string() });
    assert!(c.telemetry.is_empty());

    // Step 2: rejected session, completion never fires, one logout.
    let rejected = client(addr, "expired-token");
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    rejected
        .service
        .clone()
        .request::<User, _>("/users/5", HttpMethod::Get, RequestOptions::default(), move |r| {
            let _ = tx.send(r);
        })
        .expect("spawned on the test runtime")
        .await
        .unwrap();
    assert!(rx.recv().await.is_none(), "completion must not fire on 401");
    assert_eq!(rejected.store.logout_count(), 1);
    assert_eq!(rejected.store.last_logout_status(), Some(401));
    assert_eq!(rejected.store.token(), None);
    assert_eq!(rejected.telemetry.len(), 1);

    // Step 3: missing user, server message surfaces.
    let err = c
        .service
        .fetch::<User>("/users/404", HttpMethod::Get, RequestOptions::default())
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(err.message, "not found");
    assert_eq!(err.code, 404);
    assert_eq!(c.telemetry.len(), 1);
}

#[tokio::test]
async fn create_and_delete_user() {
    let addr = start_server();
    let c = client(addr, VALID_TOKEN);

    let created = c
        .service
        .fetch::<User>(
            "/users",
            HttpMethod::Post,
            RequestOptions::new().body(Parameters::new().with("name", "Grace")),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(created.name, "Grace");

    let path = format!("/users/{}", created.id);
    let deleted = c
        .service
        .fetch_empty(&path, HttpMethod::Delete, RequestOptions::default())
        .await;
    assert_eq!(deleted, Some(Ok(())));

    let err = c
        .service
        .fetch_empty(&path, HttpMethod::Delete, RequestOptions::default())
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(err.code, 404);
}

#[tokio::test]
async fn validation_errors_use_server_message() {
    let addr = start_server();
    let c = client(addr, VALID_TOKEN);

    let err = c
        .service
        .fetch::<User>("/users", HttpMethod::Post, RequestOptions::default())
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(err.code, 422);
    assert_eq!(err.message, "name is required");
}

#[tokio::test]
async fn empty_500_has_generic_message() {
    let addr = start_server();
    let c = client(addr, VALID_TOKEN);

    let err = c
        .service
        .fetch_empty("/boom", HttpMethod::Get, RequestOptions::default())
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(err.code, 500);
    assert_eq!(err.message, "response status code was unacceptable: 500");
    assert_eq!(c.telemetry.errors(), vec![err]);
}

#[tokio::test]
async fn get_parameters_reach_the_query_string() {
    let addr = start_server();
    let c = client(addr, VALID_TOKEN);

    let options = RequestOptions::new()
        .body(Parameters::new().with("name", "Ada L").with("admin", true))
        .query(QueryParameters::new().with("page", "1"));
    let echo = c
        .service
        .fetch::<Echo>("/echo", HttpMethod::Get, options)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(echo.method, "GET");
    assert_eq!(echo.query.as_deref(), Some("page=1&name=Ada%20L&admin=1"));
    assert_eq!(echo.body, "");
    assert_eq!(echo.headers.get("authorization").map(String::as_str), Some("Bearer test-token"));
    assert_eq!(echo.headers.get("content-type").map(String::as_str), Some("application/json"));
}

#[tokio::test]
async fn non_get_parameters_reach_the_body() {
    let addr = start_server();
    let c = client(addr, VALID_TOKEN);

    let options = RequestOptions::new()
        .body(Parameters::new().with("name", "Ada").with("tags", serde_json::json!(["a", "b"])))
        .query(QueryParameters::new().with("dry_run", "yes"));
    let echo = c
        .service
        .fetch::<Echo>("/echo", HttpMethod::Patch, options)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(echo.method, "PATCH");
    assert_eq!(echo.query.as_deref(), Some("dry_run=yes"));
    assert_eq!(echo.body, r#"{"name":"Ada","tags":["a","b"]}"#);
}

#[tokio::test]
async fn connection_refused_has_no_status() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let c = client(addr, VALID_TOKEN);

    let err = c
        .service
        .fetch::<User>("/users/5", HttpMethod::Get, RequestOptions::default())
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(err.code, -1);
    assert_eq!(c.store.logout_count(), 0);
}

#[tokio::test]
async fn caller_supplied_reqwest_client() {
    let addr = start_server();
    let http = reqwest::Client::builder()
        .user_agent("api-core-tests")
        .build()
        .unwrap();
    let transport = ReqwestTransport::with_client(http);

    let mut request = HttpRequest::new(HttpMethod::Get, format!("http://{addr}/echo"));
    request.set_header("X-Trace", "abc");
    let response = transport.execute(request).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.header("content-type"), Some("application/json"));
    let echo: Echo = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(echo.headers.get("user-agent").map(String::as_str), Some("api-core-tests"));
    assert_eq!(echo.headers.get("x-trace").map(String::as_str), Some("abc"));

    let store = Arc::new(StaticSessionStore::with_token(VALID_TOKEN));
    let service = NetworkService::builder(ClientConfig::new(format!("http://{addr}")), store)
        .transport(Arc::new(transport))
        .telemetry(Arc::new(RecordingTelemetry::new()))
        .build()
        .unwrap();
    let user = service
        .fetch::<User>("/users/5", HttpMethod::Get, RequestOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.name, "Ada");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_complete_independently() {
    let addr = start_server();
    let c = client(addr, VALID_TOKEN);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let tx = tx.clone();
            let path = if i % 2 == 0 { "/users/5" } else { "/users/77" };
            c.service
                .clone()
                .request::<User, _>(path, HttpMethod::Get, RequestOptions::default(), move |r| {
                    let _ = tx.send(r);
                })
                .expect("spawned on the test runtime")
        })
        .collect();
    drop(tx);
    for handle in handles {
        handle.await.unwrap();
    }

    let mut ok = 0;
    let mut not_found = 0;
    while let Some(result) = rx.recv().await {
        match result {
            Ok(user) => {
                assert_eq!(user.id, 5);
                ok += 1;
            }
            Err(err) => {
                assert_eq!(err.code, 404);
                not_found += 1;
            }
        }
    }
    assert_eq!((ok, not_found), (8, 8));
    assert_eq!(c.telemetry.len(), 8);
}

// ---------------------------------------------------------------------------
// ureq transport
// ---------------------------------------------------------------------------

/// Blocking ureq transport run on tokio's blocking pool.
///
/// Disables ureq's automatic status-code-as-error behavior so 4xx/5xx
/// responses come back as data and the client does the status handling.
struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

fn execute(agent: &ureq::Agent, req: &HttpRequest) -> Result<HttpResponse, TransportError> {
    let body = req.body.as_deref().unwrap_or("").as_bytes();
    let result = match req.method {
        HttpMethod::Get => with_headers(agent.get(&req.url), &req.headers).call(),
        HttpMethod::Delete => with_headers(agent.delete(&req.url), &req.headers).call(),
        HttpMethod::Post => with_headers(agent.post(&req.url), &req.headers).send(body),
        HttpMethod::Put => with_headers(agent.put(&req.url), &req.headers).send(body),
        HttpMethod::Patch => with_headers(agent.patch(&req.url), &req.headers).send(body),
        other => return Err(TransportError::new(format!("unsupported method: {other}"))),
    };
    let mut response = result.map_err(|e| TransportError::new(e.to_string()))?;

    let status = response.status().as_u16();
    let body = response.body_mut().read_to_vec().unwrap_or_default();
    Ok(HttpResponse {
        status,
        headers: Vec::new(),
        body,
    })
}

#[async_trait]
impl Transport for UreqTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || execute(&agent, &request))
            .await
            .map_err(|e| TransportError::new(e.to_string()))?
    }
}

#[tokio::test]
async fn ureq_transport_through_the_trait() {
    let addr = start_server();
    let store = Arc::new(StaticSessionStore::with_token(VALID_TOKEN));
    let service = NetworkService::builder(ClientConfig::new(format!("http://{addr}")), store.clone())
        .transport(Arc::new(UreqTransport::new()))
        .telemetry(Arc::new(RecordingTelemetry::new()))
        .build()
        .unwrap();

    let user = service
        .fetch::<User>("/users/5", HttpMethod::Get, RequestOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.name, "Ada");

    let created = service
        .fetch::<User>(
            "/users",
            HttpMethod::Post,
            RequestOptions::new().body(Parameters::new().with("name", "Linus")),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(created.name, "Linus");

    let err = service
        .fetch::<User>("/users/1000", HttpMethod::Get, RequestOptions::default())
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!((err.message.as_str(), err.code), ("not found", 404));

    store.set_token(Some("stale".to_string()));
    let outcome = service
        .fetch::<User>("/users/5", HttpMethod::Get, RequestOptions::default())
        .await;
    assert!(outcome.is_none());
    assert_eq!(store.logout_count(), 1);
}
