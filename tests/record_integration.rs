//! End-to-end recording through a real listener and upstream

mod common;

use hyper::header::CONTENT_TYPE;
use hyper::StatusCode;
use serde_json::{json, Value};

use common::{get, spawn_upstream, wait_until, Recorder};
use pmok::artifact::{JsonBody, MockArtifact};

fn read_artifact(path: &std::path::Path) -> MockArtifact<JsonBody> {
    let content = std::fs::read_to_string(path).unwrap();
    serde_json::from_str(&content).unwrap()
}

#[tokio::test]
async fn test_json_response_is_recorded() {
    let upstream = spawn_upstream().await;
    let recorder = Recorder::start(&format!("http://{upstream}")).await;

    let (status, headers, body) = get(recorder.addr, "/users/42", &[("x-test", "1")]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_ref(), br#"{"id":42}"#);
    assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");

    let stats = recorder.stats.clone();
    wait_until(|| stats.snapshot().written == 1).await;

    let artifact = read_artifact(&recorder.artifact("_users_42.json"));
    assert_eq!(artifact.request.method, "GET");
    assert_eq!(artifact.request.path, "/users/42");
    assert_eq!(artifact.request.headers["x-test"], vec!["1".to_string()]);
    assert!(!artifact.request.headers.contains_key("host"));
    assert_eq!(artifact.response.status, 200);
    assert_eq!(
        artifact.response.headers["content-type"],
        vec!["application/json".to_string()]
    );
    assert_eq!(artifact.response.headers["x-upstream"], vec!["yes".to_string()]);
    assert_eq!(Value::Object(artifact.response.body), json!({"id": 42}));

    recorder.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_repeated_request_overwrites_artifact() {
    let upstream = spawn_upstream().await;
    let recorder = Recorder::start(&format!("http://{upstream}")).await;

    get(recorder.addr, "/counter", &[]).await;
    let stats = recorder.stats.clone();
    wait_until(|| stats.snapshot().written == 1).await;

    get(recorder.addr, "/counter", &[]).await;
    wait_until(|| stats.snapshot().written == 2).await;

    assert_eq!(recorder.artifact_count(), 1);
    let artifact = read_artifact(&recorder.artifact("_counter.json"));
    assert_eq!(Value::Object(artifact.response.body), json!({"hits": 2}));

    recorder.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unsupported_content_type_is_not_recorded() {
    let upstream = spawn_upstream().await;
    let recorder = Recorder::start(&format!("http://{upstream}")).await;

    let (status, _, body) = get(recorder.addr, "/notes", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_ref(), b"plain words");

    let stats = recorder.stats.clone();
    wait_until(|| stats.snapshot().skipped == 1).await;
    assert_eq!(recorder.artifact_count(), 0);

    recorder.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_invalid_json_still_reaches_caller() {
    let upstream = spawn_upstream().await;
    let recorder = Recorder::start(&format!("http://{upstream}")).await;

    let (status, _, body) = get(recorder.addr, "/broken", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_ref(), b"{not json");

    let stats = recorder.stats.clone();
    wait_until(|| stats.snapshot().failed == 1).await;
    assert!(!recorder.artifact("_broken.json").exists());

    // The pipeline keeps going after a failed artifact.
    get(recorder.addr, "/users/42", &[]).await;
    wait_until(|| stats.snapshot().written == 1).await;

    recorder.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_upstream_error_status_passes_through() {
    let upstream = spawn_upstream().await;
    let recorder = Recorder::start(&format!("http://{upstream}")).await;

    let (status, _, body) = get(recorder.addr, "/missing", &[]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body.as_ref(), b"not found");

    // text/plain: passed through, not recorded
    let stats = recorder.stats.clone();
    wait_until(|| stats.snapshot().skipped == 1).await;

    recorder.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_requests_write_one_at_a_time() {
    const REQUESTS: usize = 8;

    let upstream = spawn_upstream().await;
    let recorder = Recorder::start(&format!("http://{upstream}")).await;

    let mut handles = Vec::new();
    for i in 0..REQUESTS {
        let addr = recorder.addr;
        handles.push(tokio::spawn(async move {
            let path = format!("/items/{i}");
            let (status, _, body) = get(addr, &path, &[]).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, format!(r#"{{"path":"/items/{i}"}}"#));
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let stats = recorder.stats.clone();
    wait_until(|| stats.snapshot().written == REQUESTS).await;

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.received, REQUESTS);
    assert_eq!(snapshot.max_in_flight, 1);
    assert_eq!(recorder.artifact_count(), REQUESTS);
    assert!(recorder.artifact("_items_3.json").exists());

    recorder.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_client_disconnect_does_not_cancel_recording() {
    use tokio::io::AsyncWriteExt;

    let upstream = spawn_upstream().await;
    let recorder = Recorder::start(&format!("http://{upstream}")).await;

    let mut stream = tokio::net::TcpStream::connect(recorder.addr).await.unwrap();
    stream
        .write_all(b"GET /items/7 HTTP/1.1\r\nhost: localhost\r\n\r\n")
        .await
        .unwrap();
    // Hang up while the target is still working on the answer.
    tokio::time::sleep(common::SLOW_ROUTE_DELAY / 5).await;
    drop(stream);

    let stats = recorder.stats.clone();
    wait_until(|| stats.snapshot().written == 1).await;
    let artifact = read_artifact(&recorder.artifact("_items_7.json"));
    assert_eq!(Value::Object(artifact.response.body), json!({"path": "/items/7"}));

    recorder.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_query_is_forwarded_but_not_part_of_name() {
    let upstream = spawn_upstream().await;
    let recorder = Recorder::start(&format!("http://{upstream}")).await;

    let (status, _, _) = get(recorder.addr, "/users/42?verbose=true", &[]).await;
    assert_eq!(status, StatusCode::OK);

    let stats = recorder.stats.clone();
    wait_until(|| stats.snapshot().written == 1).await;
    let artifact = read_artifact(&recorder.artifact("_users_42.json"));
    assert_eq!(artifact.request.path, "/users/42");

    recorder.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_target_returns_bad_gateway() {
    let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let target = format!("http://{}", closed.local_addr().unwrap());
    drop(closed);

    let recorder = Recorder::start(&target).await;

    let (status, _, _) = get(recorder.addr, "/users/42", &[]).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(recorder.stats.snapshot().received, 0);
    assert_eq!(recorder.artifact_count(), 0);

    recorder.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_graceful_shutdown_after_traffic() {
    let upstream = spawn_upstream().await;
    let recorder = Recorder::start(&format!("http://{upstream}")).await;

    get(recorder.addr, "/users/42", &[]).await;
    let stats = recorder.stats.clone();
    wait_until(|| stats.snapshot().written == 1).await;

    assert!(recorder.shutdown().await.is_ok());
}
