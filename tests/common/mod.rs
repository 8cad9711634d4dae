//! Shared fixtures: a scripted upstream and a recorder bound to a temp dir

#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{HeaderMap, Request, Response, StatusCode};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use pmok::capture::CaptureStats;
use pmok::config::{RecordCommand, RecorderConfig, Settings};
use pmok::server::RecorderServer;

/// Delay applied by the `/items/*` route
pub const SLOW_ROUTE_DELAY: Duration = Duration::from_millis(50);

/// Start an upstream on an ephemeral port.
///
/// Routes:
/// - `/users/42`: `{"id":42}` as JSON with an `x-upstream` header
/// - `/notes`: plain text
/// - `/broken`: invalid JSON labelled as JSON
/// - `/counter`: `{"hits":n}`, counting calls
/// - `/items/*`: JSON echo of the path after a short delay
/// - anything else: 404 text
pub async fn spawn_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let hits = Arc::clone(&hits);
            let service = service_fn(move |request: Request<Incoming>| {
                let hits = Arc::clone(&hits);
                let path = request.uri().path().to_string();
                async move { Ok::<_, Infallible>(route(&path, &hits).await) }
            });
            tokio::spawn(async move {
                let _ = http1::Builder::new()
                    .timer(TokioTimer::new())
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    addr
}

async fn route(path: &str, hits: &AtomicUsize) -> Response<Full<Bytes>> {
    match path {
        "/users/42" => {
            let mut response = respond("application/json", r#"{"id":42}"#.to_string());
            response
                .headers_mut()
                .insert("x-upstream", HeaderValue::from_static("yes"));
            response
        }
        "/notes" => respond("text/plain; charset=utf-8", "plain words".to_string()),
        "/broken" => respond("application/json", "{not json".to_string()),
        "/counter" => {
            let n = hits.fetch_add(1, Ordering::SeqCst) + 1;
            respond("application/json", format!(r#"{{"hits":{n}}}"#))
        }
        _ if path.starts_with("/items/") => {
            tokio::time::sleep(SLOW_ROUTE_DELAY).await;
            respond("application/json", format!(r#"{{"path":"{path}"}}"#))
        }
        _ => {
            let mut response = respond("text/plain", "not found".to_string());
            *response.status_mut() = StatusCode::NOT_FOUND;
            response
        }
    }
}

fn respond(content_type: &'static str, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// A running recorder and the directory it writes to
pub struct Recorder {
    pub addr: SocketAddr,
    pub destination: PathBuf,
    pub stats: Arc<CaptureStats>,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<pmok::Result<()>>,
    _temp_dir: TempDir,
}

impl Recorder {
    /// Bind a recorder for `target` on an ephemeral port and start serving
    pub async fn start(target: &str) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let command = RecordCommand {
            target: target.to_string(),
            responses_path: Some("recorded".to_string()),
        };
        let mut settings = Settings::default();
        settings.listen.port = 0;
        let config = RecorderConfig::new(&command, temp_dir.path(), &settings).unwrap();
        let destination = config.destination_dir.clone();

        let server = RecorderServer::bind(config).await.unwrap();
        let addr = server.local_addr();
        let stats = server.stats();
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run(async {
            let _ = stopped.await;
        }));

        Self {
            addr,
            destination,
            stats,
            stop,
            handle,
            _temp_dir: temp_dir,
        }
    }

    /// Path of the artifact recorded for `file_name`
    pub fn artifact(&self, file_name: &str) -> PathBuf {
        self.destination.join(file_name)
    }

    /// Number of files in the destination directory
    pub fn artifact_count(&self) -> usize {
        std::fs::read_dir(&self.destination).unwrap().count()
    }

    /// Signal shutdown and wait for the server to return
    pub async fn shutdown(self) -> pmok::Result<()> {
        let _ = self.stop.send(());
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("recorder did not shut down")
            .unwrap()
    }
}

/// Issue a GET through the recorder
pub async fn get(
    addr: SocketAddr,
    path: &str,
    headers: &[(&'static str, &'static str)],
) -> (StatusCode, HeaderMap, Bytes) {
    let client = Client::builder(TokioExecutor::new()).build_http::<Full<Bytes>>();
    let mut request = Request::get(format!("http://{addr}{path}"))
        .body(Full::new(Bytes::new()))
        .unwrap();
    for (name, value) in headers {
        request
            .headers_mut()
            .insert(*name, HeaderValue::from_static(value));
    }

    let response = client.request(request).await.unwrap();
    let (parts, body) = response.into_parts();
    let body = body.collect().await.unwrap().to_bytes();
    (parts.status, parts.headers, body)
}

/// Poll `condition` until it holds or a few seconds pass
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
