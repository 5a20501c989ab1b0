use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use tokio::net::TcpListener;

/// One request received by the mock ingestion endpoint.
#[derive(Debug, Clone)]
pub struct CollectedRequest {
    pub path: String,
    pub query: HashMap<String, String>,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub body: Bytes,
}

impl CollectedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("collected body is not JSON")
    }

    /// The `line` field of every record in the payload, in order.
    pub fn lines(&self) -> Vec<String> {
        self.json()["lines"]
            .as_array()
            .expect("payload has no lines array")
            .iter()
            .map(|l| l["line"].as_str().unwrap().to_owned())
            .collect()
    }
}

pub type CollectorStore = Arc<Mutex<Vec<CollectedRequest>>>;

pub struct Collector {
    pub port: u16,
    pub store: CollectorStore,
}

impl Collector {
    /// Start a collector answering every POST with `status` and `reply`.
    pub async fn start(status: StatusCode, reply: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind collector listener");
        let port = listener.local_addr().unwrap().port();

        let store: CollectorStore = Arc::new(Mutex::new(Vec::new()));
        let store_clone = store.clone();

        tokio::spawn(async move {
            loop {
                let (stream, _) = listener
                    .accept()
                    .await
                    .expect("failed to accept connection");
                let store = store_clone.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let store = store.clone();
                        handle(req, store, status, reply)
                    });
                    let _ = Builder::new(TokioExecutor::new())
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self { port, store }
    }

    pub async fn ok() -> Self {
        Self::start(StatusCode::OK, "").await
    }

    /// Wait until at least `min_expected` requests arrived or `timeout`
    /// elapsed, then take everything collected so far.
    pub async fn drain(&self, timeout: Duration, min_expected: usize) -> Vec<CollectedRequest> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if self.store.lock().unwrap().len() >= min_expected {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        self.store.lock().unwrap().drain(..).collect()
    }
}

async fn handle<B>(
    req: Request<B>,
    store: CollectorStore,
    status: StatusCode,
    reply: &'static str,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
{
    if req.method() != Method::POST {
        return Ok(Response::builder()
            .status(StatusCode::METHOD_NOT_ALLOWED)
            .body(Full::default())
            .unwrap());
    }

    let path = req.uri().path().to_owned();
    let query = req
        .uri()
        .query()
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default();

    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_owned())
    };
    let content_type = header("content-type");
    let content_encoding = header("content-encoding");

    let body = req
        .collect()
        .await
        .map(|c| c.to_bytes())
        .unwrap_or_default();

    store.lock().unwrap().push(CollectedRequest {
        path,
        query,
        content_type,
        content_encoding,
        body,
    });

    Ok(Response::builder()
        .status(status)
        .body(Full::new(Bytes::from_static(reply.as_bytes())))
        .unwrap())
}
