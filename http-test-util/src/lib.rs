pub mod drain;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[inline]
pub fn empty_body() -> Full<Bytes> {
    Full::new(Bytes::new())
}

#[inline]
pub fn byte_body<B: Into<Bytes>>(bytes: B) -> Full<Bytes> {
    Full::new(bytes.into())
}

/// Number of load requests a [`TargetServer`] has answered.
#[derive(Clone, Default)]
pub struct HitCounter {
    count: Arc<AtomicU64>,
}

impl HitCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record(&self) -> u64 {
        self.count.fetch_add(1, Ordering::AcqRel) + 1
    }

    #[inline]
    #[must_use]
    pub fn get(&self) -> HitCountResponse {
        HitCountResponse {
            hits: self.count.load(Ordering::Acquire),
        }
    }
}

#[derive(Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HitCountResponse {
    pub hits: u64,
}

/// How the target answers every request outside of `/count`.
#[derive(Debug, Clone, Copy)]
pub struct TargetBehaviour {
    pub status: StatusCode,
    pub delay: Option<Duration>,
}

impl TargetBehaviour {
    #[must_use]
    pub fn status(status: StatusCode) -> Self {
        Self {
            status,
            delay: None,
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl Default for TargetBehaviour {
    fn default() -> Self {
        Self::status(StatusCode::OK)
    }
}

/// An http1 server on an ephemeral loopback port that counts the requests it receives.
///
/// `GET /count` reports the hit count as json and is not itself counted.
/// The accept loop is aborted when the server is dropped.
pub struct TargetServer {
    addr: SocketAddr,
    hits: HitCounter,
    accept_loop: JoinHandle<()>,
}

impl TargetServer {
    pub async fn spawn(behaviour: TargetBehaviour) -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("Failed to bind target listener")?;
        let addr = listener
            .local_addr()
            .context("Failed to read target address")?;
        let hits = HitCounter::new();
        let accept_loop = tokio::spawn(accept_loop(listener, hits.clone(), behaviour));
        Ok(Self {
            addr,
            hits,
            accept_loop,
        })
    }

    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.get().hits
    }
}

impl Drop for TargetServer {
    fn drop(&mut self) {
        self.accept_loop.abort();
    }
}

async fn accept_loop(listener: TcpListener, hits: HitCounter, behaviour: TargetBehaviour) {
    loop {
        let (tcp, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "Target failed to accept connection");
                continue;
            }
        };
        let tcp = TokioIo::new(tcp);
        let hits = hits.clone();
        tokio::task::spawn(async move {
            let served = hyper::server::conn::http1::Builder::new()
                .serve_connection(
                    tcp,
                    service_fn(move |req| respond(hits.clone(), behaviour, req)),
                )
                .await;
            if let Err(e) = served {
                tracing::debug!(%peer, error = %e, "Target connection closed with error");
            }
        });
    }
}

async fn respond(
    hits: HitCounter,
    behaviour: TargetBehaviour,
    incoming: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    if incoming.uri().path() == "/count" && incoming.method() == Method::GET {
        let payload = serde_json::to_vec(&hits.get()).unwrap_or_default();
        let mut resp = Response::new(byte_body(payload));
        resp.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        return Ok(resp);
    }
    if let Some(delay) = behaviour.delay {
        tokio::time::sleep(delay).await;
    }
    hits.record();
    let mut resp = Response::new(byte_body("ok"));
    *resp.status_mut() = behaviour.status;
    Ok(resp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_counter_counts_from_zero() {
        let hits = HitCounter::new();
        assert_eq!(hits.get(), HitCountResponse { hits: 0 });
        assert_eq!(hits.record(), 1);
        assert_eq!(hits.record(), 2);
        assert_eq!(hits.get().hits, 2);
    }

    #[tokio::test]
    async fn target_url_points_at_loopback() {
        let server = TargetServer::spawn(TargetBehaviour::default()).await.unwrap();
        assert!(server.url().starts_with("http://127.0.0.1:"));
        assert_eq!(server.hits(), 0);
    }

    async fn raw_get(addr: SocketAddr, path: &str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        let mut tcp = tokio::net::TcpStream::connect(addr).await.unwrap();
        let req = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
        tcp.write_all(req.as_bytes()).await.unwrap();
        let mut resp = String::new();
        tcp.read_to_string(&mut resp).await.unwrap();
        resp
    }

    #[tokio::test]
    async fn counts_hits_but_not_count_queries() {
        let server = TargetServer::spawn(TargetBehaviour::status(StatusCode::ACCEPTED))
            .await
            .unwrap();
        let resp = raw_get(server.addr(), "/").await;
        assert!(resp.starts_with("HTTP/1.1 202"));
        raw_get(server.addr(), "/anything").await;

        let resp = raw_get(server.addr(), "/count").await;
        assert!(resp.starts_with("HTTP/1.1 200"));
        let body = resp.split("\r\n\r\n").nth(1).unwrap();
        let count: HitCountResponse = serde_json::from_str(body).unwrap();
        assert_eq!(count, HitCountResponse { hits: 2 });
        assert_eq!(server.hits(), 2);
    }
}
