use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Full;
use http_test_util::drain::DrainBodyFuture;
use http_test_util::empty_body;
use hyper::{Request, StatusCode, Uri};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{info, warn};

/// Performs one request/response exchange against a target.
///
/// Implementations report failures through their own logging; callers only
/// look at whether the exchange succeeded.
#[async_trait]
pub trait Requester: Send + 'static {
    async fn request(&mut self, target: &Uri) -> Result<()>;
}

/// Builds the clients a run hands out to its workers, one per concurrency slot.
pub trait ClientFactory: Send + Sync {
    type Client: Requester;

    fn create(&self, target: &Uri) -> Result<Self::Client>;
}

impl<F, R> ClientFactory for F
where
    F: Fn(&Uri) -> Result<R> + Send + Sync,
    R: Requester,
{
    type Client = R;

    fn create(&self, target: &Uri) -> Result<R> {
        self(target)
    }
}

#[derive(Clone)]
pub struct HttpRequester {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    timeout: Option<Duration>,
}

impl HttpRequester {
    #[must_use]
    pub fn new(timeout: Option<Duration>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpsConnector::new());
        Self { client, timeout }
    }

    async fn send_recv(&self, request: Request<Full<Bytes>>) -> Result<(StatusCode, usize)> {
        let resp = self
            .client
            .request(request)
            .await
            .context("Failed to send request")?;
        let status = resp.status();
        let len = DrainBodyFuture::new(resp.into_body()).await?;
        Ok((status, len))
    }

    async fn exchange(&self, target: &Uri) -> Result<(StatusCode, usize)> {
        let request = Request::get(target.clone())
            .body(empty_body())
            .context("Failed to build request")?;
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.send_recv(request))
                .await
                .map_err(|_| anyhow!("Request timed out after {timeout:?}"))?,
            None => self.send_recv(request).await,
        }
    }
}

#[async_trait]
impl Requester for HttpRequester {
    async fn request(&mut self, target: &Uri) -> Result<()> {
        match self.exchange(target).await {
            Ok((status, bytes)) if status.is_success() => {
                info!(status = status.as_u16(), bytes, "Request complete");
                Ok(())
            }
            Ok((status, bytes)) => {
                warn!(status = status.as_u16(), bytes, "Request complete with error status");
                bail!("Unexpected response status {status}")
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Request failed");
                Err(e)
            }
        }
    }
}

/// Creates [`HttpRequester`]s for `http` and `https` targets.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpClientFactory {
    timeout: Option<Duration>,
}

impl HttpClientFactory {
    #[must_use]
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl ClientFactory for HttpClientFactory {
    type Client = HttpRequester;

    fn create(&self, _target: &Uri) -> Result<HttpRequester> {
        Ok(HttpRequester::new(self.timeout))
    }
}
