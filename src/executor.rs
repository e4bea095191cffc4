use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, Uri};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use tokio::time;

use crate::config::RunConfig;

type Client = HyperClient<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Result of a single request attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub sequence: u64,
    /// Measured around the whole attempt, including request construction.
    pub wall_time: Duration,
    /// From sending the request until the body was fully read.
    pub total_time: Duration,
    /// From sending the request until the response head arrived.
    pub ttfb: Duration,
    pub bytes_uploaded: u64,
    pub bytes_downloaded: u64,
    /// `0` when no response was received.
    pub status: u16,
    pub timed_out: bool,
}

impl Outcome {
    fn no_response(sequence: u64, wall_time: Duration, total_time: Duration, timed_out: bool) -> Self {
        Outcome {
            sequence,
            wall_time,
            total_time,
            ttfb: Duration::ZERO,
            bytes_uploaded: 0,
            bytes_downloaded: 0,
            status: 0,
            timed_out,
        }
    }

    pub fn is_success(&self) -> bool {
        !self.timed_out && (200..=299).contains(&self.status)
    }
}

/// Performs one request per call. Implementations must never fail: every
/// failure mode is encoded in the returned [`Outcome`].
pub trait Execute: Send + Sync + 'static {
    fn execute(&self, sequence: u64) -> impl Future<Output = Outcome> + Send;
}

struct Exchange {
    ttfb: Duration,
    total_time: Duration,
    status: u16,
    bytes_downloaded: u64,
}

pub struct RequestExecutor {
    client: Client,
    uri: Uri,
    body: Option<Bytes>,
    timeout: Duration,
}

impl RequestExecutor {
    pub fn new(config: &RunConfig) -> Result<Self> {
        let uri = config
            .url
            .parse::<Uri>()
            .with_context(|| format!("invalid request URI: {}", config.url))?;

        let mut http = HttpConnector::new();
        http.enforce_http(false);
        let https = HttpsConnector::new_with_connector(http);
        // The legacy client never follows redirects, so a 3xx is one measured request.
        let client = HyperClient::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(30))
            .build(https);

        Ok(RequestExecutor {
            client,
            uri,
            body: config.body.clone(),
            timeout: config.timeout,
        })
    }

    async fn exchange(&self, request: Request<Full<Bytes>>) -> Result<Exchange> {
        let sent = Instant::now();
        let response = self.client.request(request).await?;
        let ttfb = sent.elapsed();
        let status = response.status().as_u16();
        let body = response.into_body().collect().await?.to_bytes();

        Ok(Exchange {
            ttfb,
            total_time: sent.elapsed(),
            status,
            bytes_downloaded: body.len() as u64,
        })
    }
}

impl Execute for RequestExecutor {
    async fn execute(&self, sequence: u64) -> Outcome {
        let start = Instant::now();

        let (method, body) = match &self.body {
            Some(body) => (Method::POST, body.clone()),
            None => (Method::GET, Bytes::new()),
        };
        let bytes_uploaded = body.len() as u64;
        let request = match Request::builder()
            .method(method)
            .uri(self.uri.clone())
            .body(Full::new(body))
        {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(sequence, "Failed to build request: {}", e);
                return Outcome::no_response(sequence, start.elapsed(), Duration::ZERO, false);
            }
        };

        let sent = Instant::now();
        match time::timeout(self.timeout, self.exchange(request)).await {
            Ok(Ok(exchange)) => {
                let outcome = Outcome {
                    sequence,
                    wall_time: start.elapsed(),
                    total_time: exchange.total_time,
                    ttfb: exchange.ttfb,
                    bytes_uploaded,
                    bytes_downloaded: exchange.bytes_downloaded,
                    status: exchange.status,
                    timed_out: false,
                };
                tracing::trace!(
                    sequence = outcome.sequence,
                    status = outcome.status,
                    total_ms = outcome.total_time.as_secs_f64() * 1000.0,
                    wall_ms = outcome.wall_time.as_secs_f64() * 1000.0,
                    "Request done"
                );
                outcome
            }
            Ok(Err(e)) => {
                tracing::debug!(sequence, "Request error: {:#}", e);
                Outcome::no_response(sequence, start.elapsed(), sent.elapsed(), false)
            }
            Err(_) => {
                tracing::debug!(sequence, "Request timeout");
                Outcome::no_response(sequence, start.elapsed(), sent.elapsed(), true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::body::Incoming;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Response, StatusCode};
    use hyper_util::rt::TokioIo;
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    async fn spawn_server<F, Fut>(handler: F) -> SocketAddr
    where
        F: Fn(Request<Incoming>) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<Response<Full<Bytes>>, Infallible>> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handler = handler.clone();
                tokio::spawn(async move {
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service_fn(handler))
                        .await;
                });
            }
        });
        addr
    }

    fn executor_for(addr: SocketAddr, timeout_secs: f64, body: Option<&str>) -> RequestExecutor {
        let config = RunConfig::new(
            &format!("http://{addr}/"),
            1,
            1,
            timeout_secs,
            body.map(str::to_string),
            0,
        )
        .unwrap();
        RequestExecutor::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_successful_request() {
        let addr = spawn_server(|_req: Request<Incoming>| async {
            Ok(Response::new(Full::new(Bytes::from_static(b"hello"))))
        })
        .await;

        let outcome = executor_for(addr, 2.0, None).execute(1).await;
        assert_eq!(outcome.sequence, 1);
        assert_eq!(outcome.status, 200);
        assert!(!outcome.timed_out);
        assert!(outcome.is_success());
        assert_eq!(outcome.bytes_downloaded, 5);
        assert_eq!(outcome.bytes_uploaded, 0);
        assert!(outcome.ttfb <= outcome.total_time);
        assert!(outcome.total_time <= outcome.wall_time);
    }

    #[tokio::test]
    async fn test_body_is_posted() {
        let addr = spawn_server(|req: Request<Incoming>| async move {
            let is_post = req.method() == Method::POST;
            let received = req.into_body().collect().await.unwrap().to_bytes();
            let status = if is_post && received.as_ref() == b"payload" {
                StatusCode::CREATED
            } else {
                StatusCode::BAD_REQUEST
            };
            let mut response = Response::new(Full::new(Bytes::new()));
            *response.status_mut() = status;
            Ok(response)
        })
        .await;

        let outcome = executor_for(addr, 2.0, Some("payload")).execute(7).await;
        assert_eq!(outcome.sequence, 7);
        assert_eq!(outcome.status, 201);
        assert_eq!(outcome.bytes_uploaded, 7);
    }

    #[tokio::test]
    async fn test_redirect_is_not_followed() {
        let addr = spawn_server(|_req: Request<Incoming>| async {
            let mut response = Response::new(Full::new(Bytes::new()));
            *response.status_mut() = StatusCode::FOUND;
            response
                .headers_mut()
                .insert(hyper::header::LOCATION, "/elsewhere".parse().unwrap());
            Ok(response)
        })
        .await;

        let outcome = executor_for(addr, 2.0, None).execute(1).await;
        assert_eq!(outcome.status, 302);
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let addr = spawn_server(|_req: Request<Incoming>| async {
            time::sleep(Duration::from_millis(500)).await;
            Ok(Response::new(Full::new(Bytes::new())))
        })
        .await;

        let outcome = executor_for(addr, 0.05, None).execute(3).await;
        assert!(outcome.timed_out);
        assert_eq!(outcome.status, 0);
        assert!(outcome.wall_time >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_refused_connection_is_not_a_timeout() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let outcome = executor_for(addr, 2.0, None).execute(1).await;
        assert!(!outcome.timed_out);
        assert_eq!(outcome.status, 0);
        assert_eq!(outcome.bytes_downloaded, 0);
    }
}
