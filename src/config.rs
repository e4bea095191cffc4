use std::time::Duration;

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use tokio::sync::Semaphore;
use url::Url;

pub const DEFAULT_REQUESTS: u64 = 100;
pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_TIMEOUT_SECS: f64 = 2.0;
pub const DEFAULT_HISTOGRAM_BINS: usize = 20;

const MIN_TIMEOUT_SECS: f64 = 0.001;

/// Everything a run needs, fixed before the first request is sent.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub url: String,
    pub requests: u64,
    pub concurrency: usize,
    pub timeout: Duration,
    pub body: Option<Bytes>,
    pub histogram_bins: usize,
}

impl RunConfig {
    /// Builds a config from raw user input, falling back to defaults for
    /// out-of-range values. Only an unusable URL is an error.
    pub fn new(
        url: &str,
        requests: i64,
        concurrency: i64,
        timeout_secs: f64,
        body: Option<String>,
        histogram_bins: i64,
    ) -> Result<Self> {
        let parsed = Url::parse(url).with_context(|| format!("invalid URL: {url}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!("unsupported URL scheme {:?}, expected http or https", parsed.scheme());
        }

        let requests = if requests < 1 { DEFAULT_REQUESTS } else { requests as u64 };
        let concurrency = usize::try_from(concurrency.max(1))
            .unwrap_or(usize::MAX)
            .min(Semaphore::MAX_PERMITS);
        let timeout_secs = if timeout_secs.is_finite() && timeout_secs >= MIN_TIMEOUT_SECS {
            timeout_secs
        } else {
            DEFAULT_TIMEOUT_SECS
        };
        let body = body.filter(|b| !b.is_empty()).map(Bytes::from);

        Ok(RunConfig {
            url: url.to_string(),
            requests,
            concurrency,
            timeout: Duration::from_secs_f64(timeout_secs),
            body,
            histogram_bins: histogram_bins.max(0) as usize,
        })
    }
}
