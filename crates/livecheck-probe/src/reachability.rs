//! Reachability capability used by stage 1.
//!
//! The prober only needs two calls: a lightweight existence check and a
//! fuller fetch that reads a small body prefix. Both take a per-call timeout
//! because the admission controller changes the timeout while a batch runs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::ProbeError;

/// Result of a capped GET: the status and how many body bytes were read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixRead {
    pub status: u16,
    pub bytes_read: usize,
}

#[async_trait]
pub trait ReachabilityClient: Send + Sync {
    /// Existence check. Returns the HTTP status of a HEAD request.
    async fn head(&self, url: &str, timeout: Duration) -> Result<u16, ProbeError>;

    /// Fuller check. Issues a GET and reads at most `max_bytes` of the body
    /// when the status is a success.
    async fn fetch_prefix(
        &self,
        url: &str,
        timeout: Duration,
        max_bytes: usize,
    ) -> Result<PrefixRead, ProbeError>;
}

/// `reqwest`-backed [`ReachabilityClient`].
#[derive(Clone)]
pub struct HttpReachabilityClient {
    client: Client,
}

impl HttpReachabilityClient {
    /// Creates a client with the given `User-Agent`. Timeouts are supplied
    /// per call.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(user_agent: &str) -> Result<Self, ProbeError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ReachabilityClient for HttpReachabilityClient {
    async fn head(&self, url: &str, timeout: Duration) -> Result<u16, ProbeError> {
        let response = self.client.head(url).timeout(timeout).send().await?;
        Ok(response.status().as_u16())
    }

    async fn fetch_prefix(
        &self,
        url: &str,
        timeout: Duration,
        max_bytes: usize,
    ) -> Result<PrefixRead, ProbeError> {
        let mut response = self.client.get(url).timeout(timeout).send().await?;
        let status = response.status();
        let mut bytes_read = 0usize;
        if status.is_success() {
            // Live streams never end; stop once the prefix is in hand.
            while bytes_read < max_bytes {
                match response.chunk().await? {
                    Some(chunk) => bytes_read += chunk.len(),
                    None => break,
                }
            }
        }
        Ok(PrefixRead {
            status: status.as_u16(),
            bytes_read,
        })
    }
}
