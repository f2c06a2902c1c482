//! Stage 1 orchestrator.
//!
//! Drains the URL list through the [`AdmissionController`]'s current gate.
//! Workers are plain futures polled from a single `FuturesUnordered`; only
//! the orchestrator loop reads or mutates the controller, and only between
//! completions.

use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use livecheck_core::{AdmissionConfig, ProbeMethod, ProbeResult, StageFailure};
use tokio::sync::OwnedSemaphorePermit;

use crate::admission::AdmissionController;
use crate::error::ProbeError;
use crate::reachability::ReachabilityClient;
use crate::retry::retry_with_backoff;

/// Statuses in this range count as reachable.
const LIVE_STATUS: std::ops::Range<u16> = 200..400;

pub struct AdmissionProber<C> {
    client: C,
    config: AdmissionConfig,
}

/// A successful attempt: which request answered and how.
struct Reached {
    method: ProbeMethod,
    status: u16,
    latency_ms: u64,
}

impl<C: ReachabilityClient> AdmissionProber<C> {
    pub fn new(client: C, config: AdmissionConfig) -> Self {
        Self { client, config }
    }

    /// Probes every URL and returns one [`ProbeResult`] each, in completion
    /// order. A failing URL is recorded on its result and never aborts the
    /// batch.
    pub async fn run(&self, urls: &[String]) -> Vec<ProbeResult> {
        let total = urls.len();
        let mut results = Vec::with_capacity(total);
        if total == 0 {
            return results;
        }

        let mut controller = AdmissionController::new(&self.config);
        let mut pending = urls.iter();
        let mut next_url = pending.next();
        let mut in_flight = FuturesUnordered::new();
        let mut last_logged_pct = 0usize;

        tracing::info!(
            total,
            concurrency = controller.concurrency(),
            timeout_secs = controller.timeout_secs(),
            "stage 1 starting"
        );

        loop {
            let gate = controller.gate();
            tokio::select! {
                biased;

                Some(result) = in_flight.next(), if !in_flight.is_empty() => {
                    let result: ProbeResult = result;
                    if let Some(adj) = controller.record(result.reachable, result.latency_ms) {
                        if adj.changed() {
                            tracing::info!(
                                concurrency = adj.new_concurrency,
                                previous_concurrency = adj.old_concurrency,
                                timeout_secs = adj.new_timeout_secs,
                                previous_timeout_secs = adj.old_timeout_secs,
                                success_rate = format!("{:.2}", adj.success_rate),
                                avg_latency_ms = format!("{:.0}", adj.avg_latency_ms),
                                "admission bounds adjusted"
                            );
                        }
                    }
                    results.push(result);

                    let pct = results.len() * 100 / total;
                    if pct > last_logged_pct {
                        last_logged_pct = pct;
                        tracing::info!(
                            checked = results.len(),
                            total,
                            percent = pct,
                            concurrency = controller.concurrency(),
                            timeout_secs = controller.timeout_secs(),
                            success_rate = format!("{:.2}", controller.success_rate()),
                            avg_latency_ms = format!("{:.0}", controller.avg_latency_ms()),
                            "stage 1 progress"
                        );
                    }
                }

                permit = gate.acquire_owned(), if next_url.is_some() => {
                    // Gates are never closed, so acquisition cannot fail.
                    let Ok(permit) = permit else { break };
                    if let Some(url) = next_url.take() {
                        in_flight.push(self.probe_one(url, controller.timeout(), permit));
                    }
                    next_url = pending.next();
                }

                else => break,
            }
        }

        let reachable = results.iter().filter(|r| r.reachable).count();
        tracing::info!(
            total,
            reachable,
            unreachable = total - reachable,
            "stage 1 complete"
        );
        results
    }

    async fn probe_one(
        &self,
        url: &str,
        timeout: Duration,
        _permit: OwnedSemaphorePermit,
    ) -> ProbeResult {
        let (outcome, attempts) = retry_with_backoff(
            self.config.max_attempts,
            self.config.backoff_base_ms,
            || self.attempt(url, timeout),
        )
        .await;

        match outcome {
            Ok(reached) => {
                tracing::debug!(
                    url,
                    method = ?reached.method,
                    status = reached.status,
                    latency_ms = reached.latency_ms,
                    "reachable"
                );
                ProbeResult {
                    url: url.to_owned(),
                    reachable: true,
                    latency_ms: Some(reached.latency_ms),
                    method_used: Some(reached.method),
                    status: Some(reached.status),
                    attempts,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(url, attempts, error = %e, "unreachable");
                let status = match &e {
                    ProbeError::UnexpectedStatus { status, .. } => Some(*status),
                    _ => None,
                };
                ProbeResult {
                    url: url.to_owned(),
                    reachable: false,
                    latency_ms: None,
                    method_used: None,
                    status,
                    attempts,
                    error: Some(StageFailure::new(e.kind(), e.to_string())),
                }
            }
        }
    }

    /// One attempt: HEAD, then a capped GET when HEAD errors or answers with
    /// a non-live status. The GET's outcome decides the attempt.
    async fn attempt(&self, url: &str, timeout: Duration) -> Result<Reached, ProbeError> {
        let started = Instant::now();
        match self.client.head(url, timeout).await {
            Ok(status) if LIVE_STATUS.contains(&status) => {
                return Ok(Reached {
                    method: ProbeMethod::Head,
                    status,
                    latency_ms: elapsed_ms(started),
                });
            }
            Ok(status) => tracing::debug!(url, status, "HEAD not accepted, falling back to GET"),
            Err(e) => tracing::debug!(url, error = %e, "HEAD failed, falling back to GET"),
        }

        let started = Instant::now();
        let read = self
            .client
            .fetch_prefix(url, timeout, self.config.prefix_bytes)
            .await?;
        if LIVE_STATUS.contains(&read.status) {
            Ok(Reached {
                method: ProbeMethod::Get,
                status: read.status,
                latency_ms: elapsed_ms(started),
            })
        } else {
            Err(ProbeError::UnexpectedStatus {
                status: read.status,
                url: url.to_owned(),
            })
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use livecheck_core::FailureKind;

    use super::*;
    use crate::reachability::PrefixRead;

    /// Scripted responses per URL. Unknown URLs refuse the connection.
    #[derive(Default)]
    struct ScriptedClient {
        head: HashMap<String, u16>,
        get: HashMap<String, u16>,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl ScriptedClient {
        async fn track<T>(&self, value: T) -> T {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            value
        }
    }

    #[async_trait]
    impl ReachabilityClient for ScriptedClient {
        async fn head(&self, url: &str, _timeout: Duration) -> Result<u16, ProbeError> {
            let status = self.head.get(url).copied().unwrap_or(503);
            self.track(Ok(status)).await
        }

        async fn fetch_prefix(
            &self,
            url: &str,
            _timeout: Duration,
            _max_bytes: usize,
        ) -> Result<PrefixRead, ProbeError> {
            let result = match self.get.get(url) {
                Some(&status) => Ok(PrefixRead {
                    status,
                    bytes_read: 16,
                }),
                None => Err(ProbeError::UnexpectedStatus {
                    status: 503,
                    url: url.to_owned(),
                }),
            };
            self.track(result).await
        }
    }

    fn config(concurrency: usize) -> AdmissionConfig {
        AdmissionConfig {
            initial_concurrency: concurrency,
            min_concurrency: 1,
            max_concurrency: concurrency,
            batch_size: 10,
            max_attempts: 2,
            backoff_base_ms: 0,
            ..AdmissionConfig::default()
        }
    }

    #[tokio::test]
    async fn one_result_per_url() {
        let urls: Vec<String> = (0..57).map(|i| format!("http://s{i}.test/live")).collect();
        let mut client = ScriptedClient::default();
        for (i, u) in urls.iter().enumerate() {
            if i % 3 != 0 {
                client.head.insert(u.clone(), 200);
            }
        }
        let prober = AdmissionProber::new(client, config(8));
        let results = prober.run(&urls).await;

        assert_eq!(results.len(), urls.len());
        let seen: HashSet<&str> = results.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(seen.len(), urls.len(), "no URL duplicated or dropped");
        assert_eq!(results.iter().filter(|r| r.reachable).count(), 38);
    }

    #[tokio::test]
    async fn head_success_uses_head() {
        let url = "http://ok.test/live".to_owned();
        let mut client = ScriptedClient::default();
        client.head.insert(url.clone(), 204);
        let results = AdmissionProber::new(client, config(2)).run(&[url]).await;
        assert!(results[0].reachable);
        assert_eq!(results[0].method_used, Some(ProbeMethod::Head));
        assert_eq!(results[0].attempts, 1);
    }

    #[tokio::test]
    async fn rejected_head_falls_back_to_get() {
        let url = "http://nohead.test/live".to_owned();
        let mut client = ScriptedClient::default();
        client.head.insert(url.clone(), 405);
        client.get.insert(url.clone(), 200);
        let results = AdmissionProber::new(client, config(2)).run(&[url]).await;
        assert!(results[0].reachable);
        assert_eq!(results[0].method_used, Some(ProbeMethod::Get));
        assert_eq!(results[0].status, Some(200));
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let url = "http://gone.test/live".to_owned();
        let mut client = ScriptedClient::default();
        client.head.insert(url.clone(), 404);
        client.get.insert(url.clone(), 404);
        let results = AdmissionProber::new(client, config(2)).run(&[url]).await;
        let r = &results[0];
        assert!(!r.reachable);
        assert_eq!(r.attempts, 1);
        assert_eq!(r.status, Some(404));
        assert_eq!(r.error.as_ref().map(|e| e.kind), Some(FailureKind::Network));
    }

    #[tokio::test]
    async fn server_error_exhausts_attempts() {
        let url = "http://down.test/live".to_owned();
        let results = AdmissionProber::new(ScriptedClient::default(), config(2))
            .run(&[url])
            .await;
        assert!(!results[0].reachable);
        assert_eq!(results[0].attempts, 2);
    }

    #[tokio::test]
    async fn in_flight_never_exceeds_initial_bound() {
        let urls: Vec<String> = (0..40).map(|i| format!("http://s{i}.test/live")).collect();
        let mut client = ScriptedClient::default();
        for u in &urls {
            client.head.insert(u.clone(), 200);
        }
        let peak = Arc::clone(&client.peak);
        let mut cfg = config(3);
        cfg.batch_size = 1_000;
        AdmissionProber::new(client, cfg).run(&urls).await;
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn empty_input_yields_nothing() {
        let results = AdmissionProber::new(ScriptedClient::default(), config(2))
            .run(&[])
            .await;
        assert!(results.is_empty());
    }
}
