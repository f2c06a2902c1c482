//! Adaptive admission control for stage 1.
//!
//! The controller is owned by the stage orchestrator. Workers never touch
//! it: they receive a permit from the current gate plus a timeout snapshot.
//! The orchestrator reports each completion through [`AdmissionController::record`],
//! and every `batch_size` completions the controller recomputes the success
//! rate and average latency and may resize the concurrency bound or nudge
//! the timeout.
//!
//! Resizing never mutates the live gate. A fresh [`Semaphore`] sized to the
//! new bound replaces it; permits already handed out by the old gate stay
//! valid until their workers finish.

use std::sync::Arc;
use std::time::Duration;

use livecheck_core::{AdmissionConfig, AdmissionPolicy};
use tokio::sync::Semaphore;

/// What changed at a batch boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adjustment {
    pub old_concurrency: usize,
    pub new_concurrency: usize,
    pub old_timeout_secs: u64,
    pub new_timeout_secs: u64,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
}

impl Adjustment {
    pub fn changed(&self) -> bool {
        self.old_concurrency != self.new_concurrency
            || self.old_timeout_secs != self.new_timeout_secs
    }
}

pub struct AdmissionController {
    min_concurrency: usize,
    max_concurrency: usize,
    min_timeout_secs: u64,
    max_timeout_secs: u64,
    batch_size: u64,
    policy: AdmissionPolicy,
    concurrency: usize,
    timeout_secs: u64,
    gate: Arc<Semaphore>,
    checked: u64,
    successes: u64,
    total_latency_ms: u64,
}

impl AdmissionController {
    /// Builds a controller from stage 1 settings. The initial values are
    /// clamped into their bounds so a misconfigured start cannot escape them.
    pub fn new(config: &AdmissionConfig) -> Self {
        let min_concurrency = config.min_concurrency.max(1);
        let max_concurrency = config.max_concurrency.max(min_concurrency);
        let min_timeout_secs = config.min_timeout_secs.max(1);
        let max_timeout_secs = config.max_timeout_secs.max(min_timeout_secs);
        let concurrency = config
            .initial_concurrency
            .clamp(min_concurrency, max_concurrency);
        let timeout_secs = config
            .initial_timeout_secs
            .clamp(min_timeout_secs, max_timeout_secs);
        Self {
            min_concurrency,
            max_concurrency,
            min_timeout_secs,
            max_timeout_secs,
            batch_size: (config.batch_size.max(1)) as u64,
            policy: config.policy.clone(),
            concurrency,
            timeout_secs,
            gate: Arc::new(Semaphore::new(concurrency)),
            checked: 0,
            successes: 0,
            total_latency_ms: 0,
        }
    }

    /// The gate new work must acquire a permit from.
    pub fn gate(&self) -> Arc<Semaphore> {
        Arc::clone(&self.gate)
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    pub fn checked(&self) -> u64 {
        self.checked
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        if self.checked == 0 {
            0.0
        } else {
            self.successes as f64 / self.checked as f64
        }
    }

    /// Mean latency of successful probes; the current timeout when there
    /// are none yet.
    #[allow(clippy::cast_precision_loss)]
    pub fn avg_latency_ms(&self) -> f64 {
        if self.successes == 0 {
            (self.timeout_secs * 1000) as f64
        } else {
            self.total_latency_ms as f64 / self.successes as f64
        }
    }

    /// Records one completed URL. Returns the adjustment made when this
    /// completion closes a batch.
    pub fn record(&mut self, reachable: bool, latency_ms: Option<u64>) -> Option<Adjustment> {
        self.checked += 1;
        if let (true, Some(latency)) = (reachable, latency_ms) {
            self.successes += 1;
            self.total_latency_ms = self.total_latency_ms.saturating_add(latency);
        }
        if self.checked % self.batch_size == 0 {
            Some(self.adjust())
        } else {
            None
        }
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn adjust(&mut self) -> Adjustment {
        let success_rate = self.success_rate();
        let avg_latency_ms = self.avg_latency_ms();
        let old_concurrency = self.concurrency;
        let old_timeout_secs = self.timeout_secs;

        let mut concurrency = self.concurrency;
        if success_rate > self.policy.high_success_rate && concurrency < self.max_concurrency {
            let grown = (concurrency as f64 * self.policy.grow_factor).round() as usize;
            concurrency = grown.max(concurrency + 1);
        } else if success_rate < self.policy.low_success_rate
            && concurrency > self.min_concurrency
        {
            concurrency = (concurrency as f64 * self.policy.shrink_factor).round() as usize;
        }
        let concurrency = concurrency.clamp(self.min_concurrency, self.max_concurrency);
        if concurrency != old_concurrency {
            self.gate = Arc::new(Semaphore::new(concurrency));
            self.concurrency = concurrency;
        }

        let timeout_ms = (self.timeout_secs * 1000) as f64;
        let step = self.policy.timeout_step_secs;
        let timeout_secs = if avg_latency_ms > timeout_ms * self.policy.raise_latency_ratio {
            self.timeout_secs.saturating_add(step)
        } else if avg_latency_ms < timeout_ms * self.policy.lower_latency_ratio {
            self.timeout_secs.saturating_sub(step)
        } else {
            self.timeout_secs
        };
        self.timeout_secs = timeout_secs.clamp(self.min_timeout_secs, self.max_timeout_secs);

        Adjustment {
            old_concurrency,
            new_concurrency: self.concurrency,
            old_timeout_secs,
            new_timeout_secs: self.timeout_secs,
            success_rate,
            avg_latency_ms,
        }
    }
}
