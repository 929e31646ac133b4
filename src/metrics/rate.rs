//! Network Rate Computation
//!
//! Turns two consecutive cumulative byte-counter samples into throughput
//! and flags spikes. The previous sample is the only state that survives
//! between ticks.

use std::time::Instant;

use super::types::{DerivedMetrics, NetworkCounters, NetworkMetrics, RawSample};

/// Throughput at or above this many bytes per second is a spike (10 MiB/s)
pub const SPIKE_THRESHOLD: f64 = 10.0 * 1024.0 * 1024.0;

/// Counters of the previous sample and when they were taken
#[derive(Debug, Clone, Copy)]
struct Baseline {
    counters: NetworkCounters,
    at: Instant,
}

/// Stateful converter from raw samples to derived metrics
#[derive(Debug, Default)]
pub struct RateComputer {
    baseline: Option<Baseline>,
}

impl RateComputer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive metrics for `raw`, captured at `now`.
    ///
    /// Rates are zero for the first sample and whenever no time has elapsed
    /// since the baseline. A counter that went backwards (interface reset)
    /// yields a zero rate for that direction and becomes the new baseline.
    /// A sample without network counters leaves the baseline untouched.
    pub fn compute(&mut self, raw: RawSample, now: Instant) -> DerivedMetrics {
        let network = match raw.network {
            Some(current) => {
                let metrics = self.rates(current, now);
                self.baseline = Some(Baseline {
                    counters: current,
                    at: now,
                });
                metrics
            }
            None => NetworkMetrics::default(),
        };

        DerivedMetrics::from_raw(raw, network)
    }

    fn rates(&self, current: NetworkCounters, now: Instant) -> NetworkMetrics {
        let mut metrics = NetworkMetrics {
            bytes_recv: current.bytes_recv,
            bytes_sent: current.bytes_sent,
            ..Default::default()
        };

        let Some(last) = self.baseline else {
            return metrics;
        };

        let elapsed = match now.checked_duration_since(last.at) {
            Some(d) if !d.is_zero() => d.as_secs_f64(),
            _ => return metrics,
        };

        let recv = current.bytes_recv.saturating_sub(last.counters.bytes_recv);
        let sent = current.bytes_sent.saturating_sub(last.counters.bytes_sent);

        metrics.rx_rate = recv as f64 / elapsed;
        metrics.tx_rate = sent as f64 / elapsed;
        metrics.is_spike = metrics.rx_rate >= SPIKE_THRESHOLD || metrics.tx_rate >= SPIKE_THRESHOLD;

        metrics
    }
}
