//! Metric Types
//!
//! Point-in-time host snapshots as produced by a sampler, and the derived
//! payload that is pushed to dashboard clients. The derived types define
//! the wire format, so field names follow the browser's camelCase schema.

use serde::Serialize;

/// CPU usage in percent (0-100)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuMetrics {
    /// Usage across all cores
    pub total: f64,
    /// Usage of each logical core
    pub per_core: Vec<f64>,
}

/// Physical memory in bytes
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryMetrics {
    pub total: u64,
    pub used: u64,
    pub available: u64,
    pub used_percent: f64,
}

/// Root filesystem usage in bytes
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskMetrics {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub used_percent: f64,
}

/// Cumulative network byte counters, summed over all interfaces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkCounters {
    pub bytes_recv: u64,
    pub bytes_sent: u64,
}

/// Network counters plus throughput derived from the previous sample
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkMetrics {
    pub bytes_recv: u64,
    pub bytes_sent: u64,
    /// Receive rate in bytes per second
    pub rx_rate: f64,
    /// Transmit rate in bytes per second
    pub tx_rate: f64,
    /// Either rate reached the spike threshold
    pub is_spike: bool,
}

/// 1, 5 and 15 minute load averages
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadAvgMetrics {
    pub load1: f64,
    pub load5: f64,
    pub load15: f64,
}

/// One raw host snapshot.
///
/// A sub-metric whose probe failed keeps its zero value. Network counters are
/// optional because the rate computation must tell "probe failed" apart from
/// "counters are zero".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSample {
    /// Unix seconds
    pub timestamp: i64,
    pub hostname: String,
    pub cpu: CpuMetrics,
    pub memory: MemoryMetrics,
    pub disk: DiskMetrics,
    pub network: Option<NetworkCounters>,
    pub load_average: LoadAvgMetrics,
    /// Seconds since boot
    pub uptime: u64,
}

/// The payload broadcast to clients, one per sample tick
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedMetrics {
    pub timestamp: i64,
    pub hostname: String,
    pub cpu: CpuMetrics,
    pub memory: MemoryMetrics,
    pub disk: DiskMetrics,
    pub network: NetworkMetrics,
    pub load_average: LoadAvgMetrics,
    pub uptime: u64,
}

impl DerivedMetrics {
    /// Combine a raw sample with already computed network figures
    pub fn from_raw(raw: RawSample, network: NetworkMetrics) -> Self {
        Self {
            timestamp: raw.timestamp,
            hostname: raw.hostname,
            cpu: raw.cpu,
            memory: raw.memory,
            disk: raw.disk,
            network,
            load_average: raw.load_average,
            uptime: raw.uptime,
        }
    }
}

/// Percentage of `part` in `whole`, 0 when `whole` is 0
pub fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
