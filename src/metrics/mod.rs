//! Host Metrics
//!
//! Raw snapshots from the operating system and the per-sample derived
//! figures (network throughput, spike flag) that are streamed to clients.
//!
//! - **Sampler**: opaque probe producing one [`RawSample`] per call
//! - **RateComputer**: carries the previous network counters between samples
//! - **Types**: wire payload definitions

mod error;
mod rate;
mod sampler;
mod types;

pub use error::{SampleError, SampleResult};
pub use rate::{RateComputer, SPIKE_THRESHOLD};
pub use sampler::{guarded, Sampler, SysinfoSampler};
pub use types::{
    CpuMetrics, DerivedMetrics, DiskMetrics, LoadAvgMetrics, MemoryMetrics, NetworkCounters,
    NetworkMetrics, RawSample,
};
