//! Host Sampler
//!
//! The boundary to the operating system. The scheduler only sees the
//! [`Sampler`] trait; [`SysinfoSampler`] is the production probe.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use sysinfo::{Disks, Networks, System};

use super::error::{SampleError, SampleResult};
use super::types::{
    percent, CpuMetrics, DiskMetrics, LoadAvgMetrics, MemoryMetrics, NetworkCounters, RawSample,
};

/// Source of raw host snapshots
pub trait Sampler: Send + 'static {
    /// Take one snapshot. Sub-metrics that cannot be read are zero-valued;
    /// an error means nothing usable could be read.
    fn collect(&mut self) -> SampleResult<RawSample>;
}

/// Run `probe`, turning a panic into [`SampleError::Probe`]
pub fn guarded<T>(probe: impl FnOnce() -> T) -> SampleResult<T> {
    panic::catch_unwind(AssertUnwindSafe(probe))
        .map_err(|payload| SampleError::Probe(format!("probe panicked: {}", panic_message(&*payload))))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

/// Sampler backed by `sysinfo`.
///
/// The `System`, disk and interface handles are kept across calls: CPU usage
/// is computed from the difference between two refreshes, and the disk and
/// interface lists are only refreshed in place.
pub struct SysinfoSampler {
    sys: System,
    disks: Disks,
    networks: Networks,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        let mut sys = System::new();
        // Prime the CPU counters so the first real sample has a baseline
        sys.refresh_cpu_usage();
        sys.refresh_memory();
        Self {
            sys,
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
        }
    }

    fn cpu(&mut self) -> CpuMetrics {
        self.sys.refresh_cpu_usage();
        CpuMetrics {
            total: self.sys.global_cpu_usage() as f64,
            per_core: self
                .sys
                .cpus()
                .iter()
                .map(|c| c.cpu_usage() as f64)
                .collect(),
        }
    }

    fn memory(&mut self) -> MemoryMetrics {
        self.sys.refresh_memory();
        let total = self.sys.total_memory();
        let used = self.sys.used_memory();
        MemoryMetrics {
            total,
            used,
            available: self.sys.available_memory(),
            used_percent: percent(used, total),
        }
    }

    /// Usage of the volume mounted at `/`, or the first listed disk
    fn root_disk(&mut self) -> DiskMetrics {
        self.disks.refresh(true);
        let list = self.disks.list();
        let disk = list
            .iter()
            .find(|d| d.mount_point() == Path::new("/"))
            .or_else(|| list.first());

        match disk {
            Some(d) => {
                let total = d.total_space();
                let free = d.available_space();
                let used = total.saturating_sub(free);
                DiskMetrics {
                    total,
                    used,
                    free,
                    used_percent: percent(used, total),
                }
            }
            None => {
                tracing::debug!("No disk found, reporting zero disk usage");
                DiskMetrics::default()
            }
        }
    }

    /// Cumulative counters summed over every interface, `None` if none are listed
    fn network_totals(&mut self) -> Option<NetworkCounters> {
        self.networks.refresh(true);
        let mut totals: Option<NetworkCounters> = None;

        for (_iface, data) in &self.networks {
            let t = totals.get_or_insert_with(NetworkCounters::default);
            t.bytes_recv = t.bytes_recv.saturating_add(data.total_received());
            t.bytes_sent = t.bytes_sent.saturating_add(data.total_transmitted());
        }

        if totals.is_none() {
            tracing::debug!("No network interfaces listed, network counters unavailable");
        }
        totals
    }

    fn probe(&mut self) -> RawSample {
        let load = System::load_average();

        RawSample {
            timestamp: chrono::Utc::now().timestamp(),
            hostname: System::host_name().unwrap_or_else(|| "Unknown".to_string()),
            cpu: self.cpu(),
            memory: self.memory(),
            disk: self.root_disk(),
            network: self.network_totals(),
            load_average: LoadAvgMetrics {
                load1: load.one,
                load5: load.five,
                load15: load.fifteen,
            },
            uptime: System::uptime(),
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for SysinfoSampler {
    fn collect(&mut self) -> SampleResult<RawSample> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(SampleError::Unavailable(
                "sysinfo does not support this platform".to_string(),
            ));
        }

        guarded(|| self.probe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sysinfo_sampler_produces_sample() {
        let mut sampler = SysinfoSampler::new();
        match sampler.collect() {
            Ok(sample) => {
                assert!(!sample.hostname.is_empty());
                assert!(sample.timestamp > 0);
                assert!(sample.memory.used_percent >= 0.0);
                assert!(sample.memory.used_percent <= 100.0);
                assert!(sample.disk.used <= sample.disk.total);
            }
            Err(SampleError::Unavailable(_)) => {}
            Err(e) => panic!("unexpected sampler error: {e}"),
        }
    }

    #[test]
    fn test_repeated_collection_reuses_handles() {
        let mut sampler = SysinfoSampler::new();
        let first = sampler.collect();
        let second = sampler.collect();
        if let (Ok(a), Ok(b)) = (first, second) {
            assert_eq!(a.hostname, b.hostname);
            assert!(b.timestamp >= a.timestamp);
            assert_eq!(a.cpu.per_core.len(), b.cpu.per_core.len());
        }
    }

    #[test]
    fn test_guarded_passes_value_through() {
        assert_eq!(guarded(|| 7).unwrap(), 7);
    }

    #[test]
    fn test_guarded_reports_panic_as_probe_error() {
        let err = guarded(|| -> u32 { panic!("statvfs exploded") }).unwrap_err();
        match err {
            SampleError::Probe(msg) => assert!(msg.contains("statvfs exploded"), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }

        let owned = guarded(|| -> u32 { panic!("{} interfaces", 3) }).unwrap_err();
        assert!(owned.to_string().contains("3 interfaces"));
    }
}
