//! Collection Scheduler
//!
//! Drives the sample and heartbeat cadence. The scheduler task is the only
//! owner of the sampler and the rate baseline. Nothing is probed or encoded
//! while no client is connected, so a client that joins later only sees
//! ticks from then on.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::metrics::{guarded, RateComputer, RawSample, SampleError, SampleResult, Sampler};
use crate::stream::{Frame, HubHandle, METRICS_EVENT};

/// Timer periods for the scheduler
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub sample_interval: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_millis(250),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

/// Periodic collect-and-broadcast loop
pub struct Scheduler<S> {
    sampler: Arc<Mutex<S>>,
    rates: RateComputer,
    hub: HubHandle,
    config: ScheduleConfig,
}

impl<S: Sampler> Scheduler<S> {
    pub fn new(sampler: S, hub: HubHandle, config: ScheduleConfig) -> Self {
        Self {
            sampler: Arc::new(Mutex::new(sampler)),
            rates: RateComputer::new(),
            hub,
            config,
        }
    }

    /// Run on a new task until `cancel` fires
    pub fn start(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Tick until `cancel` fires. Both timers first fire one period after
    /// start; late ticks are skipped rather than bunched up.
    pub async fn run(mut self, cancel: CancellationToken) {
        let start = tokio::time::Instant::now();

        let mut samples = interval_at(
            start + self.config.sample_interval,
            self.config.sample_interval,
        );
        samples.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut heartbeats = interval_at(
            start + self.config.heartbeat_interval,
            self.config.heartbeat_interval,
        );
        heartbeats.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            sample_ms = self.config.sample_interval.as_millis() as u64,
            heartbeat_secs = self.config.heartbeat_interval.as_secs(),
            "Scheduler started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = samples.tick() => self.on_sample_tick().await,
                _ = heartbeats.tick() => self.on_heartbeat_tick(),
            }
        }

        tracing::info!("Scheduler stopped");
    }

    async fn on_sample_tick(&mut self) {
        if self.hub.client_count() == 0 {
            return;
        }

        let raw = match self.collect().await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to collect metrics, skipping tick");
                return;
            }
        };

        let metrics = self.rates.compute(raw, Instant::now());
        if metrics.network.is_spike {
            tracing::debug!(
                rx_rate = metrics.network.rx_rate,
                tx_rate = metrics.network.tx_rate,
                "Network spike"
            );
        }

        match Frame::json(METRICS_EVENT, &metrics) {
            Ok(frame) => {
                self.hub.broadcast(frame);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize metrics, skipping tick");
            }
        }
    }

    /// Probe on the blocking pool; the host reads are synchronous file and
    /// syscall work
    async fn collect(&self) -> SampleResult<RawSample> {
        let sampler = Arc::clone(&self.sampler);
        let task = tokio::task::spawn_blocking(move || {
            let mut sampler = sampler.lock().unwrap_or_else(PoisonError::into_inner);
            guarded(|| sampler.collect())
        });

        match task.await {
            Ok(result) => result.and_then(|sample| sample),
            Err(e) => Err(SampleError::Probe(format!("Sampler task failed: {}", e))),
        }
    }

    fn on_heartbeat_tick(&self) {
        if self.hub.client_count() > 0 {
            self.hub.broadcast(Frame::heartbeat());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{ClientId, Hub, HubConfig, Subscription};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// How the test sampler misbehaves on every other call
    #[derive(Clone, Copy)]
    enum OddCalls {
        Succeed,
        Fail,
        Panic,
    }

    /// Sampler that counts calls and optionally misbehaves on odd ones
    struct CountingSampler {
        calls: Arc<AtomicUsize>,
        odd: OddCalls,
    }

    impl Sampler for CountingSampler {
        fn collect(&mut self) -> SampleResult<RawSample> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n % 2 == 1 {
                match self.odd {
                    OddCalls::Succeed => {}
                    OddCalls::Fail => return Err(SampleError::Probe("simulated".to_string())),
                    OddCalls::Panic => panic!("simulated sampler panic"),
                }
            }
            Ok(RawSample {
                hostname: "test-host".to_string(),
                ..Default::default()
            })
        }
    }

    struct Harness {
        hub: HubHandle,
        calls: Arc<AtomicUsize>,
        cancel: CancellationToken,
        scheduler: JoinHandle<()>,
    }

    fn start(config: ScheduleConfig, odd: OddCalls) -> Harness {
        let cancel = CancellationToken::new();
        let (hub, _hub_task) = Hub::spawn(HubConfig::default(), cancel.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        let sampler = CountingSampler {
            calls: Arc::clone(&calls),
            odd,
        };
        let scheduler = Scheduler::new(sampler, hub.clone(), config).start(cancel.clone());
        Harness {
            hub,
            calls,
            cancel,
            scheduler,
        }
    }

    fn drain(sub: &mut Subscription) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(frame) = sub.receiver.try_recv() {
            frames.push(frame);
        }
        frames
    }

    fn is_metrics(frame: &Frame) -> bool {
        frame.as_bytes().starts_with(b"event: message\ndata: {")
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_sampling_without_clients() {
        let h = start(ScheduleConfig::default(), OddCalls::Succeed);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);

        let mut sub = h.hub.register().await.unwrap();
        tokio::time::sleep(Duration::from_millis(260)).await;
        assert!(h.calls.load(Ordering::SeqCst) >= 1);

        // Let the hub deliver the broadcast
        h.hub.unregister(ClientId::new_v4()).await;
        let frames = drain(&mut sub);
        assert!(frames.iter().any(is_metrics));

        // Stops again once the last client leaves
        h.hub.unregister(sub.id).await;
        let before = h.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(h.calls.load(Ordering::SeqCst), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_frame_payload() {
        let h = start(ScheduleConfig::default(), OddCalls::Succeed);
        let mut sub = h.hub.register().await.unwrap();

        tokio::time::sleep(Duration::from_millis(260)).await;
        h.hub.unregister(ClientId::new_v4()).await;

        let frame = drain(&mut sub).into_iter().find(is_metrics).unwrap();
        let text = std::str::from_utf8(frame.as_bytes()).unwrap();
        let json = text
            .strip_prefix("event: message\ndata: ")
            .and_then(|t| t.strip_suffix("\n\n"))
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(value["hostname"], "test-host");
        assert_eq!(value["network"]["rxRate"], 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sampler_failure_does_not_stop_scheduler() {
        let config = ScheduleConfig {
            sample_interval: Duration::from_millis(100),
            heartbeat_interval: Duration::from_secs(3600),
        };
        let h = start(config, OddCalls::Fail);
        let mut sub = h.hub.register().await.unwrap();

        let mut metrics_frames = 0;
        for _ in 0..6 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            h.hub.unregister(ClientId::new_v4()).await;
            metrics_frames += drain(&mut sub).iter().filter(|f| is_metrics(f)).count();
        }

        let calls = h.calls.load(Ordering::SeqCst);
        assert!(calls >= 5);
        assert!(metrics_frames >= 2);
        assert!(metrics_frames < calls);
        assert!(!h.scheduler.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_only_with_clients() {
        let config = ScheduleConfig {
            sample_interval: Duration::from_secs(3600),
            heartbeat_interval: Duration::from_secs(30),
        };
        let h = start(config, OddCalls::Succeed);

        // Nobody connected: the first heartbeat tick broadcasts nothing
        tokio::time::sleep(Duration::from_secs(31)).await;

        let mut sub = h.hub.register().await.unwrap();
        tokio::time::sleep(Duration::from_secs(90)).await;
        h.hub.unregister(ClientId::new_v4()).await;

        let frames = drain(&mut sub);
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| *f == Frame::heartbeat()));
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sampler_panic_does_not_stop_scheduler() {
        let config = ScheduleConfig {
            sample_interval: Duration::from_millis(100),
            heartbeat_interval: Duration::from_secs(3600),
        };
        let h = start(config, OddCalls::Panic);
        let mut sub = h.hub.register().await.unwrap();

        let mut metrics_frames = 0;
        for _ in 0..6 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            h.hub.unregister(ClientId::new_v4()).await;
            metrics_frames += drain(&mut sub).iter().filter(|f| is_metrics(f)).count();
        }

        assert!(h.calls.load(Ordering::SeqCst) >= 5);
        assert!(metrics_frames >= 2);
        assert!(!h.scheduler.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_cadence_while_sampling() {
        let config = ScheduleConfig {
            sample_interval: Duration::from_millis(100),
            heartbeat_interval: Duration::from_secs(1),
        };
        let h = start(config, OddCalls::Succeed);
        let mut sub = h.hub.register().await.unwrap();

        // Drain every 50ms so the client buffer never fills
        let mut pings = 0;
        let mut metrics_frames = 0;
        for _ in 0..61 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            h.hub.unregister(ClientId::new_v4()).await;
            for frame in drain(&mut sub) {
                if frame == Frame::heartbeat() {
                    pings += 1;
                } else if is_metrics(&frame) {
                    metrics_frames += 1;
                }
            }
        }

        // 3.05s elapsed: heartbeats at 1s, 2s and 3s
        assert_eq!(pings, 3);
        assert!(metrics_frames >= 25, "metrics frames: {metrics_frames}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_ticks_and_closes_clients() {
        let h = start(ScheduleConfig::default(), OddCalls::Succeed);
        let mut sub = h.hub.register().await.unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;

        h.cancel.cancel();
        h.scheduler.await.unwrap();
        let calls = h.calls.load(Ordering::SeqCst);

        // Drain whatever was delivered before the close
        while sub.receiver.recv().await.is_some() {}
        assert_eq!(h.hub.client_count(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(h.calls.load(Ordering::SeqCst), calls);
    }
}
