use std::time::{Duration, Instant};

/// Length of a rate measurement window
pub const SAMPLING_INTERVAL: Duration = Duration::from_millis(100);
/// Amount of sending time the interval governor packs in one batch
const PACING_TICK: Duration = Duration::from_millis(1);
/// Relative distance to the target under which the batch size is left alone
const DEAD_BAND: f64 = 0.05;

/// What happened during one batch of the send loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Packets handed to the transport, whether they left or not
    pub attempted: u64,
    /// Packets the transport accepted
    pub sent: u64,
    /// Bytes the transport accepted
    pub bytes: u64,
}

/// What the governor wants the send loop to do next.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatchOutcome {
    /// Achieved rate in bits per second, when a sampling window just closed
    pub sample: Option<f64>,
    /// Do not send the next batch before this instant
    pub resume_at: Option<Instant>,
}

/// A rate-governing policy: decides how many packets go out back-to-back, and how
/// long to wait afterwards.
pub trait RateGovernor: Send {
    fn name(&self) -> &'static str;

    fn batch_size(&self) -> u64;

    fn after_batch(&mut self, report: BatchReport, now: Instant) -> BatchOutcome;
}

/// Throughput measurement over one sampling interval.
#[derive(Debug, Clone, Copy)]
struct RateWindow {
    window_start: Instant,
    packets_in_window: u64,
    bytes_in_window: u64,
}

impl RateWindow {
    fn new(now: Instant) -> Self {
        RateWindow {
            window_start: now,
            packets_in_window: 0,
            bytes_in_window: 0,
        }
    }

    fn record(&mut self, report: &BatchReport) {
        self.packets_in_window += report.sent;
        self.bytes_in_window += report.bytes;
    }

    /// Achieved rate in bits per second if the window is over, in which case a new
    /// window starts at `now`.
    fn close(&mut self, now: Instant) -> Option<f64> {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < SAMPLING_INTERVAL {
            return None;
        }
        let rate = self.bytes_in_window as f64 * 8. / elapsed.as_secs_f64();
        log::trace!(
            "window closed: {} packets in {:?}",
            self.packets_in_window,
            elapsed
        );
        *self = RateWindow::new(now);
        Some(rate)
    }
}

/// Bounds of the adaptive batch size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurstConfig {
    pub initial_batch: u64,
    pub min_batch: u64,
    pub max_batch: u64,
}

impl Default for BurstConfig {
    fn default() -> Self {
        BurstConfig {
            initial_batch: 2000,
            min_batch: 1000,
            max_batch: 16000,
        }
    }
}

/// The batch size state machine: double when too slow, halve when too fast, keep
/// inside the ±5% dead band.
#[derive(Debug, Clone, Copy)]
pub struct BatchController {
    batch_size: u64,
    config: BurstConfig,
}

impl BatchController {
    pub fn new(config: BurstConfig) -> Self {
        BatchController {
            batch_size: config.initial_batch.clamp(config.min_batch, config.max_batch),
            config,
        }
    }

    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    /// Applies one evaluation and returns the new batch size.
    pub fn adjust(&mut self, achieved_bps: f64, target_bps: f64) -> u64 {
        if achieved_bps < target_bps * (1. - DEAD_BAND) {
            self.batch_size = (self.batch_size * 2).min(self.config.max_batch);
        } else if achieved_bps > target_bps * (1. + DEAD_BAND) {
            self.batch_size = (self.batch_size / 2).max(self.config.min_batch);
        }
        self.batch_size
    }
}

/// Sends bursts back-to-back without ever sleeping; backpressure comes from the
/// transport. The burst length is re-evaluated once per sampling interval.
#[derive(Debug)]
pub struct BurstGovernor {
    controller: BatchController,
    window: RateWindow,
    target_bps: f64,
}

impl BurstGovernor {
    pub fn new(bytes_per_second: u64, config: BurstConfig, now: Instant) -> Self {
        BurstGovernor {
            controller: BatchController::new(config),
            window: RateWindow::new(now),
            target_bps: bytes_per_second as f64 * 8.,
        }
    }
}

impl RateGovernor for BurstGovernor {
    fn name(&self) -> &'static str {
        "burst"
    }

    fn batch_size(&self) -> u64 {
        self.controller.batch_size()
    }

    fn after_batch(&mut self, report: BatchReport, now: Instant) -> BatchOutcome {
        self.window.record(&report);
        let sample = self.window.close(now);
        if let Some(achieved) = sample {
            let before = self.controller.batch_size();
            let after = self.controller.adjust(achieved, self.target_bps);
            if before != after {
                log::debug!(
                    "{:.2} Mbps achieved for {:.2} Mbps: batch size {before} -> {after}",
                    achieved / 1e6,
                    self.target_bps / 1e6
                );
            }
        }
        BatchOutcome {
            sample,
            resume_at: None,
        }
    }
}

/// Spaces packets by a fixed interval (frame size / target rate), sleeping the
/// residual time. Batches hold about one millisecond of traffic.
///
/// The schedule is absolute (start + interval × packets), so sleep overshoot is
/// compensated by the following batches. When the loop is more than one sampling
/// interval late the schedule restarts from now rather than bursting to catch up.
#[derive(Debug)]
pub struct IntervalGovernor {
    interval_secs: f64,
    batch_size: u64,
    schedule_start: Instant,
    scheduled: u64,
    window: RateWindow,
}

impl IntervalGovernor {
    pub fn new(bytes_per_second: u64, frame_len: usize, now: Instant) -> Self {
        let (frame_len, bytes_per_second) = (frame_len.max(1), bytes_per_second.max(1));
        let interval_secs = frame_len as f64 / bytes_per_second as f64;
        // packets per pacing tick, rounded up
        let per_tick = (bytes_per_second as u128 * PACING_TICK.as_nanos())
            .div_ceil(frame_len as u128 * 1_000_000_000);
        let max_batch = BurstConfig::default().max_batch;
        IntervalGovernor {
            interval_secs,
            batch_size: per_tick.clamp(1, max_batch as u128) as u64,
            schedule_start: now,
            scheduled: 0,
            window: RateWindow::new(now),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.interval_secs)
    }
}

impl RateGovernor for IntervalGovernor {
    fn name(&self) -> &'static str {
        "interval"
    }

    fn batch_size(&self) -> u64 {
        self.batch_size
    }

    fn after_batch(&mut self, report: BatchReport, now: Instant) -> BatchOutcome {
        self.window.record(&report);
        let sample = self.window.close(now);

        self.scheduled += report.attempted;
        let deadline =
            self.schedule_start + Duration::from_secs_f64(self.scheduled as f64 * self.interval_secs);
        let resume_at = if now > deadline + SAMPLING_INTERVAL {
            log::debug!("send loop {:?} behind schedule, rebasing", now - deadline);
            self.schedule_start = now;
            self.scheduled = 0;
            None
        } else {
            (deadline > now).then_some(deadline)
        };
        BatchOutcome { sample, resume_at }
    }
}
