use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Run-scoped counters. Written by the send loop only, read by anyone through
/// `snapshot`.
#[derive(Debug)]
pub struct Stats {
    pub start_time: Instant,
    target_bps: f64,
    packets_sent: AtomicU64,
    bytes_sent: AtomicU64,
    send_errors: AtomicU64,
    // f64 bits
    current_bps: AtomicU64,
}

/// A point-in-time copy of the counters of a run.
///
/// Every field is read atomically on its own, but two fields may come from two
/// different batches.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TelemetrySnapshot {
    /// Rate achieved during the last complete sampling window
    pub current_rate_bps: f64,
    pub target_rate_bps: f64,
    pub total_bytes_sent: f64,
    pub total_packets_sent: i64,
    pub send_errors: u64,
    pub elapsed: Duration,
}

impl TelemetrySnapshot {
    /// Average rate since the start of the run, in bits per second
    pub fn average_rate_bps(&self) -> f64 {
        if self.elapsed.is_zero() {
            0.
        } else {
            self.total_bytes_sent * 8. / self.elapsed.as_secs_f64()
        }
    }
}

impl Stats {
    pub fn new(target_bps: f64) -> Self {
        Stats {
            start_time: Instant::now(),
            target_bps,
            packets_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            send_errors: AtomicU64::new(0),
            current_bps: AtomicU64::new(0f64.to_bits()),
        }
    }

    pub fn increase(&self, packets: u64, bytes: u64) {
        self.packets_sent.fetch_add(packets, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn send_failed(&self, count: u64) {
        self.send_errors.fetch_add(count, Ordering::Relaxed);
    }

    pub fn set_current_rate(&self, bps: f64) {
        self.current_bps.store(bps.to_bits(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            current_rate_bps: f64::from_bits(self.current_bps.load(Ordering::Relaxed)),
            target_rate_bps: self.target_bps,
            total_bytes_sent: self.bytes_sent.load(Ordering::Relaxed) as f64,
            total_packets_sent: self.packets_sent.load(Ordering::Relaxed) as i64,
            send_errors: self.send_errors.load(Ordering::Relaxed),
            elapsed: self.start_time.elapsed(),
        }
    }
}

/// Human-friendly bit rate.
pub fn format_bitrate(bps: f64) -> String {
    let mbps = bps / 1_000_000.;
    if mbps < 1. {
        format!("{:.2} kbps", mbps * 1000.)
    } else if mbps < 1000. {
        format!("{mbps:.2} Mbps")
    } else {
        format!("{:.2} Gbps", mbps / 1000.)
    }
}

/// Logs the throughput of a run every `period` until `running` returns false.
pub fn run(stats: Arc<Stats>, period: Duration, running: impl Fn() -> bool) {
    let step = period.min(Duration::from_millis(100));
    let mut last_report = Instant::now();
    while running() {
        thread::sleep(step);
        if last_report.elapsed() < period {
            continue;
        }
        last_report = Instant::now();
        let s = stats.snapshot();
        log::info!(
            "{} packets sent ({}, target {}), {} send errors",
            s.total_packets_sent,
            format_bitrate(s.current_rate_bps),
            format_bitrate(s.target_rate_bps),
            s.send_errors
        );
    }
}
