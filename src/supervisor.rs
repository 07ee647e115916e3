use crate::error::FloodError;
use crate::frame::FrameTemplate;
use crate::inject::{self, Transport};
use crate::rate::*;
use crate::stats::{format_bitrate, Stats, TelemetrySnapshot};
use crate::structs::*;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use rand_core::SeedableRng;
use rand_pcg::Pcg32;
use std::net::{Ipv4Addr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Longest uninterrupted sleep of the send loop
const MAX_SLEEP_SLICE: Duration = Duration::from_millis(100);
/// How long dropping a live `RunHandle` waits for its loop
const DROP_GRACE: Duration = Duration::from_secs(1);

/// Lifecycle of a run. `Stopped` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum RunStatus {
    #[default]
    Idle = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
    Failed = 4,
}

impl RunStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => RunStatus::Running,
            2 => RunStatus::Stopping,
            3 => RunStatus::Stopped,
            4 => RunStatus::Failed,
            _ => RunStatus::Idle,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Stopped | RunStatus::Failed)
    }

    pub fn is_active(self) -> bool {
        matches!(self, RunStatus::Running | RunStatus::Stopping)
    }
}

/// State shared between the controller and the send loop of one run.
#[derive(Debug)]
struct RunState {
    status: AtomicU8,
    cancel: AtomicBool,
    stats: Arc<Stats>,
}

impl RunState {
    fn status(&self) -> RunStatus {
        RunStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn transition(&self, from: RunStatus, to: RunStatus) -> bool {
        self.status
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Moves to a terminal state, unless already in one.
    fn finish(&self, to: RunStatus) {
        let _ = self
            .status
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                (!RunStatus::from_u8(s).is_terminal()).then_some(to as u8)
            });
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

/// The source address written in the frames.
///
/// An explicit address wins. Otherwise the address the host would use to reach
/// the destination is detected; randomized runs do not need one.
pub fn resolve_source(params: &FloodParameters) -> Result<Ipv4Addr, FloodError> {
    if let Some(ip) = params.src_ip {
        return Ok(ip);
    }
    if params.randomize_source {
        return Ok(Ipv4Addr::UNSPECIFIED);
    }
    detected_source(params, detect_source_ip(params.dst_ip, params.dst_port))
}

/// Only connection attempts can do without a source address: the kernel writes
/// its own address in crafted packets after their TCP checksum was computed over
/// 0.0.0.0, and receivers drop them.
fn detected_source(
    params: &FloodParameters,
    detected: std::io::Result<Ipv4Addr>,
) -> Result<Ipv4Addr, FloodError> {
    match detected {
        Ok(ip) => {
            log::debug!("Source address {ip} detected");
            Ok(ip)
        }
        Err(e) if params.resolved_transport() == TransportChoice::Connect => {
            log::warn!("Cannot detect the source address ({e}), the kernel will pick it");
            Ok(Ipv4Addr::UNSPECIFIED)
        }
        Err(e) => Err(FloodError::Config(format!(
            "cannot detect the source address ({e}), please set it explicitly"
        ))),
    }
}

/// Asks the routing table which local address reaches `dst`. Nothing is sent.
fn detect_source_ip(dst: Ipv4Addr, port: u16) -> std::io::Result<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect((dst, port))?;
    match socket.local_addr()?.ip() {
        std::net::IpAddr::V4(ip) => Ok(ip),
        std::net::IpAddr::V6(_) => Err(std::io::Error::other("no IPv4 route")),
    }
}

fn make_governor(
    choice: GovernorChoice,
    preferred: GovernorChoice,
    params: &FloodParameters,
    frame_len: usize,
) -> Box<dyn RateGovernor> {
    let now = Instant::now();
    match (choice, preferred) {
        (GovernorChoice::Burst, _) | (GovernorChoice::Auto, GovernorChoice::Burst) => Box::new(
            BurstGovernor::new(params.bytes_per_second, BurstConfig::default(), now),
        ),
        _ => Box::new(IntervalGovernor::new(
            params.bytes_per_second,
            frame_len,
            now,
        )),
    }
}

#[cfg(target_os = "linux")]
fn pin_to_cpu(cpu: usize) {
    // SAFETY: the set is zero-initialized and only touched through the libc macros
    let res = unsafe {
        let mut cpuset: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_SET(cpu, &mut cpuset);
        libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &cpuset)
    };
    if res != 0 {
        log::warn!(
            "Cannot pin the send loop to CPU {cpu}: {}",
            std::io::Error::last_os_error()
        );
    } else {
        log::debug!("Send loop pinned to CPU {cpu}");
    }
}

#[cfg(not(target_os = "linux"))]
fn pin_to_cpu(cpu: usize) {
    log::warn!("CPU pinning is not supported on this platform, ignoring CPU {cpu}");
}

/// Sleeps until `deadline`, waking up regularly to honor a stop request.
fn sleep_until(deadline: Instant, state: &RunState) {
    loop {
        let now = Instant::now();
        if now >= deadline || state.cancelled() {
            return;
        }
        thread::sleep((deadline - now).min(MAX_SLEEP_SLICE));
    }
}

/// Sends batches until a stop is requested or the transport is lost.
fn flood(
    state: &RunState,
    transport: &mut dyn Transport,
    governor: &mut dyn RateGovernor,
    frame: &mut FrameTemplate,
    rng: &mut Pcg32,
) -> Result<(), FloodError> {
    let stats = &state.stats;
    while !state.cancelled() {
        let mut report = BatchReport::default();
        let mut failures = 0;
        let mut first_failure = None;
        for _ in 0..governor.batch_size() {
            frame.patch(rng);
            report.attempted += 1;
            match transport.send(frame.bytes()) {
                Ok(n) => {
                    report.sent += 1;
                    report.bytes += n as u64;
                }
                Err(e) if e.is_fatal() => {
                    stats.increase(report.sent, report.bytes);
                    stats.send_failed(failures + 1);
                    return Err(e);
                }
                Err(e) => {
                    failures += 1;
                    first_failure.get_or_insert(e);
                }
            }
        }
        stats.increase(report.sent, report.bytes);
        if let Some(e) = first_failure {
            stats.send_failed(failures);
            log::warn!(
                "{failures} of {} packets failed to send: {e}",
                report.attempted
            );
        }

        let outcome = governor.after_batch(report, Instant::now());
        if let Some(bps) = outcome.sample {
            stats.set_current_rate(bps);
            log::debug!(
                "Achieved {} (batch size {})",
                format_bitrate(bps),
                governor.batch_size()
            );
        }
        if let Some(resume_at) = outcome.resume_at {
            sleep_until(resume_at, state);
        }
    }
    Ok(())
}

struct SendLoop {
    state: Arc<RunState>,
    transport: Box<dyn Transport>,
    governor: Box<dyn RateGovernor>,
    frame: FrameTemplate,
    rng: Pcg32,
    cpu: Option<usize>,
    done: Sender<RunStatus>,
}

impl SendLoop {
    fn run(mut self) {
        if let Some(cpu) = self.cpu {
            pin_to_cpu(cpu);
        }
        log::info!(
            "Start flooding with {} transport and {} governor",
            self.transport.name(),
            self.governor.name()
        );
        let result = flood(
            &self.state,
            self.transport.as_mut(),
            self.governor.as_mut(),
            &mut self.frame,
            &mut self.rng,
        );
        self.transport.close();

        let status = match result {
            Ok(()) => RunStatus::Stopped,
            Err(e) => {
                log::error!("Flood aborted: {e}");
                RunStatus::Failed
            }
        };
        self.state.finish(status);

        let s = self.state.stats.snapshot();
        log::info!(
            "Flood stopped after {}: {} packets, {} bytes, {} average, {} send errors",
            humantime::format_duration(Duration::from_millis(s.elapsed.as_millis() as u64)),
            s.total_packets_sent,
            s.total_bytes_sent,
            format_bitrate(s.average_rate_bps()),
            s.send_errors
        );
        let _ = self.done.send(status);
    }
}

/// Controller side of a run.
///
/// Dropping the handle requests a stop and waits briefly for the loop.
pub struct RunHandle {
    state: Arc<RunState>,
    thread: Option<JoinHandle<()>>,
    done: Receiver<RunStatus>,
}

/// Validates the parameters, builds the frame template and spawns the send loop.
/// Returns as soon as the loop thread exists.
///
/// The transport must already be open; it is closed when the loop exits.
pub fn start(
    params: &FloodParameters,
    src_ip: Ipv4Addr,
    transport: Box<dyn Transport>,
) -> Result<RunHandle, FloodError> {
    params.validate()?;

    let seed = params.seed.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default()
    });
    log::debug!("Run seed: {seed}");
    let mut rng = Pcg32::seed_from_u64(seed);
    let frame = FrameTemplate::build(params, transport.link_layer(), src_ip, &mut rng);
    let governor = make_governor(
        params.governor,
        transport.preferred_governor(),
        params,
        frame.len(),
    );
    log::info!(
        "Target {} toward {}:{} with {}-byte frames",
        format_bitrate(params.target_bits_per_second()),
        params.dst_ip,
        params.dst_port,
        frame.len()
    );

    let state = Arc::new(RunState {
        status: AtomicU8::new(RunStatus::Running as u8),
        cancel: AtomicBool::new(false),
        stats: Arc::new(Stats::new(params.target_bits_per_second())),
    });
    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    let send_loop = SendLoop {
        state: state.clone(),
        transport,
        governor,
        frame,
        rng,
        cpu: params.cpu,
        done: done_tx,
    };

    let builder = thread::Builder::new().name("synforge-send".into());
    match builder.spawn(move || send_loop.run()) {
        Ok(thread) => Ok(RunHandle {
            state,
            thread: Some(thread),
            done: done_rx,
        }),
        Err(e) => {
            state.finish(RunStatus::Failed);
            log::error!("Cannot spawn the send loop: {e}");
            Err(FloodError::open("send loop thread", e))
        }
    }
}

impl RunHandle {
    pub fn status(&self) -> RunStatus {
        self.state.status()
    }

    pub fn stats(&self) -> Arc<Stats> {
        self.state.stats.clone()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.state.stats.snapshot()
    }

    /// Asks the loop to stop after its current batch. Idempotent.
    pub fn request_stop(&self) {
        if !self.state.cancel.swap(true, Ordering::Relaxed) {
            log::info!("Stop requested");
        }
        self.state
            .transition(RunStatus::Running, RunStatus::Stopping);
    }

    /// Waits until the loop has exited and returns its final status.
    ///
    /// On timeout the run keeps going (or keeps stopping) and the call can be
    /// repeated.
    pub fn await_completion(&mut self, timeout: Duration) -> Result<RunStatus, FloodError> {
        let Some(thread) = self.thread.take() else {
            return Ok(self.status());
        };
        match self.done.recv_timeout(timeout) {
            // a disconnected channel means the loop is already gone
            Ok(_) | Err(RecvTimeoutError::Disconnected) => (),
            Err(RecvTimeoutError::Timeout) => {
                self.thread = Some(thread);
                return Err(FloodError::StopTimeout(timeout));
            }
        }
        if thread.join().is_err() {
            self.state.finish(RunStatus::Failed);
            return Err(FloodError::LoopPanicked);
        }
        Ok(self.status())
    }

    /// Requests a stop and detaches the loop thread without waiting for it.
    ///
    /// Last resort when `await_completion` timed out: the transport is released
    /// only if the loop eventually notices the stop request.
    pub fn abandon(mut self) {
        self.request_stop();
        if self.thread.take().is_some() {
            log::warn!("Send loop abandoned");
        }
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.request_stop();
            if let Err(e) = self.await_completion(DROP_GRACE) {
                log::warn!("{e}");
            }
        }
    }
}

/// Controller of the flood: at most one run at a time.
#[derive(Default)]
pub struct Flooder {
    run: Option<RunHandle>,
    start_failed: bool,
}

impl Flooder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the transport the parameters select and starts a run.
    pub fn start_flood(&mut self, params: FloodParameters) -> Result<(), FloodError> {
        self.start_flood_opening(params, inject::open_transport)
    }

    /// Starts a run on the transport returned by `open`, called with the
    /// parameters and the resolved source address. When `open` fails the
    /// controller is left `Failed` and no loop is spawned.
    pub fn start_flood_opening<F>(
        &mut self,
        params: FloodParameters,
        open: F,
    ) -> Result<(), FloodError>
    where
        F: FnOnce(&FloodParameters, Ipv4Addr) -> Result<Box<dyn Transport>, FloodError>,
    {
        self.ensure_idle()?;
        params.validate()?;
        let src_ip = resolve_source(&params)?;
        let transport = open(&params, src_ip).inspect_err(|e| {
            log::error!("Cannot open the {:?} transport: {e}", params.resolved_transport());
            self.start_failed = true;
        })?;
        self.launch(&params, src_ip, transport)
    }

    /// Starts a run on a transport opened by the caller.
    pub fn start_flood_with(
        &mut self,
        params: FloodParameters,
        transport: Box<dyn Transport>,
    ) -> Result<(), FloodError> {
        self.ensure_idle()?;
        params.validate()?;
        let src_ip = resolve_source(&params)?;
        self.launch(&params, src_ip, transport)
    }

    fn ensure_idle(&mut self) -> Result<(), FloodError> {
        if self.status().is_active() {
            return Err(FloodError::AlreadyRunning);
        }
        // reap the previous run
        self.run = None;
        self.start_failed = false;
        Ok(())
    }

    fn launch(
        &mut self,
        params: &FloodParameters,
        src_ip: Ipv4Addr,
        transport: Box<dyn Transport>,
    ) -> Result<(), FloodError> {
        match start(params, src_ip, transport) {
            Ok(run) => {
                self.run = Some(run);
                Ok(())
            }
            Err(e) => {
                self.start_failed = true;
                Err(e)
            }
        }
    }

    /// Asks the current run to stop. No-op without a run.
    pub fn request_stop(&self) {
        if let Some(run) = &self.run {
            run.request_stop();
        }
    }

    /// Waits for the current run to finish. Without a run, returns the status
    /// immediately.
    pub fn await_completion(&mut self, timeout: Duration) -> Result<RunStatus, FloodError> {
        match &mut self.run {
            Some(run) => run.await_completion(timeout),
            None => Ok(self.status()),
        }
    }

    /// Detaches the current run without waiting for it. See `RunHandle::abandon`.
    pub fn abandon(&mut self) {
        if let Some(run) = self.run.take() {
            run.abandon();
        }
    }

    /// Counters of the current (or last) run; all zero before the first run.
    pub fn get_stats(&self) -> TelemetrySnapshot {
        self.run
            .as_ref()
            .map(RunHandle::snapshot)
            .unwrap_or_default()
    }

    /// Shared counters of the current run, for monitoring.
    pub fn stats(&self) -> Option<Arc<Stats>> {
        self.run.as_ref().map(RunHandle::stats)
    }

    pub fn status(&self) -> RunStatus {
        match &self.run {
            Some(run) => run.status(),
            None if self.start_failed => RunStatus::Failed,
            None => RunStatus::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use std::sync::atomic::AtomicU64;

    /// Accepts everything, optionally failing on chosen packets.
    struct MockTransport {
        sent: Arc<AtomicU64>,
        closed: Arc<AtomicBool>,
        fail_every: Option<u64>,
        lose_after: Option<u64>,
    }

    impl MockTransport {
        fn new() -> (Self, Arc<AtomicU64>, Arc<AtomicBool>) {
            let sent = Arc::new(AtomicU64::new(0));
            let closed = Arc::new(AtomicBool::new(false));
            let t = MockTransport {
                sent: sent.clone(),
                closed: closed.clone(),
                fail_every: None,
                lose_after: None,
            };
            (t, sent, closed)
        }
    }

    impl Transport for MockTransport {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn send(&mut self, frame: &[u8]) -> Result<usize, FloodError> {
            let n = self.sent.fetch_add(1, Ordering::Relaxed) + 1;
            if self.lose_after.is_some_and(|l| n > l) {
                return Err(FloodError::TransportLost("mock unplugged".into()));
            }
            if self.fail_every.is_some_and(|f| n % f == 0) {
                return Err(FloodError::Io(std::io::Error::new(
                    std::io::ErrorKind::WouldBlock,
                    "mock busy",
                )));
            }
            Ok(frame.len())
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::Relaxed);
        }

        fn link_layer(&self) -> bool {
            false
        }
    }

    fn params() -> FloodParameters {
        let mut p = FloodParameters::new(Ipv4Addr::new(10, 0, 0, 5), 80, 400_000);
        p.src_ip = Some(Ipv4Addr::new(10, 0, 0, 1));
        p.seed = Some(42);
        p
    }

    #[test]
    fn stop_without_run_is_noop() {
        let mut flooder = Flooder::new();
        flooder.request_stop();
        flooder.request_stop();
        assert_eq!(flooder.status(), RunStatus::Idle);
        assert_eq!(flooder.get_stats(), TelemetrySnapshot::default());
        assert_eq!(
            flooder.await_completion(Duration::ZERO).unwrap(),
            RunStatus::Idle
        );
    }

    #[test]
    fn stop_is_prompt_and_idempotent() {
        let (t, _, closed) = MockTransport::new();
        let mut flooder = Flooder::new();
        flooder.start_flood_with(params(), Box::new(t)).unwrap();
        assert_eq!(flooder.status(), RunStatus::Running);
        thread::sleep(Duration::from_millis(150));

        let asked = Instant::now();
        flooder.request_stop();
        flooder.request_stop();
        let status = flooder.await_completion(Duration::from_secs(2)).unwrap();
        assert!(asked.elapsed() < Duration::from_millis(500));
        assert_eq!(status, RunStatus::Stopped);
        assert!(closed.load(Ordering::Relaxed));

        flooder.request_stop();
        assert_eq!(flooder.status(), RunStatus::Stopped);
        assert!(flooder.get_stats().total_packets_sent > 0);
    }

    #[test]
    fn second_start_is_rejected() {
        let (a, _, _) = MockTransport::new();
        let (b, _, _) = MockTransport::new();
        let mut flooder = Flooder::new();
        flooder.start_flood_with(params(), Box::new(a)).unwrap();
        assert!(matches!(
            flooder.start_flood_with(params(), Box::new(b)),
            Err(FloodError::AlreadyRunning)
        ));
        flooder.request_stop();
        flooder.await_completion(Duration::from_secs(2)).unwrap();

        // a finished run can be replaced
        let (c, _, _) = MockTransport::new();
        flooder.start_flood_with(params(), Box::new(c)).unwrap();
        flooder.request_stop();
        assert_eq!(
            flooder.await_completion(Duration::from_secs(2)).unwrap(),
            RunStatus::Stopped
        );
    }

    #[test]
    fn invalid_parameters_spawn_nothing() {
        let (t, sent, _) = MockTransport::new();
        let mut p = params();
        p.bytes_per_second = 0;
        let mut flooder = Flooder::new();
        assert!(matches!(
            flooder.start_flood_with(p, Box::new(t)),
            Err(FloodError::Config(_))
        ));
        assert_eq!(flooder.status(), RunStatus::Idle);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(sent.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn send_failures_are_counted_not_fatal() {
        let (mut t, _, _) = MockTransport::new();
        t.fail_every = Some(4);
        let mut flooder = Flooder::new();
        flooder.start_flood_with(params(), Box::new(t)).unwrap();
        thread::sleep(Duration::from_millis(200));
        assert_eq!(flooder.status(), RunStatus::Running);
        flooder.request_stop();
        flooder.await_completion(Duration::from_secs(2)).unwrap();

        let s = flooder.get_stats();
        assert!(s.send_errors > 0);
        let attempted = s.total_packets_sent as u64 + s.send_errors;
        assert_eq!(s.send_errors, attempted / 4);
        assert_eq!(s.total_bytes_sent, s.total_packets_sent as f64 * 40.);
    }

    #[test]
    fn lost_transport_fails_the_run() {
        let (mut t, _, closed) = MockTransport::new();
        t.lose_after = Some(100);
        let mut flooder = Flooder::new();
        flooder.start_flood_with(params(), Box::new(t)).unwrap();
        let status = flooder.await_completion(Duration::from_secs(5)).unwrap();
        assert_eq!(status, RunStatus::Failed);
        assert!(closed.load(Ordering::Relaxed));
        assert_eq!(flooder.get_stats().total_packets_sent, 100);

        // terminal states are absorbing
        flooder.request_stop();
        assert_eq!(flooder.status(), RunStatus::Failed);
    }

    #[test]
    fn await_times_out_on_a_live_run() {
        let (t, _, _) = MockTransport::new();
        let mut flooder = Flooder::new();
        flooder.start_flood_with(params(), Box::new(t)).unwrap();
        assert!(matches!(
            flooder.await_completion(Duration::from_millis(50)),
            Err(FloodError::StopTimeout(_))
        ));
        flooder.request_stop();
        assert_eq!(
            flooder.await_completion(Duration::from_secs(2)).unwrap(),
            RunStatus::Stopped
        );
    }

    #[test]
    fn burst_governor_on_request() {
        let (t, _, _) = MockTransport::new();
        let mut p = params();
        p.governor = GovernorChoice::Burst;
        let mut run = start(&p, Ipv4Addr::new(10, 0, 0, 1), Box::new(t)).unwrap();
        thread::sleep(Duration::from_millis(50));
        run.request_stop();
        assert_eq!(
            run.await_completion(Duration::from_secs(2)).unwrap(),
            RunStatus::Stopped
        );
        // bursts never wait, so the mock saw far more than the target
        assert!(run.snapshot().total_packets_sent >= 2000);
    }

    #[test]
    fn explicit_source_is_kept() {
        let p = params();
        assert_eq!(resolve_source(&p).unwrap(), Ipv4Addr::new(10, 0, 0, 1));
        let mut p = params();
        p.src_ip = None;
        p.randomize_source = true;
        assert_eq!(resolve_source(&p).unwrap(), Ipv4Addr::UNSPECIFIED);
    }

    #[test]
    fn undetected_source_is_refused_for_crafted_packets() {
        let no_route = || {
            Err(std::io::Error::new(
                std::io::ErrorKind::NetworkUnreachable,
                "no route",
            ))
        };
        let mut p = params();
        p.src_ip = None;
        assert!(matches!(
            detected_source(&p, no_route()),
            Err(FloodError::Config(_))
        ));
        p.transport = TransportChoice::Connect;
        assert_eq!(
            detected_source(&p, no_route()).unwrap(),
            Ipv4Addr::UNSPECIFIED
        );
        assert_eq!(
            detected_source(&p, Ok(Ipv4Addr::new(192, 168, 1, 20))).unwrap(),
            Ipv4Addr::new(192, 168, 1, 20)
        );
    }

    #[test]
    fn failed_open_spawns_nothing() {
        let mut flooder = Flooder::new();
        let e = flooder
            .start_flood_opening(params(), |_, _| {
                Err(FloodError::open(
                    "raw socket",
                    std::io::Error::from(std::io::ErrorKind::PermissionDenied),
                ))
            })
            .unwrap_err();
        assert_eq!(e.category(), ErrorCategory::Resource);
        assert_eq!(flooder.status(), RunStatus::Failed);
        assert!(flooder.stats().is_none());
        assert_eq!(flooder.get_stats(), TelemetrySnapshot::default());
        assert_eq!(
            flooder.await_completion(Duration::ZERO).unwrap(),
            RunStatus::Failed
        );

        // the next start begins afresh
        let (t, _, _) = MockTransport::new();
        flooder
            .start_flood_opening(params(), move |_, _| Ok(Box::new(t) as Box<dyn Transport>))
            .unwrap();
        assert_eq!(flooder.status(), RunStatus::Running);
        flooder.request_stop();
        assert_eq!(
            flooder.await_completion(Duration::from_secs(2)).unwrap(),
            RunStatus::Stopped
        );
    }
}
