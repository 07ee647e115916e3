use clap::Parser;
use std::fs;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use synforge::config::{import_profile, FloodProfile};
use synforge::*;

/// How long the binary waits for the send loop once a stop is requested
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = cmd::Args::parse();

    let result = match &args.command {
        cmd::Command::Interfaces => show_interfaces(),
        cmd::Command::Flood { config, .. } => {
            load_profile(config.as_deref()).and_then(|p| flood(p.merge(args.command.to_profile())))
        }
    };
    match result {
        Ok(RunStatus::Failed) => process::exit(1),
        Ok(_) => (),
        Err(e) => {
            log::error!("{e}");
            process::exit(1);
        }
    }
}

fn show_interfaces() -> Result<RunStatus, FloodError> {
    let devices = interfaces::list_interfaces()?;
    if devices.is_empty() {
        log::warn!("No interface found. Listing interfaces may require root privilege.");
    }
    for (i, d) in devices.iter().enumerate() {
        println!("{}. {d}", i + 1);
    }
    Ok(RunStatus::Idle)
}

fn load_profile(path: Option<&str>) -> Result<FloodProfile, FloodError> {
    match path {
        Some(path) => import_profile(&fs::read_to_string(path)?),
        None => Ok(FloodProfile::default()),
    }
}

fn flood(profile: FloodProfile) -> Result<RunStatus, FloodError> {
    let duration = profile.duration()?;
    let params = profile.to_parameters()?;

    let mut flooder = Flooder::new();
    flooder.start_flood(params)?;
    if let Some(d) = duration {
        log::info!("Flooding for {}", humantime::format_duration(d));
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_ctrlc = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        if interrupted_ctrlc.swap(true, Ordering::Relaxed) {
            process::abort();
        }
        log::warn!("Stopping, press Ctrl-C again to abort");
    })
    .expect("Error setting Ctrl-C handler");

    let finished = Arc::new(AtomicBool::new(false));
    let monitor = flooder.stats().map(|stats| {
        let finished = Arc::clone(&finished);
        thread::Builder::new()
            .name("Monitoring".into())
            .spawn(move || {
                stats::run(stats, Duration::from_secs(1), || {
                    !finished.load(Ordering::Relaxed)
                })
            })
    });

    let deadline = duration.map(|d| Instant::now() + d);
    while !interrupted.load(Ordering::Relaxed)
        && !flooder.status().is_terminal()
        && deadline.map_or(true, |d| Instant::now() < d)
    {
        thread::sleep(Duration::from_millis(50));
    }

    flooder.request_stop();
    let status = match flooder.await_completion(STOP_TIMEOUT) {
        Ok(status) => status,
        Err(e) => {
            log::error!("{e}, giving up on the send loop");
            flooder.abandon();
            RunStatus::Failed
        }
    };
    finished.store(true, Ordering::Relaxed);
    if let Some(Ok(monitor)) = monitor {
        let _ = monitor.join();
    }
    Ok(status)
}
