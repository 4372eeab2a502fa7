/*!
 * Contention Demo
 *
 * Hog threads hammer one mutex while a probe thread measures how long it
 * waits each time it asks for the lock. Once the wait crosses the starvation
 * threshold the mutex switches to hand-off mode and the probe's wait stops
 * growing.
 */

use adaptive_sync::{init_tracing, Mutex, OsRuntime};
use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

const RUN_FOR: Duration = Duration::from_secs(2);
const PROBE_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Default)]
struct ProbeStats {
    samples: u64,
    total: Duration,
    max: Duration,
}

impl ProbeStats {
    fn record(&mut self, waited: Duration) {
        self.samples += 1;
        self.total += waited;
        self.max = self.max.max(waited);
    }

    fn mean(&self) -> Duration {
        match u32::try_from(self.samples) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(n) => self.total / n,
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();

    let hogs = OsRuntime::parallelism().max(2);
    info!(hogs, run_for_ms = RUN_FOR.as_millis() as u64, "starting contention demo");

    let counter = Arc::new(Mutex::new(0u64));
    let stop = Arc::new(AtomicBool::new(false));

    let hog_handles: Vec<_> = (0..hogs)
        .map(|_| {
            let counter = Arc::clone(&counter);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut acquired = 0u64;
                while !stop.load(Ordering::Relaxed) {
                    let mut guard = counter.lock();
                    *guard += 1;
                    // Hold long enough that the probe sees real contention
                    for _ in 0..64 {
                        std::hint::spin_loop();
                    }
                    drop(guard);
                    acquired += 1;
                }
                acquired
            })
        })
        .collect();

    let probe = {
        let counter = Arc::clone(&counter);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut stats = ProbeStats::default();
            while !stop.load(Ordering::Relaxed) {
                let start = Instant::now();
                let guard = counter.lock();
                stats.record(start.elapsed());
                drop(guard);
                thread::sleep(PROBE_INTERVAL);
            }
            stats
        })
    };

    thread::sleep(RUN_FOR);
    stop.store(true, Ordering::Relaxed);

    let mut hog_total = 0u64;
    for handle in hog_handles {
        hog_total += handle.join().map_err(|_| "hog thread panicked")?;
    }
    let stats = probe.join().map_err(|_| "probe thread panicked")?;

    info!(
        samples = stats.samples,
        mean_us = stats.mean().as_micros() as u64,
        max_us = stats.max.as_micros() as u64,
        "probe wait"
    );
    info!(
        acquisitions = hog_total,
        per_sec = (hog_total as f64 / RUN_FOR.as_secs_f64()) as u64,
        final_count = *counter.lock(),
        "hog throughput"
    );

    Ok(())
}
