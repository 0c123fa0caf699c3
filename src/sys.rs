//! Periodic process statistics: concurrency units and heap usage.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

use crate::common::{GOROUTINES, HEAP_OBJECTS, HEAP_SIZE};
use crate::reporter::{Labels, Reporter};

/// One sample of the process statistics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SysStats {
    /// Alive tasks of the current Tokio runtime, or OS threads outside of one.
    pub concurrency_units: u64,
    /// Resident memory of the process in bytes.
    pub heap_size: u64,
    /// Live heap allocations. The process does not track them, so this stays zero.
    pub heap_objects: u64,
}

impl SysStats {
    /// Samples the statistics of the current process.
    pub fn sample() -> Self {
        let status = ProcStatus::read();

        let concurrency_units = match Handle::try_current() {
            Ok(handle) => handle.metrics().num_alive_tasks() as u64,
            Err(_) => status.threads.unwrap_or(1),
        };

        Self {
            concurrency_units,
            heap_size: status.resident_bytes.unwrap_or(0),
            heap_objects: 0,
        }
    }

    /// Sends the three gauges to every reporter. Failures are ignored.
    pub fn report(&self, reporters: &[Arc<dyn Reporter>]) {
        let labels = Labels::new();
        for reporter in reporters {
            let _ = reporter.report_gauge(GOROUTINES, &labels, self.concurrency_units as f64);
            let _ = reporter.report_gauge(HEAP_SIZE, &labels, self.heap_size as f64);
            let _ = reporter.report_gauge(HEAP_OBJECTS, &labels, self.heap_objects as f64);
        }
    }
}

/// The fields of `/proc/self/status` this module cares about.
#[derive(Default)]
struct ProcStatus {
    threads: Option<u64>,
    resident_bytes: Option<u64>,
}

impl ProcStatus {
    #[cfg(target_os = "linux")]
    fn read() -> Self {
        std::fs::read_to_string("/proc/self/status")
            .map(|data| Self::parse(&data))
            .unwrap_or_default()
    }

    #[cfg(not(target_os = "linux"))]
    fn read() -> Self {
        Self::default()
    }

    #[cfg_attr(not(any(target_os = "linux", test)), allow(dead_code))]
    fn parse(data: &str) -> Self {
        let mut status = Self::default();
        for line in data.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let mut fields = value.split_whitespace();
            match key {
                "Threads" => status.threads = fields.next().and_then(|v| v.parse().ok()),
                "VmRSS" => {
                    // Reported in kB.
                    status.resident_bytes =
                        fields.next().and_then(|v| v.parse::<u64>().ok()).map(|kb| kb * 1024)
                }
                _ => {}
            }
        }
        status
    }
}

/// Reports [`SysStats`] to every reporter once per `period` until `shutdown` resolves.
///
/// The first sample is taken immediately. A zero `period` is raised to one millisecond.
pub async fn report_sys_metrics<F>(
    reporters: Vec<Arc<dyn Reporter>>,
    period: Duration,
    shutdown: F,
) where
    F: Future<Output = ()>,
{
    let mut ticker = time::interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                debug!("sys metrics reporter stopped");
                return;
            }
            _ = ticker.tick() => {
                SysStats::sample().report(&reporters);
            }
        }
    }
}
