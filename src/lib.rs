//! A reporting facade for game servers, with a Prometheus (pull) and a Statsd/Dogstatsd (push)
//! backend.
//!
//! ## Basics
//!
//! Every backend implements [`Reporter`]: counters, gauges, summaries and histograms addressed by
//! a metric name and a set of labels. Call sites hold a list of `Arc<dyn Reporter>` and fan each
//! observation out to all of them; a backend failing a report never prevents the others from
//! receiving it.
//!
//! ## High-level features
//!
//! - a pull backend ([`PrometheusReporter`]) keeping a fixed catalog of series in memory and
//!   serving them over HTTP, installed once per process
//! - a push backend ([`StatsdReporter`]) sending one UDP datagram per report, with client-side
//!   sampling
//! - a bridge ([`RecorderReporter`]) forwarding reports to whichever [`metrics`] recorder is
//!   installed
//! - request timing helpers driven by a [`MetricsContext`]
//! - a periodic process statistics loop ([`report_sys_metrics`])
//!
//! ## Behavior
//!
//! - The pull backend only accepts metric names it declared at startup: the built-in catalog
//!   plus an operator-defined one. Anything else is rejected with
//!   [`ReportError::MetricNotKnown`].
//! - Additional labels declared at startup are part of every pull series and default to the
//!   configured value when a report omits them. Label keys a pull series does not declare are
//!   dropped from the report.
//! - The push backend cannot express histograms and returns [`ReportError::NotImplemented`].
//!
//! ## Usage
//!
//! ```ignore
//! let config: MetricsConfig = toml::from_str(&std::fs::read_to_string("metrics.toml")?)?;
//!
//! // Installs the pull reporter (and its HTTP listener) and builds the push reporter,
//! // depending on which ones are enabled.
//! let reporters = install_reporters(&config)?;
//!
//! // At the framework entry point, once per request:
//! let ctx = MetricsContext::new("room.join").with_tag("region", "eu");
//! // ... handle the request ...
//! report_timing_from_ctx(Some(&ctx), &reporters, "remote", None);
//!
//! // In the background:
//! tokio::spawn(report_sys_metrics(reporters.clone(), Duration::from_secs(10), shutdown));
//! ```
mod common;
pub use self::common::{
    BuildError, ReportError, CHANNEL_CAPACITY, CONNECTED_CLIENTS, COUNT_SERVERS,
    DROPPED_MESSAGES, EXCEEDED_RATE_LIMITING, GOROUTINES, HEAP_OBJECTS, HEAP_SIZE, PROCESS_DELAY,
    RESPONSE_TIME, WORKER_JOBS_RETRY, WORKER_JOBS_TOTAL, WORKER_QUEUE_SIZE,
};

mod reporter;
pub use self::reporter::{ensure_labels, Labels, Reporter};

pub mod config;
pub use self::config::MetricsConfig;

mod context;
pub use self::context::{elapsed, now_nanos, route, start_time, tags_from_context, MetricsContext};

mod report;
pub use self::report::{
    error_code, report_exceeded_rate_limiting, report_message_process_delay_from_ctx,
    report_number_of_connected_clients, report_timing_from_ctx, ErrorCode, UNKNOWN_ERROR_CODE,
};

pub mod formatting;

pub mod prometheus;
pub use self::prometheus::{PrometheusBuilder, PrometheusReporter};

pub mod statsd;
pub use self::statsd::{StatsdBuilder, StatsdReporter};

mod bridge;
pub use self::bridge::RecorderReporter;

mod sys;
pub use self::sys::{report_sys_metrics, SysStats};

mod install;
pub use self::install::install_reporters;

#[cfg(test)]
mod test_util;
