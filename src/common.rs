use std::io;

use thiserror::Error;

/// Summary of the time spent handling a message, in nanoseconds.
pub const RESPONSE_TIME: &str = "response_time";
/// Summary of the time a message waited before being processed, in nanoseconds.
pub const PROCESS_DELAY: &str = "process_delay";
/// Number of clients currently connected to the acceptors.
pub const CONNECTED_CLIENTS: &str = "connected_clients";
/// Number of servers found by service discovery, by server type.
pub const COUNT_SERVERS: &str = "count_servers";
/// Available capacity of an internal channel.
pub const CHANNEL_CAPACITY: &str = "channel_capacity";
/// Number of messages the rpc server dropped without handling them.
pub const DROPPED_MESSAGES: &str = "dropped_messages";
/// Number of live concurrency units (tasks or threads).
pub const GOROUTINES: &str = "goroutines";
/// Current heap size in bytes.
pub const HEAP_SIZE: &str = "heap_size";
/// Current number of live heap objects.
pub const HEAP_OBJECTS: &str = "heap_objects";
/// Current number of worker job retries.
pub const WORKER_JOBS_RETRY: &str = "worker_jobs_retry";
/// Current size of a worker queue.
pub const WORKER_QUEUE_SIZE: &str = "worker_queue_size";
/// Total executed worker jobs, by status.
pub const WORKER_JOBS_TOTAL: &str = "worker_jobs_total";
/// Requests blocked by rate limiting.
pub const EXCEEDED_RATE_LIMITING: &str = "exceeded_rate_limiting";

/// Errors returned by a single reporting call.
///
/// None of these are fatal: callers fanning out to several reporters are expected to carry on
/// with the next one.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The backend has no series registered under the given name.
    #[error("the provided metric does not exist: {0}")]
    MetricNotKnown(String),

    /// The backend cannot express this kind of observation.
    #[error("method not implemented")]
    NotImplemented,

    /// The label keys do not match the schema the series was registered with.
    #[error("inconsistent labels for metric {metric}, expected keys {expected:?}")]
    InconsistentLabels {
        /// Name of the metric being reported.
        metric: String,
        /// Label keys the series was declared with.
        expected: Vec<String>,
    },

    /// The value cannot be applied to the series, e.g. a negative counter delta.
    #[error("invalid value {value} for metric {metric}")]
    InvalidValue {
        /// Name of the metric being reported.
        metric: String,
        /// The rejected value.
        value: f64,
    },

    /// The backend failed to hand the observation to its transport.
    #[error("failed to send metric: {0}")]
    Transport(#[from] io::Error),
}

/// Errors that could occur while building or installing a reporter.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Two series resolved to the same fully qualified name.
    #[error("duplicate metric registration: {0}")]
    DuplicateMetric(String),

    /// A histogram was declared without bucket boundaries, or with unsorted ones.
    #[error("histogram {0} must declare at least one bucket, in increasing order")]
    InvalidBuckets(String),

    /// A constant label shares its key with one of the series' own labels.
    #[error("constant label {label} collides with a label of metric {metric}")]
    ConflictingLabel {
        /// Fully qualified name of the series.
        metric: String,
        /// The colliding label key.
        label: String,
    },

    /// The series name, help string or label keys were refused by the registry.
    #[error("invalid metric {metric}: {reason}")]
    InvalidMetric {
        /// Fully qualified name of the series.
        metric: String,
        /// What the registry complained about.
        reason: String,
    },

    /// Failed to parse or resolve the push collector address.
    #[error("invalid remote address: {0}")]
    InvalidRemoteAddress(String),

    /// Failed to bind the pull endpoint.
    #[error("failed to create HTTP listener: {0}")]
    FailedToCreateHTTPListener(String),

    /// Failed to create the runtime hosting the pull endpoint.
    #[error("failed to create runtime: {0}")]
    FailedToCreateRuntime(String),
}
