use crate::common::{
    CHANNEL_CAPACITY, CONNECTED_CLIENTS, COUNT_SERVERS, DROPPED_MESSAGES, EXCEEDED_RATE_LIMITING,
    GOROUTINES, HEAP_OBJECTS, HEAP_SIZE, PROCESS_DELAY, RESPONSE_TIME, WORKER_JOBS_RETRY,
    WORKER_JOBS_TOTAL, WORKER_QUEUE_SIZE,
};
use crate::config::{
    default_objectives, CounterSpec, CustomMetricsSpec, GaugeSpec, HistogramSpec, SummarySpec,
};

const RESPONSE_TIME_BUCKETS: [f64; 10] =
    [1.0, 5.0, 10.0, 50.0, 100.0, 300.0, 500.0, 1000.0, 5000.0, 10000.0];

fn labels(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|key| key.to_string()).collect()
}

fn gauge(subsystem: &str, name: &str, help: &str, keys: &[&str]) -> GaugeSpec {
    GaugeSpec {
        subsystem: subsystem.to_owned(),
        name: name.to_owned(),
        help: help.to_owned(),
        labels: labels(keys),
    }
}

/// Series every pull reporter exposes regardless of configuration.
pub(crate) fn builtin() -> CustomMetricsSpec {
    let summaries = vec![
        SummarySpec {
            subsystem: "handler".to_owned(),
            name: RESPONSE_TIME.to_owned(),
            help: "the time to process a msg in nanoseconds".to_owned(),
            objectives: default_objectives(),
            labels: labels(&["route", "status", "type", "code"]),
        },
        SummarySpec {
            subsystem: "handler".to_owned(),
            name: PROCESS_DELAY.to_owned(),
            help: "the delay to start processing a msg in nanoseconds".to_owned(),
            objectives: default_objectives(),
            labels: labels(&["route", "type"]),
        },
    ];

    // Summaries and histograms share one name space in the exposition.
    let histograms = vec![HistogramSpec {
        subsystem: "handler_histogram".to_owned(),
        name: RESPONSE_TIME.to_owned(),
        help: "the time to process a msg in nanoseconds".to_owned(),
        buckets: RESPONSE_TIME_BUCKETS.to_vec(),
        labels: labels(&["route", "status", "type", "code"]),
    }];

    let gauges = vec![
        gauge("acceptor", CONNECTED_CLIENTS, "the number of clients connected right now", &[]),
        gauge(
            "service_discovery",
            COUNT_SERVERS,
            "the number of discovered servers by service discovery",
            &["type"],
        ),
        gauge("channel", CHANNEL_CAPACITY, "the available capacity of the channel", &["channel"]),
        gauge(
            "rpc_server",
            DROPPED_MESSAGES,
            "the number of rpc server dropped messages (messages that are not handled)",
            &[],
        ),
        gauge("sys", GOROUTINES, "the current number of goroutines", &[]),
        gauge("sys", HEAP_SIZE, "the current heap size", &[]),
        gauge("sys", HEAP_OBJECTS, "the current number of allocated heap objects", &[]),
        gauge("worker", WORKER_JOBS_RETRY, "the current number of job retries", &[]),
        gauge("worker", WORKER_QUEUE_SIZE, "the current queue size", &["queue"]),
        gauge("worker", WORKER_JOBS_TOTAL, "the total executed jobs", &["status"]),
    ];

    let counters = vec![CounterSpec {
        subsystem: "acceptor".to_owned(),
        name: EXCEEDED_RATE_LIMITING.to_owned(),
        help: "the number of blocked requests by exceeded rate limiting".to_owned(),
        labels: Vec::new(),
    }];

    CustomMetricsSpec { summaries, histograms, gauges, counters }
}
