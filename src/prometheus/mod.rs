//! Pull reporter keeping every series in a Prometheus registry and exposing them over HTTP in
//! the text format.

mod builder;
mod catalog;
mod http_listener;
mod summary;

pub use self::builder::{ExporterFuture, PrometheusBuilder};

use std::collections::HashMap;
use std::net::SocketAddr;

use metrics_util::parse_quantiles;
use prometheus::core::{Collector, Describer};
use prometheus::{CounterVec, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use tracing::debug;

use self::summary::SummaryVec;
use crate::common::{BuildError, ReportError};
use crate::config::CustomMetricsSpec;
use crate::reporter::{Labels, Reporter};

/// A registered vector and the label keys it was declared with, in declaration order.
struct Family<V> {
    vec: V,
    label_names: Vec<String>,
}

impl<V> Family<V> {
    /// Label values in schema order.
    ///
    /// Keys outside the schema are dropped. Missing keys take the additional-label default, or
    /// an empty value.
    fn label_values(&self, labels: &Labels, defaults: &Labels) -> Vec<String> {
        self.label_names
            .iter()
            .map(|key| labels.get(key).or_else(|| defaults.get(key)).cloned().unwrap_or_default())
            .collect()
    }

    fn inconsistent(&self, metric: &str) -> ReportError {
        ReportError::InconsistentLabels {
            metric: metric.to_owned(),
            expected: self.label_names.clone(),
        }
    }
}

/// Reporter backed by a Prometheus registry.
///
/// Series are declared once, at construction, from the operator's custom catalog followed by
/// the built-in one. Reports against a name that was never declared are rejected with
/// [`ReportError::MetricNotKnown`] and leave every series untouched.
///
/// Every report is fitted to the label schema of its series: keys the series does not declare
/// are dropped, and declared keys the report omits are filled in.
pub struct PrometheusReporter {
    summaries: HashMap<String, Family<SummaryVec>>,
    histograms: HashMap<String, Family<HistogramVec>>,
    gauges: HashMap<String, Family<GaugeVec>>,
    counters: HashMap<String, Family<CounterVec>>,
    additional_labels: Labels,
    registry: Registry,
    listen_address: Option<SocketAddr>,
}

impl PrometheusReporter {
    pub(crate) fn new(
        namespace: &str,
        const_labels: &Labels,
        additional_labels: Labels,
        custom: &CustomMetricsSpec,
    ) -> Result<Self, BuildError> {
        let mut reporter = Self {
            summaries: HashMap::new(),
            histograms: HashMap::new(),
            gauges: HashMap::new(),
            counters: HashMap::new(),
            additional_labels,
            registry: Registry::new(),
            listen_address: None,
        };

        let const_labels: HashMap<String, String> =
            const_labels.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        reporter.register_catalog(namespace, &const_labels, custom)?;
        reporter.register_catalog(namespace, &const_labels, &catalog::builtin())?;
        debug!(
            summaries = reporter.summaries.len(),
            histograms = reporter.histograms.len(),
            gauges = reporter.gauges.len(),
            counters = reporter.counters.len(),
            "prometheus series registered"
        );

        Ok(reporter)
    }

    fn register_catalog(
        &mut self,
        namespace: &str,
        const_labels: &HashMap<String, String>,
        spec: &CustomMetricsSpec,
    ) -> Result<(), BuildError> {
        for summary in &spec.summaries {
            let (opts, label_names) = self.opts(
                namespace,
                &summary.subsystem,
                &summary.name,
                &summary.help,
                const_labels,
                &summary.labels,
            )?;
            let fq_name = opts.fq_name();
            let desc = opts
                .variable_labels(label_names.clone())
                .describe()
                .map_err(|e| registry_error(&fq_name, e))?;
            let vec = SummaryVec::new(desc, parse_quantiles(&summary.objectives));
            let family = Family { vec, label_names };
            Self::register(&self.registry, &mut self.summaries, &summary.name, &fq_name, family)?;
        }

        for histogram in &spec.histograms {
            let (opts, label_names) = self.opts(
                namespace,
                &histogram.subsystem,
                &histogram.name,
                &histogram.help,
                const_labels,
                &histogram.labels,
            )?;
            let fq_name = opts.fq_name();
            let buckets = &histogram.buckets;
            if buckets.is_empty() || buckets.windows(2).any(|pair| pair[0] >= pair[1]) {
                return Err(BuildError::InvalidBuckets(fq_name));
            }
            let opts = HistogramOpts::from(opts).buckets(buckets.clone());
            let vec = HistogramVec::new(opts, &keys(&label_names))
                .map_err(|e| registry_error(&fq_name, e))?;
            let family = Family { vec, label_names };
            let name = &histogram.name;
            Self::register(&self.registry, &mut self.histograms, name, &fq_name, family)?;
        }

        for gauge in &spec.gauges {
            let (opts, label_names) = self.opts(
                namespace,
                &gauge.subsystem,
                &gauge.name,
                &gauge.help,
                const_labels,
                &gauge.labels,
            )?;
            let fq_name = opts.fq_name();
            let vec =
                GaugeVec::new(opts, &keys(&label_names)).map_err(|e| registry_error(&fq_name, e))?;
            let family = Family { vec, label_names };
            Self::register(&self.registry, &mut self.gauges, &gauge.name, &fq_name, family)?;
        }

        for counter in &spec.counters {
            let (opts, label_names) = self.opts(
                namespace,
                &counter.subsystem,
                &counter.name,
                &counter.help,
                const_labels,
                &counter.labels,
            )?;
            let fq_name = opts.fq_name();
            let vec = CounterVec::new(opts, &keys(&label_names))
                .map_err(|e| registry_error(&fq_name, e))?;
            let family = Family { vec, label_names };
            Self::register(&self.registry, &mut self.counters, &counter.name, &fq_name, family)?;
        }

        Ok(())
    }

    /// Options for a series whose label schema is `labels` followed by every additional label
    /// key, returned along with that schema.
    fn opts(
        &self,
        namespace: &str,
        subsystem: &str,
        name: &str,
        help: &str,
        const_labels: &HashMap<String, String>,
        labels: &[String],
    ) -> Result<(Opts, Vec<String>), BuildError> {
        let opts = Opts::new(name, help)
            .namespace(namespace)
            .subsystem(subsystem)
            .const_labels(const_labels.clone());

        let mut label_names = labels.to_vec();
        for key in self.additional_labels.keys() {
            if !label_names.contains(key) {
                label_names.push(key.clone());
            }
        }

        // Constant and variable label keys must be disjoint.
        if let Some(label) = label_names.iter().find(|key| const_labels.contains_key(*key)) {
            return Err(BuildError::ConflictingLabel {
                metric: opts.fq_name(),
                label: label.clone(),
            });
        }

        Ok((opts, label_names))
    }

    /// Registers `family` under its short `name`, which reports address it by.
    fn register<V: Collector + Clone + 'static>(
        registry: &Registry,
        table: &mut HashMap<String, Family<V>>,
        name: &str,
        fq_name: &str,
        family: Family<V>,
    ) -> Result<(), BuildError> {
        if table.contains_key(name) {
            return Err(BuildError::DuplicateMetric(name.to_owned()));
        }
        registry
            .register(Box::new(family.vec.clone()))
            .map_err(|e| registry_error(fq_name, e))?;
        table.insert(name.to_owned(), family);
        Ok(())
    }

    pub(crate) fn set_listen_address(&mut self, address: SocketAddr) {
        self.listen_address = Some(address);
    }

    /// Address the HTTP listener is bound to, if one was started for this reporter.
    pub fn listen_address(&self) -> Option<SocketAddr> {
        self.listen_address
    }

    /// Renders every observed series in the Prometheus text exposition format.
    ///
    /// ## Errors
    ///
    /// If the registry hands out a family the encoder cannot write, an error is returned.
    pub fn render(&self) -> prometheus::Result<String> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }

    fn resolve<'a, V>(
        table: &'a HashMap<String, Family<V>>,
        metric: &str,
    ) -> Result<&'a Family<V>, ReportError> {
        table.get(metric).ok_or_else(|| ReportError::MetricNotKnown(metric.to_owned()))
    }
}

fn keys(label_names: &[String]) -> Vec<&str> {
    label_names.iter().map(String::as_str).collect()
}

fn registry_error(fq_name: &str, e: prometheus::Error) -> BuildError {
    match e {
        prometheus::Error::AlreadyReg => BuildError::DuplicateMetric(fq_name.to_owned()),
        e => BuildError::InvalidMetric { metric: fq_name.to_owned(), reason: e.to_string() },
    }
}

impl Reporter for PrometheusReporter {
    fn report_count(&self, metric: &str, labels: &Labels, delta: f64) -> Result<(), ReportError> {
        let family = Self::resolve(&self.counters, metric)?;
        if delta.is_nan() || delta < 0.0 {
            return Err(ReportError::InvalidValue { metric: metric.to_owned(), value: delta });
        }
        let values = family.label_values(labels, &self.additional_labels);
        family
            .vec
            .get_metric_with_label_values(&values)
            .map_err(|_| family.inconsistent(metric))?
            .inc_by(delta);
        Ok(())
    }

    fn report_gauge(&self, metric: &str, labels: &Labels, value: f64) -> Result<(), ReportError> {
        let family = Self::resolve(&self.gauges, metric)?;
        let values = family.label_values(labels, &self.additional_labels);
        family
            .vec
            .get_metric_with_label_values(&values)
            .map_err(|_| family.inconsistent(metric))?
            .set(value);
        Ok(())
    }

    fn report_summary(
        &self,
        metric: &str,
        labels: &Labels,
        value: f64,
    ) -> Result<(), ReportError> {
        let family = Self::resolve(&self.summaries, metric)?;
        let values = family.label_values(labels, &self.additional_labels);
        family
            .vec
            .get_metric_with_label_values(&values)
            .map_err(|_| family.inconsistent(metric))?
            .observe(value);
        Ok(())
    }

    fn report_histogram(
        &self,
        metric: &str,
        labels: &Labels,
        value: f64,
    ) -> Result<(), ReportError> {
        let family = Self::resolve(&self.histograms, metric)?;
        let values = family.label_values(labels, &self.additional_labels);
        family
            .vec
            .get_metric_with_label_values(&values)
            .map_err(|_| family.inconsistent(metric))?
            .observe(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::PrometheusReporter;
    use crate::common::{
        BuildError, ReportError, CONNECTED_CLIENTS, COUNT_SERVERS, EXCEEDED_RATE_LIMITING,
        RESPONSE_TIME, WORKER_QUEUE_SIZE,
    };
    use crate::config::{CounterSpec, CustomMetricsSpec, GaugeSpec, HistogramSpec};
    use crate::context::MetricsContext;
    use crate::report::report_timing_from_ctx;
    use crate::reporter::{Labels, Reporter};
    use crate::test_util::labels;

    fn reporter(additional: Labels) -> PrometheusReporter {
        PrometheusReporter::new(
            "game",
            &labels(&[("game", "tanks"), ("serverType", "room")]),
            additional,
            &CustomMetricsSpec::default(),
        )
        .unwrap()
    }

    fn gauge(subsystem: &str, name: &str) -> GaugeSpec {
        GaugeSpec {
            subsystem: subsystem.to_owned(),
            name: name.to_owned(),
            help: format!("{name} help"),
            labels: Vec::new(),
        }
    }

    fn response_time_labels() -> Labels {
        labels(&[("route", "room.join"), ("status", "ok"), ("type", "sys"), ("code", "")])
    }

    #[test]
    fn nothing_is_rendered_before_the_first_report() {
        assert_eq!(reporter(Labels::new()).render().unwrap(), "");
    }

    #[test]
    fn gauges_are_exposed_with_constant_labels() {
        let reporter = reporter(Labels::new());
        reporter.report_gauge(CONNECTED_CLIENTS, &Labels::new(), 12.0).unwrap();

        assert_eq!(
            reporter.render().unwrap(),
            concat!(
                "# HELP game_acceptor_connected_clients ",
                "the number of clients connected right now\n",
                "# TYPE game_acceptor_connected_clients gauge\n",
                "game_acceptor_connected_clients{game=\"tanks\",serverType=\"room\"} 12\n",
            )
        );
    }

    #[test]
    fn unknown_metrics_leave_series_untouched() {
        let reporter = reporter(Labels::new());

        for result in [
            reporter.report_count("nope", &Labels::new(), 1.0),
            reporter.report_gauge("nope", &Labels::new(), 1.0),
            reporter.report_summary("nope", &Labels::new(), 1.0),
            reporter.report_histogram("nope", &Labels::new(), 1.0),
        ] {
            assert!(matches!(result, Err(ReportError::MetricNotKnown(name)) if name == "nope"));
        }
        assert_eq!(reporter.render().unwrap(), "");
    }

    #[test]
    fn summaries_and_histograms_are_recorded() {
        let reporter = reporter(Labels::new());
        reporter.report_summary(RESPONSE_TIME, &response_time_labels(), 300.0).unwrap();
        reporter.report_histogram(RESPONSE_TIME, &response_time_labels(), 300.0).unwrap();

        let output = reporter.render().unwrap();
        let series = "code=\"\",game=\"tanks\",route=\"room.join\",serverType=\"room\",\
                      status=\"ok\",type=\"sys\"";
        assert!(output.contains("# TYPE game_handler_response_time summary\n"));
        assert!(output.contains(&format!("game_handler_response_time_count{{{series}}} 1\n")));
        assert!(output.contains("quantile=\"0.95\"} "));
        assert!(output.contains("# TYPE game_handler_histogram_response_time histogram\n"));
        let bucket = "game_handler_histogram_response_time_bucket";
        assert!(output.contains(&format!("{bucket}{{{series},le=\"300\"}} 1\n")));
        assert!(output.contains(&format!("{bucket}{{{series},le=\"100\"}} 0\n")));
    }

    #[test]
    fn additional_labels_are_filled_with_defaults() {
        let reporter = reporter(labels(&[("shard", "none")]));
        reporter.report_gauge(WORKER_QUEUE_SIZE, &labels(&[("queue", "mail")]), 1.0).unwrap();
        reporter
            .report_gauge(WORKER_QUEUE_SIZE, &labels(&[("queue", "mail"), ("shard", "7")]), 2.0)
            .unwrap();

        let output = reporter.render().unwrap();
        assert!(output.contains("queue=\"mail\",serverType=\"room\",shard=\"none\"} 1\n"));
        assert!(output.contains("queue=\"mail\",serverType=\"room\",shard=\"7\"} 2\n"));
    }

    #[test]
    fn labels_are_fitted_to_the_schema() {
        let reporter = reporter(Labels::new());
        reporter
            .report_gauge(WORKER_QUEUE_SIZE, &labels(&[("queue", "a"), ("x", "y")]), 1.0)
            .unwrap();
        reporter.report_gauge(COUNT_SERVERS, &Labels::new(), 3.0).unwrap();

        let output = reporter.render().unwrap();
        assert!(output.contains(
            "game_worker_worker_queue_size{game=\"tanks\",queue=\"a\",serverType=\"room\"} 1\n"
        ));
        assert!(output.contains(
            "game_service_discovery_count_servers{game=\"tanks\",serverType=\"room\",type=\"\"} 3\n"
        ));
        assert!(!output.contains("x=\"y\""));
    }

    #[test]
    fn timings_with_ad_hoc_tags_are_recorded() {
        let reporter = Arc::new(reporter(Labels::new()));
        let reporters = vec![Arc::clone(&reporter) as Arc<dyn Reporter>];
        let ctx = MetricsContext::new("room.join").with_tag("key", "value");

        report_timing_from_ctx(Some(&ctx), &reporters, "local", None);

        let output = reporter.render().unwrap();
        assert!(output.contains(
            "game_handler_response_time_count{code=\"\",game=\"tanks\",route=\"room.join\",\
             serverType=\"room\",status=\"ok\",type=\"local\"} 1\n"
        ));
        assert!(!output.contains("key=\"value\""));
    }

    #[test]
    fn counters_only_go_up() {
        let reporter = reporter(Labels::new());
        reporter.report_count(EXCEEDED_RATE_LIMITING, &Labels::new(), 1.0).unwrap();
        reporter.report_count(EXCEEDED_RATE_LIMITING, &Labels::new(), 2.0).unwrap();

        let result = reporter.report_count(EXCEEDED_RATE_LIMITING, &Labels::new(), -1.0);
        assert!(matches!(result, Err(ReportError::InvalidValue { value, .. }) if value == -1.0));
        assert!(reporter.render().unwrap().contains(
            "game_acceptor_exceeded_rate_limiting{game=\"tanks\",serverType=\"room\"} 3\n"
        ));
    }

    #[test]
    fn custom_series_are_registered() {
        let custom = CustomMetricsSpec {
            gauges: vec![GaugeSpec {
                labels: vec!["room_type".to_owned()],
                ..gauge("room", "players")
            }],
            ..Default::default()
        };
        let reporter =
            PrometheusReporter::new("game", &Labels::new(), Labels::new(), &custom).unwrap();
        reporter.report_gauge("players", &labels(&[("room_type", "duel")]), 2.0).unwrap();

        assert!(reporter.render().unwrap().contains("game_room_players{room_type=\"duel\"} 2\n"));
    }

    #[test]
    fn custom_series_colliding_with_builtins_are_fatal() {
        let custom = CustomMetricsSpec {
            gauges: vec![gauge("acceptor", CONNECTED_CLIENTS)],
            ..Default::default()
        };
        let result = PrometheusReporter::new("game", &Labels::new(), Labels::new(), &custom);

        assert!(matches!(
            result,
            Err(BuildError::DuplicateMetric(name)) if name == CONNECTED_CLIENTS
        ));
    }

    #[test]
    fn builtin_names_are_reserved_in_every_subsystem() {
        let custom = CustomMetricsSpec {
            gauges: vec![gauge("room", CONNECTED_CLIENTS)],
            ..Default::default()
        };
        let result = PrometheusReporter::new("game", &Labels::new(), Labels::new(), &custom);

        assert!(matches!(
            result,
            Err(BuildError::DuplicateMetric(name)) if name == CONNECTED_CLIENTS
        ));
    }

    #[test]
    fn series_of_different_kinds_cannot_share_a_name() {
        let custom = CustomMetricsSpec {
            gauges: vec![gauge("room", "players")],
            counters: vec![CounterSpec {
                subsystem: "room".to_owned(),
                name: "players".to_owned(),
                help: "players help".to_owned(),
                labels: Vec::new(),
            }],
            ..Default::default()
        };
        let result = PrometheusReporter::new("game", &Labels::new(), Labels::new(), &custom);

        assert!(matches!(
            result,
            Err(BuildError::DuplicateMetric(name)) if name == "game_room_players"
        ));
    }

    #[test]
    fn constant_labels_cannot_shadow_series_labels() {
        let result = PrometheusReporter::new(
            "game",
            &labels(&[("type", "room")]),
            Labels::new(),
            &CustomMetricsSpec::default(),
        );

        assert!(matches!(
            result,
            Err(BuildError::ConflictingLabel { metric, label })
                if metric == "game_handler_response_time" && label == "type"
        ));

        let result = PrometheusReporter::new(
            "game",
            &labels(&[("serverType", "room")]),
            labels(&[("serverType", "none")]),
            &CustomMetricsSpec::default(),
        );
        assert!(matches!(
            result,
            Err(BuildError::ConflictingLabel { label, .. }) if label == "serverType"
        ));
    }

    #[test]
    fn histograms_need_increasing_buckets() {
        for buckets in [Vec::new(), vec![10.0, 1.0]] {
            let custom = CustomMetricsSpec {
                histograms: vec![HistogramSpec {
                    subsystem: "room".to_owned(),
                    name: "size".to_owned(),
                    help: "room size".to_owned(),
                    buckets,
                    labels: Vec::new(),
                }],
                ..Default::default()
            };
            let result = PrometheusReporter::new("game", &Labels::new(), Labels::new(), &custom);

            assert!(matches!(
                result,
                Err(BuildError::InvalidBuckets(name)) if name == "game_room_size"
            ));
        }
    }
}
