//! Push reporter sending every report as one statsd/dogstatsd datagram.

mod builder;
mod client;

pub use self::builder::StatsdBuilder;
pub use self::client::{StatsdClient, UdpClient};

use indexmap::IndexMap;
use tracing::error;

use crate::common::ReportError;
use crate::formatting::format_tag;
use crate::reporter::{Labels, Reporter};

/// Reporter forwarding each call to a [`StatsdClient`].
///
/// A fixed list of default tags (`serverType` and the configured constant tags) is computed once
/// at construction and prepended to the caller's labels on every call. Send failures are logged
/// and returned; nothing is retried or buffered.
pub struct StatsdReporter {
    client: Box<dyn StatsdClient>,
    rate: f64,
    default_tags: Vec<String>,
}

impl StatsdReporter {
    pub(crate) fn new(
        client: Box<dyn StatsdClient>,
        rate: f64,
        server_type: &str,
        constant_tags: &IndexMap<String, String>,
    ) -> Self {
        let mut default_tags = Vec::with_capacity(constant_tags.len() + 1);
        default_tags.push(format_tag("serverType", server_type));
        default_tags.extend(constant_tags.iter().map(|(k, v)| format_tag(k, v)));

        Self {
            client,
            rate,
            default_tags,
        }
    }

    /// Tags sent with every report before the caller's labels.
    pub fn default_tags(&self) -> &[String] {
        &self.default_tags
    }

    fn full_tags(&self, labels: &Labels) -> Vec<String> {
        let mut tags = Vec::with_capacity(self.default_tags.len() + labels.len());
        tags.extend_from_slice(&self.default_tags);
        tags.extend(labels.iter().map(|(k, v)| format_tag(k, v)));
        tags
    }
}

impl Reporter for StatsdReporter {
    fn report_count(&self, metric: &str, labels: &Labels, delta: f64) -> Result<(), ReportError> {
        let tags = self.full_tags(labels);
        self.client.count(metric, delta as i64, &tags, self.rate).map_err(|e| {
            error!(metric, error = %e, "failed to report count");
            e.into()
        })
    }

    fn report_gauge(&self, metric: &str, labels: &Labels, value: f64) -> Result<(), ReportError> {
        let tags = self.full_tags(labels);
        self.client.gauge(metric, value, &tags, self.rate).map_err(|e| {
            error!(metric, error = %e, "failed to report gauge");
            e.into()
        })
    }

    fn report_summary(
        &self,
        metric: &str,
        labels: &Labels,
        value: f64,
    ) -> Result<(), ReportError> {
        let tags = self.full_tags(labels);
        self.client.timing(metric, value, &tags, self.rate).map_err(|e| {
            error!(metric, error = %e, "failed to report summary");
            e.into()
        })
    }

    fn report_histogram(&self, _: &str, _: &Labels, _: f64) -> Result<(), ReportError> {
        Err(ReportError::NotImplemented)
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use indexmap::IndexMap;
    use mockall::predicate::{always, eq};

    use super::StatsdReporter;
    use crate::common::ReportError;
    use crate::reporter::Reporter;
    use crate::test_util::{labels, MockClient};

    fn constant_tags() -> IndexMap<String, String> {
        labels(&[("region", "eu")])
    }

    #[test]
    fn default_tags_are_built_once() {
        let reporter =
            StatsdReporter::new(Box::new(MockClient::new()), 1.0, "connector", &constant_tags());

        assert_eq!(reporter.default_tags(), ["serverType:connector", "region:eu"]);
    }

    #[test]
    fn caller_labels_follow_default_tags() {
        let mut client = MockClient::new();
        client
            .expect_count()
            .with(eq("exceeded_rate_limiting"), eq(3), always(), eq(0.5))
            .times(1)
            .returning(|_, _, tags, _| {
                assert_eq!(tags, ["serverType:connector", "region:eu", "route:room.join"]);
                Ok(())
            });
        let reporter = StatsdReporter::new(Box::new(client), 0.5, "connector", &constant_tags());

        reporter
            .report_count("exceeded_rate_limiting", &labels(&[("route", "room.join")]), 3.7)
            .unwrap();
    }

    #[test]
    fn summaries_are_sent_as_timings() {
        let mut client = MockClient::new();
        client
            .expect_timing()
            .with(eq("response_time"), eq(250.0), always(), eq(1.0))
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        client.expect_gauge().times(0);
        let reporter = StatsdReporter::new(Box::new(client), 1.0, "connector", &IndexMap::new());

        reporter.report_summary("response_time", &labels(&[]), 250.0).unwrap();
    }

    #[test]
    fn default_tags_are_not_extended_across_calls() {
        let mut client = MockClient::new();
        client
            .expect_gauge()
            .with(eq("count_servers"), eq(2.0), always(), eq(1.0))
            .times(1)
            .returning(|_, _, tags, _| {
                assert_eq!(tags, ["serverType:connector", "type:room", "zone:a"]);
                Ok(())
            });
        client
            .expect_gauge()
            .with(eq("connected_clients"), eq(5.0), always(), eq(1.0))
            .times(1)
            .returning(|_, _, tags, _| {
                assert_eq!(tags, ["serverType:connector"]);
                Ok(())
            });
        let reporter = StatsdReporter::new(Box::new(client), 1.0, "connector", &IndexMap::new());

        reporter
            .report_gauge("count_servers", &labels(&[("type", "room"), ("zone", "a")]), 2.0)
            .unwrap();
        reporter.report_gauge("connected_clients", &labels(&[]), 5.0).unwrap();
    }

    #[test]
    fn send_failures_are_returned() {
        let mut client = MockClient::new();
        client
            .expect_gauge()
            .returning(|_, _, _, _| Err(io::Error::new(io::ErrorKind::Other, "unreachable")));
        let reporter = StatsdReporter::new(Box::new(client), 1.0, "connector", &IndexMap::new());

        let result = reporter.report_gauge("connected_clients", &labels(&[]), 1.0);
        assert!(matches!(result, Err(ReportError::Transport(_))));
    }

    #[test]
    fn histograms_are_not_implemented() {
        let mut client = MockClient::new();
        client.expect_count().times(0);
        client.expect_gauge().times(0);
        client.expect_timing().times(0);
        let reporter = StatsdReporter::new(Box::new(client), 1.0, "connector", &IndexMap::new());

        let result = reporter.report_histogram("response_time", &labels(&[]), 1.0);
        assert!(matches!(result, Err(ReportError::NotImplemented)));
    }
}
