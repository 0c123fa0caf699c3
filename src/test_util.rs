use std::io;

use mockall::mock;

use crate::common::ReportError;
use crate::reporter::{Labels, Reporter};
use crate::statsd::StatsdClient;

mock! {
    pub Backend {}

    impl Reporter for Backend {
        fn report_count(&self, metric: &str, labels: &Labels, delta: f64) -> Result<(), ReportError>;
        fn report_gauge(&self, metric: &str, labels: &Labels, value: f64) -> Result<(), ReportError>;
        fn report_summary(&self, metric: &str, labels: &Labels, value: f64) -> Result<(), ReportError>;
        fn report_histogram(&self, metric: &str, labels: &Labels, value: f64) -> Result<(), ReportError>;
    }
}

mock! {
    pub Client {}

    impl StatsdClient for Client {
        fn count(&self, name: &str, value: i64, tags: &[String], rate: f64) -> io::Result<()>;
        fn gauge(&self, name: &str, value: f64, tags: &[String], rate: f64) -> io::Result<()>;
        fn timing(&self, name: &str, value: f64, tags: &[String], rate: f64) -> io::Result<()>;
    }
}

pub fn labels(pairs: &[(&str, &str)]) -> Labels {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}
