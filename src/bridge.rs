//! Reporter forwarding every report to the [`metrics`] facade.
//!
//! This lets applications that already install a [`metrics::Recorder`] (any of the `metrics`
//! exporters) receive the same reports as the pull and push backends.

use metrics::{counter, gauge, histogram, Label};

use crate::common::ReportError;
use crate::reporter::{Labels, Reporter};

/// Reporter calling the `metrics` macros against whichever recorder is current.
///
/// Summaries and histograms both end up as `metrics` histograms; how they are aggregated is up
/// to the installed recorder.
#[derive(Clone, Debug, Default)]
pub struct RecorderReporter {
    global_labels: Vec<Label>,
}

impl RecorderReporter {
    /// Creates a new [`RecorderReporter`] without global labels.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a label appended to every report.
    #[must_use]
    pub fn add_global_label<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.global_labels.push(Label::new(key.into(), value.into()));
        self
    }

    fn labels(&self, labels: &Labels) -> Vec<Label> {
        labels
            .iter()
            .map(|(key, value)| Label::new(key.clone(), value.clone()))
            .chain(self.global_labels.iter().cloned())
            .collect()
    }
}

impl Reporter for RecorderReporter {
    fn report_count(&self, metric: &str, labels: &Labels, delta: f64) -> Result<(), ReportError> {
        if delta.is_nan() || delta < 0.0 {
            return Err(ReportError::InvalidValue { metric: metric.to_owned(), value: delta });
        }
        counter!(metric.to_owned(), self.labels(labels)).increment(delta.round() as u64);
        Ok(())
    }

    fn report_gauge(&self, metric: &str, labels: &Labels, value: f64) -> Result<(), ReportError> {
        gauge!(metric.to_owned(), self.labels(labels)).set(value);
        Ok(())
    }

    fn report_summary(
        &self,
        metric: &str,
        labels: &Labels,
        value: f64,
    ) -> Result<(), ReportError> {
        histogram!(metric.to_owned(), self.labels(labels)).record(value);
        Ok(())
    }

    fn report_histogram(
        &self,
        metric: &str,
        labels: &Labels,
        value: f64,
    ) -> Result<(), ReportError> {
        histogram!(metric.to_owned(), self.labels(labels)).record(value);
        Ok(())
    }
}
