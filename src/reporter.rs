use indexmap::IndexMap;

use crate::common::ReportError;

/// Label set attached to a single report, keyed by label name.
///
/// Insertion order is preserved so that backends rendering tags as a list emit them in a stable
/// order, but equality between two label sets does not depend on order.
pub type Labels = IndexMap<String, String>;

/// A backend capable of materializing metric reports.
///
/// Call sites only ever hold `Arc<dyn Reporter>`, so every backend must report an unknown metric
/// name as [`ReportError::MetricNotKnown`] rather than panicking, and an unsupported operation as
/// [`ReportError::NotImplemented`] rather than silently dropping the observation.
pub trait Reporter: Send + Sync {
    /// Increments the counter `metric` by `delta`.
    fn report_count(&self, metric: &str, labels: &Labels, delta: f64) -> Result<(), ReportError>;

    /// Sets the gauge `metric` to `value`.
    fn report_gauge(&self, metric: &str, labels: &Labels, value: f64) -> Result<(), ReportError>;

    /// Feeds one observation into the summary `metric`.
    fn report_summary(&self, metric: &str, labels: &Labels, value: f64)
        -> Result<(), ReportError>;

    /// Feeds one observation into the histogram `metric`.
    fn report_histogram(
        &self,
        metric: &str,
        labels: &Labels,
        value: f64,
    ) -> Result<(), ReportError>;
}

/// Fills in every key of `defaults` that `labels` does not already carry.
///
/// Values supplied by the caller always take precedence over the defaults.
pub fn ensure_labels(mut labels: Labels, defaults: &Labels) -> Labels {
    for (key, default) in defaults {
        if !labels.contains_key(key) {
            labels.insert(key.clone(), default.clone());
        }
    }
    labels
}
