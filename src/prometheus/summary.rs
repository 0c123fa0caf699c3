//! Labelled summaries for the Prometheus registry.
//!
//! The registry only ships counters, gauges and histograms, so summaries are a custom
//! [`Collector`] whose quantiles come from one DDSketch per label-value tuple.

use std::sync::Arc;

use indexmap::IndexMap;
use metrics_util::storage::Summary as Sketch;
use metrics_util::Quantile;
use parking_lot::{Mutex, RwLock};
use prometheus::core::{Collector, Desc};
use prometheus::proto::{self, LabelPair, MetricFamily, MetricType};

/// One labelled summary.
pub(crate) struct Summary(Mutex<SummaryState>);

struct SummaryState {
    sketch: Sketch,
    sum: f64,
    count: u64,
}

impl Summary {
    fn new() -> Self {
        Self(Mutex::new(SummaryState { sketch: Sketch::with_defaults(), sum: 0.0, count: 0 }))
    }

    pub(crate) fn observe(&self, value: f64) {
        let mut state = self.0.lock();
        state.sketch.add(value);
        state.sum += value;
        state.count += 1;
    }

    fn proto(&self, quantiles: &[Quantile]) -> proto::Summary {
        let state = self.0.lock();
        let quantiles = quantiles
            .iter()
            .map(|quantile| {
                let mut q = proto::Quantile::default();
                q.set_quantile(quantile.value());
                q.set_value(state.sketch.quantile(quantile.value()).unwrap_or(f64::NAN));
                q
            })
            .collect();

        let mut summary = proto::Summary::default();
        summary.set_sample_count(state.count);
        summary.set_sample_sum(state.sum);
        summary.set_quantile(quantiles);
        summary
    }
}

struct SummaryVecCore {
    desc: Desc,
    quantiles: Vec<Quantile>,
    children: RwLock<IndexMap<Vec<String>, Arc<Summary>>>,
}

/// A family of summaries sharing a name and a label-key schema.
///
/// Cloning is cheap and every clone shares the same series, so one clone can be handed to the
/// registry while the reporter keeps another.
#[derive(Clone)]
pub(crate) struct SummaryVec(Arc<SummaryVecCore>);

impl SummaryVec {
    pub(crate) fn new(desc: Desc, quantiles: Vec<Quantile>) -> Self {
        Self(Arc::new(SummaryVecCore { desc, quantiles, children: RwLock::new(IndexMap::new()) }))
    }

    /// Returns the summary for `values`, given in the order of the variable labels.
    pub(crate) fn get_metric_with_label_values(
        &self,
        values: &[String],
    ) -> prometheus::Result<Arc<Summary>> {
        let expect = self.0.desc.variable_labels.len();
        if values.len() != expect {
            return Err(prometheus::Error::InconsistentCardinality { expect, got: values.len() });
        }

        if let Some(summary) = self.0.children.read().get(values) {
            return Ok(Arc::clone(summary));
        }

        let mut children = self.0.children.write();
        let summary = children
            .entry(values.to_vec())
            .or_insert_with(|| Arc::new(Summary::new()));
        Ok(Arc::clone(summary))
    }

    fn label_pairs(&self, values: &[String]) -> Vec<LabelPair> {
        let desc = &self.0.desc;
        let mut pairs = desc.const_label_pairs.clone();
        pairs.extend(desc.variable_labels.iter().zip(values).map(|(name, value)| {
            let mut pair = LabelPair::default();
            pair.set_name(name.clone());
            pair.set_value(value.clone());
            pair
        }));
        pairs.sort();
        pairs
    }
}

impl Collector for SummaryVec {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.0.desc]
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let mut family = MetricFamily::default();
        family.set_name(self.0.desc.fq_name.clone());
        family.set_help(self.0.desc.help.clone());
        family.set_field_type(MetricType::SUMMARY);

        for (values, summary) in self.0.children.read().iter() {
            let mut metric = proto::Metric::from_label(self.label_pairs(values));
            metric.set_summary(summary.proto(&self.0.quantiles));
            family.mut_metric().push(metric);
        }

        vec![family]
    }
}
