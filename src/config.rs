//! Typed configuration consumed by the builders.
//!
//! The embedding application owns file loading; every struct here derives `Deserialize` with
//! `#[serde(default)]` so that partial documents fall back to the defaults below.

use std::net::SocketAddr;

use indexmap::IndexMap;
use serde::Deserialize;

/// Default namespace for pull series and statsd metric names.
pub const DEFAULT_NAMESPACE: &str = "game";

/// Top-level metrics configuration.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Type of the server reporting, attached as `serverType` everywhere.
    pub server_type: String,
    /// Identifier of the game (application), attached as the `game` constant label.
    pub game: String,
    /// Namespace prefixed to every pull series name.
    pub namespace: String,
    /// Constant tags attached to every series and every datagram.
    pub const_tags: IndexMap<String, String>,
    /// Label keys added to every pull series schema, with the value used when the caller
    /// does not supply one.
    pub additional_labels: IndexMap<String, String>,
    /// Pull endpoint settings.
    pub prometheus: PrometheusConfig,
    /// Push client settings.
    pub statsd: StatsdConfig,
    /// Operator-defined series registered next to the built-in ones.
    pub custom: CustomMetricsSpec,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            server_type: String::new(),
            game: String::new(),
            namespace: DEFAULT_NAMESPACE.to_owned(),
            const_tags: IndexMap::new(),
            additional_labels: IndexMap::new(),
            prometheus: PrometheusConfig::default(),
            statsd: StatsdConfig::default(),
            custom: CustomMetricsSpec::default(),
        }
    }
}

/// Settings of the HTTP pull endpoint.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct PrometheusConfig {
    pub enabled: bool,
    pub listen_address: SocketAddr,
    pub path: String,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_address: SocketAddr::from(([0, 0, 0, 0], 9090)),
            path: "/metrics".to_owned(),
        }
    }
}

/// Settings of the UDP push client.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct StatsdConfig {
    pub enabled: bool,
    pub host: String,
    pub prefix: String,
    pub rate: f64,
}

impl Default for StatsdConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "localhost:8125".to_owned(),
            prefix: DEFAULT_NAMESPACE.to_owned(),
            rate: 1.0,
        }
    }
}

/// Operator-defined catalog of extra series.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct CustomMetricsSpec {
    pub summaries: Vec<SummarySpec>,
    pub histograms: Vec<HistogramSpec>,
    pub gauges: Vec<GaugeSpec>,
    pub counters: Vec<CounterSpec>,
}

/// A summary declaration.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SummarySpec {
    pub subsystem: String,
    pub name: String,
    pub help: String,
    /// Quantiles exposed for the summary.
    #[serde(default = "default_objectives")]
    pub objectives: Vec<f64>,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// A histogram declaration.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct HistogramSpec {
    pub subsystem: String,
    pub name: String,
    pub help: String,
    /// Upper bounds of the histogram buckets.
    pub buckets: Vec<f64>,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// A gauge declaration.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct GaugeSpec {
    pub subsystem: String,
    pub name: String,
    pub help: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// A counter declaration.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CounterSpec {
    pub subsystem: String,
    pub name: String,
    pub help: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

pub(crate) fn default_objectives() -> Vec<f64> {
    vec![0.7, 0.95, 0.99]
}
