use std::sync::Arc;

use tracing::debug;

use crate::common::BuildError;
use crate::config::MetricsConfig;
use crate::prometheus::PrometheusBuilder;
use crate::reporter::Reporter;
use crate::statsd::StatsdBuilder;

/// Builds every reporter enabled in `config`.
///
/// The pull reporter comes first and is installed process-wide through
/// [`PrometheusBuilder::install`]; the push reporter follows. An empty list is returned when
/// neither is enabled.
///
/// ## Errors
///
/// Any build error aborts the whole sequence and is returned to the caller.
pub fn install_reporters(config: &MetricsConfig) -> Result<Vec<Arc<dyn Reporter>>, BuildError> {
    let mut reporters: Vec<Arc<dyn Reporter>> = Vec::new();

    if config.prometheus.enabled {
        let reporter = PrometheusBuilder::from_config(config).install()?;
        debug!(address = ?reporter.listen_address(), "prometheus reporter installed");
        reporters.push(reporter);
    }

    if config.statsd.enabled {
        let reporter = StatsdBuilder::from_config(config)?.build()?;
        debug!(host = %config.statsd.host, "statsd reporter created");
        reporters.push(Arc::new(reporter));
    }

    Ok(reporters)
}
