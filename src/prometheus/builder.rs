use std::future::Future;
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::pin::Pin;
use std::sync::Arc;
use std::thread;

#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};

use once_cell::sync::OnceCell;
use tokio::runtime;
use tracing::{debug, error};

use super::http_listener::new_http_listener;
use super::PrometheusReporter;
use crate::common::BuildError;
use crate::config::{CustomMetricsSpec, MetricsConfig, DEFAULT_NAMESPACE};
use crate::reporter::Labels;

/// Future serving the HTTP listener until an unrecoverable I/O error.
pub type ExporterFuture = Pin<Box<dyn Future<Output = io::Result<()>> + Send + 'static>>;

static INSTALLED: OnceCell<Arc<PrometheusReporter>> = OnceCell::new();

#[cfg(test)]
static INSTALLATIONS: AtomicUsize = AtomicUsize::new(0);

/// Builder for creating and installing a [`PrometheusReporter`] and its HTTP listener.
pub struct PrometheusBuilder {
    namespace: String,
    server_type: String,
    game: String,
    constant_labels: Labels,
    additional_labels: Labels,
    custom: CustomMetricsSpec,
    listen_address: SocketAddr,
    path: String,
}

impl PrometheusBuilder {
    /// Creates a new [`PrometheusBuilder`].
    pub fn new() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_owned(),
            server_type: String::new(),
            game: String::new(),
            constant_labels: Labels::new(),
            additional_labels: Labels::new(),
            custom: CustomMetricsSpec::default(),
            listen_address: SocketAddr::from(([0, 0, 0, 0], 9090)),
            path: "/metrics".to_owned(),
        }
    }

    /// Creates a builder from a [`MetricsConfig`].
    pub fn from_config(config: &MetricsConfig) -> Self {
        let mut builder = Self::new()
            .set_namespace(config.namespace.as_str())
            .set_server_type(config.server_type.as_str())
            .set_game(config.game.as_str())
            .with_custom_metrics(config.custom.clone())
            .with_http_listener(config.prometheus.listen_address)
            .set_path(config.prometheus.path.as_str());
        for (key, value) in &config.const_tags {
            builder = builder.add_constant_label(key.as_str(), value.as_str());
        }
        for (key, default) in &config.additional_labels {
            builder = builder.add_additional_label(key.as_str(), default.as_str());
        }
        builder
    }

    /// Sets the namespace every series name starts with.
    ///
    /// Defaults to `game`.
    #[must_use]
    pub fn set_namespace<N: Into<String>>(mut self, namespace: N) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the server type exposed as the `serverType` constant label.
    #[must_use]
    pub fn set_server_type<S: Into<String>>(mut self, server_type: S) -> Self {
        self.server_type = server_type.into();
        self
    }

    /// Sets the application identifier exposed as the `game` constant label.
    #[must_use]
    pub fn set_game<G: Into<String>>(mut self, game: G) -> Self {
        self.game = game.into();
        self
    }

    /// Adds a label attached to every series.
    #[must_use]
    pub fn add_constant_label<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.constant_labels.insert(key.into(), value.into());
        self
    }

    /// Adds a label key to the schema of every series.
    ///
    /// Reports that omit the key are recorded with `default`.
    #[must_use]
    pub fn add_additional_label<K, V>(mut self, key: K, default: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.additional_labels.insert(key.into(), default.into());
        self
    }

    /// Sets the operator-defined series, registered before the built-in ones.
    #[must_use]
    pub fn with_custom_metrics(mut self, custom: CustomMetricsSpec) -> Self {
        self.custom = custom;
        self
    }

    /// Sets the address the HTTP listener binds to.
    ///
    /// Defaults to `0.0.0.0:9090`.
    #[must_use]
    pub fn with_http_listener(mut self, addr: impl Into<SocketAddr>) -> Self {
        self.listen_address = addr.into();
        self
    }

    /// Sets the path the exposition is served on. Every other path answers `404`.
    ///
    /// Defaults to `/metrics`.
    #[must_use]
    pub fn set_path<P: Into<String>>(mut self, path: P) -> Self {
        self.path = path.into();
        self
    }

    /// Builds the reporter without any HTTP listener.
    ///
    /// ## Errors
    ///
    /// If two series share a name, a constant label collides with a series label, a histogram
    /// declares no bucket, or the registry refuses a series, an error variant will be returned.
    pub fn build_reporter(self) -> Result<PrometheusReporter, BuildError> {
        let mut const_labels = self.constant_labels;
        const_labels.insert("game".to_owned(), self.game);
        const_labels.insert("serverType".to_owned(), self.server_type);

        PrometheusReporter::new(
            &self.namespace,
            &const_labels,
            self.additional_labels,
            &self.custom,
        )
    }

    /// Builds the reporter and the future running its HTTP listener.
    ///
    /// The listener socket is bound before returning, so the reporter already knows its
    /// [`listen_address`][PrometheusReporter::listen_address]. The future must be polled
    /// from within a Tokio runtime.
    ///
    /// ## Errors
    ///
    /// If the reporter cannot be built or the listen address cannot be bound, an error variant
    /// will be returned.
    pub fn build(self) -> Result<(Arc<PrometheusReporter>, ExporterFuture), BuildError> {
        let listener = TcpListener::bind(self.listen_address)
            .and_then(|listener| {
                listener.set_nonblocking(true)?;
                Ok(listener)
            })
            .map_err(|e| BuildError::FailedToCreateHTTPListener(e.to_string()))?;
        let local_address = listener
            .local_addr()
            .map_err(|e| BuildError::FailedToCreateHTTPListener(e.to_string()))?;

        let path = self.path.clone();
        let mut reporter = self.build_reporter()?;
        reporter.set_listen_address(local_address);
        let reporter = Arc::new(reporter);

        let exporter = new_http_listener(Arc::clone(&reporter), listener, path);
        debug!(address = %local_address, "prometheus listener bound");

        Ok((reporter, exporter))
    }

    /// Builds the reporter and spawns its HTTP listener, at most once per process.
    ///
    /// The first call runs the whole registration sequence; every later or concurrent call
    /// returns the reporter installed by the first one and ignores its own settings.
    ///
    /// When called from within a Tokio runtime, the listener is spawned directly into the
    /// runtime. Otherwise, a new single-threaded Tokio runtime is created on a background thread,
    /// and the listener is spawned there.
    ///
    /// ## Errors
    ///
    /// If building the reporter or spawning the listener fails, an error variant will be
    /// returned and a later call may try again.
    pub fn install(self) -> Result<Arc<PrometheusReporter>, BuildError> {
        INSTALLED
            .get_or_try_init(|| {
                #[cfg(test)]
                INSTALLATIONS.fetch_add(1, Ordering::SeqCst);
                self.spawn()
            })
            .map(Arc::clone)
    }

    fn spawn(self) -> Result<Arc<PrometheusReporter>, BuildError> {
        if let Ok(handle) = runtime::Handle::try_current() {
            let (reporter, exporter) = self.build()?;
            handle.spawn(async move {
                if let Err(e) = exporter.await {
                    error!(error = %e, "prometheus listener stopped");
                }
            });
            return Ok(reporter);
        }

        let runtime = runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| BuildError::FailedToCreateRuntime(e.to_string()))?;
        let (reporter, exporter) = self.build()?;

        thread::Builder::new()
            .name("metrics-reporter-prometheus-http".to_owned())
            .spawn(move || {
                if let Err(e) = runtime.block_on(exporter) {
                    error!(error = %e, "prometheus listener stopped");
                }
            })
            .map_err(|e| BuildError::FailedToCreateRuntime(e.to_string()))?;

        Ok(reporter)
    }
}

impl Default for PrometheusBuilder {
    fn default() -> Self {
        PrometheusBuilder::new()
    }
}
