use std::net::{SocketAddr, ToSocketAddrs};

use indexmap::IndexMap;
use tracing::debug;

use super::{StatsdClient, StatsdReporter, UdpClient};
use crate::common::BuildError;
use crate::config::MetricsConfig;

const DEFAULT_REMOTE_ADDRESS: &str = "localhost:8125";

/// Builder for creating a [`StatsdReporter`].
pub struct StatsdBuilder {
    remote_address: Option<SocketAddr>,
    namespace: Option<String>,
    rate: f64,
    server_type: String,
    constant_tags: IndexMap<String, String>,
}

impl StatsdBuilder {
    /// Creates a new [`StatsdBuilder`].
    pub fn new() -> Self {
        Self {
            remote_address: None,
            namespace: None,
            rate: 1.0,
            server_type: String::new(),
            constant_tags: IndexMap::new(),
        }
    }

    /// Creates a builder from the `statsd` section of a [`MetricsConfig`].
    ///
    /// ## Errors
    ///
    /// If the configured host cannot be resolved, an error variant will be returned.
    pub fn from_config(config: &MetricsConfig) -> Result<Self, BuildError> {
        let mut builder = Self::new()
            .with_remote_address(config.statsd.host.as_str())?
            .set_sample_rate(config.statsd.rate)
            .set_server_type(config.server_type.as_str());
        if !config.statsd.prefix.is_empty() {
            builder = builder.set_namespace(config.statsd.prefix.as_str());
        }
        for (key, value) in &config.const_tags {
            builder = builder.add_constant_tag(key.as_str(), value.as_str());
        }
        Ok(builder)
    }

    /// Configures the collector that datagrams are sent to.
    ///
    /// Defaults to `localhost:8125`.
    ///
    /// ## Errors
    ///
    /// If the given endpoint cannot be resolved into a valid `SocketAddr`, an error variant will
    /// be returned describing the error.
    pub fn with_remote_address<T>(mut self, endpoint: T) -> Result<Self, BuildError>
    where
        T: ToSocketAddrs,
    {
        self.remote_address = Some(resolve(endpoint)?);
        Ok(self)
    }

    /// Sets the namespace every metric name is prefixed with.
    ///
    /// A trailing `.` is accepted and ignored.
    #[must_use]
    pub fn set_namespace<P>(mut self, namespace: P) -> Self
    where
        P: Into<String>,
    {
        let namespace = namespace.into();
        self.namespace = Some(namespace.trim_end_matches('.').to_owned());
        self
    }

    /// Sets the sampling rate passed along with every report, clamped to `[0, 1]`.
    ///
    /// Defaults to 1, meaning nothing is sampled away.
    #[must_use]
    pub fn set_sample_rate(mut self, rate: f64) -> Self {
        self.rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Sets the server type sent as the `serverType` tag.
    #[must_use]
    pub fn set_server_type<S>(mut self, server_type: S) -> Self
    where
        S: Into<String>,
    {
        self.server_type = server_type.into();
        self
    }

    /// Adds a constant tag sent with every report.
    ///
    /// If this method is called multiple times, the latest value for a given key will be used.
    #[must_use]
    pub fn add_constant_tag<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.constant_tags.insert(key.into(), value.into());
        self
    }

    /// Builds the reporter, binding a UDP socket to the configured collector.
    ///
    /// ## Errors
    ///
    /// If the default address cannot be resolved or the socket cannot be created, an error
    /// variant will be returned.
    pub fn build(self) -> Result<StatsdReporter, BuildError> {
        let endpoint = match self.remote_address {
            Some(endpoint) => endpoint,
            None => resolve(DEFAULT_REMOTE_ADDRESS)?,
        };
        let client = UdpClient::connect(endpoint, self.namespace.clone())
            .map_err(|e| BuildError::InvalidRemoteAddress(e.to_string()))?;
        debug!(%endpoint, namespace = ?self.namespace, "statsd reporter connected");

        Ok(self.build_with_client(client))
    }

    /// Builds the reporter on top of an existing client.
    ///
    /// The namespace and remote address are the client's concern and are ignored here.
    pub fn build_with_client<C>(self, client: C) -> StatsdReporter
    where
        C: StatsdClient + 'static,
    {
        StatsdReporter::new(Box::new(client), self.rate, &self.server_type, &self.constant_tags)
    }
}

impl Default for StatsdBuilder {
    fn default() -> Self {
        StatsdBuilder::new()
    }
}

fn resolve<T>(endpoint: T) -> Result<SocketAddr, BuildError>
where
    T: ToSocketAddrs,
{
    endpoint
        .to_socket_addrs()
        .map_err(|e| BuildError::InvalidRemoteAddress(e.to_string()))?
        .next() // just use the first address we resolve to
        .ok_or_else(|| {
            BuildError::InvalidRemoteAddress(
                "to_socket_addrs returned an empty iterator".to_string(),
            )
        })
}

#[cfg(test)]
mod tests {
    use std::net::UdpSocket;
    use std::time::Duration;

    use super::StatsdBuilder;
    use crate::common::BuildError;
    use crate::config::MetricsConfig;
    use crate::reporter::Reporter;
    use crate::test_util::labels;

    #[test]
    fn rejects_unresolvable_addresses() {
        let result = StatsdBuilder::new().with_remote_address("not an address");
        assert!(matches!(result, Err(BuildError::InvalidRemoteAddress(_))));
    }

    #[test]
    fn sends_namespaced_datagrams() {
        let collector = UdpSocket::bind("127.0.0.1:0").unwrap();
        collector.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

        let reporter = StatsdBuilder::new()
            .with_remote_address(collector.local_addr().unwrap())
            .unwrap()
            .set_namespace("game.")
            .set_server_type("connector")
            .add_constant_tag("region", "eu")
            .build()
            .unwrap();

        reporter
            .report_gauge("worker_queue_size", &labels(&[("queue", "mail")]), 7.0)
            .unwrap();

        let mut buf = [0u8; 512];
        let n = collector.recv(&mut buf).unwrap();
        assert_eq!(
            std::str::from_utf8(&buf[..n]).unwrap(),
            "game.worker_queue_size:7|g|#serverType:connector,region:eu,queue:mail"
        );
    }

    #[test]
    fn from_config() {
        let mut config = MetricsConfig::default();
        config.server_type = "room".to_owned();
        config.statsd.host = "127.0.0.1:8125".to_owned();
        config.statsd.rate = 3.0;
        config.const_tags.insert("region".to_owned(), "eu".to_owned());

        let builder = StatsdBuilder::from_config(&config).unwrap();
        assert_eq!(builder.rate, 1.0);
        assert_eq!(builder.namespace.as_deref(), Some("game"));

        let reporter = builder.build().unwrap();
        assert_eq!(reporter.default_tags(), ["serverType:room", "region:eu"]);
    }
}
