use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

use tracing::trace;

use crate::formatting::write_metric_line;

/// Minimal statsd client used by [`StatsdReporter`](super::StatsdReporter).
///
/// Each call results in at most one datagram. Implementations decide on their own whether to
/// sample the call away according to `rate`.
pub trait StatsdClient: Send + Sync {
    /// Sends a counter increment.
    fn count(&self, name: &str, value: i64, tags: &[String], rate: f64) -> io::Result<()>;

    /// Sends an absolute gauge value.
    fn gauge(&self, name: &str, value: f64, tags: &[String], rate: f64) -> io::Result<()>;

    /// Sends a timing observation.
    fn timing(&self, name: &str, value: f64, tags: &[String], rate: f64) -> io::Result<()>;
}

/// A fire-and-forget UDP statsd client.
///
/// Metric names are prefixed with the namespace, if one is configured.
pub struct UdpClient {
    socket: UdpSocket,
    namespace: Option<String>,
}

impl UdpClient {
    /// Binds an ephemeral local socket and connects it to `endpoint`.
    pub fn connect(endpoint: SocketAddr, namespace: Option<String>) -> io::Result<Self> {
        let socket = match endpoint {
            SocketAddr::V4(_) => UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?,
            SocketAddr::V6(_) => UdpSocket::bind("[::]:0")?,
        };
        socket.connect(endpoint)?;
        socket.set_nonblocking(true)?;

        Ok(Self { socket, namespace })
    }

    fn send<T>(
        &self,
        name: &str,
        mtype: &str,
        value: T,
        tags: &[String],
        rate: f64,
    ) -> io::Result<()>
    where
        T: std::fmt::Display,
    {
        if rate < 1.0 && rand::random::<f64>() >= rate {
            trace!(metric = name, rate, "sampled out");
            return Ok(());
        }

        let mut buffer = String::new();
        write_metric_line(&mut buffer, self.namespace.as_deref(), name, mtype, value, rate, tags);

        let sent = self.socket.send(buffer.as_bytes())?;
        if sent != buffer.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("sent {} of {} bytes", sent, buffer.len()),
            ));
        }
        Ok(())
    }
}

impl StatsdClient for UdpClient {
    fn count(&self, name: &str, value: i64, tags: &[String], rate: f64) -> io::Result<()> {
        self.send(name, "c", value, tags, rate)
    }

    fn gauge(&self, name: &str, value: f64, tags: &[String], rate: f64) -> io::Result<()> {
        self.send(name, "g", value, tags, rate)
    }

    fn timing(&self, name: &str, value: f64, tags: &[String], rate: f64) -> io::Result<()> {
        self.send(name, "ms", value, tags, rate)
    }
}
