use std::convert::Infallible;
use std::io;
use std::sync::Arc;

use http_body_util::Full;
use hyper::{
    body::{self, Bytes, Incoming},
    header::{HeaderValue, CONTENT_TYPE},
    server::conn::http1::Builder as HyperHttpBuilder,
    service::service_fn,
    Request, Response, StatusCode,
};
use hyper_util::rt::TokioIo;
use prometheus::TEXT_FORMAT;
use tokio::net::{TcpListener, TcpStream};
use tracing::warn;

use super::{ExporterFuture, PrometheusReporter};

struct HttpListeningExporter {
    inner: Arc<Inner>,
}

struct Inner {
    reporter: Arc<PrometheusReporter>,
    path: String,
}

impl HttpListeningExporter {
    async fn serve(&self, listener: std::net::TcpListener) -> io::Result<()> {
        let listener = TcpListener::from_std(listener)?;

        loop {
            let stream = match listener.accept().await {
                Ok((stream, _)) => stream,
                Err(e) => {
                    warn!("Error accepting connection. Ignoring request. Error: {:?}", e);
                    continue;
                }
            };

            self.process_stream(stream);
        }
    }

    fn process_stream(&self, stream: TcpStream) {
        let inner = Arc::clone(&self.inner);
        let service = service_fn(move |req: Request<body::Incoming>| {
            let inner = Arc::clone(&inner);
            async move { Self::handle_http_request(&inner, &req) }
        });

        tokio::task::spawn(async move {
            if let Err(err) =
                HyperHttpBuilder::new().serve_connection(TokioIo::new(stream), service).await
            {
                warn!("Error serving connection. Error: {:?}", err);
            };
        });
    }

    fn handle_http_request(
        inner: &Inner,
        req: &Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, Infallible> {
        if req.uri().path() != inner.path {
            let mut response = Response::new(Full::<Bytes>::default());
            *response.status_mut() = StatusCode::NOT_FOUND;
            return Ok(response);
        }

        let body = match inner.reporter.render() {
            Ok(body) => body,
            Err(e) => {
                warn!("Error encoding metrics. Error: {:?}", e);
                let mut response = Response::new(Full::<Bytes>::default());
                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                return Ok(response);
            }
        };

        let mut response = Response::new(Full::from(body));
        response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_FORMAT));
        Ok(response)
    }
}

/// Creates an [`ExporterFuture`] serving `reporter` on `path` from an already bound listener.
pub(crate) fn new_http_listener(
    reporter: Arc<PrometheusReporter>,
    listener: std::net::TcpListener,
    path: String,
) -> ExporterFuture {
    let exporter = HttpListeningExporter { inner: Arc::new(Inner { reporter, path }) };

    Box::pin(async move { exporter.serve(listener).await })
}
