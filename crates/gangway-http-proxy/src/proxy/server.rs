//! ProxyServer struct and main run loop.
//!
//! Thin serving glue around the routing layer: it accepts connections,
//! boxes inbound bodies into the pipeline body type, drives the router
//! stage, and owns the two terminal concerns the routing layer leaves to
//! the pipeline — not-found presentation when every stage declines, and the
//! 502 translation of upstream transport failures.

use super::client::create_http_client;
use super::forwarding::error_response;
use crate::config::Config;
use crate::metrics;
use crate::pipeline::{ProxyBody, ResponseExt, StageOutcome};
use crate::router::RouterHandler;
use http_body_util::combinators::BoxBody;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// The main proxy server struct.
pub struct ProxyServer {
    config: Arc<Config>,
    handler: RouterHandler,
}

impl ProxyServer {
    /// Create a new ProxyServer from configuration.
    ///
    /// Route compilation happens here, so malformed targets and empty route
    /// tables fail startup instead of the first request.
    pub fn new(config: Config) -> Result<Self, anyhow::Error> {
        let client = create_http_client(&config.connection_pool);
        let handler = config.build_router()?.build_handler(client)?;
        Ok(Self {
            config: Arc::new(config),
            handler,
        })
    }

    /// Run the proxy server, accepting connections and handling requests.
    pub async fn run(self) -> Result<(), anyhow::Error> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.listen.port));
        let listener = TcpListener::bind(addr).await?;

        info!("Listening on http://{}", addr);
        info!("Loaded {} proxy routes", self.config.routes.len());

        let metrics_port = self.config.metrics.port;
        tokio::spawn(async move {
            if let Err(err) = serve_metrics(metrics_port).await {
                error!("Metrics listener failed: {}", err);
            }
        });

        let server = Arc::new(self);

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let server = Arc::clone(&server);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let server = Arc::clone(&server);
                    async move { server.handle_request_internal(req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving connection from {}: {}", remote_addr, err);
                }
            });
        }
    }

    /// Drive one request through the pipeline: router stage first, then the
    /// terminal not-found stage.
    async fn handle_request_internal(
        &self,
        req: Request<hyper::body::Incoming>,
    ) -> Result<Response<ProxyBody>, Infallible> {
        let start = std::time::Instant::now();
        let method = req.method().clone();

        let req = req.map(BoxBody::new);

        let response = match self.handler.handle(req).await {
            Ok(StageOutcome::Responded(response)) => {
                metrics::record_upstream_duration(
                    method.as_str(),
                    start.elapsed().as_secs_f64() * 1000.0,
                );
                response
            }
            // Terminal stage: nothing downstream owns the request.
            Ok(StageOutcome::Continue(_)) => error_response(404, "Not Found").into_boxed(),
            Err(err) => {
                error!("Failed to forward request: {}", err);
                error_response(502, "Bad Gateway").into_boxed()
            }
        };

        metrics::record_request(method.as_str(), response.status().as_u16());
        Ok(response)
    }
}

/// Serve the Prometheus registry on the metrics port.
async fn serve_metrics(port: u16) -> Result<(), anyhow::Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Metrics listening on http://{}/metrics", addr);

    loop {
        let (stream, _) = listener.accept().await?;
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(|_req| async {
                Ok::<_, Infallible>(
                    Response::builder()
                        .header("content-type", "text/plain; version=0.0.4")
                        .body(Full::new(Bytes::from(metrics::render())))
                        .unwrap(),
                )
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                error!("Error serving metrics connection: {}", err);
            }
        });
    }
}
