//! HTTP stats endpoint

use crate::StatsReporter;
use anyhow::Result;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct StatsServer {
    reporter: Arc<StatsReporter>,
    addr: SocketAddr,
}

impl StatsServer {
    pub fn new(reporter: Arc<StatsReporter>, port: u16) -> Self {
        Self {
            reporter,
            addr: SocketAddr::from(([0, 0, 0, 0], port)),
        }
    }

    pub fn with_address(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    /// Serve until the listener fails
    pub async fn start(&self) -> Result<()> {
        let reporter = Arc::clone(&self.reporter);

        let make_svc = make_service_fn(move |_conn| {
            let reporter = Arc::clone(&reporter);
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    let reporter = Arc::clone(&reporter);
                    handle_request(req, reporter)
                }))
            }
        });

        let server = Server::try_bind(&self.addr)?.serve(make_svc);
        info!("Stats server listening on http://{}/stats", server.local_addr());

        if let Err(e) = server.await {
            error!("Stats server error: {}", e);
        }

        Ok(())
    }
}

pub(crate) async fn handle_request(
    req: Request<Body>,
    reporter: Arc<StatsReporter>,
) -> Result<Response<Body>, Infallible> {
    let path = req.uri().path();
    let method = req.method();

    debug!("Stats request: {} {}", method, path);

    if method != Method::GET {
        return Ok(plain(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed"));
    }

    match path {
        "/" | "/stats" => {
            reporter.record_request();
            let stats = reporter.update_broker_stats();
            match serde_json::to_string_pretty(&stats) {
                Ok(body) => {
                    let mut response = Response::new(Body::from(body));
                    response
                        .headers_mut()
                        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                    Ok(response)
                }
                Err(e) => {
                    error!("Failed to serialize stats: {}", e);
                    Ok(plain(StatusCode::INTERNAL_SERVER_ERROR, "Stats unavailable"))
                }
            }
        }
        _ => Ok(plain(StatusCode::NOT_FOUND, "Not found")),
    }
}

fn plain(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
}
