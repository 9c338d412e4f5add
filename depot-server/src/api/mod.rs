//! HTTP routing layer: maps wire requests onto depot engine calls and
//! marshals structured results back.

mod handlers;
mod responses;

use std::convert::Infallible;
use std::sync::Arc;

use hyper::{Method, Request, Response};
use tracing::debug;

use depot_storage::Depot;

use responses::Body;

#[derive(Clone)]
pub struct ApiService {
    depot: Arc<Depot>,
    listen_addr: String,
}

impl ApiService {
    pub fn new(depot: Arc<Depot>, listen_addr: String) -> Self {
        Self { depot, listen_addr }
    }

    pub async fn handle_request(
        &self,
        req: Request<hyper::body::Incoming>,
    ) -> Result<Response<Body>, Infallible> {
        Ok(self.route_request(req).await)
    }

    async fn route_request(&self, req: Request<hyper::body::Incoming>) -> Response<Body> {
        debug!(method = %req.method(), uri = %req.uri(), "request");
        let path = req.uri().path().to_string();
        match (req.method().clone(), path.as_str()) {
            (Method::POST, p) if p.starts_with("/r/upload/") => {
                let dest = decode_remainder(p, "/r/upload");
                handlers::upload(&self.depot, req, dest).await
            }
            (Method::GET, p) if p.starts_with("/r/download/") => {
                let file = decode_remainder(p, "/r/download");
                handlers::download(&self.depot, &req, &file).await
            }
            (Method::GET, p) if p == "/r/info" || p.starts_with("/r/info/") => {
                let file = decode_remainder(p, "/r/info");
                handlers::info(&self.depot, &req, &file).await
            }
            (Method::GET, "/r/clean" | "/r/clean/") => handlers::clean(&self.depot).await,
            (Method::GET, "/r/backup") => handlers::backup(&self.depot),
            (Method::GET, "/r/status") => handlers::status(&self.depot, &self.listen_addr),
            _ => responses::not_found(),
        }
    }
}

/// Percent-decoded path remainder after the route prefix, always
/// starting with `/` (or empty when the route had no remainder).
fn decode_remainder(path: &str, prefix: &str) -> String {
    let rest = path.strip_prefix(prefix).unwrap_or_default();
    urlencoding::decode(rest)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| rest.to_string())
}
