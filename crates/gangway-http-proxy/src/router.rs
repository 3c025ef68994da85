//! Ordered route registration and the composed pipeline handler.

use crate::error::ProxyError;
use crate::metrics;
use crate::pipeline::{ProxyBody, StageOutcome};
use crate::proxy::client::HttpClient;
use crate::route::{HttpMethod, Route, RouteOptions, RouteOutcome, ALL_METHODS};
use hyper::Request;
use std::sync::Arc;

/// An ordered collection of [`Route`]s exposed as one pipeline stage.
///
/// Registration order is preserved and determines match precedence: the
/// first route to handle a request wins. Mutable only through registration;
/// building the handler finalizes the set.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route for an explicit method set, appending it to the
    /// match order.
    pub fn register(
        mut self,
        methods: Vec<HttpMethod>,
        local_path: &str,
        target: &str,
        options: RouteOptions,
    ) -> Result<Self, ProxyError> {
        self.routes.push(Route::new(methods, local_path, target, options)?);
        Ok(self)
    }

    /// Register a DELETE route.
    pub fn delete(
        self,
        local_path: &str,
        target: &str,
        options: RouteOptions,
    ) -> Result<Self, ProxyError> {
        self.register(vec![HttpMethod::Delete], local_path, target, options)
    }

    /// Register a GET route.
    pub fn get(
        self,
        local_path: &str,
        target: &str,
        options: RouteOptions,
    ) -> Result<Self, ProxyError> {
        self.register(vec![HttpMethod::Get], local_path, target, options)
    }

    /// Register a HEAD route.
    pub fn head(
        self,
        local_path: &str,
        target: &str,
        options: RouteOptions,
    ) -> Result<Self, ProxyError> {
        self.register(vec![HttpMethod::Head], local_path, target, options)
    }

    /// Register an OPTIONS route.
    pub fn options(
        self,
        local_path: &str,
        target: &str,
        options: RouteOptions,
    ) -> Result<Self, ProxyError> {
        self.register(vec![HttpMethod::Options], local_path, target, options)
    }

    /// Register a PATCH route.
    pub fn patch(
        self,
        local_path: &str,
        target: &str,
        options: RouteOptions,
    ) -> Result<Self, ProxyError> {
        self.register(vec![HttpMethod::Patch], local_path, target, options)
    }

    /// Register a POST route.
    pub fn post(
        self,
        local_path: &str,
        target: &str,
        options: RouteOptions,
    ) -> Result<Self, ProxyError> {
        self.register(vec![HttpMethod::Post], local_path, target, options)
    }

    /// Register a PUT route.
    pub fn put(
        self,
        local_path: &str,
        target: &str,
        options: RouteOptions,
    ) -> Result<Self, ProxyError> {
        self.register(vec![HttpMethod::Put], local_path, target, options)
    }

    /// Register a route accepting every method in [`ALL_METHODS`].
    pub fn all(
        self,
        local_path: &str,
        target: &str,
        options: RouteOptions,
    ) -> Result<Self, ProxyError> {
        self.register(ALL_METHODS.to_vec(), local_path, target, options)
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Finalize the route set into the pipeline handler.
    ///
    /// Fails with [`ProxyError::NoRoutesConfigured`] when nothing was
    /// registered; this is a configuration-time failure, not a per-request
    /// one.
    pub fn build_handler(self, client: HttpClient) -> Result<RouterHandler, ProxyError> {
        if self.routes.is_empty() {
            return Err(ProxyError::NoRoutesConfigured);
        }
        Ok(RouterHandler {
            routes: Arc::from(self.routes),
            client,
        })
    }
}

/// The composed pipeline stage produced by [`Router::build_handler`].
///
/// Read-only after construction; clones share the route table and the
/// pooled client, so one handler serves all concurrent request tasks.
#[derive(Clone)]
pub struct RouterHandler {
    routes: Arc<[Route]>,
    client: HttpClient,
}

impl RouterHandler {
    /// Try each route in registration order.
    ///
    /// The first `Handled` result wins. A route that declines hands the
    /// request to the next route; an upstream 404 skips the rest of the
    /// table and continues to the next pipeline stage.
    pub async fn handle(&self, req: Request<ProxyBody>) -> Result<StageOutcome, ProxyError> {
        let mut req = req;
        for route in self.routes.iter() {
            match route.handle(&self.client, req).await? {
                RouteOutcome::Handled(response) => return Ok(StageOutcome::Responded(response)),
                RouteOutcome::NotMatched(request) => req = request,
                RouteOutcome::Fallthrough(request) => {
                    metrics::record_fallthrough("upstream_404");
                    return Ok(StageOutcome::Continue(request));
                }
            }
        }
        metrics::record_fallthrough("no_match");
        Ok(StageOutcome::Continue(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_router_fails_to_build() {
        let client = crate::proxy::client::create_http_client(&Default::default());
        let result = Router::new().build_handler(client);
        assert!(matches!(result, Err(ProxyError::NoRoutesConfigured)));
    }

    #[test]
    fn test_registration_order_is_preserved() {
        let router = Router::new()
            .get("/api", "http://a.test/", RouteOptions::default())
            .unwrap()
            .post("/api", "http://b.test/", RouteOptions::default())
            .unwrap()
            .all("/fallback", "http://c.test/", RouteOptions::default())
            .unwrap();

        let paths: Vec<&str> = router.routes().iter().map(|r| r.local_path()).collect();
        assert_eq!(paths, vec!["/api", "/api", "/fallback"]);
        assert_eq!(router.routes()[0].methods(), &[HttpMethod::Get]);
        assert_eq!(router.routes()[1].methods(), &[HttpMethod::Post]);
        assert_eq!(router.routes()[2].methods(), &ALL_METHODS);
    }

    #[test]
    fn test_invalid_target_fails_registration() {
        let result = Router::new().get("/api", "no scheme", RouteOptions::default());
        assert!(matches!(result, Err(ProxyError::InvalidTarget { .. })));
    }
}
