//! Exact-path request routing.

use std::sync::Arc;

use http::Method;

use crate::core::Handler;

/// Result of resolving a request against the route table.
pub enum RouteMatch<'a> {
    Found {
        route: &'a str,
        handler: &'a Arc<dyn Handler>,
    },
    /// Path exists, but not for this method. `allow` lists the methods that do.
    MethodNotAllowed { route: &'a str, allow: String },
    NotFound,
}

struct Route {
    method: Method,
    path: String,
    handler: Arc<dyn Handler>,
}

/// Route table keyed by exact path and method.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `method` and `path`. A later registration
    /// for the same pair replaces the earlier one.
    pub fn route(mut self, method: Method, path: impl Into<String>, handler: impl Handler) -> Self {
        let path = path.into();
        let handler: Arc<dyn Handler> = Arc::new(handler);
        match self
            .routes
            .iter_mut()
            .find(|r| r.method == method && r.path == path)
        {
            Some(existing) => existing.handler = handler,
            None => self.routes.push(Route {
                method,
                path,
                handler,
            }),
        }
        self
    }

    pub fn get(self, path: impl Into<String>, handler: impl Handler) -> Self {
        self.route(Method::GET, path, handler)
    }

    pub fn resolve(&self, method: &Method, path: &str) -> RouteMatch<'_> {
        let mut allowed: Vec<&str> = Vec::new();
        let mut route_path = None;

        for route in self.routes.iter().filter(|r| r.path == path) {
            if route.method == *method {
                return RouteMatch::Found {
                    route: &route.path,
                    handler: &route.handler,
                };
            }
            route_path = Some(route.path.as_str());
            allowed.push(route.method.as_str());
        }

        match route_path {
            Some(route) => RouteMatch::MethodNotAllowed {
                route,
                allow: allowed.join(", "),
            },
            None => RouteMatch::NotFound,
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
