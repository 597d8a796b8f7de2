//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled routes in declaration order
//! - Look up the first route matching a request path
//! - Apply the route's rewrite rule
//! - Fall back to the discovery locator when enabled
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan in declaration order, first match wins
//! - Explicit `None` rather than silent default

use crate::config::schema::RouteConfig;
use crate::routing::matcher::{split_path, PathPattern};
use crate::routing::rewrite::PathRewrite;

/// A compiled route.
#[derive(Debug, Clone)]
pub struct Route {
    pub id: String,
    pub pattern: PathPattern,
    pub service: String,
    pub rewrite: Option<PathRewrite>,
    pub policy: Option<String>,
}

/// Result of matching a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    /// Route id, or `locator` for discovery-locator matches.
    pub route_id: String,
    pub service: String,
    /// Path to forward upstream.
    pub forward_path: String,
    /// Set when the forward path differs from the request path.
    pub rewritten: bool,
    pub policy: Option<String>,
}

/// Ordered route table.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
    discovery_locator: bool,
}

impl Router {
    /// Compile routes from configuration. Invalid patterns are skipped with a warning.
    pub fn from_config(configs: Vec<RouteConfig>, discovery_locator: bool) -> Self {
        let mut routes = Vec::with_capacity(configs.len());
        for config in configs {
            match PathPattern::parse(&config.path) {
                Ok(pattern) => routes.push(Route {
                    id: config.id,
                    pattern,
                    service: config.service.to_lowercase(),
                    rewrite: config.rewrite.as_ref().map(PathRewrite::from),
                    policy: config.policy,
                }),
                Err(e) => tracing::warn!(route = %config.id, error = %e, "Skipping invalid route"),
            }
        }

        tracing::info!(
            routes = routes.len(),
            discovery_locator,
            "Route table compiled"
        );

        Self {
            routes,
            discovery_locator,
        }
    }

    /// Find the route for `path`.
    pub fn match_path(&self, path: &str) -> Option<RouteMatch> {
        if let Some(route) = self.routes.iter().find(|r| r.pattern.matches(path)) {
            let forward_path = match &route.rewrite {
                Some(rewrite) => rewrite.apply(path),
                None => path.to_string(),
            };
            return Some(RouteMatch {
                route_id: route.id.clone(),
                service: route.service.clone(),
                rewritten: forward_path != path,
                forward_path,
                policy: route.policy.clone(),
            });
        }

        if self.discovery_locator {
            let service = split_path(path).next()?.to_lowercase();
            let forward_path = PathRewrite::StripPrefix(1).apply(path);
            return Some(RouteMatch {
                route_id: "locator".to_string(),
                service,
                forward_path,
                rewritten: true,
                policy: None,
            });
        }

        None
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::RewriteConfig;

    fn route(id: &str, path: &str, service: &str, rewrite: Option<RewriteConfig>) -> RouteConfig {
        RouteConfig {
            id: id.into(),
            path: path.into(),
            service: service.into(),
            rewrite,
            policy: None,
        }
    }

    #[test]
    fn test_first_match_wins() {
        let router = Router::from_config(
            vec![
                route("specific", "/exchange/from/**", "exchange-v2", None),
                route("general", "/exchange/**", "exchange", None),
            ],
            false,
        );

        let m = router.match_path("/exchange/from/USD/to/INR").unwrap();
        assert_eq!(m.route_id, "specific");
        assert_eq!(m.service, "exchange-v2");
        assert!(!m.rewritten);

        let m = router.match_path("/exchange/health").unwrap();
        assert_eq!(m.route_id, "general");
    }

    #[test]
    fn test_rewrite_applied() {
        let router = Router::from_config(
            vec![route(
                "conversion",
                "/conversion/**",
                "Conversion",
                Some(RewriteConfig::StripPrefix(1)),
            )],
            false,
        );
        let m = router.match_path("/conversion/from/USD/to/INR").unwrap();
        assert_eq!(m.service, "conversion");
        assert_eq!(m.forward_path, "/from/USD/to/INR");
        assert!(m.rewritten);
    }

    #[test]
    fn test_no_match() {
        let router = Router::from_config(vec![route("e", "/exchange/**", "exchange", None)], false);
        assert!(router.match_path("/limits").is_none());
    }

    #[test]
    fn test_discovery_locator() {
        let router = Router::from_config(vec![], true);
        let m = router.match_path("/LIMITS/limits").unwrap();
        assert_eq!(m.route_id, "locator");
        assert_eq!(m.service, "limits");
        assert_eq!(m.forward_path, "/limits");
        assert!(router.match_path("/").is_none());
    }

    #[test]
    fn test_invalid_route_skipped() {
        let router = Router::from_config(vec![route("bad", "no-slash", "x", None)], false);
        assert!(router.routes().is_empty());
    }
}
