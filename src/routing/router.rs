//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled routes in evaluation order
//! - Look up the first route matching a request target
//! - Resolve a route's upstream binding, or report it unmapped
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Order fixed at build time: longer paths first, ties lexicographic
//! - O(n) scan (acceptable for typical route counts)
//! - Explicit no-match and explicit unmapped rather than silent defaults

use std::collections::BTreeMap;
use std::fmt;

use axum::http::Uri;
use thiserror::Error;

use crate::config::{ResourceMapping, RouteConfig, ABOUT_RESOURCE};
use crate::routing::matcher::{Matcher, PathMatcher};

/// Error building the route table.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("route path '{path}' is not a valid pattern: {source}")]
    InvalidPattern {
        path: String,
        #[source]
        source: regex::Error,
    },

    #[error("route path '{0}' is configured more than once")]
    Duplicate(String),
}

/// What a route serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    /// The built-in about document.
    About,
    /// A named upstream resource.
    Proxy(String),
}

/// Address of an upstream service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl Upstream {
    /// Parse an absolute upstream URL. The port defaults from the scheme.
    pub fn parse(url: &str) -> Option<Self> {
        let uri: Uri = url.parse().ok()?;
        let scheme = uri.scheme_str()?.to_string();
        let host = uri.host()?.to_string();
        let port = uri
            .port_u16()
            .unwrap_or(if scheme == "https" { 443 } else { 80 });
        Some(Self { scheme, host, port })
    }

    /// `host:port`, suitable for a URI authority.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// A resolved upstream plus the label it was selected by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamBinding {
    pub upstream: Upstream,
    pub label: String,
}

/// A route matched but has no usable upstream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("route '{path}' matched but resource '{resource}' has no upstream")]
pub struct RouteUnmapped {
    pub path: String,
    pub resource: String,
}

/// A compiled route.
#[derive(Debug, Clone)]
pub struct Route {
    matcher: PathMatcher,
    kind: ResourceKind,
    binding: Option<UpstreamBinding>,
}

impl Route {
    pub fn path(&self) -> &str {
        self.matcher.pattern()
    }

    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    /// Returns true if the route accepts a prefix of `target`.
    pub fn matches(&self, target: &str) -> bool {
        self.matcher.matches(target)
    }

    /// The upstream binding of a proxy route.
    pub fn resolve(&self) -> Result<&UpstreamBinding, RouteUnmapped> {
        self.binding.as_ref().ok_or_else(|| RouteUnmapped {
            path: self.path().to_string(),
            resource: match &self.kind {
                ResourceKind::About => ABOUT_RESOURCE.to_string(),
                ResourceKind::Proxy(name) => name.clone(),
            },
        })
    }
}

/// Ordered, immutable route table.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Compile routes and bind them against the configured resources.
    pub fn build(
        routes: &[RouteConfig],
        resources: &BTreeMap<String, Vec<ResourceMapping>>,
    ) -> Result<Self, RouteError> {
        let mut ordered: Vec<&RouteConfig> = routes.iter().collect();
        ordered.sort_by(|a, b| {
            b.path
                .len()
                .cmp(&a.path.len())
                .then_with(|| a.path.cmp(&b.path))
        });

        let mut compiled: Vec<Route> = Vec::with_capacity(ordered.len());
        for config in ordered {
            if compiled.iter().any(|r| r.path() == config.path) {
                return Err(RouteError::Duplicate(config.path.clone()));
            }

            let matcher = PathMatcher::new(config.path.as_str()).map_err(|source| {
                RouteError::InvalidPattern {
                    path: config.path.clone(),
                    source,
                }
            })?;

            let (kind, binding) = if config.resource == ABOUT_RESOURCE {
                (ResourceKind::About, None)
            } else {
                let binding = bind_upstream(config, resources);
                if binding.is_none() {
                    tracing::warn!(
                        path = %config.path,
                        resource = %config.resource,
                        label = ?config.label,
                        "Route has no upstream mapping, requests will receive 503"
                    );
                }
                (ResourceKind::Proxy(config.resource.clone()), binding)
            };

            tracing::debug!(path = %config.path, kind = ?kind, "Route compiled");
            compiled.push(Route {
                matcher,
                kind,
                binding,
            });
        }

        Ok(Self { routes: compiled })
    }

    /// First route in table order accepting a prefix of `target`.
    pub fn match_target(&self, target: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.matches(target))
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Pick the upstream for a route: the first mapping carrying the route's label,
/// or the first mapping when the route names no label.
fn bind_upstream(
    route: &RouteConfig,
    resources: &BTreeMap<String, Vec<ResourceMapping>>,
) -> Option<UpstreamBinding> {
    let mappings = resources.get(&route.resource)?;
    let mapping = match &route.label {
        Some(label) => mappings.iter().find(|m| m.labels.contains(label))?,
        None => mappings.first()?,
    };
    let upstream = Upstream::parse(&mapping.url)?;
    let label = route
        .label
        .clone()
        .or_else(|| mapping.labels.first().cloned())
        .unwrap_or_else(|| route.resource.clone());

    Some(UpstreamBinding { upstream, label })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(path: &str, resource: &str, label: Option<&str>) -> RouteConfig {
        RouteConfig {
            path: path.into(),
            resource: resource.into(),
            label: label.map(Into::into),
        }
    }

    fn resources() -> BTreeMap<String, Vec<ResourceMapping>> {
        let mut map = BTreeMap::new();
        map.insert(
            "backend".to_string(),
            vec![
                ResourceMapping {
                    url: "http://10.0.0.1:8081".into(),
                    labels: vec!["blue".into()],
                },
                ResourceMapping {
                    url: "http://10.0.0.2".into(),
                    labels: vec!["green".into()],
                },
            ],
        );
        map
    }

    fn paths(table: &RouteTable) -> Vec<&str> {
        table.routes().iter().map(Route::path).collect()
    }

    #[test]
    fn orders_longest_path_first() {
        let table = RouteTable::build(
            &[
                route("/", "backend", None),
                route("/api", "backend", None),
                route("/api/v2", "backend", None),
                route("/abc", "backend", None),
            ],
            &resources(),
        )
        .unwrap();

        assert_eq!(paths(&table), vec!["/api/v2", "/abc", "/api", "/"]);
    }

    #[test]
    fn order_is_independent_of_config_order() {
        let configs = vec![
            route("/b", "backend", None),
            route("/a", "backend", None),
            route("/long/path", "backend", None),
            route("/", "backend", None),
        ];
        let mut reversed = configs.clone();
        reversed.reverse();

        let first = RouteTable::build(&configs, &resources()).unwrap();
        let second = RouteTable::build(&reversed, &resources()).unwrap();
        let third = RouteTable::build(&configs, &resources()).unwrap();

        assert_eq!(paths(&first), paths(&second));
        assert_eq!(paths(&first), paths(&third));
    }

    #[test]
    fn first_match_wins() {
        let table = RouteTable::build(
            &[route("/", "backend", Some("green")), route("/api", "backend", Some("blue"))],
            &resources(),
        )
        .unwrap();

        let matched = table.match_target("/api/users?page=2").unwrap();
        assert_eq!(matched.path(), "/api");
        assert_eq!(matched.resolve().unwrap().label, "blue");

        let fallback = table.match_target("/index.html").unwrap();
        assert_eq!(fallback.path(), "/");
    }

    #[test]
    fn no_default_route_fails_closed() {
        let table = RouteTable::build(&[route("/api", "backend", None)], &resources()).unwrap();
        assert!(table.match_target("/other").is_none());
    }

    #[test]
    fn binds_by_label() {
        let table = RouteTable::build(&[route("/", "backend", Some("green"))], &resources()).unwrap();
        let binding = table.match_target("/").unwrap().resolve().unwrap();

        assert_eq!(binding.upstream.to_string(), "http://10.0.0.2:80");
        assert_eq!(binding.label, "green");
    }

    #[test]
    fn binds_first_upstream_without_label() {
        let table = RouteTable::build(&[route("/", "backend", None)], &resources()).unwrap();
        let binding = table.match_target("/").unwrap().resolve().unwrap();

        assert_eq!(binding.upstream.authority(), "10.0.0.1:8081");
        assert_eq!(binding.label, "blue");
    }

    #[test]
    fn unknown_resource_or_label_is_unmapped() {
        let table = RouteTable::build(
            &[route("/missing", "nowhere", None), route("/red", "backend", Some("red"))],
            &resources(),
        )
        .unwrap();

        let unmapped = table.match_target("/missing").unwrap().resolve().unwrap_err();
        assert_eq!(unmapped.resource, "nowhere");
        assert!(table.match_target("/red").unwrap().resolve().is_err());
    }

    #[test]
    fn about_route_is_self_resource() {
        let table = RouteTable::build(&[route("/about", "about", None)], &resources()).unwrap();
        assert_eq!(table.match_target("/about").unwrap().kind(), &ResourceKind::About);
    }

    #[test]
    fn rejects_duplicates_and_bad_patterns() {
        let dup = RouteTable::build(
            &[route("/api", "backend", None), route("/api", "other", None)],
            &resources(),
        );
        assert!(matches!(dup, Err(RouteError::Duplicate(p)) if p == "/api"));

        let bad = RouteTable::build(&[route("/x(", "backend", None)], &resources());
        assert!(matches!(bad, Err(RouteError::InvalidPattern { .. })));
    }
}
