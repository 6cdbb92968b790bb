//! Configuration validation.
//!
//! # Responsibilities
//! - Check route match syntax (host, path template, methods)
//! - Check endpoint addresses
//! - Check active health check options
//!
//! # Design Decisions
//! - Reports all problems of an item, not just the first
//! - Never checks that a route's backend exists; that surfaces at
//!   forwarding time
//! - Validation is pure apart from error reporting

use std::collections::HashSet;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use url::Url;

use crate::config::errors::{ConfigErrorCode, ConfigErrorReporter};
use crate::config::schema::ActiveHealthCheckOptions;
use crate::config::snapshot::ParsedRoute;

static HOST_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$").expect("host label pattern is valid")
});

/// Pluggable route validation run by the config builder.
pub trait RouteValidator: Send + Sync {
    /// Returns `false` if the route must be dropped. Every problem found is
    /// pushed to `reporter`.
    fn validate(&self, route: &ParsedRoute, reporter: &dyn ConfigErrorReporter) -> bool;
}

/// Default validator: host, path template and method grammar.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRouteValidator;

impl RouteValidator for DefaultRouteValidator {
    fn validate(&self, route: &ParsedRoute, reporter: &dyn ConfigErrorReporter) -> bool {
        let id = route.route_id.as_str();
        let mut valid = true;

        if route.host.is_none() && route.path.is_none() {
            reporter.report_error(
                ConfigErrorCode::RouteMissingMatch,
                id,
                "route must specify a host or a path",
            );
            valid = false;
        }

        if let Some(host) = &route.host {
            if let Err(e) = HostSpec::from_str(host) {
                reporter.report_error(
                    ConfigErrorCode::InvalidHost,
                    id,
                    &format!("invalid host '{}': {}", host, e),
                );
                valid = false;
            }
        }

        if let Some(path) = &route.path {
            if let Err(e) = PathPattern::from_str(path) {
                reporter.report_error(
                    ConfigErrorCode::InvalidPath,
                    id,
                    &format!("invalid path '{}': {}", path, e),
                );
                valid = false;
            }
        }

        let mut seen = HashSet::new();
        for method in &route.methods {
            if !is_token(method) {
                reporter.report_error(
                    ConfigErrorCode::InvalidMethod,
                    id,
                    &format!("invalid method '{}'", method),
                );
                valid = false;
            } else if !seen.insert(method.to_ascii_uppercase()) {
                reporter.report_error(
                    ConfigErrorCode::DuplicateMethod,
                    id,
                    &format!("method '{}' listed more than once", method),
                );
                valid = false;
            }
        }

        valid
    }
}

/// RFC 7230 token.
fn is_token(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c))
}

#[derive(Debug, PartialEq, Eq, Error)]
pub enum HostSpecParseError {
    #[error("host is empty")]
    EmptyStr,
    #[error("host has an empty label")]
    EmptyLabel,
    #[error("host has an invalid label")]
    InvalidLabel,
    #[error("wildcard must be the single leading label")]
    InvalidWildcard,
    #[error("IP addresses are not allowed")]
    UnexpectedIp,
    #[error("invalid port")]
    InvalidPort,
}

/// A route host: an RFC 1123 hostname, optionally prefixed by a single `*.`
/// wildcard label and suffixed by a port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSpec {
    /// Labels in reverse order, matching starts from the end.
    labels: Vec<String>,
    wildcard: bool,
    port: Option<u16>,
}

impl HostSpec {
    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }
}

impl FromStr for HostSpec {
    type Err = HostSpecParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.is_empty() {
            return Err(HostSpecParseError::EmptyStr);
        }

        if IpAddr::from_str(value).is_ok() {
            return Err(HostSpecParseError::UnexpectedIp);
        }

        let (host, port) = match value.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .ok()
                    .filter(|p| *p != 0)
                    .ok_or(HostSpecParseError::InvalidPort)?;
                (host, Some(port))
            }
            None => (value, None),
        };

        if host.is_empty() {
            return Err(HostSpecParseError::EmptyStr);
        }
        if IpAddr::from_str(host).is_ok() {
            return Err(HostSpecParseError::UnexpectedIp);
        }

        let host = host.to_ascii_lowercase();
        let mut labels = vec![];
        let mut wildcard = false;

        for label in host.split('.').rev() {
            if label.is_empty() {
                return Err(HostSpecParseError::EmptyLabel);
            }

            // Anything after the wildcard label is invalid.
            if wildcard {
                return Err(HostSpecParseError::InvalidWildcard);
            }

            if label == "*" {
                wildcard = true;
            } else {
                if !HOST_LABEL.is_match(label) {
                    return Err(HostSpecParseError::InvalidLabel);
                }
                labels.push(label.to_string());
            }
        }

        if labels.is_empty() {
            return Err(HostSpecParseError::InvalidWildcard);
        }

        Ok(Self {
            labels,
            wildcard,
            port,
        })
    }
}

#[derive(Debug, PartialEq, Eq, Error)]
pub enum PathPatternError {
    #[error("path must start with '/'")]
    MissingLeadingSlash,
    #[error("path contains an empty segment")]
    EmptySegment,
    #[error("segment '{0}' has unbalanced or misplaced braces")]
    InvalidBraces(String),
    #[error("invalid parameter name '{0}'")]
    InvalidParameterName(String),
    #[error("parameter '{0}' appears more than once")]
    DuplicateParameter(String),
    #[error("catch-all parameter '{0}' must be the last segment")]
    CatchAllNotLast(String),
}

/// One segment of a path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Literal(String),
    Parameter { name: String, catch_all: bool },
}

/// A parsed path template such as `/api/{version}/{**rest}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    segments: Vec<PathSegment>,
}

impl PathPattern {
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            PathSegment::Parameter { name, .. } => Some(name.as_str()),
            PathSegment::Literal(_) => None,
        })
    }
}

impl FromStr for PathPattern {
    type Err = PathPatternError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let rest = value
            .strip_prefix('/')
            .ok_or(PathPatternError::MissingLeadingSlash)?;
        if rest.starts_with('/') {
            return Err(PathPatternError::EmptySegment);
        }
        // A single trailing slash is ignored.
        let rest = rest.strip_suffix('/').unwrap_or(rest);

        let mut segments = Vec::new();
        if rest.is_empty() {
            return Ok(Self { segments });
        }

        let mut names = HashSet::new();
        let mut catch_all_seen: Option<String> = None;

        for raw in rest.split('/') {
            if raw.is_empty() {
                return Err(PathPatternError::EmptySegment);
            }
            if let Some(name) = catch_all_seen.take() {
                return Err(PathPatternError::CatchAllNotLast(name));
            }

            let segment = parse_segment(raw)?;
            if let PathSegment::Parameter { name, catch_all } = &segment {
                if !names.insert(name.to_ascii_lowercase()) {
                    return Err(PathPatternError::DuplicateParameter(name.clone()));
                }
                if *catch_all {
                    catch_all_seen = Some(name.clone());
                }
            }
            segments.push(segment);
        }

        Ok(Self { segments })
    }
}

fn parse_segment(raw: &str) -> Result<PathSegment, PathPatternError> {
    let Some(inner) = raw.strip_prefix('{') else {
        if raw.contains(['{', '}']) {
            return Err(PathPatternError::InvalidBraces(raw.to_string()));
        }
        return Ok(PathSegment::Literal(raw.to_string()));
    };

    let inner = inner
        .strip_suffix('}')
        .filter(|i| !i.contains(['{', '}']))
        .ok_or_else(|| PathPatternError::InvalidBraces(raw.to_string()))?;

    let (name, catch_all) = match inner.strip_prefix("**").or_else(|| inner.strip_prefix('*')) {
        Some(name) => (name, true),
        None => (inner, false),
    };

    let valid_name = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid_name {
        return Err(PathPatternError::InvalidParameterName(inner.to_string()));
    }

    Ok(PathSegment::Parameter {
        name: name.to_string(),
        catch_all,
    })
}

#[derive(Debug, Error)]
pub enum AddressError {
    #[error("{0}")]
    Parse(#[from] url::ParseError),
    #[error("unsupported scheme '{0}'")]
    UnsupportedScheme(String),
    #[error("address has no host")]
    MissingHost,
}

/// Parse an endpoint (or health probe) address. Must be an absolute
/// `http`/`https` URL with a host.
pub fn parse_endpoint_address(address: &str) -> Result<Url, AddressError> {
    let url = Url::parse(address)?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(AddressError::UnsupportedScheme(other.to_string())),
    }
    if url.host_str().is_none() {
        return Err(AddressError::MissingHost);
    }
    Ok(url)
}

#[derive(Debug, PartialEq, Eq, Error)]
pub enum HealthCheckOptionsError {
    #[error("interval must be greater than zero")]
    ZeroInterval,
    #[error("timeout must be greater than zero")]
    ZeroTimeout,
    #[error("path '{0}' must be empty or start with '/'")]
    InvalidPath(String),
    #[error("port must be greater than zero")]
    ZeroPort,
}

/// Check active health check options. Disabled options are always valid.
pub fn validate_active_health_check(
    options: &ActiveHealthCheckOptions,
) -> Result<(), HealthCheckOptionsError> {
    if !options.enabled {
        return Ok(());
    }
    if options.interval_ms == 0 {
        return Err(HealthCheckOptionsError::ZeroInterval);
    }
    if options.timeout_ms == 0 {
        return Err(HealthCheckOptionsError::ZeroTimeout);
    }
    if !options.path.is_empty() && !options.path.starts_with('/') {
        return Err(HealthCheckOptionsError::InvalidPath(options.path.clone()));
    }
    if options.port == Some(0) {
        return Err(HealthCheckOptionsError::ZeroPort);
    }
    Ok(())
}
