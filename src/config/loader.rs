//! Configuration document parsing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::schema::{BackendConfig, BackendId, EndpointMap, RouteConfig};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// A complete configuration document: routes plus backends with their
/// endpoints inline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfigDocument {
    pub routes: Vec<RouteConfig>,
    pub backends: HashMap<BackendId, BackendDocument>,
}

/// A backend entry of a [`ConfigDocument`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct BackendDocument {
    #[serde(flatten)]
    pub config: BackendConfig,

    #[serde(default)]
    pub endpoints: EndpointMap,
}

/// Parse a TOML configuration document.
///
/// Only syntax is checked here. Semantic problems are reported later by the
/// config builder and the reconciler, item by item.
pub fn parse_document(content: &str) -> Result<ConfigDocument, LoadError> {
    Ok(toml::from_str(content)?)
}
