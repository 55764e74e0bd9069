//! Core Wallarm API types.
//!
//! This module provides the resource kinds the transport uses to classify
//! duplicate-resource responses, and the request payload forms it accepts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Default Wallarm Cloud API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.wallarm.com";

/// Header carrying the API token.
pub const TOKEN_HEADER: &str = "X-WallarmAPI-Token";

/// Exact body the service returns when a node or application already exists.
pub const DUPLICATE_SENTINEL: &str = r#"{"status":400,"body":"Already exists"}"#;

/// Kind of resource a request operates on.
///
/// The kind never changes the request itself. It selects how the transport
/// interprets duplicate-resource responses and a couple of header quirks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ResourceKind {
    /// Application
    App,
    /// Filtering node
    Node,
    /// Scanner scope target
    Scanner,
    /// User account
    User,
    /// User account details (form-encoded, no JSON content type)
    UserDetails,
    /// Rule (hint) inside an action
    Hint,
    /// Action: the condition group rules attach to
    Rule,
    /// IP list entries
    IpRules,
    /// Any other resource
    Other(String),
}

/// Which response marks a create as colliding with an existing resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateSignal {
    /// HTTP 400 with a body equal to [`DUPLICATE_SENTINEL`]
    SentinelBody,
    /// HTTP 409 with any body
    Conflict,
}

impl ResourceKind {
    /// Returns the kind name as used by the service.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::App => "app",
            Self::Node => "node",
            Self::Scanner => "scanner",
            Self::User => "user",
            Self::UserDetails => "userdetails",
            Self::Hint => "hint",
            Self::Rule => "rule",
            Self::IpRules => "ip_rules",
            Self::Other(name) => name,
        }
    }

    /// Returns how a duplicate create is signalled for this kind, if at all.
    #[must_use]
    pub const fn duplicate_signal(&self) -> Option<DuplicateSignal> {
        match self {
            Self::App | Self::Node => Some(DuplicateSignal::SentinelBody),
            Self::Scanner | Self::User => Some(DuplicateSignal::Conflict),
            _ => None,
        }
    }
}

impl From<&str> for ResourceKind {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "app" => Self::App,
            "node" => Self::Node,
            "scanner" => Self::Scanner,
            "user" => Self::User,
            "userdetails" => Self::UserDetails,
            "hint" => Self::Hint,
            "rule" => Self::Rule,
            "ip_rules" => Self::IpRules,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for ResourceKind {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<ResourceKind> for String {
    fn from(kind: ResourceKind) -> Self {
        kind.name().to_string()
    }
}

impl FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::Config("Empty resource kind".to_string()));
        }
        Ok(Self::from(s))
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Request payload accepted by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Payload {
    /// No body at all
    #[default]
    Empty,
    /// Literal query string sent as the URL query, never as a body
    Query(String),
    /// Bytes passed through unchanged
    Raw(Vec<u8>),
    /// JSON document, serialized once before the first attempt
    Json(Vec<u8>),
}

impl Payload {
    /// Serialize any value into a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encode`] if the value cannot be serialized.
    pub fn json<T>(value: &T) -> Result<Self>
    where
        T: Serialize + ?Sized,
    {
        serde_json::to_vec(value)
            .map(Self::Json)
            .map_err(|err| Error::Encode(err.to_string()))
    }

    /// Build a query-string payload.
    #[must_use]
    pub fn query(query: impl Into<String>) -> Self {
        Self::Query(query.into())
    }

    /// Build a pass-through payload.
    #[must_use]
    pub fn raw(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Raw(bytes.into())
    }

    /// Bytes to send as the request body, if any.
    #[must_use]
    pub fn body(&self) -> Option<&[u8]> {
        match self {
            Self::Raw(bytes) | Self::Json(bytes) => Some(bytes),
            Self::Empty | Self::Query(_) => None,
        }
    }

    /// Query string to put on the URL, if any.
    #[must_use]
    pub fn query_string(&self) -> Option<&str> {
        match self {
            Self::Query(query) => Some(query),
            _ => None,
        }
    }
}
