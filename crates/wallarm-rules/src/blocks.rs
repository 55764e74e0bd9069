//! Structured sub-blocks of a rule: threshold, reaction, enumerated
//! parameters, advanced and arbitrary conditions.
//!
//! Absent blocks are never sent as empty objects; request fields holding them
//! are skipped when `None` or empty.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::{decode_point_location, point_location};
use crate::point::Point;

/// Request-count threshold for counter-based rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Threshold {
    /// Number of requests
    pub count: i64,
    /// Window in seconds
    pub period: i64,
}

/// Blocking and graylisting durations applied when a rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Reaction {
    /// Block the session for this many seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_by_session: Option<i64>,
    /// Block the source IP for this many seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_by_ip: Option<i64>,
    /// Graylist the source IP for this many seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graylist_by_ip: Option<i64>,
}

impl Reaction {
    /// Build a reaction where zero means "not set".
    #[must_use]
    pub fn from_seconds(block_by_session: i64, block_by_ip: i64, graylist_by_ip: i64) -> Self {
        let non_zero = |v: i64| (v != 0).then_some(v);
        Self {
            block_by_session: non_zero(block_by_session),
            block_by_ip: non_zero(block_by_ip),
            graylist_by_ip: non_zero(graylist_by_ip),
        }
    }

    /// True when no duration is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.block_by_session.is_none() && self.block_by_ip.is_none() && self.graylist_by_ip.is_none()
    }
}

/// Request point whose parameters are enumerated exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumeratedPoint {
    /// Parameter location
    #[serde(with = "point_location")]
    pub point: Vec<Point>,
    /// Whether the parameter holds sensitive data
    #[serde(default)]
    pub sensitive: bool,
}

/// Restriction of a rule to an allow-list of request parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawEnumeratedParameters", into = "RawEnumeratedParameters")]
pub enum EnumeratedParameters {
    /// Parameters selected by name/value regular expressions
    Regexp {
        /// Name patterns
        name_regexps: Vec<String>,
        /// Value patterns
        value_regexps: Vec<String>,
        /// Include plain parameters
        plain_parameters: bool,
        /// Include additional parameters
        additional_parameters: bool,
    },
    /// Parameters listed point by point
    Exact {
        /// Listed points
        points: Vec<EnumeratedPoint>,
    },
}

impl EnumeratedParameters {
    /// Wire name of the mode.
    #[must_use]
    pub const fn mode(&self) -> &'static str {
        match self {
            Self::Regexp { .. } => "regexp",
            Self::Exact { .. } => "exact",
        }
    }
}

/// Flat wire shape; any mode other than `exact` reads as `regexp`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawEnumeratedParameters {
    mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name_regexps: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value_regexps: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    plain_parameters: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    additional_parameters: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    points: Option<Value>,
}

impl From<RawEnumeratedParameters> for EnumeratedParameters {
    fn from(raw: RawEnumeratedParameters) -> Self {
        if raw.mode == "exact" {
            let points = match raw.points {
                Some(Value::Array(items)) => items,
                Some(Value::Null) | None => Vec::new(),
                Some(single) => vec![single],
            };
            return Self::Exact {
                points: points.into_iter().filter_map(enumerated_point).collect(),
            };
        }

        Self::Regexp {
            name_regexps: raw.name_regexps.unwrap_or_default(),
            value_regexps: raw.value_regexps.unwrap_or_default(),
            plain_parameters: raw.plain_parameters.unwrap_or_default(),
            additional_parameters: raw.additional_parameters.unwrap_or_default(),
        }
    }
}

impl From<EnumeratedParameters> for RawEnumeratedParameters {
    fn from(params: EnumeratedParameters) -> Self {
        let mode = params.mode().to_string();
        match params {
            EnumeratedParameters::Regexp {
                name_regexps,
                value_regexps,
                plain_parameters,
                additional_parameters,
            } => Self {
                mode,
                name_regexps: Some(name_regexps),
                value_regexps: Some(value_regexps),
                plain_parameters: Some(plain_parameters),
                additional_parameters: Some(additional_parameters),
                points: None,
            },
            EnumeratedParameters::Exact { points } => Self {
                mode,
                points: (!points.is_empty())
                    .then(|| serde_json::to_value(points).ok())
                    .flatten(),
                ..Self::default()
            },
        }
    }
}

fn enumerated_point(value: Value) -> Option<EnumeratedPoint> {
    let sensitive = value
        .get("sensitive")
        .and_then(Value::as_bool)
        .unwrap_or_default();
    let elements = value.get("point")?.as_array()?;
    match decode_point_location(elements) {
        Ok(point) => Some(EnumeratedPoint { point, sensitive }),
        Err(err) => {
            tracing::warn!(error = %err, "Skipping undecodable enumerated parameter point");
            None
        }
    }
}

/// Condition on a request attribute outside the point model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvancedCondition {
    /// Attribute name
    pub field: String,
    /// Operator
    pub operator: String,
    /// Operands
    #[serde(default)]
    pub value: Vec<String>,
}

/// Condition on an arbitrary request point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbitraryCondition {
    /// Request location
    #[serde(with = "point_location")]
    pub point: Vec<Point>,
    /// Operator
    pub operator: String,
    /// Operands
    #[serde(default)]
    pub value: Vec<String>,
}
