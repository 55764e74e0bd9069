//! Translation between conditions and the service's point-tag wire format.
//!
//! Writes and reads are not symmetric. A condition or rule point is always
//! written as nested `[tag]` / `[tag, key]` arrays, with numeric keys sent as
//! floats. Rule points come back as one flat sequence of tags and keys, which
//! [`decode_flat_point_location`] regroups: a keyed tag absorbs the element
//! after it, every other element stands alone.

use serde_json::{Number, Value};
use wallarm_core::Error;

use crate::models::ActionDetails;
use crate::point::{index_from_f64, parse_index, Arity, Comparison, Condition, Point, PointTag};
use crate::Result;

/// Encode a condition into its wire form.
///
/// - zero-key tags send `[tag]` and carry the matched text in `value`
/// - `instance` always sends comparison `equal`
/// - `header` keys are upper-cased, other keys are lower-cased under `iequal`
/// - `query` is sent as tag `get`
/// - integer keys are sent as floats
/// - `iequal` lower-cases the value, `absent` omits it
#[must_use]
pub fn encode_condition(condition: &Condition) -> ActionDetails {
    let comparison = condition.comparison();
    let iequal = comparison == Comparison::Iequal;

    let point = match condition.point() {
        Point::Bare(tag) => vec![Value::from(tag.wire_name())],
        Point::Named(tag, key) => {
            let key = if *tag == PointTag::Header {
                key.to_uppercase()
            } else if iequal {
                key.to_lowercase()
            } else {
                key.clone()
            };
            vec![Value::from(tag.wire_name()), Value::from(key)]
        }
        Point::Indexed(tag, index) => vec![Value::from(tag.wire_name()), index_to_wire(*index)],
    };

    let comparison = if condition.point().tag() == PointTag::Instance {
        Comparison::Equal
    } else {
        comparison
    };

    let value = match comparison {
        Comparison::Absent => None,
        _ => condition.value().map(|value| {
            if iequal {
                Value::from(value.to_lowercase())
            } else {
                Value::from(value)
            }
        }),
    };

    ActionDetails {
        comparison: comparison.name().to_string(),
        point,
        value,
    }
}

/// Decode a condition from its wire form.
///
/// # Errors
///
/// Returns [`Error::InvalidCondition`] for an unknown tag or comparison, or a
/// point whose shape does not match its tag.
pub fn decode_condition(details: &ActionDetails) -> Result<Condition> {
    let comparison: Comparison = details.comparison.parse()?;

    let point = match details.point.as_slice() {
        [tag] => Point::new(wire_tag(tag)?, None)?,
        [tag, key] => keyed_point(wire_tag(tag)?, key)?,
        other => {
            return Err(Error::InvalidCondition(format!(
                "condition point must have one or two elements, got {}",
                other.len()
            )))
        }
    };

    let value = match &details.value {
        None | Some(Value::Null) => None,
        Some(value) => Some(wire_text(value)),
    };

    Ok(Condition::new(point, comparison, value))
}

/// Encode a rule point location as nested pairs.
#[must_use]
pub fn encode_point_location(points: &[Point]) -> Vec<Value> {
    points
        .iter()
        .map(|point| match point {
            Point::Bare(tag) => Value::Array(vec![Value::from(tag.wire_name())]),
            Point::Named(tag, key) => {
                Value::Array(vec![Value::from(tag.wire_name()), Value::from(key.as_str())])
            }
            Point::Indexed(tag, index) => {
                Value::Array(vec![Value::from(tag.wire_name()), index_to_wire(*index)])
            }
        })
        .collect()
}

/// Regroup a flat point sequence as returned by the service.
///
/// # Errors
///
/// Returns [`Error::InvalidCondition`] for unknown tags, malformed keys, or a
/// keyed tag at the end of the sequence.
pub fn decode_flat_point_location(elements: &[Value]) -> Result<Vec<Point>> {
    let mut points = Vec::new();
    let mut elements = elements.iter();

    while let Some(element) = elements.next() {
        let tag = wire_tag(element)?;
        let point = match tag.arity() {
            Arity::Bare => Point::Bare(tag),
            Arity::Named | Arity::Indexed => {
                let key = elements.next().ok_or_else(|| {
                    Error::InvalidCondition(format!("point `{tag}` is missing its key"))
                })?;
                keyed_point(tag, key)?
            }
        };
        points.push(point);
    }

    Ok(points)
}

/// Decode a rule point location in either nested or flat form.
///
/// # Errors
///
/// Returns [`Error::InvalidCondition`] when an element cannot be decoded.
pub fn decode_point_location(elements: &[Value]) -> Result<Vec<Point>> {
    if elements.is_empty() || !elements.iter().all(Value::is_array) {
        return decode_flat_point_location(elements);
    }

    elements
        .iter()
        .map(|element| match element.as_array().map(Vec::as_slice) {
            Some([tag]) => Point::new(wire_tag(tag)?, None),
            Some([tag, key]) => keyed_point(wire_tag(tag)?, key),
            _ => Err(Error::InvalidCondition(format!(
                "point element must have one or two entries: {element}"
            ))),
        })
        .collect()
}

/// Serde adapter for fields holding a rule point location.
///
/// Serializes nested pairs and accepts both nested and flat input.
pub mod point_location {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    use crate::point::Point;

    /// Serialize points as nested pairs.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S>(points: &[Point], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        super::encode_point_location(points).serialize(serializer)
    }

    /// Deserialize points from nested or flat form. `null` reads as empty.
    ///
    /// # Errors
    ///
    /// Fails when an element cannot be decoded.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Point>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
        super::decode_point_location(&raw).map_err(D::Error::custom)
    }
}

fn keyed_point(tag: PointTag, key: &Value) -> Result<Point> {
    match tag.arity() {
        Arity::Indexed => Point::indexed(tag, wire_index(key)?),
        Arity::Named => Point::named(tag, wire_text(key)),
        Arity::Bare => Err(Error::InvalidCondition(format!(
            "point `{tag}` takes no key, got {key}"
        ))),
    }
}

fn wire_tag(value: &Value) -> Result<PointTag> {
    let name = value
        .as_str()
        .ok_or_else(|| Error::InvalidCondition(format!("point tag must be a string: {value}")))?;
    PointTag::from_wire(name)
        .ok_or_else(|| Error::InvalidCondition(format!("unknown point tag `{name}`")))
}

fn wire_index(value: &Value) -> Result<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().and_then(index_from_f64))
            .ok_or_else(|| Error::InvalidCondition(format!("`{number}` is not an integral key"))),
        Value::String(text) => parse_index(text),
        other => Err(Error::InvalidCondition(format!(
            "numeric key expected, got {other}"
        ))),
    }
}

/// Render a wire scalar as text; integral numbers render without a fraction.
fn wire_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().and_then(index_from_f64))
            .map_or_else(|| number.to_string(), |index| index.to_string()),
        other => other.to_string(),
    }
}

#[allow(clippy::cast_precision_loss)]
fn index_to_wire(index: i64) -> Value {
    Number::from_f64(index as f64).map_or_else(|| Value::from(index), Value::Number)
}
