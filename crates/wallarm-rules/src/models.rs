//! Wire models for the rule (hint) and action endpoints.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::blocks::{AdvancedCondition, ArbitraryCondition, EnumeratedParameters, Reaction, Threshold};
use crate::codec::point_location;
use crate::point::Point;

/// Page size used for every listing request.
pub const PAGE_LIMIT: u32 = 1000;

/// Type-specific rule fields carried through [`HintBody::extra`] and
/// [`HintCreateRequest::extra`] without a dedicated model.
pub const EXTRA_RULE_FIELDS: &[&str] = &[
    "regex",
    "regex_id",
    "values",
    "size",
    "size_unit",
    "file_type",
    "name",
    "rate",
    "burst",
    "delay",
    "rsp_status",
    "time_unit",
    "parser",
    "state",
    "overlimit_time",
    "debug_enabled",
    "introspection",
    "max_depth",
    "max_value_size_kb",
    "max_doc_size_kb",
    "max_alias_size_kb",
    "max_doc_per_batch",
];

/// Standard response envelope: `{"status": <int>, "body": <payload>}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiResponse<T> {
    /// Status echoed by the service
    #[serde(default)]
    pub status: u16,
    /// Payload
    pub body: T,
}

/// One condition as it travels on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionDetails {
    /// Comparison type
    #[serde(rename = "type")]
    pub comparison: String,
    /// `[tag]` or `[tag, key]`
    #[serde(default)]
    pub point: Vec<Value>,
    /// Compared value; omitted when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Request payload for creating a rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HintCreateRequest {
    /// Rule type, for example `vpatch` or `wallarm_mode`
    #[serde(rename = "type")]
    pub rule_type: String,
    /// Owning client (tenant)
    pub clientid: i64,
    /// Conditions selecting the requests the rule applies to
    pub action: Vec<ActionDetails>,
    /// Request location the rule acts on
    #[serde(with = "point_location", skip_serializing_if = "Vec::is_empty", default)]
    pub point: Vec<Point>,
    /// Always `false` on create
    pub validated: bool,
    /// Always `true` on create
    pub variativity_disabled: bool,
    /// Free-form comment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Rule-set grouping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<String>,
    /// Whether the rule is active
    pub active: bool,
    /// Display title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Mitigation kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mitigation: Option<String>,
    /// Attack type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack_type: Option<String>,
    /// Reaction block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction: Option<Reaction>,
    /// Threshold block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<Threshold>,
    /// Enumerated parameters block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enumerated_parameters: Option<EnumeratedParameters>,
    /// Advanced conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advanced_conditions: Vec<AdvancedCondition>,
    /// Arbitrary conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arbitrary_conditions: Vec<ArbitraryCondition>,
    /// Comparison or operating mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Type-specific fields, see [`EXTRA_RULE_FIELDS`]
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A rule as returned by the service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HintBody {
    /// Rule id
    pub id: i64,
    /// Owning action id
    #[serde(default)]
    pub action_id: i64,
    /// Owning client
    #[serde(default)]
    pub clientid: i64,
    /// Rule type
    #[serde(rename = "type", default)]
    pub rule_type: String,
    /// Conditions of the owning action
    #[serde(default, deserialize_with = "null_as_default")]
    pub action: Vec<ActionDetails>,
    /// Request location, flat on read
    #[serde(default, deserialize_with = "null_as_default")]
    pub point: Vec<Value>,
    /// Whether the rule is active
    #[serde(default)]
    pub active: bool,
    /// Display title
    #[serde(default)]
    pub title: Option<String>,
    /// Mitigation kind
    #[serde(default)]
    pub mitigation: Option<String>,
    /// Rule-set grouping
    #[serde(default)]
    pub set: Option<String>,
    /// Comment
    #[serde(default)]
    pub comment: Option<String>,
    /// Attack type
    #[serde(default)]
    pub attack_type: Option<String>,
    /// Mode
    #[serde(default)]
    pub mode: Option<String>,
    /// Counter name
    #[serde(default)]
    pub counter: Option<String>,
    /// Threshold block
    #[serde(default)]
    pub threshold: Option<Threshold>,
    /// Reaction block
    #[serde(default)]
    pub reaction: Option<Reaction>,
    /// Enumerated parameters block
    #[serde(default)]
    pub enumerated_parameters: Option<EnumeratedParameters>,
    /// Advanced conditions
    #[serde(default)]
    pub advanced_conditions: Option<Vec<AdvancedCondition>>,
    /// Arbitrary conditions
    #[serde(default)]
    pub arbitrary_conditions: Option<Vec<ArbitraryCondition>>,
    /// Creation timestamp
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_seconds_option"
    )]
    pub created_at: Option<DateTime<Utc>>,
    /// Last update timestamp
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_seconds_option"
    )]
    pub updated_at: Option<DateTime<Utc>>,
    /// Every other field of the record
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Filter for listing rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HintFilter {
    /// Client ids
    pub clientid: Vec<i64>,
    /// Rule ids
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub id: Vec<i64>,
    /// Action ids
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub action_id: Vec<i64>,
    /// Rule types
    #[serde(default, rename = "type", skip_serializing_if = "Vec::is_empty")]
    pub rule_type: Vec<String>,
}

/// Request payload for listing rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HintReadRequest {
    /// Filter
    pub filter: HintFilter,
    /// Sort field
    pub order_by: String,
    /// Newest first
    pub order_desc: bool,
    /// Page size
    pub limit: u32,
    /// Page offset
    pub offset: u32,
}

impl HintReadRequest {
    /// First page of rules matching `filter`, most recently updated first.
    #[must_use]
    pub fn new(filter: HintFilter) -> Self {
        Self {
            filter,
            order_by: "updated_at".to_string(),
            order_desc: true,
            limit: PAGE_LIMIT,
            offset: 0,
        }
    }

    /// The request for the following page.
    #[must_use]
    pub fn next_page(&self) -> Self {
        Self {
            offset: self.offset.saturating_add(self.limit),
            ..self.clone()
        }
    }
}

/// Filter for deleting a rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HintDeleteFilter {
    /// Client ids
    pub clientid: Vec<i64>,
    /// Rule id
    pub id: i64,
}

/// Request payload for deleting a rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HintDeleteRequest {
    /// Filter
    pub filter: HintDeleteFilter,
}

impl HintDeleteRequest {
    /// Delete rule `rule_id` of `client_id`.
    #[must_use]
    pub fn new(client_id: i64, rule_id: i64) -> Self {
        Self {
            filter: HintDeleteFilter {
                clientid: vec![client_id],
                id: rule_id,
            },
        }
    }
}

/// Filter for listing actions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionFilter {
    /// Action ids
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub id: Vec<i64>,
    /// Client ids
    pub clientid: Vec<i64>,
    /// Types of rules held by the action
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hint_type: Vec<String>,
}

/// Request payload for listing actions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionReadRequest {
    /// Filter
    pub filter: ActionFilter,
    /// Page size
    pub limit: u32,
    /// Page offset
    pub offset: u32,
}

impl ActionReadRequest {
    /// First page of actions matching `filter`.
    #[must_use]
    pub const fn new(filter: ActionFilter) -> Self {
        Self {
            filter,
            limit: PAGE_LIMIT,
            offset: 0,
        }
    }
}

/// An action (condition group) as returned by the service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ActionEntry {
    /// Action id
    pub id: i64,
    /// Owning client
    #[serde(default)]
    pub clientid: i64,
    /// Conditions
    #[serde(default, deserialize_with = "null_as_default")]
    pub conditions: Vec<ActionDetails>,
    /// Number of rules attached
    #[serde(default)]
    pub hints: i64,
    /// Number of rules attached, grouped
    #[serde(default)]
    pub grouped_hints_count: i64,
    /// Last update timestamp
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_seconds_option"
    )]
    pub updated_at: Option<DateTime<Utc>>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hint_read_request_shape() {
        let request = HintReadRequest::new(HintFilter {
            clientid: vec![7],
            id: vec![42],
            ..HintFilter::default()
        });
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "filter": {"clientid": [7], "id": [42]},
                "order_by": "updated_at",
                "order_desc": true,
                "limit": 1000,
                "offset": 0
            })
        );
        assert_eq!(request.next_page().offset, 1000);
    }

    #[test]
    fn test_hint_delete_request_shape() {
        assert_eq!(
            serde_json::to_value(HintDeleteRequest::new(7, 42)).unwrap(),
            json!({"filter": {"clientid": [7], "id": 42}})
        );
    }

    #[test]
    fn test_action_read_request_shape() {
        let request = ActionReadRequest::new(ActionFilter {
            id: vec![3],
            clientid: vec![7],
            hint_type: vec!["vpatch".into()],
        });
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "filter": {"id": [3], "clientid": [7], "hint_type": ["vpatch"]},
                "limit": 1000,
                "offset": 0
            })
        );
    }

    #[test]
    fn test_hint_body_tolerates_nulls() {
        let body: HintBody = serde_json::from_value(json!({
            "id": 42,
            "action_id": 3,
            "clientid": 7,
            "type": "vpatch",
            "point": ["post", "json_doc", "hash", "password"],
            "action": [{"type": "equal", "point": ["action_name"], "value": "login"}],
            "title": null,
            "threshold": null,
            "advanced_conditions": null,
            "updated_at": 1700000000
        }))
        .unwrap();

        assert_eq!(body.id, 42);
        assert_eq!(body.action.len(), 1);
        assert!(body.title.is_none());
        assert_eq!(body.updated_at.map(|t| t.timestamp()), Some(1_700_000_000));
        assert!(body.extra.is_empty());
    }

    #[test]
    fn test_hint_body_keeps_unmodelled_fields() {
        let body: HintBody = serde_json::from_value(json!({
            "id": 42,
            "type": "rate_limit",
            "rate": 10,
            "burst": 5,
            "values": ["a", "b"]
        }))
        .unwrap();

        assert_eq!(body.rule_type, "rate_limit");
        assert_eq!(body.extra.get("rate"), Some(&json!(10)));
        assert_eq!(body.extra.get("values"), Some(&json!(["a", "b"])));
        assert!(body.extra.get("type").is_none());
    }

    #[test]
    fn test_envelope_parses() {
        let response: ApiResponse<Vec<ActionEntry>> = serde_json::from_value(json!({
            "status": 200,
            "body": [{"id": 3, "clientid": 7, "hints": 1, "grouped_hints_count": 1, "conditions": []}]
        }))
        .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body[0].grouped_hints_count, 1);

        let entry: ActionEntry =
            serde_json::from_value(json!({"id": 4, "conditions": null})).unwrap();
        assert!(entry.conditions.is_empty());
    }
}
