//! Reconciliation of declared rules with the server's records.
//!
//! A [`Rule`] starts unmanaged (no [`RuleIdentity`]). [`Reconciler::create`]
//! submits it and re-reads the server's canonical form; [`Reconciler::read`]
//! refreshes it or, when the server no longer has it, clears the identity;
//! [`Reconciler::delete`] removes it. The service has no update operation for
//! rules, so [`Reconciler::replace`] deletes and creates.
//!
//! Matching is by rule id only. Races with another writer of the same remote
//! rule are not resolved here.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use tracing::{debug, info, warn};
use wallarm_core::{CancelToken, Error};

use crate::blocks::{AdvancedCondition, ArbitraryCondition, EnumeratedParameters, Reaction, Threshold};
use crate::canonical::{dedup, ConditionSet};
use crate::client::RuleApi;
use crate::codec::{decode_condition, decode_point_location, encode_condition};
use crate::models::{
    ActionFilter, ActionReadRequest, HintBody, HintCreateRequest, HintFilter, HintReadRequest,
    EXTRA_RULE_FIELDS,
};
use crate::point::{Condition, Point};
use crate::Result;

/// Server-assigned identity of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleIdentity {
    /// Owning client
    pub client_id: i64,
    /// Owning action
    pub action_id: i64,
    /// Rule id
    pub rule_id: i64,
}

impl fmt::Display for RuleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.client_id, self.action_id, self.rule_id)
    }
}

impl FromStr for RuleIdentity {
    type Err = Error;

    /// Parse `{clientId}/{actionId}/{ruleId}`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            Error::InvalidIdentity(format!(
                "invalid id {s:?}, expected {{clientId}}/{{actionId}}/{{ruleId}}"
            ))
        };

        let mut parts = s.splitn(3, '/');
        let mut next = || -> Result<i64> {
            parts
                .next()
                .and_then(|part| part.trim().parse().ok())
                .ok_or_else(invalid)
        };

        Ok(Self {
            client_id: next()?,
            action_id: next()?,
            rule_id: next()?,
        })
    }
}

/// Locally declared state of a rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    /// Identity, present once the rule exists remotely
    pub identity: Option<RuleIdentity>,
    /// Owning client
    pub client_id: i64,
    /// Rule type, for example `vpatch`
    pub rule_type: String,
    /// Request location the rule acts on
    pub point: Vec<Point>,
    /// Conditions selecting the requests the rule applies to
    pub conditions: ConditionSet,
    /// Threshold block
    pub threshold: Option<Threshold>,
    /// Reaction block
    pub reaction: Option<Reaction>,
    /// Enumerated parameters block
    pub enumerated_parameters: Option<EnumeratedParameters>,
    /// Advanced conditions
    pub advanced_conditions: Vec<AdvancedCondition>,
    /// Arbitrary conditions
    pub arbitrary_conditions: Vec<ArbitraryCondition>,
    /// Comparison or operating mode
    pub mode: Option<String>,
    /// Attack type
    pub attack_type: Option<String>,
    /// Whether the rule is active
    pub active: bool,
    /// Display title
    pub title: Option<String>,
    /// Mitigation kind
    pub mitigation: Option<String>,
    /// Rule-set grouping
    pub set: Option<String>,
    /// Comment
    pub comment: Option<String>,
    /// Counter name, assigned by the server
    pub counter: Option<String>,
    /// Type-specific fields such as `regex`, `rate` or `size`
    pub extra: BTreeMap<String, Value>,
}

impl Rule {
    /// Declare an active rule of `rule_type` for `client_id`.
    #[must_use]
    pub fn new(client_id: i64, rule_type: impl Into<String>) -> Self {
        Self {
            identity: None,
            client_id,
            rule_type: rule_type.into(),
            point: Vec::new(),
            conditions: ConditionSet::new(),
            threshold: None,
            reaction: None,
            enumerated_parameters: None,
            advanced_conditions: Vec::new(),
            arbitrary_conditions: Vec::new(),
            mode: None,
            attack_type: None,
            active: true,
            title: None,
            mitigation: None,
            set: None,
            comment: None,
            counter: None,
            extra: BTreeMap::new(),
        }
    }

    /// Attach an existing remote identity.
    #[must_use]
    pub fn with_identity(mut self, identity: RuleIdentity) -> Self {
        self.client_id = identity.client_id;
        self.identity = Some(identity);
        self
    }

    /// Set the request location.
    #[must_use]
    pub fn with_point(mut self, point: Vec<Point>) -> Self {
        self.point = point;
        self
    }

    /// Add a condition.
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.insert(condition);
        self
    }

    /// Replace the conditions.
    #[must_use]
    pub fn with_conditions(mut self, conditions: impl Into<ConditionSet>) -> Self {
        self.conditions = conditions.into();
        self
    }

    /// Set the threshold block.
    #[must_use]
    pub fn with_threshold(mut self, threshold: Threshold) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Set the reaction block.
    #[must_use]
    pub fn with_reaction(mut self, reaction: Reaction) -> Self {
        self.reaction = Some(reaction);
        self
    }

    /// Set the enumerated parameters block.
    #[must_use]
    pub fn with_enumerated_parameters(mut self, params: EnumeratedParameters) -> Self {
        self.enumerated_parameters = Some(params);
        self
    }

    /// Add an advanced condition.
    #[must_use]
    pub fn with_advanced_condition(mut self, condition: AdvancedCondition) -> Self {
        self.advanced_conditions.push(condition);
        self
    }

    /// Add an arbitrary condition.
    #[must_use]
    pub fn with_arbitrary_condition(mut self, condition: ArbitraryCondition) -> Self {
        self.arbitrary_conditions.push(condition);
        self
    }

    /// Set the mode.
    #[must_use]
    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    /// Set the attack type.
    #[must_use]
    pub fn with_attack_type(mut self, attack_type: impl Into<String>) -> Self {
        self.attack_type = Some(attack_type.into());
        self
    }

    /// Set the active flag.
    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Set the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the mitigation kind.
    #[must_use]
    pub fn with_mitigation(mut self, mitigation: impl Into<String>) -> Self {
        self.mitigation = Some(mitigation.into());
        self
    }

    /// Set the rule-set grouping.
    #[must_use]
    pub fn with_set(mut self, set: impl Into<String>) -> Self {
        self.set = Some(set.into());
        self
    }

    /// Set the comment.
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Set a type-specific field. Only names listed in
    /// [`EXTRA_RULE_FIELDS`] are sent.
    #[must_use]
    pub fn with_extra(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(field.into(), value.into());
        self
    }

    /// Whether the rule exists remotely as far as local state knows.
    #[must_use]
    pub const fn is_managed(&self) -> bool {
        self.identity.is_some()
    }

    /// Build the create payload. Empty blocks are omitted.
    #[must_use]
    pub fn to_create_request(&self) -> HintCreateRequest {
        HintCreateRequest {
            rule_type: self.rule_type.clone(),
            clientid: self.client_id,
            action: self.conditions.iter().map(encode_condition).collect(),
            point: self.point.clone(),
            validated: false,
            variativity_disabled: true,
            comment: self.comment.clone(),
            set: self.set.clone(),
            active: self.active,
            title: self.title.clone(),
            mitigation: self.mitigation.clone(),
            attack_type: self.attack_type.clone(),
            reaction: self.reaction.filter(|reaction| !reaction.is_empty()),
            threshold: self.threshold,
            enumerated_parameters: self.enumerated_parameters.clone(),
            advanced_conditions: self.advanced_conditions.clone(),
            arbitrary_conditions: self.arbitrary_conditions.clone(),
            mode: self.mode.clone(),
            extra: carried_fields(&self.extra),
        }
    }

    fn apply_remote(&mut self, hint: &HintBody) {
        match decode_point_location(&hint.point) {
            Ok(point) => self.point = point,
            Err(err) => warn!(
                rule_id = hint.id,
                error = %err,
                "Keeping local point, remote one is undecodable"
            ),
        }

        self.active = hint.active;
        self.title.clone_from(&hint.title);
        self.mitigation.clone_from(&hint.mitigation);
        self.set.clone_from(&hint.set);
        self.mode.clone_from(&hint.mode);
        self.attack_type.clone_from(&hint.attack_type);
        self.counter.clone_from(&hint.counter);
        self.threshold = hint.threshold;
        self.reaction = hint.reaction;
        self.enumerated_parameters.clone_from(&hint.enumerated_parameters);
        self.advanced_conditions = hint.advanced_conditions.clone().unwrap_or_default();
        self.arbitrary_conditions = hint.arbitrary_conditions.clone().unwrap_or_default();
        self.extra = carried_fields(&hint.extra);

        let decoded = hint.action.iter().filter_map(|details| {
            decode_condition(details)
                .map_err(|err| {
                    warn!(rule_id = hint.id, error = %err, "Skipping undecodable remote condition");
                })
                .ok()
        });
        self.conditions = ConditionSet::from(dedup(decoded));
    }
}

fn carried_fields(fields: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    fields
        .iter()
        .filter(|(field, value)| EXTRA_RULE_FIELDS.contains(&field.as_str()) && !value.is_null())
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect()
}

/// Result of a successful read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The rule exists remotely and local state was refreshed
    Found(RuleIdentity),
    /// The rule no longer exists remotely; local identity was cleared
    Gone,
}

/// Drives rules through create, read and delete against a [`RuleApi`].
#[derive(Debug)]
pub struct Reconciler<A> {
    api: A,
}

impl<A: RuleApi> Reconciler<A> {
    /// Create a reconciler over `api`.
    #[must_use]
    pub const fn new(api: A) -> Self {
        Self { api }
    }

    /// The underlying API.
    #[must_use]
    pub const fn api(&self) -> &A {
        &self.api
    }

    /// Submit `rule` and refresh it from the server's canonical record.
    ///
    /// # Errors
    ///
    /// Returns the transport error of the create or the follow-up read.
    pub async fn create(&self, rule: &mut Rule, cancel: &CancelToken) -> Result<ReadOutcome> {
        let request = rule.to_create_request();
        let hint = self.api.create_hint(&request, cancel).await?;

        let identity = RuleIdentity {
            client_id: if hint.clientid == 0 { rule.client_id } else { hint.clientid },
            action_id: hint.action_id,
            rule_id: hint.id,
        };
        info!(id = %identity, rule_type = %rule.rule_type, "Created rule");
        rule.identity = Some(identity);

        self.read(rule, cancel).await
    }

    /// Refresh `rule` from the server.
    ///
    /// A rule that is missing remotely loses its identity and yields
    /// [`ReadOutcome::Gone`]; that is not an error. An unmanaged rule is
    /// reported as gone without contacting the server.
    ///
    /// # Errors
    ///
    /// Returns the transport error of any page fetch.
    pub async fn read(&self, rule: &mut Rule, cancel: &CancelToken) -> Result<ReadOutcome> {
        let Some(mut identity) = rule.identity else {
            return Ok(ReadOutcome::Gone);
        };

        let Some(hint) = self.find_hint(&identity, cancel).await? else {
            info!(id = %identity, "Rule no longer exists remotely");
            rule.identity = None;
            return Ok(ReadOutcome::Gone);
        };

        if hint.action_id != 0 {
            identity.action_id = hint.action_id;
        }
        rule.apply_remote(&hint);
        rule.identity = Some(identity);
        debug!(id = %identity, "Refreshed rule");

        Ok(ReadOutcome::Found(identity))
    }

    /// Parse an import id, attach it to `rule` and read it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentity`] for a malformed id, otherwise the
    /// errors of [`Reconciler::read`].
    pub async fn import(
        &self,
        rule: &mut Rule,
        id: &str,
        cancel: &CancelToken,
    ) -> Result<ReadOutcome> {
        let identity: RuleIdentity = id.parse()?;
        rule.client_id = identity.client_id;
        rule.identity = Some(identity);
        self.read(rule, cancel).await
    }

    /// Delete `rule` remotely and clear its identity.
    ///
    /// When the owning action holds only this rule the whole action is
    /// removed, otherwise only the rule. A rule already gone counts as deleted.
    ///
    /// # Errors
    ///
    /// Returns any transport error other than HTTP 404.
    pub async fn delete(&self, rule: &mut Rule, cancel: &CancelToken) -> Result<()> {
        let Some(identity) = rule.identity else {
            debug!("Rule is not managed, nothing to delete");
            return Ok(());
        };

        let hint_type = if rule.rule_type.is_empty() {
            Vec::new()
        } else {
            vec![rule.rule_type.clone()]
        };
        let request = ActionReadRequest::new(ActionFilter {
            id: vec![identity.action_id],
            clientid: vec![identity.client_id],
            hint_type,
        });
        let actions = self.api.read_actions(&request, cancel).await?;

        let sole_rule = matches!(
            actions.as_slice(),
            [entry] if entry.hints == 1 && entry.grouped_hints_count == 1
        );

        let result = if sole_rule {
            debug!(id = %identity, "Deleting action holding a single rule");
            self.api.delete_action(identity.action_id, cancel).await
        } else {
            self.api
                .delete_hint(identity.client_id, identity.rule_id, cancel)
                .await
        };

        match result {
            Ok(()) => info!(id = %identity, "Deleted rule"),
            Err(err) if err.is_not_found() => info!(id = %identity, "Rule was already deleted"),
            Err(err) => return Err(err),
        }

        rule.identity = None;
        Ok(())
    }

    /// Replace the remote rule with the current declaration.
    ///
    /// # Errors
    ///
    /// Returns the first error of the delete or the create.
    pub async fn replace(&self, rule: &mut Rule, cancel: &CancelToken) -> Result<ReadOutcome> {
        self.delete(rule, cancel).await?;
        self.create(rule, cancel).await
    }

    async fn find_hint(
        &self,
        identity: &RuleIdentity,
        cancel: &CancelToken,
    ) -> Result<Option<HintBody>> {
        let mut request = HintReadRequest::new(HintFilter {
            clientid: vec![identity.client_id],
            id: vec![identity.rule_id],
            ..HintFilter::default()
        });

        loop {
            let page = self.api.read_hints(&request, cancel).await?;
            let page_len = page.len();

            if let Some(hint) = page.into_iter().find(|hint| hint.id == identity.rule_id) {
                return Ok(Some(hint));
            }
            if page_len < request.limit as usize {
                return Ok(None);
            }
            request = request.next_page();
        }
    }
}
