//! Asynchronous client for the rule (hint) and action endpoints.

use crate::models::{
    ActionEntry, ActionReadRequest, ApiResponse, HintBody, HintCreateRequest, HintDeleteRequest,
    HintReadRequest,
};
use crate::Result;
use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use url::Url;
use wallarm_core::{ApiClient, ApiClientConfig, CancelToken, ClientOptions, Payload, ResourceKind};

const HINT_CREATE_PATH: &str = "/v1/objects/hint/create";
const HINT_READ_PATH: &str = "/v1/objects/hint";
const HINT_DELETE_PATH: &str = "/v1/objects/hint/delete";
const ACTION_READ_PATH: &str = "/v1/objects/action";

/// Rule endpoints consumed by the reconciler.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RuleApi: Send + Sync {
    /// Create a rule and return the server's record of it.
    async fn create_hint(
        &self,
        request: &HintCreateRequest,
        cancel: &CancelToken,
    ) -> Result<HintBody>;

    /// Fetch one page of rules.
    async fn read_hints(
        &self,
        request: &HintReadRequest,
        cancel: &CancelToken,
    ) -> Result<Vec<HintBody>>;

    /// Delete a single rule.
    async fn delete_hint(&self, client_id: i64, rule_id: i64, cancel: &CancelToken)
        -> Result<()>;

    /// Fetch one page of actions.
    async fn read_actions(
        &self,
        request: &ActionReadRequest,
        cancel: &CancelToken,
    ) -> Result<Vec<ActionEntry>>;

    /// Delete an action together with every rule attached to it.
    async fn delete_action(&self, action_id: i64, cancel: &CancelToken) -> Result<()>;
}

/// HTTP implementation of [`RuleApi`].
#[derive(Debug)]
pub struct RulesClient {
    inner: ApiClient,
}

impl RulesClient {
    /// Build a client from runtime options.
    pub fn new(options: ClientOptions) -> Result<Self> {
        Ok(Self {
            inner: ApiClient::new(options)?,
        })
    }

    /// Build a client from a validated configuration.
    pub fn from_config(config: ApiClientConfig) -> Result<Self> {
        Self::new(config.into_options()?)
    }

    /// Wrap an existing transport.
    #[must_use]
    pub const fn from_api_client(inner: ApiClient) -> Self {
        Self { inner }
    }

    /// Return the base URL.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        self.inner.base_url()
    }

    /// Underlying transport.
    #[must_use]
    pub const fn api_client(&self) -> &ApiClient {
        &self.inner
    }

    async fn send_json<B, R>(
        &self,
        method: Method,
        path: &str,
        kind: ResourceKind,
        body: &B,
        cancel: &CancelToken,
    ) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let payload = Payload::json(body)?;
        let bytes = self
            .inner
            .execute(method, path, &kind, &payload, cancel)
            .await?;
        let envelope: ApiResponse<R> = serde_json::from_slice(&bytes)?;
        Ok(envelope.body)
    }
}

#[async_trait]
impl RuleApi for RulesClient {
    async fn create_hint(
        &self,
        request: &HintCreateRequest,
        cancel: &CancelToken,
    ) -> Result<HintBody> {
        debug!(client_id = request.clientid, rule_type = %request.rule_type, "Creating rule");
        self.send_json(
            Method::POST,
            HINT_CREATE_PATH,
            ResourceKind::Rule,
            request,
            cancel,
        )
        .await
    }

    async fn read_hints(
        &self,
        request: &HintReadRequest,
        cancel: &CancelToken,
    ) -> Result<Vec<HintBody>> {
        let hints: Option<Vec<HintBody>> = self
            .send_json(
                Method::POST,
                HINT_READ_PATH,
                ResourceKind::Hint,
                request,
                cancel,
            )
            .await?;
        Ok(hints.unwrap_or_default())
    }

    async fn delete_hint(
        &self,
        client_id: i64,
        rule_id: i64,
        cancel: &CancelToken,
    ) -> Result<()> {
        let payload = Payload::json(&HintDeleteRequest::new(client_id, rule_id))?;
        self.inner
            .execute(
                Method::POST,
                HINT_DELETE_PATH,
                &ResourceKind::Hint,
                &payload,
                cancel,
            )
            .await
            .map(|_| ())
    }

    async fn read_actions(
        &self,
        request: &ActionReadRequest,
        cancel: &CancelToken,
    ) -> Result<Vec<ActionEntry>> {
        let actions: Option<Vec<ActionEntry>> = self
            .send_json(
                Method::POST,
                ACTION_READ_PATH,
                ResourceKind::Rule,
                request,
                cancel,
            )
            .await?;
        Ok(actions.unwrap_or_default())
    }

    async fn delete_action(&self, action_id: i64, cancel: &CancelToken) -> Result<()> {
        let path = format!("/v2/action/{action_id}");
        self.inner
            .execute(
                Method::DELETE,
                &path,
                &ResourceKind::Rule,
                &Payload::Empty,
                cancel,
            )
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActionFilter, HintFilter};
    use serde_json::json;
    use wallarm_core::{Error, RetryPolicy};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> RulesClient {
        let options = ClientOptions::new()
            .with_base_url(Url::parse(&server.uri()).unwrap())
            .with_retry_policy(RetryPolicy::no_retry());
        RulesClient::new(options).unwrap()
    }

    fn create_request() -> HintCreateRequest {
        HintCreateRequest {
            rule_type: "vpatch".into(),
            clientid: 7,
            action: vec![],
            point: vec![],
            validated: false,
            variativity_disabled: true,
            comment: None,
            set: None,
            active: true,
            title: None,
            mitigation: None,
            attack_type: Some("sqli".into()),
            reaction: None,
            threshold: None,
            enumerated_parameters: None,
            advanced_conditions: vec![],
            arbitrary_conditions: vec![],
            mode: None,
            extra: std::collections::BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn create_hint_returns_server_record() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/objects/hint/create"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({
                "type": "vpatch",
                "clientid": 7,
                "action": [],
                "validated": false,
                "variativity_disabled": true,
                "active": true,
                "attack_type": "sqli"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": 200,
                "body": {"id": 42, "action_id": 3, "clientid": 7, "type": "vpatch"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let hint = test_client(&server)
            .create_hint(&create_request(), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!((hint.clientid, hint.action_id, hint.id), (7, 3, 42));
    }

    #[tokio::test]
    async fn read_hints_tolerates_null_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/objects/hint"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"status": 200, "body": null})),
            )
            .mount(&server)
            .await;

        let request = HintReadRequest::new(HintFilter {
            clientid: vec![7],
            ..HintFilter::default()
        });
        let hints = test_client(&server)
            .read_hints(&request, &CancelToken::new())
            .await
            .unwrap();
        assert!(hints.is_empty());
    }

    #[tokio::test]
    async fn read_hints_malformed_json_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/objects/hint"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
            .mount(&server)
            .await;

        let request = HintReadRequest::new(HintFilter::default());
        let err = test_client(&server)
            .read_hints(&request, &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[tokio::test]
    async fn delete_hint_sends_filter() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/objects/hint/delete"))
            .and(body_json(json!({"filter": {"clientid": [7], "id": 42}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": 200})))
            .expect(1)
            .mount(&server)
            .await;

        test_client(&server)
            .delete_hint(7, 42, &CancelToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn read_actions_parses_counts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/objects/action"))
            .and(body_json(json!({
                "filter": {"id": [3], "clientid": [7]},
                "limit": 1000,
                "offset": 0
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": 200,
                "body": [{"id": 3, "clientid": 7, "hints": 2, "grouped_hints_count": 2, "conditions": []}]
            })))
            .mount(&server)
            .await;

        let request = ActionReadRequest::new(ActionFilter {
            id: vec![3],
            clientid: vec![7],
            hint_type: vec![],
        });
        let actions = test_client(&server)
            .read_actions(&request, &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].hints, 2);
    }

    #[tokio::test]
    async fn delete_action_not_found_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v2/action/3"))
            .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
            .mount(&server)
            .await;

        let err = test_client(&server)
            .delete_action(3, &CancelToken::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.body(), Some("missing"));
    }
}
