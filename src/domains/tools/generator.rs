//! Tool Generator: validated protocols to callable tools.
//!
//! Each endpoint becomes one [`GeneratedTool`]. Invoking it runs, in order:
//!
//! 1. argument validation against the compiled input schema
//! 2. credential resolution for the effective authentication
//! 3. the fixed-window rate limit of the effective rate limit
//! 4. request building, execution under the call timeout, status mapping
//!
//! Steps 1-3 short-circuit before any network traffic.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rmcp::handler::server::tool::schema_for_type;
use rmcp::model::{JsonObject, Tool};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

use super::credentials::{Credential, CredentialProvider};
use super::error::{ParameterViolation, ToolError};
use super::executor::{ExecutorError, HttpExecutor, HttpRequest};
use super::outcome::{InvocationResponse, ToolOutcome};
use super::rate_limiter::{RateDecision, RateLimiter};
use crate::domains::protocols::{
    ApiKeyLocation, Authentication, EndpointDefinition, ProtocolDefinition, ValidatedProtocol,
    generate_input_schema,
};

/// Default upper bound on one upstream call.
pub const DEFAULT_INVOCATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Collaborators shared by every generated tool.
#[derive(Clone)]
pub struct ToolContext {
    pub executor: Arc<dyn HttpExecutor>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub rate_limiter: Arc<RateLimiter>,
    pub invocation_timeout: Duration,
}

impl ToolContext {
    pub fn new(executor: Arc<dyn HttpExecutor>, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            executor,
            credentials,
            rate_limiter: Arc::new(RateLimiter::new()),
            invocation_timeout: DEFAULT_INVOCATION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.invocation_timeout = timeout;
        self
    }

    pub fn with_rate_limiter(mut self, rate_limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("invocation_timeout", &self.invocation_timeout)
            .finish_non_exhaustive()
    }
}

/// A callable tool compiled from one endpoint.
#[derive(Clone)]
pub struct GeneratedTool {
    name: String,
    description: String,
    input_schema: Arc<JsonObject>,
    invoker: Arc<Invoker>,
}

impl GeneratedTool {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_schema(&self) -> &Arc<JsonObject> {
        &self.input_schema
    }

    /// Name of the protocol this tool was compiled from.
    pub fn protocol(&self) -> &str {
        &self.invoker.protocol.name
    }

    /// Version of the protocol this tool was compiled from.
    pub fn protocol_version(&self) -> &str {
        &self.invoker.protocol.version
    }

    pub fn endpoint(&self) -> &EndpointDefinition {
        &self.invoker.endpoint
    }

    /// Invoke the tool. Every failure comes back as a [`ToolError`] value.
    pub async fn invoke(&self, arguments: Value) -> ToolOutcome {
        self.invoker.invoke(arguments).await
    }

    /// MCP metadata for this tool.
    pub fn to_tool(&self) -> Tool {
        Tool {
            name: self.name.clone().into(),
            description: Some(self.description.clone().into()),
            input_schema: self.input_schema.clone(),
            annotations: None,
            output_schema: Some(schema_for_type::<InvocationResponse>().into()),
            icons: None,
            meta: None,
            title: None,
        }
    }
}

impl std::fmt::Debug for GeneratedTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedTool")
            .field("name", &self.name)
            .field("protocol", &self.protocol())
            .finish_non_exhaustive()
    }
}

/// Compile every endpoint of `protocol` into a tool.
///
/// Only validated protocols are accepted. Name collisions with tools of
/// other protocols are checked when the tools are registered.
pub fn generate_tools(
    protocol: &ValidatedProtocol,
    context: &ToolContext,
) -> Result<Vec<GeneratedTool>, ToolError> {
    let definition = protocol.definition();
    definition
        .endpoints
        .iter()
        .map(|endpoint| generate_tool(definition, endpoint, context))
        .collect()
}

fn generate_tool(
    protocol: &Arc<ProtocolDefinition>,
    endpoint: &EndpointDefinition,
    context: &ToolContext,
) -> Result<GeneratedTool, ToolError> {
    let name = protocol.tool_name(endpoint);
    let schema = generate_input_schema(&endpoint.parameters);
    let validator = jsonschema::validator_for(&Value::Object(schema.clone()))
        .map_err(|e| ToolError::internal(format!("input schema of {name} does not compile: {e}")))?;

    debug!(tool = %name, "Generated tool");

    Ok(GeneratedTool {
        description: endpoint.description.clone(),
        input_schema: Arc::new(schema),
        invoker: Arc::new(Invoker {
            tool: name.clone(),
            protocol: protocol.clone(),
            endpoint: endpoint.clone(),
            validator,
            context: context.clone(),
        }),
        name,
    })
}

struct Invoker {
    tool: String,
    protocol: Arc<ProtocolDefinition>,
    endpoint: EndpointDefinition,
    validator: jsonschema::Validator,
    context: ToolContext,
}

impl Invoker {
    #[instrument(skip_all, fields(tool = %self.tool))]
    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let outcome = self.run(arguments).await;
        match &outcome {
            Ok(response) => debug!(status = response.status, "Tool call completed"),
            Err(error) => warn!(kind = error.kind(), "Tool call failed: {}", error),
        }
        outcome
    }

    async fn run(&self, arguments: Value) -> ToolOutcome {
        let arguments = self.validate(arguments)?;

        let credential = match self.protocol.effective_authentication(&self.endpoint) {
            Some(auth) => Some((auth, self.resolve_credential(auth).await?)),
            None => None,
        };

        if let Some(limit) = self.protocol.effective_rate_limit(&self.endpoint)
            && let RateDecision::Limited { retry_after } =
                self.context
                    .rate_limiter
                    .check(&self.protocol.name, &self.endpoint.name, limit)
        {
            return Err(ToolError::RateLimitExceeded {
                tool: self.tool.clone(),
                limit: limit.requests,
                window: limit.window,
                retry_after,
            });
        }

        let request = build_request(&self.endpoint, arguments, credential)
            .map_err(|e| ToolError::invocation(&self.tool, e))?;

        let timeout = self.context.invocation_timeout;
        let response = tokio::time::timeout(timeout, self.context.executor.execute(request))
            .await
            .map_err(|_| self.timed_out())?
            .map_err(|e| match e {
                ExecutorError::Timeout => self.timed_out(),
                other => ToolError::invocation(&self.tool, other.to_string()),
            })?;

        if response.status >= 400 {
            return Err(ToolError::Invocation {
                tool: self.tool.clone(),
                message: format!("upstream returned HTTP {}", response.status),
                status: Some(response.status),
                body: Some(response.body),
            });
        }

        Ok(InvocationResponse {
            status: response.status,
            body: response.body,
        })
    }

    /// Check arguments against the schema and fill declared defaults.
    fn validate(&self, arguments: Value) -> Result<Map<String, Value>, ToolError> {
        let arguments = match arguments {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };

        let violations: Vec<ParameterViolation> = self
            .validator
            .iter_errors(&arguments)
            .map(|e| ParameterViolation {
                instance_path: e.instance_path.to_string(),
                message: e.to_string(),
            })
            .collect();

        if !violations.is_empty() {
            return Err(ToolError::ParameterValidation {
                tool: self.tool.clone(),
                violations,
            });
        }

        let Value::Object(mut arguments) = arguments else {
            return Err(ToolError::internal("validated arguments are not an object"));
        };
        for param in &self.endpoint.parameters {
            if let Some(default) = &param.default
                && !arguments.contains_key(&param.name)
            {
                arguments.insert(param.name.clone(), default.clone());
            }
        }
        Ok(arguments)
    }

    async fn resolve_credential(&self, auth: &Authentication) -> Result<Credential, ToolError> {
        self.context
            .credentials
            .credential(&self.protocol.name, auth)
            .await
            .ok_or_else(|| ToolError::MissingCredential {
                protocol: self.protocol.name.clone(),
                scheme: auth.scheme(),
            })
    }

    fn timed_out(&self) -> ToolError {
        ToolError::Timeout {
            tool: self.tool.clone(),
            after: self.context.invocation_timeout,
        }
    }
}

/// Turn validated arguments into an upstream request.
///
/// Placeholder arguments are percent-encoded into the path. The rest go to
/// the query string for GET and DELETE and to a JSON body otherwise.
fn build_request(
    endpoint: &EndpointDefinition,
    mut arguments: Map<String, Value>,
    credential: Option<(&Authentication, Credential)>,
) -> Result<HttpRequest, String> {
    let mut path = endpoint.path.clone();
    for placeholder in endpoint.placeholders() {
        let value = arguments
            .remove(&placeholder)
            .ok_or_else(|| format!("missing path parameter '{placeholder}'"))?;
        let encoded = urlencoding::encode(&scalar_text(&value)).into_owned();
        path = path.replace(&format!("{{{placeholder}}}"), &encoded);
    }

    let mut url = Url::parse(&path).map_err(|e| format!("invalid request URL: {e}"))?;
    let mut query: Vec<(String, String)> = Vec::new();
    let mut headers = vec![("Accept".to_string(), "application/json".to_string())];

    let body = if endpoint.method.has_body() {
        (!arguments.is_empty()).then(|| Value::Object(arguments))
    } else {
        for (name, value) in arguments {
            match value {
                Value::Array(items) => {
                    query.extend(items.iter().map(|item| (name.clone(), scalar_text(item))));
                }
                other => query.push((name, scalar_text(&other))),
            }
        }
        None
    };

    if let Some((auth, credential)) = credential {
        match (auth, credential) {
            (Authentication::ApiKey { location, name }, Credential::ApiKey(key)) => match location {
                ApiKeyLocation::Header => headers.push((name.clone(), key)),
                ApiKeyLocation::Query => query.push((name.clone(), key)),
                ApiKeyLocation::Cookie => headers.push(("Cookie".to_string(), format!("{name}={key}"))),
            },
            (Authentication::BearerToken, Credential::Bearer(token))
            | (Authentication::OAuth2 { .. }, Credential::OAuth2AccessToken(token)) => {
                headers.push(("Authorization".to_string(), format!("Bearer {token}")));
            }
            (Authentication::Basic, Credential::Basic { username, password }) => {
                let encoded = STANDARD.encode(format!("{username}:{password}"));
                headers.push(("Authorization".to_string(), format!("Basic {encoded}")));
            }
            (auth, _) => {
                return Err(format!("credential does not fit the {} scheme", auth.scheme()));
            }
        }
    }

    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }

    Ok(HttpRequest {
        method: endpoint.method,
        url,
        headers,
        body,
    })
}

/// Text form of an argument for paths and query strings.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::protocols::ProtocolValidator;
    use crate::domains::protocols::validator::fixtures::weather;
    use crate::domains::tools::credentials::StaticCredentialProvider;
    use crate::domains::tools::executor::mock::MockExecutor;
    use serde_json::json;

    fn validated(raw: Value) -> ValidatedProtocol {
        ProtocolValidator::default().validate_protocol(&raw).unwrap().0
    }

    fn context(executor: Arc<MockExecutor>, credentials: StaticCredentialProvider) -> ToolContext {
        ToolContext::new(executor, Arc::new(credentials))
    }

    fn single_tool(raw: Value, executor: Arc<MockExecutor>, creds: StaticCredentialProvider) -> GeneratedTool {
        let mut tools = generate_tools(&validated(raw), &context(executor, creds)).unwrap();
        assert_eq!(tools.len(), 1);
        tools.remove(0)
    }

    fn with_api_key(mut raw: Value) -> Value {
        raw["authentication"] = json!({ "type": "api_key", "location": "header", "name": "X-Api-Key" });
        raw
    }

    #[test]
    fn test_weather_tool_metadata() {
        let tool = single_tool(weather(), Arc::new(MockExecutor::ok(200, json!({}))), Default::default());
        assert_eq!(tool.name(), "weatherApi_getCurrent");
        assert_eq!(tool.protocol(), "weather-api");
        assert_eq!(tool.input_schema()["required"], json!(["city"]));
        assert_eq!(tool.input_schema()["properties"]["city"]["type"], "string");

        let mcp = tool.to_tool();
        assert_eq!(mcp.name, "weatherApi_getCurrent");
        assert!(mcp.output_schema.is_some());
    }

    #[tokio::test]
    async fn test_wrong_type_fails_without_network_call() {
        let executor = Arc::new(MockExecutor::ok(200, json!({})));
        let tool = single_tool(weather(), executor.clone(), Default::default());

        let error = tool.invoke(json!({ "city": 123 })).await.unwrap_err();
        match error {
            ToolError::ParameterValidation { violations, .. } => {
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].instance_path, "/city");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(executor.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_and_unknown_arguments_rejected() {
        let executor = Arc::new(MockExecutor::ok(200, json!({})));
        let tool = single_tool(weather(), executor.clone(), Default::default());

        assert!(matches!(
            tool.invoke(Value::Null).await,
            Err(ToolError::ParameterValidation { .. })
        ));
        assert!(matches!(
            tool.invoke(json!({ "city": "Paris", "units": "si" })).await,
            Err(ToolError::ParameterValidation { .. })
        ));
        assert_eq!(executor.calls(), 0);
    }

    #[tokio::test]
    async fn test_successful_call_builds_query_and_injects_key() {
        let executor = Arc::new(MockExecutor::ok(200, json!({ "temp": 21 })));
        let creds = StaticCredentialProvider::new().with("weather-api", Credential::ApiKey("k-1".into()));
        let tool = single_tool(with_api_key(weather()), executor.clone(), creds);

        let response = tool.invoke(json!({ "city": "São Paulo" })).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body["temp"], 21);

        let request = executor.last().unwrap();
        assert_eq!(request.url.path(), "/current");
        let pairs: Vec<(String, String)> = request.url.query_pairs().into_owned().collect();
        assert_eq!(pairs, vec![("city".to_string(), "São Paulo".to_string())]);
        assert_eq!(request.header("X-Api-Key"), Some("k-1"));
        assert!(request.body.is_none());
    }

    #[tokio::test]
    async fn test_missing_credential_short_circuits() {
        let executor = Arc::new(MockExecutor::ok(200, json!({})));
        let tool = single_tool(with_api_key(weather()), executor.clone(), Default::default());

        let error = tool.invoke(json!({ "city": "Oslo" })).await.unwrap_err();
        assert_eq!(
            error,
            ToolError::MissingCredential {
                protocol: "weather-api".to_string(),
                scheme: "api_key"
            }
        );
        assert_eq!(executor.calls(), 0);
    }

    #[tokio::test]
    async fn test_endpoint_can_opt_out_of_authentication() {
        let executor = Arc::new(MockExecutor::ok(200, json!({})));
        let mut raw = with_api_key(weather());
        raw["endpoints"][0]["authentication"] = json!(false);
        let tool = single_tool(raw, executor.clone(), Default::default());

        assert!(tool.invoke(json!({ "city": "Oslo" })).await.is_ok());
        assert_eq!(executor.last().unwrap().header("X-Api-Key"), None);
    }

    #[tokio::test]
    async fn test_rate_limit_short_circuits() {
        let executor = Arc::new(MockExecutor::ok(200, json!({})));
        let mut raw = weather();
        raw["rateLimit"] = json!({ "requests": 1, "window": "1m" });
        let tool = single_tool(raw, executor.clone(), Default::default());

        assert!(tool.invoke(json!({ "city": "Oslo" })).await.is_ok());
        let error = tool.invoke(json!({ "city": "Oslo" })).await.unwrap_err();
        assert!(matches!(error, ToolError::RateLimitExceeded { limit: 1, .. }));
        assert_eq!(executor.calls(), 1);
    }

    #[tokio::test]
    async fn test_path_placeholders_and_json_body() {
        let executor = Arc::new(MockExecutor::ok(201, json!({ "id": 7 })));
        let mut raw = weather();
        raw["endpoints"] = json!([{
            "name": "addNote",
            "method": "POST",
            "path": "https://api.weather.example/stations/{station}/notes",
            "description": "Add a note",
            "parameters": [
                { "name": "station", "type": "string", "description": "Station", "required": true },
                { "name": "text", "type": "string", "description": "Text", "required": true },
                { "name": "lang", "type": "string", "description": "Lang", "default": "en" }
            ]
        }]);
        let tool = single_tool(raw, executor.clone(), Default::default());

        let response = tool
            .invoke(json!({ "station": "north/1 a", "text": "windy" }))
            .await
            .unwrap();
        assert_eq!(response.status, 201);

        let request = executor.last().unwrap();
        assert_eq!(
            request.url.as_str(),
            "https://api.weather.example/stations/north%2F1%20a/notes"
        );
        assert_eq!(request.body, Some(json!({ "text": "windy", "lang": "en" })));
    }

    #[tokio::test]
    async fn test_basic_and_bearer_injection() {
        let executor = Arc::new(MockExecutor::ok(200, json!({})));
        let mut raw = weather();
        raw["authentication"] = json!({ "type": "basic" });
        let creds = StaticCredentialProvider::new().with(
            "weather-api",
            Credential::Basic {
                username: "user".into(),
                password: "pass".into(),
            },
        );
        let tool = single_tool(raw, executor.clone(), creds);
        tool.invoke(json!({ "city": "Oslo" })).await.unwrap();
        assert_eq!(
            executor.last().unwrap().header("authorization"),
            Some("Basic dXNlcjpwYXNz")
        );

        let executor = Arc::new(MockExecutor::ok(200, json!({})));
        let mut raw = weather();
        raw["authentication"] = json!({ "type": "oauth2", "tokenUrl": "https://auth.weather.example/token" });
        let creds = StaticCredentialProvider::new()
            .with("weather-api", Credential::OAuth2AccessToken("at-9".into()));
        let tool = single_tool(raw, executor.clone(), creds);
        tool.invoke(json!({ "city": "Oslo" })).await.unwrap();
        assert_eq!(
            executor.last().unwrap().header("Authorization"),
            Some("Bearer at-9")
        );
    }

    #[tokio::test]
    async fn test_error_status_becomes_invocation_error() {
        let executor = Arc::new(MockExecutor::ok(503, json!({ "detail": "maintenance" })));
        let tool = single_tool(weather(), executor, Default::default());

        match tool.invoke(json!({ "city": "Oslo" })).await {
            Err(ToolError::Invocation { status, body, .. }) => {
                assert_eq!(status, Some(503));
                assert_eq!(body.unwrap()["detail"], "maintenance");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transport_failures_are_values() {
        let executor = Arc::new(MockExecutor::failing(ExecutorError::Request("connection refused".into())));
        let tool = single_tool(weather(), executor, Default::default());
        let error = tool.invoke(json!({ "city": "Oslo" })).await.unwrap_err();
        assert_eq!(error.kind(), "invocation_failed");
    }

    #[tokio::test]
    async fn test_slow_upstream_times_out() {
        let executor = Arc::new(MockExecutor::ok(200, json!({})).delayed(Duration::from_millis(500)));
        let ctx = context(executor, Default::default()).with_timeout(Duration::from_millis(20));
        let tools = generate_tools(&validated(weather()), &ctx).unwrap();

        let error = tools[0].invoke(json!({ "city": "Oslo" })).await.unwrap_err();
        assert!(matches!(error, ToolError::Timeout { .. }));
    }
}
