//! Result of invoking a generated tool.

use rmcp::model::{CallToolResult, Content};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ToolError;

/// Successful upstream answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InvocationResponse {
    /// HTTP status returned by the upstream API.
    pub status: u16,

    /// Response body; JSON when the upstream sent JSON, a string otherwise.
    pub body: Value,
}

/// What a generated tool hands back. Failures are values, never panics.
pub type ToolOutcome = Result<InvocationResponse, ToolError>;

/// Render an outcome for the MCP surface.
pub fn to_call_result(outcome: ToolOutcome) -> CallToolResult {
    match outcome {
        Ok(response) => {
            let text = serde_json::to_string_pretty(&response.body)
                .unwrap_or_else(|_| response.body.to_string());
            CallToolResult {
                content: vec![Content::text(text)],
                structured_content: serde_json::to_value(&response).ok(),
                is_error: Some(false),
                meta: None,
            }
        }
        Err(error) => CallToolResult {
            content: vec![Content::text(error.to_string())],
            structured_content: Some(error.payload()),
            is_error: Some(true),
            meta: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_carries_structured_response() {
        let result = to_call_result(Ok(InvocationResponse {
            status: 200,
            body: json!({ "temp": 21 }),
        }));
        assert_eq!(result.is_error, Some(false));
        let structured = result.structured_content.unwrap();
        assert_eq!(structured["status"], 200);
        assert_eq!(structured["body"]["temp"], 21);
    }

    #[test]
    fn test_failure_is_flagged() {
        let result = to_call_result(Err(ToolError::not_found("nope_tool")));
        assert_eq!(result.is_error, Some(true));
        assert_eq!(result.structured_content.unwrap()["error"], "not_found");
    }
}
