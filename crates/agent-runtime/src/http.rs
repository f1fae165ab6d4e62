//! Shared HTTP plumbing for hosted providers

use agent_core::error::{AgentError, Result};
use agent_core::provider::ModelInfo;
use serde_json::Value;

/// Send a request and decode a JSON body, mapping failures to agent errors.
///
/// Network failures, rate limits and 5xx are `ProviderUnavailable`; other
/// non-success statuses are `Provider` errors carrying the response body.
pub(crate) async fn send_json(provider: &str, request: reqwest::RequestBuilder) -> Result<Value> {
    let response = request
        .send()
        .await
        .map_err(|e| AgentError::ProviderUnavailable(format!("{}: {}", provider, e)))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = format!("{} API error {}: {}", provider, status.as_u16(), body.trim());
        return Err(if status.as_u16() == 429 || status.is_server_error() {
            AgentError::ProviderUnavailable(message)
        } else {
            AgentError::Provider(message)
        });
    }

    response
        .json()
        .await
        .map_err(|e| AgentError::Provider(format!("{}: invalid response body: {}", provider, e)))
}

/// `{"data": [{"id": ...}, ...]}` → model list
pub(crate) fn model_list(body: &Value) -> Vec<ModelInfo> {
    body["data"]
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|m| {
                    let id = m["id"].as_str()?.to_string();
                    let name = m["display_name"].as_str().map_or_else(|| id.clone(), String::from);
                    Some(ModelInfo { id, name })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_model_list() {
        let models = model_list(&json!({
            "data": [
                {"id": "gpt-4.1"},
                {"id": "claude-sonnet-4-0", "display_name": "Claude Sonnet 4"},
                {"object": "junk"}
            ]
        }));
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].name, "gpt-4.1");
        assert_eq!(models[1].name, "Claude Sonnet 4");
    }
}
