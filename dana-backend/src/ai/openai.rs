use crate::ai::Message;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Minimal client for OpenAI-compatible chat completion endpoints
#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct OpenAICompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OpenAICompletionResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}

impl OpenAIClient {
    pub fn new(api_key: &str, endpoint: &str, model: &str) -> Result<Self, String> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        if !api_key.is_empty() {
            let auth_value = header::HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| format!("Invalid API key format: {}", e))?;
            headers.insert(header::AUTHORIZATION, auth_value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            max_tokens: 1500,
        })
    }

    pub async fn generate_text(&self, messages: &[Message]) -> Result<String, String> {
        let request = OpenAICompletionRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            temperature: 0.3,
        };

        log::info!("[OPENAI] Sending request to {} with model {}", self.endpoint, self.model);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("LLM request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();

            if let Ok(error_response) = serde_json::from_str::<OpenAIErrorResponse>(&error_text) {
                return Err(format!("LLM API error: {}", error_response.error.message));
            }

            return Err(format!("LLM API returned error status: {}, body: {}", status, error_text));
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| format!("Failed to read LLM response: {}", e))?;

        log::debug!("[OPENAI] Raw response:\n{}", response_text);

        parse_completion(&response_text)
    }
}

fn parse_completion(body: &str) -> Result<String, String> {
    let response_data: OpenAICompletionResponse = serde_json::from_str(body)
        .map_err(|e| format!("Failed to parse LLM response: {}", e))?;

    response_data
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| "LLM API returned no content".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_completion() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"A summary."},"finish_reason":"stop"}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "A summary.");

        assert!(parse_completion(r#"{"choices":[]}"#).is_err());
        assert!(parse_completion(r#"{"choices":[{"message":{"content":null}}]}"#).is_err());
        assert!(parse_completion("not json").is_err());
    }

    #[test]
    fn test_request_shape() {
        let messages = vec![Message::system("sys"), Message::user("hi")];
        let request = OpenAICompletionRequest { model: "gpt-4o", messages: &messages, max_tokens: 10, temperature: 0.3 };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["max_tokens"], 10);
    }
}
