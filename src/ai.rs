use crate::error::EndpointError;
use crate::settings::Settings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// Function-call contract a step hands to the model, with enumerations of
// the currently legal choices baked into `parameters`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub tool: ToolSchema,
    pub reasoning_effort: Option<&'static str>,
}

// The only part of a completion the engine cares about: the first tool
// call's raw argument string, when the model produced one.
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub arguments: Option<String>,
}

#[async_trait]
pub trait ModelEndpoint: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, EndpointError>;
}

// OpenAI-compatible chat-completions client.
pub struct HttpEndpoint {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl HttpEndpoint {
    pub fn new(settings: &Settings) -> Result<Self, EndpointError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(HttpEndpoint {
            client,
            endpoint: settings.endpoint.clone(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
        })
    }

    fn body(&self, request: &ChatRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": request.messages,
            "tools": [{ "type": "function", "function": request.tool }],
            "tool_choice": "required",
        });
        if let Some(effort) = request.reasoning_effort {
            body["reasoning_effort"] = json!(effort);
        }
        body
    }
}

#[async_trait]
impl ModelEndpoint for HttpEndpoint {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, EndpointError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.body(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EndpointError::Status(status.as_u16()));
        }

        let payload: ApiResponse = response.json().await?;

        if let Some(error) = payload.error {
            let message = if error.message.is_empty() {
                "The LLM returned an error.".to_string()
            } else {
                error.message
            };
            return Err(EndpointError::Api(message));
        }

        let arguments = payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.tool_calls.into_iter().next())
            .and_then(|call| call.function.arguments);

        Ok(ChatResponse { arguments })
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    #[serde(default)]
    message: ApiMessage,
}

#[derive(Debug, Deserialize, Default)]
struct ApiMessage {
    #[serde(default)]
    tool_calls: Vec<ApiToolCall>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCall {
    #[serde(default)]
    function: ApiFunction,
}

#[derive(Debug, Deserialize, Default)]
struct ApiFunction {
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}
