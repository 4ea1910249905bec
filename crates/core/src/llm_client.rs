use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionNamedToolChoice, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionTool, ChatCompletionToolChoiceOption, ChatCompletionToolType,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
        CreateChatCompletionResponse, FunctionName,
    },
};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::time::Duration;
use tracing::warn;

/// Failure modes of the model completion capability.
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("model provider request failed: {0}")]
    Api(#[from] OpenAIError),
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
    #[error("model returned an empty response")]
    EmptyResponse,
    #[error("model returned malformed tool arguments: {0}")]
    MalformedToolCall(String),
    #[error("invalid completion request: {0}")]
    Request(String),
}

/// Represents the events that can be yielded from a streaming text response.
#[derive(Debug, Clone)]
pub enum LLMStreamEvent {
    TextChunk(String),
}

/// A stream of text chunks from the LLM.
pub type LLMStream = Pin<Box<dyn Stream<Item = Result<LLMStreamEvent, OpenAIError>> + Send>>;

/// A generic client for interacting with an LLM.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Makes a single, non-streaming call and returns the reply text.
    async fn complete(
        &self,
        system_prompt: String,
        history: Vec<ChatCompletionRequestMessage>,
    ) -> Result<String, LLMError>;

    /// Makes a streaming call and returns the chunked reply.
    async fn complete_stream(
        &self,
        system_prompt: String,
        history: Vec<ChatCompletionRequestMessage>,
    ) -> Result<LLMStream, LLMError>;

    /// Makes a completion call with tool choice forced to the given tool and
    /// returns the parsed tool-call arguments.
    async fn extract(
        &self,
        instructions: String,
        payload: String,
        tool: ChatCompletionTool,
    ) -> Result<serde_json::Value, LLMError>;
}

/// Bounded exponential backoff for model calls.
///
/// The default policy makes a single attempt: retries are opt-in, configured
/// by the service at startup.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub backoff_factor: f64,
    pub max_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_interval: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_interval: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait before retrying after the given 1-based attempt, or
    /// `None` once attempts are exhausted.
    pub fn delay_before_retry(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = self
            .initial_interval
            .mul_f64(self.backoff_factor.powi(exponent));
        Some(delay.min(self.max_interval))
    }
}

/// An implementation of `LLMClient` for any OpenAI-compatible API.
pub struct OpenAICompatibleClient {
    client: Client<OpenAIConfig>,
    model: String,
    retry: RetryPolicy,
    timeout: Option<Duration>,
}

impl OpenAICompatibleClient {
    /// Creates a new client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the OpenAI client, including API key and base URL.
    /// * `model` - The specific model identifier to use for chat completions (e.g., "gpt-4o").
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
            retry: RetryPolicy::default(),
            timeout: None,
        }
    }

    /// Replaces the retry policy for non-streaming calls.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Imposes a per-call timeout, surfaced as [`LLMError::Timeout`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sends a completion request, applying the timeout and retry policy.
    async fn send(
        &self,
        request: CreateChatCompletionRequest,
    ) -> Result<CreateChatCompletionResponse, LLMError> {
        let mut attempt = 1;
        loop {
            let chat = self.client.chat();
            let call = chat.create(request.clone());
            let result = match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(inner) => inner.map_err(LLMError::Api),
                    Err(_) => Err(LLMError::Timeout(limit)),
                },
                None => call.await.map_err(LLMError::Api),
            };

            match result {
                Ok(response) => return Ok(response),
                Err(err) => match self.retry.delay_before_retry(attempt) {
                    Some(delay) => {
                        warn!(attempt, error = %err, "Model call failed. Retrying after backoff...");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(err),
                },
            }
        }
    }
}

fn request_messages(
    system_prompt: String,
    history: Vec<ChatCompletionRequestMessage>,
) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
    let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(history.len() + 1);
    messages.push(
        ChatCompletionRequestSystemMessageArgs::default()
            .content(system_prompt)
            .build()?
            .into(),
    );
    messages.extend(history);
    Ok(messages)
}

#[async_trait]
impl LLMClient for OpenAICompatibleClient {
    async fn complete(
        &self,
        system_prompt: String,
        history: Vec<ChatCompletionRequestMessage>,
    ) -> Result<String, LLMError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(request_messages(system_prompt, history)?)
            .build()?;

        let response = self.send(request).await?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or(LLMError::EmptyResponse)?;

        choice
            .message
            .content
            .filter(|content| !content.is_empty())
            .ok_or(LLMError::EmptyResponse)
    }

    async fn complete_stream(
        &self,
        system_prompt: String,
        history: Vec<ChatCompletionRequestMessage>,
    ) -> Result<LLMStream, LLMError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(request_messages(system_prompt, history)?)
            .stream(true)
            .build()?;

        // An in-flight stream is never retried.
        let stream = self.client.chat().create_stream(request).await?;

        Ok(Box::pin(stream.filter_map(|result| async {
            match result {
                Ok(response) => {
                    let content = response.choices.first()?.delta.content.as_ref()?;
                    if content.is_empty() {
                        None
                    } else {
                        Some(Ok(LLMStreamEvent::TextChunk(content.clone())))
                    }
                }
                Err(e) => Some(Err(e)),
            }
        })))
    }

    async fn extract(
        &self,
        instructions: String,
        payload: String,
        tool: ChatCompletionTool,
    ) -> Result<serde_json::Value, LLMError> {
        let function_name = tool.function.name.clone();
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(instructions)
                    .build()?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(payload)
                    .build()?
                    .into(),
            ])
            .tools(vec![tool])
            .tool_choice(ChatCompletionToolChoiceOption::Named(
                ChatCompletionNamedToolChoice {
                    r#type: ChatCompletionToolType::Function,
                    function: FunctionName {
                        name: function_name,
                    },
                },
            ))
            .build()?;

        let response = self.send(request).await?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or(LLMError::EmptyResponse)?;

        let call = choice
            .message
            .tool_calls
            .and_then(|mut calls| (!calls.is_empty()).then(|| calls.remove(0)))
            .ok_or(LLMError::EmptyResponse)?;

        serde_json::from_str(&call.function.arguments)
            .map_err(|e| LLMError::MalformedToolCall(e.to_string()))
    }
}

/// A deterministic `LLMClient` for development and integration testing.
///
/// This implementation provides predictable output, which is useful for
/// testing scenarios without external dependencies or API costs.
pub struct MockLLMClient {
    reply: String,
    slide: Option<serde_json::Value>,
}

impl MockLLMClient {
    /// Creates a mock that answers every completion with `reply`.
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            slide: None,
        }
    }

    /// Makes `extract` return the given tool arguments instead of failing.
    pub fn with_slide(mut self, slide: serde_json::Value) -> Self {
        self.slide = Some(slide);
        self
    }
}

#[async_trait]
impl LLMClient for MockLLMClient {
    async fn complete(
        &self,
        _system_prompt: String,
        _history: Vec<ChatCompletionRequestMessage>,
    ) -> Result<String, LLMError> {
        Ok(self.reply.clone())
    }

    async fn complete_stream(
        &self,
        _system_prompt: String,
        _history: Vec<ChatCompletionRequestMessage>,
    ) -> Result<LLMStream, LLMError> {
        let chunks: Vec<Result<LLMStreamEvent, OpenAIError>> = self
            .reply
            .split_inclusive(' ')
            .map(|word| Ok(LLMStreamEvent::TextChunk(word.to_string())))
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn extract(
        &self,
        _instructions: String,
        _payload: String,
        _tool: ChatCompletionTool,
    ) -> Result<serde_json::Value, LLMError> {
        self.slide.clone().ok_or(LLMError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_never_retries() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_before_retry(1), None);
    }

    #[test]
    fn backoff_schedule_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 4,
            initial_interval: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_interval: Duration::from_secs(3),
        };

        assert_eq!(policy.delay_before_retry(1), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_before_retry(2), Some(Duration::from_secs(2)));
        // Capped by max_interval rather than reaching 4s.
        assert_eq!(policy.delay_before_retry(3), Some(Duration::from_secs(3)));
        assert_eq!(policy.delay_before_retry(4), None);
    }

    #[tokio::test]
    async fn mock_client_streams_the_full_reply() {
        let mock = MockLLMClient::new("one two three");
        let mut stream = mock
            .complete_stream(String::new(), Vec::new())
            .await
            .unwrap();

        let mut assembled = String::new();
        while let Some(event) = stream.next().await {
            let LLMStreamEvent::TextChunk(chunk) = event.unwrap();
            assembled.push_str(&chunk);
        }
        assert_eq!(assembled, "one two three");
    }

    #[tokio::test]
    async fn mock_client_without_slide_fails_extraction() {
        let mock = MockLLMClient::new("reply");
        let tool = crate::slide::present_slide_tool().unwrap();
        let err = mock
            .extract(String::new(), String::new(), tool)
            .await
            .unwrap_err();
        assert!(matches!(err, LLMError::EmptyResponse));
    }
}
