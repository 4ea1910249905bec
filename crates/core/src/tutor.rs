//! Tutor Agent
//!
//! The agent is a pure function of (history, new message): it composes the
//! prompt, obtains the model reply, and derives the slide. All conversation
//! state lives in the session store; the agent retains nothing between calls.

use crate::{
    llm_client::{LLMClient, LLMError, LLMStreamEvent},
    session::{Role, Turn},
    slide::{Slide, SlideDraft, SlideExtraction, present_slide_tool},
};
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestUserMessageArgs,
};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Errors surfaced by the agent for a single chat turn.
#[derive(Debug, thiserror::Error)]
pub enum TutorError {
    #[error("invalid message: {0}")]
    Validation(String),
    #[error("model call failed: {0}")]
    Upstream(#[from] LLMError),
}

/// The reply produced for a single user turn: the full text plus the slide
/// derived from it.
#[derive(Debug, Clone)]
pub struct TutorReply {
    pub message: String,
    pub slide: Slide,
}

/// Prompt templates rendered by the agent on every call.
#[derive(Debug, Clone)]
pub struct TutorPrompts {
    /// Teaching persona; may reference `{course_topic}`.
    pub system: String,
    /// Instructions for the slide-extraction pass.
    pub extract: String,
}

/// The stateless tutoring agent.
pub struct TutorAgent {
    llm: Arc<dyn LLMClient>,
    prompts: TutorPrompts,
}

impl TutorAgent {
    pub fn new(llm: Arc<dyn LLMClient>, prompts: TutorPrompts) -> Self {
        Self { llm, prompts }
    }

    /// Produces a reply and slide for one user message against the given
    /// history.
    ///
    /// The model call failing is an error; slide extraction failing is not.
    pub async fn respond(
        &self,
        history: &[Turn],
        message: &str,
        course_topic: &str,
    ) -> Result<TutorReply, TutorError> {
        if message.trim().is_empty() {
            return Err(TutorError::Validation(
                "message must not be empty".to_string(),
            ));
        }

        let system_prompt = self.render_system_prompt(course_topic);
        let messages = conversation_messages(history, message)?;

        let reply = self.llm.complete(system_prompt, messages).await?;
        let slide = self.extract_slide(&reply).await;

        Ok(TutorReply {
            message: reply,
            slide,
        })
    }

    /// Streaming variant of [`TutorAgent::respond`].
    ///
    /// Reply chunks are forwarded over `chunk_tx` as they arrive; the slide
    /// is extracted only once the full reply has been accumulated. A closed
    /// receiver does not interrupt the turn: the reply keeps accumulating so
    /// the history stays consistent.
    pub async fn respond_streaming(
        &self,
        history: &[Turn],
        message: &str,
        course_topic: &str,
        chunk_tx: mpsc::Sender<String>,
    ) -> Result<TutorReply, TutorError> {
        if message.trim().is_empty() {
            return Err(TutorError::Validation(
                "message must not be empty".to_string(),
            ));
        }

        let system_prompt = self.render_system_prompt(course_topic);
        let messages = conversation_messages(history, message)?;

        let mut stream = self.llm.complete_stream(system_prompt, messages).await?;
        let mut reply = String::new();
        while let Some(event) = stream.next().await {
            match event {
                Ok(LLMStreamEvent::TextChunk(chunk)) => {
                    reply.push_str(&chunk);
                    let _ = chunk_tx.send(chunk).await;
                }
                Err(err) => return Err(TutorError::Upstream(LLMError::Api(err))),
            }
        }
        if reply.is_empty() {
            return Err(TutorError::Upstream(LLMError::EmptyResponse));
        }

        let slide = self.extract_slide(&reply).await;
        Ok(TutorReply {
            message: reply,
            slide,
        })
    }

    fn render_system_prompt(&self, course_topic: &str) -> String {
        self.prompts.system.replace("{course_topic}", course_topic)
    }

    /// Derives the slide for a reply. Never fails: a broken structured pass
    /// falls back to text parsing, and an unparsable reply degrades to a
    /// placeholder slide.
    async fn extract_slide(&self, reply: &str) -> Slide {
        let extraction = match self.schema_extraction(reply).await {
            Ok(SlideExtraction::Unparsed) => {
                debug!("Structured extraction produced no fields. Falling back to text parsing.");
                SlideExtraction::from_reply(reply)
            }
            Ok(extraction) => extraction,
            Err(err) => {
                warn!(error = %err, "Structured slide extraction failed. Falling back to text parsing.");
                SlideExtraction::from_reply(reply)
            }
        };
        extraction.into_slide(reply)
    }

    async fn schema_extraction(&self, reply: &str) -> Result<SlideExtraction, LLMError> {
        let tool = present_slide_tool()?;
        let arguments = self
            .llm
            .extract(self.prompts.extract.clone(), reply.to_string(), tool)
            .await?;
        let draft: SlideDraft = serde_json::from_value(arguments)
            .map_err(|e| LLMError::MalformedToolCall(e.to_string()))?;
        Ok(SlideExtraction::from_draft(draft))
    }
}

/// Maps the stored history plus the new user message into chat messages.
fn conversation_messages(
    history: &[Turn],
    message: &str,
) -> Result<Vec<ChatCompletionRequestMessage>, LLMError> {
    let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(history.len() + 1);
    for turn in history {
        let mapped = match turn.role {
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(turn.content.clone())
                .build()?
                .into(),
            Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(turn.content.clone())
                .build()?
                .into(),
        };
        messages.push(mapped);
    }
    messages.push(
        ChatCompletionRequestUserMessageArgs::default()
            .content(message.to_string())
            .build()?
            .into(),
    );
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::{LLMStream, MockLLMClient};
    use async_openai::types::ChatCompletionTool;
    use async_trait::async_trait;
    use mockall::mock;
    use serde_json::json;
    use std::time::Duration;

    mock! {
        Client {}

        #[async_trait]
        impl LLMClient for Client {
            async fn complete(
                &self,
                system_prompt: String,
                history: Vec<ChatCompletionRequestMessage>,
            ) -> Result<String, LLMError>;

            async fn complete_stream(
                &self,
                system_prompt: String,
                history: Vec<ChatCompletionRequestMessage>,
            ) -> Result<LLMStream, LLMError>;

            async fn extract(
                &self,
                instructions: String,
                payload: String,
                tool: ChatCompletionTool,
            ) -> Result<serde_json::Value, LLMError>;
        }
    }

    fn prompts() -> TutorPrompts {
        TutorPrompts {
            system: "You teach {course_topic}.".to_string(),
            extract: "Extract the slide fields from the reply.".to_string(),
        }
    }

    fn agent(llm: impl LLMClient + 'static) -> TutorAgent {
        TutorAgent::new(Arc::new(llm), prompts())
    }

    #[tokio::test]
    async fn respond_returns_reply_and_structured_slide() {
        let mut llm = MockClient::new();
        llm.expect_complete()
            .withf(|system_prompt, messages| {
                system_prompt == "You teach Python Programming." && messages.len() == 3
            })
            .returning(|_, _| Ok("A variable names a value.".to_string()));
        llm.expect_extract().returning(|_, _, _| {
            Ok(json!({
                "title": "Python Variables",
                "content": "A variable names a value.",
                "code_example": "x = 1",
            }))
        });

        let history = vec![Turn::user("Hi"), Turn::assistant("Hello! Ready to learn?")];
        let reply = agent(llm)
            .respond(&history, "What are variables?", "Python Programming")
            .await
            .unwrap();

        assert_eq!(reply.message, "A variable names a value.");
        assert_eq!(reply.slide.title, "Python Variables");
        assert_eq!(reply.slide.code_example.as_deref(), Some("x = 1"));
        assert_eq!(reply.slide.visual_description, None);
    }

    #[tokio::test]
    async fn respond_rejects_empty_message_before_any_model_call() {
        // No expectations: any model call would panic the mock.
        let llm = MockClient::new();

        let err = agent(llm)
            .respond(&[], "   ", "Python Programming")
            .await
            .unwrap_err();
        assert!(matches!(err, TutorError::Validation(_)));
    }

    #[tokio::test]
    async fn respond_propagates_upstream_failure() {
        let mut llm = MockClient::new();
        llm.expect_complete()
            .returning(|_, _| Err(LLMError::Timeout(Duration::from_secs(30))));

        let err = agent(llm)
            .respond(&[], "What are variables?", "Python Programming")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TutorError::Upstream(LLMError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn failed_extraction_degrades_to_text_parsing() {
        let mut llm = MockClient::new();
        llm.expect_complete().returning(|_, _| {
            Ok("# Loops\nLoops repeat a block of code.".to_string())
        });
        llm.expect_extract()
            .returning(|_, _, _| Err(LLMError::EmptyResponse));

        let reply = agent(llm)
            .respond(&[], "Tell me about loops", "Python Programming")
            .await
            .unwrap();

        assert_eq!(reply.message, "# Loops\nLoops repeat a block of code.");
        assert_eq!(reply.slide.title, "Loops");
        assert_eq!(reply.slide.content, "Loops repeat a block of code.");
    }

    #[tokio::test]
    async fn unstructured_reply_still_produces_a_slide() {
        let mut llm = MockClient::new();
        llm.expect_complete()
            .returning(|_, _| Ok("Sure, let's keep practicing together.".to_string()));
        llm.expect_extract()
            .returning(|_, _, _| Err(LLMError::EmptyResponse));

        let reply = agent(llm)
            .respond(&[], "ok", "Python Programming")
            .await
            .unwrap();

        // The conversational reply survives even though nothing structured
        // could be recovered.
        assert_eq!(reply.message, "Sure, let's keep practicing together.");
        assert!(reply.slide.content.contains("keep practicing"));
        assert_eq!(reply.slide.code_example, None);
    }

    #[tokio::test]
    async fn malformed_tool_arguments_degrade_instead_of_failing() {
        let mut llm = MockClient::new();
        llm.expect_complete()
            .returning(|_, _| Ok("# Strings\nStrings hold text.".to_string()));
        // Arguments that do not match the draft schema at all.
        llm.expect_extract()
            .returning(|_, _, _| Ok(json!({ "title": 42 })));

        let reply = agent(llm)
            .respond(&[], "Strings?", "Python Programming")
            .await
            .unwrap();

        assert_eq!(reply.slide.title, "Strings");
    }

    #[tokio::test]
    async fn streaming_forwards_chunks_and_finalizes_slide_last() {
        let llm = MockLLMClient::new("Variables name values in Python.").with_slide(json!({
            "title": "Variables",
            "content": "Variables name values.",
        }));
        let agent = TutorAgent::new(Arc::new(llm), prompts());

        let (tx, mut rx) = mpsc::channel::<String>(16);
        let collector = tokio::spawn(async move {
            let mut assembled = String::new();
            while let Some(chunk) = rx.recv().await {
                assembled.push_str(&chunk);
            }
            assembled
        });

        let reply = agent
            .respond_streaming(&[], "What are variables?", "Python Programming", tx)
            .await
            .unwrap();
        let assembled = collector.await.unwrap();

        assert_eq!(reply.message, "Variables name values in Python.");
        assert_eq!(assembled, reply.message);
        assert_eq!(reply.slide.title, "Variables");
    }

    #[tokio::test]
    async fn streaming_rejects_empty_message() {
        let llm = MockLLMClient::new("unused");
        let agent = TutorAgent::new(Arc::new(llm), prompts());
        let (tx, _rx) = mpsc::channel(1);

        let err = agent
            .respond_streaming(&[], "", "Python Programming", tx)
            .await
            .unwrap_err();
        assert!(matches!(err, TutorError::Validation(_)));
    }
}
