//! API Models
//!
//! This module defines the request/response structures for the HTTP surface
//! and their OpenAPI schemas via `utoipa`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tutor_core::session::Turn;
use tutor_core::slide::Slide;
use utoipa::ToSchema;

/// Request body for the chat endpoints.
#[derive(Deserialize, ToSchema, Debug, Clone)]
pub struct ChatRequest {
    #[schema(example = "What are Python variables?")]
    pub message: String,
    /// Omit to start a new conversation thread.
    #[schema(example = "6e2d3a39-4a83-4dbd-9f2d-5f4f2e2d9c11")]
    pub thread_id: Option<String>,
}

/// The slide rendered next to the reply in the UI.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq, Eq)]
pub struct SlideContent {
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_example: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual_description: Option<String>,
}

impl From<Slide> for SlideContent {
    fn from(slide: Slide) -> Self {
        Self {
            title: slide.title,
            content: slide.content,
            code_example: slide.code_example,
            visual_description: slide.visual_description,
        }
    }
}

/// Response body for the chat endpoint.
#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct ChatResponse {
    pub message: String,
    pub slide: SlideContent,
    pub thread_id: String,
}

/// A single turn as exposed by the thread endpoint.
#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct TurnView {
    #[schema(example = "user")]
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Turn> for TurnView {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role.to_string(),
            content: turn.content.clone(),
            created_at: turn.created_at,
        }
    }
}

/// Response body for the thread inspection endpoint.
#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct ThreadInfoResponse {
    pub thread_id: String,
    pub created_at: DateTime<Utc>,
    pub total_turns: usize,
    pub turns: Vec<TurnView>,
}

/// Events emitted on the newline-delimited chat stream.
///
/// Chunks arrive while the model is still talking; the final event carries
/// the finalized slide, which is only extracted once the reply is complete.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    ResponseChunk {
        chunk: String,
    },
    ResponseComplete {
        message: String,
        slide: SlideContent,
        thread_id: String,
    },
    Error {
        message: String,
    },
}

/// Body returned by the root endpoint.
#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct ServiceInfoResponse {
    pub message: String,
    pub course: String,
    pub docs: String,
}

/// Body returned by the health endpoint.
#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: String,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_deserialization() {
        let json = r#"{"message": "What are Python variables?"}"#;
        let request: ChatRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.message, "What are Python variables?");
        assert_eq!(request.thread_id, None);

        let json = r#"{"message": "Give an example", "thread_id": "lesson-7"}"#;
        let request: ChatRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.thread_id.as_deref(), Some("lesson-7"));
    }

    #[test]
    fn test_chat_request_missing_message_fails() {
        let json = r#"{"thread_id": "lesson-7"}"#;
        let result: Result<ChatRequest, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_absent_slide_fields_are_omitted() {
        let slide = SlideContent {
            title: "Variables".to_string(),
            content: "A variable names a value.".to_string(),
            code_example: None,
            visual_description: None,
        };

        let json = serde_json::to_string(&slide).unwrap();
        assert!(!json.contains("code_example"));
        assert!(!json.contains("visual_description"));
    }

    #[test]
    fn test_present_slide_fields_are_serialized() {
        let slide = SlideContent {
            title: "Variables".to_string(),
            content: "A variable names a value.".to_string(),
            code_example: Some("x = 1".to_string()),
            visual_description: Some("A labeled box".to_string()),
        };

        let json = serde_json::to_string(&slide).unwrap();
        assert!(json.contains(r#""code_example":"x = 1""#));
        assert!(json.contains(r#""visual_description":"A labeled box""#));
    }

    #[test]
    fn test_slide_content_from_core_slide() {
        let slide = Slide {
            title: "Loops".to_string(),
            content: "Loops repeat work.".to_string(),
            code_example: Some("for x in xs: ...".to_string()),
            visual_description: None,
        };

        let content = SlideContent::from(slide);
        assert_eq!(content.title, "Loops");
        assert_eq!(content.code_example.as_deref(), Some("for x in xs: ..."));
        assert_eq!(content.visual_description, None);
    }

    #[test]
    fn test_turn_view_from_core_turn() {
        let turn = Turn::user("What is a list?");
        let view = TurnView::from(&turn);
        assert_eq!(view.role, "user");
        assert_eq!(view.content, "What is a list?");

        let turn = Turn::assistant("A list is an ordered collection.");
        let view = TurnView::from(&turn);
        assert_eq!(view.role, "assistant");
    }

    #[test]
    fn test_stream_event_tagging() {
        let chunk = StreamEvent::ResponseChunk {
            chunk: "Hel".to_string(),
        };
        let json = serde_json::to_string(&chunk).unwrap();
        assert_eq!(json, r#"{"type":"response_chunk","chunk":"Hel"}"#);

        let error = StreamEvent::Error {
            message: "model call failed".to_string(),
        };
        let json = serde_json::to_string(&error).unwrap();
        assert_eq!(json, r#"{"type":"error","message":"model call failed"}"#);
    }

    #[test]
    fn test_stream_complete_event_carries_slide() {
        let event = StreamEvent::ResponseComplete {
            message: "done".to_string(),
            slide: SlideContent {
                title: "T".to_string(),
                content: "C".to_string(),
                code_example: None,
                visual_description: None,
            },
            thread_id: "t-1".to_string(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"response_complete""#));
        assert!(json.contains(r#""thread_id":"t-1""#));
    }

    #[test]
    fn test_error_response_serialization() {
        let error = ErrorResponse {
            message: "Thread not found".to_string(),
        };

        let json = serde_json::to_string(&error).unwrap();
        assert_eq!(json, r#"{"message":"Thread not found"}"#);
    }
}
