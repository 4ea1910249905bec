//! Slide Extraction
//!
//! A slide is the structured teaching artifact that accompanies every reply.
//! The preferred path asks the model to emit the fields directly through a
//! forced tool call whose parameters are the JSON Schema of [`SlideDraft`].
//! When that is unavailable or fails, a heuristic pass parses delimited
//! sections out of the free-text reply. Either way the extraction result is
//! explicit: a [`SlideExtraction`] that the caller collapses into a
//! best-effort [`Slide`] without ever failing the request.

use crate::llm_client::LLMError;
use async_openai::types::{ChatCompletionTool, ChatCompletionToolArgs, FunctionObjectArgs};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Name of the function the model is forced to call during extraction.
pub const PRESENT_SLIDE_TOOL: &str = "present_slide";

/// Characters of the reply used as placeholder content when nothing
/// structured could be recovered.
const PLACEHOLDER_CONTENT_CHARS: usize = 200;

/// A structured teaching artifact derived from a model reply.
///
/// Slides are recomputed per response and never stored; absent optional
/// fields mean the model produced nothing for them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slide {
    pub title: String,
    pub content: String,
    pub code_example: Option<String>,
    pub visual_description: Option<String>,
}

impl Slide {
    fn placeholder(reply: &str) -> Self {
        Self {
            title: "Learning Session".to_string(),
            content: reply.chars().take(PLACEHOLDER_CONTENT_CHARS).collect(),
            code_example: None,
            visual_description: None,
        }
    }
}

/// The fields the model is asked to emit for a slide.
///
/// Everything is optional so that a partial emission still deserializes;
/// [`SlideExtraction::from_draft`] decides what the draft amounts to.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct SlideDraft {
    /// Short headline for the slide.
    pub title: Option<String>,
    /// Key explanatory text for the learner.
    pub content: Option<String>,
    /// A short code example, when one fits the topic.
    pub code_example: Option<String>,
    /// A description of a diagram or visual supporting the slide.
    pub visual_description: Option<String>,
}

/// Builds the tool definition used for schema-constrained slide extraction.
pub fn present_slide_tool() -> Result<ChatCompletionTool, LLMError> {
    let parameters = serde_json::to_value(schemars::schema_for!(SlideDraft))
        .map_err(|e| LLMError::Request(e.to_string()))?;

    let tool = ChatCompletionToolArgs::default()
        .function(
            FunctionObjectArgs::default()
                .name(PRESENT_SLIDE_TOOL)
                .description("Record the slide that accompanies the tutoring reply.")
                .parameters(parameters)
                .build()?,
        )
        .build()?;
    Ok(tool)
}

/// Outcome of the slide-extraction pass over a model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlideExtraction {
    /// Both title and content were recovered.
    Complete(Slide),
    /// Some fields were recovered, but not a full title-plus-content pair.
    Partial(Slide),
    /// Nothing structured could be recovered.
    Unparsed,
}

impl SlideExtraction {
    /// Classifies a draft emitted by the model.
    ///
    /// Whitespace-only fields count as absent; absent optional fields are
    /// kept absent rather than filled in.
    pub fn from_draft(draft: SlideDraft) -> Self {
        let title = normalize(draft.title);
        let content = normalize(draft.content);
        let code_example = normalize(draft.code_example);
        let visual_description = normalize(draft.visual_description);

        match (title, content) {
            (Some(title), Some(content)) => SlideExtraction::Complete(Slide {
                title,
                content,
                code_example,
                visual_description,
            }),
            (None, None) if code_example.is_none() && visual_description.is_none() => {
                SlideExtraction::Unparsed
            }
            (title, content) => SlideExtraction::Partial(Slide {
                title: title.unwrap_or_default(),
                content: content.unwrap_or_default(),
                code_example,
                visual_description,
            }),
        }
    }

    /// Heuristic fallback: parses delimited sections out of a free-text
    /// reply (markdown heading, fenced code block, `Visual:`/`Diagram:`
    /// line, remaining prose).
    pub fn from_reply(reply: &str) -> Self {
        Self::from_draft(parse_reply_sections(reply))
    }

    /// Collapses the extraction into the slide returned to the caller.
    ///
    /// `reply` feeds the placeholder for [`SlideExtraction::Unparsed`], so
    /// the caller always receives a renderable slide alongside the full
    /// reply text.
    pub fn into_slide(self, reply: &str) -> Slide {
        match self {
            SlideExtraction::Complete(slide) | SlideExtraction::Partial(slide) => slide,
            SlideExtraction::Unparsed => Slide::placeholder(reply),
        }
    }
}

fn normalize(field: Option<String>) -> Option<String> {
    field
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_reply_sections(reply: &str) -> SlideDraft {
    let mut title: Option<String> = None;
    let mut visual: Option<String> = None;
    let mut code: Option<String> = None;
    let mut prose: Vec<String> = Vec::new();

    let mut in_code = false;
    let mut code_lines: Vec<String> = Vec::new();

    for line in reply.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with("```") {
            if in_code && code.is_none() && !code_lines.is_empty() {
                // Keep the first fenced block only.
                code = Some(code_lines.join("\n"));
            }
            code_lines.clear();
            in_code = !in_code;
            continue;
        }
        if in_code {
            code_lines.push(line.to_string());
            continue;
        }

        if title.is_none() {
            if let Some(heading) = trimmed.strip_prefix('#') {
                let heading = heading.trim_start_matches('#').trim();
                if !heading.is_empty() {
                    title = Some(heading.to_string());
                    continue;
                }
            }
            if let Some(labeled) = strip_label(trimmed, "title") {
                title = Some(labeled);
                continue;
            }
        }

        if visual.is_none() {
            if let Some(labeled) =
                strip_label(trimmed, "visual").or_else(|| strip_label(trimmed, "diagram"))
            {
                visual = Some(labeled);
                continue;
            }
        }

        if !trimmed.is_empty() {
            prose.push(trimmed.to_string());
        }
    }

    // An unterminated fence still counts as the code section.
    if in_code && code.is_none() && !code_lines.is_empty() {
        code = Some(code_lines.join("\n"));
    }

    SlideDraft {
        title,
        content: (!prose.is_empty()).then(|| prose.join("\n")),
        code_example: code,
        visual_description: visual,
    }
}

/// Strips an ASCII case-insensitive `label:` prefix and returns the rest,
/// if non-empty.
fn strip_label(line: &str, label: &str) -> Option<String> {
    let mut chars = line.char_indices();
    for expected in label.chars() {
        match chars.next() {
            Some((_, c)) if c.eq_ignore_ascii_case(&expected) => {}
            _ => return None,
        }
    }
    match chars.next() {
        Some((idx, ':')) => {
            let rest = line[idx + 1..].trim();
            (!rest.is_empty()).then(|| rest.to_string())
        }
        _ => None,
    }
}
