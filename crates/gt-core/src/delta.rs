//! Delta extraction: one chat-completion chunk to reasoning/content/citation fragments.
//!
//! Providers put reasoning text in different places. The candidate locations
//! are an ordered table; the first one holding non-empty text wins and the
//! rest are not consulted for that chunk.

use gt_protocol::Delta;
use serde_json::Value;

use crate::assembler::{RESPONSE_SEPARATOR, THINKING_FOOTER, THINKING_HEADER};

/// Locates reasoning text inside a `delta` (or `message`) object.
type ReasoningPath = fn(&Value) -> Option<&str>;

/// Reasoning locations in priority order.
const REASONING_PATHS: &[(&str, ReasoningPath)] = &[
    ("reasoning_content", reasoning_content),
    ("thinking_blocks", thinking_blocks),
    ("provider_specific_fields", provider_reasoning_content),
];

fn reasoning_content(body: &Value) -> Option<&str> {
    body.get("reasoning_content")?.as_str()
}

fn thinking_blocks(body: &Value) -> Option<&str> {
    body.get("thinking_blocks")?
        .as_array()?
        .iter()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("thinking"))
        .find_map(|block| block.get("thinking")?.as_str())
}

fn provider_reasoning_content(body: &Value) -> Option<&str> {
    body.get("provider_specific_fields")?
        .get("reasoningContent")?
        .get("text")?
        .as_str()
}

pub const INLINE_THINK_OPEN: &str = "<think>";
pub const INLINE_THINK_CLOSE: &str = "</think>";

/// Extracts [`Delta`]s from decoded chunks for one model.
#[derive(Debug, Clone, Default)]
pub struct DeltaExtractor {
    /// Rewrite inline `<think>` tags in content into thinking delimiters.
    inline_think_tags: bool,
}

impl DeltaExtractor {
    /// Extractor with no model-specific rewriting.
    pub fn new() -> Self {
        Self::default()
    }

    /// Extractor for `model`. Models whose name contains one of
    /// `reasoning_markers` stream their reasoning inline in the content.
    pub fn for_model(model: &str, reasoning_markers: &[String]) -> Self {
        let inline_think_tags = reasoning_markers
            .iter()
            .any(|marker| !marker.is_empty() && model.contains(marker.as_str()));
        Self { inline_think_tags }
    }

    pub fn rewrites_think_tags(&self) -> bool {
        self.inline_think_tags
    }

    /// Extract from a streaming chunk (`choices[0].delta`).
    pub fn extract(&self, event: &Value) -> Delta {
        self.extract_from(event, "delta")
    }

    /// Extract from a non-streaming completion (`choices[0].message`).
    pub fn extract_message(&self, response: &Value) -> Delta {
        self.extract_from(response, "message")
    }

    fn extract_from(&self, event: &Value, body_key: &str) -> Delta {
        let citations = event.get("citations").and_then(citation_list);

        let Some(body) = event
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get(body_key))
        else {
            return Delta {
                citations,
                ..Delta::default()
            };
        };

        let reasoning = REASONING_PATHS.iter().find_map(|(name, path)| {
            let text = path(body).filter(|text| !text.is_empty())?;
            tracing::trace!(path = *name, len = text.len(), "reasoning fragment");
            Some(text.to_string())
        });

        let content = body
            .get("content")
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
            .map(|text| self.rewrite_content(text));

        Delta {
            reasoning,
            content,
            citations,
        }
    }

    fn rewrite_content(&self, text: &str) -> String {
        if !self.inline_think_tags {
            return text.to_string();
        }
        text.replace(INLINE_THINK_OPEN, THINKING_HEADER).replace(
            INLINE_THINK_CLOSE,
            &format!("{THINKING_FOOTER}{RESPONSE_SEPARATOR}"),
        )
    }
}

fn citation_list(value: &Value) -> Option<Vec<String>> {
    let entries = value.as_array()?;
    Some(
        entries
            .iter()
            .filter_map(|entry| entry.as_str().map(str::to_string))
            .collect(),
    )
}
