use serde::{Deserialize, Serialize};

use crate::types::Message;

/// Parameters for a streaming chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletionParams {
    /// The model identifier, e.g. `gpt-4-1106-preview`.
    pub model: String,

    /// Sampling temperature in `[0, 2]`.
    pub temperature: f64,

    /// Nucleus sampling mass in `[0, 1]`.
    pub top_p: f64,

    /// The conversation presented to the model, system message first.
    pub messages: Vec<Message>,

    /// Always true for requests issued by this crate.
    pub stream: bool,
}

impl ChatCompletionParams {
    /// Create streaming request parameters.
    pub fn new(
        model: impl Into<String>,
        temperature: f64,
        top_p: f64,
        messages: Vec<Message>,
    ) -> Self {
        Self {
            model: model.into(),
            temperature,
            top_p,
            messages,
            stream: true,
        }
    }
}

/// Incremental content carried by one choice of a streamed chunk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkDelta {
    /// Role, present on the first chunk only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Text fragment, absent on role-only and final chunks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// One choice within a streamed chunk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkChoice {
    /// Index of the choice.
    #[serde(default)]
    pub index: u32,

    /// The delta for this choice.
    #[serde(default)]
    pub delta: ChunkDelta,

    /// Why generation stopped, set on the last chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// A single `chat.completion.chunk` object from the event stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatCompletionChunk {
    /// Completion identifier shared by every chunk of one response.
    #[serde(default)]
    pub id: String,

    /// Model that produced the chunk.
    #[serde(default)]
    pub model: String,

    /// Choices; this crate only reads the first.
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

impl ChatCompletionChunk {
    /// Build a chunk carrying a single content fragment.
    pub fn from_content(content: impl Into<String>) -> Self {
        Self {
            choices: vec![ChunkChoice {
                delta: ChunkDelta {
                    content: Some(content.into()),
                    ..ChunkDelta::default()
                },
                ..ChunkChoice::default()
            }],
            ..Self::default()
        }
    }

    /// The delta content of the first choice, if any.
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.content.as_deref())
    }

    /// The finish reason of the first choice, if any.
    pub fn finish_reason(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.finish_reason.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{from_str, json, to_value};

    #[test]
    fn params_serialize_with_stream_flag() {
        let params = ChatCompletionParams::new(
            "gpt-4-1106-preview",
            0.5,
            1.0,
            vec![Message::user("hello")],
        );
        assert_eq!(
            to_value(&params).unwrap(),
            json!({
                "model": "gpt-4-1106-preview",
                "temperature": 0.5,
                "top_p": 1.0,
                "messages": [{"role": "user", "content": "hello"}],
                "stream": true
            })
        );
    }

    #[test]
    fn chunk_content_from_first_choice() {
        let chunk: ChatCompletionChunk = from_str(
            r#"{"id":"chatcmpl-1","object":"chat.completion.chunk","created":1,"model":"gpt-4","choices":[{"index":0,"delta":{"content":"Hi"},"finish_reason":null}]}"#,
        )
        .unwrap();
        assert_eq!(chunk.content(), Some("Hi"));
        assert_eq!(chunk.finish_reason(), None);
    }

    #[test]
    fn role_only_chunk_has_no_content() {
        let chunk: ChatCompletionChunk = from_str(
            r#"{"id":"c","choices":[{"index":0,"delta":{"role":"assistant"}}]}"#,
        )
        .unwrap();
        assert_eq!(chunk.content(), None);
    }

    #[test]
    fn final_chunk_has_finish_reason() {
        let chunk: ChatCompletionChunk =
            from_str(r#"{"id":"c","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#)
                .unwrap();
        assert_eq!(chunk.content(), None);
        assert_eq!(chunk.finish_reason(), Some("stop"));
    }

    #[test]
    fn chunk_without_choices() {
        let chunk: ChatCompletionChunk = from_str(r#"{"id":"c","choices":[]}"#).unwrap();
        assert_eq!(chunk.content(), None);
    }
}
