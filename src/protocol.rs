//! Wire-level message types exchanged between the chat panel and the relay.
//!
//! One WebSocket text frame carries one complete JSON document of the form
//! `{"type": <tag>, "content": <string|string[]>}`. The tag set drifted
//! across earlier iterations of the protocol, so decoding is deliberately
//! forgiving: `tool_output` is accepted as an alias of `tool-output`, and an
//! unknown tag decodes as an AI message.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    User,
    Ai,
    ToolOutput,
    Status,
    Error,
}

impl Kind {
    /// Canonical wire tag for this kind.
    pub fn tag(&self) -> &'static str {
        match self {
            Kind::User => "user-message",
            Kind::Ai => "ai-message",
            Kind::ToolOutput => "tool-output",
            Kind::Status => "status",
            Kind::Error => "error",
        }
    }

    fn from_tag(tag: &str) -> Self {
        match tag {
            "user-message" => Kind::User,
            "ai-message" => Kind::Ai,
            "tool-output" | "tool_output" => Kind::ToolOutput,
            "status" => Kind::Status,
            "error" => Kind::Error,
            // Unknown tags are treated as assistant text rather than dropped.
            _ => Kind::Ai,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub kind: Kind,
    pub content: String,
}

#[derive(Serialize, Deserialize)]
struct Frame {
    #[serde(rename = "type")]
    kind: String,
    content: FrameContent,
}

/// Some server iterations sent `content` as a list of lines.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum FrameContent {
    Text(String),
    Lines(Vec<String>),
}

impl ChatMessage {
    pub fn new(kind: Kind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Kind::User, content)
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self::new(Kind::Ai, content)
    }

    pub fn tool_output(content: impl Into<String>) -> Self {
        Self::new(Kind::ToolOutput, content)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(Kind::Error, content)
    }

    pub fn to_json(&self) -> Result<String> {
        let frame = Frame {
            kind: self.kind.tag().to_string(),
            content: FrameContent::Text(self.content.clone()),
        };
        serde_json::to_string(&frame).context("failed to encode message frame")
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let frame: Frame =
            serde_json::from_str(raw).context("frame is not a valid chat message")?;
        let content = match frame.content {
            FrameContent::Text(text) => text,
            FrameContent::Lines(lines) => lines.join(" "),
        };
        Ok(Self {
            kind: Kind::from_tag(&frame.kind),
            content,
        })
    }
}
