use async_trait::async_trait;
use serde::Serialize;

/// Chat delivery failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("chat transport unavailable: {0}")]
    Unavailable(String),
}

/// Outbound rendering seam. The engine decides *what* to show; the
/// transport decides how it appears in the hosting chat platform.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_prompt(&self, prompt: &FieldPrompt) -> Result<(), TransportError>;

    async fn send_message(&self, text: &str) -> Result<(), TransportError>;
}

/// What a prompt is asking for, so transports can pick an input widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    Attribute,
    Document,
    Disambiguation,
    Summary,
}

/// One rendered step of the conversation: the question text, a progress
/// line, and the quick replies the user may tap instead of typing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldPrompt {
    pub field_id: Option<i64>,
    pub kind: PromptKind,
    pub title: String,
    pub body: String,
    pub quick_replies: Vec<String>,
}
