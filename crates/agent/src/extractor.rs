use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use coverwise_core::domain::session::CollectedInfo;

use crate::llm::{
    parse_json_object, ChatMessage, ChatRequest, ChatRole, LlmClient, LlmError, ResponseFormat,
};
use crate::prompts::{render_collected, render_history};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// Everything the extractor needs for one collection turn.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractionRequest {
    pub instructions: String,
    /// Fields already gathered for the product before this turn.
    pub collected: CollectedInfo,
    pub history: Vec<ConversationTurn>,
    pub user_message: String,
    pub schema_name: String,
    pub schema: Value,
}

/// Field values proposed by the model plus its conversational reply.
/// Fields are raw JSON; the merge decides what is kept.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractionResult {
    pub fields: Map<String, Value>,
    pub response: String,
}

impl ExtractionResult {
    pub fn from_reply(mut object: Map<String, Value>) -> Result<Self, LlmError> {
        let response = match object.remove("response") {
            Some(Value::String(response)) => response,
            Some(other) => {
                return Err(LlmError::MalformedReply(format!(
                    "`response` must be a string, got {other}"
                )))
            }
            None => {
                return Err(LlmError::MalformedReply("reply is missing `response`".to_string()))
            }
        };
        Ok(Self { fields: object, response })
    }
}

#[async_trait]
pub trait FieldExtractor: Send + Sync {
    async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionResult, LlmError>;
}

/// Extracts fields through a schema-constrained chat completion.
pub struct LlmFieldExtractor<C> {
    client: C,
}

impl<C> LlmFieldExtractor<C>
where
    C: LlmClient,
{
    pub fn new(client: C) -> Self {
        Self { client }
    }

    fn chat_request(request: &ExtractionRequest) -> ChatRequest {
        let system = format!(
            "{}\n{}\nConversation history:\n{}",
            request.instructions,
            render_collected(&request.collected),
            render_history(&request.history)
        );
        ChatRequest::new(
            vec![ChatMessage::system(system), ChatMessage::user(request.user_message.clone())],
            ResponseFormat::JsonSchema {
                name: request.schema_name.clone(),
                schema: request.schema.clone(),
            },
        )
    }
}

#[async_trait]
impl<C> FieldExtractor for LlmFieldExtractor<C>
where
    C: LlmClient,
{
    async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionResult, LlmError> {
        let reply = self.client.complete(&Self::chat_request(request)).await?;
        ExtractionResult::from_reply(parse_json_object(&reply)?)
    }
}
