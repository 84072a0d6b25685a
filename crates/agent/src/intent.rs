use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use coverwise_core::domain::product::ProductKind;

use crate::extractor::ConversationTurn;
use crate::llm::{parse_json_object, ChatMessage, ChatRequest, LlmClient, LlmError, ResponseFormat};
use crate::prompts::{intent_instructions, recent_history, render_history};

const MAX_INPUT_CHARS: usize = 1000;
const DEFAULT_CONFIDENCE: f32 = 0.8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputIssue {
    EmptyInput,
    TooShort,
    RepeatedCharacters,
    OnlyNumbers,
    OnlySymbols,
    TooLong,
}

impl InputIssue {
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyInput => "empty_input",
            Self::TooShort => "too_short",
            Self::RepeatedCharacters => "repeated_characters",
            Self::OnlyNumbers => "only_numbers",
            Self::OnlySymbols => "only_symbols",
            Self::TooLong => "too_long",
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::EmptyInput => "Please type your message. I'm here to help with your insurance needs!",
            Self::TooShort => {
                "Could you please provide a bit more detail? I'd love to help you with your insurance questions!"
            }
            Self::RepeatedCharacters => {
                "I didn't quite understand that. Could you please rephrase your question about insurance?"
            }
            Self::OnlyNumbers => {
                "I see you've shared some numbers. Could you please let me know what insurance information you're looking for?"
            }
            Self::OnlySymbols => {
                "I see some symbols there! Could you please type your insurance question in words?"
            }
            Self::TooLong => {
                "That's quite a long message! Could you please summarize your insurance question in a shorter message?"
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputCheck {
    Valid,
    Invalid(InputIssue),
}

impl InputCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Cheap screening applied before any model call.
pub fn validate_user_input(text: &str) -> InputCheck {
    let stripped = text.trim();
    if stripped.is_empty() {
        return InputCheck::Invalid(InputIssue::EmptyInput);
    }

    let chars: Vec<char> = stripped.chars().collect();
    if chars.len() < 2 {
        let single = chars[0];
        if !(single.is_numeric() || matches!(single.to_ascii_lowercase(), 'y' | 'n')) {
            return InputCheck::Invalid(InputIssue::TooShort);
        }
    }

    if chars.len() >= 11 && chars.iter().all(|c| *c == chars[0]) {
        return InputCheck::Invalid(InputIssue::RepeatedCharacters);
    }

    let numeric_like = chars
        .iter()
        .all(|c| c.is_ascii_digit() || c.is_whitespace() || matches!(c, '-' | '+' | '(' | ')' | '.'));
    if numeric_like && !(chars.len() <= 2 && chars.iter().all(|c| c.is_numeric())) {
        return InputCheck::Invalid(InputIssue::OnlyNumbers);
    }

    if chars.iter().all(|c| !(c.is_alphanumeric() || *c == '_' || c.is_whitespace())) {
        return InputCheck::Invalid(InputIssue::OnlySymbols);
    }

    if text.chars().count() > MAX_INPUT_CHARS {
        return InputCheck::Invalid(InputIssue::TooLong);
    }

    InputCheck::Valid
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Greeting,
    Unwanted,
    Informational,
    PolicyClaimStatus,
    ProductInquiry,
    InvalidInput,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntentProduct {
    Product(ProductKind),
    PolicyClaimStatus,
    Unknown,
}

impl IntentProduct {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "POLICY_CLAIM_STATUS" => Self::PolicyClaimStatus,
            other => other.parse::<ProductKind>().map(Self::Product).unwrap_or(Self::Unknown),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Product(product) => product.code(),
            Self::PolicyClaimStatus => "POLICY_CLAIM_STATUS",
            Self::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Intent {
    pub product: IntentProduct,
    pub intent: IntentKind,
    pub confidence: f32,
    pub requires_clarification: bool,
}

impl Intent {
    pub fn invalid_input() -> Self {
        Self {
            product: IntentProduct::Unknown,
            intent: IntentKind::InvalidInput,
            confidence: 1.0,
            requires_clarification: false,
        }
    }

    /// Used whenever classification itself fails.
    pub fn unclassified() -> Self {
        Self {
            product: IntentProduct::Unknown,
            intent: IntentKind::Unwanted,
            confidence: 0.0,
            requires_clarification: true,
        }
    }

    fn from_reply(object: &Map<String, Value>) -> Result<Self, LlmError> {
        let intent = object
            .get("intent")
            .cloned()
            .ok_or_else(|| LlmError::MalformedReply("reply is missing `intent`".to_string()))
            .and_then(|value| {
                serde_json::from_value::<IntentKind>(value)
                    .map_err(|error| LlmError::MalformedReply(format!("unknown intent: {error}")))
            })?;
        let product =
            object.get("product").and_then(Value::as_str).map(IntentProduct::parse).unwrap_or(IntentProduct::Unknown);
        let confidence = object
            .get("confidence")
            .and_then(Value::as_f64)
            .map(|value| value.clamp(0.0, 1.0) as f32)
            .unwrap_or(DEFAULT_CONFIDENCE);
        let requires_clarification =
            object.get("requires_clarification").and_then(Value::as_bool).unwrap_or(false);

        Ok(Self { product, intent, confidence, requires_clarification })
    }
}

fn intent_schema() -> Value {
    let mut products: Vec<&str> = ProductKind::ALL.iter().map(|product| product.code()).collect();
    products.extend(["POLICY_CLAIM_STATUS", "UNKNOWN"]);

    json!({
        "type": "object",
        "properties": {
            "product": { "type": "string", "enum": products },
            "intent": {
                "type": "string",
                "enum": ["greeting", "unwanted", "informational", "policy_claim_status", "product_inquiry"],
            },
            "confidence": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
            "requires_clarification": { "type": "boolean" },
        },
        "required": ["product", "intent"],
        "additionalProperties": false,
    })
}

/// Routes a free-form message to an intent and product.
pub struct IntentClassifier<C> {
    client: C,
    history_limit: usize,
}

impl<C> IntentClassifier<C>
where
    C: LlmClient,
{
    pub fn new(client: C, history_limit: usize) -> Self {
        Self { client, history_limit }
    }

    pub async fn classify(&self, user_message: &str, history: &[ConversationTurn]) -> Intent {
        if let InputCheck::Invalid(issue) = validate_user_input(user_message) {
            tracing::warn!(event_name = "intent.invalid_input", issue = issue.code(), "input rejected");
            return Intent::invalid_input();
        }

        match self.classify_with_model(user_message, history).await {
            Ok(intent) => {
                tracing::info!(
                    event_name = "intent.classified",
                    product = intent.product.code(),
                    intent = ?intent.intent,
                    confidence = intent.confidence,
                    "intent classified"
                );
                intent
            }
            Err(error) => {
                tracing::error!(event_name = "intent.classification_failed", error = %error, "intent classification failed");
                Intent::unclassified()
            }
        }
    }

    async fn classify_with_model(
        &self,
        user_message: &str,
        history: &[ConversationTurn],
    ) -> Result<Intent, LlmError> {
        let content = format!(
            "Chat History:\n{}\n\nUser Message: {user_message}",
            render_history(recent_history(history, self.history_limit))
        );
        let request = ChatRequest::new(
            vec![ChatMessage::system(intent_instructions()), ChatMessage::user(content)],
            ResponseFormat::JsonSchema { name: "intent".to_string(), schema: intent_schema() },
        );

        let reply = self.client.complete(&request).await?;
        Intent::from_reply(&parse_json_object(&reply)?)
    }
}
