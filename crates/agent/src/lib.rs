//! Conversational agents for insurance quoting.
//!
//! A conversation moves through two phases per product:
//! 1. **Collection** (`collection`) - the model extracts the product's required
//!    fields turn by turn; values are merged into the session and never lost.
//! 2. **Recommendation** (`recommendation`) - once every field is present, one
//!    allowed plan tier is chosen and presented with next steps.
//!
//! `runtime` decides which product a turn belongs to, using the `intent`
//! classifier when no product flow is in progress.
//!
//! # Safety Principle
//!
//! The model only proposes values. Field normalisation, completeness and the
//! set of plans that can be recommended are decided deterministically by
//! `coverwise-core`.

pub mod collection;
pub mod extractor;
pub mod intent;
pub mod llm;
pub mod prompts;
pub mod recommendation;
pub mod runtime;

pub use collection::CollectionAgent;
pub use extractor::{ConversationTurn, FieldExtractor, LlmFieldExtractor};
pub use intent::{Intent, IntentClassifier, IntentKind, IntentProduct};
pub use llm::{LlmClient, LlmError, OpenAiCompatibleClient};
pub use recommendation::RecommendationSelector;
pub use runtime::{AgentRuntime, TurnReply};
