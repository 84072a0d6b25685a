use uuid::Uuid;

use coverwise_core::domain::product::{ProductCatalog, ProductKind, ProductSpec};
use coverwise_core::domain::session::{ContextUpdate, SessionId, Stage};
use coverwise_core::errors::ApplicationError;
use coverwise_db::SessionRepository;

use crate::collection::CollectionAgent;
use crate::extractor::{ConversationTurn, FieldExtractor};
use crate::intent::{
    validate_user_input, InputCheck, InputIssue, IntentClassifier, IntentKind, IntentProduct,
};
use crate::llm::LlmClient;

pub const GREETING_REPLY: &str =
    "Hello! I can help you find the right insurance plan. Which product are you interested in?";
pub const INFORMATIONAL_REPLY: &str = "I can't answer detailed coverage questions here yet. Tell me which product you'd like a quote for and I'll guide you through it.";
pub const CLAIM_STATUS_REPLY: &str = "Checking a policy or claim status isn't available in this chat yet. Please contact our customer service team for help with that.";
pub const UNWANTED_REPLY: &str =
    "I'm here to help with insurance. Let me know which product you'd like to explore.";
pub const CLARIFICATION_REPLY: &str =
    "Sorry, I didn't quite catch that. Could you tell me which insurance product you're interested in?";

/// Reply produced for one user turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnReply {
    pub text: String,
    pub product: Option<ProductKind>,
    pub correlation_id: String,
}

/// Routes a user turn to the collection agent of the product the
/// conversation is about, classifying the message first when no product
/// flow is in progress.
pub struct AgentRuntime<E, L, R, C> {
    catalog: ProductCatalog,
    collection: CollectionAgent<E, L, R>,
    classifier: IntentClassifier<C>,
}

impl<E, L, R, C> AgentRuntime<E, L, R, C>
where
    E: FieldExtractor,
    L: LlmClient,
    R: SessionRepository,
    C: LlmClient,
{
    pub fn new(
        catalog: ProductCatalog,
        collection: CollectionAgent<E, L, R>,
        classifier: IntentClassifier<C>,
    ) -> Self {
        Self { catalog, collection, classifier }
    }

    pub fn catalog(&self) -> &ProductCatalog {
        &self.catalog
    }

    pub async fn handle_turn(
        &self,
        session_id: &SessionId,
        user_message: &str,
        history: &[ConversationTurn],
    ) -> TurnReply {
        let correlation_id = Uuid::new_v4().to_string();

        match self.route(session_id, user_message, history, &correlation_id).await {
            Ok((text, product)) => TurnReply { text, product, correlation_id },
            Err(error) => {
                let interface = error.into_interface(correlation_id.clone());
                tracing::error!(
                    event_name = "runtime.turn_failed",
                    session_id = %session_id,
                    correlation_id = %correlation_id,
                    error = %interface,
                    "turn failed"
                );
                TurnReply { text: interface.user_message().to_string(), product: None, correlation_id }
            }
        }
    }

    async fn route(
        &self,
        session_id: &SessionId,
        user_message: &str,
        history: &[ConversationTurn],
        correlation_id: &str,
    ) -> Result<(String, Option<ProductKind>), ApplicationError> {
        // Held across read, classify and activate so concurrent first turns
        // cannot both pick a product.
        let _turn = self.collection.locks().lock(session_id).await;
        let session = self.collection.sessions().get_session(session_id).await?;

        if let Some(spec) = session
            .context
            .active_product
            .filter(|product| session.stage(*product) == Stage::Collecting)
            .and_then(|product| self.catalog.get(product))
        {
            // Short answers like "2019" or "y" are expected mid-collection.
            if let InputCheck::Invalid(issue @ (InputIssue::EmptyInput | InputIssue::TooLong)) =
                validate_user_input(user_message)
            {
                return Ok((issue.user_message().to_string(), Some(spec.product)));
            }
            return self.collect(session_id, user_message, history, spec, correlation_id).await;
        }

        let intent = self.classifier.classify(user_message, history).await;
        tracing::debug!(
            event_name = "runtime.routed",
            session_id = %session_id,
            correlation_id,
            intent = ?intent.intent,
            product = intent.product.code(),
            "routing turn"
        );

        let reply = match (intent.intent, intent.product) {
            (IntentKind::InvalidInput, _) => match validate_user_input(user_message) {
                InputCheck::Invalid(issue) => issue.user_message().to_string(),
                InputCheck::Valid => CLARIFICATION_REPLY.to_string(),
            },
            (IntentKind::ProductInquiry, IntentProduct::Product(product)) => {
                match self.catalog.get(product) {
                    Some(spec) => {
                        self.collection
                            .sessions()
                            .update_conversation_context(
                                session_id,
                                ContextUpdate::active_product(product),
                            )
                            .await?;
                        return self
                            .collect(session_id, user_message, history, spec, correlation_id)
                            .await;
                    }
                    None => self.unsupported_product_reply(product),
                }
            }
            (IntentKind::ProductInquiry, _) => self.product_menu(),
            (IntentKind::Greeting, _) => GREETING_REPLY.to_string(),
            (IntentKind::Informational, _) => INFORMATIONAL_REPLY.to_string(),
            (IntentKind::PolicyClaimStatus, _) => CLAIM_STATUS_REPLY.to_string(),
            (IntentKind::Unwanted, _) if intent.requires_clarification => {
                CLARIFICATION_REPLY.to_string()
            }
            (IntentKind::Unwanted, _) => UNWANTED_REPLY.to_string(),
        };

        Ok((reply, None))
    }

    async fn collect(
        &self,
        session_id: &SessionId,
        user_message: &str,
        history: &[ConversationTurn],
        spec: &ProductSpec,
        correlation_id: &str,
    ) -> Result<(String, Option<ProductKind>), ApplicationError> {
        let reply = self
            .collection
            .advance_locked(user_message, history, session_id, spec, correlation_id)
            .await?;
        Ok((reply, Some(spec.product)))
    }

    fn product_menu(&self) -> String {
        let names: Vec<&str> = self
            .catalog
            .products()
            .filter_map(|product| self.catalog.get(product))
            .map(|spec| spec.display_name)
            .collect();
        format!("I can help you with {}. Which one would you like a quote for?", names.join(", "))
    }

    fn unsupported_product_reply(&self, product: ProductKind) -> String {
        format!(
            "Quotes for {} aren't available in this chat yet. {}",
            product.code().to_ascii_lowercase(),
            self.product_menu()
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use coverwise_core::domain::product::{ProductCatalog, ProductKind};
    use coverwise_core::domain::session::SessionId;
    use coverwise_db::{InMemorySessionRepository, SessionRepository};

    use super::{AgentRuntime, GREETING_REPLY};
    use crate::collection::CollectionAgent;
    use crate::extractor::{ExtractionRequest, ExtractionResult, FieldExtractor};
    use crate::intent::IntentClassifier;
    use crate::llm::{ChatRequest, LlmClient, LlmError};

    struct Reply(&'static str);

    #[async_trait]
    impl LlmClient for Reply {
        async fn complete(&self, _request: &ChatRequest) -> Result<String, LlmError> {
            Ok(self.0.to_string())
        }
    }

    struct AskNext;

    #[async_trait]
    impl FieldExtractor for AskNext {
        async fn extract(&self, _request: &ExtractionRequest) -> Result<ExtractionResult, LlmError> {
            let reply: Value = json!({ "car_model": "Honda Civic", "response": "Which year?" });
            ExtractionResult::from_reply(reply.as_object().cloned().unwrap_or_default())
        }
    }

    fn runtime(
        intent_reply: &'static str,
    ) -> (AgentRuntime<AskNext, Reply, InMemorySessionRepository, Reply>, Arc<InMemorySessionRepository>)
    {
        let sessions = Arc::new(InMemorySessionRepository::default());
        let collection = CollectionAgent::new(AskNext, Reply(r#"{"plan": "TP"}"#), sessions.clone());
        let classifier = IntentClassifier::new(Reply(intent_reply), 10);
        (AgentRuntime::new(ProductCatalog::default(), collection, classifier), sessions)
    }

    #[tokio::test]
    async fn greeting_gets_fixed_reply() {
        let (runtime, _) = runtime(r#"{"product": "UNKNOWN", "intent": "greeting"}"#);

        let reply = runtime.handle_turn(&SessionId::new("g"), "hello there", &[]).await;

        assert_eq!(reply.text, GREETING_REPLY);
        assert_eq!(reply.product, None);
    }

    #[tokio::test]
    async fn product_inquiry_activates_product_and_starts_collection() {
        let (runtime, sessions) = runtime(r#"{"product": "CAR", "intent": "product_inquiry"}"#);
        let id = SessionId::new("p");

        let reply = runtime.handle_turn(&id, "I need car insurance", &[]).await;

        assert_eq!(reply.text, "Which year?");
        assert_eq!(reply.product, Some(ProductKind::Car));
        let session = sessions.get_session(&id).await.expect("session");
        assert_eq!(session.context.active_product, Some(ProductKind::Car));
    }

    #[tokio::test]
    async fn active_collection_skips_classification_for_short_answers() {
        let (runtime, _) = runtime(r#"{"product": "UNKNOWN", "intent": "unwanted"}"#);
        let id = SessionId::new("c");
        runtime
            .collection
            .sessions()
            .update_conversation_context(
                &id,
                coverwise_core::domain::session::ContextUpdate::active_product(ProductKind::Car),
            )
            .await
            .expect("activate");

        let reply = runtime.handle_turn(&id, "2019", &[]).await;

        assert_eq!(reply.text, "Which year?");
        assert_eq!(reply.product, Some(ProductKind::Car));
    }

    #[tokio::test]
    async fn unregistered_product_gets_menu() {
        let (runtime, _) = runtime(r#"{"product": "TRAVEL", "intent": "product_inquiry"}"#);

        let reply = runtime.handle_turn(&SessionId::new("t"), "travel cover please", &[]).await;

        assert!(reply.text.contains("travel"));
        assert!(reply.text.contains("Car Protect 360"));
    }

    struct SlowIntentModel {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmClient for SlowIntentModel {
        async fn complete(&self, _request: &ChatRequest) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(r#"{"product": "CAR", "intent": "product_inquiry"}"#.to_string())
        }
    }

    #[tokio::test]
    async fn concurrent_first_turns_classify_once() {
        let sessions = Arc::new(InMemorySessionRepository::default());
        let intent_model = Arc::new(SlowIntentModel { calls: AtomicUsize::new(0) });
        let collection = CollectionAgent::new(AskNext, Reply(r#"{"plan": "TP"}"#), sessions);
        let runtime = AgentRuntime::new(
            ProductCatalog::default(),
            collection,
            IntentClassifier::new(intent_model.clone(), 10),
        );
        let id = SessionId::new("race");

        let (first, second) = tokio::join!(
            runtime.handle_turn(&id, "I need car insurance", &[]),
            runtime.handle_turn(&id, "car insurance please", &[]),
        );

        assert_eq!(intent_model.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.product, Some(ProductKind::Car));
        assert_eq!(second.product, Some(ProductKind::Car));
    }
}
