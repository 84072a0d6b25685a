use std::sync::Arc;

use coverwise_core::domain::session::SessionId;
use coverwise_core::plans::{PlanRules, Recommendation};
use coverwise_db::SessionRepository;

use crate::llm::{ChatMessage, ChatRequest, LlmClient, ResponseFormat};
use crate::prompts::{recommendation_prompt, RECOMMENDATION_REQUEST};

/// Picks one allowed plan tier for a product from everything the session has
/// collected. Never fails: every failure path degrades to a fixed plan.
pub struct RecommendationSelector<L, R> {
    client: L,
    sessions: Arc<R>,
}

impl<L, R> RecommendationSelector<L, R>
where
    L: LlmClient,
    R: SessionRepository,
{
    pub fn new(client: L, sessions: Arc<R>) -> Self {
        Self { client, sessions }
    }

    pub async fn select_plan(&self, session_id: &SessionId, product_code: &str) -> Recommendation {
        let rules = PlanRules::for_product(product_code);

        let collected = match self.sessions.get_all_collected_info(session_id).await {
            Ok(collected) => collected,
            Err(error) => {
                tracing::error!(
                    event_name = "recommendation.session_read_failed",
                    session_id = %session_id,
                    product = %rules.product_code,
                    error = %error,
                    "could not load collected info"
                );
                return Recommendation::fallback(
                    rules.default_plan,
                    format!("session store failed: {error}"),
                );
            }
        };

        if collected.values().all(|info| info.is_empty()) {
            tracing::warn!(
                event_name = "recommendation.no_information",
                session_id = %session_id,
                product = %rules.product_code,
                "nothing collected for this session"
            );
            return Recommendation::unavailable();
        }

        let mut request = ChatRequest::new(
            vec![
                ChatMessage::system(recommendation_prompt(&rules, &collected)),
                ChatMessage::user(RECOMMENDATION_REQUEST),
            ],
            ResponseFormat::JsonObject,
        );
        request.temperature = Some(0.0);

        let reply = match self.client.complete(&request).await {
            Ok(reply) => reply,
            Err(error) => {
                tracing::error!(
                    event_name = "recommendation.llm_failed",
                    session_id = %session_id,
                    product = %rules.product_code,
                    error = %error,
                    "plan selection call failed, using default plan"
                );
                return Recommendation::fallback(rules.default_plan, format!("LLM call failed: {error}"));
            }
        };

        let recommendation = rules.parse_model_reply(&reply);
        tracing::info!(
            event_name = "recommendation.selected",
            session_id = %session_id,
            product = %rules.product_code,
            plan = %recommendation.plan,
            "plan selected"
        );
        recommendation
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use coverwise_core::domain::product::ProductKind;
    use coverwise_core::domain::session::{CollectedInfo, FieldValue, SessionId};
    use coverwise_core::plans::{Recommendation, NOT_AVAILABLE_PLAN};
    use coverwise_db::{InMemorySessionRepository, SessionRepository};

    use super::RecommendationSelector;
    use crate::llm::{ChatRequest, LlmClient, LlmError, ResponseFormat};

    struct ScriptedPlanClient {
        reply: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl ScriptedPlanClient {
        fn replying(reply: &'static str) -> Self {
            Self { reply: Some(reply), calls: AtomicUsize::new(0) }
        }

        fn failing() -> Self {
            Self { reply: None, calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedPlanClient {
        async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(request.response_format, ResponseFormat::JsonObject);
            match self.reply {
                Some(reply) => Ok(reply.to_string()),
                None => Err(LlmError::Transport("connection refused".to_string())),
            }
        }
    }

    async fn session_with_car_info() -> (Arc<InMemorySessionRepository>, SessionId) {
        let sessions = Arc::new(InMemorySessionRepository::default());
        let id = SessionId::new("s-rec");
        let mut info = CollectedInfo::new();
        info.insert("car_model", FieldValue::Text("Toyota Corolla".to_string()));
        info.insert("usage_type", FieldValue::Text("private".to_string()));
        sessions.set_collected_info(&id, ProductKind::Car, info).await.expect("seed");
        (sessions, id)
    }

    #[tokio::test]
    async fn empty_session_is_unavailable_without_model_call() {
        let sessions = Arc::new(InMemorySessionRepository::default());
        let client = Arc::new(ScriptedPlanClient::replying(r#"{"plan": "TP"}"#));
        let selector = RecommendationSelector::new(client.clone(), sessions);

        let recommendation = selector.select_plan(&SessionId::new("empty"), "CAR").await;

        assert_eq!(recommendation, Recommendation::unavailable());
        assert_eq!(recommendation.plan, NOT_AVAILABLE_PLAN);
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn transport_failure_falls_back_to_product_default() {
        let (sessions, id) = session_with_car_info().await;
        let selector = RecommendationSelector::new(ScriptedPlanClient::failing(), sessions);

        let recommendation = selector.select_plan(&id, "CAR").await;

        assert_eq!(recommendation.plan, "Comprehensive");
        let reason = recommendation.reason.expect("reason");
        assert!(reason.starts_with("LLM call failed: "));
        assert!(reason.contains("connection refused"));
    }

    #[tokio::test]
    async fn fenced_reply_is_normalised_onto_allowed_option() {
        let (sessions, id) = session_with_car_info().await;
        let selector = RecommendationSelector::new(
            ScriptedPlanClient::replying("```json\n{\"plan\": \"third party fire and theft\"}\n```"),
            sessions,
        );

        let recommendation = selector.select_plan(&id, "car").await;

        assert_eq!(recommendation, Recommendation::chosen("TPFT"));
    }

    #[tokio::test]
    async fn disallowed_plan_becomes_default() {
        let (sessions, id) = session_with_car_info().await;
        let selector = RecommendationSelector::new(
            ScriptedPlanClient::replying(r#"{"plan": "Platinium"}"#),
            sessions,
        );

        assert_eq!(selector.select_plan(&id, "CAR").await.plan, "Comprehensive");
    }

    #[tokio::test]
    async fn info_from_another_product_still_counts_as_collected() {
        let (sessions, id) = session_with_car_info().await;
        let selector = RecommendationSelector::new(
            ScriptedPlanClient::replying(r#"{"plan": "Standard"}"#),
            sessions,
        );

        let recommendation = selector.select_plan(&id, "EARLY").await;

        assert_eq!(recommendation, Recommendation::chosen("Standard"));
    }
}
