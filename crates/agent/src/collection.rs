use std::sync::Arc;

use chrono::{Local, NaiveDate};
use uuid::Uuid;

use coverwise_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink,
};
use coverwise_core::config::AgentConfig;
use coverwise_core::domain::product::ProductSpec;
use coverwise_core::domain::session::{ContextUpdate, SessionId, Stage};
use coverwise_core::errors::{ApplicationError, DomainError};
use coverwise_core::flows::{
    CollectThenRecommendFlow, FlowAction, FlowContext, FlowEngine, FlowEvent,
};
use coverwise_db::{SessionLocks, SessionRepository};

use crate::extractor::{ConversationTurn, ExtractionRequest, FieldExtractor};
use crate::llm::LlmClient;
use crate::prompts::{extraction_instructions, recent_history};
use crate::recommendation::RecommendationSelector;

const DEFAULT_HISTORY_LIMIT: usize = 20;
const DEFAULT_ACTOR: &str = "collection-agent";

/// Drives one product's collect-then-recommend conversation.
///
/// Each turn extracts fields from the user's message, merges them into the
/// session and, once every required field is present, asks the
/// [`RecommendationSelector`] for a plan tier.
pub struct CollectionAgent<E, L, R> {
    extractor: E,
    selector: RecommendationSelector<L, R>,
    sessions: Arc<R>,
    locks: SessionLocks,
    flow: FlowEngine<CollectThenRecommendFlow>,
    audit: Arc<dyn AuditSink>,
    history_limit: usize,
    actor: String,
    today: fn() -> NaiveDate,
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

impl<E, L, R> CollectionAgent<E, L, R>
where
    E: FieldExtractor,
    L: LlmClient,
    R: SessionRepository,
{
    pub fn new(extractor: E, plan_client: L, sessions: Arc<R>) -> Self {
        Self {
            extractor,
            selector: RecommendationSelector::new(plan_client, sessions.clone()),
            sessions,
            locks: SessionLocks::default(),
            flow: FlowEngine::default(),
            audit: Arc::new(TracingAuditSink),
            history_limit: DEFAULT_HISTORY_LIMIT,
            actor: DEFAULT_ACTOR.to_string(),
            today: local_today,
        }
    }

    pub fn with_agent_config(mut self, config: &AgentConfig) -> Self {
        self.history_limit = config.history_limit;
        self.actor = config.actor.clone();
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_locks(mut self, locks: SessionLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_clock(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn sessions(&self) -> &Arc<R> {
        &self.sessions
    }

    pub async fn advance_collection(
        &self,
        user_message: &str,
        history: &[ConversationTurn],
        session_id: &SessionId,
        spec: &ProductSpec,
    ) -> Result<String, ApplicationError> {
        let correlation_id = Uuid::new_v4().to_string();
        self.advance_collection_traced(user_message, history, session_id, spec, &correlation_id)
            .await
    }

    /// Same as [`Self::advance_collection`] with a caller-supplied correlation id.
    pub async fn advance_collection_traced(
        &self,
        user_message: &str,
        history: &[ConversationTurn],
        session_id: &SessionId,
        spec: &ProductSpec,
        correlation_id: &str,
    ) -> Result<String, ApplicationError> {
        let _turn = self.locks.lock(session_id).await;
        self.advance_locked(user_message, history, session_id, spec, correlation_id).await
    }

    pub(crate) fn locks(&self) -> &SessionLocks {
        &self.locks
    }

    /// One collection turn. The caller must hold the session's lock.
    pub(crate) async fn advance_locked(
        &self,
        user_message: &str,
        history: &[ConversationTurn],
        session_id: &SessionId,
        spec: &ProductSpec,
        correlation_id: &str,
    ) -> Result<String, ApplicationError> {
        let product = spec.product;
        let audit = AuditContext::new(session_id.as_str(), Some(product), correlation_id, &self.actor);

        let session = self.sessions.get_session(session_id).await?;
        let current_stage = session.stage(product);
        let mut collected = session.collected(product);
        let today = (self.today)();

        let request = ExtractionRequest {
            instructions: extraction_instructions(spec, today),
            collected: collected.clone(),
            history: recent_history(history, self.history_limit).to_vec(),
            user_message: user_message.to_string(),
            schema_name: spec.schema_name(),
            schema: spec.json_schema(),
        };

        let extraction = match self.extractor.extract(&request).await {
            Ok(extraction) => extraction,
            Err(error) => {
                self.audit.emit(
                    AuditEvent::from_context(
                        &audit,
                        "collection.extraction_failed",
                        AuditCategory::Extraction,
                        AuditOutcome::Failed,
                    )
                    .with_metadata("error", error.to_string()),
                );
                return Err(ApplicationError::Integration(format!(
                    "field extraction failed for {}: {error}",
                    product.code()
                )));
            }
        };

        let updated = collected.merge(spec, &extraction.fields, today);
        self.sessions.set_collected_info(session_id, product, collected.clone()).await?;
        self.audit.emit(
            AuditEvent::from_context(
                &audit,
                "collection.fields_merged",
                AuditCategory::Persistence,
                AuditOutcome::Success,
            )
            .with_metadata("updated_fields", updated.join(",")),
        );

        let context = FlowContext::with_missing(collected.missing_fields(spec));
        let outcome = self
            .flow
            .apply_with_audit(
                &current_stage,
                &FlowEvent::FieldsMerged,
                &context,
                self.audit.as_ref(),
                &audit,
            )
            .map_err(DomainError::from)?;

        if outcome.requires(&FlowAction::PromptForMissingFields) {
            tracing::info!(
                event_name = "collection.awaiting_fields",
                session_id = %session_id,
                product = product.code(),
                correlation_id,
                missing = %context.missing_required_fields.join(","),
                "fields still missing"
            );
            return Ok(extraction.response);
        }

        if outcome.to != outcome.from {
            self.sessions.set_stage(session_id, product, outcome.to).await?;
        }

        Ok(self.recommend(session_id, spec, &audit).await)
    }

    /// Recommendation branch. Every failure here becomes the product's apology
    /// and the stage stays at [`Stage::Recommendation`].
    async fn recommend(&self, session_id: &SessionId, spec: &ProductSpec, audit: &AuditContext) -> String {
        let product = spec.product;
        let recommendation = self.selector.select_plan(session_id, product.code()).await;

        let failure = if !recommendation.is_available() {
            Some(recommendation.reason.clone().unwrap_or_else(|| "no plan available".to_string()))
        } else {
            match self
                .sessions
                .update_conversation_context(
                    session_id,
                    ContextUpdate::recommended_plan(recommendation.plan.clone()),
                )
                .await
            {
                Ok(()) => None,
                Err(error) => Some(format!("could not store recommended plan: {error}")),
            }
        };

        let event = match failure {
            None => FlowEvent::RecommendationIssued,
            Some(ref reason) => {
                tracing::error!(
                    event_name = "collection.recommendation_failed",
                    session_id = %session_id,
                    product = product.code(),
                    correlation_id = %audit.correlation_id,
                    reason = %reason,
                    "replying with apology"
                );
                FlowEvent::RecommendationFailed
            }
        };

        let outcome = self.flow.apply_with_audit(
            &Stage::Recommendation,
            &event,
            &FlowContext::default(),
            self.audit.as_ref(),
            audit,
        );

        match outcome {
            Ok(outcome) if outcome.requires(&FlowAction::ComposeRecommendation) => {
                let mut event = AuditEvent::from_context(
                    audit,
                    "recommendation.issued",
                    AuditCategory::Recommendation,
                    AuditOutcome::Success,
                )
                .with_metadata("plan", recommendation.plan.clone());
                if let Some(reason) = &recommendation.reason {
                    event = event.with_metadata("reason", reason.clone());
                }
                self.audit.emit(event);
                spec.copy.render(&recommendation.plan)
            }
            Ok(_) | Err(_) => spec.copy.apology.to_string(),
        }
    }
}
