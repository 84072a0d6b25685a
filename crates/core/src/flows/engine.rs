use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::flows::states::{FlowAction, FlowContext, FlowEvent, FlowType, Stage, TransitionOutcome};

pub trait FlowDefinition {
    fn flow_type(&self) -> FlowType;
    fn initial_state(&self) -> Stage;
    fn transition(
        &self,
        current: &Stage,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// Gathers required fields, then hands off to plan selection exactly once per product.
#[derive(Clone, Debug, Default)]
pub struct CollectThenRecommendFlow;

impl FlowDefinition for CollectThenRecommendFlow {
    fn flow_type(&self) -> FlowType {
        FlowType::CollectThenRecommend
    }

    fn initial_state(&self) -> Stage {
        Stage::Collecting
    }

    fn transition(
        &self,
        current: &Stage,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_collect_then_recommend(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn flow_type(&self) -> FlowType {
        self.flow.flow_type()
    }

    pub fn initial_state(&self) -> Stage {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &Stage,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &Stage,
        event: &FlowEvent,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "flow.transition_applied",
                        AuditCategory::Flow,
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", format!("{:?}", outcome.from))
                    .with_metadata("to", format!("{:?}", outcome.to))
                    .with_metadata("event", format!("{:?}", outcome.event))
                    .with_metadata(
                        "missing_fields",
                        context.missing_required_fields.join(","),
                    ),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "flow.transition_rejected",
                        AuditCategory::Flow,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<CollectThenRecommendFlow> {
    fn default() -> Self {
        Self::new(CollectThenRecommendFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("required fields went missing after recommendation stage was reached: {missing_fields:?}")]
    CompletenessRegressed { missing_fields: Vec<String> },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: Stage, event: FlowEvent },
}

fn transition_collect_then_recommend(
    current: &Stage,
    event: &FlowEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use FlowAction::{
        ComposeRecommendation, PromptForMissingFields, RecordRecommendedPlan, ReplyWithApology,
        SelectPlan,
    };
    use FlowEvent::{FieldsMerged, RecommendationFailed, RecommendationIssued};
    use Stage::{Collecting, Recommendation};

    let (to, actions) = match (current, event) {
        (Collecting, FieldsMerged) if !context.is_complete() => {
            (Collecting, vec![PromptForMissingFields])
        }
        (Collecting, FieldsMerged) => (Recommendation, vec![SelectPlan]),
        (Recommendation, FieldsMerged) => {
            if !context.is_complete() {
                return Err(FlowTransitionError::CompletenessRegressed {
                    missing_fields: context.missing_required_fields.clone(),
                });
            }
            (Recommendation, vec![SelectPlan])
        }
        (Recommendation, RecommendationIssued) => {
            (Recommendation, vec![RecordRecommendedPlan, ComposeRecommendation])
        }
        (Recommendation, RecommendationFailed) => (Recommendation, vec![ReplyWithApology]),
        _ => {
            return Err(FlowTransitionError::InvalidTransition {
                state: *current,
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: event.clone(), actions })
}
