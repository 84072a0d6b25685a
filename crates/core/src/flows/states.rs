use serde::{Deserialize, Serialize};

pub use crate::domain::session::Stage;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowType {
    CollectThenRecommend,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEvent {
    FieldsMerged,
    RecommendationIssued,
    RecommendationFailed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowContext {
    pub missing_required_fields: Vec<String>,
}

impl FlowContext {
    pub fn with_missing(missing_required_fields: Vec<String>) -> Self {
        Self { missing_required_fields }
    }

    pub fn is_complete(&self) -> bool {
        self.missing_required_fields.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    PromptForMissingFields,
    SelectPlan,
    RecordRecommendedPlan,
    ComposeRecommendation,
    ReplyWithApology,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: Stage,
    pub to: Stage,
    pub event: FlowEvent,
    pub actions: Vec<FlowAction>,
}

impl TransitionOutcome {
    pub fn requires(&self, action: &FlowAction) -> bool {
        self.actions.contains(action)
    }
}
