pub mod engine;
pub mod states;

pub use engine::{CollectThenRecommendFlow, FlowDefinition, FlowEngine, FlowTransitionError};
pub use states::{FlowAction, FlowContext, FlowEvent, FlowType, Stage, TransitionOutcome};
