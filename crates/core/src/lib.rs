pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod normalize;
pub mod plans;

pub use audit::{AuditContext, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use domain::product::{DateBound, FieldKind, FieldSpec, ProductCatalog, ProductKind, ProductSpec};
pub use domain::session::{
    CollectedInfo, ContextUpdate, ConversationContext, FieldValue, Session, SessionId, Stage,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use plans::{PlanRules, Recommendation};
