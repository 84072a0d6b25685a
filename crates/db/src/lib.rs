pub mod locks;
pub mod repositories;

pub use locks::{SessionGuard, SessionLocks};
pub use repositories::{InMemorySessionRepository, RepositoryError, SessionRepository};
