use std::collections::{BTreeMap, HashMap};

use tokio::sync::RwLock;

use coverwise_core::domain::product::ProductKind;
use coverwise_core::domain::session::{CollectedInfo, ContextUpdate, Session, SessionId, Stage};

use super::{RepositoryError, SessionRepository};

#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemorySessionRepository {
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn mutate<F>(&self, id: &SessionId, apply: F)
    where
        F: FnOnce(&mut Session) + Send,
    {
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(id.0.clone()).or_insert_with(|| {
            tracing::debug!(event_name = "session.created", session_id = %id, "new session");
            Session::new(id.clone())
        });
        apply(session);
        session.touch();
    }
}

#[async_trait::async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn get_session(&self, id: &SessionId) -> Result<Session, RepositoryError> {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(&id.0) {
                return Ok(session.clone());
            }
        }

        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(id.0.clone()).or_insert_with(|| {
            tracing::debug!(event_name = "session.created", session_id = %id, "new session");
            Session::new(id.clone())
        });
        Ok(session.clone())
    }

    async fn get_collected_info(
        &self,
        id: &SessionId,
        product: ProductKind,
    ) -> Result<CollectedInfo, RepositoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&id.0).map(|session| session.collected(product)).unwrap_or_default())
    }

    async fn get_all_collected_info(
        &self,
        id: &SessionId,
    ) -> Result<BTreeMap<ProductKind, CollectedInfo>, RepositoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&id.0).map(|session| session.collected_info.clone()).unwrap_or_default())
    }

    async fn set_collected_info(
        &self,
        id: &SessionId,
        product: ProductKind,
        info: CollectedInfo,
    ) -> Result<(), RepositoryError> {
        self.mutate(id, move |session| {
            session.collected_info.insert(product, info);
        })
        .await;
        Ok(())
    }

    async fn set_stage(
        &self,
        id: &SessionId,
        product: ProductKind,
        stage: Stage,
    ) -> Result<(), RepositoryError> {
        self.mutate(id, move |session| {
            session.stages.insert(product, stage);
        })
        .await;
        Ok(())
    }

    async fn update_conversation_context(
        &self,
        id: &SessionId,
        update: ContextUpdate,
    ) -> Result<(), RepositoryError> {
        self.mutate(id, move |session| session.context.apply(update)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use coverwise_core::domain::product::ProductKind;
    use coverwise_core::domain::session::{
        CollectedInfo, ContextUpdate, FieldValue, SessionId, Stage,
    };

    use crate::repositories::{InMemorySessionRepository, SessionRepository};

    #[tokio::test]
    async fn unknown_session_reads_as_empty() {
        let repo = InMemorySessionRepository::default();
        let id = SessionId::new("s-unknown");

        let info = repo.get_collected_info(&id, ProductKind::Car).await.expect("collected info");
        let all = repo.get_all_collected_info(&id).await.expect("all collected info");

        assert!(info.is_empty());
        assert!(all.is_empty());
        assert_eq!(repo.session_count().await, 0);
    }

    #[tokio::test]
    async fn get_session_creates_empty_session_on_first_access() {
        let repo = InMemorySessionRepository::default();
        let id = SessionId::new("s-1");

        let session = repo.get_session(&id).await.expect("session");

        assert_eq!(session.id, id);
        assert_eq!(session.stage(ProductKind::Car), Stage::Collecting);
        assert!(!session.has_collected_anything());
        assert_eq!(repo.session_count().await, 1);
    }

    #[tokio::test]
    async fn collected_info_round_trip_is_scoped_per_product() {
        let repo = InMemorySessionRepository::default();
        let id = SessionId::new("s-2");
        let mut info = CollectedInfo::new();
        info.insert("car_model", FieldValue::Text("Toyota Corolla".to_string()));

        repo.set_collected_info(&id, ProductKind::Car, info.clone()).await.expect("save info");

        let car = repo.get_collected_info(&id, ProductKind::Car).await.expect("car info");
        let early = repo.get_collected_info(&id, ProductKind::Early).await.expect("early info");
        let all = repo.get_all_collected_info(&id).await.expect("all info");

        assert_eq!(car, info);
        assert!(early.is_empty());
        assert_eq!(all.get(&ProductKind::Car), Some(&info));
    }

    #[tokio::test]
    async fn stage_and_context_updates_persist() {
        let repo = InMemorySessionRepository::default();
        let id = SessionId::new("s-3");

        repo.set_stage(&id, ProductKind::Choice, Stage::Recommendation).await.expect("stage");
        repo.update_conversation_context(&id, ContextUpdate::active_product(ProductKind::Choice))
            .await
            .expect("active product");
        repo.update_conversation_context(&id, ContextUpdate::recommended_plan("Plan 3"))
            .await
            .expect("plan");

        let session = repo.get_session(&id).await.expect("session");
        assert_eq!(session.stage(ProductKind::Choice), Stage::Recommendation);
        assert_eq!(session.stage(ProductKind::Car), Stage::Collecting);
        assert_eq!(session.context.active_product, Some(ProductKind::Choice));
        assert_eq!(session.context.recommended_plan.as_deref(), Some("Plan 3"));
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let repo = InMemorySessionRepository::default();
        let mut info = CollectedInfo::new();
        info.insert("has_license", FieldValue::Boolean(true));

        repo.set_collected_info(&SessionId::new("a"), ProductKind::Car, info)
            .await
            .expect("save");

        let other = repo
            .get_collected_info(&SessionId::new("b"), ProductKind::Car)
            .await
            .expect("other session");
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn session_serialises_with_product_keys() {
        let repo = InMemorySessionRepository::default();
        let id = SessionId::new("s-json");
        let mut info = CollectedInfo::new();
        info.insert("car_year", FieldValue::Integer(2019));
        repo.set_collected_info(&id, ProductKind::Car, info).await.expect("save");

        let session = repo.get_session(&id).await.expect("session");
        let json = serde_json::to_value(&session).expect("serialize session");

        assert_eq!(json["collected_info"]["CAR"]["car_year"], 2019);
    }
}
