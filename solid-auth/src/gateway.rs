//! Authorized operation gateway
//!
//! The only way a delegated Pod operation obtains a credential. Local session
//! state is checked here, before any network call; failures reported by the
//! Pod afterwards never feed back into the session store.

use crate::credential::Credential;
use crate::error::Result;
use crate::session::SessionStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct SessionGateway {
    store: Arc<SessionStore>,
}

impl SessionGateway {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    /// Resolve a session id to its credential
    pub async fn authorize(&self, session_id: Option<&str>) -> Result<Credential> {
        self.store.resolve(session_id).await
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{AuthenticatedFetch, FetchRequest};
    use crate::error::SolidError;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::time::Duration;

    #[derive(Debug)]
    struct StubFetch;

    #[async_trait]
    impl AuthenticatedFetch for StubFetch {
        async fn fetch(&self, _request: FetchRequest) -> Result<reqwest::Response> {
            Err(SolidError::Internal("stub".into()))
        }
    }

    #[tokio::test]
    async fn test_authorize_delegates_to_store() {
        let store = Arc::new(SessionStore::new());
        let gateway = SessionGateway::new(store.clone());
        let credential: Credential = Arc::new(StubFetch);
        let id = store
            .create(credential.clone(), "webid", Duration::from_secs(60))
            .await;

        let resolved = gateway.authorize(Some(id.as_str())).await.unwrap();
        assert!(Arc::ptr_eq(&resolved, &credential));
        assert_matches!(gateway.authorize(None).await, Err(SolidError::BadRequest(_)));
        assert_matches!(
            gateway.authorize(Some("unknown-id")).await,
            Err(SolidError::Unauthorized(_))
        );
    }
}
