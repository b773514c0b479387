//! HTTP document store client
//!
//! Talks to a REST document API:
//! - `GET    {base}/collections/{collection}/documents/{id}` (404 = absent)
//! - `PATCH  {base}/collections/{collection}/documents/{id}` (merge write)
//! - `PUT    {base}/collections/{collection}/documents/{id}` (replace)
//! - `DELETE {base}/collections/{collection}/documents/{id}`
//!
//! Live subscriptions poll the document and emit on change.

use super::{DocumentStream, RemoteStore, StoreError};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use url::Url;

/// REST client for the cloud document store
///
/// Clones share the access token and the network switch. The composition
/// root keeps a clone so the identity provider can push a fresh token with
/// [`set_token`](Self::set_token) on sign-in and drop it with
/// [`clear_token`](Self::clear_token) on sign-out, while the engine keeps
/// using its own handle.
#[derive(Clone)]
pub struct HttpRemoteStore {
    client: Client,
    base_url: Url,
    /// Bearer token issued by the identity provider (cached in memory)
    access_token: Arc<RwLock<Option<String>>>,
    network_enabled: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl HttpRemoteStore {
    /// Create new store client
    pub fn new(
        base_url: Url,
        request_timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            client,
            base_url,
            access_token: Arc::new(RwLock::new(None)),
            network_enabled: Arc::new(AtomicBool::new(true)),
            poll_interval,
        })
    }

    /// Start with a token already cached
    pub fn with_token(self, token: String) -> Self {
        Self {
            access_token: Arc::new(RwLock::new(Some(token))),
            ..self
        }
    }

    /// Set access token (after sign-in); visible to every clone
    pub async fn set_token(&self, token: String) {
        let mut guard = self.access_token.write().await;
        *guard = Some(token);
    }

    /// Get current token
    pub async fn get_token(&self) -> Option<String> {
        self.access_token.read().await.clone()
    }

    /// Clear token (sign-out)
    pub async fn clear_token(&self) {
        let mut guard = self.access_token.write().await;
        *guard = None;
    }

    fn document_url(&self, collection: &str, document_id: &str) -> String {
        format!(
            "{}/collections/{}/documents/{}",
            self.base_url.as_str().trim_end_matches('/'),
            urlencoding::encode(collection),
            urlencoding::encode(document_id)
        )
    }

    fn ensure_network(&self) -> Result<(), StoreError> {
        if self.network_enabled.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(StoreError::NetworkDisabled)
        }
    }

    async fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.get_token().await {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn get(&self, collection: &str, document_id: &str) -> Result<Option<Value>, StoreError> {
        self.ensure_network()?;

        let request = self.client.get(self.document_url(collection, document_id));
        let response = self.authorize(request).await.send().await?;

        // Handle 404 as "no document yet"
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        handle_response(response).await.map(Some)
    }

    async fn set_merge(
        &self,
        collection: &str,
        document_id: &str,
        data: Value,
    ) -> Result<(), StoreError> {
        self.ensure_network()?;

        let request = self
            .client
            .patch(self.document_url(collection, document_id))
            .json(&data);
        let response = self.authorize(request).await.send().await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(handle_error(response).await)
        }
    }

    async fn set(&self, collection: &str, document_id: &str, data: Value) -> Result<(), StoreError> {
        self.ensure_network()?;

        let request = self
            .client
            .put(self.document_url(collection, document_id))
            .json(&data);
        let response = self.authorize(request).await.send().await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(handle_error(response).await)
        }
    }

    async fn delete(&self, collection: &str, document_id: &str) -> Result<(), StoreError> {
        self.ensure_network()?;

        let request = self.client.delete(self.document_url(collection, document_id));
        let response = self.authorize(request).await.send().await?;

        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(handle_error(response).await)
        }
    }

    async fn subscribe(
        &self,
        collection: &str,
        document_id: &str,
    ) -> Result<DocumentStream, StoreError> {
        self.ensure_network()?;

        let state = PollState {
            store: self.clone(),
            collection: collection.to_string(),
            document_id: document_id.to_string(),
            last: None,
            primed: false,
        };

        let stream = futures::stream::unfold(Some(state), |state| async move {
            let mut state = state?;
            if state.primed {
                tokio::time::sleep(state.store.poll_interval).await;
            }

            loop {
                match state.store.get(&state.collection, &state.document_id).await {
                    Ok(snapshot) => {
                        if !state.primed || snapshot != state.last {
                            state.primed = true;
                            state.last = snapshot.clone();
                            return Some((Ok(snapshot), Some(state)));
                        }
                    }
                    Err(e) => {
                        return Some((Err(StoreError::Subscription(e.to_string())), None));
                    }
                }
                tokio::time::sleep(state.store.poll_interval).await;
            }
        });

        Ok(stream.boxed())
    }

    async fn enable_network(&self) -> Result<(), StoreError> {
        self.network_enabled.store(true, Ordering::Relaxed);
        log::debug!("Remote store network enabled");
        Ok(())
    }

    async fn disable_network(&self) -> Result<(), StoreError> {
        self.network_enabled.store(false, Ordering::Relaxed);
        log::debug!("Remote store network disabled");
        Ok(())
    }
}

/// Polling state for one live subscription
struct PollState {
    store: HttpRemoteStore,
    collection: String,
    document_id: String,
    last: Option<Value>,
    primed: bool,
}

// ============================================================================
// Error Handling
// ============================================================================

/// Handle successful JSON response
async fn handle_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, StoreError> {
    let status = response.status();

    if status.is_success() {
        response
            .json::<T>()
            .await
            .map_err(|_| StoreError::InvalidResponse)
    } else {
        Err(handle_error(response).await)
    }
}

/// Convert error response to StoreError
async fn handle_error(response: reqwest::Response) -> StoreError {
    let status = response.status();

    match status {
        StatusCode::UNAUTHORIZED => StoreError::Unauthorized,
        StatusCode::FORBIDDEN => StoreError::PermissionDenied,
        StatusCode::TOO_MANY_REQUESTS => StoreError::RateLimitExceeded,
        s if s.is_server_error() => {
            let msg = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            StoreError::ServerError(msg)
        }
        _ => {
            let msg = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            StoreError::NetworkError(format!("{}: {}", status, msg))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn store_for(server: &Server) -> HttpRemoteStore {
        HttpRemoteStore::new(
            Url::parse(&server.url()).unwrap(),
            Duration::from_secs(5),
            Duration::from_millis(20),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_token_management() {
        let server = Server::new_async().await;
        let store = store_for(&server);

        store.set_token("test_token".to_string()).await;
        assert_eq!(store.get_token().await, Some("test_token".to_string()));

        store.clear_token().await;
        assert!(store.get_token().await.is_none());
    }

    #[tokio::test]
    async fn test_get_document() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/collections/todos/documents/u1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"todos": [{"id": "1"}], "userId": "u1"}"#)
            .create_async()
            .await;

        let store = store_for(&server);
        let doc = store.get("todos", "u1").await.unwrap();

        assert_eq!(doc, Some(json!({"todos": [{"id": "1"}], "userId": "u1"})));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_missing_document_is_none() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/collections/notes/documents/u1")
            .with_status(404)
            .create_async()
            .await;

        let store = store_for(&server);
        assert!(store.get("notes", "u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_merge_sends_patch_with_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PATCH", "/collections/todos/documents/u1")
            .match_header("authorization", "Bearer secret")
            .match_body(Matcher::Json(json!({"todos": [], "userId": "u1"})))
            .with_status(200)
            .create_async()
            .await;

        let store = store_for(&server);
        store.set_token("secret".to_string()).await;
        store
            .set_merge("todos", "u1", json!({"todos": [], "userId": "u1"}))
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_token_set_on_clone_reaches_shared_store() {
        let mut server = Server::new_async().await;
        let with_token = server
            .mock("GET", "/collections/todos/documents/u1")
            .match_header("authorization", "Bearer fresh")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let store = store_for(&server);
        let identity_handle = store.clone();
        identity_handle.set_token("fresh".to_string()).await;
        assert!(store.get("todos", "u1").await.unwrap().is_none());
        with_token.assert_async().await;
        with_token.remove_async().await;

        let anonymous = server
            .mock("GET", "/collections/todos/documents/u1")
            .match_header("authorization", Matcher::Missing)
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        identity_handle.clear_token().await;
        assert!(store.get_token().await.is_none());
        assert!(store.get("todos", "u1").await.unwrap().is_none());
        anonymous.assert_async().await;
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let mut server = Server::new_async().await;
        let _unauthorized = server
            .mock("GET", "/collections/todos/documents/u1")
            .with_status(401)
            .create_async()
            .await;
        let _server_error = server
            .mock("PATCH", "/collections/todos/documents/u1")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let store = store_for(&server);

        assert!(matches!(
            store.get("todos", "u1").await,
            Err(StoreError::Unauthorized)
        ));
        match store.set_merge("todos", "u1", json!({})).await {
            Err(StoreError::ServerError(msg)) => assert_eq!(msg, "boom"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("DELETE", "/collections/schedules/documents/u1")
            .with_status(404)
            .create_async()
            .await;

        let store = store_for(&server);
        store.delete("schedules", "u1").await.unwrap();
    }

    #[tokio::test]
    async fn test_disabled_network_skips_request() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/collections/todos/documents/u1")
            .expect(0)
            .create_async()
            .await;

        let store = store_for(&server);
        store.disable_network().await.unwrap();

        assert!(matches!(
            store.get("todos", "u1").await,
            Err(StoreError::NetworkDisabled)
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_subscription_emits_initial_snapshot() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/collections/notes/documents/u1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"notes": ["hello"]}"#)
            .create_async()
            .await;

        let store = store_for(&server);
        let mut feed = store.subscribe("notes", "u1").await.unwrap();

        let first = feed.next().await.unwrap().unwrap();
        assert_eq!(first, Some(json!({"notes": ["hello"]})));
    }
}
