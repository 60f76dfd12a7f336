use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::error::STATUS_UNAUTHORIZED;
use super::{bearer_header, ApiRequest, ApiResponse, ClientError, HttpTransport};
use crate::models::RefreshResponse;
use crate::session::SessionStore;

pub const REFRESH_PATH: &str = "/auth/refresh";

/// Where the refresh-on-401 protocol currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AuthState {
    Normal = 0,
    Refreshing = 1,
    /// Refresh failed and the session was cleared; the user must log in again
    Failed = 2,
}

impl AuthState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => AuthState::Refreshing,
            2 => AuthState::Failed,
            _ => AuthState::Normal,
        }
    }
}

/// Exchanges a refresh token for a new token pair
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ClientError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Calls `POST /auth/refresh` directly on the transport, bypassing
/// [`ApiClient`] so a failing refresh can never trigger another refresh
pub struct HttpTokenRefresher {
    transport: Arc<dyn HttpTransport>,
}

impl HttpTokenRefresher {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ClientError> {
        let request = ApiRequest::post(REFRESH_PATH).json(&RefreshRequest { refresh_token })?;
        let response = self.transport.send(&request).await?;

        if !response.is_success() {
            return Err(ClientError::from_response(&response));
        }
        response.json()
    }
}

/// Authenticated client for the book review API
///
/// Every request gets the stored access token as a bearer credential. A 401
/// on a request that has not been retried yet triggers one token refresh and
/// one resubmission; if the refresh fails the session is cleared and the
/// original 401 is returned.
///
/// Refreshes are serialized: a request that waited on another request's
/// refresh reuses the token it produced instead of refreshing again.
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    session: Arc<dyn SessionStore>,
    refresher: Arc<dyn TokenRefresher>,
    refresh_guard: Mutex<()>,
    state: AtomicU8,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        session: Arc<dyn SessionStore>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        Self {
            transport,
            session,
            refresher,
            refresh_guard: Mutex::new(()),
            state: AtomicU8::new(AuthState::Normal as u8),
        }
    }

    pub fn session(&self) -> &dyn SessionStore {
        self.session.as_ref()
    }

    pub fn auth_state(&self) -> AuthState {
        AuthState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Back to `Normal`, e.g. after a fresh login
    pub fn reset_auth_state(&self) {
        self.set_state(AuthState::Normal);
    }

    fn set_state(&self, state: AuthState) {
        let previous = AuthState::from_u8(self.state.swap(state as u8, Ordering::SeqCst));
        if previous != state {
            tracing::debug!("auth state {:?} -> {:?}", previous, state);
        }
    }

    /// Attach the stored access token, if there is one
    pub fn authorize(&self, mut request: ApiRequest) -> ApiRequest {
        if let Some(token) = self.session.access_token() {
            request.authorization = Some(bearer_header(&token));
        }
        request
    }

    /// Send a request through the bearer/refresh protocol
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let request = self.authorize(request);
        let response = self.transport.send(&request).await?;

        if response.is_success() {
            return Ok(response);
        }
        if response.status == STATUS_UNAUTHORIZED && !request.retried {
            return self.recover(request, response).await;
        }
        Err(ClientError::from_response(&response))
    }

    /// Send a request and decode its JSON body
    pub async fn fetch<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ClientError> {
        self.execute(request).await?.json()
    }

    async fn recover(
        &self,
        mut request: ApiRequest,
        unauthorized: ApiResponse,
    ) -> Result<ApiResponse, ClientError> {
        request.retried = true;
        let original_error = ClientError::from_response(&unauthorized);

        let access_token = {
            let _guard = self.refresh_guard.lock().await;

            // Another request may have rotated the tokens while we waited
            match self.session.access_token() {
                Some(current) if request.bearer_token() != Some(current.as_str()) => {
                    tracing::debug!("Retrying {} with a token refreshed elsewhere", request.path);
                    current
                }
                _ => match self.refresh_tokens().await {
                    Ok(token) => token,
                    Err(e) => {
                        tracing::warn!("Token refresh failed: {}", e);
                        self.expire_session();
                        return Err(original_error);
                    }
                },
            }
        };

        self.set_state(AuthState::Normal);
        request.authorization = Some(bearer_header(&access_token));

        // Final attempt: whatever comes back is the result
        let response = self.transport.send(&request).await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(ClientError::from_response(&response))
        }
    }

    async fn refresh_tokens(&self) -> Result<String, ClientError> {
        self.set_state(AuthState::Refreshing);

        let refresh_token = self
            .session
            .refresh_token()
            .ok_or(ClientError::MissingRefreshToken)?;
        let tokens = self.refresher.refresh(&refresh_token).await?;

        let next_refresh_token = tokens.refresh_token.unwrap_or(refresh_token);
        self.session
            .update_tokens(&tokens.access_token, &next_refresh_token)?;

        tracing::info!("Access token refreshed");
        Ok(tokens.access_token)
    }

    fn expire_session(&self) {
        if let Err(e) = self.session.clear() {
            tracing::error!("Could not clear session after failed refresh: {}", e);
        }
        self.set_state(AuthState::Failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::ScriptedTransport;
    use crate::session::tests::{sample_session, sample_user};
    use crate::session::{MemorySessionStore, Session};
    use std::sync::Mutex as StdMutex;

    /// How a scripted refresh fails
    enum RefreshFailure {
        Status(u16),
        Unreachable,
    }

    /// Refresher that answers from a script and counts calls
    struct ScriptedRefresher {
        outcome: Result<RefreshResponse, RefreshFailure>,
        calls: StdMutex<Vec<String>>,
    }

    impl ScriptedRefresher {
        fn succeeding(access: &str, refresh: Option<&str>) -> Self {
            Self {
                outcome: Ok(RefreshResponse {
                    access_token: access.to_string(),
                    refresh_token: refresh.map(str::to_string),
                }),
                calls: StdMutex::new(Vec::new()),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                outcome: Err(RefreshFailure::Status(status)),
                calls: StdMutex::new(Vec::new()),
            }
        }

        fn unreachable() -> Self {
            Self {
                outcome: Err(RefreshFailure::Unreachable),
                calls: StdMutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TokenRefresher for ScriptedRefresher {
        async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ClientError> {
            self.calls.lock().unwrap().push(refresh_token.to_string());
            // Give concurrent requests a chance to pile up behind the guard
            tokio::task::yield_now().await;
            match &self.outcome {
                Ok(tokens) => Ok(tokens.clone()),
                Err(RefreshFailure::Status(status)) => Err(ClientError::from_response(&ApiResponse {
                    status: *status,
                    body: String::new(),
                })),
                Err(RefreshFailure::Unreachable) => {
                    Err(ClientError::Transport("connection refused".to_string()))
                }
            }
        }
    }

    fn client(
        transport: &Arc<ScriptedTransport>,
        store: &Arc<MemorySessionStore>,
        refresher: &Arc<ScriptedRefresher>,
    ) -> ApiClient {
        ApiClient::new(transport.clone(), store.clone(), refresher.clone())
    }

    #[tokio::test]
    async fn test_attaches_stored_token() {
        let transport = Arc::new(ScriptedTransport::new(vec![(200, "{}")]));
        let store = Arc::new(MemorySessionStore::with_session(sample_session("A1", "R1")));
        let refresher = Arc::new(ScriptedRefresher::failing(401));

        client(&transport, &store, &refresher)
            .execute(ApiRequest::get("/books"))
            .await
            .unwrap();

        let sent = transport.sent();
        assert_eq!(sent[0].authorization.as_deref(), Some("Bearer A1"));
        assert!(refresher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_no_token_means_no_header() {
        let transport = Arc::new(ScriptedTransport::new(vec![(200, "[]")]));
        let store = Arc::new(MemorySessionStore::new());
        let refresher = Arc::new(ScriptedRefresher::failing(401));

        client(&transport, &store, &refresher)
            .execute(ApiRequest::get("/recommendations/top-rated"))
            .await
            .unwrap();

        assert!(transport.sent()[0].authorization.is_none());
    }

    #[tokio::test]
    async fn test_refresh_and_retry_once() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            (401, ""),
            (200, r#"{"id":5}"#),
        ]));
        let store = Arc::new(MemorySessionStore::with_session(sample_session("A1", "R1")));
        let refresher = Arc::new(ScriptedRefresher::succeeding("A2", Some("R2")));
        let client = client(&transport, &store, &refresher);

        let response = client.execute(ApiRequest::get("/books/5")).await.unwrap();

        assert_eq!(response.body, r#"{"id":5}"#);
        assert_eq!(refresher.calls(), vec!["R1".to_string()]);

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].authorization.as_deref(), Some("Bearer A1"));
        assert_eq!(sent[1].path, "/books/5");
        assert_eq!(sent[1].authorization.as_deref(), Some("Bearer A2"));
        assert!(sent[1].retried);

        let session = store.load().unwrap();
        assert_eq!(session.access_token.as_deref(), Some("A2"));
        assert_eq!(session.refresh_token.as_deref(), Some("R2"));
        assert_eq!(session.user, Some(sample_user()));
        assert_eq!(client.auth_state(), AuthState::Normal);
    }

    #[tokio::test]
    async fn test_retry_outcome_is_final() {
        let transport = Arc::new(ScriptedTransport::new(vec![(401, ""), (401, "")]));
        let store = Arc::new(MemorySessionStore::with_session(sample_session("A1", "R1")));
        let refresher = Arc::new(ScriptedRefresher::succeeding("A2", Some("R2")));

        let error = client(&transport, &store, &refresher)
            .execute(ApiRequest::get("/users/my-profile"))
            .await
            .unwrap_err();

        assert!(error.is_unauthorized());
        assert_eq!(refresher.calls().len(), 1);
        assert_eq!(transport.sent().len(), 2);
        // The refreshed tokens stay; only a failed refresh clears the session
        assert_eq!(store.access_token().as_deref(), Some("A2"));
    }

    #[tokio::test]
    async fn test_missing_refresh_token_clears_session() {
        let transport = Arc::new(ScriptedTransport::new(vec![(
            401,
            r#"{"status":401,"message":"Token expired"}"#,
        )]));
        let store = Arc::new(MemorySessionStore::with_session(Session {
            refresh_token: None,
            ..sample_session("A1", "unused")
        }));
        let refresher = Arc::new(ScriptedRefresher::succeeding("A2", Some("R2")));
        let client = client(&transport, &store, &refresher);

        let error = client.execute(ApiRequest::get("/reviews/my-reviews")).await.unwrap_err();

        assert!(error.is_unauthorized());
        assert_eq!(error.to_string(), "HTTP 401: Token expired");
        assert!(refresher.calls().is_empty());
        assert!(store.load().unwrap().is_empty());
        assert_eq!(client.auth_state(), AuthState::Failed);
    }

    #[tokio::test]
    async fn test_already_retried_request_is_not_refreshed() {
        let transport = Arc::new(ScriptedTransport::new(vec![(401, "")]));
        let store = Arc::new(MemorySessionStore::with_session(sample_session("A1", "R1")));
        let refresher = Arc::new(ScriptedRefresher::succeeding("A2", Some("R2")));

        let mut request = ApiRequest::get("/books/5");
        request.retried = true;
        let error = client(&transport, &store, &refresher)
            .execute(request)
            .await
            .unwrap_err();

        assert!(error.is_unauthorized());
        assert!(refresher.calls().is_empty());
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(store.access_token().as_deref(), Some("A1"));
    }

    #[tokio::test]
    async fn test_failed_refresh_propagates_original_error() {
        let transport = Arc::new(ScriptedTransport::new(vec![(
            401,
            r#"{"message":"JWT expired"}"#,
        )]));
        let store = Arc::new(MemorySessionStore::with_session(sample_session("A1", "R1")));
        let refresher = Arc::new(ScriptedRefresher::failing(401));
        let client = client(&transport, &store, &refresher);

        let error = client.execute(ApiRequest::get("/books/5")).await.unwrap_err();

        assert_eq!(error.to_string(), "HTTP 401: JWT expired");
        assert_eq!(refresher.calls(), vec!["R1".to_string()]);
        assert_eq!(transport.sent().len(), 1);

        let session = store.load().unwrap();
        assert!(session.access_token.is_none());
        assert!(session.refresh_token.is_none());
        assert!(session.user.is_none());
        assert_eq!(client.auth_state(), AuthState::Failed);
    }

    #[tokio::test]
    async fn test_other_errors_pass_through() {
        let transport = Arc::new(ScriptedTransport::new(vec![(403, ""), (500, "boom")]));
        let store = Arc::new(MemorySessionStore::with_session(sample_session("A1", "R1")));
        let refresher = Arc::new(ScriptedRefresher::succeeding("A2", Some("R2")));
        let client = client(&transport, &store, &refresher);

        let forbidden = client.execute(ApiRequest::delete("/books/5")).await.unwrap_err();
        let server = client.execute(ApiRequest::get("/books")).await.unwrap_err();

        assert_eq!(forbidden.status(), Some(403));
        assert_eq!(server.to_string(), "HTTP 500: boom");
        assert!(refresher.calls().is_empty());
        assert_eq!(store.access_token().as_deref(), Some("A1"));
    }

    #[tokio::test]
    async fn test_refresh_without_new_refresh_token_keeps_old_one() {
        let transport = Arc::new(ScriptedTransport::new(vec![(401, ""), (204, "")]));
        let store = Arc::new(MemorySessionStore::with_session(sample_session("A1", "R1")));
        let refresher = Arc::new(ScriptedRefresher::succeeding("A2", None));

        client(&transport, &store, &refresher)
            .execute(ApiRequest::post("/users/favorites/books/5"))
            .await
            .unwrap();

        let session = store.load().unwrap();
        assert_eq!(session.access_token.as_deref(), Some("A2"));
        assert_eq!(session.refresh_token.as_deref(), Some("R1"));
    }

    #[tokio::test]
    async fn test_concurrent_401s_share_one_refresh() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            (401, ""),
            (401, ""),
            (200, "\"first\""),
            (200, "\"second\""),
        ]));
        let store = Arc::new(MemorySessionStore::with_session(sample_session("A1", "R1")));
        let refresher = Arc::new(ScriptedRefresher::succeeding("A2", Some("R2")));
        let client = client(&transport, &store, &refresher);

        let (first, second) = tokio::join!(
            client.fetch::<String>(ApiRequest::get("/books/1")),
            client.fetch::<String>(ApiRequest::get("/books/2")),
        );

        assert!(first.is_ok());
        assert!(second.is_ok());
        assert_eq!(refresher.calls().len(), 1);

        let retried: Vec<_> = transport.sent().into_iter().filter(|r| r.retried).collect();
        assert_eq!(retried.len(), 2);
        assert!(retried
            .iter()
            .all(|r| r.authorization.as_deref() == Some("Bearer A2")));
    }

    #[tokio::test]
    async fn test_unreachable_refresh_endpoint_clears_session() {
        let transport = Arc::new(ScriptedTransport::new(vec![(
            401,
            r#"{"message":"JWT expired"}"#,
        )]));
        let store = Arc::new(MemorySessionStore::with_session(sample_session("A1", "R1")));
        let refresher = Arc::new(ScriptedRefresher::unreachable());
        let client = client(&transport, &store, &refresher);

        let error = client.execute(ApiRequest::get("/reviews/my-reviews")).await.unwrap_err();

        assert!(error.is_unauthorized());
        assert_eq!(error.to_string(), "HTTP 401: JWT expired");
        assert_eq!(refresher.calls(), vec!["R1".to_string()]);
        assert_eq!(transport.sent().len(), 1);
        assert!(store.load().unwrap().is_empty());
        assert_eq!(client.auth_state(), AuthState::Failed);
    }

    #[tokio::test]
    async fn test_concurrent_401s_share_one_failed_refresh() {
        let transport = Arc::new(ScriptedTransport::new(vec![(401, ""), (401, "")]));
        let store = Arc::new(MemorySessionStore::with_session(sample_session("A1", "R1")));
        let refresher = Arc::new(ScriptedRefresher::failing(401));
        let client = client(&transport, &store, &refresher);

        let (first, second) = tokio::join!(
            client.execute(ApiRequest::get("/books/1")),
            client.execute(ApiRequest::get("/books/2")),
        );

        assert!(first.unwrap_err().is_unauthorized());
        assert!(second.unwrap_err().is_unauthorized());
        assert_eq!(refresher.calls().len(), 1);
        // Neither request is retried once the refresh has failed
        assert!(transport.sent().iter().all(|r| !r.retried));
        assert_eq!(transport.sent().len(), 2);
        assert!(store.load().unwrap().is_empty());
        assert_eq!(client.auth_state(), AuthState::Failed);
    }

    #[tokio::test]
    async fn test_http_refresher_sends_bare_request() {
        let transport = Arc::new(ScriptedTransport::new(vec![(
            200,
            r#"{"accessToken":"A2","refreshToken":"R2"}"#,
        )]));
        let refresher = HttpTokenRefresher::new(transport.clone());

        let tokens = refresher.refresh("R1").await.unwrap();

        assert_eq!(tokens.access_token, "A2");
        assert_eq!(tokens.refresh_token.as_deref(), Some("R2"));

        let sent = transport.sent();
        assert_eq!(sent[0].path, REFRESH_PATH);
        assert_eq!(sent[0].body, Some(serde_json::json!({"refreshToken": "R1"})));
        assert!(sent[0].authorization.is_none());
    }

    #[tokio::test]
    async fn test_http_refresher_rejects_error_status() {
        let transport = Arc::new(ScriptedTransport::new(vec![(401, "")]));
        let refresher = HttpTokenRefresher::new(transport);

        let error = refresher.refresh("stale").await.unwrap_err();

        assert!(error.is_unauthorized());
    }

    #[tokio::test]
    async fn test_end_to_end_refresh_failure_through_http_refresher() {
        // Same transport serves the API call and the refresh call
        let transport = Arc::new(ScriptedTransport::new(vec![(401, ""), (401, "")]));
        let store = Arc::new(MemorySessionStore::with_session(sample_session("A1", "R1")));
        let refresher = Arc::new(HttpTokenRefresher::new(transport.clone()));
        let client = ApiClient::new(transport.clone(), store.clone(), refresher);

        let error = client.execute(ApiRequest::get("/books/5")).await.unwrap_err();

        assert!(error.is_unauthorized());
        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].path, REFRESH_PATH);
        assert!(store.load().unwrap().is_empty());
    }
}
