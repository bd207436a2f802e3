//! Fetch-with-refresh state machine.
//!
//! ```text
//! load ──► GET usage ──200──────────────────────────────► normalize
//!              │
//!              └─401 + refresh token ──► POST token ──► save (best effort)
//!                                                        │
//!                                          GET usage ◄───┘ (exactly once)
//! ```
//!
//! A second 401 after a successful refresh is terminal; there is no loop.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

use crate::core::credentials::{CredentialStore, Credentials};
use crate::core::endpoints::{Endpoints, ANTHROPIC_BETA_HEADER, ANTHROPIC_BETA_VALUE};
use crate::core::error::{FetchError, StoreError};
use crate::core::http::{HttpResponse, Transport};
use crate::core::models::usage::{Meter, UsageSnapshot};
use crate::core::normalize::normalize;
use crate::core::oauth::refresh_credentials;

const HTTP_OK: u16 = 200;
const HTTP_UNAUTHORIZED: u16 = 401;

pub struct UsagePipeline {
    store: Arc<dyn CredentialStore>,
    transport: Arc<dyn Transport>,
    endpoints: Endpoints,
}

impl UsagePipeline {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        transport: Arc<dyn Transport>,
        endpoints: Endpoints,
    ) -> Self {
        Self {
            store,
            transport,
            endpoints,
        }
    }

    /// Run one fetch cycle and return the normalized snapshot.
    pub async fn fetch_usage(&self) -> Result<UsageSnapshot, FetchError> {
        let creds = match self.store.load().await {
            Ok(creds) if creds.has_access_token() => creds,
            Ok(_) | Err(StoreError::NotFound) => return Err(FetchError::login_required()),
            Err(e) => return Err(e.into()),
        };

        let mut response = self.get_usage(&creds.access_token).await?;

        if response.status == HTTP_UNAUTHORIZED {
            let Some(refresh_token) = creds.refresh_token() else {
                return Err(FetchError::Unauthenticated(
                    "Access token rejected and no refresh token stored. Run `claude` and log in again."
                        .to_string(),
                ));
            };

            tracing::info!("Token expired, refreshing...");
            let refreshed = refresh_credentials(
                self.transport.as_ref(),
                &self.endpoints,
                &creds,
                refresh_token,
                Utc::now(),
            )
            .await?;
            self.persist(&refreshed).await;

            response = self.get_usage(&refreshed.access_token).await?;
        }

        if response.status != HTTP_OK {
            return Err(FetchError::upstream(response.status, &response.body));
        }

        let raw: Value = serde_json::from_str(&response.body)
            .map_err(|_| FetchError::upstream(response.status, &response.body))?;
        let snapshot = normalize(&raw, Utc::now());
        log_summary(&snapshot);
        Ok(snapshot)
    }

    async fn get_usage(&self, access_token: &str) -> Result<HttpResponse, FetchError> {
        let bearer = format!("Bearer {}", access_token);
        self.transport
            .get(
                &self.endpoints.usage_url,
                &[
                    ("Authorization", bearer.as_str()),
                    (ANTHROPIC_BETA_HEADER, ANTHROPIC_BETA_VALUE),
                    ("Content-Type", "application/json"),
                    ("Accept", "application/json"),
                ],
            )
            .await
    }

    /// Fresh data beats a consistent store: a failed save is reported, not raised.
    async fn persist(&self, creds: &Credentials) {
        if let Err(e) = self.store.save(creds).await {
            tracing::warn!(
                store = %self.store.describe(),
                error = %e,
                "Failed to persist refreshed credentials"
            );
        }
    }
}

fn log_summary(snapshot: &UsageSnapshot) {
    let pct = |m: Option<&Meter>| {
        m.map(|m| m.percent.to_string()).unwrap_or_else(|| "?".into())
    };
    let plan = &snapshot.plan_usage;
    tracing::info!(
        session = %pct(plan.current_session.as_ref()),
        all_models = %pct(plan.weekly_limits.all_models.as_ref()),
        sonnet = %pct(plan.weekly_limits.sonnet_only.as_ref()),
        extra = %snapshot
            .extra_usage
            .as_ref()
            .map(|e| format!("{}/{}", e.spent, e.monthly_limit))
            .unwrap_or_default(),
        "Usage fetched"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::credentials::MemoryStore;
    use async_trait::async_trait;
    use serde_json::{json, Map};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const USAGE_BODY: &str = r#"{
        "five_hour": { "utilization": 87.6, "resets_at": null },
        "seven_day": { "utilization": 40.2 }
    }"#;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Get { url: String, auth: String, beta: String },
        Post { url: String, body: Value },
    }

    /// Transport that replays queued responses and records every call.
    #[derive(Default)]
    struct ScriptedTransport {
        gets: Mutex<VecDeque<Result<HttpResponse, FetchError>>>,
        posts: Mutex<VecDeque<Result<HttpResponse, FetchError>>>,
        calls: Mutex<Vec<Call>>,
    }

    fn ok(status: u16, body: &str) -> Result<HttpResponse, FetchError> {
        Ok(HttpResponse {
            status,
            body: body.to_string(),
        })
    }

    impl ScriptedTransport {
        fn on_get(self, response: Result<HttpResponse, FetchError>) -> Self {
            self.gets.lock().unwrap().push_back(response);
            self
        }

        fn on_post(self, response: Result<HttpResponse, FetchError>) -> Self {
            self.posts.lock().unwrap().push_back(response);
            self
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn get_count(&self) -> usize {
            self.calls().iter().filter(|c| matches!(c, Call::Get { .. })).count()
        }

        fn post_count(&self) -> usize {
            self.calls().iter().filter(|c| matches!(c, Call::Post { .. })).count()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse, FetchError> {
            let header = |name: &str| {
                headers
                    .iter()
                    .find(|(n, _)| *n == name)
                    .map(|(_, v)| v.to_string())
                    .unwrap_or_default()
            };
            self.calls.lock().unwrap().push(Call::Get {
                url: url.to_string(),
                auth: header("Authorization"),
                beta: header(ANTHROPIC_BETA_HEADER),
            });
            self.gets
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected GET")
        }

        async fn post_json(&self, url: &str, body: &Value) -> Result<HttpResponse, FetchError> {
            self.calls.lock().unwrap().push(Call::Post {
                url: url.to_string(),
                body: body.clone(),
            });
            self.posts
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected POST")
        }
    }

    /// Store whose saves always fail.
    struct ReadOnlyStore(Credentials);

    #[async_trait]
    impl CredentialStore for ReadOnlyStore {
        async fn load(&self) -> Result<Credentials, StoreError> {
            Ok(self.0.clone())
        }

        async fn save(&self, _: &Credentials) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("read-only keychain".into()))
        }

        fn describe(&self) -> String {
            "read-only".into()
        }
    }

    struct FailingStore(StoreError);

    #[async_trait]
    impl CredentialStore for FailingStore {
        async fn load(&self) -> Result<Credentials, StoreError> {
            Err(self.0.clone())
        }

        async fn save(&self, _: &Credentials) -> Result<(), StoreError> {
            Err(self.0.clone())
        }

        fn describe(&self) -> String {
            "failing".into()
        }
    }

    fn creds(access: &str, refresh: Option<&str>) -> Credentials {
        Credentials {
            access_token: access.to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_at: Some(0),
            extra: Map::new(),
        }
    }

    fn pipeline(
        store: Arc<dyn CredentialStore>,
        transport: Arc<ScriptedTransport>,
    ) -> UsagePipeline {
        UsagePipeline::new(store, transport, Endpoints::default())
    }

    const TOKEN_OK: &str = r#"{"access_token":"new-access","refresh_token":"new-refresh","expires_in":28800}"#;

    #[tokio::test]
    async fn valid_token_fetches_without_refresh() {
        let store = Arc::new(MemoryStore::with(creds("good", Some("r"))));
        let transport = Arc::new(ScriptedTransport::default().on_get(ok(200, USAGE_BODY)));

        let snapshot = pipeline(store.clone(), transport.clone())
            .fetch_usage()
            .await
            .unwrap();

        assert_eq!(snapshot.plan_usage.current_session.unwrap().percent, 88);
        assert_eq!(snapshot.plan_usage.weekly_limits.all_models.unwrap().percent, 40);
        assert_eq!(transport.post_count(), 0);
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn sends_bearer_and_beta_headers() {
        let store = Arc::new(MemoryStore::with(creds("good", None)));
        let transport = Arc::new(ScriptedTransport::default().on_get(ok(200, "{}")));

        pipeline(store, transport.clone()).fetch_usage().await.unwrap();

        assert_eq!(
            transport.calls(),
            vec![Call::Get {
                url: crate::core::endpoints::DEFAULT_USAGE_URL.to_string(),
                auth: "Bearer good".to_string(),
                beta: ANTHROPIC_BETA_VALUE.to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn expired_token_refreshes_persists_and_retries_once() {
        let store = Arc::new(MemoryStore::with(creds("stale", Some("old-refresh"))));
        let transport = Arc::new(
            ScriptedTransport::default()
                .on_get(ok(401, r#"{"error":"token expired"}"#))
                .on_post(ok(200, TOKEN_OK))
                .on_get(ok(200, USAGE_BODY)),
        );

        let snapshot = pipeline(store.clone(), transport.clone())
            .fetch_usage()
            .await
            .unwrap();
        assert_eq!(snapshot.plan_usage.current_session.unwrap().percent, 88);

        let calls = transport.calls();
        assert_eq!(calls.len(), 3);
        match &calls[1] {
            Call::Post { url, body } => {
                assert_eq!(url, crate::core::endpoints::DEFAULT_TOKEN_URL);
                assert_eq!(body, &json!({
                    "grant_type": "refresh_token",
                    "refresh_token": "old-refresh",
                    "client_id": crate::core::endpoints::OAUTH_CLIENT_ID,
                }));
            }
            other => panic!("expected token POST, got {other:?}"),
        }
        assert!(matches!(&calls[2], Call::Get { auth, .. } if auth == "Bearer new-access"));

        assert_eq!(store.save_count(), 1);
        let saved = store.current().unwrap();
        assert_eq!(saved.access_token, "new-access");
        assert_eq!(saved.refresh_token.as_deref(), Some("new-refresh"));
        assert!(saved.expires_at.unwrap() > Utc::now().timestamp_millis());
    }

    #[tokio::test]
    async fn second_401_is_upstream_error_without_second_refresh() {
        let store = Arc::new(MemoryStore::with(creds("stale", Some("old-refresh"))));
        let transport = Arc::new(
            ScriptedTransport::default()
                .on_get(ok(401, "{}"))
                .on_post(ok(200, TOKEN_OK))
                .on_get(ok(401, r#"{"error":"still no"}"#)),
        );

        let err = pipeline(store, transport.clone())
            .fetch_usage()
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Upstream { status: 401, .. }));
        assert_eq!(transport.post_count(), 1);
        assert_eq!(transport.get_count(), 2);
    }

    #[tokio::test]
    async fn no_stored_credentials_is_unauthenticated_without_network() {
        let store = Arc::new(MemoryStore::default());
        let transport = Arc::new(ScriptedTransport::default());

        let err = pipeline(store, transport.clone())
            .fetch_usage()
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Unauthenticated(_)));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn empty_access_token_is_unauthenticated() {
        let store = Arc::new(MemoryStore::with(creds("", Some("r"))));
        let transport = Arc::new(ScriptedTransport::default());

        let err = pipeline(store, transport.clone())
            .fetch_usage()
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Unauthenticated(_)));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn token_response_without_access_token_fails_and_does_not_save() {
        let store = Arc::new(MemoryStore::with(creds("stale", Some("old-refresh"))));
        let transport = Arc::new(
            ScriptedTransport::default()
                .on_get(ok(401, "{}"))
                .on_post(ok(200, r#"{"refresh_token":"x","expires_in":60}"#)),
        );

        let err = pipeline(store.clone(), transport.clone())
            .fetch_usage()
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::RefreshFailed(_)));
        assert_eq!(store.save_count(), 0);
        assert_eq!(store.current().unwrap().access_token, "stale");
        assert_eq!(transport.get_count(), 1);
    }

    #[tokio::test]
    async fn token_endpoint_rejection_is_refresh_failed() {
        let store = Arc::new(MemoryStore::with(creds("stale", Some("old-refresh"))));
        let transport = Arc::new(
            ScriptedTransport::default()
                .on_get(ok(401, "{}"))
                .on_post(ok(400, r#"{"error":"invalid_grant"}"#)),
        );

        let err = pipeline(store.clone(), transport)
            .fetch_usage()
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::RefreshFailed(_)));
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn unauthorized_without_refresh_token_is_unauthenticated() {
        let store = Arc::new(MemoryStore::with(creds("stale", None)));
        let transport = Arc::new(ScriptedTransport::default().on_get(ok(401, "{}")));

        let err = pipeline(store, transport.clone())
            .fetch_usage()
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Unauthenticated(_)));
        assert_eq!(transport.post_count(), 0);
    }

    #[tokio::test]
    async fn save_failure_does_not_block_refreshed_data() {
        let store = Arc::new(ReadOnlyStore(creds("stale", Some("old-refresh"))));
        let transport = Arc::new(
            ScriptedTransport::default()
                .on_get(ok(401, "{}"))
                .on_post(ok(200, TOKEN_OK))
                .on_get(ok(200, USAGE_BODY)),
        );

        let snapshot = pipeline(store, transport).fetch_usage().await.unwrap();
        assert_eq!(snapshot.plan_usage.current_session.unwrap().percent, 88);
    }

    #[tokio::test]
    async fn unexpected_status_is_upstream_error_with_body() {
        let store = Arc::new(MemoryStore::with(creds("good", Some("r"))));
        let transport = Arc::new(
            ScriptedTransport::default().on_get(ok(500, r#"{"error":"overloaded"}"#)),
        );

        let err = pipeline(store, transport.clone())
            .fetch_usage()
            .await
            .unwrap_err();
        match err {
            FetchError::Upstream { status, body } => {
                assert_eq!(status, 500);
                assert!(body.contains("overloaded"));
            }
            other => panic!("expected Upstream, got {other:?}"),
        }
        assert_eq!(transport.post_count(), 0);
    }

    #[tokio::test]
    async fn unparseable_body_is_upstream_error() {
        let store = Arc::new(MemoryStore::with(creds("good", None)));
        let transport = Arc::new(
            ScriptedTransport::default().on_get(ok(200, "<html>maintenance</html>")),
        );

        let err = pipeline(store, transport).fetch_usage().await.unwrap_err();
        assert!(matches!(err, FetchError::Upstream { status: 200, ref body } if body.contains("maintenance")));
    }

    #[tokio::test]
    async fn timeout_is_propagated() {
        let store = Arc::new(MemoryStore::with(creds("good", None)));
        let transport = Arc::new(
            ScriptedTransport::default().on_get(Err(FetchError::Timeout("usage".into()))),
        );

        let err = pipeline(store, transport).fetch_usage().await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout(_)));
    }

    #[tokio::test]
    async fn timeout_during_refresh_is_propagated() {
        let store = Arc::new(MemoryStore::with(creds("stale", Some("r"))));
        let transport = Arc::new(
            ScriptedTransport::default()
                .on_get(ok(401, "{}"))
                .on_post(Err(FetchError::Timeout("token".into()))),
        );

        let err = pipeline(store.clone(), transport).fetch_usage().await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout(_)));
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn corrupt_store_surfaces_store_error() {
        let store = Arc::new(FailingStore(StoreError::Corrupt("bad json".into())));
        let transport = Arc::new(ScriptedTransport::default());

        let err = pipeline(store, transport.clone())
            .fetch_usage()
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Store(StoreError::Corrupt(_))));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn unavailable_store_surfaces_store_error() {
        let store = Arc::new(FailingStore(StoreError::Unavailable("no keychain".into())));
        let transport = Arc::new(ScriptedTransport::default());

        let err = pipeline(store, transport).fetch_usage().await.unwrap_err();
        assert!(matches!(err, FetchError::Store(StoreError::Unavailable(_))));
    }
}
