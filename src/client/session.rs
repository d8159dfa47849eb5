use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::{
    auth::dto::{AuthResponse, LoginRequest, PublicUser, RegisterRequest, UpdateProfileRequest,
        UserResponse},
    client::{
        error::ClientError,
        store::{profile_image_key, SessionStore, TOKEN_KEY, USER_KEY},
    },
    error::ErrorBody,
};

/// The client-side session snapshot: the bearer token plus the last
/// canonical user record received from the server. Either both exist or
/// the client is logged out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user: PublicUser,
}

/// Bridges the auth service's HTTP contract to the caller: holds the
/// in-memory session, keeps it in lockstep with durable storage, and
/// attaches the bearer token to authenticated calls.
pub struct AuthClient {
    http: reqwest::Client,
    base_url: String,
    store: Arc<dyn SessionStore>,
    session: Mutex<Option<Session>>,
}

impl AuthClient {
    /// Builds a client and synchronously rehydrates any stored session.
    /// Malformed or half-present stored data is discarded, never a
    /// crash.
    pub fn new(base_url: impl Into<String>, store: Arc<dyn SessionStore>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let session = match (store.get(TOKEN_KEY), store.get(USER_KEY)) {
            (Some(token), Some(raw)) => match serde_json::from_str::<PublicUser>(&raw) {
                Ok(user) => Some(Session { token, user }),
                Err(e) => {
                    debug!(error = %e, "discarding malformed stored session");
                    let _ = store.remove(TOKEN_KEY);
                    let _ = store.remove(USER_KEY);
                    None
                }
            },
            (None, None) => None,
            // One key without the other violates the snapshot invariant.
            _ => {
                debug!("discarding half-present stored session");
                let _ = store.remove(TOKEN_KEY);
                let _ = store.remove(USER_KEY);
                None
            }
        };
        Self {
            http: reqwest::Client::new(),
            base_url,
            store,
            session: Mutex::new(session),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.session_guard().as_ref().map(|s| s.token.clone())
    }

    pub fn current_user(&self) -> Option<PublicUser> {
        self.session_guard().as_ref().map(|s| s.user.clone())
    }

    pub fn is_logged_in(&self) -> bool {
        self.session_guard().is_some()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<PublicUser, ClientError> {
        let resp = self
            .http
            .post(self.url("/api/auth/login"))
            .json(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;
        let auth: AuthResponse = Self::parse(resp).await?;
        self.commit(auth.token, auth.user.clone())?;
        Ok(auth.user)
    }

    pub async fn register(&self, data: &RegisterRequest) -> Result<PublicUser, ClientError> {
        let resp = self
            .http
            .post(self.url("/api/auth/register"))
            .json(data)
            .send()
            .await?;
        let auth: AuthResponse = Self::parse(resp).await?;
        self.commit(auth.token, auth.user.clone())?;
        Ok(auth.user)
    }

    /// Clears the local session first, then notifies the server on a
    /// best-effort basis. A failed notification never blocks or
    /// reverses the local logout.
    pub async fn logout(&self) {
        let prior_token = {
            let mut guard = self.session_guard();
            let prior = guard.take();
            let _ = self.store.remove(TOKEN_KEY);
            let _ = self.store.remove(USER_KEY);
            prior.map(|s| s.token)
        };

        if let Some(token) = prior_token {
            let result = self
                .http
                .post(self.url("/api/auth/logout"))
                .bearer_auth(token)
                .send()
                .await;
            if let Err(e) = result {
                debug!(error = %e, "logout notification failed");
            }
        }
    }

    /// Pushes a profile update and adopts the server's returned record
    /// as the new canonical snapshot.
    pub async fn update_user(
        &self,
        update: &UpdateProfileRequest,
    ) -> Result<PublicUser, ClientError> {
        let token = self.token().ok_or(ClientError::NotAuthenticated)?;
        let resp = self
            .http
            .put(self.url("/api/auth/me"))
            .bearer_auth(&token)
            .json(update)
            .send()
            .await?;
        let body: UserResponse = Self::parse(resp).await?;
        self.commit(token, body.user.clone())?;
        Ok(body.user)
    }

    pub fn cached_profile_image(&self, user_id: &Uuid) -> Option<String> {
        self.store.get(&profile_image_key(user_id))
    }

    pub fn cache_profile_image(&self, user_id: &Uuid, data_url: &str) -> Result<(), ClientError> {
        self.store.set(&profile_image_key(user_id), data_url)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn session_guard(&self) -> std::sync::MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Updates memory and durable storage under one lock so no observer
    /// sees a token without its user or vice versa. On any failure the
    /// prior state is left untouched.
    fn commit(&self, token: String, user: PublicUser) -> Result<(), ClientError> {
        let raw_user =
            serde_json::to_string(&user).map_err(|e| ClientError::Storage(e.to_string()))?;
        let mut guard = self.session_guard();
        self.store.set(TOKEN_KEY, &token)?;
        self.store.set(USER_KEY, &raw_user)?;
        *guard = Some(Session { token, user });
        Ok(())
    }

    async fn parse<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
        let status = resp.status();
        if status.is_success() {
            Ok(resp.json::<T>().await?)
        } else {
            let message = resp
                .json::<ErrorBody>()
                .await
                .map(|b| b.error)
                .unwrap_or_else(|_| format!("HTTP error! status: {status}"));
            Err(ClientError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        dto::Location,
        repo_types::UserType,
    };
    use crate::client::store::MemoryStore;
    use time::macros::datetime;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_user(name: &str) -> PublicUser {
        PublicUser {
            id: Uuid::new_v4(),
            name: name.into(),
            email: "elder@example.com".into(),
            phone: None,
            avatar: None,
            user_type: UserType::Elder,
            location: Location {
                address: "12 Elm Street".into(),
                coordinates: None,
            },
            is_email_verified: false,
            is_approved: true,
            is_active: true,
            created_at: datetime!(2026-01-15 12:00 UTC),
            updated_at: datetime!(2026-01-15 12:00 UTC),
            last_login_at: None,
        }
    }

    fn auth_body(user: &PublicUser, token: &str) -> serde_json::Value {
        serde_json::to_value(AuthResponse {
            message: "ok".into(),
            user: user.clone(),
            token: token.into(),
        })
        .unwrap()
    }

    fn seeded_store(user: &PublicUser, token: &str) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.set(TOKEN_KEY, token).unwrap();
        store
            .set(USER_KEY, &serde_json::to_string(user).unwrap())
            .unwrap();
        store
    }

    #[tokio::test]
    async fn login_persists_token_and_user_together() {
        let server = MockServer::start().await;
        let user = sample_user("Ada");
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(auth_body(&user, "tok-1")))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        let client = AuthClient::new(server.uri(), store.clone());
        let returned = client.login("elder@example.com", "secret1").await.unwrap();

        assert_eq!(returned, user);
        assert_eq!(client.token().as_deref(), Some("tok-1"));
        assert_eq!(store.get(TOKEN_KEY).as_deref(), Some("tok-1"));
        let stored: PublicUser =
            serde_json::from_str(&store.get(USER_KEY).unwrap()).unwrap();
        assert_eq!(stored, user);
    }

    #[tokio::test]
    async fn failed_login_leaves_prior_session_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(401).set_body_json(
                serde_json::json!({"error": "Invalid email or password"}),
            ))
            .mount(&server)
            .await;

        let user = sample_user("Ada");
        let store = seeded_store(&user, "tok-old");
        let client = AuthClient::new(server.uri(), store.clone());

        let err = client.login("elder@example.com", "wrong").await.unwrap_err();
        match err {
            ClientError::Api { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Invalid email or password");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(client.token().as_deref(), Some("tok-old"));
        assert_eq!(store.get(TOKEN_KEY).as_deref(), Some("tok-old"));
    }

    #[tokio::test]
    async fn register_sets_session() {
        let server = MockServer::start().await;
        let user = sample_user("Vol");
        Mock::given(method("POST"))
            .and(path("/api/auth/register"))
            .respond_with(ResponseTemplate::new(201).set_body_json(auth_body(&user, "tok-r")))
            .mount(&server)
            .await;

        let client = AuthClient::new(server.uri(), Arc::new(MemoryStore::new()));
        let data = RegisterRequest {
            name: "Vol".into(),
            email: "vol@example.com".into(),
            password: "secret1".into(),
            address: "1 St".into(),
            user_type: UserType::Volunteer,
            phone: None,
            avatar: None,
        };
        client.register(&data).await.unwrap();
        assert!(client.is_logged_in());
        assert_eq!(client.token().as_deref(), Some("tok-r"));
    }

    #[tokio::test]
    async fn rehydrates_stored_session_on_startup() {
        let user = sample_user("Ada");
        let store = seeded_store(&user, "tok-1");
        let client = AuthClient::new("http://localhost:0", store);
        assert!(client.is_logged_in());
        assert_eq!(client.current_user().unwrap(), user);
    }

    #[tokio::test]
    async fn malformed_stored_user_is_discarded_not_a_crash() {
        let store = Arc::new(MemoryStore::new());
        store.set(TOKEN_KEY, "tok-1").unwrap();
        store.set(USER_KEY, "{definitely not json").unwrap();

        let client = AuthClient::new("http://localhost:0", store.clone());
        assert!(!client.is_logged_in());
        assert!(store.get(TOKEN_KEY).is_none());
        assert!(store.get(USER_KEY).is_none());
    }

    #[tokio::test]
    async fn token_without_user_counts_as_logged_out() {
        let store = Arc::new(MemoryStore::new());
        store.set(TOKEN_KEY, "tok-1").unwrap();

        let client = AuthClient::new("http://localhost:0", store.clone());
        assert!(!client.is_logged_in());
        assert!(store.get(TOKEN_KEY).is_none());
    }

    #[tokio::test]
    async fn logout_clears_storage_even_when_server_is_unreachable() {
        let user = sample_user("Ada");
        let store = seeded_store(&user, "tok-1");
        // Nothing listens here; the notification will fail.
        let client = AuthClient::new("http://127.0.0.1:9", store.clone());
        assert!(client.is_logged_in());

        client.logout().await;

        assert!(!client.is_logged_in());
        assert!(store.get(TOKEN_KEY).is_none());
        assert!(store.get(USER_KEY).is_none());
    }

    #[tokio::test]
    async fn logout_clears_storage_when_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/logout"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let user = sample_user("Ada");
        let store = seeded_store(&user, "tok-1");
        let client = AuthClient::new(server.uri(), store.clone());

        client.logout().await;

        assert!(store.get(TOKEN_KEY).is_none());
        assert!(store.get(USER_KEY).is_none());
    }

    #[tokio::test]
    async fn update_user_requires_a_token() {
        let client = AuthClient::new("http://localhost:0", Arc::new(MemoryStore::new()));
        let err = client
            .update_user(&UpdateProfileRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NotAuthenticated));
    }

    #[tokio::test]
    async fn update_user_adopts_the_server_canonical_record() {
        let server = MockServer::start().await;
        let mut canonical = sample_user("Ada");
        canonical.name = "Ada L.".into();
        canonical.phone = Some("+45 12 34 56 78".into());
        Mock::given(method("PUT"))
            .and(path("/api/auth/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": "Profile updated successfully",
                "user": serde_json::to_value(&canonical).unwrap(),
            })))
            .mount(&server)
            .await;

        let store = seeded_store(&sample_user("Ada"), "tok-1");
        let client = AuthClient::new(server.uri(), store.clone());

        let update = UpdateProfileRequest {
            name: Some("Ada L.".into()),
            ..Default::default()
        };
        let returned = client.update_user(&update).await.unwrap();

        assert_eq!(returned, canonical);
        assert_eq!(client.current_user().unwrap(), canonical);
        let stored: PublicUser =
            serde_json::from_str(&store.get(USER_KEY).unwrap()).unwrap();
        assert_eq!(stored, canonical);
    }

    #[tokio::test]
    async fn session_snapshot_survives_a_serde_roundtrip() {
        let session = Session {
            token: "tok-1".into(),
            user: sample_user("Ada"),
        };
        let json = serde_json::to_string(&session).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back, session);
    }

    #[tokio::test]
    async fn profile_image_cache_is_keyed_by_user() {
        let client = AuthClient::new("http://localhost:0", Arc::new(MemoryStore::new()));
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        client
            .cache_profile_image(&a, "data:image/png;base64,AAAA")
            .unwrap();
        assert_eq!(
            client.cached_profile_image(&a).as_deref(),
            Some("data:image/png;base64,AAAA")
        );
        assert!(client.cached_profile_image(&b).is_none());
    }
}
