use std::sync::{PoisonError, RwLock};

use chrono::Utc;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use super::{
    AuthApi, AuthEvent, BlobStorage, Filter, RecordCommand, RecordStore, SessionListener, SessionListeners, Subscription,
};
use crate::{
    errors::{BackendError, ValidationError, ValidationResult},
    models::{Session, User},
};

/// Access tokens this close to expiry are refreshed before use.
const REFRESH_MARGIN_SECS: i64 = 10;

/// Connection settings for a hosted backend project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedConfig {
    base_url: String,
    anon_key: String,
}

impl HostedConfig {
    pub fn new(url: &str, anon_key: impl Into<String>) -> ValidationResult<Self> {
        let parsed = Url::parse(url).map_err(|err| {
            ValidationError::single("backend.url", "validation.url", format!("invalid backend url '{url}': {err}"))
        })?;
        let anon_key = anon_key.into();
        if anon_key.trim().is_empty() {
            return Err(ValidationError::single(
                "backend.anon_key",
                "validation.required",
                "the backend anon key is required",
            ));
        }
        Ok(Self {
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            anon_key,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// REST adapter for a hosted auth + database + storage service.
///
/// The session is held in memory, mirroring the browser client library; use
/// [`HostedBackend::restore_session`] to resume one persisted elsewhere.
pub struct HostedBackend {
    config: HostedConfig,
    http: Client,
    session: RwLock<Option<Session>>,
    listeners: SessionListeners,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: User,
}

impl From<TokenResponse> for Session {
    fn from(token: TokenResponse) -> Self {
        let expires_at = token
            .expires_at
            .or_else(|| token.expires_in.map(|secs| Utc::now().timestamp() + secs));
        Session {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
            user: token.user,
        }
    }
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    error_code: Option<String>,
}

impl HostedBackend {
    pub fn new(config: HostedConfig) -> Self {
        Self {
            config,
            http: Client::new(),
            session: RwLock::new(None),
            listeners: SessionListeners::new(),
        }
    }

    pub fn config(&self) -> &HostedConfig {
        &self.config
    }

    /// Installs a previously issued session and announces it to listeners.
    pub fn restore_session(&self, session: Session) {
        self.set_session(Some(session.clone()));
        self.listeners.notify(AuthEvent::InitialSession, Some(&session));
    }

    fn current_session(&self) -> Option<Session> {
        self.session.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set_session(&self, session: Option<Session>) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let bearer = self
            .current_session()
            .map(|session| session.access_token)
            .unwrap_or_else(|| self.config.anon_key.clone());
        self.request_as(method, path, &bearer)
    }

    fn request_as(&self, method: Method, path: &str, bearer: &str) -> RequestBuilder {
        self.http
            .request(method, self.config.endpoint(path))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(bearer)
    }

    /// Exchanges the held refresh token for a new session.
    ///
    /// On rejection the local session is dropped and listeners see
    /// `SIGNED_OUT`; the caller gets the backend error.
    pub async fn refresh_session(&self) -> Result<Session, BackendError> {
        let Some(refresh_token) = self.current_session().and_then(|session| session.refresh_token) else {
            self.end_session();
            return Err(BackendError::new(None, "no refresh token for the current session").with_code("session_expired"));
        };
        let request = self
            .request_as(Method::POST, "auth/v1/token", &self.config.anon_key)
            .query(&[("grant_type", "refresh_token")])
            .json(&json!({ "refresh_token": refresh_token }));
        let token = match self.send_json(request).await.and_then(|body| {
            serde_json::from_value::<TokenResponse>(body)
                .map_err(|err| BackendError::new(None, format!("malformed token response: {err}")))
        }) {
            Ok(token) => token,
            Err(err) => {
                log::warn!("session refresh failed, signing out: {err}");
                self.end_session();
                return Err(err);
            }
        };
        let session = Session::from(token);
        self.set_session(Some(session.clone()));
        log::debug!("refreshed session for {}", session.user_id());
        self.listeners.notify(AuthEvent::TokenRefreshed, Some(&session));
        Ok(session)
    }

    fn end_session(&self) {
        self.set_session(None);
        self.listeners.notify(AuthEvent::SignedOut, None);
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, BackendError> {
        let response = request
            .send()
            .await
            .map_err(|err| BackendError::transport(format!("request failed: {err}")))?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response).await)
        }
    }

    async fn send_json(&self, request: RequestBuilder) -> Result<Value, BackendError> {
        let response = self.send(request).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        let body = response
            .text()
            .await
            .map_err(|err| BackendError::transport(format!("failed to read response: {err}")))?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|err| BackendError::new(None, format!("malformed response: {err}")))
    }

    fn begin_session(&self, token: TokenResponse) -> Session {
        let session = Session::from(token);
        self.set_session(Some(session.clone()));
        self.listeners.notify(AuthEvent::SignedIn, Some(&session));
        session
    }
}

async fn error_from_response(response: Response) -> BackendError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
    let message = body
        .message
        .or(body.msg)
        .or(body.error_description)
        .or(body.error)
        .unwrap_or_else(|| if text.trim().is_empty() { format!("request failed with status {status}") } else { text });
    let code = body.error_code.or_else(|| {
        body.code.map(|code| match code {
            Value::String(code) => code,
            other => other.to_string(),
        })
    });
    let error = BackendError::new(Some(status), message);
    match code {
        Some(code) => error.with_code(code),
        None => error,
    }
}

fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|filter| {
            let value = match &filter.value {
                Value::String(value) => value.clone(),
                other => other.to_string(),
            };
            (filter.field.clone(), format!("eq.{value}"))
        })
        .collect()
}

fn rows_from(value: Value) -> Vec<Value> {
    match value {
        Value::Array(rows) => rows,
        Value::Null => Vec::new(),
        single => vec![single],
    }
}

impl AuthApi for HostedBackend {
    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        match self.current_session() {
            Some(session) if session.expires_within(Utc::now().timestamp(), REFRESH_MARGIN_SECS) => {
                // An expired session that cannot be refreshed reads as signed out.
                Ok(self.refresh_session().await.ok())
            }
            session => Ok(session),
        }
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>, BackendError> {
        let request = self
            .request(Method::POST, "auth/v1/signup")
            .json(&json!({ "email": email, "password": password }));
        let body = self.send_json(request).await?;
        if body.get("access_token").is_none() {
            log::info!("sign-up for {email} awaits confirmation");
            return Ok(None);
        }
        let token: TokenResponse = serde_json::from_value(body)
            .map_err(|err| BackendError::new(None, format!("malformed sign-up response: {err}")))?;
        Ok(Some(self.begin_session(token)))
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let request = self
            .request(Method::POST, "auth/v1/token")
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }));
        let body = self.send_json(request).await?;
        let token: TokenResponse = serde_json::from_value(body)
            .map_err(|err| BackendError::new(None, format!("malformed token response: {err}")))?;
        Ok(self.begin_session(token))
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let result = match self.current_session() {
            Some(_) => self.send(self.request(Method::POST, "auth/v1/logout")).await.map(|_| ()),
            None => Ok(()),
        };
        // The local session is dropped even when the revoke call fails.
        self.end_session();
        result
    }

    fn on_session_change(&self, listener: SessionListener) -> Subscription {
        self.listeners.subscribe(listener)
    }
}

impl RecordStore for HostedBackend {
    async fn execute(&self, command: RecordCommand) -> Result<Vec<Value>, BackendError> {
        let path = format!("rest/v1/{}", command.table());
        let request = match command {
            RecordCommand::Select {
                columns,
                filters,
                order,
                ..
            } => {
                let mut params = vec![("select".to_string(), columns.replace(' ', ""))];
                params.extend(filter_params(&filters));
                if let Some(order) = order {
                    params.push(("order".to_string(), format!("{}.{}", order.field, order.order.as_str())));
                }
                self.request(Method::GET, &path).query(&params)
            }
            RecordCommand::Insert { rows, .. } => self
                .request(Method::POST, &path)
                .header("Prefer", "return=representation")
                .json(&rows),
            RecordCommand::Update { changes, filters, .. } => self
                .request(Method::PATCH, &path)
                .header("Prefer", "return=representation")
                .query(&filter_params(&filters))
                .json(&changes),
            RecordCommand::Delete { filters, .. } => self
                .request(Method::DELETE, &path)
                .header("Prefer", "return=representation")
                .query(&filter_params(&filters)),
        };
        Ok(rows_from(self.send_json(request).await?))
    }
}

impl BlobStorage for HostedBackend {
    async fn upload(&self, bucket: &str, path: &str, content_type: &str, bytes: Vec<u8>) -> Result<(), BackendError> {
        let request = self
            .request(Method::POST, &format!("storage/v1/object/{bucket}/{path}"))
            .header("Content-Type", content_type)
            .header("x-upsert", "false")
            .body(bytes);
        self.send(request).await.map(|_| ())
    }

    fn public_url(&self, bucket: &str, path: &str) -> Option<String> {
        Some(self.config.endpoint(&format!("storage/v1/object/public/{bucket}/{path}")))
    }
}
