//! Who is signed in, kept current by the backend's session notifications.

use std::sync::{Arc, PoisonError, RwLock};

use email_address::EmailAddress;

use crate::{
    backend::{AuthApi, AuthEvent, Subscription},
    errors::{BlogError, ValidationError, ValidationIssue, ValidationResult},
    models::{Session, UserId},
};

#[derive(Debug, Default)]
struct SessionState {
    session: Option<Session>,
    /// A change notification has already been applied.
    notified: bool,
}

/// Process-wide view of the authenticated identity.
///
/// Lifecycle: [`SessionProvider::init`] subscribes and loads the current
/// session, notifications keep it fresh, [`SessionProvider::teardown`] (or
/// drop) detaches it from the backend.
pub struct SessionProvider {
    state: Arc<RwLock<SessionState>>,
    subscription: Option<Subscription>,
}

impl SessionProvider {
    /// Subscribes to session changes, then asks the backend for the current
    /// session. A notification that lands before the lookup completes is
    /// newer and wins. A failed lookup leaves the provider signed out.
    pub async fn init<A: AuthApi>(auth: &A) -> Self {
        let state = Arc::new(RwLock::new(SessionState::default()));
        let sink = Arc::clone(&state);
        let subscription = auth.on_session_change(Arc::new(move |event: AuthEvent, session: Option<&Session>| {
            log::debug!(
                "session provider applying {event} for {}",
                session.map_or("nobody", |s| s.user_id().as_str())
            );
            let mut state = sink.write().unwrap_or_else(PoisonError::into_inner);
            state.session = session.cloned();
            state.notified = true;
        }));

        match auth.get_session().await {
            Ok(session) => {
                let mut guard = state.write().unwrap_or_else(PoisonError::into_inner);
                if guard.notified {
                    log::debug!("initial session lookup superseded by a change notification");
                } else {
                    guard.session = session;
                }
            }
            Err(err) => log::warn!("failed to load the current session: {err}"),
        }

        Self {
            state,
            subscription: Some(subscription),
        }
    }

    pub fn current(&self) -> Option<Session> {
        self.state.read().unwrap_or_else(PoisonError::into_inner).session.clone()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .session
            .as_ref()
            .map(|session| session.user_id().clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.read().unwrap_or_else(PoisonError::into_inner).session.is_some()
    }

    /// Stops listening for changes. The last known session stays readable.
    pub fn teardown(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }

    pub fn is_listening(&self) -> bool {
        self.subscription.is_some()
    }
}

/// Validated email and password from the sign-in and sign-up forms.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    email: String,
    password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> ValidationResult<Self> {
        let email = email.into().trim().to_string();
        let password = password.into();
        let mut issues = Vec::new();
        if email.is_empty() {
            issues.push(ValidationIssue::required("email", "Email is required."));
        } else if !EmailAddress::is_valid(&email) {
            issues.push(ValidationIssue::new("email", "validation.email", "Email address is not valid."));
        }
        if password.is_empty() {
            issues.push(ValidationIssue::required("password", "Password is required."));
        }
        if issues.is_empty() {
            Ok(Self { email, password })
        } else {
            Err(ValidationError::new(issues))
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}

/// Result of a successful registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    SignedIn(Session),
    /// The account exists but must be confirmed by email before signing in.
    ConfirmationRequired,
}

pub async fn sign_up<A: AuthApi>(auth: &A, credentials: &Credentials) -> Result<SignUpOutcome, BlogError> {
    let session = auth
        .sign_up(&credentials.email, &credentials.password)
        .await
        .map_err(|err| BlogError::backend("sign up", err))?;
    Ok(match session {
        Some(session) => {
            log::info!("signed up and signed in as {}", session.user_id());
            SignUpOutcome::SignedIn(session)
        }
        None => {
            log::info!("sign-up for {} awaits email confirmation", credentials.email);
            SignUpOutcome::ConfirmationRequired
        }
    })
}

pub async fn sign_in<A: AuthApi>(auth: &A, credentials: &Credentials) -> Result<Session, BlogError> {
    let session = auth
        .sign_in_with_password(&credentials.email, &credentials.password)
        .await
        .map_err(|err| BlogError::backend("sign in", err))?;
    log::info!("signed in as {}", session.user_id());
    Ok(session)
}

pub async fn sign_out<A: AuthApi>(auth: &A) -> Result<(), BlogError> {
    auth.sign_out().await.map_err(|err| BlogError::backend("sign out", err))
}
