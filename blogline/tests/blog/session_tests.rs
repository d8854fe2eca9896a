use std::sync::Arc;

use super::support::*;
use blogline::{
    AuthEvent, Session, SessionProvider, Subscription, User,
    backend::{SessionListener, SessionListeners},
    errors::BackendError,
    session::{self, Credentials, SignUpOutcome},
};

fn credentials(email: &str) -> Credentials {
    Credentials::new(email, PASSWORD).expect("credentials")
}

#[tokio::test]
async fn init_picks_up_existing_session() {
    let backend = MemoryBackend::new();
    let user = sign_in_as(&backend, "ada@example.com").await;

    let provider = SessionProvider::init(&backend).await;
    assert!(provider.is_authenticated());
    assert_eq!(provider.user_id(), Some(user));
}

#[tokio::test]
async fn init_without_session_is_signed_out() {
    let backend = MemoryBackend::new();
    let provider = SessionProvider::init(&backend).await;
    assert!(!provider.is_authenticated());
    assert_eq!(provider.current(), None);
}

#[tokio::test]
async fn provider_follows_sign_in_refresh_and_sign_out() {
    let backend = MemoryBackend::new();
    let user = backend.register_user("ada@example.com", PASSWORD);
    let provider = SessionProvider::init(&backend).await;
    assert!(!provider.is_authenticated());

    let signed_in = session::sign_in(&backend, &credentials("ada@example.com")).await.expect("sign in");
    assert_eq!(provider.user_id(), Some(user.clone()));
    assert_eq!(provider.current(), Some(signed_in.clone()));

    let refreshed = backend.refresh_session().expect("refresh");
    assert_ne!(refreshed.access_token, signed_in.access_token);
    assert_eq!(provider.current().map(|s| s.access_token), Some(refreshed.access_token));

    session::sign_out(&backend).await.expect("sign out");
    assert!(!provider.is_authenticated());
}

#[tokio::test]
async fn teardown_detaches_listener() {
    let backend = MemoryBackend::new();
    backend.register_user("ada@example.com", PASSWORD);
    let mut provider = SessionProvider::init(&backend).await;
    assert_eq!(backend.listener_count(), 1);

    provider.teardown();
    assert!(!provider.is_listening());
    assert_eq!(backend.listener_count(), 0);

    session::sign_in(&backend, &credentials("ada@example.com")).await.expect("sign in");
    assert!(!provider.is_authenticated());
}

#[tokio::test]
async fn dropping_provider_unsubscribes() {
    let backend = MemoryBackend::new();
    {
        let _provider = SessionProvider::init(&backend).await;
        assert_eq!(backend.listener_count(), 1);
    }
    assert_eq!(backend.listener_count(), 0);
}

#[tokio::test]
async fn failed_lookup_leaves_provider_signed_out_but_listening() {
    let backend = MemoryBackend::new();
    let user = backend.register_user("ada@example.com", PASSWORD);
    backend.set_offline(true);
    let provider = SessionProvider::init(&backend).await;
    assert!(!provider.is_authenticated());
    assert!(provider.is_listening());

    backend.set_offline(false);
    session::sign_in(&backend, &credentials("ada@example.com")).await.expect("sign in");
    assert_eq!(provider.user_id(), Some(user));
}

/// Auth double whose session lookup is overtaken by a sign-in notification.
struct RacingAuth {
    listeners: SessionListeners,
    stale: Session,
    fresh: Session,
}

fn session_for(id: &str) -> Session {
    Session {
        access_token: format!("token-{id}"),
        refresh_token: None,
        expires_at: None,
        user: User {
            id: UserId::new(id),
            email: None,
        },
    }
}

impl AuthApi for RacingAuth {
    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        self.listeners.notify(AuthEvent::SignedIn, Some(&self.fresh));
        Ok(Some(self.stale.clone()))
    }

    async fn sign_up(&self, _email: &str, _password: &str) -> Result<Option<Session>, BackendError> {
        Ok(None)
    }

    async fn sign_in_with_password(&self, _email: &str, _password: &str) -> Result<Session, BackendError> {
        Ok(self.fresh.clone())
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        Ok(())
    }

    fn on_session_change(&self, listener: SessionListener) -> Subscription {
        self.listeners.subscribe(listener)
    }
}

#[tokio::test]
async fn notification_during_lookup_wins() {
    let auth = RacingAuth {
        listeners: SessionListeners::new(),
        stale: session_for("stale"),
        fresh: session_for("fresh"),
    };
    let provider = SessionProvider::init(&auth).await;
    assert_eq!(provider.user_id(), Some(UserId::new("fresh")));
}

#[tokio::test]
async fn listeners_fire_in_order_until_unsubscribed() {
    let listeners = SessionListeners::new();
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let subscription = listeners.subscribe(Arc::new(move |event: AuthEvent, _: Option<&Session>| {
        sink.lock().unwrap().push(event);
    }));
    listeners.notify(AuthEvent::SignedIn, None);
    subscription.unsubscribe();
    listeners.notify(AuthEvent::SignedOut, None);
    assert_eq!(*seen.lock().unwrap(), vec![AuthEvent::SignedIn]);
    assert!(listeners.is_empty());
}

#[tokio::test]
async fn sign_up_may_require_confirmation() {
    let backend = MemoryBackend::new().with_email_confirmation();
    let creds = credentials("new@example.com");

    let outcome = session::sign_up(&backend, &creds).await.expect("sign up");
    assert_eq!(outcome, SignUpOutcome::ConfirmationRequired);

    let err = session::sign_in(&backend, &creds).await.unwrap_err();
    match err {
        BlogError::Backend { source, .. } => assert_eq!(source.code.as_deref(), Some("email_not_confirmed")),
        other => panic!("unexpected error: {other:?}"),
    }

    assert!(backend.confirm_email("new@example.com"));
    session::sign_in(&backend, &creds).await.expect("sign in after confirmation");
}

#[tokio::test]
async fn sign_up_signs_in_immediately_without_confirmation() {
    let backend = MemoryBackend::new();
    let provider = SessionProvider::init(&backend).await;
    let outcome = session::sign_up(&backend, &credentials("new@example.com")).await.expect("sign up");
    let SignUpOutcome::SignedIn(session) = outcome else {
        panic!("expected a session");
    };
    assert_eq!(provider.user_id().as_ref(), Some(session.user_id()));

    let err = session::sign_up(&backend, &credentials("new@example.com")).await.unwrap_err();
    assert!(matches!(err, BlogError::Backend { ref source, .. } if source.status == Some(422)));
}

#[tokio::test]
async fn wrong_password_is_reported_by_backend() {
    let backend = MemoryBackend::new();
    backend.register_user("ada@example.com", PASSWORD);
    let wrong = Credentials::new("ada@example.com", "nope").expect("credentials");
    let err = session::sign_in(&backend, &wrong).await.unwrap_err();
    assert!(matches!(err, BlogError::Backend { ref source, .. } if source.code.as_deref() == Some("invalid_credentials")));
}
