use std::sync::{Arc, Mutex};

use super::support::*;
use blogline::{
    AuthEvent, BlobStorage, HostedBackend, HostedConfig, RecordStore, Session, SessionProvider,
    comments::CommentThread,
};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, header, method, path, query_param},
};

const ANON_KEY: &str = "anon-key";

fn backend_for(server: &MockServer) -> HostedBackend {
    HostedBackend::new(HostedConfig::new(&server.uri(), ANON_KEY).expect("config"))
}

fn token_body(user_id: &str, token: &str) -> serde_json::Value {
    json!({
        "access_token": token,
        "refresh_token": "refresh",
        "expires_in": 3600,
        "token_type": "bearer",
        "user": { "id": user_id, "email": "ada@example.com" }
    })
}

async fn signed_in_backend(server: &MockServer) -> HostedBackend {
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .and(header("apikey", ANON_KEY))
        .and(body_json(json!({ "email": "ada@example.com", "password": PASSWORD })))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("user-1", "user-token")))
        .expect(1)
        .mount(server)
        .await;
    let backend = backend_for(server);
    backend
        .sign_in_with_password("ada@example.com", PASSWORD)
        .await
        .expect("sign in");
    backend
}

#[tokio::test]
async fn sign_in_sets_bearer_for_later_requests() {
    let server = MockServer::start().await;
    let backend = signed_in_backend(&server).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/posts"))
        .and(header("authorization", "Bearer user-token"))
        .and(query_param("slug", "eq.hello-world"))
        .and(query_param("order", "id.asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": 1,
            "title": "Hello World",
            "content": "Body",
            "slug": "hello-world",
            "user_id": "user-1",
            "image_url": null,
            "created_at": "2024-05-01T10:00:00+00:00"
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let post = blogline::PostRepo::default()
        .find_by_slug(&backend, "hello-world")
        .await
        .expect("post");
    assert_eq!(post.user_id, UserId::new("user-1"));
    let session = backend.get_session().await.expect("session").expect("signed in");
    assert!(session.expires_at.is_some());
}

#[tokio::test]
async fn anonymous_requests_use_anon_key_as_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/comments"))
        .and(header("authorization", format!("Bearer {ANON_KEY}").as_str()))
        .and(query_param("post_id", "eq.1"))
        .and(query_param("select", "id,content,created_at,user_id,post_id,parent_comment_id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 1, "content": "top", "created_at": "2024-05-01T10:00:00Z", "user_id": "u1", "post_id": 1, "parent_comment_id": null },
            { "id": 2, "content": "reply", "created_at": "2024-05-01T10:01:00Z", "user_id": "u2", "post_id": 1, "parent_comment_id": 1 }
        ])))
        .mount(&server)
        .await;

    let backend = backend_for(&server);
    let post: Post = decode_row(json!({
        "id": 1, "title": "T", "content": "C", "slug": "t", "user_id": "u1"
    }))
    .expect("post");
    let thread = CommentThread::load(&backend, &post).await.expect("thread");
    assert_eq!(shape(&thread.tree().nodes()), "1[2]");
}

#[tokio::test]
async fn insert_asks_for_representation() {
    let server = MockServer::start().await;
    let backend = signed_in_backend(&server).await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/comments"))
        .and(header("prefer", "return=representation"))
        .and(body_json(json!([{
            "content": "hi",
            "post_id": 1,
            "user_id": "user-1",
            "parent_comment_id": null
        }])))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
            "id": 42, "content": "hi", "created_at": "2024-05-01T10:00:00Z",
            "user_id": "user-1", "post_id": 1, "parent_comment_id": null
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let rows = backend
        .table("comments")
        .insert(vec![json!({
            "content": "hi",
            "post_id": 1,
            "user_id": "user-1",
            "parent_comment_id": null
        })])
        .run()
        .await
        .expect("insert");
    let created: Comment = decode_row(rows.into_iter().next().expect("row")).expect("comment");
    assert_eq!(created.id, CommentId(42));
}

#[tokio::test]
async fn error_bodies_become_backend_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": 400,
            "error_code": "invalid_credentials",
            "msg": "Invalid login credentials"
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/comments"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "code": "42501",
            "message": "permission denied for table comments"
        })))
        .mount(&server)
        .await;

    let backend = backend_for(&server);
    let err = backend
        .sign_in_with_password("ada@example.com", "wrong")
        .await
        .unwrap_err();
    assert_eq!(err.status, Some(400));
    assert_eq!(err.code.as_deref(), Some("invalid_credentials"));
    assert_eq!(err.message, "Invalid login credentials");

    let err = backend.table("comments").delete().eq("id", 3).run().await.unwrap_err();
    assert_eq!(err.status, Some(403));
    assert_eq!(err.code.as_deref(), Some("42501"));
}

#[tokio::test]
async fn sign_up_without_token_needs_confirmation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/signup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "user-9",
            "email": "new@example.com",
            "confirmation_sent_at": "2024-05-01T10:00:00Z"
        })))
        .mount(&server)
        .await;

    let backend = backend_for(&server);
    let session = backend.sign_up("new@example.com", PASSWORD).await.expect("sign up");
    assert!(session.is_none());
    assert!(backend.get_session().await.expect("session").is_none());
}

#[tokio::test]
async fn sign_out_clears_session_even_when_revoke_fails() {
    let server = MockServer::start().await;
    let backend = signed_in_backend(&server).await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let provider = SessionProvider::init(&backend).await;
    assert!(provider.is_authenticated());
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let _subscription = backend.on_session_change(Arc::new(move |event: AuthEvent, _: Option<&Session>| {
        sink.lock().unwrap().push(event);
    }));

    assert!(backend.sign_out().await.is_err());
    assert!(backend.get_session().await.expect("session").is_none());
    assert!(!provider.is_authenticated());
    assert_eq!(*events.lock().unwrap(), vec![AuthEvent::SignedOut]);
}

#[tokio::test]
async fn restored_session_is_announced() {
    let server = MockServer::start().await;
    let backend = backend_for(&server);
    let provider = SessionProvider::init(&backend).await;
    assert!(!provider.is_authenticated());

    let session: Session = serde_json::from_value(json!({
        "access_token": "saved",
        "user": { "id": "user-7" }
    }))
    .expect("session");
    backend.restore_session(session);
    assert_eq!(provider.user_id(), Some(UserId::new("user-7")));
}

#[tokio::test]
async fn upload_posts_bytes_without_upsert() {
    let server = MockServer::start().await;
    let backend = signed_in_backend(&server).await;
    Mock::given(method("POST"))
        .and(path("/storage/v1/object/post-images/1700000000000-cat.png"))
        .and(header("x-upsert", "false"))
        .and(header("content-type", "image/png"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Key": "post-images/1700000000000-cat.png" })))
        .expect(1)
        .mount(&server)
        .await;

    backend
        .upload("post-images", "1700000000000-cat.png", "image/png", vec![1, 2, 3])
        .await
        .expect("upload");
    assert_eq!(
        backend.public_url("post-images", "1700000000000-cat.png"),
        Some(format!("{}/storage/v1/object/public/post-images/1700000000000-cat.png", server.uri()))
    );
}

fn expired_session(refresh_token: Option<&str>) -> Session {
    serde_json::from_value(json!({
        "access_token": "stale-token",
        "refresh_token": refresh_token,
        "expires_at": chrono::Utc::now().timestamp() - 7200,
        "user": { "id": "user-1", "email": "ada@example.com" }
    }))
    .expect("session")
}

fn recorded_events(backend: &HostedBackend) -> (Arc<Mutex<Vec<AuthEvent>>>, blogline::Subscription) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let subscription = backend.on_session_change(Arc::new(move |event: AuthEvent, _: Option<&Session>| {
        sink.lock().unwrap().push(event);
    }));
    (events, subscription)
}

#[tokio::test]
async fn expired_restored_session_is_refreshed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .and(header("authorization", format!("Bearer {ANON_KEY}").as_str()))
        .and(body_json(json!({ "refresh_token": "refresh-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("user-1", "fresh-token")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/posts"))
        .and(header("authorization", "Bearer fresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend_for(&server);
    backend.restore_session(expired_session(Some("refresh-1")));
    let (events, _subscription) = recorded_events(&backend);

    let provider = SessionProvider::init(&backend).await;
    let session = provider.current().expect("refreshed session");
    assert_eq!(session.access_token, "fresh-token");
    assert!(!session.expires_within(chrono::Utc::now().timestamp(), 10));
    assert_eq!(*events.lock().unwrap(), vec![AuthEvent::TokenRefreshed]);

    let feed = blogline::PostRepo::default().feed(&backend, None).await.expect("feed");
    assert!(feed.is_empty());
}

#[tokio::test]
async fn rejected_refresh_signs_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error_code": "refresh_token_not_found",
            "msg": "Invalid Refresh Token: Refresh Token Not Found"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend_for(&server);
    backend.restore_session(expired_session(Some("revoked")));
    let (events, _subscription) = recorded_events(&backend);

    let provider = SessionProvider::init(&backend).await;
    assert!(!provider.is_authenticated());
    assert!(backend.get_session().await.expect("session").is_none());
    assert_eq!(*events.lock().unwrap(), vec![AuthEvent::SignedOut]);
}

#[tokio::test]
async fn expired_session_without_refresh_token_reads_as_signed_out() {
    let server = MockServer::start().await;
    let backend = backend_for(&server);
    backend.restore_session(expired_session(None));

    let err = backend.refresh_session().await.unwrap_err();
    assert_eq!(err.code.as_deref(), Some("session_expired"));
    assert!(backend.get_session().await.expect("session").is_none());
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}
