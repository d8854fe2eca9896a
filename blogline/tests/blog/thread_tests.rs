use super::support::*;
use blogline::comments::{Promotion, RenderContext, TextRenderer};

#[tokio::test]
async fn load_builds_nested_forest() {
    let backend = MemoryBackend::new();
    let owner = sign_in_as(&backend, "owner@example.com").await;
    let post = seed_scenario(&backend, &owner, &owner);

    let thread = CommentThread::load(&backend, &post).await.expect("load");
    assert_eq!(ids(thread.comments()), vec![1, 2, 3, 4]);
    assert_eq!(shape(&thread.tree().nodes()), "1[2[4],3]");
    assert_eq!(thread.post_id(), PostId(1));
}

#[tokio::test]
async fn blank_comment_never_reaches_backend() {
    let backend = MemoryBackend::new();
    let user = sign_in_as(&backend, "ada@example.com").await;
    let post = seed_post(&backend, 1, &user, "Quiet");
    let mut thread = CommentThread::load(&backend, &post).await.expect("load");

    let before = backend.request_count();
    let err = thread
        .post_comment(&backend, Some(&user), "   \n\t", None)
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(err.user_message(), "Comment cannot be empty.");
    assert_eq!(backend.request_count(), before);
    assert!(thread.comments().is_empty());
}

#[tokio::test]
async fn anonymous_viewer_cannot_comment() {
    let backend = MemoryBackend::new();
    let owner = backend.register_user("owner@example.com", PASSWORD);
    let post = seed_post(&backend, 1, &owner, "Open");
    let mut thread = CommentThread::load(&backend, &post).await.expect("load");

    let before = backend.request_count();
    let err = thread.post_comment(&backend, None, "hello", None).await.unwrap_err();
    assert!(matches!(err, BlogError::Unauthenticated { .. }));
    assert_eq!(backend.request_count(), before);
}

#[tokio::test]
async fn reply_appends_exactly_one_node() {
    let backend = MemoryBackend::new();
    let author = sign_in_as(&backend, "author@example.com").await;
    let post = seed_scenario(&backend, &author, &author);
    let mut thread = CommentThread::load(&backend, &post).await.expect("load");
    let before = thread.tree().nodes();

    thread.composer_mut().set_reply_draft(CommentId(3), "  a reply  ");
    let created = thread
        .submit_reply(&backend, Some(&author), CommentId(3))
        .await
        .expect("reply")
        .clone();

    assert_eq!(created.content, "a reply");
    assert_eq!(created.parent_comment_id, Some(CommentId(3)));
    assert_eq!(created.post_id, post.id);
    assert_eq!(ids(thread.comments()), vec![1, 2, 3, 4, created.id.0]);
    assert_eq!(shape(&thread.tree().nodes()), format!("1[2[4],3[{}]]", created.id));
    assert!(!thread.composer().is_replying(CommentId(3)));

    // Untouched branches are unchanged.
    let after = thread.tree().nodes();
    assert_eq!(after[0].replies[0], before[0].replies[0]);
    assert_eq!(stored_comments(&backend).len(), 5);
}

#[tokio::test]
async fn top_level_comment_clears_draft() {
    let backend = MemoryBackend::new();
    let author = sign_in_as(&backend, "author@example.com").await;
    let post = seed_scenario(&backend, &author, &author);
    let mut thread = CommentThread::load(&backend, &post).await.expect("load");

    thread.composer_mut().set_draft("first!");
    let created_id = thread.submit_comment(&backend, Some(&author)).await.expect("comment").id;
    assert_eq!(thread.composer().draft(), "");
    assert_eq!(
        shape(&thread.tree().nodes()),
        format!("1[2[4],3],{created_id}")
    );
}

#[tokio::test]
async fn deleting_a_parent_promotes_its_reply() {
    let backend = MemoryBackend::new();
    let author = sign_in_as(&backend, "author@example.com").await;
    let post = seed_scenario(&backend, &author, &author);
    let mut thread = CommentThread::load(&backend, &post).await.expect("load");

    let removed = thread
        .delete_comment(&backend, Some(&author), CommentId(2))
        .await
        .expect("delete");
    assert_eq!(removed.id, CommentId(2));
    assert_eq!(ids(thread.comments()), vec![1, 3, 4]);
    assert_eq!(shape(&thread.tree().nodes()), "1[3],4");
    assert_eq!(
        thread.tree().get(CommentId(4)).and_then(|node| node.promotion()),
        Some(Promotion::Orphan)
    );
    assert_eq!(ids(&stored_comments(&backend)), vec![1, 3, 4]);
}

#[tokio::test]
async fn post_owner_may_delete_any_comment() {
    let backend = MemoryBackend::new();
    let commenter = backend.register_user("commenter@example.com", PASSWORD);
    let owner = sign_in_as(&backend, "owner@example.com").await;
    let post = seed_scenario(&backend, &owner, &commenter);
    let mut thread = CommentThread::load(&backend, &post).await.expect("load");

    assert!(thread.can_delete(CommentId(3), Some(&owner)));
    thread
        .delete_comment(&backend, Some(&owner), CommentId(3))
        .await
        .expect("owner delete");
    assert_eq!(ids(thread.comments()), vec![1, 2, 4]);
}

#[tokio::test]
async fn stranger_is_stopped_before_any_request() {
    let backend = MemoryBackend::new();
    let author = backend.register_user("author@example.com", PASSWORD);
    let stranger = sign_in_as(&backend, "stranger@example.com").await;
    let post = seed_scenario(&backend, &author, &author);
    let mut thread = CommentThread::load(&backend, &post).await.expect("load");

    let before = backend.request_count();
    let err = thread
        .delete_comment(&backend, Some(&stranger), CommentId(1))
        .await
        .unwrap_err();
    assert!(matches!(err, BlogError::Forbidden { .. }));
    assert_eq!(backend.request_count(), before);
    assert_eq!(thread.comments().len(), 4);
}

#[tokio::test]
async fn backend_refusal_leaves_thread_untouched() {
    let backend = MemoryBackend::new();
    let author = backend.register_user("author@example.com", PASSWORD);
    sign_in_as(&backend, "stranger@example.com").await;
    let post = seed_scenario(&backend, &author, &author);
    let mut thread = CommentThread::load(&backend, &post).await.expect("load");
    let before = thread.tree().nodes();

    // The client believes it is the author but the backend session says otherwise.
    let err = thread
        .delete_comment(&backend, Some(&author), CommentId(2))
        .await
        .unwrap_err();
    assert!(matches!(err, BlogError::Backend { .. }));
    assert_eq!(thread.tree().nodes(), before);
    assert_eq!(stored_comments(&backend).len(), 4);

    let err = thread
        .post_comment(&backend, Some(&author), "sneaky", Some(CommentId(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, BlogError::Backend { .. }));
    assert_eq!(thread.comments().len(), 4);
}

#[tokio::test]
async fn transport_failure_keeps_the_draft() {
    let backend = MemoryBackend::new();
    let author = sign_in_as(&backend, "author@example.com").await;
    let post = seed_scenario(&backend, &author, &author);
    let mut thread = CommentThread::load(&backend, &post).await.expect("load");

    thread.composer_mut().set_draft("keep me");
    backend.set_offline(true);
    let err = thread.submit_comment(&backend, Some(&author)).await.unwrap_err();
    assert!(matches!(err, BlogError::Backend { .. }));
    assert_eq!(thread.composer().draft(), "keep me");
    assert_eq!(thread.comments().len(), 4);

    backend.set_offline(false);
    thread.submit_comment(&backend, Some(&author)).await.expect("retry");
    assert_eq!(thread.comments().len(), 5);
}

#[tokio::test]
async fn reply_to_unknown_parent_is_not_found() {
    let backend = MemoryBackend::new();
    let author = sign_in_as(&backend, "author@example.com").await;
    let post = seed_scenario(&backend, &author, &author);
    let mut thread = CommentThread::load(&backend, &post).await.expect("load");

    let before = backend.request_count();
    let err = thread
        .post_comment(&backend, Some(&author), "hello?", Some(CommentId(99)))
        .await
        .unwrap_err();
    assert!(matches!(err, BlogError::NotFound { .. }));
    assert_eq!(backend.request_count(), before);
}

#[tokio::test]
async fn cascade_store_is_reflected_after_refresh() {
    let backend = MemoryBackend::new().with_comment_delete_policy(CommentDeletePolicy::Cascade);
    let author = sign_in_as(&backend, "author@example.com").await;
    let post = seed_scenario(&backend, &author, &author);
    let mut thread = CommentThread::load(&backend, &post).await.expect("load");

    thread
        .delete_comment(&backend, Some(&author), CommentId(2))
        .await
        .expect("delete");
    // Locally only the target is removed; the store dropped the reply too.
    assert_eq!(shape(&thread.tree().nodes()), "1[3],4");
    assert_eq!(ids(&stored_comments(&backend)), vec![1, 3]);

    thread.refresh(&backend).await.expect("refresh");
    assert_eq!(shape(&thread.tree().nodes()), "1[3]");
}

#[tokio::test]
async fn rendering_reflects_viewer_controls() {
    let backend = MemoryBackend::new();
    let commenter = backend.register_user("commenter@example.com", PASSWORD);
    let owner = sign_in_as(&backend, "owner@example.com").await;
    let post = seed_scenario(&backend, &owner, &commenter);
    let mut thread = CommentThread::load(&backend, &post).await.expect("load");
    thread.composer_mut().toggle_reply(CommentId(4));

    let mut renderer = TextRenderer::new();
    thread.render(Some(&owner), &mut renderer);
    let text = renderer.finish();
    assert_eq!(text.matches("[delete] [reply]").count(), 4);
    assert_eq!(text.matches("> writing a reply...").count(), 1);
    assert!(text.contains("\n    #4 comment 4\n"));

    let context = RenderContext {
        viewer: None,
        post_owner: thread.post_owner(),
        composer: None,
    };
    let anonymous = TextRenderer::render(thread.tree(), &context);
    assert!(!anonymous.contains("[reply]"));
}
