pub(crate) use blogline::{
    AuthApi, BlogError, Comment, CommentDeletePolicy, CommentId, CommentNode, CommentThread, MemoryBackend, Post,
    PostId, UserId,
    models::{decode_row, decode_rows},
};
pub(crate) use serde_json::json;

pub(crate) const PASSWORD: &str = "correct horse";

/// Registers `email` and signs it in, making it the backend's current session.
pub(crate) async fn sign_in_as(backend: &MemoryBackend, email: &str) -> UserId {
    let id = backend.register_user(email, PASSWORD);
    let session = backend
        .sign_in_with_password(email, PASSWORD)
        .await
        .expect("sign in");
    assert_eq!(session.user_id(), &id);
    id
}

pub(crate) fn seed_post(backend: &MemoryBackend, id: i64, owner: &UserId, title: &str) -> Post {
    let row = backend.seed_row(
        "posts",
        json!({
            "id": id,
            "title": title,
            "content": format!("{title} body"),
            "slug": blogline::slug::slugify(title),
            "user_id": owner,
            "image_url": null,
        }),
    );
    decode_row(row).expect("seeded post")
}

pub(crate) fn seed_comment(
    backend: &MemoryBackend,
    id: i64,
    post: &Post,
    author: &UserId,
    parent: Option<i64>,
) -> Comment {
    let row = backend.seed_row(
        "comments",
        json!({
            "id": id,
            "content": format!("comment {id}"),
            "user_id": author,
            "post_id": post.id,
            "parent_comment_id": parent,
        }),
    );
    decode_row(row).expect("seeded comment")
}

pub(crate) fn stored_comments(backend: &MemoryBackend) -> Vec<Comment> {
    decode_rows(backend.rows("comments")).expect("stored comments")
}

pub(crate) fn ids(comments: &[Comment]) -> Vec<i64> {
    comments.iter().map(|comment| comment.id.0).collect()
}

/// Renders a forest as `1[2[4],3]`.
pub(crate) fn shape(nodes: &[CommentNode]) -> String {
    nodes
        .iter()
        .map(|node| {
            if node.replies.is_empty() {
                node.comment.id.to_string()
            } else {
                format!("{}[{}]", node.comment.id, shape(&node.replies))
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Post 1 owned by `owner` with comments 1, 2 (reply to 1), 3 (reply to 1)
/// and 4 (reply to 2), all written by `author`.
pub(crate) fn seed_scenario(backend: &MemoryBackend, owner: &UserId, author: &UserId) -> Post {
    let post = seed_post(backend, 1, owner, "Hello World");
    seed_comment(backend, 1, &post, author, None);
    seed_comment(backend, 2, &post, author, Some(1));
    seed_comment(backend, 3, &post, author, Some(1));
    seed_comment(backend, 4, &post, author, Some(2));
    post
}
