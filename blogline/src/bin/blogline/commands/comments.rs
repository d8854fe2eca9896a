use anyhow::Result;
use blogline::{CommentId, PostRepo, PostSettings, comments::comment_text};
use clap::Subcommand;

use super::{current_viewer, user_facing};
use crate::context::ProjectContext;
use crate::examples::ExampleGroup;
use crate::output::OutputManager;

pub const EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Threads",
    commands: &[
        "blogline comments add my-first-post \"Great read\"",
        "blogline comments reply my-first-post --to 12 \"Agreed\"",
        "blogline comments delete my-first-post 12     # Author or post owner only",
    ],
}];

#[derive(Subcommand)]
pub enum CommentsCommands {
    /// Comment on a post
    #[command(name = "add")]
    Add {
        /// Slug of the post
        slug: String,

        text: String,
    },

    /// Reply to a comment
    #[command(name = "reply")]
    Reply {
        /// Slug of the post
        slug: String,

        /// Comment to reply to
        #[arg(long = "to")]
        parent: i64,

        text: String,
    },

    /// Delete a comment
    #[command(name = "delete")]
    Delete {
        /// Slug of the post
        slug: String,

        id: i64,
    },
}

pub async fn handle_comments_commands(
    command: CommentsCommands,
    ctx: &ProjectContext,
    output: &OutputManager,
) -> Result<()> {
    // Blank text is rejected before the backend is touched.
    if let CommentsCommands::Add { text, .. } | CommentsCommands::Reply { text, .. } = &command {
        comment_text(text).map_err(user_facing)?;
    }

    let backend = ctx.backend()?;
    let repo = PostRepo::new(PostSettings::from(&ctx.config));
    let viewer = current_viewer(ctx, &backend).await?;

    match command {
        CommentsCommands::Add { slug, text } => {
            let (_, mut thread) = repo.open_thread(&backend, &slug).await.map_err(user_facing)?;
            thread.composer_mut().set_draft(text);
            let created = thread
                .submit_comment(&backend, viewer.as_ref())
                .await
                .map_err(user_facing)?;
            output.success(&format!("Comment #{} added", created.id));
        }
        CommentsCommands::Reply { slug, parent, text } => {
            let parent = CommentId(parent);
            let (_, mut thread) = repo.open_thread(&backend, &slug).await.map_err(user_facing)?;
            thread.composer_mut().set_reply_draft(parent, text);
            let created = thread
                .submit_reply(&backend, viewer.as_ref(), parent)
                .await
                .map_err(user_facing)?;
            output.success(&format!("Reply #{} added under #{parent}", created.id));
        }
        CommentsCommands::Delete { slug, id } => {
            let (_, mut thread) = repo.open_thread(&backend, &slug).await.map_err(user_facing)?;
            let removed = thread
                .delete_comment(&backend, viewer.as_ref(), CommentId(id))
                .await
                .map_err(user_facing)?;
            output.success(&format!("Comment #{} deleted", removed.id));
            let orphaned = thread
                .tree()
                .roots()
                .filter(|node| node.comment().parent_comment_id == Some(removed.id))
                .count();
            if orphaned > 0 {
                output.info(&format!("{orphaned} repl(ies) now shown at the top level"));
            }
        }
    }

    Ok(())
}
