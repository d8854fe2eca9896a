use std::path::PathBuf;

use anyhow::{Context, Result};
use blogline::{
    CommentNode, FeedItem, ImageUpload, Post, PostChanges, PostDraft, PostRepo, PostSettings, UserId,
    comments::CommentThread, slug::image_content_type,
};
use clap::Subcommand;
use comfy_table::{Cell, Table};
use serde::Serialize;

use super::{current_viewer, user_facing};
use crate::context::ProjectContext;
use crate::examples::ExampleGroup;
use crate::output::{CommentPrinter, GlobalOptions, OutputManager, TableDisplay};

pub const EXAMPLES: &[ExampleGroup] = &[
    ExampleGroup {
        title: "Reading",
        commands: &[
            "blogline posts list                       # Feed with excerpts",
            "blogline posts show my-first-post         # Post with its comment thread",
            "blogline --output json posts show my-first-post",
        ],
    },
    ExampleGroup {
        title: "Writing",
        commands: &[
            "blogline posts create --title \"Hello\" --content \"First post\" --image cover.png",
            "blogline posts edit hello --content \"Updated text\"",
            "blogline posts delete hello",
        ],
    },
];

#[derive(Subcommand)]
pub enum PostsCommands {
    /// List every post
    #[command(name = "list")]
    List,

    /// Show a post and its comments
    #[command(name = "show")]
    Show {
        /// Slug of the post
        slug: String,
    },

    /// Write a new post
    #[command(name = "create")]
    Create {
        #[arg(long)]
        title: String,

        #[arg(long)]
        content: String,

        /// Image file to attach
        #[arg(long)]
        image: Option<PathBuf>,
    },

    /// Edit a post you own
    #[command(name = "edit")]
    Edit {
        /// Slug of the post
        slug: String,

        /// New title (keeps the current one when omitted)
        #[arg(long)]
        title: Option<String>,

        /// New content (keeps the current one when omitted)
        #[arg(long)]
        content: Option<String>,
    },

    /// Delete a post you own
    #[command(name = "delete")]
    Delete {
        /// Slug of the post
        slug: String,
    },
}

#[derive(Serialize)]
#[serde(transparent)]
struct Feed(Vec<FeedItem>);

impl TableDisplay for Feed {
    fn to_table(&self, options: &GlobalOptions) -> Table {
        let mut table = OutputManager::create_table(options);
        if self.0.is_empty() {
            table.add_row(vec![Cell::new("No posts yet")]);
            return table;
        }
        OutputManager::add_table_header(options, &mut table, &["ID", "Title", "Slug", "Excerpt", "Yours"]);
        for item in &self.0 {
            table.add_row(vec![
                Cell::new(item.post.id),
                Cell::new(&item.post.title),
                Cell::new(&item.post.slug),
                Cell::new(&item.excerpt),
                Cell::new(if item.can_manage { "yes" } else { "" }),
            ]);
        }
        table
    }

    fn to_compact(&self) -> String {
        self.0
            .iter()
            .map(|item| format!("{}\t{}", item.post.slug, item.post.title))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Serialize)]
struct PostDetail {
    post: Post,
    can_manage: bool,
    comment_count: usize,
    comments: Vec<CommentNode>,
}

pub async fn handle_posts_commands(command: PostsCommands, ctx: &ProjectContext, output: &OutputManager) -> Result<()> {
    let backend = ctx.backend()?;
    let repo = PostRepo::new(PostSettings::from(&ctx.config));
    let viewer = current_viewer(ctx, &backend).await?;

    match command {
        PostsCommands::List => {
            let feed = repo.feed(&backend, viewer.as_ref()).await.map_err(user_facing)?;
            output.display(&Feed(feed))?;
        }
        PostsCommands::Show { slug } => {
            let (post, thread) = repo.open_thread(&backend, &slug).await.map_err(user_facing)?;
            let can_manage = blogline::comments::can_manage_post(&post, viewer.as_ref());
            if output.is_json() {
                let detail = PostDetail {
                    comment_count: thread.comments().len(),
                    comments: thread.tree().nodes(),
                    can_manage,
                    post,
                };
                println!("{}", serde_json::to_string_pretty(&detail)?);
            } else {
                show_post(output, &post, &thread, viewer.as_ref(), can_manage);
            }
        }
        PostsCommands::Create { title, content, image } => {
            let image = match image {
                Some(path) => Some(read_image(path).await?),
                None => None,
            };
            let draft = PostDraft { title, content, image };
            output.progress("Publishing post");
            let result = repo.create(&backend, viewer.as_ref(), draft).await;
            output.clear_line();
            let post = result.map_err(user_facing)?;
            output.success(&format!("Published '{}' at /post/{}", post.title, post.slug));
            if let Some(url) = &post.image_url {
                output.key_value("Image", url);
            }
        }
        PostsCommands::Edit { slug, title, content } => {
            let post = repo.find_by_slug(&backend, &slug).await.map_err(user_facing)?;
            let changes = PostChanges {
                title: title.unwrap_or_else(|| post.title.clone()),
                content: content.unwrap_or_else(|| post.content.clone()),
            };
            let updated = repo
                .update(&backend, viewer.as_ref(), &post, changes)
                .await
                .map_err(user_facing)?;
            output.success(&format!("Post '{}' updated", updated.title));
        }
        PostsCommands::Delete { slug } => {
            let post = repo.find_by_slug(&backend, &slug).await.map_err(user_facing)?;
            repo.delete(&backend, viewer.as_ref(), &post).await.map_err(user_facing)?;
            output.success(&format!("Post '{}' deleted", post.title));
        }
    }

    Ok(())
}

fn show_post(
    output: &OutputManager,
    post: &Post,
    thread: &CommentThread,
    viewer: Option<&UserId>,
    can_manage: bool,
) {
    output.heading(&post.title);
    if let Some(created_at) = post.created_at {
        output.key_value("Published", &created_at.format("%Y-%m-%d %H:%M").to_string());
    }
    output.key_value("Author", post.user_id.as_str());
    if let Some(url) = &post.image_url {
        output.key_value("Image", url);
    }
    output.block(&format!("\n{}\n", post.content));
    if can_manage {
        output.info(&format!("You own this post: blogline posts edit {} | delete {}", post.slug, post.slug));
    }

    output.heading(&format!("Comments ({})", thread.comments().len()));
    if thread.comments().is_empty() {
        output.bullet("No comments yet.");
        return;
    }
    let mut printer = CommentPrinter::new(&output.options);
    thread.render(viewer, &mut printer);
    output.block(&printer.finish());
    if viewer.is_none() {
        output.info("Sign in to reply or delete comments.");
    }
}

async fn read_image(path: PathBuf) -> Result<ImageUpload> {
    let bytes = tokio::fs::read(&path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("{} is not a file", path.display()))?;
    let content_type = image_content_type(&file_name)
        .unwrap_or("application/octet-stream")
        .to_string();
    Ok(ImageUpload {
        file_name,
        content_type,
        bytes,
    })
}
