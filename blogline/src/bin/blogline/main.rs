mod commands;
mod context;
mod examples;
mod output;
mod theme;

use anyhow::Result;
use clap::{Command, CommandFactory, FromArgMatches, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use commands::{
    auth::{AuthCommands, handle_auth_commands},
    comments::{CommentsCommands, handle_comments_commands},
    posts::{PostsCommands, handle_posts_commands},
};
use context::ProjectContext;
use output::{GlobalOptions, OutputFormat, OutputManager};
use theme::{GLYPHS, THEME};

const ENVIRONMENT_VARIABLES: &[(&str, &str)] = &[
    ("BLOGLINE_URL", "Base URL of the hosted backend (overrides config.toml)"),
    ("BLOGLINE_ANON_KEY", "Public API key of the hosted backend (overrides config.toml)"),
    ("BLOGLINE_PASSWORD", "Password for 'auth sign-in' and 'auth sign-up'"),
    ("RUST_LOG", "Log verbosity, e.g. blogline=debug"),
];

#[derive(Parser)]
#[command(name = "blogline")]
#[command(version)]
#[command(
    about = "Community blog client: posts, threaded comments and accounts",
    long_about = "Terminal client for a community blog hosted on an auth + database + storage backend.\n\n\
                  Read the feed and threaded comments without an account; sign in to write posts, \
                  comment, reply at any depth and delete what you are allowed to."
)]
#[command(subcommand_required = true, arg_required_else_help = true)]
struct Cli {
    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Suppress output (only errors will be shown)
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Enable verbose output
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Path to config.toml (defaults to the nearest .blogline/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage your account and session
    #[command(subcommand)]
    Auth(AuthCommands),

    /// Read and write posts
    #[command(subcommand)]
    Posts(PostsCommands),

    /// Comment on posts and manage comments
    #[command(subcommand)]
    Comments(CommentsCommands),
}

/// The derived command with usage examples under each subcommand's `--help`.
fn cli_command() -> Command {
    let mut command = Cli::command().after_long_help(examples::render_environment(ENVIRONMENT_VARIABLES));
    for example in examples::command_examples() {
        command = command.mut_subcommand(example.name, |sub| sub.after_long_help(examples::render(example.groups)));
    }
    command
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let matches = cli_command().get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|err| err.exit());
    if cli.no_color {
        colored::control::set_override(false);
    }

    if let Err(err) = execute(cli).await {
        eprintln!("{} Error: {err:#}", GLYPHS.error.color(THEME.status.error));
        std::process::exit(1);
    }
}

async fn execute(cli: Cli) -> Result<()> {
    let global_options = GlobalOptions {
        output_format: cli.output,
        quiet: cli.quiet,
        verbose: cli.verbose,
        no_color: cli.no_color,
    };

    let output = OutputManager::new(global_options);
    let ctx = ProjectContext::resolve(cli.config.as_deref())?;
    output.verbose(&format!("Using config {}", ctx.config_path.display()));

    match cli.command {
        Commands::Auth(command) => handle_auth_commands(command, &ctx, &output).await,
        Commands::Posts(command) => handle_posts_commands(command, &ctx, &output).await,
        Commands::Comments(command) => handle_comments_commands(command, &ctx, &output).await,
    }
}
