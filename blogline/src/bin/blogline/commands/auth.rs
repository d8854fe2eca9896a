use anyhow::Result;
use blogline::session::{self, Credentials, SignUpOutcome};
use chrono::{DateTime, Utc};
use clap::Subcommand;
use comfy_table::{Cell, Table};
use serde::Serialize;

use super::{current_session, user_facing};
use crate::context::ProjectContext;
use crate::examples::ExampleGroup;
use crate::output::{GlobalOptions, OutputManager, TableDisplay};
use crate::theme::GLYPHS;

pub const EXAMPLES: &[ExampleGroup] = &[
    ExampleGroup {
        title: "Accounts",
        commands: &[
            "blogline auth sign-up --email ada@example.com    # Password read from BLOGLINE_PASSWORD or --password",
            "blogline auth sign-in --email ada@example.com --password hunter2",
        ],
    },
    ExampleGroup {
        title: "Session",
        commands: &[
            "blogline auth status                             # Show who is signed in",
            "blogline auth sign-out",
        ],
    },
];

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Create an account
    #[command(name = "sign-up")]
    SignUp {
        #[arg(long)]
        email: String,

        #[arg(long, env = "BLOGLINE_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Sign in with email and password
    #[command(name = "sign-in")]
    SignIn {
        #[arg(long)]
        email: String,

        #[arg(long, env = "BLOGLINE_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Sign out and forget the saved session
    #[command(name = "sign-out")]
    SignOut,

    /// Show the current session
    #[command(name = "status")]
    Status,
}

#[derive(Serialize)]
struct SessionStatus {
    signed_in: bool,
    user_id: Option<String>,
    email: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl TableDisplay for SessionStatus {
    fn to_table(&self, options: &GlobalOptions) -> Table {
        let mut table = OutputManager::create_table(options);
        let state = if self.signed_in {
            format!("{} signed in", GLYPHS.signed_in)
        } else {
            format!("{} signed out", GLYPHS.signed_out)
        };
        table.add_row(vec![Cell::new("Status"), Cell::new(state)]);
        if let Some(user_id) = &self.user_id {
            table.add_row(vec![Cell::new("User"), Cell::new(user_id)]);
        }
        if let Some(email) = &self.email {
            table.add_row(vec![Cell::new("Email"), Cell::new(email)]);
        }
        if let Some(expires_at) = self.expires_at {
            table.add_row(vec![Cell::new("Expires"), Cell::new(expires_at.to_rfc3339())]);
        }
        table
    }

    fn to_compact(&self) -> String {
        match &self.user_id {
            Some(user_id) => format!("signed-in {user_id}"),
            None => "signed-out".to_string(),
        }
    }
}

pub async fn handle_auth_commands(command: AuthCommands, ctx: &ProjectContext, output: &OutputManager) -> Result<()> {
    let backend = ctx.backend()?;

    match command {
        AuthCommands::SignUp { email, password } => {
            let credentials = Credentials::new(email, password).map_err(|err| user_facing(err.into()))?;
            output.progress("Creating account");
            let outcome = session::sign_up(&backend, &credentials).await;
            output.clear_line();
            match outcome.map_err(user_facing)? {
                SignUpOutcome::SignedIn(session) => {
                    ctx.save_session(&session)?;
                    output.success(&format!("Account created. Signed in as {}", credentials.email()));
                }
                SignUpOutcome::ConfirmationRequired => {
                    output.success("Account created.");
                    output.info("Check your email to confirm the account, then run 'blogline auth sign-in'.");
                }
            }
        }
        AuthCommands::SignIn { email, password } => {
            let credentials = Credentials::new(email, password).map_err(|err| user_facing(err.into()))?;
            output.progress("Signing in");
            let result = session::sign_in(&backend, &credentials).await;
            output.clear_line();
            let session = result.map_err(user_facing)?;
            ctx.save_session(&session)?;
            output.success(&format!("Signed in as {}", credentials.email()));
            output.verbose(&format!("Session saved to {}", ctx.session_path.display()));
        }
        AuthCommands::SignOut => {
            let result = session::sign_out(&backend).await;
            ctx.clear_session()?;
            if let Err(err) = result {
                output.warning(&format!("The backend did not confirm sign-out: {}", err.user_message()));
            }
            output.success("Signed out");
        }
        AuthCommands::Status => {
            let had_saved = ctx.load_session()?.is_some();
            let current = current_session(ctx, &backend).await?;
            if had_saved && current.is_none() {
                output.warning("The saved session expired and could not be refreshed. Sign in again.");
            }

            let status = SessionStatus {
                signed_in: current.is_some(),
                user_id: current.as_ref().map(|s| s.user_id().to_string()),
                email: current.as_ref().and_then(|s| s.user.email.clone()),
                expires_at: current
                    .as_ref()
                    .and_then(|s| s.expires_at)
                    .and_then(|secs| DateTime::from_timestamp(secs, 0)),
            };
            output.display(&status)?;
        }
    }

    Ok(())
}
