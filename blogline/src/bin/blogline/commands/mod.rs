pub mod auth;
pub mod comments;
pub mod posts;

use blogline::{BlogError, HostedBackend, Session, SessionProvider, UserId};

use crate::context::ProjectContext;

/// Converts a library error into the message shown to the user.
pub fn user_facing(err: BlogError) -> anyhow::Error {
    log::debug!("command failed: {err:?}");
    anyhow::anyhow!(err.user_message())
}

/// The session the backend holds after resuming (and, if needed, refreshing)
/// the saved one. session.json is updated to match.
pub async fn current_session(ctx: &ProjectContext, backend: &HostedBackend) -> anyhow::Result<Option<Session>> {
    let mut provider = SessionProvider::init(backend).await;
    let current = provider.current();
    provider.teardown();
    ctx.sync_session(current.as_ref())?;
    Ok(current)
}

/// The signed-in user, if any.
pub async fn current_viewer(ctx: &ProjectContext, backend: &HostedBackend) -> anyhow::Result<Option<UserId>> {
    Ok(current_session(ctx, backend)
        .await?
        .map(|session| session.user_id().clone()))
}
