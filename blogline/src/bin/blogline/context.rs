use anyhow::{Context, Result};
use blogline::{BlogConfig, HostedBackend, Session};
use std::io::Write;
use std::path::{Path, PathBuf};

const STATE_DIR: &str = ".blogline";

/// Where blogline keeps its config and the signed-in session
pub struct ProjectContext {
    /// Directory holding config.toml and session.json
    pub state_dir: PathBuf,
    /// Path to config file
    pub config_path: PathBuf,
    /// Path to the persisted session
    pub session_path: PathBuf,
    /// Loaded configuration (defaults when the file is absent)
    pub config: BlogConfig,
}

impl ProjectContext {
    /// Resolve the context from an explicit config path, or search from the
    /// current directory upward for a `.blogline` directory
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => {
                let state_dir = path
                    .parent()
                    .filter(|parent| !parent.as_os_str().is_empty())
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."));
                Self::load(state_dir, path.to_path_buf())
            }
            None => {
                let current_dir = std::env::current_dir().context("Failed to get current directory")?;
                Self::find_from(&current_dir)
            }
        }
    }

    /// Find the context starting from the given directory. Falls back to
    /// `<start>/.blogline` when no ancestor has one.
    pub fn find_from(start: &Path) -> Result<Self> {
        let state_dir = start
            .ancestors()
            .map(|dir| dir.join(STATE_DIR))
            .find(|candidate| candidate.is_dir())
            .unwrap_or_else(|| start.join(STATE_DIR));
        let config_path = state_dir.join("config.toml");
        Self::load(state_dir, config_path)
    }

    fn load(state_dir: PathBuf, config_path: PathBuf) -> Result<Self> {
        let config = BlogConfig::load(&config_path)
            .with_context(|| format!("Failed to load {}", config_path.display()))?;
        let session_path = state_dir.join("session.json");
        Ok(Self {
            state_dir,
            config_path,
            session_path,
            config,
        })
    }

    /// Build the hosted backend and resume the saved session, if any
    pub fn backend(&self) -> Result<HostedBackend> {
        let hosted = self
            .config
            .hosted_config()
            .context("Backend is not configured. Set BLOGLINE_URL and BLOGLINE_ANON_KEY or edit config.toml")?;
        let backend = HostedBackend::new(hosted);
        if let Some(session) = self.load_session()? {
            log::debug!("restoring session for {}", session.user_id());
            backend.restore_session(session);
        }
        Ok(backend)
    }

    pub fn load_session(&self) -> Result<Option<Session>> {
        if !self.session_path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.session_path).context("Failed to read session.json")?;
        match serde_json::from_str(&content) {
            Ok(session) => Ok(Some(session)),
            Err(err) => {
                log::warn!("ignoring unreadable session file: {err}");
                Ok(None)
            }
        }
    }

    /// Writes session.json readable by the owner only; it holds both tokens.
    pub fn save_session(&self, session: &Session) -> Result<()> {
        std::fs::create_dir_all(&self.state_dir)
            .with_context(|| format!("Failed to create {}", self.state_dir.display()))?;
        let content = serde_json::to_string_pretty(session)?;
        let mut file = private_file(&self.session_path).context("Failed to open session.json")?;
        file.write_all(content.as_bytes()).context("Failed to write session.json")?;
        Ok(())
    }

    /// Brings session.json in line with the session the backend now holds,
    /// e.g. after a token refresh or a rejected refresh.
    pub fn sync_session(&self, current: Option<&Session>) -> Result<()> {
        let saved = self.load_session()?;
        match current {
            Some(session) if saved.as_ref() != Some(session) => self.save_session(session),
            Some(_) => Ok(()),
            None if saved.is_some() => self.clear_session(),
            None => Ok(()),
        }
    }

    pub fn clear_session(&self) -> Result<()> {
        if self.session_path.exists() {
            std::fs::remove_file(&self.session_path).context("Failed to remove session.json")?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn private_file(path: &Path) -> std::io::Result<std::fs::File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // `mode` only applies on creation; tighten a file left by an older version.
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn private_file(path: &Path) -> std::io::Result<std::fs::File> {
    std::fs::File::create(path)
}
