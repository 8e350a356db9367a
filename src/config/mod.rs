//! Configuration and state management for trellosa.
//!
//! Everything lives in one working directory (see [`resolver::resolve_workdir`]):
//!
//! ```text
//! <workdir>/config.kdl     preferences (0644)
//! <workdir>/state.kdl      tokens (0600)
//! <workdir>/tags.json      snapshot tags
//! <workdir>/snapshots/     snapshot database
//! ```
//!
//! ## Security
//!
//! **CRITICAL**: `state.kdl` MUST be created with 0600 permissions (owner read/write only)
//! because it contains API tokens.
//!
//! ## Precedence
//!
//! For tokens: CLI flag > env var > state.kdl
//! For preferences: CLI flag > config.kdl > defaults

pub mod resolver;
pub mod schema;

pub use resolver::{
    BUGZILLA_TOKEN_ENV, ConfigOverrides, Resolved, ResolvedConfig, ResolvedState,
    TRELLO_TOKEN_ENV, TokenOverrides, ValueSource, WORKDIR_ENV, resolve_config, resolve_state,
    resolve_workdir,
};
pub use schema::{NoiseField, OutputFormat, TrellosaConfig, TrellosaState};
#[cfg(unix)]
pub use schema::{CONFIG_FILE_MODE, STATE_FILE_MODE};

use kdl::KdlDocument;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::{Error, Result};

const CONFIG_FILE: &str = "config.kdl";
const STATE_FILE: &str = "state.kdl";

/// The trellosa working directory.
#[derive(Debug, Clone)]
pub struct Workdir {
    root: PathBuf,
}

impl Workdir {
    /// Open `root`, creating it if needed.
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    /// Read config.kdl. A missing file is an empty config.
    pub fn read_config(&self) -> Result<TrellosaConfig> {
        Ok(read_kdl(&self.config_path())?
            .map(|doc| TrellosaConfig::from_kdl(&doc))
            .unwrap_or_default())
    }

    /// Read state.kdl. A missing file is an empty state.
    pub fn read_state(&self) -> Result<TrellosaState> {
        let path = self.state_path();
        let state = read_kdl(&path)?
            .map(|doc| TrellosaState::from_kdl(&doc))
            .unwrap_or_default();
        if state.has_secrets() {
            warn_on_loose_permissions(&path);
        }
        Ok(state)
    }

    pub fn write_config(&self, config: &TrellosaConfig) -> Result<()> {
        #[cfg(unix)]
        let mode = Some(CONFIG_FILE_MODE);
        #[cfg(not(unix))]
        let mode = None;
        write_kdl(&self.config_path(), &config.to_kdl(), mode)
    }

    /// Write state.kdl with owner-only permissions.
    pub fn write_state(&self, state: &TrellosaState) -> Result<()> {
        #[cfg(unix)]
        let mode = Some(STATE_FILE_MODE);
        #[cfg(not(unix))]
        let mode = None;
        write_kdl(&self.state_path(), &state.to_kdl(), mode)
    }
}

fn read_kdl(path: &Path) -> Result<Option<KdlDocument>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content.parse()?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Atomically replace `path`. The mode is applied to the temp file before
/// the rename, so secrets are never readable by others.
fn write_kdl(path: &Path, doc: &KdlDocument, mode: Option<u32>) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Other(format!("Invalid config path {}", path.display())))?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(doc.to_string().as_bytes())?;
    tmp.flush()?;
    #[cfg(unix)]
    if let Some(mode) = mode {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = mode;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    tracing::debug!("Wrote {}", path.display());
    Ok(())
}

#[cfg(unix)]
fn warn_on_loose_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = fs::metadata(path) {
        let mode = meta.permissions().mode() & 0o777;
        if mode & 0o077 != 0 {
            tracing::warn!(
                "{} is accessible by other users (mode {:o}), expected {:o}",
                path.display(),
                mode,
                STATE_FILE_MODE
            );
        }
    }
}

#[cfg(not(unix))]
fn warn_on_loose_permissions(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestEnv;

    #[test]
    fn test_missing_files_are_empty() {
        let env = TestEnv::new();
        let wd = Workdir::open(env.path()).unwrap();
        assert_eq!(wd.read_config().unwrap(), TrellosaConfig::default());
        assert_eq!(wd.read_state().unwrap(), TrellosaState::default());
    }

    #[test]
    fn test_open_creates_directory() {
        let env = TestEnv::new();
        let nested = env.path().join("a/b");
        let wd = Workdir::open(&nested).unwrap();
        assert!(wd.path().is_dir());
    }

    #[test]
    fn test_invalid_kdl_is_an_error() {
        let env = TestEnv::new();
        let wd = Workdir::open(env.path()).unwrap();
        fs::write(wd.config_path(), "board \"unterminated").unwrap();
        assert!(matches!(wd.read_config(), Err(Error::Kdl(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_state_written_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let env = TestEnv::new();
        let wd = Workdir::open(env.path()).unwrap();
        let state = TrellosaState {
            trello_token: Some("t".repeat(64)),
            ..Default::default()
        };
        wd.write_state(&state).unwrap();

        let mode = fs::metadata(wd.state_path()).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, STATE_FILE_MODE);
        assert_eq!(wd.read_state().unwrap(), state);

        wd.write_config(&TrellosaConfig::default()).unwrap();
        let mode = fs::metadata(wd.config_path()).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, CONFIG_FILE_MODE);
    }
}
