use crate::areas::config::RepoConfig;
use crate::areas::database::Database;
use crate::areas::index::Index;
use crate::areas::refs::Refs;
use crate::areas::workspace::Workspace;
use crate::artifacts::core::errors::{BitError, BitResult};
use crate::artifacts::transport::credentials::{CredentialProvider, Credentials};
use anyhow::Context;
use std::cell::{RefCell, RefMut};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const GIT_DIR_NAME: &str = ".git";

/// Handle on one repository: its working tree and its `.git` directory
///
/// Every operation reads the on-disk state afresh; nothing about refs is cached
/// between calls. The index is guarded by an async mutex for in-process
/// callers and by a file lock across processes.
pub struct Repository {
    path: Box<Path>,
    git_dir: Box<Path>,
    writer: RefCell<Box<dyn std::io::Write>>,
    index: Arc<Mutex<Index>>,
    database: Database,
    workspace: Workspace,
    refs: Refs,
    credentials: Credentials,
}

impl Repository {
    /// Handle rooted at `path`, which is created when missing
    ///
    /// Human-readable progress is written to `writer`.
    pub fn new(path: &Path, writer: Box<dyn std::io::Write>) -> anyhow::Result<Self> {
        if !path.exists() {
            std::fs::create_dir_all(path)
                .with_context(|| format!("failed to create repository directory {path:?}"))?;
        }
        let path = path.canonicalize()?;
        let git_dir = path.join(GIT_DIR_NAME);

        let index = Index::new(git_dir.join("index").into_boxed_path());
        let database = Database::new(git_dir.join("objects").into_boxed_path());
        let workspace = Workspace::new(path.clone().into_boxed_path());
        let refs = Refs::new(git_dir.clone().into_boxed_path());

        Ok(Repository {
            path: path.into_boxed_path(),
            git_dir: git_dir.into_boxed_path(),
            writer: RefCell::new(writer),
            index: Arc::new(Mutex::new(index)),
            database,
            workspace,
            refs,
            credentials: Credentials::NoAuth,
        })
    }

    /// Open an existing repository, discarding progress output
    pub fn open(path: impl AsRef<Path>) -> BitResult<Self> {
        Self::open_with_writer(path, Box::new(std::io::sink()))
    }

    pub fn open_with_writer(
        path: impl AsRef<Path>,
        writer: Box<dyn std::io::Write>,
    ) -> BitResult<Self> {
        let path = path.as_ref();
        if !path.join(GIT_DIR_NAME).join("HEAD").is_file() {
            return Err(BitError::NotFound(format!(
                "no repository at {}",
                path.display()
            )));
        }

        Ok(Self::new(path, writer)?)
    }

    /// Resolve credentials once and use them for every remote operation
    pub fn with_credentials(mut self, provider: &dyn CredentialProvider) -> BitResult<Self> {
        self.credentials = provider.resolve()?;
        Ok(self)
    }

    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = credentials;
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Release the handle; pending output is flushed
    pub fn close(self) -> BitResult<()> {
        self.writer.borrow_mut().flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn writer(&'_ self) -> RefMut<'_, Box<dyn std::io::Write>> {
        self.writer.borrow_mut()
    }

    pub fn index(&self) -> Arc<Mutex<Index>> {
        self.index.clone()
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn refs(&self) -> &Refs {
        &self.refs
    }

    /// Configuration as currently stored on disk
    pub fn config(&self) -> anyhow::Result<RepoConfig> {
        RepoConfig::load(&self.git_dir)
    }

    pub fn save_config(&self, config: &RepoConfig) -> anyhow::Result<()> {
        config.save(&self.git_dir)
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
