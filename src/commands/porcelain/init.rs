use crate::areas::config::CONFIG_FILE_NAME;
use crate::areas::repository::{GIT_DIR_NAME, Repository};
use crate::artifacts::core::errors::BitResult;
use anyhow::Context;
use std::io::Write;
use std::path::Path;

impl Repository {
    /// Create an empty repository at `path`, creating the directory if needed
    ///
    /// Running it on an existing repository leaves its refs and objects alone.
    pub async fn init(path: impl AsRef<Path>) -> BitResult<Self> {
        Self::init_with_writer(path, Box::new(std::io::sink())).await
    }

    pub async fn init_with_writer(
        path: impl AsRef<Path>,
        writer: Box<dyn std::io::Write>,
    ) -> BitResult<Self> {
        let reinitialized = path.as_ref().join(GIT_DIR_NAME).join("HEAD").is_file();
        let repository = Self::initialize(path.as_ref(), writer)?;

        writeln!(
            repository.writer(),
            "{} Git repository in {}",
            if reinitialized {
                "Reinitialized existing"
            } else {
                "Initialized empty"
            },
            repository.git_dir().display()
        )?;

        Ok(repository)
    }

    pub(crate) fn initialize(path: &Path, writer: Box<dyn std::io::Write>) -> anyhow::Result<Self> {
        let repository = Self::new(path, writer)?;

        std::fs::create_dir_all(repository.database().objects_path())
            .context("Failed to create .git/objects directory")?;

        if !repository.refs().head_path().is_file() {
            let config = repository.config()?;
            repository.refs().initialize(&config.default_branch()?)?;
        }
        if !repository.git_dir().join(CONFIG_FILE_NAME).exists() {
            repository.save_config(&repository.config()?)?;
        }
        tracing::info!(path = ?repository.path(), "repository initialized");

        Ok(repository)
    }
}
