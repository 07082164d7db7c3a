use crate::areas::config::DEFAULT_REMOTE;
use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::{BranchName, SymRefName};
use crate::artifacts::core::errors::{BitError, BitResult};
use crate::artifacts::transport::client::RemoteUrl;
use crate::artifacts::transport::credentials::{CredentialProvider, Credentials};
use std::io::Write;
use std::path::Path;

impl Repository {
    /// Clone `uri` into `path`, which must be missing or empty
    ///
    /// The new repository has `origin` pointing at `uri`, tracking refs for
    /// every remote branch, and the branch the remote HEAD names checked out.
    /// When the clone fails, whatever it created is removed again.
    pub async fn clone(
        uri: &str,
        path: impl AsRef<Path>,
        credentials: &dyn CredentialProvider,
    ) -> BitResult<Self> {
        Self::clone_with_writer(uri, path, credentials, Box::new(std::io::sink())).await
    }

    pub async fn clone_with_writer(
        uri: &str,
        path: impl AsRef<Path>,
        credentials: &dyn CredentialProvider,
        writer: Box<dyn std::io::Write>,
    ) -> BitResult<Self> {
        let path = path.as_ref();
        let existed = path.exists();
        if existed && std::fs::read_dir(path)?.next().is_some() {
            return Err(BitError::AlreadyExists(format!(
                "destination path '{}'",
                path.display()
            )));
        }

        let url = match RemoteUrl::parse(uri)? {
            RemoteUrl::Local(local) => local
                .canonicalize()
                .map_err(|_| BitError::NotFound(format!("repository '{uri}'")))?
                .display()
                .to_string(),
            RemoteUrl::Daemon { .. } => uri.to_string(),
        };
        let credentials = credentials.resolve()?;

        let result = Self::clone_into(&url, path, credentials, writer).await;
        if result.is_err()
            && let Err(error) = remove_clone_leftovers(path, existed)
        {
            tracing::warn!(path = ?path, %error, "failed to clean up after clone");
        }

        result
    }

    async fn clone_into(
        url: &str,
        path: &Path,
        credentials: Credentials,
        writer: Box<dyn std::io::Write>,
    ) -> BitResult<Self> {
        let mut repository = Self::initialize(path, writer)?;
        repository.set_credentials(credentials);

        let mut config = repository.config()?;
        config.set_remote(DEFAULT_REMOTE, url);
        repository.save_config(&config)?;
        writeln!(repository.writer(), "Cloning into '{}'...", path.display())?;

        let fetched = repository.fetch_remote(DEFAULT_REMOTE).await?;

        let branch = match fetched.remote_head {
            Some(head) => BranchName::try_parse(head)?,
            None => config.default_branch()?,
        };
        let tracking = SymRefName::remote_tracking(DEFAULT_REMOTE, &branch);
        repository.refs().set_head_symbolic(&branch)?;

        let Some(oid) = repository.refs().resolve(&tracking)? else {
            writeln!(
                repository.writer(),
                "warning: You appear to have cloned an empty repository."
            )?;
            return Ok(repository);
        };

        let index = repository.index();
        let mut index = index.lock().await;
        index.rehydrate()?;
        repository.migrate(&mut index, None, Some(&oid), "clone")?;
        index.write_updates()?;
        drop(index);

        repository.refs().create(&branch.to_ref_name(), &oid)?;
        config.set_upstream(&branch, DEFAULT_REMOTE);
        repository.save_config(&config)?;
        tracing::info!(url, branch = %branch, oid = %oid, "clone finished");

        Ok(repository)
    }
}

fn remove_clone_leftovers(path: &Path, keep_root: bool) -> std::io::Result<()> {
    if !keep_root {
        return std::fs::remove_dir_all(path);
    }

    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(entry.path())?;
        } else {
            std::fs::remove_file(entry.path())?;
        }
    }

    Ok(())
}
