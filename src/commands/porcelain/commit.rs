use crate::areas::repository::Repository;
use crate::artifacts::core::errors::{BitError, BitResult};
use crate::artifacts::objects::commit::{Author, Commit};
use crate::artifacts::objects::object_id::ObjectId;
use std::io::Write;

const MERGE_HEAD_FILE: &str = "MERGE_HEAD";

impl Repository {
    /// Record the staged tree as a new commit on top of HEAD
    ///
    /// An unborn branch gets a root commit, even for an empty tree. After a
    /// conflicted merge has been resolved and staged, the pending merge head
    /// becomes the second parent.
    pub async fn commit(&self, message: &str) -> BitResult<ObjectId> {
        if message.trim().is_empty() {
            return Err(BitError::InvalidName("empty commit message".to_string()));
        }

        let index = self.index();
        let mut index = index.lock().await;
        index.rehydrate()?;
        let tree_oid = index.write_tree(self.database())?;
        drop(index);

        let head_ref = self.refs().head_target()?;
        let parent = self.refs().resolve(&head_ref)?;

        let mut parents = parent.iter().cloned().collect::<Vec<_>>();
        parents.extend(self.read_merge_head()?);

        let commit_oid = self.write_commit(parents, tree_oid, message)?;
        self.refs().update(&head_ref, parent.as_ref(), &commit_oid)?;
        self.clear_merge_state()?;

        let commit = self.database().load_commit(&commit_oid)?;
        writeln!(
            self.writer(),
            "[{}{} {}] {}",
            head_ref.short_name(),
            if parent.is_none() { " (root-commit)" } else { "" },
            commit_oid.to_short_oid(),
            commit.short_message()
        )?;
        tracing::info!(oid = %commit_oid, branch = %head_ref, "commit created");

        Ok(commit_oid)
    }

    /// Store a commit object authored by the configured identity
    pub(crate) fn write_commit(
        &self,
        parents: Vec<ObjectId>,
        tree_oid: ObjectId,
        message: &str,
    ) -> anyhow::Result<ObjectId> {
        let config = self.config()?;
        let author = Author::load(config.user.name.as_deref(), config.user.email.as_deref())?;

        let mut message = message.trim_end().to_string();
        message.push('\n');

        self.database()
            .store(&Commit::new(parents, tree_oid, author, message))
    }

    pub(crate) fn read_merge_head(&self) -> anyhow::Result<Option<ObjectId>> {
        match std::fs::read_to_string(self.git_dir().join(MERGE_HEAD_FILE)) {
            Ok(content) => Ok(Some(ObjectId::try_parse(content.trim().to_string())?)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    pub(crate) fn write_merge_head(&self, oid: &ObjectId) -> anyhow::Result<()> {
        std::fs::write(self.git_dir().join(MERGE_HEAD_FILE), format!("{oid}\n"))?;
        Ok(())
    }

    pub(crate) fn clear_merge_state(&self) -> anyhow::Result<()> {
        match std::fs::remove_file(self.git_dir().join(MERGE_HEAD_FILE)) {
            Err(error) if error.kind() != std::io::ErrorKind::NotFound => Err(error.into()),
            _ => Ok(()),
        }
    }
}
