use crate::areas::repository::Repository;
use crate::artifacts::branch::revision::Revision;
use crate::artifacts::core::errors::BitResult;
use crate::artifacts::objects::object_id::ObjectId;
use std::io::Write;

/// How much of the repository `reset` rewinds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResetMode {
    /// Move the branch only
    Soft,
    /// Move the branch and reset the index
    #[default]
    Mixed,
    /// Move the branch, reset the index and the working tree
    Hard,
}

impl Repository {
    /// Reset to the current HEAD commit (an empty tree on an unborn branch)
    pub async fn reset(&self, mode: ResetMode) -> BitResult<()> {
        let head = self.refs().read_head()?;
        self.reset_to_oid(head.as_ref(), mode).await
    }

    /// Point the current branch (or detached HEAD) at `revision`
    pub async fn reset_to(&self, revision: &str, mode: ResetMode) -> BitResult<ObjectId> {
        let target = Revision::try_parse(revision)?.resolve(self)?;
        self.reset_to_oid(Some(&target), mode).await?;

        Ok(target)
    }

    async fn reset_to_oid(&self, target: Option<&ObjectId>, mode: ResetMode) -> BitResult<()> {
        let head_ref = self.refs().head_target()?;
        let current = self.refs().resolve(&head_ref)?;

        if mode != ResetMode::Soft {
            let index = self.index();
            let mut index = index.lock().await;
            index.rehydrate()?;

            match mode {
                ResetMode::Hard => self.hard_sync(&mut index, target)?,
                _ => index.read_tree(self.database(), target)?,
            }
            index.write_updates()?;
        }

        if let Some(target) = target
            && current.as_ref() != Some(target)
        {
            self.refs().update(&head_ref, current.as_ref(), target)?;
        }
        self.clear_merge_state()?;

        if mode == ResetMode::Hard
            && let Some(target) = target
        {
            let commit = self.database().load_commit(target)?;
            writeln!(
                self.writer(),
                "HEAD is now at {} {}",
                target.to_short_oid(),
                commit.short_message()
            )?;
        }
        tracing::info!(?mode, oid = ?target, "reset");

        Ok(())
    }
}
