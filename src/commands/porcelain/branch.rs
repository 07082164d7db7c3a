use crate::areas::repository::Repository;
use crate::artifacts::branch::HEADS_PREFIX;
use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::core::errors::{BitError, BitResult};
use crate::artifacts::objects::object_id::ObjectId;
use std::io::Write;

impl Repository {
    /// Create a branch at the current HEAD commit without switching to it
    pub fn create_branch(&self, name: &str) -> BitResult<ObjectId> {
        let branch = BranchName::try_parse(name.to_string())?;
        let head = self.refs().read_head()?.ok_or_else(|| {
            BitError::NotFound(format!("cannot create branch '{branch}': HEAD has no commit yet"))
        })?;

        self.refs().create(&branch.to_ref_name(), &head)?;
        tracing::info!(branch = %branch, oid = %head, "branch created");

        Ok(head)
    }

    /// Checked-out branch name, read afresh; `None` when HEAD is detached
    pub fn current_branch(&self) -> BitResult<Option<String>> {
        Ok(self
            .refs()
            .current_branch()?
            .map(|branch| branch.to_string()))
    }

    /// Local branches with their tips, the current one marked with `*`
    pub fn list_branches(&self) -> BitResult<Vec<(String, ObjectId)>> {
        let current = self.refs().current_branch()?;
        let branches = self
            .refs()
            .list(HEADS_PREFIX)?
            .into_iter()
            .map(|(name, oid)| (name.short_name().to_string(), oid))
            .collect::<Vec<_>>();

        for (name, oid) in &branches {
            let marker = if current.as_ref().is_some_and(|c| c.as_ref() == name) {
                "*"
            } else {
                " "
            };
            writeln!(self.writer(), "{marker} {name} {}", oid.to_short_oid())?;
        }

        Ok(branches)
    }
}
