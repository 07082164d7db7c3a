use crate::areas::config::DEFAULT_REMOTE;
use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::{BranchName, SymRefName};
use crate::artifacts::core::errors::{BitError, BitResult};
use crate::artifacts::objects::object_id::ObjectId;

impl Repository {
    /// Fetch the upstream of the current branch and merge it
    ///
    /// Without a configured upstream, `origin/<current branch>` is used.
    pub async fn pull(&self) -> BitResult<ObjectId> {
        let branch = self.checked_out_branch()?;
        let (remote, remote_branch) = self.upstream_of(&branch)?;

        self.fetch_remote(&remote).await?;

        let tracking = SymRefName::remote_tracking(&remote, &remote_branch);
        let theirs = self
            .refs()
            .resolve(&tracking)?
            .ok_or_else(|| BitError::NotFound(format!("remote branch '{remote}/{remote_branch}'")))?;

        self.merge_commit(&theirs, &format!("{remote}/{remote_branch}"))
            .await
    }

    pub(crate) fn checked_out_branch(&self) -> anyhow::Result<BranchName> {
        self.refs()
            .current_branch()?
            .ok_or_else(|| BitError::NotFound("current branch: HEAD is detached".to_string()).into())
    }

    /// Remote and remote branch a local branch follows
    pub(crate) fn upstream_of(&self, branch: &BranchName) -> anyhow::Result<(String, BranchName)> {
        match self.config()?.upstream(branch) {
            Some(upstream) => {
                let merge = SymRefName::try_parse(&upstream.merge)?;
                Ok((
                    upstream.remote.clone(),
                    BranchName::try_parse_sym_ref_name(&merge)?,
                ))
            }
            None => Ok((DEFAULT_REMOTE.to_string(), branch.clone())),
        }
    }
}
