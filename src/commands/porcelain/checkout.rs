use crate::areas::config::DEFAULT_REMOTE;
use crate::areas::index::Index;
use crate::areas::refs::SymRefOrOid;
use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::{BranchName, SymRefName};
use crate::artifacts::branch::revision::Revision;
use crate::artifacts::checkout::migration::Migration;
use crate::artifacts::core::errors::{BitError, BitResult};
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::objects::object::with_header;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;

const DETACHMENT_NOTICE: &str = r#"
You are in 'detached HEAD' state. You can look around, make experimental
changes and commit them, and you can discard any commits you make in this
state without impacting any branches by switching back to a branch.
"#;

/// Where a branch named on checkout comes from
enum BranchSource {
    Local(ObjectId),
    /// Only `origin/<name>` exists; the local branch is created on success
    Tracking(ObjectId),
}

impl BranchSource {
    fn oid(&self) -> &ObjectId {
        match self {
            BranchSource::Local(oid) | BranchSource::Tracking(oid) => oid,
        }
    }
}

impl Repository {
    /// Switch to a local branch
    ///
    /// When only `origin/<name>` exists, the local branch is created from it
    /// and set to track it.
    pub async fn checkout_branch(&self, name: &str) -> BitResult<ObjectId> {
        let branch = BranchName::try_parse(name.to_string())?;
        if self.find_branch(&branch)?.is_none() {
            return Err(BitError::NotFound(format!("branch '{branch}'")));
        }

        self.checkout(name, false).await
    }

    /// Check out a branch or any revision (detaching HEAD)
    ///
    /// Without `force`, local changes that the switch would overwrite abort it
    /// with `Conflict` and nothing is touched. With `force`, the working tree
    /// and the index are made to match the target exactly. HEAD moves last,
    /// compared against the value it had when the checkout started.
    pub async fn checkout(&self, target: &str, force: bool) -> BitResult<ObjectId> {
        let head_before = self.refs().read_raw(&SymRefName::head())?;
        let previous_branch = self.refs().current_branch()?;
        let current_oid = self.refs().read_head()?;

        let branch = match BranchName::try_parse(target.to_string()) {
            Ok(branch) => self.find_branch(&branch)?.map(|source| (branch, source)),
            Err(_) => None,
        };
        let target_oid = match &branch {
            Some((_, source)) => source.oid().clone(),
            None => Revision::try_parse(target)?.resolve(self)?,
        };

        let index = self.index();
        let mut index = index.lock().await;
        index.rehydrate()?;

        if force {
            self.hard_sync(&mut index, Some(&target_oid))?;
        } else {
            if index.has_conflicts() {
                return Err(BitError::Conflict(
                    "you need to resolve your current index first".to_string(),
                ));
            }
            self.migrate(&mut index, current_oid.as_ref(), Some(&target_oid), "checkout")?;
        }
        index.write_updates()?;
        drop(index);

        let new_head = match &branch {
            Some((branch, source)) => {
                if let BranchSource::Tracking(oid) = source {
                    self.create_tracking_branch(branch, oid)?;
                }
                SymRefOrOid::SymRef {
                    sym_ref_name: branch.to_ref_name(),
                }
            }
            None => SymRefOrOid::Oid(target_oid.clone()),
        };
        self.refs().switch_head(head_before.as_ref(), new_head)?;
        if force {
            self.clear_merge_state()?;
        }

        let branch = branch.map(|(branch, _)| branch);
        match (&previous_branch, &branch) {
            (_, None) => {
                if previous_branch.is_some() {
                    writeln!(self.writer(), "Note: checking out '{target}'.{DETACHMENT_NOTICE}")?;
                }
                let commit = self.database().load_commit(&target_oid)?;
                writeln!(
                    self.writer(),
                    "HEAD is now at {} {}",
                    target_oid.to_short_oid(),
                    commit.short_message()
                )?;
            }
            (Some(previous), Some(branch)) if previous == branch => {
                writeln!(self.writer(), "Already on '{branch}'")?;
            }
            (_, Some(branch)) => writeln!(self.writer(), "Switched to branch '{branch}'")?,
        }
        tracing::info!(revision = target, oid = %target_oid, force, "checked out");

        Ok(target_oid)
    }

    /// Tip of a local branch, or of its `origin` tracking ref when only that
    /// one exists; nothing is written
    fn find_branch(&self, branch: &BranchName) -> anyhow::Result<Option<BranchSource>> {
        if let Some(oid) = self.refs().resolve(&branch.to_ref_name())? {
            return Ok(Some(BranchSource::Local(oid)));
        }

        let tracking = SymRefName::remote_tracking(DEFAULT_REMOTE, branch);
        Ok(self.refs().resolve(&tracking)?.map(BranchSource::Tracking))
    }

    fn create_tracking_branch(&self, branch: &BranchName, oid: &ObjectId) -> anyhow::Result<()> {
        self.refs().create(&branch.to_ref_name(), oid)?;
        let mut config = self.config()?;
        config.set_upstream(branch, DEFAULT_REMOTE);
        self.save_config(&config)?;
        writeln!(
            self.writer(),
            "branch '{branch}' set up to track '{DEFAULT_REMOTE}/{branch}'."
        )?;

        Ok(())
    }

    /// Carry local changes over from one commit to another, refusing to
    /// overwrite anything that is not saved in `from`
    pub(crate) fn migrate(
        &self,
        index: &mut Index,
        from: Option<&ObjectId>,
        to: Option<&ObjectId>,
        operation: &'static str,
    ) -> anyhow::Result<()> {
        let changes = self.database().tree_diff(from, to)?.into_changes();
        Migration::new(self, index, changes, operation)?.apply_changes()
    }

    /// Make the index and the tracked part of the working tree match `target`
    ///
    /// Files tracked now but absent from the target are deleted. Untracked
    /// files are left alone unless a target path needs their place.
    pub(crate) fn hard_sync(&self, index: &mut Index, target: Option<&ObjectId>) -> anyhow::Result<()> {
        let entries = self.database().flatten_tree(target)?;

        let tracked = index
            .entries()
            .map(|entry| entry.name.clone())
            .collect::<BTreeSet<_>>();
        for path in tracked.iter().filter(|path| !entries.contains_key(*path)) {
            self.workspace().remove_file(path)?;
        }

        for (path, entry) in &entries {
            if entry.mode == EntryMode::Gitlink {
                if !self.workspace().exists(path) {
                    self.workspace().write_file(path, &[], entry.mode)?;
                }
                continue;
            }
            if self.workspace_matches(path, entry)? {
                continue;
            }

            let blob = self.database().load_blob(&entry.oid)?;
            self.workspace().write_file(path, blob.content(), entry.mode)?;
        }

        index.read_tree(self.database(), target)?;
        for (path, entry) in &entries {
            if entry.mode.is_blob() {
                index.update_entry_stat(path, self.workspace().stat_file(path)?);
            }
        }

        Ok(())
    }

    fn workspace_matches(&self, path: &Path, entry: &DatabaseEntry) -> anyhow::Result<bool> {
        match std::fs::symlink_metadata(self.workspace().path().join(path)) {
            Ok(metadata) if !metadata.is_dir() => {}
            _ => return Ok(false),
        }
        if self.workspace().stat_file(path)?.mode != entry.mode {
            return Ok(false);
        }

        let data = self.workspace().read_file(path)?;
        Ok(ObjectId::hash_of(&with_header(ObjectType::Blob, &data)) == entry.oid)
    }
}
