use crate::areas::repository::Repository;
use crate::artifacts::branch::HEAD_REF_NAME;
use crate::artifacts::branch::revision::Revision;
use crate::artifacts::core::errors::{BitError, BitResult};
use crate::artifacts::merge::bca_finder::BCAFinder;
use crate::artifacts::merge::resolve::Resolve;
use crate::artifacts::objects::object_id::ObjectId;
use std::io::Write;

impl Repository {
    /// Merge a branch (or any revision) into the current branch
    ///
    /// Returns the commit the branch ends up at. On conflicts the working tree
    /// holds marked-up files, the index keeps the base/ours/theirs stages and
    /// `MergeConflict` is returned; the branch does not move until the result
    /// is committed.
    pub async fn merge_branch(&self, name: &str) -> BitResult<ObjectId> {
        let theirs = Revision::try_parse(name)?.resolve(self)?;
        self.merge_commit(&theirs, name).await
    }

    pub(crate) async fn merge_commit(&self, theirs: &ObjectId, label: &str) -> BitResult<ObjectId> {
        let head_ref = self.refs().head_target()?;
        let ours = self.refs().resolve(&head_ref)?;

        let index = self.index();
        let mut index = index.lock().await;
        index.rehydrate()?;

        if index.has_conflicts() {
            return Err(BitError::MergeConflict {
                paths: index.conflicted_paths(),
            });
        }
        if self.read_merge_head()?.is_some() {
            return Err(BitError::Conflict(
                "a merge is in progress: commit or reset it first".to_string(),
            ));
        }

        let Some(ours) = ours else {
            self.migrate(&mut index, None, Some(theirs), "merge")?;
            index.write_updates()?;
            drop(index);

            self.refs().update(&head_ref, None, theirs)?;
            writeln!(self.writer(), "Fast-forward")?;
            return Ok(theirs.clone());
        };

        let finder = BCAFinder::new(|oid: &ObjectId| self.database().slim_commit(oid));
        let base = finder.find_best_common_ancestor(&ours, theirs)?;

        if base.as_ref() == Some(theirs) {
            writeln!(self.writer(), "Already up to date.")?;
            return Ok(ours);
        }

        if base.as_ref() == Some(&ours) {
            self.migrate(&mut index, Some(&ours), Some(theirs), "merge")?;
            index.write_updates()?;
            drop(index);

            self.refs().update(&head_ref, Some(&ours), theirs)?;
            writeln!(
                self.writer(),
                "Updating {}..{}\nFast-forward",
                ours.to_short_oid(),
                theirs.to_short_oid()
            )?;
            tracing::info!(from = %ours, to = %theirs, "fast-forward merge");
            return Ok(theirs.clone());
        }

        let outcome = Resolve::new(self.database(), HEAD_REF_NAME, label).merge_trees(
            base.as_ref(),
            &ours,
            theirs,
        )?;
        let merged_tree = outcome.write_tree(self.database())?;

        if !outcome.is_clean() {
            self.migrate(&mut index, Some(&ours), Some(&merged_tree), "merge")?;
            for (path, conflict) in &outcome.conflicts {
                index.add_conflict(
                    path,
                    conflict.base.as_ref(),
                    conflict.ours.as_ref(),
                    conflict.theirs.as_ref(),
                )?;
                writeln!(self.writer(), "CONFLICT (content): Merge conflict in {}", path.display())?;
            }
            index.write_updates()?;
            self.write_merge_head(theirs)?;

            writeln!(
                self.writer(),
                "Automatic merge failed; fix conflicts and then commit the result."
            )?;
            tracing::info!(conflicts = outcome.conflicts.len(), "merge stopped on conflicts");
            return Err(BitError::MergeConflict {
                paths: outcome.conflicted_paths(),
            });
        }

        // the commit object exists before the working tree changes
        let merge_oid = self.write_commit(
            vec![ours.clone(), theirs.clone()],
            merged_tree.clone(),
            &format!("Merge branch '{label}'"),
        )?;
        self.migrate(&mut index, Some(&ours), Some(&merged_tree), "merge")?;
        index.write_updates()?;
        drop(index);

        self.refs().update(&head_ref, Some(&ours), &merge_oid)?;

        writeln!(self.writer(), "Merge made by the 'resolve' strategy.")?;
        tracing::info!(oid = %merge_oid, base = ?base, "merge committed");

        Ok(merge_oid)
    }
}
