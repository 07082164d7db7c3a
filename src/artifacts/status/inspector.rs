use crate::areas::index::Index;
use crate::areas::repository::Repository;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::index_entry::{EntryMetadata, IndexEntry};
use crate::artifacts::objects::object::Object;
use crate::artifacts::status::file_change::{IndexChangeType, WorkspaceChangeType};
use crate::artifacts::status::ignore::IgnoreRules;
use std::path::Path;

/// Compares working tree files against the index and index entries against trees
pub struct Inspector<'r> {
    repository: &'r Repository,
    ignore_rules: IgnoreRules,
}

impl<'r> Inspector<'r> {
    pub fn new(repository: &'r Repository) -> anyhow::Result<Self> {
        let ignore_rules = repository.workspace().ignore_rules()?;

        Ok(Self {
            repository,
            ignore_rules,
        })
    }

    /// Whether losing `path` would lose data the index does not know about
    ///
    /// Files count when they are neither tracked nor ignored; directories count
    /// when any file below them does.
    pub fn holds_untracked_content(&self, path: &Path, index: &Index) -> anyhow::Result<bool> {
        let absolute = self.repository.workspace().path().join(path);

        if !absolute.is_dir() {
            return Ok(!index.is_directly_tracked(path)
                && !self.ignore_rules.is_ignored(path, false));
        }
        if self.ignore_rules.is_ignored(path, true) {
            return Ok(false);
        }

        for child in self.repository.workspace().list_dir(Some(path))? {
            if self.holds_untracked_content(&child, index)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        self.ignore_rules.is_ignored(path, is_dir)
    }

    fn is_content_changed(&self, index_entry: &IndexEntry) -> anyhow::Result<bool> {
        let blob = self.repository.workspace().parse_blob(&index_entry.name)?;
        let oid = blob.object_id()?;

        Ok(oid != index_entry.oid)
    }

    pub fn check_index_against_workspace(
        &self,
        entry: Option<&IndexEntry>,
        stat: Option<&EntryMetadata>,
    ) -> anyhow::Result<WorkspaceChangeType> {
        match (entry, stat) {
            (None, _) => Ok(WorkspaceChangeType::Untracked),
            (Some(_), None) => Ok(WorkspaceChangeType::Deleted),
            (Some(entry), Some(stat)) if !entry.stat_match(stat) => {
                Ok(WorkspaceChangeType::Modified)
            }
            (Some(entry), Some(stat)) if entry.times_match(stat) => Ok(WorkspaceChangeType::None),
            (Some(entry), Some(_)) if self.is_content_changed(entry)? => {
                Ok(WorkspaceChangeType::Modified)
            }
            _ => Ok(WorkspaceChangeType::None),
        }
    }

    pub fn check_index_against_tree(
        &self,
        index_entry: Option<&IndexEntry>,
        tree_entry: Option<&DatabaseEntry>,
    ) -> IndexChangeType {
        match (index_entry, tree_entry) {
            (Some(index_entry), Some(tree_entry))
                if tree_entry.mode != index_entry.metadata.mode
                    || tree_entry.oid != index_entry.oid =>
            {
                IndexChangeType::Modified
            }
            (Some(_), None) => IndexChangeType::Added,
            (None, Some(_)) => IndexChangeType::Deleted,
            _ => IndexChangeType::None,
        }
    }
}
