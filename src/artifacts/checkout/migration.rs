//! Moving the working tree and index from one tree to another
//!
//! A migration is computed from the tree diff between the current and the
//! target tree:
//!
//! 1. every changed path is checked against local state (index and workspace)
//! 2. file system actions are planned (add, delete, modify)
//! 3. the workspace is rewritten, then the index is updated
//!
//! All conflicts are collected before anything is touched, so a refused
//! migration leaves the working tree exactly as it was.
//!
//! ## Conflicts
//!
//! - stale file: the index or working tree copy differs from both trees
//! - stale directory: a directory with untracked files sits where a file goes
//! - untracked overwritten: an untracked file sits where a file goes
//! - untracked removed: an untracked file would be lost with its directory

use crate::areas::index::Index;
use crate::areas::repository::Repository;
use crate::artifacts::checkout::conflict::{ConflictMessage, ConflictType};
use crate::artifacts::core::errors::BitError;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::diff::tree_diff::{ChangeSet, TreeChangeType};
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_entry::{IndexEntry, Stage};
use crate::artifacts::status::file_change::{IndexChangeType, WorkspaceChangeType};
use crate::artifacts::status::inspector::Inspector;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Type of file system action required for a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionType {
    Add,
    Delete,
    Modify,
}

/// Planned actions grouped by type
pub type ActionsSet = BTreeMap<ActionType, Vec<(PathBuf, Option<DatabaseEntry>)>>;

/// Detected conflicts grouped by type
pub type ConflictsSet = BTreeMap<ConflictType, Vec<PathBuf>>;

pub struct Migration<'r> {
    repository: &'r Repository,
    changes: ChangeSet,
    index: &'r mut Index,
    inspector: Inspector<'r>,
    /// Name of the porcelain operation, used in conflict messages
    operation: &'static str,
    actions: ActionsSet,
    conflicts: ConflictsSet,
    mkdirs: BTreeSet<PathBuf>,
    rmdirs: BTreeSet<PathBuf>,
}

impl<'r> Migration<'r> {
    pub fn new(
        repository: &'r Repository,
        index: &'r mut Index,
        changes: ChangeSet,
        operation: &'static str,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            repository,
            changes,
            index,
            inspector: Inspector::new(repository)?,
            operation,
            actions: ActionsSet::new(),
            conflicts: ConflictsSet::new(),
            mkdirs: BTreeSet::new(),
            rmdirs: BTreeSet::new(),
        })
    }

    pub fn actions_of(&self, action_type: &ActionType) -> &[(PathBuf, Option<DatabaseEntry>)] {
        self.actions
            .get(action_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn mkdirs(&self) -> &BTreeSet<PathBuf> {
        &self.mkdirs
    }

    pub fn rmdirs(&self) -> &BTreeSet<PathBuf> {
        &self.rmdirs
    }

    /// Plan, check, then rewrite the workspace and the in-memory index
    ///
    /// The caller persists the index once the migration succeeds.
    pub fn apply_changes(&mut self) -> anyhow::Result<()> {
        self.plan_changes()?;
        self.repository.workspace().apply_migration(self)?;
        self.update_index()?;

        tracing::debug!(
            operation = self.operation,
            changes = self.changes.len(),
            "working tree migrated"
        );

        Ok(())
    }

    fn plan_changes(&mut self) -> anyhow::Result<()> {
        let changes = std::mem::take(&mut self.changes);

        for (path, change) in &changes {
            self.check_for_conflict(path, change)?;
            self.record_change(path, change);
        }
        self.changes = changes;

        let errors = self.collect_errors();
        if !errors.is_empty() {
            return Err(BitError::Conflict(format!("{}\nAborting", errors.join("\n"))).into());
        }

        Ok(())
    }

    fn collect_errors(&self) -> Vec<String> {
        self.conflicts
            .iter()
            .filter(|(_, paths)| !paths.is_empty())
            .map(|(conflict_type, paths)| {
                let ConflictMessage { header, footer } =
                    ConflictMessage::for_operation(conflict_type, self.operation);
                let paths = paths
                    .iter()
                    .map(|path| format!("\t{}", path.display()))
                    .collect::<Vec<_>>()
                    .join("\n");

                format!("{header}\n{paths}\n{footer}")
            })
            .collect()
    }

    fn push_conflict(&mut self, conflict_type: ConflictType, path: PathBuf) {
        let paths = self.conflicts.entry(conflict_type).or_default();
        if !paths.contains(&path) {
            paths.push(path);
        }
    }

    fn check_for_conflict(&mut self, path: &Path, change: &TreeChangeType) -> anyhow::Result<()> {
        let entry = self.index.entry_by_path(path).cloned();
        let entry = entry.as_ref();
        let (old_entry, new_entry) = (change.old_entry(), change.new_entry());

        if self.index.entry_at_stage(path, Stage::Ours).is_some()
            || self.index_differs_from_trees(entry, old_entry, new_entry)
        {
            self.push_conflict(ConflictType::StaleFile, path.into());
            return Ok(());
        }

        let stat = self.repository.workspace().stat_file(path).ok();
        let conflict_type = ConflictType::get_conflict_type(stat.as_ref(), entry, new_entry);

        match stat {
            Some(stat) if stat.mode.is_tree() => {
                if self.inspector.holds_untracked_content(path, self.index)? {
                    self.push_conflict(conflict_type, path.into());
                }
            }
            Some(stat) => {
                let change = self
                    .inspector
                    .check_index_against_workspace(entry, Some(&stat))?;
                let expendable =
                    change == WorkspaceChangeType::Untracked && self.inspector.is_ignored(path, false);

                if change != WorkspaceChangeType::None && !expendable {
                    self.push_conflict(conflict_type, path.into());
                }
            }
            None => {
                if let Some(parent) = self.untracked_parent(path)? {
                    let conflict_path = if entry.is_some() { path } else { parent.as_path() };
                    self.push_conflict(conflict_type, conflict_path.into());
                }
            }
        }

        Ok(())
    }

    /// An untracked file standing where one of the path's parent directories should be
    fn untracked_parent(&self, path: &Path) -> anyhow::Result<Option<PathBuf>> {
        for parent in path.ancestors().skip(1) {
            if parent.as_os_str().is_empty() {
                break;
            }

            match self.repository.workspace().stat_file(parent) {
                Ok(stat) if !stat.mode.is_tree() => {
                    if self.inspector.holds_untracked_content(parent, self.index)? {
                        return Ok(Some(parent.to_path_buf()));
                    }
                }
                _ => continue,
            }
        }

        Ok(None)
    }

    fn index_differs_from_trees(
        &self,
        index_entry: Option<&IndexEntry>,
        old_entry: Option<&DatabaseEntry>,
        new_entry: Option<&DatabaseEntry>,
    ) -> bool {
        self.inspector.check_index_against_tree(index_entry, old_entry) != IndexChangeType::None
            && self.inspector.check_index_against_tree(index_entry, new_entry)
                != IndexChangeType::None
    }

    fn record_change(&mut self, path: &Path, change: &TreeChangeType) {
        let parents = path
            .ancestors()
            .skip(1)
            .filter(|ancestor| !ancestor.as_os_str().is_empty())
            .map(Path::to_path_buf);

        let (action_type, entry) = match change {
            TreeChangeType::Added(new_entry) => {
                self.mkdirs.extend(parents);
                (ActionType::Add, Some(new_entry.clone()))
            }
            TreeChangeType::Deleted(_) => {
                self.rmdirs.extend(parents);
                (ActionType::Delete, None)
            }
            TreeChangeType::Modified { new, .. } => {
                self.mkdirs.extend(parents);
                (ActionType::Modify, Some(new.clone()))
            }
        };

        self.actions
            .entry(action_type)
            .or_default()
            .push((path.into(), entry));
    }

    fn update_index(&mut self) -> anyhow::Result<()> {
        for action_type in [ActionType::Delete, ActionType::Add, ActionType::Modify] {
            let actions = self.actions.get(&action_type).cloned().unwrap_or_default();

            for (file_path, entry) in actions {
                match (action_type, entry) {
                    (ActionType::Delete, _) => self.index.remove(&file_path)?,
                    (_, Some(entry)) if entry.mode == EntryMode::Gitlink => self.index.add(
                        IndexEntry::from_database_entry(file_path, &entry, Stage::Resolved),
                    )?,
                    (_, Some(entry)) => {
                        let stat = self.repository.workspace().stat_file(&file_path)?;
                        self.index
                            .add(IndexEntry::from_stat(file_path, entry.oid, stat))?;
                    }
                    (_, None) => {
                        anyhow::bail!("no target entry recorded for {}", file_path.display())
                    }
                }
            }
        }

        Ok(())
    }

    pub fn load_blob_data(&self, entry: &DatabaseEntry) -> anyhow::Result<Bytes> {
        if entry.mode == EntryMode::Gitlink {
            return Ok(Bytes::new());
        }

        Ok(self
            .repository
            .database()
            .load_blob(&entry.oid)?
            .into_content())
    }
}
