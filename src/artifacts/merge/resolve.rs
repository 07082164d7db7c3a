//! Three-way merge of two trees against their merge base
//!
//! Paths are merged one at a time. A path changed on one side only takes that
//! side; a path changed identically on both sides is clean. When both sides
//! changed a regular file its lines are merged, and overlapping edits leave
//! conflict markers behind. Everything else that differs on both sides
//! (modify/delete, symlinks, binary content) is a conflict keeping the
//! surviving or our version in the working tree.

use crate::areas::database::Database;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_entry::{IndexEntry, Stage};
use crate::artifacts::merge::diff3;
use crate::artifacts::objects::object::Object;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tree::Tree;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Bytes inspected when deciding whether content is binary
const BINARY_SNIFF_LEN: usize = 8000;

/// The three versions of a path left unresolved
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictedPath {
    pub base: Option<DatabaseEntry>,
    pub ours: Option<DatabaseEntry>,
    pub theirs: Option<DatabaseEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Content for the working tree, conflicted paths included
    pub entries: BTreeMap<PathBuf, DatabaseEntry>,
    pub conflicts: BTreeMap<PathBuf, ConflictedPath>,
}

impl MergeOutcome {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn conflicted_paths(&self) -> Vec<PathBuf> {
        self.conflicts.keys().cloned().collect()
    }

    /// Store the tree holding `entries` and return its id
    pub fn write_tree(&self, database: &Database) -> anyhow::Result<ObjectId> {
        let index_entries = self
            .entries
            .iter()
            .map(|(path, entry)| {
                IndexEntry::from_database_entry(path.clone(), entry, Stage::Resolved)
            })
            .collect::<Vec<_>>();

        let tree = Tree::build(index_entries.iter())?;
        tree.traverse(&mut |tree| database.store(tree).map(|_| ()))?;

        tree.object_id()
    }
}

pub struct Resolve<'r> {
    database: &'r Database,
    ours_label: &'r str,
    theirs_label: &'r str,
}

impl<'r> Resolve<'r> {
    pub fn new(database: &'r Database, ours_label: &'r str, theirs_label: &'r str) -> Self {
        Self {
            database,
            ours_label,
            theirs_label,
        }
    }

    /// Merge the trees of `ours` and `theirs` (commits or trees); `base` is
    /// absent for unrelated histories
    pub fn merge_trees(
        &self,
        base: Option<&ObjectId>,
        ours: &ObjectId,
        theirs: &ObjectId,
    ) -> anyhow::Result<MergeOutcome> {
        let base = self.database.flatten_tree(base)?;
        let ours = self.database.flatten_tree(Some(ours))?;
        let theirs = self.database.flatten_tree(Some(theirs))?;

        let paths = base
            .keys()
            .chain(ours.keys())
            .chain(theirs.keys())
            .cloned()
            .collect::<BTreeSet<_>>();

        let mut outcome = MergeOutcome::default();
        for path in paths {
            let (base, ours, theirs) = (base.get(&path), ours.get(&path), theirs.get(&path));
            self.merge_path(path, base, ours, theirs, &mut outcome)?;
        }
        Self::resolve_file_directory_clashes(&mut outcome);

        tracing::debug!(
            entries = outcome.entries.len(),
            conflicts = outcome.conflicts.len(),
            "trees merged"
        );

        Ok(outcome)
    }

    fn merge_path(
        &self,
        path: PathBuf,
        base: Option<&DatabaseEntry>,
        ours: Option<&DatabaseEntry>,
        theirs: Option<&DatabaseEntry>,
        outcome: &mut MergeOutcome,
    ) -> anyhow::Result<()> {
        let conflict = || ConflictedPath {
            base: base.cloned(),
            ours: ours.cloned(),
            theirs: theirs.cloned(),
        };

        let resolved = if ours == theirs || base == theirs {
            Some(ours)
        } else if base == ours {
            Some(theirs)
        } else {
            None
        };
        if let Some(resolved) = resolved {
            if let Some(entry) = resolved {
                outcome.entries.insert(path, entry.clone());
            }
            return Ok(());
        }

        match (ours, theirs) {
            (Some(ours_entry), Some(theirs_entry))
                if is_regular_file(ours_entry) && is_regular_file(theirs_entry) =>
            {
                let base_entry = base.filter(|entry| is_regular_file(entry));
                let (entry, clean) = self.merge_blobs(base_entry, ours_entry, theirs_entry)?;

                outcome.entries.insert(path.clone(), entry);
                if !clean {
                    outcome.conflicts.insert(path, conflict());
                }
            }
            (Some(survivor), None) | (None, Some(survivor)) | (Some(survivor), Some(_)) => {
                outcome.entries.insert(path.clone(), survivor.clone());
                outcome.conflicts.insert(path, conflict());
            }
            (None, None) => {}
        }

        Ok(())
    }

    /// Merged blob and mode for a file changed on both sides, plus whether it merged cleanly
    fn merge_blobs(
        &self,
        base: Option<&DatabaseEntry>,
        ours: &DatabaseEntry,
        theirs: &DatabaseEntry,
    ) -> anyhow::Result<(DatabaseEntry, bool)> {
        let (mode, mode_clean) = merge_modes(base.map(|entry| entry.mode), ours.mode, theirs.mode);

        if ours.oid == theirs.oid {
            return Ok((DatabaseEntry::new(ours.oid.clone(), mode), mode_clean));
        }

        let base_content = match base {
            Some(entry) => self.database.load_blob(&entry.oid)?.into_content(),
            None => Bytes::new(),
        };
        let ours_content = self.database.load_blob(&ours.oid)?.into_content();
        let theirs_content = self.database.load_blob(&theirs.oid)?.into_content();

        if [&base_content, &ours_content, &theirs_content]
            .iter()
            .any(|content| is_binary(content))
        {
            return Ok((DatabaseEntry::new(ours.oid.clone(), ours.mode), false));
        }

        let merged = diff3::merge(
            &base_content,
            &ours_content,
            &theirs_content,
            self.ours_label,
            self.theirs_label,
        );
        let oid = self.database.put(ObjectType::Blob, &merged.content)?;

        Ok((DatabaseEntry::new(oid, mode), mode_clean && !merged.conflicted))
    }

    /// A file on one side where the other side has a directory
    ///
    /// The file keeps its place and is reported as conflicted; the entries
    /// below it are dropped from the working tree result.
    fn resolve_file_directory_clashes(outcome: &mut MergeOutcome) {
        let clashing = outcome
            .entries
            .keys()
            .filter(|path| {
                path.ancestors()
                    .skip(1)
                    .any(|ancestor| outcome.entries.contains_key(ancestor))
            })
            .cloned()
            .collect::<Vec<_>>();

        for path in clashing {
            outcome.entries.remove(&path);
            outcome.conflicts.remove(&path);

            let file = path
                .ancestors()
                .skip(1)
                .find_map(|ancestor| outcome.entries.get_key_value(ancestor))
                .map(|(file, entry)| (file.clone(), entry.clone()));

            if let Some((file, entry)) = file {
                outcome.conflicts.entry(file).or_insert_with(|| ConflictedPath {
                    ours: Some(entry),
                    ..Default::default()
                });
            }
        }
    }
}

fn is_regular_file(entry: &DatabaseEntry) -> bool {
    matches!(entry.mode, EntryMode::File(_))
}

fn is_binary(content: &[u8]) -> bool {
    content.iter().take(BINARY_SNIFF_LEN).any(|byte| *byte == 0)
}

fn merge_modes(base: Option<EntryMode>, ours: EntryMode, theirs: EntryMode) -> (EntryMode, bool) {
    if ours == theirs || base == Some(theirs) {
        (ours, true)
    } else if base == Some(ours) {
        (theirs, true)
    } else {
        (ours, false)
    }
}
