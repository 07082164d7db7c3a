use crate::areas::database::Database;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::objects::object_id::ObjectId;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub enum TreeChangeType {
    Added(DatabaseEntry),
    Deleted(DatabaseEntry),
    Modified {
        old: DatabaseEntry,
        new: DatabaseEntry,
    },
}

impl TreeChangeType {
    pub fn from_entries(old: Option<DatabaseEntry>, new: Option<DatabaseEntry>) -> Option<Self> {
        match (old, new) {
            (None, Some(new)) => Some(TreeChangeType::Added(new)),
            (Some(old), None) => Some(TreeChangeType::Deleted(old)),
            (Some(old), Some(new)) if old != new => Some(TreeChangeType::Modified { old, new }),
            _ => None,
        }
    }

    pub fn old_entry(&self) -> Option<&DatabaseEntry> {
        match self {
            TreeChangeType::Deleted(entry) => Some(entry),
            TreeChangeType::Modified { old, .. } => Some(old),
            TreeChangeType::Added(_) => None,
        }
    }

    pub fn new_entry(&self) -> Option<&DatabaseEntry> {
        match self {
            TreeChangeType::Added(entry) => Some(entry),
            TreeChangeType::Modified { new, .. } => Some(new),
            TreeChangeType::Deleted(_) => None,
        }
    }
}

pub type ChangeSet = BTreeMap<PathBuf, TreeChangeType>;
pub type TreeEntryMap = BTreeMap<String, DatabaseEntry>;

/// Paths whose blob entry differs between two trees
///
/// Subtrees with the same id are skipped without being loaded.
#[derive(Debug)]
pub struct TreeDiff<'r> {
    database: &'r Database,
    change_set: ChangeSet,
}

impl<'r> TreeDiff<'r> {
    pub fn new(database: &'r Database) -> Self {
        TreeDiff {
            database,
            change_set: BTreeMap::new(),
        }
    }

    pub fn changes(&self) -> &ChangeSet {
        &self.change_set
    }

    pub fn into_changes(self) -> ChangeSet {
        self.change_set
    }

    pub fn compare_oids(
        &mut self,
        old: Option<&ObjectId>,
        new: Option<&ObjectId>,
        prefix: &Path,
    ) -> anyhow::Result<()> {
        if old == new {
            return Ok(());
        }

        let old_tree_entries = self.inflate_oid_to_tree_entries(old)?;
        let new_tree_entries = self.inflate_oid_to_tree_entries(new)?;

        self.detect_deletions(&old_tree_entries, &new_tree_entries, prefix)?;
        self.detect_additions(&old_tree_entries, &new_tree_entries, prefix)?;

        Ok(())
    }

    fn inflate_oid_to_tree_entries(&self, oid: Option<&ObjectId>) -> anyhow::Result<TreeEntryMap> {
        match oid {
            None => Ok(BTreeMap::new()),
            Some(oid) => {
                let tree_oid = self.database.tree_oid_of(oid)?;
                Ok(self.database.load_tree(&tree_oid)?.into_entries().collect())
            }
        }
    }

    fn detect_deletions(
        &mut self,
        old: &TreeEntryMap,
        new: &TreeEntryMap,
        prefix: &Path,
    ) -> anyhow::Result<()> {
        for (name, entry) in old {
            let path = prefix.join(name);
            let other = new.get(name);

            if other == Some(entry) {
                continue;
            }

            let tree_a_oid = entry.is_tree().then_some(&entry.oid);
            let tree_b_oid = other.filter(|other| other.is_tree()).map(|other| &other.oid);

            self.compare_oids(tree_a_oid, tree_b_oid, &path)?;

            let blob_a = (!entry.is_tree()).then(|| entry.clone());
            let blob_b = other.filter(|other| !other.is_tree()).cloned();

            if let Some(change_type) = TreeChangeType::from_entries(blob_a, blob_b) {
                self.change_set.insert(path, change_type);
            }
        }

        Ok(())
    }

    fn detect_additions(
        &mut self,
        old: &TreeEntryMap,
        new: &TreeEntryMap,
        prefix: &Path,
    ) -> anyhow::Result<()> {
        for (name, entry) in new {
            if old.contains_key(name) {
                continue;
            }

            let path = prefix.join(name);
            if entry.is_tree() {
                self.compare_oids(None, Some(&entry.oid), &path)?;
            } else {
                self.change_set
                    .insert(path, TreeChangeType::Added(entry.clone()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
    use crate::artifacts::index::index_entry::{IndexEntry, Stage};
    use crate::artifacts::objects::object::Object;
    use crate::artifacts::objects::object_type::ObjectType;
    use crate::artifacts::objects::tree::Tree;
    use assert_fs::TempDir;
    use pretty_assertions::assert_eq;

    fn write_tree(database: &Database, files: &[(&str, &str)]) -> ObjectId {
        let entries = files
            .iter()
            .map(|(path, content)| {
                let oid = database.put(ObjectType::Blob, content.as_bytes()).unwrap();
                IndexEntry::from_database_entry(
                    PathBuf::from(path),
                    &DatabaseEntry::new(oid, EntryMode::File(FileMode::Regular)),
                    Stage::Resolved,
                )
            })
            .collect::<Vec<_>>();

        let tree = Tree::build(entries.iter()).unwrap();
        tree.traverse(&mut |tree| database.store(tree).map(|_| ()))
            .unwrap();
        tree.object_id().unwrap()
    }

    #[test]
    fn reports_added_deleted_and_modified_paths() {
        let dir = TempDir::new().unwrap();
        let database = Database::new(dir.path().to_path_buf().into_boxed_path());

        let old = write_tree(&database, &[("a.txt", "a"), ("dir/b.txt", "b"), ("dir/c.txt", "c")]);
        let new = write_tree(&database, &[("a.txt", "A"), ("dir/b.txt", "b"), ("d.txt", "d")]);

        let changes = database.tree_diff(Some(&old), Some(&new)).unwrap().into_changes();
        let summary = changes
            .iter()
            .map(|(path, change)| {
                let kind = match change {
                    TreeChangeType::Added(_) => 'A',
                    TreeChangeType::Deleted(_) => 'D',
                    TreeChangeType::Modified { .. } => 'M',
                };
                (path.display().to_string(), kind)
            })
            .collect::<Vec<_>>();

        assert_eq!(
            summary,
            vec![
                ("a.txt".to_string(), 'M'),
                ("d.txt".to_string(), 'A'),
                ("dir/c.txt".to_string(), 'D'),
            ]
        );
    }

    #[test]
    fn file_replaced_by_directory_is_a_delete_plus_adds() {
        let dir = TempDir::new().unwrap();
        let database = Database::new(dir.path().to_path_buf().into_boxed_path());

        let old = write_tree(&database, &[("x", "file")]);
        let new = write_tree(&database, &[("x/y", "nested")]);

        let changes = database.tree_diff(Some(&old), Some(&new)).unwrap().into_changes();
        assert!(matches!(changes.get(Path::new("x")), Some(TreeChangeType::Deleted(_))));
        assert!(matches!(changes.get(Path::new("x/y")), Some(TreeChangeType::Added(_))));
    }
}
