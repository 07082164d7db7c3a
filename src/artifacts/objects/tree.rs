//! Git tree object
//!
//! Trees represent directory snapshots. They contain entries for files (blobs),
//! symlinks, submodules and subdirectories (other trees), along with their names
//! and modes.
//!
//! ## Format
//!
//! On disk: `tree <size>\0<entries>`
//! Each entry: `<mode> <name>\0<20-byte-sha1>`
//!
//! Entries are ordered the way Git orders them: byte-wise by name, with
//! directory names compared as if they ended in `/`.

use crate::artifacts::core::errors::BitError;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_entry::IndexEntry;
use crate::artifacts::objects::object::{Object, Packable, Unpackable, with_header};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use anyhow::Context;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::Path;

#[derive(Debug, Clone)]
enum TreeEntry {
    /// Blob, symlink or submodule
    File(DatabaseEntry),
    /// Nested tree still being built
    Directory(Tree),
}

impl TreeEntry {
    fn object_type(&self) -> ObjectType {
        match self {
            TreeEntry::File(entry) if entry.mode == EntryMode::Gitlink => ObjectType::Commit,
            TreeEntry::File(_) => ObjectType::Blob,
            TreeEntry::Directory(_) => ObjectType::Tree,
        }
    }

    fn mode(&self) -> EntryMode {
        match self {
            TreeEntry::File(entry) => entry.mode,
            TreeEntry::Directory(_) => EntryMode::Directory,
        }
    }

    fn oid(&self) -> anyhow::Result<ObjectId> {
        match self {
            TreeEntry::File(entry) => Ok(entry.oid.clone()),
            TreeEntry::Directory(tree) => tree.object_id(),
        }
    }
}

/// Git tree object representing a directory snapshot
///
/// Trees maintain two sets of entries:
/// - `readable_entries`: for trees loaded from the database
/// - `writeable_entries`: for trees being built from the index; directory keys
///   carry a trailing `/` so the map iterates in Git's canonical order
#[derive(Debug, Clone, Default)]
pub struct Tree {
    readable_entries: BTreeMap<String, DatabaseEntry>,
    writeable_entries: BTreeMap<String, TreeEntry>,
}

impl Tree {
    /// Build a tree from index entries
    ///
    /// Creates a hierarchical tree structure from a flat list of stage 0 index
    /// entries. Files are organized into directories matching their path structure.
    ///
    /// # Returns
    ///
    /// The root tree object containing all entries
    pub fn build<'e>(entries: impl Iterator<Item = &'e IndexEntry>) -> anyhow::Result<Self> {
        let mut root = Self::default();

        for entry in entries {
            let parents = entry.parent_dirs()?;
            root.add_entry(&parents, entry)?;
        }

        Ok(root)
    }

    /// Traverse the tree depth-first, children before parents
    ///
    /// Post-order is required when storing trees since child OIDs must be
    /// stored before the parent that names them.
    pub fn traverse<F>(&self, func: &mut F) -> anyhow::Result<()>
    where
        F: FnMut(&Tree) -> anyhow::Result<()>,
    {
        for entry in self.writeable_entries.values() {
            if let TreeEntry::Directory(tree) = entry {
                tree.traverse(func)?;
            }
        }
        func(self)
    }

    fn add_entry(&mut self, parents: &[&Path], entry: &IndexEntry) -> anyhow::Result<()> {
        match parents.split_first() {
            None => {
                self.writeable_entries.insert(
                    entry.basename()?.to_string(),
                    TreeEntry::File(entry.as_database_entry()),
                );
            }
            Some((parent, rest)) => {
                let parent = parent
                    .file_name()
                    .and_then(|s| s.to_str())
                    .context("Invalid parent")?;
                let key = format!("{parent}/");

                let entry_slot = self
                    .writeable_entries
                    .entry(key)
                    .or_insert_with(|| TreeEntry::Directory(Tree::default()));
                if let TreeEntry::File(_) = entry_slot {
                    *entry_slot = TreeEntry::Directory(Tree::default());
                }
                if let TreeEntry::Directory(tree) = entry_slot {
                    tree.add_entry(rest, entry)?;
                }
            }
        }

        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.readable_entries.is_empty() && self.writeable_entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &DatabaseEntry)> {
        self.readable_entries.iter()
    }

    pub fn into_entries(self) -> impl Iterator<Item = (String, DatabaseEntry)> {
        self.readable_entries.into_iter()
    }
}

impl Packable for Tree {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut content_bytes = Vec::new();

        for (name, tree_entry) in &self.writeable_entries {
            let name = name.trim_end_matches('/');

            let header = format!("{:o} {}", tree_entry.mode().as_u32(), name);
            content_bytes.write_all(header.as_bytes())?;
            content_bytes.push(0);
            tree_entry.oid()?.write_h40_to(&mut content_bytes)?;
        }

        Ok(with_header(self.object_type(), &content_bytes))
    }
}

impl Unpackable for Tree {
    fn deserialize(reader: impl BufRead) -> anyhow::Result<Self> {
        let mut entries = BTreeMap::new();
        let mut reader = reader;

        let mut mode_bytes = Vec::new();
        let mut name_bytes = Vec::new();

        loop {
            mode_bytes.clear();
            let n = reader.read_until(b' ', &mut mode_bytes)?;
            if n == 0 {
                break;
            }
            if mode_bytes.pop() != Some(b' ') {
                return Err(BitError::Corrupt("unexpected EOF in tree entry mode".into()).into());
            }

            let mode_str = std::str::from_utf8(&mode_bytes)
                .map_err(|_| BitError::Corrupt("tree entry mode is not UTF-8".into()))?;
            let mode = EntryMode::from_octal_str(mode_str)?;

            name_bytes.clear();
            reader.read_until(b'\0', &mut name_bytes)?;
            if name_bytes.pop() != Some(b'\0') {
                return Err(BitError::Corrupt("unexpected EOF in tree entry name".into()).into());
            }
            let name = std::str::from_utf8(&name_bytes)
                .map_err(|_| BitError::Corrupt("tree entry name is not UTF-8".into()))?
                .to_owned();

            let oid = ObjectId::read_h40_from(&mut reader)
                .map_err(|_| BitError::Corrupt("unexpected EOF in tree entry id".into()))?;

            entries.insert(name, DatabaseEntry::new(oid, mode));
        }

        Ok(Tree {
            readable_entries: entries,
            writeable_entries: Default::default(),
        })
    }
}

impl Object for Tree {
    fn object_type(&self) -> ObjectType {
        ObjectType::Tree
    }

    fn display(&self) -> String {
        let built = self.writeable_entries.iter().map(|(name, tree_entry)| {
            (
                name.trim_end_matches('/').to_string(),
                tree_entry.mode(),
                tree_entry.object_type(),
                tree_entry.oid().unwrap_or_default(),
            )
        });
        let read = self.readable_entries.iter().map(|(name, entry)| {
            let object_type = match entry.mode {
                EntryMode::Directory => ObjectType::Tree,
                EntryMode::Gitlink => ObjectType::Commit,
                _ => ObjectType::Blob,
            };
            (name.clone(), entry.mode, object_type, entry.oid.clone())
        });

        built
            .chain(read)
            .map(|(name, mode, object_type, oid)| {
                format!("{} {} {}\t{}", mode.as_str(), object_type, oid, name)
            })
            .collect::<Vec<String>>()
            .join("\n")
    }
}
