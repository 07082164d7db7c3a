//! Git index (staging area)
//!
//! The index is Git's staging area that tracks which files should be included in the next commit.
//! It maintains metadata about files including their mode, timestamps, and SHA-1 hashes.
//!
//! ## Index File Format
//!
//! The index file contains:
//! - Header: Signature, version, and entry count
//! - Entries: Sorted list of tracked files with metadata
//! - Checksum: SHA-1 hash of the entire index for integrity verification
//!
//! ## Data Structures
//!
//! - `entries`: Maps `(path, stage)` to index entries; a resolved path has a
//!   single stage 0 entry, an unresolved merge keeps stages 1 to 3
//! - `children`: Maps directory paths to their children for efficient tree operations

use crate::areas::database::Database;
use crate::areas::workspace::Workspace;
use crate::artifacts::core::errors::BitError;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::checksum::Checksum;
use crate::artifacts::index::index_entry::{
    ENTRY_BLOCK, ENTRY_MIN_SIZE, EntryMetadata, IndexEntry, Stage,
};
use crate::artifacts::index::index_header::IndexHeader;
use crate::artifacts::index::{HEADER_SIZE, SIGNATURE, VERSION};
use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tree::Tree;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::DerefMut;
use std::path::{Path, PathBuf};

/// Paths touched by `stage_all`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageDiff {
    pub added: Vec<PathBuf>,
    pub modified: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
}

impl StageDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

/// Git index (staging area)
///
/// Tracks files staged for the next commit along with their metadata.
/// The index is persisted to disk and uses checksums for integrity verification.
#[derive(Debug, Clone)]
pub struct Index {
    /// Path to the index file (typically `.git/index`)
    path: Box<Path>,
    /// Tracked files mapped by path and merge stage
    entries: BTreeMap<(Box<Path>, Stage), IndexEntry>,
    /// Directory hierarchy for efficient parent-child lookups
    children: BTreeMap<Box<Path>, BTreeSet<Box<Path>>>,
    /// Index file header metadata
    header: IndexHeader,
    /// Flag indicating if the index has been modified since loading
    changed: bool,
}

impl Index {
    pub fn new(path: Box<Path>) -> Self {
        Index {
            path,
            entries: BTreeMap::new(),
            children: BTreeMap::new(),
            header: IndexHeader::new(String::from(SIGNATURE), VERSION, 0),
            changed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolved (stage 0) entry for a path
    pub fn entry_by_path(&self, path: &Path) -> Option<&IndexEntry> {
        self.entries.get(&(path.into(), Stage::Resolved))
    }

    /// Entry at a specific merge stage
    pub fn entry_at_stage(&self, path: &Path, stage: Stage) -> Option<&IndexEntry> {
        self.entries.get(&(path.into(), stage))
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.children.clear();
        self.header = IndexHeader::empty();
        self.changed = false;
    }

    /// Load the index from disk
    ///
    /// Reads the index file, parses the header and entries, and verifies
    /// the checksum. A missing or empty file is an empty index.
    ///
    /// # Locking
    ///
    /// Acquires a shared lock on the index file during reading.
    pub fn rehydrate(&mut self) -> anyhow::Result<()> {
        self.clear();

        let mut index_file = match std::fs::OpenOptions::new().read(true).open(self.path()) {
            Ok(file) => file,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(error) => return Err(error.into()),
        };
        let mut lock = file_guard::lock(&mut index_file, file_guard::Lock::Shared, 0, 1)?;

        if lock.deref_mut().metadata()?.len() == 0 {
            return Ok(());
        }

        let mut reader = Checksum::new(lock);
        let entries_count = self.parse_header(&mut reader)?;
        self.parse_entries(entries_count, &mut reader)?;

        reader.verify()
    }

    /// Check if a path is tracked directly in the index
    ///
    /// Returns true if the path is either a file entry (at any stage) or has
    /// children (is a directory with tracked files).
    pub fn is_directly_tracked(&self, path: &Path) -> bool {
        self.children.contains_key(path) || self.stages_of(path).next().is_some()
    }

    fn stages_of<'s>(&'s self, path: &Path) -> impl Iterator<Item = &'s IndexEntry> + 's {
        let path: Box<Path> = path.into();
        self.entries
            .range((path.clone(), Stage::Resolved)..=(path, Stage::Theirs))
            .map(|(_, entry)| entry)
    }

    fn parse_header(&self, reader: &mut Checksum) -> anyhow::Result<u32> {
        let header_bytes = reader.read(HEADER_SIZE)?;
        let header_reader = std::io::Cursor::new(header_bytes);
        let header = IndexHeader::deserialize(header_reader)?;

        if header.marker != SIGNATURE {
            return Err(BitError::Corrupt("invalid index file signature".to_string()).into());
        }

        if header.version != VERSION {
            return Err(BitError::Corrupt(format!(
                "unsupported index file version: {}",
                header.version
            ))
            .into());
        }

        Ok(header.entries_count)
    }

    /// Parse all entries from the index file
    ///
    /// Reads each entry, handling variable-length paths with 8-byte alignment.
    fn parse_entries(&mut self, entries_count: u32, reader: &mut Checksum) -> anyhow::Result<()> {
        for _ in 0..entries_count {
            let mut entry_bytes = reader.read(ENTRY_MIN_SIZE)?.to_vec();

            while entry_bytes.last() != Some(&0) {
                entry_bytes.extend_from_slice(&reader.read(ENTRY_BLOCK)?);
            }

            let entry_reader = std::io::Cursor::new(Bytes::from(entry_bytes));
            let entry = IndexEntry::deserialize(entry_reader)?;

            self.store_entry(&entry)?;
        }

        self.header.entries_count = entries_count;

        Ok(())
    }

    /// Remove any conflicting entries before adding a new entry
    ///
    /// Removes parent directories that might be file entries, and
    /// removes any children entries if this entry is becoming a file.
    fn discard_conflicts(&mut self, entry: &IndexEntry) -> anyhow::Result<()> {
        for parent in entry.parent_dirs()? {
            self.remove_entry(parent)?;
        }
        self.remove_children(&entry.name)
    }

    fn store_entry(&mut self, entry: &IndexEntry) -> anyhow::Result<()> {
        let entry_parents = entry
            .parent_dirs()?
            .into_iter()
            .map(|parent| parent.to_owned().into_boxed_path())
            .collect::<BTreeSet<_>>();

        self.entries.insert(
            (entry.name.clone().into_boxed_path(), entry.stage()),
            entry.clone(),
        );

        for parent in entry_parents {
            self.children
                .entry(parent)
                .or_default()
                .insert(entry.name.clone().into_boxed_path());
        }

        Ok(())
    }

    fn remove_children(&mut self, path_name: &Path) -> anyhow::Result<()> {
        if let Some(children) = self.children.remove(path_name) {
            for child in children {
                self.remove_entry(&child)?;
            }
        }

        Ok(())
    }

    /// Drop every stage of a path
    fn remove_entry(&mut self, path_name: &Path) -> anyhow::Result<()> {
        let stages = self
            .stages_of(path_name)
            .map(IndexEntry::stage)
            .collect::<Vec<_>>();
        if stages.is_empty() {
            return Ok(());
        }

        for stage in stages {
            self.entries.remove(&(path_name.into(), stage));
        }

        let parents = Path::new(path_name)
            .ancestors()
            .skip(1)
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(|parent| parent.to_owned().into_boxed_path())
            .collect::<Vec<_>>();

        for parent in parents {
            if let Some(children) = self.children.get_mut(&parent) {
                children.remove(path_name);
                if children.is_empty() {
                    self.children.remove(&parent);
                }
            }
        }

        Ok(())
    }

    /// Stage a resolved entry, dropping any conflict stages of the same path
    pub fn add(&mut self, entry: IndexEntry) -> anyhow::Result<()> {
        self.discard_conflicts(&entry)?;
        self.remove_entry(&entry.name.clone())?;
        self.store_entry(&entry)?;

        self.changed = true;

        Ok(())
    }

    /// Record an unresolved path with its base, ours and theirs versions
    pub fn add_conflict(
        &mut self,
        path: &Path,
        base: Option<&DatabaseEntry>,
        ours: Option<&DatabaseEntry>,
        theirs: Option<&DatabaseEntry>,
    ) -> anyhow::Result<()> {
        self.remove_entry(path)?;

        for (stage, entry) in [(Stage::Base, base), (Stage::Ours, ours), (Stage::Theirs, theirs)] {
            if let Some(entry) = entry {
                let entry = IndexEntry::from_database_entry(path.to_path_buf(), entry, stage);
                self.discard_conflicts(&entry)?;
                self.store_entry(&entry)?;
            }
        }

        self.changed = true;

        Ok(())
    }

    pub fn has_conflicts(&self) -> bool {
        self.entries.values().any(|entry| entry.stage() != Stage::Resolved)
    }

    pub fn conflicted_paths(&self) -> Vec<PathBuf> {
        self.entries
            .values()
            .filter(|entry| entry.stage() != Stage::Resolved)
            .map(|entry| entry.name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn remove(&mut self, path: &Path) -> anyhow::Result<()> {
        self.remove_entry(path)?;
        self.remove_children(path)?;

        self.changed = true;

        Ok(())
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn write_updates(&mut self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut index_file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.path())?;
        let lock = file_guard::lock(&mut index_file, file_guard::Lock::Exclusive, 0, 1)?;

        let mut writer = Checksum::new(lock);

        self.header = IndexHeader {
            entries_count: self.entries.len() as u32,
            ..self.header.clone()
        };
        let header_bytes = self.header.serialize()?;
        writer.write(&header_bytes)?;

        for entry in self.entries() {
            let entry_bytes = entry.serialize()?;
            writer.write(&entry_bytes)?;
        }

        writer.write_checksum()?;
        self.changed = false;
        tracing::debug!(target: "bit::index", entries = self.entries.len(), "index written");

        Ok(())
    }

    pub fn update_entry_stat(&mut self, path: &Path, stat: EntryMetadata) {
        if let Some(existing_entry) = self.entries.get_mut(&(path.into(), Stage::Resolved)) {
            let flags = existing_entry.metadata.flags;
            existing_entry.metadata = EntryMetadata { flags, ..stat };
            self.changed = true;
        }
    }

    /// Every entry, conflict stages included, ordered by path then stage
    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    pub fn resolved_entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries
            .values()
            .filter(|entry| entry.stage() == Stage::Resolved)
    }

    /// Build and store the tree objects for the staged content, returning the root
    ///
    /// Refuses while unresolved merge stages remain.
    pub fn write_tree(&self, database: &Database) -> anyhow::Result<ObjectId> {
        if self.has_conflicts() {
            return Err(BitError::MergeConflict {
                paths: self.conflicted_paths(),
            }
            .into());
        }

        let tree = Tree::build(self.resolved_entries())?;
        tree.traverse(&mut |tree| database.store(tree).map(|_| ()))?;

        tree.object_id()
    }

    /// Replace the whole index with the flattened content of a tree
    ///
    /// Stat data is left empty, so the next `stage_all` rehashes each file once.
    pub fn read_tree(&mut self, database: &Database, tree_oid: Option<&ObjectId>) -> anyhow::Result<()> {
        let entries = database.flatten_tree(tree_oid)?;

        self.clear();
        for (path, entry) in entries {
            self.store_entry(&IndexEntry::from_database_entry(path, &entry, Stage::Resolved))?;
        }
        self.changed = true;

        Ok(())
    }

    /// Stage every change in the working tree, as `add --all` does
    ///
    /// Files whose stat data still matches their entry are not rehashed. Tracked
    /// files matched by ignore rules stay tracked.
    pub fn stage_all(
        &mut self,
        workspace: &Workspace,
        database: &Database,
    ) -> anyhow::Result<StageDiff> {
        let mut diff = StageDiff::default();

        let mut paths = workspace.list_files()?.into_iter().collect::<BTreeSet<_>>();
        paths.extend(
            self.entries
                .keys()
                .map(|(path, _)| path.to_path_buf())
                .filter(|path| workspace.exists(path) && !workspace.path().join(path).is_dir()),
        );

        for path in &paths {
            let stat = workspace.stat_file(path)?;
            let existing = self.entry_by_path(path).cloned();
            let conflicted = self.stages_of(path).any(|entry| entry.stage() != Stage::Resolved);

            if let Some(existing) = &existing
                && existing.stat_match(&stat)
                && existing.times_match(&stat)
            {
                continue;
            }

            let data = workspace.read_file(path)?;
            let oid = database.put(ObjectType::Blob, &data)?;

            match existing {
                Some(existing) if existing.oid == oid && existing.metadata.mode == stat.mode => {
                    self.update_entry_stat(path, stat);
                }
                Some(_) => {
                    self.add(IndexEntry::from_stat(path.clone(), oid, stat))?;
                    diff.modified.push(path.clone());
                }
                None => {
                    self.add(IndexEntry::from_stat(path.clone(), oid, stat))?;
                    if conflicted {
                        diff.modified.push(path.clone());
                    } else {
                        diff.added.push(path.clone());
                    }
                }
            }
        }

        let deleted = self
            .entries
            .keys()
            .map(|(path, _)| path.to_path_buf())
            .filter(|path| !paths.contains(path))
            .collect::<BTreeSet<_>>();
        for path in deleted {
            self.remove(&path)?;
            diff.deleted.push(path);
        }

        Ok(diff)
    }
}
