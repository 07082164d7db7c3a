//! Content-addressed object store
//!
//! Objects live as zlib-compressed loose files at `objects/xx/yyyy...`. Writes go
//! through a temporary file and a rename, so readers never observe a partially
//! written object, and storing an object twice is a no-op.

use crate::artifacts::core::errors::BitError;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::diff::tree_diff::TreeDiff;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::{Commit, SlimCommit};
use crate::artifacts::objects::object::{Object, ObjectBox, Unpackable, with_header};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tag::Tag;
use crate::artifacts::objects::tree::Tree;
use anyhow::Context;
use bytes::Bytes;
use fake::rand;
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

/// Annotated tags pointing at tags deeper than this are treated as corrupt
const MAX_PEEL_DEPTH: usize = 16;

#[derive(Debug, Clone)]
pub struct Database {
    path: Box<Path>,
}

impl Database {
    pub fn new(path: Box<Path>) -> Self {
        Database { path }
    }

    pub fn objects_path(&self) -> &Path {
        &self.path
    }

    /// Store a payload of the given kind, returning its id
    ///
    /// The id is the SHA-1 of `<kind> <len>\0<payload>`; an object that already
    /// exists is left untouched.
    pub fn put(&self, object_type: ObjectType, payload: &[u8]) -> anyhow::Result<ObjectId> {
        let object_content = with_header(object_type, payload);
        let object_id = ObjectId::hash_of(&object_content);

        self.write_if_absent(&object_id, object_content)?;

        Ok(object_id)
    }

    /// Store a typed object, returning its id
    pub fn store(&self, object: &impl Object) -> anyhow::Result<ObjectId> {
        let object_content = object.serialize()?;
        let object_id = ObjectId::hash_of(&object_content);

        self.write_if_absent(&object_id, object_content)?;

        Ok(object_id)
    }

    pub fn has(&self, object_id: &ObjectId) -> bool {
        self.path.join(object_id.to_path()).is_file()
    }

    /// Kind and payload of a stored object
    ///
    /// The inflated bytes are rehashed; a mismatch with the requested id is
    /// reported as `Corrupt`.
    pub fn get(&self, object_id: &ObjectId) -> anyhow::Result<(ObjectType, Bytes)> {
        let object_content = self.load(object_id)?;
        let mut object_reader = Cursor::new(object_content.clone());

        let (object_type, size) = ObjectType::parse_header(&mut object_reader)?;
        let offset = object_reader.position() as usize;
        let payload = object_content.slice(offset..);

        if payload.len() != size {
            return Err(BitError::Corrupt(format!(
                "object {object_id} declares {size} bytes but holds {}",
                payload.len()
            ))
            .into());
        }

        Ok((object_type, payload))
    }

    /// Raw inflated object, header included, after an integrity check
    pub fn load(&self, object_id: &ObjectId) -> anyhow::Result<Bytes> {
        let object_path = self.path.join(object_id.to_path());

        let object_content = match std::fs::read(&object_path) {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(BitError::ObjectMissing(object_id.clone()).into());
            }
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("Unable to read object file {}", object_path.display()));
            }
        };

        let object_content = Self::decompress(object_content.into())
            .map_err(|_| BitError::Corrupt(format!("object {object_id} is not valid zlib data")))?;

        if &ObjectId::hash_of(&object_content) != object_id {
            return Err(
                BitError::Corrupt(format!("object {object_id} does not match its hash")).into(),
            );
        }

        Ok(object_content)
    }

    pub fn parse_object(&self, object_id: &ObjectId) -> anyhow::Result<ObjectBox> {
        let (object_type, payload) = self.get(object_id)?;
        let object_reader = Cursor::new(payload);

        match object_type {
            ObjectType::Blob => Ok(ObjectBox::Blob(Box::new(Blob::deserialize(object_reader)?))),
            ObjectType::Tree => Ok(ObjectBox::Tree(Box::new(Tree::deserialize(object_reader)?))),
            ObjectType::Commit => Ok(ObjectBox::Commit(Box::new(Commit::deserialize(
                object_reader,
            )?))),
            ObjectType::Tag => Ok(ObjectBox::Tag(Box::new(Tag::deserialize(object_reader)?))),
        }
    }

    pub fn parse_object_as_blob(&self, object_id: &ObjectId) -> anyhow::Result<Option<Blob>> {
        match self.parse_object(object_id)? {
            ObjectBox::Blob(blob) => Ok(Some(*blob)),
            _ => Ok(None),
        }
    }

    pub fn parse_object_as_tree(&self, object_id: &ObjectId) -> anyhow::Result<Option<Tree>> {
        match self.parse_object(object_id)? {
            ObjectBox::Tree(tree) => Ok(Some(*tree)),
            _ => Ok(None),
        }
    }

    pub fn parse_object_as_commit(&self, object_id: &ObjectId) -> anyhow::Result<Option<Commit>> {
        match self.parse_object(object_id)? {
            ObjectBox::Commit(commit) => Ok(Some(*commit)),
            _ => Ok(None),
        }
    }

    pub fn parse_object_as_tag(&self, object_id: &ObjectId) -> anyhow::Result<Option<Tag>> {
        match self.parse_object(object_id)? {
            ObjectBox::Tag(tag) => Ok(Some(*tag)),
            _ => Ok(None),
        }
    }

    pub fn load_blob(&self, object_id: &ObjectId) -> anyhow::Result<Blob> {
        self.parse_object_as_blob(object_id)?
            .ok_or_else(|| Self::wrong_kind(object_id, ObjectType::Blob))
    }

    pub fn load_tree(&self, object_id: &ObjectId) -> anyhow::Result<Tree> {
        self.parse_object_as_tree(object_id)?
            .ok_or_else(|| Self::wrong_kind(object_id, ObjectType::Tree))
    }

    pub fn load_commit(&self, object_id: &ObjectId) -> anyhow::Result<Commit> {
        self.parse_object_as_commit(object_id)?
            .ok_or_else(|| Self::wrong_kind(object_id, ObjectType::Commit))
    }

    fn wrong_kind(object_id: &ObjectId, expected: ObjectType) -> anyhow::Error {
        BitError::Corrupt(format!("object {object_id} is not a {expected}")).into()
    }

    /// Just enough of a commit for history walks
    pub fn slim_commit(&self, object_id: &ObjectId) -> anyhow::Result<SlimCommit> {
        let commit = self.load_commit(object_id)?;

        Ok(SlimCommit {
            oid: object_id.clone(),
            parents: commit.parents().to_vec(),
            timestamp: commit.timestamp(),
        })
    }

    /// Follow annotated tags until reaching a commit
    pub fn peel_to_commit(&self, object_id: &ObjectId) -> anyhow::Result<ObjectId> {
        let mut current = object_id.clone();

        for _ in 0..MAX_PEEL_DEPTH {
            match self.get_object_type(&current)? {
                ObjectType::Commit => return Ok(current),
                ObjectType::Tag => {
                    let tag = self
                        .parse_object_as_tag(&current)?
                        .ok_or_else(|| Self::wrong_kind(&current, ObjectType::Tag))?;
                    current = tag.target().clone();
                }
                object_type => {
                    return Err(BitError::NotFound(format!(
                        "object {} is a {object_type}, not a commit",
                        object_id.to_short_oid()
                    ))
                    .into());
                }
            }
        }

        Err(BitError::Corrupt(format!("tag chain from {object_id} is too long")).into())
    }

    /// Tree id of a commit, or the id itself when it already names a tree
    pub fn tree_oid_of(&self, object_id: &ObjectId) -> anyhow::Result<ObjectId> {
        match self.parse_object(object_id)? {
            ObjectBox::Tree(_) => Ok(object_id.clone()),
            ObjectBox::Commit(commit) => Ok(commit.tree_oid().clone()),
            ObjectBox::Tag(tag) => self.tree_oid_of(tag.target()),
            ObjectBox::Blob(_) => Err(Self::wrong_kind(object_id, ObjectType::Tree)),
        }
    }

    /// Every non-tree entry reachable from a tree (or commit), keyed by path
    pub fn flatten_tree(
        &self,
        object_id: Option<&ObjectId>,
    ) -> anyhow::Result<BTreeMap<PathBuf, DatabaseEntry>> {
        let mut entries = BTreeMap::new();

        if let Some(object_id) = object_id {
            let tree_oid = self.tree_oid_of(object_id)?;
            self.flatten_tree_into(&tree_oid, Path::new(""), &mut entries)?;
        }

        Ok(entries)
    }

    fn flatten_tree_into(
        &self,
        tree_oid: &ObjectId,
        prefix: &Path,
        entries: &mut BTreeMap<PathBuf, DatabaseEntry>,
    ) -> anyhow::Result<()> {
        for (name, entry) in self.load_tree(tree_oid)?.into_entries() {
            let path = prefix.join(name);

            if entry.is_tree() {
                self.flatten_tree_into(&entry.oid, &path, entries)?;
            } else {
                entries.insert(path, entry);
            }
        }

        Ok(())
    }

    pub fn tree_diff(
        &self,
        old_oid: Option<&ObjectId>,
        new_oid: Option<&ObjectId>,
    ) -> anyhow::Result<TreeDiff<'_>> {
        let mut tree_diff = TreeDiff::new(self);
        tree_diff.compare_oids(old_oid, new_oid, Path::new(""))?;
        Ok(tree_diff)
    }

    fn write_if_absent(&self, object_id: &ObjectId, object_content: Bytes) -> anyhow::Result<()> {
        let object_path = self.path.join(object_id.to_path());

        // write the object to disk unless it already exists
        if object_path.exists() {
            return Ok(());
        }

        std::fs::create_dir_all(
            object_path
                .parent()
                .context(format!("Invalid object path {}", object_path.display()))?,
        )
        .context(format!(
            "Unable to create object directory {}",
            object_path.display()
        ))?;

        self.write_object(object_path, object_content)?;
        tracing::debug!(target: "bit::database", oid = %object_id, "object stored");

        Ok(())
    }

    fn write_object(&self, object_path: PathBuf, object_content: Bytes) -> anyhow::Result<()> {
        let object_dir = object_path
            .parent()
            .context(format!("Invalid object path {}", object_path.display()))?;
        let temp_object_path = object_dir.join(Self::generate_temp_name());

        let object_content = Self::compress(object_content)?;

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_object_path)
            .context(format!(
                "Unable to open object file {}",
                temp_object_path.display()
            ))?;

        file.write_all(&object_content).context(format!(
            "Unable to write object file {}",
            temp_object_path.display()
        ))?;
        drop(file);

        // rename the temp file to the object file to make it atomic
        std::fs::rename(&temp_object_path, &object_path).context(format!(
            "Unable to rename object file to {}",
            object_path.display()
        ))?;

        Ok(())
    }

    fn compress(data: Bytes) -> anyhow::Result<Bytes> {
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder
            .write_all(&data)
            .context("Unable to compress object content")?;

        encoder
            .finish()
            .map(|compressed_content| compressed_content.into())
            .context("Unable to finish compressing object content")
    }

    fn decompress(data: Bytes) -> anyhow::Result<Bytes> {
        let mut decoder = flate2::read::ZlibDecoder::new(&*data);
        let mut decompressed_content = Vec::new();
        decoder
            .read_to_end(&mut decompressed_content)
            .context("Unable to decompress object content")?;

        Ok(decompressed_content.into())
    }

    fn generate_temp_name() -> String {
        format!("tmp-obj-{}", rand::random::<u32>())
    }

    /// Find all objects whose OID starts with the given prefix.
    ///
    /// Used to resolve abbreviated OIDs to their full form. Several matches mean
    /// the prefix is ambiguous; callers decide how to report it.
    ///
    /// For prefixes of 2+ characters only the matching fan-out directory is read.
    pub fn find_objects_by_prefix(&self, prefix: &str) -> anyhow::Result<Vec<ObjectId>> {
        let prefix = prefix.to_ascii_lowercase();
        let mut matches = Vec::new();

        let dir_names = if prefix.len() >= 2 {
            vec![prefix[..2].to_string()]
        } else {
            (0..=255).map(|i| format!("{i:02x}")).collect()
        };

        for dir_name in dir_names {
            let dir_path = self.path.join(&dir_name);
            if !dir_path.is_dir() {
                continue;
            }

            for entry in std::fs::read_dir(&dir_path)? {
                let file_name = entry?.file_name();
                let full_oid = format!("{dir_name}{}", file_name.to_string_lossy());

                if full_oid.starts_with(&prefix)
                    && let Ok(oid) = ObjectId::try_parse(full_oid)
                {
                    matches.push(oid);
                }
            }
        }
        matches.sort();

        Ok(matches)
    }

    pub fn get_object_type(&self, object_id: &ObjectId) -> anyhow::Result<ObjectType> {
        let (object_type, _) = self.get(object_id)?;
        Ok(object_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::commit::Author;
    use assert_fs::TempDir;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn database() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let database = Database::new(dir.path().join("objects").into_boxed_path());
        (dir, database)
    }

    #[rstest]
    fn put_is_idempotent(database: (TempDir, Database)) {
        let (_dir, database) = database;

        let first = database.put(ObjectType::Blob, b"hello\n").unwrap();
        let second = database.put(ObjectType::Blob, b"hello\n").unwrap();

        assert_eq!(first, second);
        assert_eq!(first.as_ref(), "ce013625030ba8dba906f756967f9e9ca394464a");
        assert_eq!(database.find_objects_by_prefix("ce01").unwrap(), vec![first]);
    }

    #[rstest]
    fn get_returns_kind_and_payload(database: (TempDir, Database)) {
        let (_dir, database) = database;
        let oid = database.put(ObjectType::Blob, &[0, 159, 146, 150]).unwrap();

        let (object_type, payload) = database.get(&oid).unwrap();
        assert_eq!(object_type, ObjectType::Blob);
        assert_eq!(payload.as_ref(), &[0, 159, 146, 150]);
    }

    #[rstest]
    fn absent_objects_are_reported_missing(database: (TempDir, Database)) {
        let (_dir, database) = database;
        let oid = ObjectId::hash_of(b"nothing");

        assert!(!database.has(&oid));
        let error = database.get(&oid).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<BitError>(),
            Some(BitError::ObjectMissing(missing)) if missing == &oid
        ));
    }

    #[rstest]
    fn tampered_objects_are_corrupt(database: (TempDir, Database)) {
        let (_dir, database) = database;
        let oid = database.put(ObjectType::Blob, b"original").unwrap();
        let other = Database::compress(with_header(ObjectType::Blob, b"tampered")).unwrap();
        std::fs::write(database.objects_path().join(oid.to_path()), other).unwrap();

        let error = database.get(&oid).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<BitError>(),
            Some(BitError::Corrupt(_))
        ));
    }

    #[rstest]
    fn tags_peel_to_their_commit(database: (TempDir, Database)) {
        let (_dir, database) = database;
        let tree_oid = database.store(&Tree::default()).unwrap();
        let author = Author::new("A U Thor".into(), "author@example.com".into());
        let commit_oid = database
            .store(&Commit::new(vec![], tree_oid.clone(), author.clone(), "init".into()))
            .unwrap();
        let tag_oid = database
            .store(&Tag::new(
                commit_oid.clone(),
                ObjectType::Commit,
                "v1".into(),
                author,
                "release\n".into(),
            ))
            .unwrap();

        assert_eq!(database.peel_to_commit(&tag_oid).unwrap(), commit_oid);
        assert_eq!(database.tree_oid_of(&tag_oid).unwrap(), tree_oid);
        assert!(database.peel_to_commit(&tree_oid).is_err());
    }
}
