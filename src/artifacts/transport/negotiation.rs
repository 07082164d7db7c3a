//! Which objects a transfer has to carry
//!
//! The sender walks the object graph from the wanted tips and stops at
//! everything the receiver already has, i.e. the full closure of the common
//! commits. The receiver runs the same walk without exclusions to check that a
//! new tip is connected before a ref is allowed to point at it.

use crate::areas::database::Database;
use crate::artifacts::core::errors::BitError;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::objects::object::ObjectBox;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::transport::pack::{PackBuilder, PackParser, object_id_of};
use bytes::Bytes;
use std::collections::HashSet;

pub struct ObjectWalker<'d> {
    database: &'d Database,
}

impl<'d> ObjectWalker<'d> {
    pub fn new(database: &'d Database) -> Self {
        Self { database }
    }

    /// Every object reachable from `tips` that is not in `exclude`, in no
    /// particular order
    ///
    /// Blobs are listed from their tree entries without being read; a blob
    /// that is absent from the store is reported as `ObjectMissing`.
    pub fn reachable<'t>(
        &self,
        tips: impl IntoIterator<Item = &'t ObjectId>,
        exclude: &HashSet<ObjectId>,
    ) -> anyhow::Result<Vec<ObjectId>> {
        let mut visited = HashSet::new();
        let mut stack = tips.into_iter().cloned().collect::<Vec<_>>();
        let mut found = Vec::new();

        while let Some(oid) = stack.pop() {
            if exclude.contains(&oid) || !visited.insert(oid.clone()) {
                continue;
            }

            match self.database.parse_object(&oid)? {
                ObjectBox::Commit(commit) => {
                    stack.push(commit.tree_oid().clone());
                    stack.extend(commit.parents().iter().cloned());
                }
                ObjectBox::Tree(tree) => {
                    for (_, entry) in tree.into_entries() {
                        match entry.mode {
                            EntryMode::Gitlink => {}
                            EntryMode::Directory => stack.push(entry.oid),
                            EntryMode::File(_) | EntryMode::Symlink => {
                                if exclude.contains(&entry.oid) || !visited.insert(entry.oid.clone())
                                {
                                    continue;
                                }
                                if !self.database.has(&entry.oid) {
                                    return Err(BitError::ObjectMissing(entry.oid).into());
                                }
                                found.push(entry.oid);
                            }
                        }
                    }
                }
                ObjectBox::Tag(tag) => stack.push(tag.target().clone()),
                ObjectBox::Blob(_) => {}
            }
            found.push(oid);
        }

        Ok(found)
    }

    /// Closure of the tips this side actually has; unknown ids are skipped
    pub fn closure<'t>(
        &self,
        tips: impl IntoIterator<Item = &'t ObjectId>,
    ) -> anyhow::Result<HashSet<ObjectId>> {
        let present = tips
            .into_iter()
            .filter(|oid| self.database.has(oid))
            .collect::<Vec<_>>();

        Ok(self.reachable(present, &HashSet::new())?.into_iter().collect())
    }

    /// Objects to send so that a peer holding `haves` ends up with `wants`
    pub fn missing_for_peer(
        &self,
        wants: &[ObjectId],
        haves: &[ObjectId],
    ) -> anyhow::Result<Vec<ObjectId>> {
        let exclude = self.closure(haves)?;
        self.reachable(wants, &exclude)
    }

    /// Fail with `ObjectMissing` unless the whole graph below `tips` is stored
    pub fn check_connectivity<'t>(
        &self,
        tips: impl IntoIterator<Item = &'t ObjectId>,
    ) -> anyhow::Result<()> {
        let objects = self.reachable(tips, &HashSet::new())?;
        tracing::trace!(target: "bit::transport", objects = objects.len(), "connectivity checked");
        Ok(())
    }
}

/// Pack the given objects as they are stored
pub fn pack_objects(database: &Database, objects: &[ObjectId]) -> anyhow::Result<Bytes> {
    let mut builder = PackBuilder::new();
    for oid in objects {
        let (object_type, payload) = database.get(oid)?;
        builder.add(object_type, payload);
    }

    builder.build()
}

/// Store every object of a received pack, returning their ids
pub fn unpack_objects(database: &Database, pack: &[u8]) -> anyhow::Result<Vec<ObjectId>> {
    let objects = PackParser::new(pack).parse()?;

    let mut stored = Vec::with_capacity(objects.len());
    for object in &objects {
        let oid = database.put(object.object_type, &object.payload)?;
        debug_assert_eq!(oid, object_id_of(object));
        stored.push(oid);
    }
    tracing::debug!(target: "bit::transport", objects = stored.len(), "pack unpacked");

    Ok(stored)
}
