//! Git references (branches, HEAD, tags, remote-tracking refs)
//!
//! References are human-readable names pointing to objects. They can be:
//! - Direct: containing a 40-character object id
//! - Symbolic: `ref: <name>` pointing to another reference (HEAD -> refs/heads/master)
//!
//! ## Concurrency
//!
//! Every mutation is a compare-and-swap. The writer creates `<ref>.lock` with an
//! exclusive create, re-reads the current value, compares it with the value the
//! caller expects, writes the new value into the lock file and renames it over
//! the ref. Two writers racing on the same ref cannot both hold the lock, and the
//! loser of a race that starts from the same expected value sees a `Conflict`.
//!
//! Nothing is cached: HEAD and branch tips are read from disk on every call.

use crate::artifacts::branch::branch_name::{BranchName, SymRefName};
use crate::artifacts::branch::{HEAD_REF_NAME, HEADS_PREFIX, REFS_PREFIX, TAGS_PREFIX};
use crate::artifacts::core::errors::BitError;
use crate::artifacts::objects::object_id::ObjectId;
use anyhow::Context;
use derive_new::new;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Regex pattern for parsing symbolic references
const SYMREF_REGEX: &str = r"^ref: (.+)$";

/// Symbolic chains longer than this are treated as corrupt
const MAX_SYMREF_DEPTH: usize = 5;

/// Stored value of a reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymRefOrOid {
    SymRef { sym_ref_name: SymRefName },
    Oid(ObjectId),
}

impl SymRefOrOid {
    fn read_symref_or_oid(path: &Path) -> anyhow::Result<Option<SymRefOrOid>> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            // a directory where a ref was expected means the name is only a prefix
            Err(_) if path.is_dir() => return Ok(None),
            Err(error) => {
                return Err(error).with_context(|| format!("failed to read ref at {path:?}"));
            }
        };
        let content = content.trim();

        if content.is_empty() {
            return Ok(None);
        }

        let symref_match = regex::Regex::new(SYMREF_REGEX)?.captures(content);
        if let Some(symref_match) = symref_match {
            Ok(Some(SymRefOrOid::SymRef {
                sym_ref_name: SymRefName::new(symref_match[1].to_string()),
            }))
        } else {
            let oid = ObjectId::try_parse(content.to_string()).map_err(|_| {
                BitError::Corrupt(format!("ref at {} holds '{content}'", path.display()))
            })?;
            Ok(Some(SymRefOrOid::Oid(oid)))
        }
    }

    fn to_file_content(&self) -> String {
        match self {
            SymRefOrOid::SymRef { sym_ref_name } => format!("ref: {sym_ref_name}\n"),
            SymRefOrOid::Oid(oid) => format!("{oid}\n"),
        }
    }
}

/// Exclusive `<ref>.lock` file, removed on drop unless committed
struct RefLock {
    lock_path: PathBuf,
    ref_path: PathBuf,
    file: Option<std::fs::File>,
}

impl RefLock {
    fn acquire(ref_path: &Path) -> anyhow::Result<Self> {
        let parent = ref_path
            .parent()
            .with_context(|| format!("invalid ref path {ref_path:?}"))?;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create ref directory {parent:?}"))?;

        let mut lock_name = ref_path.as_os_str().to_owned();
        lock_name.push(".lock");
        let lock_path = PathBuf::from(lock_name);

        let file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .map_err(|error| match error.kind() {
                std::io::ErrorKind::AlreadyExists => anyhow::Error::from(BitError::Conflict(
                    format!("{} is locked by another writer", ref_path.display()),
                )),
                _ => anyhow::Error::from(error)
                    .context(format!("failed to create lock file {lock_path:?}")),
            })?;

        Ok(RefLock {
            lock_path,
            ref_path: ref_path.to_path_buf(),
            file: Some(file),
        })
    }

    fn commit(mut self, content: &str) -> anyhow::Result<()> {
        let mut file = self.file.take().context("ref lock already released")?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&self.lock_path, &self.ref_path)
            .with_context(|| format!("failed to move lock over {:?}", self.ref_path))?;
        // the lock file no longer exists; nothing left for drop to clean up
        self.lock_path = PathBuf::new();

        Ok(())
    }
}

impl Drop for RefLock {
    fn drop(&mut self) {
        if !self.lock_path.as_os_str().is_empty() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

fn describe(value: Option<&ObjectId>) -> String {
    value.map_or_else(|| "nothing".to_string(), ObjectId::to_string)
}

/// Git references manager rooted at the `.git` directory
#[derive(Debug, Clone, new)]
pub struct Refs {
    path: Box<Path>,
}

impl Refs {
    fn ref_path(&self, name: &SymRefName) -> PathBuf {
        self.path.join(name.as_ref_path())
    }

    /// Raw stored value of a ref, without following symbolic indirection
    pub fn read_raw(&self, name: &SymRefName) -> anyhow::Result<Option<SymRefOrOid>> {
        SymRefOrOid::read_symref_or_oid(&self.ref_path(name))
    }

    /// Follow symbolic refs until reaching the ref that stores an object id
    ///
    /// Returns the final ref name and its current value (None when unborn).
    fn resolve_target(&self, name: &SymRefName) -> anyhow::Result<(SymRefName, Option<ObjectId>)> {
        let mut current = name.clone();

        for _ in 0..MAX_SYMREF_DEPTH {
            match self.read_raw(&current)? {
                Some(SymRefOrOid::SymRef { sym_ref_name }) => current = sym_ref_name,
                Some(SymRefOrOid::Oid(oid)) => return Ok((current, Some(oid))),
                None => return Ok((current, None)),
            }
        }

        Err(BitError::Corrupt(format!("symbolic ref {name} is too deeply nested")).into())
    }

    /// Resolve a ref to an object id, following symbolic indirection
    pub fn resolve(&self, name: &SymRefName) -> anyhow::Result<Option<ObjectId>> {
        Ok(self.resolve_target(name)?.1)
    }

    pub fn exists(&self, name: &SymRefName) -> anyhow::Result<bool> {
        Ok(self.read_raw(name)?.is_some())
    }

    /// Compare-and-swap a ref to `new`
    ///
    /// `expected` is the value the caller last observed; `None` means the ref
    /// must not exist yet. Symbolic refs are followed so that updating HEAD moves
    /// the checked-out branch.
    pub fn update(
        &self,
        name: &SymRefName,
        expected: Option<&ObjectId>,
        new: &ObjectId,
    ) -> anyhow::Result<()> {
        let (target, _) = self.resolve_target(name)?;
        let lock = RefLock::acquire(&self.ref_path(&target))?;

        let current = match self.read_raw(&target)? {
            Some(SymRefOrOid::Oid(oid)) => Some(oid),
            Some(SymRefOrOid::SymRef { .. }) => {
                return Err(BitError::Conflict(format!(
                    "{target} became a symbolic ref during the update"
                ))
                .into());
            }
            None => None,
        };

        if current.as_ref() != expected {
            return Err(BitError::Conflict(format!(
                "{target} moved: expected {}, found {}",
                describe(expected),
                describe(current.as_ref())
            ))
            .into());
        }

        lock.commit(&SymRefOrOid::Oid(new.clone()).to_file_content())?;
        tracing::debug!(target: "bit::refs", name = %target, old = %describe(expected), new = %new, "ref updated");

        Ok(())
    }

    /// Create a ref that must not exist yet
    pub fn create(&self, name: &SymRefName, oid: &ObjectId) -> anyhow::Result<()> {
        match self.update(name, None, oid) {
            Err(error) if matches!(error.downcast_ref::<BitError>(), Some(BitError::Conflict(_))) => {
                if self.exists(name)? {
                    Err(BitError::AlreadyExists(name.short_name().to_string()).into())
                } else {
                    Err(error)
                }
            }
            result => result,
        }
    }

    /// Delete a ref if it still holds `expected` (any value when `None`)
    ///
    /// Returns the value the ref held.
    pub fn delete(
        &self,
        name: &SymRefName,
        expected: Option<&ObjectId>,
    ) -> anyhow::Result<ObjectId> {
        let ref_path = self.ref_path(name);
        let lock = RefLock::acquire(&ref_path)?;

        let current = match self.read_raw(name)? {
            Some(SymRefOrOid::Oid(oid)) => oid,
            Some(SymRefOrOid::SymRef { .. }) => {
                return Err(BitError::Conflict(format!("{name} is a symbolic ref")).into());
            }
            None => return Err(BitError::NotFound(name.short_name().to_string()).into()),
        };

        if let Some(expected) = expected
            && expected != &current
        {
            return Err(BitError::Conflict(format!(
                "{name} moved: expected {expected}, found {current}"
            ))
            .into());
        }

        std::fs::remove_file(&ref_path)
            .with_context(|| format!("failed to delete ref file at {ref_path:?}"))?;
        drop(lock);
        self.prune_empty_parent_dirs(&ref_path)?;
        tracing::debug!(target: "bit::refs", name = %name, old = %current, "ref deleted");

        Ok(current)
    }

    /// All refs under `prefix` (e.g. `refs/heads/`), sorted by name
    ///
    /// Symbolic refs inside the namespace (like `refs/remotes/origin/HEAD`) are
    /// resolved; dangling ones are skipped.
    pub fn list(&self, prefix: &str) -> anyhow::Result<Vec<(SymRefName, ObjectId)>> {
        let root = self.path.join(prefix.trim_end_matches('/'));
        if !root.is_dir() {
            return Ok(vec![]);
        }

        let mut refs = Vec::new();
        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() || entry.path().extension().is_some_and(|e| e == "lock")
            {
                continue;
            }

            let relative_path = entry
                .path()
                .strip_prefix(self.path.as_ref())
                .with_context(|| format!("ref {:?} outside of {:?}", entry.path(), self.path))?;
            let name = SymRefName::new(relative_path.to_string_lossy().replace('\\', "/"));

            if let Some(oid) = self.resolve(&name)? {
                refs.push((name, oid));
            }
        }
        refs.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(refs)
    }

    pub fn read_head(&self) -> anyhow::Result<Option<ObjectId>> {
        self.resolve(&SymRefName::head())
    }

    /// Checked-out branch, read fresh from HEAD; `None` when HEAD is detached
    pub fn current_branch(&self) -> anyhow::Result<Option<BranchName>> {
        match self.read_raw(&SymRefName::head())? {
            Some(SymRefOrOid::SymRef { sym_ref_name }) => {
                Ok(Some(BranchName::try_parse_sym_ref_name(&sym_ref_name)?))
            }
            Some(SymRefOrOid::Oid(_)) => Ok(None),
            None => Err(BitError::Corrupt("HEAD is missing".to_string()).into()),
        }
    }

    /// Ref that HEAD currently names: the branch ref, or HEAD itself when detached
    pub fn head_target(&self) -> anyhow::Result<SymRefName> {
        Ok(self.resolve_target(&SymRefName::head())?.0)
    }

    /// Point HEAD at a branch (the branch may be unborn)
    pub fn set_head_symbolic(&self, branch: &BranchName) -> anyhow::Result<()> {
        self.write_head(SymRefOrOid::SymRef {
            sym_ref_name: branch.to_ref_name(),
        })
    }

    /// Compare-and-swap HEAD itself, without following it to a branch
    ///
    /// `expected` is the raw value (symbolic or detached) the caller read
    /// before starting the switch.
    pub fn switch_head(
        &self,
        expected: Option<&SymRefOrOid>,
        new: SymRefOrOid,
    ) -> anyhow::Result<()> {
        let head = SymRefName::head();
        let lock = RefLock::acquire(&self.ref_path(&head))?;

        let current = self.read_raw(&head)?;
        if current.as_ref() != expected {
            return Err(BitError::Conflict(
                "HEAD moved while the working tree was being switched".to_string(),
            )
            .into());
        }

        lock.commit(&new.to_file_content())?;
        tracing::debug!(target: "bit::refs", head = %new.to_file_content().trim(), "HEAD moved");

        Ok(())
    }

    fn write_head(&self, value: SymRefOrOid) -> anyhow::Result<()> {
        let lock = RefLock::acquire(&self.ref_path(&SymRefName::head()))?;
        lock.commit(&value.to_file_content())?;
        tracing::debug!(target: "bit::refs", head = %value.to_file_content().trim(), "HEAD moved");

        Ok(())
    }

    /// Set up an empty ref store with HEAD on an unborn branch
    pub fn initialize(&self, default_branch: &BranchName) -> anyhow::Result<()> {
        for namespace in [HEADS_PREFIX, TAGS_PREFIX] {
            std::fs::create_dir_all(self.path.join(namespace))
                .with_context(|| format!("failed to create {namespace}"))?;
        }
        self.set_head_symbolic(default_branch)
    }

    fn prune_empty_parent_dirs(&self, path: &Path) -> anyhow::Result<()> {
        let refs_root = self.path.join(REFS_PREFIX.trim_end_matches('/'));
        let mut current = path.parent();

        while let Some(parent) = current {
            // keep refs/ and the namespace directories right below it
            if parent == refs_root || parent.parent() == Some(refs_root.as_path()) {
                break;
            }
            if parent.read_dir()?.next().is_some() {
                break;
            }
            std::fs::remove_dir(parent)
                .with_context(|| format!("failed to remove empty ref directory at {parent:?}"))?;
            current = parent.parent();
        }

        Ok(())
    }

    pub fn head_path(&self) -> PathBuf {
        self.path.join(HEAD_REF_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::TempDir;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn refs() -> (TempDir, Refs) {
        let dir = TempDir::new().unwrap();
        let refs = Refs::new(dir.path().to_path_buf().into_boxed_path());
        refs.initialize(&BranchName::try_parse("master".into()).unwrap())
            .unwrap();
        (dir, refs)
    }

    fn oid(seed: &str) -> ObjectId {
        ObjectId::hash_of(seed.as_bytes())
    }

    fn master() -> SymRefName {
        SymRefName::new("refs/heads/master".into())
    }

    #[rstest]
    fn fresh_store_has_an_unborn_current_branch(refs: (TempDir, Refs)) {
        let (_dir, refs) = refs;

        assert_eq!(refs.current_branch().unwrap().unwrap().as_ref(), "master");
        assert_eq!(refs.read_head().unwrap(), None);
    }

    #[rstest]
    fn update_through_head_moves_the_branch(refs: (TempDir, Refs)) {
        let (_dir, refs) = refs;

        refs.update(&SymRefName::head(), None, &oid("a")).unwrap();
        assert_eq!(refs.resolve(&master()).unwrap(), Some(oid("a")));

        refs.update(&SymRefName::head(), Some(&oid("a")), &oid("b"))
            .unwrap();
        assert_eq!(refs.read_head().unwrap(), Some(oid("b")));
    }

    #[rstest]
    fn stale_expectation_is_a_conflict(refs: (TempDir, Refs)) {
        let (_dir, refs) = refs;
        refs.update(&master(), None, &oid("a")).unwrap();

        let error = refs.update(&master(), None, &oid("b")).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<BitError>(),
            Some(BitError::Conflict(_))
        ));
        assert_eq!(refs.resolve(&master()).unwrap(), Some(oid("a")));
    }

    #[rstest]
    fn held_lock_is_a_conflict(refs: (TempDir, Refs)) {
        let (dir, refs) = refs;
        std::fs::write(dir.path().join("refs/heads/master.lock"), "").unwrap();

        let error = refs.update(&master(), None, &oid("a")).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<BitError>(),
            Some(BitError::Conflict(_))
        ));
    }

    #[rstest]
    fn create_refuses_existing_names(refs: (TempDir, Refs)) {
        let (_dir, refs) = refs;
        let tag = SymRefName::new("refs/tags/v1".into());

        refs.create(&tag, &oid("a")).unwrap();
        let error = refs.create(&tag, &oid("b")).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<BitError>(),
            Some(BitError::AlreadyExists(name)) if name == "v1"
        ));
    }

    #[rstest]
    fn delete_prunes_empty_directories(refs: (TempDir, Refs)) {
        let (dir, refs) = refs;
        let nested = SymRefName::new("refs/heads/feature/deep/x".into());
        refs.create(&nested, &oid("a")).unwrap();

        assert_eq!(refs.delete(&nested, Some(&oid("a"))).unwrap(), oid("a"));
        assert!(!dir.path().join("refs/heads/feature").exists());
        assert!(dir.path().join("refs/heads").exists());
    }

    #[rstest]
    fn list_is_sorted_and_scoped(refs: (TempDir, Refs)) {
        let (_dir, refs) = refs;
        refs.create(&SymRefName::new("refs/heads/zeta".into()), &oid("z"))
            .unwrap();
        refs.create(&SymRefName::new("refs/heads/alpha".into()), &oid("a"))
            .unwrap();
        refs.create(&SymRefName::new("refs/tags/v1".into()), &oid("t"))
            .unwrap();

        let names = refs
            .list(HEADS_PREFIX)
            .unwrap()
            .into_iter()
            .map(|(name, _)| name.to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["refs/heads/alpha", "refs/heads/zeta"]);
    }

    #[rstest]
    fn detached_head_has_no_current_branch(refs: (TempDir, Refs)) {
        let (_dir, refs) = refs;
        let head = refs.read_raw(&SymRefName::head()).unwrap();
        refs.switch_head(head.as_ref(), SymRefOrOid::Oid(oid("a"))).unwrap();

        assert_eq!(refs.current_branch().unwrap(), None);
        assert_eq!(refs.head_target().unwrap(), SymRefName::head());
        assert_eq!(refs.read_head().unwrap(), Some(oid("a")));
    }

    #[rstest]
    fn racing_writers_from_the_same_base_have_one_winner(refs: (TempDir, Refs)) {
        let (_dir, refs) = refs;
        refs.update(&master(), None, &oid("base")).unwrap();

        let results = std::thread::scope(|scope| {
            let handles = (0..8)
                .map(|i| {
                    let refs = refs.clone();
                    scope.spawn(move || {
                        refs.update(&master(), Some(&oid("base")), &oid(&format!("w{i}")))
                    })
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect::<Vec<_>>()
        });

        assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
        assert!(results.iter().filter_map(|result| result.as_ref().err()).all(|error| {
            matches!(error.downcast_ref::<BitError>(), Some(BitError::Conflict(_)))
        }));
    }

    #[rstest]
    fn switching_head_from_a_stale_value_is_a_conflict(refs: (TempDir, Refs)) {
        let (_dir, refs) = refs;
        let seen = refs.read_raw(&SymRefName::head()).unwrap();
        let topic = SymRefOrOid::SymRef {
            sym_ref_name: SymRefName::new("refs/heads/topic".into()),
        };
        refs.switch_head(seen.as_ref(), topic.clone()).unwrap();

        let error = refs
            .switch_head(seen.as_ref(), SymRefOrOid::Oid(oid("a")))
            .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<BitError>(),
            Some(BitError::Conflict(_))
        ));
        assert_eq!(refs.read_raw(&SymRefName::head()).unwrap(), Some(topic));
    }
}
