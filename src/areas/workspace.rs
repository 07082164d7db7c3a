use crate::areas::index::Index;
use crate::artifacts::checkout::migration::{ActionType, Migration};
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_entry::EntryMetadata;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::status::ignore::IgnoreRules;
use anyhow::Context;
use bytes::Bytes;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const GIT_DIR_NAME: &str = ".git";

/// Untracked paths found by a clean scan
///
/// Directories holding only untracked, non-ignored content (or nothing at
/// all) are reported once, as the directory itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UntrackedPaths {
    pub files: Vec<PathBuf>,
    pub directories: Vec<PathBuf>,
}

impl UntrackedPaths {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.directories.is_empty()
    }
}

#[derive(Debug)]
pub struct Workspace {
    path: Box<Path>,
}

impl Workspace {
    pub fn new(path: Box<Path>) -> Self {
        Workspace { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ignore rules, re-read from `.gitignore` on every call
    pub fn ignore_rules(&self) -> anyhow::Result<IgnoreRules> {
        IgnoreRules::load(&self.path)
    }

    pub fn parse_blob(&self, path: &Path) -> anyhow::Result<Blob> {
        let data = self.read_file(path)?;
        Ok(Blob::new(data))
    }

    /// Immediate children of a directory, relative to the workspace root
    pub fn list_dir(&self, dir_path: Option<&Path>) -> anyhow::Result<Vec<PathBuf>> {
        let dir_path = match dir_path {
            Some(p) => self.path.join(p),
            None => self.path.to_path_buf(),
        };

        if !dir_path.is_dir() {
            anyhow::bail!("The specified path is not a directory: {:?}", dir_path);
        }

        let mut paths = std::fs::read_dir(&dir_path)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name() != GIT_DIR_NAME)
            .filter_map(|entry| self.relative_path(&entry.path()))
            .collect::<Vec<_>>();
        paths.sort();

        Ok(paths)
    }

    /// Every file (or symlink) under the root that the ignore rules let through
    pub fn list_files(&self) -> anyhow::Result<Vec<PathBuf>> {
        let rules = self.ignore_rules()?;
        let mut files = Vec::new();

        let walker = WalkDir::new(&self.path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                self.relative_path(entry.path()).is_none_or(|path| {
                    path.as_os_str().is_empty()
                        || !rules.is_ignored(&path, entry.file_type().is_dir())
                })
            });

        for entry in walker {
            let entry = entry?;
            if entry.file_type().is_dir() {
                continue;
            }
            if let Some(path) = self.relative_path(entry.path()) {
                files.push(path);
            }
        }

        Ok(files)
    }

    /// Untracked, non-ignored paths, as removed by `clean`
    pub fn list_untracked(&self, index: &Index) -> anyhow::Result<UntrackedPaths> {
        let rules = self.ignore_rules()?;
        let mut untracked = UntrackedPaths::default();

        self.collect_untracked(Path::new(""), index, &rules, &mut untracked)?;

        Ok(untracked)
    }

    fn collect_untracked(
        &self,
        dir: &Path,
        index: &Index,
        rules: &IgnoreRules,
        untracked: &mut UntrackedPaths,
    ) -> anyhow::Result<()> {
        for path in self.list_dir(Some(dir))? {
            let is_dir = self.path.join(&path).is_dir()
                && !self.path.join(&path).is_symlink();

            if rules.is_ignored(&path, is_dir) {
                continue;
            }

            if !is_dir {
                if !index.is_directly_tracked(&path) {
                    untracked.files.push(path);
                }
            } else if index.is_directly_tracked(&path) || self.holds_ignored(&path, rules)? {
                self.collect_untracked(&path, index, rules, untracked)?;
            } else {
                untracked.directories.push(path);
            }
        }

        Ok(())
    }

    fn holds_ignored(&self, dir: &Path, rules: &IgnoreRules) -> anyhow::Result<bool> {
        for entry in WalkDir::new(self.path.join(dir)).min_depth(1) {
            let entry = entry?;
            if let Some(path) = self.relative_path(entry.path())
                && rules.is_ignored(&path, entry.file_type().is_dir())
            {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn relative_path(&self, path: &Path) -> Option<PathBuf> {
        path.strip_prefix(self.path.as_ref())
            .ok()
            .map(Path::to_path_buf)
    }

    /// Raw bytes of a file, or the target of a symlink
    pub fn read_file(&self, file_path: &Path) -> anyhow::Result<Bytes> {
        let file_path = self.path.join(file_path);

        let metadata = std::fs::symlink_metadata(&file_path)?;
        if metadata.file_type().is_symlink() {
            let target = std::fs::read_link(&file_path)?;
            return Ok(Bytes::from(target.to_string_lossy().into_owned()));
        }

        let content = std::fs::read(&file_path)?;

        Ok(Bytes::from(content))
    }

    pub fn stat_file(&self, file_path: &Path) -> anyhow::Result<EntryMetadata> {
        let file_path = self.path.join(file_path);
        let metadata = std::fs::symlink_metadata(&file_path)?;

        (file_path.as_path(), metadata).try_into()
    }

    pub fn exists(&self, file_path: &Path) -> bool {
        std::fs::symlink_metadata(self.path.join(file_path)).is_ok()
    }

    /// Write blob content at a path with the given mode
    ///
    /// Whatever occupies the path (file, symlink or directory) is replaced and
    /// missing parent directories are created. Gitlinks are recorded as an empty
    /// directory.
    pub fn write_file(&self, file_path: &Path, data: &[u8], mode: EntryMode) -> anyhow::Result<()> {
        let path = self.path.join(file_path);

        self.remove_path(file_path)?;
        if let Some(parent) = path.parent() {
            self.make_directory_chain(parent)?;
        }

        match mode {
            EntryMode::Symlink => {
                let target = String::from_utf8_lossy(data).into_owned();
                #[cfg(unix)]
                std::os::unix::fs::symlink(&target, &path)
                    .with_context(|| format!("Failed to create symlink: {:?}", file_path))?;
                #[cfg(not(unix))]
                std::fs::write(&path, target.as_bytes())
                    .with_context(|| format!("Failed to write file: {:?}", file_path))?;
            }
            EntryMode::Gitlink => {
                std::fs::create_dir_all(&path)
                    .with_context(|| format!("Failed to create directory: {:?}", file_path))?;
            }
            _ => {
                let mut file = std::fs::OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&path)
                    .with_context(|| format!("Failed to open file: {:?}", file_path))?;

                file.write_all(data)
                    .with_context(|| format!("Failed to write to file: {:?}", file_path))?;

                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let permissions = std::fs::Permissions::from_mode(match mode {
                        EntryMode::File(_) => mode.as_u32() & 0o777,
                        _ => 0o644,
                    });
                    std::fs::set_permissions(&path, permissions).with_context(|| {
                        format!("Failed to set permissions for file: {:?}", file_path)
                    })?;
                }
            }
        }

        Ok(())
    }

    /// Remove a file, symlink or directory tree; absent paths are fine
    pub fn remove_path(&self, file_path: &Path) -> anyhow::Result<()> {
        let path = self.path.join(file_path);

        let metadata = match std::fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(error) => return Err(error.into()),
        };

        if metadata.is_dir() {
            std::fs::remove_dir_all(&path)
                .with_context(|| format!("Failed to remove existing directory: {:?}", file_path))?;
        } else {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove file: {:?}", file_path))?;
        }

        Ok(())
    }

    /// Remove a file and then any parent directories left empty
    pub fn remove_file(&self, file_path: &Path) -> anyhow::Result<()> {
        self.remove_path(file_path)?;
        self.prune_empty_parents(file_path)
    }

    fn prune_empty_parents(&self, file_path: &Path) -> anyhow::Result<()> {
        for parent in file_path.ancestors().skip(1) {
            if parent.as_os_str().is_empty() {
                break;
            }

            let dir_path = self.path.join(parent);
            if !is_empty_dir(&dir_path) {
                break;
            }
            std::fs::remove_dir(&dir_path)?;
        }

        Ok(())
    }

    // Deletions run first, removing emptied directories deepest first; then
    // directories are created parents first, and files are written into them.
    pub fn apply_migration(&self, migration: &Migration) -> anyhow::Result<()> {
        self.apply_migration_action_set(migration, ActionType::Delete)?;
        migration
            .rmdirs()
            .iter()
            .rev()
            .map(|dir_path| self.remove_directory(dir_path))
            .collect::<Result<Vec<()>, _>>()?;

        migration
            .mkdirs()
            .iter()
            .map(|dir_path| self.make_directory(dir_path))
            .collect::<Result<Vec<()>, _>>()?;
        self.apply_migration_action_set(migration, ActionType::Modify)?;
        self.apply_migration_action_set(migration, ActionType::Add)?;

        Ok(())
    }

    fn apply_migration_action_set(
        &self,
        migration: &Migration,
        action: ActionType,
    ) -> anyhow::Result<()> {
        for (file_path, entry) in migration.actions_of(&action) {
            match (&action, entry) {
                (ActionType::Delete, _) => self.remove_path(file_path)?,
                (ActionType::Add | ActionType::Modify, Some(entry)) => {
                    let data = migration.load_blob_data(entry)?;
                    self.write_file(file_path, &data, entry.mode)?;
                }
                _ => anyhow::bail!("Invalid action and entry combination for {:?}", file_path),
            }
        }

        Ok(())
    }

    /// Remove a directory only if nothing is left in it
    fn remove_directory(&self, dir_path: &Path) -> anyhow::Result<()> {
        let dir_path = self.path.join(dir_path);

        if is_empty_dir(&dir_path) {
            std::fs::remove_dir(dir_path)?;
        }

        Ok(())
    }

    fn make_directory(&self, dir_path: &Path) -> anyhow::Result<()> {
        self.make_directory_chain(&self.path.join(dir_path))
    }

    fn make_directory_chain(&self, dir_path: &Path) -> anyhow::Result<()> {
        let relative = dir_path
            .strip_prefix(self.path.as_ref())
            .unwrap_or(dir_path)
            .to_path_buf();

        let mut current = self.path.to_path_buf();
        for component in relative.components() {
            current.push(component);

            match std::fs::symlink_metadata(&current) {
                Ok(metadata) if metadata.is_dir() => continue,
                // a file or symlink stands where a directory is needed
                Ok(_) => std::fs::remove_file(&current)?,
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
                Err(error) => return Err(error.into()),
            }
            std::fs::create_dir(&current)
                .with_context(|| format!("Failed to create directory: {:?}", current))?;
        }

        Ok(())
    }
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}
