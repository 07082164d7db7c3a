use crate::areas::repository::Repository;
use crate::artifacts::core::errors::BitResult;
use std::io::Write;
use std::path::PathBuf;

impl Repository {
    /// Remove untracked files and directories that are not ignored
    ///
    /// Without `force` nothing is deleted; the paths that would go are
    /// reported and returned.
    pub async fn clean(&self, force: bool) -> BitResult<Vec<PathBuf>> {
        let index = self.index();
        let mut index = index.lock().await;
        index.rehydrate()?;

        let untracked = self.workspace().list_untracked(&index)?;
        drop(index);

        let mut paths = untracked
            .files
            .into_iter()
            .chain(untracked.directories)
            .collect::<Vec<_>>();
        paths.sort();

        for path in &paths {
            let is_dir = self.workspace().path().join(path).is_dir();
            let shown = if is_dir {
                format!("{}/", path.display())
            } else {
                path.display().to_string()
            };

            if force {
                self.workspace().remove_path(path)?;
                writeln!(self.writer(), "Removing {shown}")?;
            } else {
                writeln!(self.writer(), "Would remove {shown}")?;
            }
        }
        tracing::info!(paths = paths.len(), force, "clean");

        Ok(paths)
    }
}
