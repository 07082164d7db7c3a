use crate::areas::index::StageDiff;
use crate::areas::repository::Repository;
use crate::artifacts::core::errors::BitResult;

impl Repository {
    /// Stage every new, modified and deleted path in the working tree
    pub async fn add_all(&self) -> BitResult<StageDiff> {
        let index = self.index();
        let mut index = index.lock().await;

        index.rehydrate()?;
        let diff = index.stage_all(self.workspace(), self.database())?;
        index.write_updates()?;

        tracing::info!(
            added = diff.added.len(),
            modified = diff.modified.len(),
            deleted = diff.deleted.len(),
            "working tree staged"
        );

        Ok(diff)
    }
}
