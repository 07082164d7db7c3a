#![allow(dead_code)]

pub mod command;
pub mod file;

use bit::Repository;
use bit::artifacts::objects::object_id::ObjectId;
use std::path::Path;

pub const AUTHOR_NAME: &str = "fake_user";
pub const AUTHOR_EMAIL: &str = "fake_email@email.com";

/// Initialize a repository with an author configured in `.git/config.toml`
pub async fn init_repository(dir: &Path) -> Repository {
    let repository = Repository::init(dir)
        .await
        .expect("Failed to initialize repository");
    configure_author(&repository);

    repository
}

pub fn configure_author(repository: &Repository) {
    let mut config = repository.config().expect("Failed to load config");
    config.user.name = Some(AUTHOR_NAME.to_string());
    config.user.email = Some(AUTHOR_EMAIL.to_string());
    repository
        .save_config(&config)
        .expect("Failed to save config");
}

/// Stage everything and commit it
pub async fn commit_all(repository: &Repository, message: &str) -> ObjectId {
    repository.add_all().await.expect("Failed to stage changes");
    repository
        .commit(message)
        .await
        .expect("Failed to commit")
}

/// Tree id the index would be committed as
pub async fn staged_tree(repository: &Repository) -> ObjectId {
    let index = repository.index();
    let mut index = index.lock().await;
    index.rehydrate().expect("Failed to read index");
    index
        .write_tree(repository.database())
        .expect("Failed to write tree")
}

pub fn head_of(repository: &Repository) -> Option<ObjectId> {
    repository.refs().read_head().expect("Failed to read HEAD")
}
