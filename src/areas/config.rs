//! Repository configuration, stored as TOML at `.git/config.toml`
//!
//! ```toml
//! [core]
//! default_branch = "master"
//!
//! [user]
//! name = "A U Thor"
//! email = "author@example.com"
//!
//! [remote.origin]
//! url = "/path/to/other/repo"
//!
//! [branch.master]
//! remote = "origin"
//! merge = "refs/heads/master"
//! ```
//!
//! A missing file reads as the defaults. Writes go through a temporary file and
//! a rename.

use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::core::errors::BitError;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_BRANCH: &str = "master";
pub const DEFAULT_REMOTE: &str = "origin";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub default_branch: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        CoreConfig {
            default_branch: DEFAULT_BRANCH.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub url: String,
}

/// Upstream of a local branch, used by `pull`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchConfig {
    pub remote: String,
    pub merge: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    pub core: CoreConfig,
    pub user: UserConfig,
    pub remote: BTreeMap<String, RemoteConfig>,
    pub branch: BTreeMap<String, BranchConfig>,
}

impl RepoConfig {
    pub fn load(git_dir: &Path) -> anyhow::Result<Self> {
        let path = git_dir.join(CONFIG_FILE_NAME);

        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(error) => {
                return Err(error).with_context(|| format!("failed to read config file {path:?}"));
            }
        };

        toml::from_str(&contents).map_err(|error| {
            BitError::Corrupt(format!("failed to parse config file {}: {error}", path.display()))
                .into()
        })
    }

    pub fn save(&self, git_dir: &Path) -> anyhow::Result<()> {
        let path = git_dir.join(CONFIG_FILE_NAME);
        let contents = toml::to_string_pretty(self).context("failed to serialize config")?;

        let temp_path = path.with_extension("toml.tmp");
        std::fs::write(&temp_path, contents)
            .with_context(|| format!("failed to write config file {temp_path:?}"))?;
        std::fs::rename(&temp_path, &path)
            .with_context(|| format!("failed to move config file into {path:?}"))?;

        Ok(())
    }

    pub fn default_branch(&self) -> anyhow::Result<BranchName> {
        BranchName::try_parse(self.core.default_branch.clone())
    }

    pub fn remote_url(&self, remote: &str) -> anyhow::Result<&str> {
        self.remote
            .get(remote)
            .map(|remote| remote.url.as_str())
            .ok_or_else(|| BitError::NotFound(format!("remote '{remote}'")).into())
    }

    pub fn set_remote(&mut self, remote: &str, url: &str) {
        self.remote.insert(
            remote.to_string(),
            RemoteConfig {
                url: url.to_string(),
            },
        );
    }

    pub fn set_upstream(&mut self, branch: &BranchName, remote: &str) {
        self.branch.insert(
            branch.to_string(),
            BranchConfig {
                remote: remote.to_string(),
                merge: branch.to_ref_name().to_string(),
            },
        );
    }

    pub fn upstream(&self, branch: &BranchName) -> Option<&BranchConfig> {
        self.branch.get(branch.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::TempDir;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_file_reads_as_defaults() {
        let dir = TempDir::new().unwrap();
        let config = RepoConfig::load(dir.path()).unwrap();

        assert_eq!(config, RepoConfig::default());
        assert_eq!(config.default_branch().unwrap().as_ref(), "master");
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = TempDir::new().unwrap();
        let mut config = RepoConfig::default();
        config.user.name = Some("A U Thor".into());
        config.set_remote("origin", "/srv/repo");
        config.set_upstream(&BranchName::try_parse("master".into()).unwrap(), "origin");

        config.save(dir.path()).unwrap();
        let loaded = RepoConfig::load(dir.path()).unwrap();

        assert_eq!(loaded, config);
        assert_eq!(loaded.remote_url("origin").unwrap(), "/srv/repo");
        assert_eq!(
            loaded.upstream(&BranchName::try_parse("master".into()).unwrap()).unwrap().merge,
            "refs/heads/master"
        );
    }

    #[test]
    fn partial_files_keep_defaults_for_the_rest() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "[user]\nemail = \"a@b.c\"\n").unwrap();

        let config = RepoConfig::load(dir.path()).unwrap();
        assert_eq!(config.core, CoreConfig::default());
        assert_eq!(config.user.email.as_deref(), Some("a@b.c"));
    }

    #[test]
    fn unknown_remotes_are_not_found() {
        let error = RepoConfig::default().remote_url("upstream").unwrap_err();
        assert!(matches!(error.downcast_ref::<BitError>(), Some(BitError::NotFound(_))));
    }
}
