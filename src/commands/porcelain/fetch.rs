use crate::areas::config::DEFAULT_REMOTE;
use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::{BranchName, SymRefName};
use crate::artifacts::branch::{HEADS_PREFIX, REFS_PREFIX, TAGS_PREFIX};
use crate::artifacts::core::errors::BitResult;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::transport::client::{Connection, RemoteUrl};
use crate::artifacts::transport::negotiation::ObjectWalker;
use crate::artifacts::transport::protocol::Service;
use std::collections::BTreeSet;
use std::io::Write;

/// What a fetch changed locally
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResult {
    /// Tracking refs and tags that were created or moved, with their new ids
    pub updated_refs: Vec<(String, ObjectId)>,
    /// Branch the remote HEAD points at, if any
    pub remote_head: Option<String>,
}

impl Repository {
    /// Fetch from `origin`
    pub async fn fetch(&self) -> BitResult<FetchResult> {
        self.fetch_remote(DEFAULT_REMOTE).await
    }

    /// Download the objects of every branch and tag of `remote`
    ///
    /// Remote branches land in `refs/remotes/<remote>/*`, new tags in
    /// `refs/tags/*`; local branches are never touched. Refs move only after
    /// the downloaded history is known to be complete.
    pub async fn fetch_remote(&self, remote: &str) -> BitResult<FetchResult> {
        let url = RemoteUrl::parse(self.config()?.remote_url(remote)?)?;
        let connection = Connection::open(&url, Service::UploadPack, self.credentials()).await?;
        let advertisement = connection.advertisement().clone();

        let mut targets = Vec::new();
        for (name, oid) in &advertisement.refs {
            if let Some(branch) = name.strip_prefix(HEADS_PREFIX) {
                let branch = BranchName::try_parse(branch.to_string())?;
                targets.push((SymRefName::remote_tracking(remote, &branch), oid.clone()));
            } else if name.starts_with(TAGS_PREFIX) {
                targets.push((SymRefName::try_parse(name)?, oid.clone()));
            }
        }

        let wants = targets
            .iter()
            .map(|(_, oid)| oid)
            .filter(|oid| !self.database().has(oid))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        let haves = self
            .refs()
            .list(REFS_PREFIX)?
            .into_iter()
            .map(|(_, oid)| oid)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();

        let received = connection.fetch(self.database(), &wants, &haves).await?;
        ObjectWalker::new(self.database()).check_connectivity(&wants)?;

        writeln!(self.writer(), "From {url}")?;
        let mut result = FetchResult {
            remote_head: advertisement
                .head_target
                .as_deref()
                .and_then(|target| target.strip_prefix(HEADS_PREFIX))
                .map(str::to_string),
            ..Default::default()
        };

        for (name, oid) in targets {
            let current = self.refs().resolve(&name)?;
            // tags already present locally are kept as they are
            if current.as_ref() == Some(&oid) || (name.is_tag() && current.is_some()) {
                continue;
            }

            self.refs().update(&name, current.as_ref(), &oid)?;
            match &current {
                Some(old) => writeln!(
                    self.writer(),
                    "   {}..{}  {}",
                    old.to_short_oid(),
                    oid.to_short_oid(),
                    name.short_name()
                )?,
                None => writeln!(self.writer(), " * [new]  {}", name.short_name())?,
            }
            result.updated_refs.push((name.to_string(), oid));
        }

        tracing::info!(
            remote,
            objects = received.len(),
            updated = result.updated_refs.len(),
            "fetch finished"
        );

        Ok(result)
    }
}
