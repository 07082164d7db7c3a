use crate::areas::config::DEFAULT_REMOTE;
use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::{BranchName, SymRefName, TagName};
use crate::artifacts::core::errors::{BitError, BitResult};
use crate::artifacts::merge::bca_finder::BCAFinder;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::transport::client::{Connection, RemoteUrl};
use crate::artifacts::transport::negotiation::{ObjectWalker, pack_objects};
use crate::artifacts::transport::protocol::{Command, CommandStatus, Service};
use std::io::Write;

impl Repository {
    /// Push the current branch to its upstream (or the same name on `origin`)
    ///
    /// A remote branch that is not an ancestor of the local one is `Rejected`
    /// unless `force` is set. The first push of a branch records its upstream.
    pub async fn push(&self, force: bool) -> BitResult<()> {
        let branch = self.checked_out_branch()?;
        let (remote, remote_branch) = self.upstream_of(&branch)?;

        self.push_refs(
            &remote,
            &[(branch.to_ref_name(), remote_branch.to_ref_name())],
            force,
        )
        .await?;

        let mut config = self.config()?;
        if config.upstream(&branch).is_none() {
            config.set_upstream(&branch, &remote);
            self.save_config(&config)?;
        }

        Ok(())
    }

    /// Push one tag to `origin`; a different tag of the same name there is
    /// `Rejected`
    pub async fn push_tag(&self, name: &str) -> BitResult<()> {
        let tag = TagName::try_parse(name.to_string())?.to_ref_name();
        self.push_refs(DEFAULT_REMOTE, &[(tag.clone(), tag)], false)
            .await
    }

    /// Update remote refs from local ones, sending the objects they need
    async fn push_refs(
        &self,
        remote: &str,
        refspecs: &[(SymRefName, SymRefName)],
        force: bool,
    ) -> BitResult<()> {
        let url = RemoteUrl::parse(self.config()?.remote_url(remote)?)?;
        let connection = Connection::open(&url, Service::ReceivePack, self.credentials()).await?;
        let advertised = connection.advertisement().refs.clone();

        let finder = BCAFinder::new(|oid: &ObjectId| self.database().slim_commit(oid));
        let mut commands = Vec::new();
        for (local, remote_ref) in refspecs {
            let new = self
                .refs()
                .resolve(local)?
                .ok_or_else(|| BitError::NotFound(format!("ref '{}'", local.short_name())))?;
            let old = advertised.get(remote_ref.as_ref_path()).cloned();

            if old.as_ref() == Some(&new) {
                continue;
            }
            if let Some(old) = &old
                && !force
            {
                if remote_ref.is_tag() {
                    return Err(BitError::Rejected(format!(
                        "{remote_ref} already exists on the remote"
                    )));
                }
                if !self.database().has(old) || !finder.is_ancestor(old, &new)? {
                    return Err(BitError::Rejected(format!(
                        "{remote_ref} (non-fast-forward): fetch and merge the remote changes first"
                    )));
                }
            }

            commands.push(Command {
                old: old.unwrap_or_else(ObjectId::zero),
                new,
                name: remote_ref.to_string(),
            });
        }

        if commands.is_empty() {
            connection.push(&[], None).await?;
            writeln!(self.writer(), "Everything up-to-date")?;
            return Ok(());
        }

        let tips = commands
            .iter()
            .map(|command| command.new.clone())
            .collect::<Vec<_>>();
        let haves = advertised.into_values().collect::<Vec<_>>();
        let objects = ObjectWalker::new(self.database()).missing_for_peer(&tips, &haves)?;
        let pack = pack_objects(self.database(), &objects)?;

        let statuses = connection.push(&commands, Some(pack)).await?;

        writeln!(self.writer(), "To {url}")?;
        let mut rejected = Vec::new();
        for (command, status) in commands.iter().zip(&statuses) {
            match status {
                CommandStatus::Ok(name) => {
                    writeln!(
                        self.writer(),
                        "   {}..{}  {name}",
                        command.old.to_short_oid(),
                        command.new.to_short_oid()
                    )?;
                    self.record_pushed(remote, name, &command.new)?;
                }
                CommandStatus::Rejected { name, reason } => {
                    writeln!(self.writer(), " ! [rejected]  {name} ({reason})")?;
                    rejected.push(format!("{name} ({reason})"));
                }
            }
        }
        tracing::info!(
            remote,
            objects = objects.len(),
            refs = commands.len(),
            rejected = rejected.len(),
            "push finished"
        );

        if !rejected.is_empty() {
            return Err(BitError::Rejected(rejected.join(", ")));
        }
        Ok(())
    }

    /// Move the tracking ref of a pushed branch to what the remote now holds
    fn record_pushed(&self, remote: &str, name: &str, oid: &ObjectId) -> anyhow::Result<()> {
        let Ok(branch) = SymRefName::try_parse(name).and_then(|name| BranchName::try_parse_sym_ref_name(&name))
        else {
            return Ok(());
        };

        let tracking = SymRefName::remote_tracking(remote, &branch);
        let current = self.refs().resolve(&tracking)?;
        if current.as_ref() != Some(oid) {
            self.refs().update(&tracking, current.as_ref(), oid)?;
        }

        Ok(())
    }
}
