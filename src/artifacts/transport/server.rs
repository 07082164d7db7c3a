//! Serving side of a transfer: ref advertisement, upload-pack and receive-pack
//!
//! [`ServedRepository`] holds only the object store and the ref store, both
//! `Send`, so it can run inside a spawned task next to the repository handle
//! that started it.

use crate::areas::database::Database;
use crate::areas::refs::{Refs, SymRefOrOid};
use crate::areas::repository::GIT_DIR_NAME;
use crate::artifacts::branch::REFS_PREFIX;
use crate::artifacts::branch::branch_name::SymRefName;
use crate::artifacts::core::errors::BitError;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::transport::negotiation::{ObjectWalker, pack_objects, unpack_objects};
use crate::artifacts::transport::pkt_line::{PktLine, PktLineReader, PktLineWriter};
use crate::artifacts::transport::protocol::{
    Command, CommandStatus, Negotiation, RefAdvertisement, Service, ServiceRequest,
};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncWrite};

#[derive(Debug, Clone)]
pub struct ServedRepository {
    git_dir: PathBuf,
    database: Database,
    refs: Refs,
}

impl ServedRepository {
    /// Open the repository at `path`, either a working tree or a `.git` directory
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let git_dir = if path.join(GIT_DIR_NAME).join("HEAD").is_file() {
            path.join(GIT_DIR_NAME)
        } else if path.join("HEAD").is_file() {
            path.to_path_buf()
        } else {
            return Err(BitError::NotFound(format!("no repository at {}", path.display())).into());
        };

        Ok(Self {
            database: Database::new(git_dir.join("objects").into_boxed_path()),
            refs: Refs::new(git_dir.clone().into_boxed_path()),
            git_dir,
        })
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn advertise_refs(&self) -> anyhow::Result<RefAdvertisement> {
        let refs = self
            .refs
            .list(REFS_PREFIX)?
            .into_iter()
            .map(|(name, oid)| (name.to_string(), oid))
            .collect();

        let head_target = match self.refs.read_raw(&SymRefName::head())? {
            Some(SymRefOrOid::SymRef { sym_ref_name }) => Some(sym_ref_name.to_string()),
            _ => None,
        };

        Ok(RefAdvertisement {
            refs,
            head: self.refs.read_head()?,
            head_target,
        })
    }

    /// Send the objects a fetching client asks for
    pub async fn upload_pack<R, W>(
        &self,
        reader: &mut PktLineReader<R>,
        writer: &mut PktLineWriter<W>,
    ) -> anyhow::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut wants = Vec::new();
        for line in reader.read_section().await? {
            match Negotiation::parse(&line)? {
                Negotiation::Want(oid) if self.database.has(&oid) => wants.push(oid),
                Negotiation::Want(oid) => {
                    return Err(BitError::TransportFailure(format!("not our object {oid}")).into());
                }
                _ => {
                    return Err(BitError::TransportFailure(format!("expected a want, got '{line}'"))
                        .into());
                }
            }
        }
        if wants.is_empty() {
            return Ok(());
        }

        let mut common = Vec::new();
        for line in reader.read_section().await? {
            match Negotiation::parse(&line)? {
                Negotiation::Have(oid) if self.database.has(&oid) => common.push(oid),
                Negotiation::Have(_) | Negotiation::Done => {}
                Negotiation::Want(_) => {
                    return Err(BitError::TransportFailure("want after the want list".into()).into());
                }
            }
        }

        if common.is_empty() {
            writer.write_line("NAK").await?;
        }
        for oid in &common {
            writer.write_line(&format!("ACK {oid}")).await?;
        }
        writer.flush().await?;

        let objects = ObjectWalker::new(&self.database).missing_for_peer(&wants, &common)?;
        let pack = pack_objects(&self.database, &objects)?;
        writer.write_chunked(&pack).await?;

        tracing::info!(
            target: "bit::transport",
            wants = wants.len(),
            common = common.len(),
            objects = objects.len(),
            "upload-pack finished"
        );

        Ok(())
    }

    /// Store a pushed pack and apply the ref updates that come with it
    ///
    /// Every command is a compare-and-swap against the old value the client
    /// saw. A command that loses its race is reported as `ng` while the
    /// others still go through.
    pub async fn receive_pack<R, W>(
        &self,
        reader: &mut PktLineReader<R>,
        writer: &mut PktLineWriter<W>,
    ) -> anyhow::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let commands = reader
            .read_section()
            .await?
            .iter()
            .map(|line| Command::parse(line))
            .collect::<anyhow::Result<Vec<_>>>()?;
        if commands.is_empty() {
            return Ok(());
        }

        let pack = reader.read_data().await?;
        let unpacked = if pack.is_empty() {
            Ok(vec![])
        } else {
            unpack_objects(&self.database, &pack)
        };

        match &unpacked {
            Ok(_) => writer.write_line("unpack ok").await?,
            Err(error) => writer.write_line(&format!("unpack {error}")).await?,
        }

        for command in &commands {
            let status = match &unpacked {
                Ok(_) => self.apply(command),
                Err(_) => CommandStatus::Rejected {
                    name: command.name.clone(),
                    reason: "unpacker error".to_string(),
                },
            };
            if let CommandStatus::Rejected { name, reason } = &status {
                tracing::warn!(target: "bit::transport", name = %name, reason = %reason, "ref update refused");
            }
            writer.write_line(&status.encode()).await?;
        }
        writer.flush().await
    }

    fn apply(&self, command: &Command) -> CommandStatus {
        let rejected = |reason: &str| CommandStatus::Rejected {
            name: command.name.clone(),
            reason: reason.to_string(),
        };

        let name = match SymRefName::try_parse(&command.name) {
            Ok(name) if !name.is_head() => name,
            _ => return rejected("invalid ref name"),
        };
        let expected = (!command.is_create()).then_some(&command.old);

        let result = if command.is_delete() {
            self.refs.delete(&name, expected).map(|_| ())
        } else {
            self.update(&name, expected, &command.new)
        };

        match result {
            Ok(()) => CommandStatus::Ok(command.name.clone()),
            Err(error) => match error.downcast_ref::<BitError>() {
                Some(BitError::Conflict(_)) => rejected("stale info"),
                Some(BitError::ObjectMissing(_)) => rejected("missing necessary objects"),
                Some(BitError::NotFound(_)) => rejected("no such ref"),
                _ => rejected(&error.to_string()),
            },
        }
    }

    fn update(
        &self,
        name: &SymRefName,
        expected: Option<&ObjectId>,
        new: &ObjectId,
    ) -> anyhow::Result<()> {
        ObjectWalker::new(&self.database).check_connectivity([new])?;
        self.refs.update(name, expected, new)
    }
}

/// Run one server conversation over `stream`
///
/// `open` maps the client's request to a repository, checking access on the
/// way; its error is sent back to the client as an `ERR` packet.
pub async fn serve<S, F>(stream: S, open: F) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: FnOnce(&ServiceRequest) -> anyhow::Result<ServedRepository>,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let mut reader = PktLineReader::new(read_half);
    let mut writer = PktLineWriter::new(write_half);

    let result = converse(&mut reader, &mut writer, open).await;
    if let Err(error) = &result {
        // the peer may already be gone
        let _ = writer.write_error(&error.to_string()).await;
    }
    let _ = writer.shutdown().await;

    result
}

async fn converse<R, W, F>(
    reader: &mut PktLineReader<R>,
    writer: &mut PktLineWriter<W>,
    open: F,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    F: FnOnce(&ServiceRequest) -> anyhow::Result<ServedRepository>,
{
    let request = match reader.read().await? {
        PktLine::Data(data) => ServiceRequest::parse(&data)?,
        PktLine::Flush => {
            return Err(BitError::TransportFailure("missing service request".into()).into());
        }
    };
    let repository = open(&request)?;
    tracing::debug!(
        target: "bit::transport",
        service = %request.service,
        repository = ?repository.git_dir(),
        "serving"
    );

    for line in repository.advertise_refs()?.encode() {
        writer.write_line(&line).await?;
    }
    writer.flush().await?;

    match request.service {
        Service::UploadPack => repository.upload_pack(reader, writer).await,
        Service::ReceivePack => repository.receive_pack(reader, writer).await,
    }
}
