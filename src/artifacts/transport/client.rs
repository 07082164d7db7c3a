//! Client side of a transfer
//!
//! Remotes are named by URL:
//!
//! - `bit://host[:port]/path` talks to a daemon over TCP
//! - `file:///path` and plain paths run the server in-process, connected
//!   through an in-memory pipe
//!
//! Both carry exactly the same conversation.

use crate::areas::database::Database;
use crate::artifacts::core::errors::BitError;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::transport::credentials::Credentials;
use crate::artifacts::transport::negotiation::unpack_objects;
use crate::artifacts::transport::pkt_line::{PktLineReader, PktLineWriter};
use crate::artifacts::transport::protocol::{
    Command, CommandStatus, Negotiation, RefAdvertisement, Service, ServiceRequest,
};
use crate::artifacts::transport::server::{ServedRepository, serve};
use bytes::Bytes;
use std::fmt;
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;

pub const DAEMON_SCHEME: &str = "bit://";
pub const FILE_SCHEME: &str = "file://";
pub const DEFAULT_DAEMON_PORT: u16 = 9418;

/// Buffer of the in-memory pipe used for local remotes
const LOCAL_PIPE_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteUrl {
    Local(PathBuf),
    Daemon {
        host: String,
        port: u16,
        path: String,
    },
}

impl RemoteUrl {
    pub fn parse(url: &str) -> anyhow::Result<Self> {
        if let Some(rest) = url.strip_prefix(DAEMON_SCHEME) {
            let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
            let (host, port) = match authority.rsplit_once(':') {
                Some((host, port)) => {
                    let port = port.parse::<u16>().map_err(|_| {
                        BitError::InvalidName(format!("invalid port in remote url '{url}'"))
                    })?;
                    (host, port)
                }
                None => (authority, DEFAULT_DAEMON_PORT),
            };
            if host.is_empty() {
                return Err(BitError::InvalidName(format!("missing host in remote url '{url}'")).into());
            }

            return Ok(RemoteUrl::Daemon {
                host: host.to_string(),
                port,
                path: path.to_string(),
            });
        }

        let path = url.strip_prefix(FILE_SCHEME).unwrap_or(url);
        if path.is_empty() {
            return Err(BitError::InvalidName("empty remote url".to_string()).into());
        }
        Ok(RemoteUrl::Local(PathBuf::from(path)))
    }
}

impl fmt::Display for RemoteUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteUrl::Local(path) => write!(f, "{}", path.display()),
            RemoteUrl::Daemon { host, port, path } => write!(f, "{DAEMON_SCHEME}{host}:{port}/{path}"),
        }
    }
}

type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;
type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// An open conversation with a remote, past the ref advertisement
pub struct Connection {
    reader: PktLineReader<BoxedReader>,
    writer: PktLineWriter<BoxedWriter>,
    advertisement: RefAdvertisement,
    local_server: Option<JoinHandle<anyhow::Result<()>>>,
}

impl Connection {
    pub async fn open(
        url: &RemoteUrl,
        service: Service,
        credentials: &Credentials,
    ) -> anyhow::Result<Self> {
        let (stream_reader, stream_writer, local_server, request) =
            match url {
                RemoteUrl::Local(path) => {
                    let served = ServedRepository::open(path)?;
                    let (client, server) = tokio::io::duplex(LOCAL_PIPE_CAPACITY);
                    let handle = tokio::spawn(serve(server, move |_| Ok(served)));
                    let (reader, writer) = tokio::io::split(client);

                    let request = ServiceRequest {
                        service,
                        path: path.display().to_string(),
                        credentials: Credentials::NoAuth,
                    };
                    (
                        Box::new(reader) as BoxedReader,
                        Box::new(writer) as BoxedWriter,
                        Some(handle),
                        request,
                    )
                }
                RemoteUrl::Daemon { host, port, path } => {
                    let request = ServiceRequest {
                        service,
                        path: path.clone(),
                        credentials: credentials.clone(),
                    };
                    // refuse unsendable credentials before dialing
                    request.encode()?;

                    let stream = tokio::net::TcpStream::connect((host.as_str(), *port))
                        .await
                        .map_err(|error| {
                            BitError::TransportFailure(format!("cannot connect to {url}: {error}"))
                        })?;
                    let (reader, writer) = stream.into_split();
                    (
                        Box::new(reader) as BoxedReader,
                        Box::new(writer) as BoxedWriter,
                        None,
                        request,
                    )
                }
            };

        let mut reader = PktLineReader::new(stream_reader);
        let mut writer = PktLineWriter::new(stream_writer);

        writer.write_data(&request.encode()?).await?;
        let advertisement = RefAdvertisement::parse(&reader.read_section().await?)?;

        tracing::debug!(
            target: "bit::transport",
            remote = %url,
            service = %service,
            refs = advertisement.refs.len(),
            "connected"
        );

        Ok(Self {
            reader,
            writer,
            advertisement,
            local_server,
        })
    }

    pub fn advertisement(&self) -> &RefAdvertisement {
        &self.advertisement
    }

    /// Download everything reachable from `wants` that is not reachable from
    /// `haves`, storing it in `database`
    pub async fn fetch(
        mut self,
        database: &Database,
        wants: &[ObjectId],
        haves: &[ObjectId],
    ) -> anyhow::Result<Vec<ObjectId>> {
        for want in wants {
            self.writer.write_line(&Negotiation::Want(want.clone()).encode()).await?;
        }
        self.writer.flush().await?;

        if wants.is_empty() {
            self.finish().await?;
            return Ok(vec![]);
        }

        for have in haves {
            self.writer.write_line(&Negotiation::Have(have.clone()).encode()).await?;
        }
        self.writer.write_line(&Negotiation::Done.encode()).await?;
        self.writer.flush().await?;

        let acknowledgements = self.reader.read_section().await?;
        tracing::trace!(target: "bit::transport", ?acknowledgements, "negotiation finished");

        let pack = self.reader.read_data().await?;
        let stored = unpack_objects(database, &pack)?;
        self.finish().await?;

        Ok(stored)
    }

    /// Send ref update commands with the pack they need
    ///
    /// Returns the per-command status the remote reported.
    pub async fn push(
        mut self,
        commands: &[Command],
        pack: Option<Bytes>,
    ) -> anyhow::Result<Vec<CommandStatus>> {
        for command in commands {
            self.writer.write_line(&command.encode()).await?;
        }
        self.writer.flush().await?;

        if commands.is_empty() {
            self.finish().await?;
            return Ok(vec![]);
        }

        self.writer.write_chunked(pack.as_deref().unwrap_or_default()).await?;

        let mut report = self.reader.read_section().await?.into_iter();
        match report.next().as_deref() {
            Some("unpack ok") => {}
            Some(line) => {
                let message = line.strip_prefix("unpack ").unwrap_or(line);
                return Err(BitError::TransportFailure(format!("remote unpack failed: {message}"))
                    .into());
            }
            None => {
                return Err(BitError::TransportFailure("remote sent no push report".into()).into());
            }
        }
        let statuses = report
            .map(|line| CommandStatus::parse(&line))
            .collect::<anyhow::Result<Vec<_>>>()?;
        self.finish().await?;

        Ok(statuses)
    }

    async fn finish(mut self) -> anyhow::Result<()> {
        self.writer.shutdown().await?;

        if let Some(handle) = self.local_server.take() {
            handle
                .await
                .map_err(|error| BitError::TransportFailure(format!("local server failed: {error}")))??;
        }

        Ok(())
    }
}
