//! Pkt-line framing
//!
//! Every packet starts with its total length as four hex digits, the prefix
//! included. `0000` is a flush packet, closing a section of the conversation.
//! Pack data travels as a run of data packets closed by a flush.

use crate::artifacts::core::errors::BitError;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const LENGTH_PREFIX: usize = 4;
pub const MAX_PKT_LEN: usize = 65520;
pub const MAX_PKT_DATA: usize = MAX_PKT_LEN - LENGTH_PREFIX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
    Data(Bytes),
    Flush,
}

impl PktLine {
    /// Text of a data packet without its trailing newline
    pub fn as_text(&self) -> anyhow::Result<Option<&str>> {
        match self {
            PktLine::Flush => Ok(None),
            PktLine::Data(data) => {
                let text = std::str::from_utf8(data).map_err(|_| {
                    BitError::TransportFailure("packet is not valid UTF-8".to_string())
                })?;
                Ok(Some(text.strip_suffix('\n').unwrap_or(text)))
            }
        }
    }
}

fn protocol_error(message: impl Into<String>) -> anyhow::Error {
    BitError::TransportFailure(message.into()).into()
}

pub struct PktLineReader<R> {
    reader: R,
}

impl<R: AsyncRead + Unpin> PktLineReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub async fn read(&mut self) -> anyhow::Result<PktLine> {
        let mut prefix = [0u8; LENGTH_PREFIX];
        self.reader
            .read_exact(&mut prefix)
            .await
            .map_err(|error| protocol_error(format!("connection closed: {error}")))?;

        let length = std::str::from_utf8(&prefix)
            .ok()
            .and_then(|prefix| usize::from_str_radix(prefix, 16).ok())
            .ok_or_else(|| protocol_error(format!("invalid pkt-line prefix {prefix:?}")))?;

        match length {
            0 => Ok(PktLine::Flush),
            1..LENGTH_PREFIX => Err(protocol_error(format!("invalid pkt-line length {length}"))),
            _ if length > MAX_PKT_LEN => {
                Err(protocol_error(format!("pkt-line of {length} bytes is too long")))
            }
            _ => {
                let mut data = vec![0u8; length - LENGTH_PREFIX];
                self.reader
                    .read_exact(&mut data)
                    .await
                    .map_err(|error| protocol_error(format!("truncated pkt-line: {error}")))?;
                Ok(PktLine::Data(Bytes::from(data)))
            }
        }
    }

    /// Next text line of the current section, `None` at the flush
    ///
    /// An `ERR <message>` packet from the other side becomes a transport failure.
    pub async fn read_line(&mut self) -> anyhow::Result<Option<String>> {
        let packet = self.read().await?;
        match packet.as_text()? {
            None => Ok(None),
            Some(text) => match text.strip_prefix("ERR ") {
                Some(message) => Err(protocol_error(format!("remote error: {message}"))),
                None => Ok(Some(text.to_string())),
            },
        }
    }

    /// Every text line up to the next flush
    pub async fn read_section(&mut self) -> anyhow::Result<Vec<String>> {
        let mut lines = Vec::new();
        while let Some(line) = self.read_line().await? {
            lines.push(line);
        }
        Ok(lines)
    }

    /// Concatenated data packets up to the next flush
    pub async fn read_data(&mut self) -> anyhow::Result<Bytes> {
        let mut data = Vec::new();
        while let PktLine::Data(chunk) = self.read().await? {
            data.extend_from_slice(&chunk);
        }
        Ok(Bytes::from(data))
    }
}

pub struct PktLineWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> PktLineWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write_data(&mut self, data: &[u8]) -> anyhow::Result<()> {
        if data.len() > MAX_PKT_DATA {
            return Err(protocol_error(format!(
                "pkt-line payload of {} bytes is too long",
                data.len()
            )));
        }

        let prefix = format!("{:04x}", data.len() + LENGTH_PREFIX);
        self.writer.write_all(prefix.as_bytes()).await?;
        self.writer.write_all(data).await?;

        Ok(())
    }

    /// A text line, newline-terminated
    pub async fn write_line(&mut self, line: &str) -> anyhow::Result<()> {
        self.write_data(format!("{line}\n").as_bytes()).await
    }

    pub async fn write_error(&mut self, message: &str) -> anyhow::Result<()> {
        self.write_line(&format!("ERR {message}")).await?;
        self.flush().await
    }

    /// Write a flush packet and push buffered bytes to the peer
    pub async fn flush(&mut self) -> anyhow::Result<()> {
        self.writer.write_all(b"0000").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Arbitrary binary data split into packets, closed by a flush
    pub async fn write_chunked(&mut self, data: &[u8]) -> anyhow::Result<()> {
        for chunk in data.chunks(MAX_PKT_DATA) {
            self.write_data(chunk).await?;
        }
        self.flush().await
    }

    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn lines_and_flushes_are_framed() {
        let mut buffer = Vec::new();
        let mut writer = PktLineWriter::new(&mut buffer);
        writer.write_line("want 1234").await.unwrap();
        writer.flush().await.unwrap();

        assert_eq!(buffer, b"000ewant 1234\n0000");

        let mut reader = PktLineReader::new(buffer.as_slice());
        assert_eq!(reader.read_section().await.unwrap(), vec!["want 1234"]);
    }

    #[tokio::test]
    async fn chunked_data_survives_packet_boundaries() {
        let data = (0..MAX_PKT_DATA * 2 + 17).map(|i| (i % 251) as u8).collect::<Vec<_>>();

        let mut buffer = Vec::new();
        PktLineWriter::new(&mut buffer).write_chunked(&data).await.unwrap();

        let read = PktLineReader::new(buffer.as_slice()).read_data().await.unwrap();
        assert_eq!(read.as_ref(), data.as_slice());
    }

    #[tokio::test]
    async fn error_packets_become_transport_failures() {
        let mut buffer = Vec::new();
        PktLineWriter::new(&mut buffer).write_error("access denied").await.unwrap();

        let error = PktLineReader::new(buffer.as_slice())
            .read_line()
            .await
            .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<BitError>(),
            Some(BitError::TransportFailure(message)) if message.contains("access denied")
        ));
    }

    #[tokio::test]
    async fn malformed_prefixes_are_rejected() {
        let mut reader = PktLineReader::new(&b"zz01"[..]);
        assert!(reader.read().await.is_err());

        let mut reader = PktLineReader::new(&b"0002"[..]);
        assert!(reader.read().await.is_err());
    }
}
