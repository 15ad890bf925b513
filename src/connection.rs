//! Line-oriented connection
//!
//! Wraps one accepted socket (or any `AsyncRead + AsyncWrite` transport)
//! and exposes newline-delimited text I/O. No business logic lives here.
//! A session splits its connection so the read half stays on the session's
//! own task while the write half is owned by its writer task.

use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::{
    AnyDelimiterCodec, AnyDelimiterCodecError, Decoder, FramedRead, FramedWrite, LinesCodec,
};
use tracing::debug;

use crate::error::ConnectionError;

/// Any byte stream a connection can run over
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

type BoxedTransport = Box<dyn Transport>;

/// Decoded inbound frame
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    Line(String),
    Overlong,
}

/// Newline splitter that never ends the stream on bad input
///
/// An overlong line is reported as a frame instead of an error, and bytes
/// that are not valid UTF-8 are replaced rather than rejected.
struct LineDecoder(AnyDelimiterCodec);

impl LineDecoder {
    fn new(max_line_length: usize) -> Self {
        Self(AnyDelimiterCodec::new_with_max_length(
            b"\n".to_vec(),
            b"\n".to_vec(),
            max_line_length,
        ))
    }

    fn map(
        result: Result<Option<Bytes>, AnyDelimiterCodecError>,
    ) -> Result<Option<Frame>, ConnectionError> {
        match result {
            Ok(chunk) => Ok(chunk.map(|chunk| Frame::Line(to_text(&chunk)))),
            Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => Ok(Some(Frame::Overlong)),
            Err(AnyDelimiterCodecError::Io(e)) => Err(e.into()),
        }
    }
}

fn to_text(chunk: &[u8]) -> String {
    let chunk = chunk.strip_suffix(b"\r").unwrap_or(chunk);
    String::from_utf8_lossy(chunk).into_owned()
}

impl Decoder for LineDecoder {
    type Item = Frame;
    type Error = ConnectionError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, ConnectionError> {
        Self::map(self.0.decode(buf))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, ConnectionError> {
        Self::map(self.0.decode_eof(buf))
    }
}

/// A full-duplex line connection
pub struct Connection {
    peer: Option<SocketAddr>,
    reader: ConnectionReader,
    writer: ConnectionWriter,
}

impl Connection {
    /// Wrap an arbitrary transport
    pub fn new<T: Transport>(transport: T, max_line_length: usize) -> Self {
        let boxed: BoxedTransport = Box::new(transport);
        let (read_half, write_half) = tokio::io::split(boxed);
        Self {
            peer: None,
            reader: ConnectionReader {
                lines: Some(FramedRead::new(read_half, LineDecoder::new(max_line_length))),
            },
            writer: ConnectionWriter {
                lines: Some(FramedWrite::new(write_half, LinesCodec::new())),
            },
        }
    }

    /// Wrap an accepted TCP stream, remembering its peer address
    pub fn from_tcp(stream: TcpStream, max_line_length: usize) -> Self {
        let peer = stream.peer_addr().ok();
        let mut connection = Self::new(stream, max_line_length);
        connection.peer = peer;
        connection
    }

    /// Remote address, if the transport has one
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Read the next line; `Ok(None)` on end-of-stream
    pub async fn read_line(&mut self) -> Result<Option<String>, ConnectionError> {
        self.reader.read_line().await
    }

    /// Write one line (the newline is appended)
    pub async fn write_line(&mut self, line: &str) -> Result<(), ConnectionError> {
        self.writer.write_line(line).await
    }

    /// Release both halves. Safe to call more than once.
    pub async fn close(&mut self) {
        self.writer.close().await;
        self.reader.close();
    }

    /// Separate the halves so they can live on different tasks
    pub fn into_split(self) -> (ConnectionReader, ConnectionWriter) {
        (self.reader, self.writer)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("read_open", &self.reader.lines.is_some())
            .field("write_open", &self.writer.lines.is_some())
            .finish()
    }
}

/// Inbound half of a connection
pub struct ConnectionReader {
    lines: Option<FramedRead<ReadHalf<BoxedTransport>, LineDecoder>>,
}

impl ConnectionReader {
    /// Read the next line; `Ok(None)` on end-of-stream or after `close`
    ///
    /// An overlong line yields `ConnectionError::LineTooLong`; the rest of
    /// that line is discarded and the next call continues normally. Invalid
    /// UTF-8 is decoded lossily.
    pub async fn read_line(&mut self) -> Result<Option<String>, ConnectionError> {
        let Some(lines) = self.lines.as_mut() else {
            return Ok(None);
        };
        match lines.next().await {
            Some(Ok(Frame::Line(line))) => Ok(Some(line)),
            Some(Ok(Frame::Overlong)) => Err(ConnectionError::LineTooLong),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    pub fn close(&mut self) {
        self.lines.take();
    }
}

/// Outbound half of a connection
pub struct ConnectionWriter {
    lines: Option<FramedWrite<WriteHalf<BoxedTransport>, LinesCodec>>,
}

impl ConnectionWriter {
    /// Write and flush one line
    pub async fn write_line(&mut self, line: &str) -> Result<(), ConnectionError> {
        let lines = self.lines.as_mut().ok_or(ConnectionError::Closed)?;
        lines.send(line).await?;
        Ok(())
    }

    /// Flush and shut down the write direction. Idempotent.
    pub async fn close(&mut self) {
        if let Some(mut lines) = self.lines.take() {
            if let Err(e) = SinkExt::<String>::close(&mut lines).await {
                debug!("Error while closing connection writer: {}", e);
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lines.is_none()
    }
}
