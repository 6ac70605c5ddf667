//! Line-oriented message channel over any async byte stream.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::trace;

use crate::error::SessionError;
use crate::message::Message;

/// Longest line accepted from a peer, newline excluded.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Read budget per line: the payload plus its newline.
const LINE_READ_LIMIT: u64 = 64 * 1024 + 1;

/// A reliable, ordered channel of [`Message`]s, one per line.
pub struct LineChannel<R, W> {
    reader: BufReader<R>,
    writer: W,
    pending: Option<Message>,
    line: String,
}

impl LineChannel<OwnedReadHalf, OwnedWriteHalf> {
    pub fn from_tcp(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self::new(reader, writer)
    }
}

impl<R, W> LineChannel<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            pending: None,
            line: String::new(),
        }
    }

    /// Write one message and flush it.
    pub async fn send(&mut self, msg: &Message) -> Result<(), SessionError> {
        let mut line = msg.to_string();
        trace!(line = %line, "send");
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Read the next message. `Ok(None)` means the peer closed the stream.
    pub async fn recv(&mut self) -> Result<Option<Message>, SessionError> {
        if let Some(msg) = self.pending.take() {
            return Ok(Some(msg));
        }

        self.line.clear();
        let mut limited = (&mut self.reader).take(LINE_READ_LIMIT);
        let read = match limited.read_line(&mut self.line).await {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                return Err(SessionError::Protocol("line is not valid UTF-8".into()));
            }
            Err(e) => return Err(e.into()),
        };
        if read == 0 {
            return Ok(None);
        }
        if !self.line.ends_with('\n') && self.line.len() > MAX_LINE_BYTES {
            return Err(SessionError::Protocol(format!(
                "line exceeds {MAX_LINE_BYTES} bytes"
            )));
        }

        let text = self.line.trim_end_matches(['\r', '\n']);
        trace!(line = %text, "recv");
        text.parse().map(Some)
    }

    /// Read the next message, treating end of stream as a connection error.
    pub async fn expect(&mut self) -> Result<Message, SessionError> {
        self.recv()
            .await?
            .ok_or_else(|| SessionError::Connection("peer closed the connection".into()))
    }

    /// Push a message back so the next `recv` returns it.
    pub fn unread(&mut self, msg: Message) {
        self.pending = Some(msg);
    }

    /// Shut down the write half.
    pub async fn close(&mut self) -> Result<(), SessionError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
